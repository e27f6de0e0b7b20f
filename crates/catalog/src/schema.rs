// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Parquet encoding of chunk manifests

use crate::error::{CatalogError, Result};
use arrow::datatypes::{DataType, Field, FieldRef};
use arrow_array::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vref::{ChunkIndex, ChunkRef, VirtualDatasetManifest};

/// Arrow schema for a serde record type
pub trait ForArrow {
    fn for_arrow() -> Vec<FieldRef>;
}

/// One chunk slot of one variable. Absent slots have no location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRow {
    pub variable: String,
    pub key: String,
    pub location: Option<String>,
    pub offset: Option<u64>,
    pub length: Option<u64>,
    pub fingerprint: Option<String>,
}

impl ForArrow for ChunkRow {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("variable", DataType::Utf8, false)),
            Arc::new(Field::new("key", DataType::Utf8, false)),
            Arc::new(Field::new("location", DataType::Utf8, true)),
            Arc::new(Field::new("offset", DataType::UInt64, true)),
            Arc::new(Field::new("length", DataType::UInt64, true)),
            Arc::new(Field::new("fingerprint", DataType::Utf8, true)),
        ]
    }
}

impl ChunkRow {
    /// Reference form, `None` for an absent slot
    pub fn to_chunk_ref(&self) -> Result<Option<ChunkRef>> {
        let index: ChunkIndex = self.key.parse()?;
        match (&self.location, self.offset, self.length) {
            (Some(location), Some(offset), Some(length)) => Ok(Some(ChunkRef {
                location: location.clone(),
                offset,
                length,
                index,
                fingerprint: self.fingerprint.clone(),
            })),
            (None, None, None) => Ok(None),
            _ => Err(CatalogError::Corrupt {
                what: "chunk row".to_string(),
                detail: format!("{} {} is partially populated", self.variable, self.key),
            }),
        }
    }
}

/// Rows in variable then chunk-key order
pub fn chunk_rows(dataset: &VirtualDatasetManifest) -> Vec<ChunkRow> {
    let mut rows = Vec::with_capacity(dataset.chunk_count());
    for (name, manifest) in &dataset.variables {
        let mut slots: Vec<(&ChunkIndex, Option<&ChunkRef>)> = manifest
            .chunks
            .iter()
            .map(|(k, c)| (k, Some(c)))
            .chain(manifest.absent.iter().map(|k| (k, None)))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(b.0));
        for (index, chunk) in slots {
            rows.push(ChunkRow {
                variable: name.clone(),
                key: index.to_string(),
                location: chunk.map(|c| c.location.clone()),
                offset: chunk.map(|c| c.offset),
                length: chunk.map(|c| c.length),
                fingerprint: chunk.and_then(|c| c.fingerprint.clone()),
            });
        }
    }
    rows
}

pub fn encode_rows(rows: &[ChunkRow]) -> Result<Vec<u8>> {
    let fields = ChunkRow::for_arrow();
    let batch = serde_arrow::to_record_batch(&fields, &rows)?;

    let mut buffer = Vec::new();
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    _ = writer.close()?;
    Ok(buffer)
}

pub fn decode_rows(data: Bytes) -> Result<Vec<ChunkRow>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(data)?.build()?;
    let batches = reader.collect::<std::result::Result<Vec<RecordBatch>, _>>()?;
    let mut rows = Vec::new();
    for batch in &batches {
        let mut part: Vec<ChunkRow> = serde_arrow::from_record_batch(batch)?;
        rows.append(&mut part);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vref::{DataType as VDataType, ScalarKind, VirtualArrayManifest};

    #[test]
    fn test_rows_through_parquet() {
        let mut m = VirtualArrayManifest::new(
            "RZSM",
            VDataType::big_endian(ScalarKind::F32),
            vec!["time".into()],
            vec![3],
            vec![1],
        )
        .unwrap();
        m.insert(ChunkRef {
            location: "s3://b/RZSM/a.nc".into(),
            offset: 1024,
            length: 4,
            index: ChunkIndex(vec![0]),
            fingerprint: Some("\"etag\"".into()),
        })
        .unwrap();
        m.insert(ChunkRef {
            location: "s3://b/RZSM/c.nc".into(),
            offset: 1024,
            length: 4,
            index: ChunkIndex(vec![2]),
            fingerprint: None,
        })
        .unwrap();
        m.mark_absent(ChunkIndex(vec![1])).unwrap();

        let mut ds = VirtualDatasetManifest::new();
        _ = ds.variables.insert("RZSM".into(), m.clone());

        let rows = chunk_rows(&ds);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].location, None);

        let decoded = decode_rows(Bytes::from(encode_rows(&rows).unwrap())).unwrap();
        assert_eq!(decoded, rows);
        assert_eq!(decoded[1].to_chunk_ref().unwrap(), None);
        assert_eq!(
            decoded[2].to_chunk_ref().unwrap().as_ref(),
            m.chunks.get(&ChunkIndex(vec![2]))
        );
    }

    #[test]
    fn test_empty_dataset() {
        let rows = chunk_rows(&VirtualDatasetManifest::new());
        let decoded = decode_rows(Bytes::from(encode_rows(&rows).unwrap())).unwrap();
        assert!(decoded.is_empty());
    }
}

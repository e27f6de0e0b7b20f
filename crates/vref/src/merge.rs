// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Concatenation of per-file manifests and assembly of the dataset

use crate::attrs::{AttrScope, AttributeSet};
use crate::coords::CoordinateAxis;
use crate::error::{Error, Result};
use crate::manifest::{
    VirtualArrayManifest, VirtualDatasetManifest, check_dimensions, collect_coordinates,
};
use crate::naming::CasePolicy;
use crate::reconcile::AttributeReconciler;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ManifestMerger {
    reconciler: AttributeReconciler,
    case: CasePolicy,
}

impl ManifestMerger {
    pub fn new(reconciler: AttributeReconciler, case: CasePolicy) -> Self {
        Self { reconciler, case }
    }

    pub fn reconciler(&self) -> &AttributeReconciler {
        &self.reconciler
    }

    pub fn case_policy(&self) -> CasePolicy {
        self.case
    }

    /// Stack per-file manifests along `axis`, one input per axis value.
    ///
    /// Inputs that do not yet carry the axis dimension are expanded to
    /// length one along it first. Input order is preserved: the chunk at
    /// position `i` of the new axis comes from `manifests[i]`.
    pub fn concat_along_new_axis(
        &self,
        manifests: &[VirtualArrayManifest],
        axis: &CoordinateAxis,
    ) -> Result<VirtualArrayManifest> {
        let first = manifests
            .first()
            .ok_or_else(|| Error::EmptyInput(format!("no manifests to concatenate along {}", axis.name)))?;
        if manifests.len() != axis.len() {
            return Err(Error::ShapeMismatch {
                variable: first.name.clone(),
                detail: format!(
                    "{} manifests but {} values along {}",
                    manifests.len(),
                    axis.len(),
                    axis.name
                ),
            });
        }
        axis.require_strictly_increasing()?;

        let inputs = manifests
            .iter()
            .map(|m| normalize(m, &axis.name))
            .collect::<Result<Vec<_>>>()?;
        let reference = &inputs[0];

        for (position, input) in inputs.iter().enumerate().skip(1) {
            if !self.case.matches(&reference.name, &input.name) {
                return Err(Error::VariableNameMismatch {
                    expected: reference.name.clone(),
                    declared: input.name.clone(),
                });
            }
            if input.dtype != reference.dtype {
                return Err(Error::DtypeMismatch {
                    variable: reference.name.clone(),
                    expected: reference.dtype.to_string(),
                    found: input.dtype.to_string(),
                });
            }
            if input.dims != reference.dims
                || input.shape != reference.shape
                || input.chunk_shape != reference.chunk_shape
            {
                return Err(Error::ShapeMismatch {
                    variable: reference.name.clone(),
                    detail: format!(
                        "input {position} has dims {:?} shape {:?} chunks {:?}, input 0 has dims {:?} shape {:?} chunks {:?}",
                        input.dims,
                        input.shape,
                        input.chunk_shape,
                        reference.dims,
                        reference.shape,
                        reference.chunk_shape
                    ),
                });
            }
            if input.coordinates != reference.coordinates {
                let coordinate = reference
                    .coordinates
                    .keys()
                    .chain(input.coordinates.keys())
                    .find(|k| reference.coordinates.get(*k) != input.coordinates.get(*k))
                    .cloned()
                    .unwrap_or_default();
                return Err(Error::CoordinateConflict {
                    coordinate,
                    first: "input 0".to_string(),
                    second: format!("input {position}"),
                });
            }
        }

        let attributes = self.reconciler.reconcile(
            &inputs
                .iter()
                .map(|m| m.attributes.clone())
                .collect::<Vec<AttributeSet>>(),
        )?;

        let mut metadata = reference.metadata();
        metadata.shape[0] = inputs.len() as u64;
        metadata.attributes = attributes;
        let mut out = VirtualArrayManifest::from_metadata(metadata)?;

        for (position, input) in inputs.iter().enumerate() {
            let position = position as u64;
            for chunk in input.chunks.values() {
                let mut chunk = chunk.clone();
                chunk.index = chunk.index.with_leading(position);
                out.insert(chunk)?;
            }
            for index in &input.absent {
                out.mark_absent(index.with_leading(position))?;
            }
        }
        out.set_coordinate(axis.clone())?;
        out.validate()?;

        let variable = out.name.as_str();
        let axis_name = axis.name.as_str();
        let files = inputs.len();
        let chunks = out.chunk_count();
        diagnostics::info!(
            "concatenated {files} files of {variable} along {axis_name} into {chunks} chunks",
            files: files,
            variable: variable,
            axis_name: axis_name,
            chunks: chunks
        );
        Ok(out)
    }

    /// Assemble per-variable manifests, keyed by expected name, into one
    /// dataset.
    pub fn merge_variables(
        &self,
        manifests: BTreeMap<String, VirtualArrayManifest>,
    ) -> Result<VirtualDatasetManifest> {
        if manifests.is_empty() {
            return Err(Error::EmptyInput("no variables to merge".to_string()));
        }

        let mut variables = BTreeMap::new();
        for (expected, mut manifest) in manifests {
            if manifest.name != expected {
                if !self.case.matches(&expected, &manifest.name) {
                    return Err(Error::VariableNameMismatch {
                        expected,
                        declared: manifest.name,
                    });
                }
                manifest.name = expected.clone();
            }
            _ = variables.insert(expected, manifest);
        }

        let dims = check_dimensions(variables.iter())?;
        let coordinates = collect_coordinates(variables.values())?;
        for (name, axis) in &coordinates {
            if let Some(&len) = dims.get(name) {
                if len != axis.len() as u64 {
                    return Err(Error::DimensionConflict {
                        dimension: name.clone(),
                        first: "variables".to_string(),
                        first_len: len,
                        second: format!("coordinate {name}"),
                        second_len: axis.len() as u64,
                    });
                }
            }
        }

        let dataset = VirtualDatasetManifest {
            attributes: AttributeSet::new(AttrScope::Dataset),
            variables,
            coordinates,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Reconcile file-level attributes into the dataset's attribute set.
    pub fn dataset_attributes(&self, file_attributes: &[AttributeSet]) -> Result<AttributeSet> {
        Ok(self
            .reconciler
            .reconcile(file_attributes)?
            .rescoped(AttrScope::Dataset))
    }
}

fn normalize(manifest: &VirtualArrayManifest, axis: &str) -> Result<VirtualArrayManifest> {
    match manifest.dims.iter().position(|d| d == axis) {
        None => manifest.expand_leading(axis),
        Some(0) if manifest.shape[0] == 1 && manifest.chunk_shape[0] == 1 => {
            let mut m = manifest.clone();
            _ = m.coordinates.remove(axis);
            Ok(m)
        }
        Some(_) => Err(Error::ShapeMismatch {
            variable: manifest.name.clone(),
            detail: format!(
                "already spans {axis} with dims {:?} and shape {:?}",
                manifest.dims, manifest.shape
            ),
        }),
    }
}

// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use catalog::{DEFAULT_BRANCH, Repository, Storage};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use steward::{
    DescriptorInspector, InlineExecutor, ObjectStoreListing, Pipeline, PipelineConfig,
    SourceLister, StaticListing, StewardError, TokioExecutor, TransientCache,
};
use vref::{
    AttrScope, AttrValue, AttributeSet, ChunkIndex, DataType, ErrorClass, IndexedChunk,
    LoadedVariable, ScalarKind, SourceFile, StorageLayout, VariableLayout,
};

const PREFIX: &str = "s3://nasa-waterinsight/RASI/ROUTING/HISTORICAL";

fn config(extra: &str) -> PipelineConfig {
    let yaml = format!(
        r#"
repository: memory://
message: "First Commit"
containers:
  - prefix: "{PREFIX}/"
    store: {{ kind: s3, region: us-west-2 }}
    credentials: {{ kind: anonymous }}
coordinate: {{ field: date, dimension: time, rule: year_month }}
executor: {{ max_in_flight: 4 }}
commit: {{ max_attempts: 3, min_delay_ms: 1 }}
{extra}
"#
    );
    PipelineConfig::from_yaml(&yaml).expect("config")
}

/// Header of one monthly file holding `declared(lat, lon)`, stored in
/// directory `dir`
fn monthly(dir: &str, declared: &str, date: i64, lat: u64) -> SourceFile {
    let mut loaded = BTreeMap::new();
    _ = loaded.insert(
        "date".to_string(),
        LoadedVariable {
            dims: vec![],
            values: AttrValue::Int(date),
        },
    );
    _ = loaded.insert(
        "lat".to_string(),
        LoadedVariable {
            dims: vec!["lat".into()],
            values: AttrValue::FloatList((0..lat).map(|i| i as f64).collect()),
        },
    );
    _ = loaded.insert(
        "lon".to_string(),
        LoadedVariable {
            dims: vec!["lon".into()],
            values: AttrValue::FloatList(vec![20.0, 20.5]),
        },
    );
    SourceFile {
        url: format!("{PREFIX}/{dir}/{dir}_{date}.nc"),
        byte_length: 512 + lat * 2 * 4,
        fingerprint: Some(format!("etag-{date}")),
        attributes: AttributeSet::new(AttrScope::File).with("title", "RASI routing"),
        variables: vec![
            VariableLayout {
                name: declared.to_string(),
                dtype: DataType::big_endian(ScalarKind::F32),
                dims: vec!["lat".into(), "lon".into()],
                shape: vec![lat, 2],
                chunk_shape: vec![lat, 2],
                storage: StorageLayout::Contiguous { offset: 512 },
                attributes: AttributeSet::new(AttrScope::Variable).with("units", "1"),
            },
            VariableLayout {
                name: "date".into(),
                dtype: DataType::big_endian(ScalarKind::I32),
                dims: vec![],
                shape: vec![],
                chunk_shape: vec![],
                storage: StorageLayout::Contiguous { offset: 0 },
                attributes: AttributeSet::default(),
            },
        ],
        loaded,
    }
}

fn months(dir: &str, declared: &str, lat: u64) -> Vec<SourceFile> {
    [195101, 195102, 195103]
        .into_iter()
        .map(|d| monthly(dir, declared, d, lat))
        .collect()
}

fn urls(files: &[SourceFile]) -> Vec<String> {
    files.iter().map(|f| f.url.clone()).collect()
}

async fn repo(config: &PipelineConfig) -> anyhow::Result<Repository> {
    let storage = Storage::from_location(&config.repository)?;
    Ok(Repository::open_or_create(storage, config.registry()?).await?)
}

#[tokio::test]
async fn run_commits_one_dataset_for_all_variables() -> anyhow::Result<()> {
    let config = config("");
    let repo = repo(&config).await?;
    let mut files = months("RZSM", "RZSM", 10);
    files.extend(months("SWE", "SWE", 10));
    let listing = StaticListing::new(urls(&files));
    let pipeline = Pipeline::new(
        &config,
        TokioExecutor::new(config.executor.max_in_flight),
        Arc::new(DescriptorInspector::new(files.clone())),
    );

    let report = pipeline.run(&repo, &listing).await?;
    assert_eq!(report.sources, 6);
    assert_eq!(repo.branch_head(DEFAULT_BRANCH).await?.snapshot, report.snapshot);

    let committed = repo.checkout(&report.snapshot).await?;
    assert_eq!(committed, report.dataset);
    assert_eq!(committed.variables.keys().collect::<Vec<_>>(), vec!["RZSM", "SWE"]);
    assert_eq!(committed.coordinates["time"].len(), 3);
    assert_eq!(committed.coordinates["lat"].len(), 10);
    assert!(!committed.coordinates.contains_key("date"));
    assert_eq!(committed.attributes.get("title"), Some(&"RASI routing".into()));

    let rzsm = &committed.variables["RZSM"];
    assert_eq!(rzsm.dims, vec!["time", "lat", "lon"]);
    assert_eq!(rzsm.shape, vec![3, 10, 2]);
    for (position, file) in files.iter().take(3).enumerate() {
        let chunk = &rzsm.chunks[&ChunkIndex(vec![position as u64, 0, 0])];
        assert_eq!(chunk.location, file.url);
        assert_eq!((chunk.offset, chunk.length), (512, 80));
        assert_eq!(chunk.fingerprint, file.fingerprint);
    }

    let snapshot = repo.load_snapshot(&report.snapshot).await?;
    assert_eq!(snapshot.message, "First Commit");
    Ok(())
}

#[tokio::test]
async fn every_input_error_is_reported() -> anyhow::Result<()> {
    let config = config("");
    let repo = repo(&config).await?;
    let rzsm = months("RZSM", "RZSM", 10);
    let swe = months("SWE", "SWE", 10);
    let mut listed = urls(&rzsm);
    listed.extend(urls(&swe));
    listed.push(format!("{PREFIX}/SWE/SWE_195104.nc"));
    listed.push("s3://bare.nc".to_string());

    // one RZSM header cannot be decoded
    let mut described: Vec<SourceFile> = rzsm.into_iter().skip(1).collect();
    described.extend(swe);
    let pipeline = Pipeline::new(
        &config,
        InlineExecutor,
        Arc::new(DescriptorInspector::new(described)),
    );

    let err = pipeline
        .run(&repo, &StaticListing::new(listed))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Input);
    let StewardError::InputErrors(failures) = &err else {
        panic!("expected aggregated input errors, got {err}");
    };
    let tasks: Vec<&str> = failures.iter().map(|f| f.task.as_str()).collect();
    assert_eq!(tasks, vec!["s3://bare.nc", "RZSM", "SWE"]);
    for f in &failures[1..] {
        assert!(matches!(f.error.root(), StewardError::SourceNotDescribed(_)));
    }
    assert_eq!(repo.ancestry(DEFAULT_BRANCH).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn dimension_conflict_aborts_the_build() -> anyhow::Result<()> {
    let config = config("");
    let repo = repo(&config).await?;
    let before = repo.branch_head(DEFAULT_BRANCH).await?;
    let mut files = months("SWE", "SWE", 10);
    files.extend(months("RZSM", "RZSM", 11));
    let pipeline = Pipeline::new(
        &config,
        TokioExecutor::new(2),
        Arc::new(DescriptorInspector::new(files.clone())),
    );

    let err = pipeline
        .run(&repo, &StaticListing::new(urls(&files)))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Consistency);
    assert!(matches!(
        err.root(),
        StewardError::Manifest(vref::Error::DimensionConflict { .. })
    ));
    assert_eq!(repo.branch_head(DEFAULT_BRANCH).await?, before);
    Ok(())
}

#[tokio::test]
async fn bad_date_fails_its_variable() -> anyhow::Result<()> {
    let config = config("");
    let mut files = months("RZSM", "RZSM", 4);
    files[1] = monthly("RZSM", "RZSM", 195113, 4);
    let pipeline = Pipeline::new(
        &config,
        TokioExecutor::new(4),
        Arc::new(DescriptorInspector::new(files.clone())),
    );

    let err = pipeline.build(&urls(&files)).await.unwrap_err();
    let StewardError::InputErrors(failures) = &err else {
        panic!("expected aggregated input errors, got {err}");
    };
    assert_eq!(failures.len(), 1);
    assert!(failures[0].error.to_string().contains("RZSM_195113.nc"));
    assert!(matches!(
        failures[0].error.root(),
        StewardError::Manifest(vref::Error::CoordinateParseError { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn case_policy_decides_percentile_naming() -> anyhow::Result<()> {
    let files = months("percentile", "Percentile", 3);

    let exact = Pipeline::new(
        &config(""),
        InlineExecutor,
        Arc::new(DescriptorInspector::new(files.clone())),
    );
    let err = exact.build(&urls(&files)).await.unwrap_err();
    assert!(matches!(
        err.root(),
        StewardError::Manifest(vref::Error::VariableNameMismatch { .. })
    ));
    assert_eq!(err.class(), ErrorClass::Consistency);

    let insensitive = Pipeline::new(
        &config("naming: { rule: parent_directory, case: insensitive }"),
        InlineExecutor,
        Arc::new(DescriptorInspector::new(files.clone())),
    );
    let dataset = insensitive.build(&urls(&files)).await?;
    assert_eq!(dataset.variables.keys().collect::<Vec<_>>(), vec!["percentile"]);
    assert_eq!(dataset.variables["percentile"].name, "percentile");
    Ok(())
}

#[tokio::test]
async fn ordering_by_coordinate_sorts_files() -> anyhow::Result<()> {
    // file names sort opposite to their dates
    let files: Vec<SourceFile> = [(195103, "a"), (195102, "b"), (195101, "c")]
        .into_iter()
        .map(|(date, tag)| {
            let mut f = monthly("RZSM", "RZSM", date, 2);
            f.url = format!("{PREFIX}/RZSM/{tag}.nc");
            f
        })
        .collect();
    let inspector = Arc::new(DescriptorInspector::new(files.clone()));

    let by_locator = Pipeline::new(&config(""), InlineExecutor, inspector.clone());
    let err = by_locator.build(&urls(&files)).await.unwrap_err();
    assert!(matches!(
        err.root(),
        StewardError::Manifest(vref::Error::AxisNotMonotonic { .. })
    ));

    let by_coordinate = Pipeline::new(&config("ordering: by_coordinate"), InlineExecutor, inspector);
    let dataset = by_coordinate.build(&urls(&files)).await?;
    let rzsm = &dataset.variables["RZSM"];
    assert_eq!(rzsm.chunks[&ChunkIndex(vec![0, 0, 0])].location, format!("{PREFIX}/RZSM/c.nc"));
    assert_eq!(rzsm.chunks[&ChunkIndex(vec![2, 0, 0])].location, format!("{PREFIX}/RZSM/a.nc"));
    Ok(())
}

#[derive(Debug, Default)]
struct CountingCache(AtomicUsize);

impl TransientCache for CountingCache {
    fn reset(&self) -> steward::Result<()> {
        _ = self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn cache_is_reset_before_each_variable() -> anyhow::Result<()> {
    let mut files = months("RZSM", "RZSM", 2);
    files.extend(months("SWE", "SWE", 2));
    files.extend(months("percentile", "percentile", 2));
    let cache = Arc::new(CountingCache::default());
    let pipeline = Pipeline::new(
        &config(""),
        InlineExecutor,
        Arc::new(DescriptorInspector::new(files.clone())),
    )
    .with_cache(cache.clone());

    _ = pipeline.build(&urls(&files)).await?;
    assert_eq!(cache.0.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn empty_listing_is_an_input_error() -> anyhow::Result<()> {
    let config = config("");
    let repo = repo(&config).await?;
    let pipeline = Pipeline::new(&config, InlineExecutor, Arc::new(DescriptorInspector::default()));
    let err = pipeline
        .run(&repo, &StaticListing::new(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, StewardError::NoSources));
    assert_eq!(err.class(), ErrorClass::Input);
    Ok(())
}

#[tokio::test]
async fn object_store_listing_reads_local_prefix() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = std::fs::canonicalize(tmp.path())?;
    for name in ["RZSM/RZSM_195102.nc", "RZSM/RZSM_195101.nc", "RZSM/notes.txt", "SWE/SWE_195101.nc"] {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().expect("parent"))?;
        std::fs::write(&path, b"header")?;
    }
    let prefix = url::Url::from_directory_path(&root).expect("absolute dir");

    let listing = ObjectStoreListing::with_store(
        Arc::new(object_store::local::LocalFileSystem::new()),
        prefix.as_str(),
        ".nc",
    )?;
    let listed = listing.list().await?;
    let expected: Vec<String> = ["RZSM/RZSM_195101.nc", "RZSM/RZSM_195102.nc", "SWE/SWE_195101.nc"]
        .into_iter()
        .map(|name| format!("{prefix}{name}"))
        .collect();
    assert_eq!(listed, expected);
    Ok(())
}

#[tokio::test]
async fn coordinate_field_from_file_attributes() -> anyhow::Result<()> {
    // the date is a global attribute rather than a loaded variable
    let files: Vec<SourceFile> = months("RZSM", "RZSM", 2)
        .into_iter()
        .map(|mut f| {
            let date = f.loaded.remove("date").expect("date").values;
            f.variables.retain(|v| v.name != "date");
            _ = f.attributes.insert("date", date);
            f
        })
        .collect();
    let pipeline = Pipeline::new(
        &config(""),
        InlineExecutor,
        Arc::new(DescriptorInspector::new(files.clone())),
    );

    let dataset = pipeline.build(&urls(&files)).await?;
    assert_eq!(dataset.coordinates["time"].len(), 3);
    assert_eq!(dataset.attributes.get("date"), None);
    assert_eq!(dataset.attributes.get("title"), Some(&"RASI routing".into()));
    Ok(())
}

#[tokio::test]
async fn repeated_header_index_fails_its_variable() -> anyhow::Result<()> {
    let mut files = months("RZSM", "RZSM", 2);
    let entry = IndexedChunk {
        index: ChunkIndex(vec![0, 0]),
        offset: 512,
        length: 16,
    };
    files[2].variables[0].storage = StorageLayout::Indexed {
        chunks: vec![entry.clone(), entry],
    };
    let pipeline = Pipeline::new(
        &config(""),
        InlineExecutor,
        Arc::new(DescriptorInspector::new(files.clone())),
    );

    let err = pipeline.build(&urls(&files)).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Input);
    let StewardError::InputErrors(failures) = &err else {
        panic!("expected aggregated input errors, got {err}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].task, "RZSM");
    assert!(matches!(
        failures[0].error.root(),
        StewardError::Manifest(vref::Error::UnsupportedLayout { .. })
    ));
    Ok(())
}

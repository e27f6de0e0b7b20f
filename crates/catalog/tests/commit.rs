// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use catalog::{
    CatalogError, ChunkReader, ContainerRegistry, CredentialStrategy, DEFAULT_BRANCH, Repository,
    SessionState, StaticCredentialProvider, Storage, StoreDescriptor,
};
use std::sync::Arc;
use tempfile::tempdir;
use vref::{
    AttrScope, AttrValue, AttributeSet, ChunkIndex, ChunkRef, DataType, ErrorClass, ScalarKind,
    VirtualArrayManifest, VirtualDatasetManifest,
};

const PREFIX: &str = "s3://nasa-waterinsight/RASI/ROUTING/HISTORICAL/";

fn registry() -> ContainerRegistry {
    let mut r = ContainerRegistry::new();
    r.register(PREFIX, StoreDescriptor::s3("us-west-2"), CredentialStrategy::Anonymous)
        .expect("register");
    r
}

/// `name(time)` with one 4-byte chunk per file
fn dataset(name: &str, prefix: &str, files: u64) -> VirtualDatasetManifest {
    let mut m = VirtualArrayManifest::new(
        name,
        DataType::big_endian(ScalarKind::F32),
        vec!["time".into()],
        vec![files],
        vec![1],
    )
    .expect("manifest");
    for i in 0..files {
        m.insert(ChunkRef {
            location: format!("{prefix}{name}/{name}_{}.nc", 195101 + i),
            offset: 1024 + i,
            length: 4,
            index: ChunkIndex(vec![i]),
            fingerprint: None,
        })
        .expect("insert");
    }
    let mut ds = VirtualDatasetManifest::new()
        .with_attributes(AttributeSet::new(AttrScope::Dataset).with("title", "RASI"));
    _ = ds.variables.insert(name.to_string(), m);
    ds
}

async fn repo() -> anyhow::Result<Repository> {
    Ok(Repository::open_or_create(Storage::in_memory(), registry()).await?)
}

#[tokio::test]
async fn stale_session_fails_and_retry_uses_new_head() -> anyhow::Result<()> {
    let repo = repo().await?;
    let initial = repo.branch_head(DEFAULT_BRANCH).await?;

    let mut first = repo.writable_session(DEFAULT_BRANCH).await?;
    let mut second = repo.writable_session(DEFAULT_BRANCH).await?;
    first.stage(dataset("RZSM", PREFIX, 3))?;
    second.stage(dataset("SWE", PREFIX, 3))?;

    let winner = first.commit("First Commit").await?;
    assert_eq!(first.state(), &SessionState::Committed(winner.clone()));

    let err = second.commit("Second Commit").await.unwrap_err();
    assert!(err.is_concurrent_modification());
    assert_eq!(err.class(), ErrorClass::Concurrency);
    assert_eq!(second.state(), &SessionState::Aborted);
    assert!(matches!(
        second.commit("again").await,
        Err(CatalogError::InvalidSessionState { .. })
    ));

    let head = repo.branch_head(DEFAULT_BRANCH).await?;
    assert_eq!(head.snapshot, winner);
    assert_eq!(head.sequence, initial.sequence + 1);

    let mut retry = repo.writable_session(DEFAULT_BRANCH).await?;
    assert_eq!(retry.base().snapshot, winner);
    retry.stage(dataset("SWE", PREFIX, 3))?;
    let retried = retry.commit("Second Commit").await?;

    let snapshot = repo.load_snapshot(&retried).await?;
    assert_eq!(snapshot.parent, Some(winner.clone()));
    assert_eq!(snapshot.txn_id, retry.txn_id());

    let history: Vec<String> = repo
        .ancestry(DEFAULT_BRANCH)
        .await?
        .into_iter()
        .map(|(_, s)| s.message)
        .collect();
    assert_eq!(history, vec!["Second Commit", "First Commit", "Repository initialized"]);
    Ok(())
}

#[tokio::test]
async fn racing_commits_on_one_head_have_one_winner() -> anyhow::Result<()> {
    let repo = repo().await?;
    let mut sessions = Vec::new();
    for i in 0..4 {
        let mut s = repo.writable_session(DEFAULT_BRANCH).await?;
        s.stage(dataset("RZSM", PREFIX, i + 1))?;
        sessions.push(s);
    }
    let results = futures::future::join_all(
        sessions
            .iter_mut()
            .map(|s| async move { s.commit("race").await }),
    )
    .await;

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(CatalogError::is_concurrent_modification)
    );
    assert_eq!(repo.branch_head(DEFAULT_BRANCH).await?.snapshot, *winners[0]);
    Ok(())
}

#[tokio::test]
async fn historical_snapshots_stay_readable() -> anyhow::Result<()> {
    let repo = repo().await?;

    let mut s = repo.writable_session(DEFAULT_BRANCH).await?;
    s.stage(dataset("RZSM", PREFIX, 2))?;
    let v1 = s.commit("two months").await?;

    let mut s = repo.writable_session(DEFAULT_BRANCH).await?;
    assert_eq!(s.base_dataset().await?.chunk_count(), 2);
    s.stage(dataset("RZSM", PREFIX, 3))?;
    let v2 = s.commit("three months").await?;

    let old = repo.checkout(&v1).await?;
    let new = repo.checkout(&v2).await?;
    assert_eq!(old, dataset("RZSM", PREFIX, 2));
    assert_eq!(new.variables["RZSM"].shape, vec![3]);
    assert_eq!(new.attributes.get("title"), Some(&"RASI".into()));
    Ok(())
}

#[tokio::test]
async fn uncovered_reference_aborts_without_moving_branch() -> anyhow::Result<()> {
    let repo = repo().await?;
    let before = repo.branch_head(DEFAULT_BRANCH).await?;

    let mut s = repo.writable_session(DEFAULT_BRANCH).await?;
    s.stage(dataset("RZSM", "s3://another-bucket/", 1))?;
    let err = s.commit("bad").await.unwrap_err();
    assert!(matches!(err, CatalogError::NoContainerForPrefix { .. }));
    assert_eq!(s.state(), &SessionState::Aborted);
    assert_eq!(repo.branch_head(DEFAULT_BRANCH).await?, before);
    Ok(())
}

#[tokio::test]
async fn incomplete_manifest_is_rejected_at_commit() -> anyhow::Result<()> {
    let repo = repo().await?;
    let mut ds = dataset("RZSM", PREFIX, 3);
    if let Some(m) = ds.variables.get_mut("RZSM") {
        _ = m.chunks.remove(&ChunkIndex(vec![1]));
    }
    let mut s = repo.writable_session(DEFAULT_BRANCH).await?;
    s.stage(ds)?;
    let err = s.commit("gap").await.unwrap_err();
    assert!(matches!(
        err,
        CatalogError::Manifest(vref::Error::IncompleteManifest { .. })
    ));
    assert_eq!(err.class(), ErrorClass::Consistency);
    Ok(())
}

#[tokio::test]
async fn session_preconditions() -> anyhow::Result<()> {
    let repo = repo().await?;
    let mut s = repo.writable_session(DEFAULT_BRANCH).await?;
    assert!(matches!(s.commit("empty").await, Err(CatalogError::NothingStaged)));
    assert_eq!(s.state(), &SessionState::Open);

    s.stage(dataset("RZSM", PREFIX, 1))?;
    _ = s.commit("ok").await?;
    assert!(matches!(
        s.stage(dataset("RZSM", PREFIX, 1)),
        Err(CatalogError::InvalidSessionState { .. })
    ));

    assert!(matches!(
        repo.writable_session("nope").await,
        Err(CatalogError::BranchNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn branches_fork_from_any_snapshot() -> anyhow::Result<()> {
    let repo = repo().await?;
    let root = repo.branch_head(DEFAULT_BRANCH).await?.snapshot;

    let mut s = repo.writable_session(DEFAULT_BRANCH).await?;
    s.stage(dataset("RZSM", PREFIX, 1))?;
    _ = s.commit("on main").await?;

    _ = repo.create_branch("SSP245", &root).await?;
    assert!(matches!(
        repo.create_branch("SSP245", &root).await,
        Err(CatalogError::BranchExists(_))
    ));
    assert_eq!(repo.list_branches().await?, vec!["SSP245", "main"]);

    let mut s = repo.writable_session("SSP245").await?;
    s.stage(dataset("SWE", PREFIX, 2))?;
    let id = s.commit("on SSP245").await?;
    assert_eq!(repo.load_snapshot(&id).await?.parent, Some(root));
    assert_eq!(repo.ancestry("SSP245").await?.len(), 2);
    assert_eq!(repo.ancestry(DEFAULT_BRANCH).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn local_repository_survives_reopen() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let committed = {
        let repo = Repository::open_or_create(Storage::local(dir.path())?, registry()).await?;
        let mut s = repo.writable_session(DEFAULT_BRANCH).await?;
        s.stage(dataset("RZSM", PREFIX, 3))?;
        s.commit("First Commit").await?
    };

    let repo = Repository::open(Storage::local(dir.path())?).await?;
    assert_eq!(repo.registry(), &registry());
    assert_eq!(repo.branch_head(DEFAULT_BRANCH).await?.snapshot, committed);
    assert_eq!(repo.checkout(&committed).await?, dataset("RZSM", PREFIX, 3));

    // an empty registry keeps the stored configuration
    let again = Repository::open_or_create(Storage::local(dir.path())?, ContainerRegistry::new()).await?;
    assert_eq!(again.registry(), &registry());
    assert_eq!(again.ancestry(DEFAULT_BRANCH).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn committed_references_read_back_exact_ranges() -> anyhow::Result<()> {
    let sources = tempdir()?;
    let payload: Vec<u8> = (0..64u8).collect();
    let file = sources.path().join("RZSM_195101.nc");
    std::fs::write(&file, &payload)?;
    let location = url::Url::from_file_path(&file)
        .map_err(|()| anyhow::anyhow!("bad path"))?
        .to_string();
    let prefix = url::Url::from_directory_path(sources.path())
        .map_err(|()| anyhow::anyhow!("bad path"))?
        .to_string();

    let mut containers = ContainerRegistry::new();
    containers.register(&prefix, StoreDescriptor::LocalFileSystem, CredentialStrategy::Anonymous)?;
    let repo = Repository::open_or_create(Storage::in_memory(), containers).await?;

    let mut m = VirtualArrayManifest::new(
        "RZSM",
        DataType::big_endian(ScalarKind::F32),
        vec!["lat".into()],
        vec![8],
        vec![2],
    )?;
    for i in 0..4u64 {
        m.insert(ChunkRef {
            location: location.clone(),
            offset: 16 + i * 8,
            length: 8,
            index: ChunkIndex(vec![i]),
            fingerprint: None,
        })?;
    }
    let mut ds = VirtualDatasetManifest::new();
    _ = ds.variables.insert("RZSM".into(), m.clone());

    let mut s = repo.writable_session(DEFAULT_BRANCH).await?;
    s.stage(ds)?;
    let id = s.commit("local refs").await?;

    let committed = repo.checkout(&id).await?;
    let snapshot = repo.load_snapshot(&id).await?;
    let reader = ChunkReader::new(
        ContainerRegistry::try_from(snapshot.containers)?,
        Arc::new(StaticCredentialProvider::new()),
    );
    for (index, chunk) in &committed.variables["RZSM"].chunks {
        let original = &m.chunks[index];
        let resolved = reader.locate(chunk)?;
        assert_eq!(resolved.range, original.offset..original.offset + original.length);
        assert_eq!(resolved.container, prefix);
        assert_eq!(
            resolved.path.as_ref(),
            file.to_string_lossy().trim_start_matches('/')
        );

        let bytes = reader.read(chunk).await?;
        let start = original.offset as usize;
        assert_eq!(bytes.as_ref(), &payload[start..start + original.length as usize]);
    }
    Ok(())
}

#[tokio::test]
async fn non_finite_attributes_read_back() -> anyhow::Result<()> {
    let repo = repo().await?;
    let mut ds = dataset("RZSM", PREFIX, 3);
    if let Some(v) = ds.variables.get_mut("RZSM") {
        _ = v.attributes.insert("_FillValue", f64::NAN);
        _ = v
            .attributes
            .insert("valid_range", AttrValue::FloatList(vec![0.0, f64::INFINITY]));
    }
    _ = ds.attributes.insert("missing_value", f64::NEG_INFINITY);

    let mut s = repo.writable_session(DEFAULT_BRANCH).await?;
    s.stage(ds.clone())?;
    let id = s.commit("fill values").await?;

    let snapshot = repo.load_snapshot(&id).await?;
    assert_eq!(snapshot.id()?, id);
    let back = repo.checkout(&id).await?;
    assert_eq!(back.attributes, ds.attributes);
    assert_eq!(
        back.variables["RZSM"].attributes.get("_FillValue"),
        Some(&AttrValue::Float(f64::NAN))
    );
    assert_eq!(
        back.variables["RZSM"].attributes,
        ds.variables["RZSM"].attributes
    );
    assert_eq!(repo.ancestry(DEFAULT_BRANCH).await?.len(), 2);
    Ok(())
}

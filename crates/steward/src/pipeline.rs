// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! One assembly run: list, fan out per file, reduce per variable, merge,
//! commit.

use crate::cache::{NoTransientCache, ScratchDirectory, TransientCache};
use crate::config::{Ordering, PipelineConfig};
use crate::executor::{Executor, TaskFuture, join_fail_fast};
use crate::retry::commit_with_retry;
use crate::sources::{SourceInspector, SourceLister};
use crate::{Result, StewardError, TaskFailure};
use catalog::{Repository, SnapshotId};
use futures::FutureExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use vref::{
    AttributeSet, ChunkRefResolver, CoordinateDeriver, CoordinateValue, ErrorClass, ManifestMerger,
    SourceFile, VariableLayout, VirtualArrayManifest, VirtualDatasetManifest,
};

/// What a committed run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub snapshot: SnapshotId,
    pub dataset: VirtualDatasetManifest,
    pub sources: usize,
}

/// One file's contribution to one variable
#[derive(Debug)]
struct FileContribution {
    manifest: VirtualArrayManifest,
    coordinate: CoordinateValue,
    attributes: AttributeSet,
}

#[derive(Debug)]
pub struct Pipeline<E: Executor> {
    config: PipelineConfig,
    executor: E,
    inspector: Arc<dyn SourceInspector>,
    cache: Arc<dyn TransientCache>,
    merger: ManifestMerger,
    deriver: CoordinateDeriver,
}

impl<E: Executor> Pipeline<E> {
    pub fn new(config: &PipelineConfig, executor: E, inspector: Arc<dyn SourceInspector>) -> Self {
        let cache: Arc<dyn TransientCache> = match &config.scratch_dir {
            Some(dir) => Arc::new(ScratchDirectory::new(dir.clone())),
            None => Arc::new(NoTransientCache),
        };
        Self {
            config: config.clone(),
            executor,
            inspector,
            cache,
            merger: config.merger(),
            deriver: config.deriver(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn TransientCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// List sources, build the dataset and commit it.
    pub async fn run(&self, repo: &Repository, lister: &dyn SourceLister) -> Result<RunReport> {
        let urls = lister.list().await?;
        let sources = urls.len();
        let dataset = self.build(&urls).await?;
        let snapshot = commit_with_retry(
            repo,
            &self.config.branch,
            &self.config.message,
            &dataset,
            &self.config.commit,
        )
        .await?;
        Ok(RunReport {
            snapshot,
            dataset,
            sources,
        })
    }

    /// Assemble the virtual dataset for `urls` without committing it.
    ///
    /// Input failures from every variable are gathered and returned
    /// together. A consistency failure ends the build at once.
    pub async fn build(&self, urls: &[String]) -> Result<VirtualDatasetManifest> {
        if urls.is_empty() {
            return Err(StewardError::NoSources);
        }

        let mut failures = Vec::new();
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for url in urls {
            match self.config.naming.rule.expected_name(url) {
                Ok(name) => groups.entry(name).or_default().push(url.clone()),
                Err(e) => failures.push(TaskFailure {
                    task: url.clone(),
                    error: e.into(),
                }),
            }
        }

        let mut variables = BTreeMap::new();
        let mut file_attributes = Vec::new();
        for (name, mut group) in groups {
            self.cache.reset()?;
            group.sort();
            group.dedup();
            match self.build_variable(&name, &group).await {
                Ok((manifest, attributes)) => {
                    _ = variables.insert(name, manifest);
                    file_attributes.extend(attributes);
                }
                Err(e) if e.class() == ErrorClass::Input => {
                    failures.push(TaskFailure { task: name, error: e });
                }
                Err(e) => return Err(e),
            }
        }
        if !failures.is_empty() {
            let count = failures.len();
            diagnostics::warn!("{count} input error(s) in build", count: count);
            return Err(StewardError::InputErrors(failures));
        }

        let mut dataset = self.merger.merge_variables(variables)?;
        dataset.attributes = self.merger.dataset_attributes(&file_attributes)?;
        Ok(dataset)
    }

    async fn build_variable(
        &self,
        name: &str,
        urls: &[String],
    ) -> Result<(VirtualArrayManifest, Vec<AttributeSet>)> {
        let handles: Vec<_> = urls
            .iter()
            .map(|url| self.executor.submit(url, self.file_task(name, url)))
            .collect();
        let mut contributions = join_fail_fast(handles).await?;

        if self.config.ordering == Ordering::ByCoordinate {
            let mut comparable = true;
            contributions.sort_by(|a, b| {
                a.coordinate
                    .partial_order(&b.coordinate)
                    .unwrap_or_else(|| {
                        comparable = false;
                        std::cmp::Ordering::Equal
                    })
            });
            if !comparable {
                return Err(vref::Error::MixedCoordinateTypes {
                    axis: self.deriver.introduces().to_string(),
                }
                .into());
            }
        }

        let mut manifests = Vec::with_capacity(contributions.len());
        let mut values = Vec::with_capacity(contributions.len());
        let mut attributes = Vec::with_capacity(contributions.len());
        for c in contributions {
            manifests.push(c.manifest);
            values.push(c.coordinate);
            attributes.push(c.attributes);
        }

        let merged = self
            .deriver
            .axis(values)
            .and_then(|axis| self.merger.concat_along_new_axis(&manifests, &axis))
            .map_err(|e| StewardError::from(e).in_task(name))?;
        Ok((merged, attributes))
    }

    fn file_task(&self, expected: &str, url: &str) -> TaskFuture<FileContribution> {
        let inspector = self.inspector.clone();
        let deriver = self.deriver.clone();
        let expected = expected.to_string();
        let url = url.to_string();
        async move {
            let source = inspector.inspect(&url).await?;
            let layout = select_layout(&source, &expected)?;
            let manifest = ChunkRefResolver::new().resolve(&source, layout)?;
            let coordinate = deriver.derive_from(&source)?;
            Ok::<_, StewardError>(FileContribution {
                manifest: deriver.expand(&manifest)?,
                coordinate,
                attributes: deriver.retained_attributes(&source),
            })
        }
        .boxed()
    }
}

/// The data variable a file contributes under `expected`.
///
/// A differently cased or sole data variable is still returned so that
/// the merger can apply the case policy and report the mismatch.
fn select_layout<'a>(source: &'a SourceFile, expected: &str) -> Result<&'a VariableLayout> {
    let data: Vec<&VariableLayout> = source.data_variables().collect();
    data.iter()
        .copied()
        .find(|v| v.name == expected)
        .or_else(|| data.iter().copied().find(|v| v.name.eq_ignore_ascii_case(expected)))
        .or(match data.as_slice() {
            [only] => Some(*only),
            _ => None,
        })
        .ok_or_else(|| StewardError::VariableNotFound {
            url: source.url.clone(),
            expected: expected.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vref::{AttrScope, DataType, ScalarKind, StorageLayout};

    fn layout(name: &str) -> VariableLayout {
        VariableLayout {
            name: name.to_string(),
            dtype: DataType::big_endian(ScalarKind::F32),
            dims: vec!["lat".into()],
            shape: vec![2],
            chunk_shape: vec![2],
            storage: StorageLayout::Contiguous { offset: 0 },
            attributes: AttributeSet::new(AttrScope::Variable),
        }
    }

    fn file(vars: &[&str]) -> SourceFile {
        SourceFile {
            url: "s3://b/percentile/p.nc".into(),
            byte_length: 64,
            fingerprint: None,
            attributes: AttributeSet::default(),
            variables: vars.iter().map(|v| layout(v)).collect(),
            loaded: BTreeMap::new(),
        }
    }

    #[test]
    fn test_select_layout() {
        let f = file(&["Percentile", "RZSM"]);
        // the differently cased variable goes on to the merger's case check
        assert_eq!(select_layout(&f, "percentile").unwrap().name, "Percentile");
        assert_eq!(select_layout(&f, "RZSM").unwrap().name, "RZSM");
        assert_eq!(select_layout(&file(&["SWE"]), "swe_v2").unwrap().name, "SWE");
        assert!(matches!(
            select_layout(&f, "SWE"),
            Err(StewardError::VariableNotFound { .. })
        ));
    }
}

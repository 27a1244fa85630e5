// ============================================================================
// reframe-core/src/pipeline.rs
// ============================================================================
//
// PIPELINE: Per-Item Normalization and the Batch Driver
//
// Wires the components together for one media item:
//
//   extractor -> planner -> filter graph -> encoder choice -> engine
//
// and runs many items on a bounded rayon pool. Per-item failures never abort
// a batch; they are counted and reported alongside the successes.
//
// The `Normalizer` owns its components. It is built either from a
// `CoreConfig` (real tools) or from explicitly supplied components (tests,
// custom runners).

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CoreConfig;
use crate::encoding::{
    CancellationToken, EncoderChoice, EncoderSelector, EncoderTier, ExecutionEngine, ExecutionJob,
    ExecutionOutcome,
};
use crate::error::{CoreError, CoreResult};
use crate::external::{FfmpegSpawner, SidecarSpawner, SystemCommandRunner};
use crate::media::{MediaKind, MetadataCache, MetadataExtractor};
use crate::transform::{FilterGraphBuilder, TransformPlan, TransformPlanner};
use crate::utils::{format_duration, get_filename_safe};

/// Container extension for normalized video output.
pub const VIDEO_OUTPUT_EXTENSION: &str = "mp4";

/// What happened to one item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus {
    /// Written to `output` by the given tier.
    Normalized {
        output: PathBuf,
        tier: EncoderTier,
        encoder: String,
        bytes: u64,
    },
    /// Already matches the target; nothing written.
    Unchanged,
    Failed {
        reason: String,
    },
    /// Unsupported or unusable input.
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemReport {
    pub source: PathBuf,
    pub status: ItemStatus,
    pub elapsed: Duration,
}

/// Aggregate result of `Normalizer::process_batch`.
///
/// `processed` counts both normalized and unchanged items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub items: Vec<ItemReport>,
}

impl BatchSummary {
    fn from_items(items: Vec<ItemReport>) -> Self {
        let mut summary = BatchSummary::default();
        for item in &items {
            match item.status {
                ItemStatus::Normalized { .. } | ItemStatus::Unchanged => summary.processed += 1,
                ItemStatus::Failed { .. } => summary.failed += 1,
                ItemStatus::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary.items = items;
        summary
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Successful result of `Normalizer::process_file`.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeOutcome {
    Normalized(ExecutionOutcome),
    Unchanged { plan: TransformPlan },
}

/// Output path for `source` inside `output_dir`.
///
/// Video is always written as `.mp4`; images keep their extension.
pub fn output_path_for(source: &Path, output_dir: &Path, kind: MediaKind) -> CoreResult<PathBuf> {
    let file_name = match kind {
        MediaKind::Video => {
            let stem = source.file_stem().ok_or_else(|| {
                CoreError::PathError(format!("Failed to get filename stem for {}", source.display()))
            })?;
            let mut name = stem.to_os_string();
            name.push(".");
            name.push(VIDEO_OUTPUT_EXTENSION);
            name
        }
        MediaKind::Image => source
            .file_name()
            .ok_or_else(|| {
                CoreError::PathError(format!("Failed to get filename for {}", source.display()))
            })?
            .to_os_string(),
    };
    Ok(output_dir.join(file_name))
}

/// Composition of the normalization components.
pub struct Normalizer<S: FfmpegSpawner = SidecarSpawner> {
    config: CoreConfig,
    cache: Arc<MetadataCache>,
    extractor: MetadataExtractor,
    planner: TransformPlanner,
    filters: FilterGraphBuilder,
    selector: EncoderSelector,
    engine: ExecutionEngine<S>,
}

impl Normalizer<SidecarSpawner> {
    /// Builds a normalizer that runs the configured tools.
    ///
    /// # Errors
    ///
    /// `CoreError::Config` if `config` fails validation.
    pub fn from_config(config: CoreConfig) -> CoreResult<Self> {
        config.validate()?;

        let cache = Arc::new(MetadataCache::with_ttl(config.cache_ttl));
        let runner = Arc::new(SystemCommandRunner);
        let extractor = MetadataExtractor::new(Arc::clone(&cache), runner.clone(), &config);
        let selector = EncoderSelector::new(
            runner,
            config.ffmpeg_path.clone(),
            config.availability_timeout,
            config.probe_timeout,
        )
        .with_hardware(config.enable_hardware);
        let engine = ExecutionEngine::new(
            SidecarSpawner,
            config.ffmpeg_path.clone(),
            config.encoding.clone(),
        )
        .with_timeout_factor(config.transcode_timeout_factor);

        Ok(Self::with_components(config, extractor, selector, engine))
    }
}

impl<S: FfmpegSpawner> Normalizer<S> {
    /// Assembles a normalizer from prebuilt components. The extractor's
    /// cache also receives post-transform write-backs.
    pub fn with_components(
        config: CoreConfig,
        extractor: MetadataExtractor,
        selector: EncoderSelector,
        engine: ExecutionEngine<S>,
    ) -> Self {
        Self {
            planner: TransformPlanner::new(config.planner_options()),
            filters: FilterGraphBuilder::new(),
            cache: Arc::clone(extractor.cache()),
            config,
            extractor,
            selector,
            engine,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    pub fn extractor(&self) -> &MetadataExtractor {
        &self.extractor
    }

    pub fn selector(&self) -> &EncoderSelector {
        &self.selector
    }

    pub fn engine(&self) -> &ExecutionEngine<S> {
        &self.engine
    }

    /// Normalizes one file into `output_dir`.
    ///
    /// # Errors
    ///
    /// * `CoreError::InvalidInput` for unsupported files or an output path
    ///   that already exists
    /// * `CoreError::NotFound` if `source` does not exist
    /// * `CoreError::MetadataUnavailable` if no backend could read `source`
    /// * `CoreError::AllTiersFailed` / `CoreError::Cancelled` from the engine
    pub fn process_file(
        &self,
        source: &Path,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> CoreResult<NormalizeOutcome> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let kind = MediaKind::from_path(source).ok_or_else(|| {
            CoreError::InvalidInput(format!("unsupported media type: {}", source.display()))
        })?;
        let filename = get_filename_safe(source)?;

        let metadata = self
            .extractor
            .get_basic_metadata(source)?
            .ok_or_else(|reason| CoreError::MetadataUnavailable {
                path: source.to_path_buf(),
                reason,
            })?;
        if metadata.has_unknown_dimensions() {
            return Err(CoreError::MetadataUnavailable {
                path: source.to_path_buf(),
                reason: "stream dimensions are unknown".to_string(),
            });
        }

        let plan = self.planner.plan(&metadata, &self.config.target);
        if !plan.needs_processing() {
            log::info!("{} already matches the target profile", filename);
            return Ok(NormalizeOutcome::Unchanged { plan });
        }
        log::info!(
            "{}: rotate={} scale={} pad={} encode={} -> {}x{}",
            filename,
            plan.needs_rotation,
            plan.needs_scaling,
            plan.needs_padding,
            plan.needs_encoding,
            plan.target_width,
            plan.target_height
        );

        let output = output_path_for(source, output_dir, kind)?;
        if output == source {
            return Err(CoreError::InvalidInput(format!(
                "output would overwrite source: {}",
                source.display()
            )));
        }
        if output.exists() {
            return Err(CoreError::InvalidInput(format!(
                "output file already exists: {}",
                output.display()
            )));
        }

        let filters = self.filters.build(&metadata, &plan);
        let hardware = if kind == MediaKind::Video && self.config.enable_hardware {
            self.selector
                .get_optimal(self.config.preferred_vendor)
                .hardware()
        } else {
            None
        };
        let choice = EncoderChoice::for_plan(&plan, &metadata.codec, hardware, &self.config.encoding);

        let job = ExecutionJob {
            source,
            output: &output,
            metadata: &metadata,
            plan: &plan,
            filters: &filters,
            choice: &choice,
        };
        let outcome = self.engine.execute(&job, cancel, Some(self.cache.as_ref()))?;
        Ok(NormalizeOutcome::Normalized(outcome))
    }

    /// Processes `files` on a pool of `parallel_jobs` workers.
    ///
    /// Only pool construction can fail; per-item errors are reported in
    /// the summary.
    pub fn process_batch(
        &self,
        files: &[PathBuf],
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> CoreResult<BatchSummary> {
        let jobs = self.config.parallel_jobs.max(1).min(files.len().max(1));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|index| format!("reframe-worker-{index}"))
            .build()
            .map_err(|e| CoreError::ThreadPool(format!("Failed to initialize thread pool: {e}")))?;

        log::info!(
            "Processing {} file(s) with {} worker(s) into {}",
            files.len(),
            jobs,
            output_dir.display()
        );
        let batch_start = Instant::now();

        let items: Vec<ItemReport> = pool.install(|| {
            files
                .par_iter()
                .map(|source| self.process_item(source, output_dir, cancel))
                .collect()
        });

        let summary = BatchSummary::from_items(items);
        log::info!(
            "Batch finished in {}: {} processed, {} failed, {} skipped",
            format_duration(batch_start.elapsed().as_secs_f64()),
            summary.processed,
            summary.failed,
            summary.skipped
        );
        Ok(summary)
    }

    fn process_item(&self, source: &Path, output_dir: &Path, cancel: &CancellationToken) -> ItemReport {
        let start = Instant::now();
        let status = match self.process_file(source, output_dir, cancel) {
            Ok(NormalizeOutcome::Normalized(outcome)) => ItemStatus::Normalized {
                output: outcome.output_path,
                tier: outcome.tier,
                encoder: outcome.encoder,
                bytes: outcome.output_bytes,
            },
            Ok(NormalizeOutcome::Unchanged { .. }) => ItemStatus::Unchanged,
            Err(e) if e.is_skip() => {
                log::warn!("Skipping {}: {}", source.display(), e);
                ItemStatus::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                log::error!("Failed to process {}: {}", source.display(), e);
                ItemStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };
        ItemReport {
            source: source.to_path_buf(),
            status,
            elapsed: start.elapsed(),
        }
    }
}

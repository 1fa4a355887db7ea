//! Per-AOI batch orchestration.
//!
//! Joins the two collections, then fans the independent per-scene work out
//! over a worker pool. A scene that fails its preconditions is reported as
//! skipped with a reason instead of aborting the batch; the caller gets one
//! aggregated report per AOI.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::components::remove_small_components;
use crate::core::join::CollectionJoiner;
use crate::core::mask::{CloudShadowMaskParams, MaskSynthesizer};
use crate::io::source::{SceneSource, TimeWindow};
use crate::types::{AreaOfInterest, MaskError, MaskResult, MaskedScene, SceneRecord};

/// Bands a combined record must carry before mask synthesis
pub const REQUIRED_BANDS: [&str; 6] = ["B2", "B3", "B4", "B8", "SCL", "probability"];

/// Batch processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Mask synthesis parameters
    pub mask_params: CloudShadowMaskParams,
    /// Minimum connected-component size kept in the final masks
    pub min_component_size: usize,
    /// Worker pool size; `None` uses the global rayon pool. Bounding this
    /// keeps concurrent load within downstream rate limits.
    pub concurrency: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mask_params: CloudShadowMaskParams::default(),
            min_component_size: 10,
            concurrency: None,
        }
    }
}

/// Terminal state of one scene in a batch
#[derive(Debug)]
pub enum SceneStatus {
    /// Masks synthesized and filtered
    Completed(MaskedScene),
    /// Scene left out of the batch output
    Skipped { reason: String },
}

/// Per-scene batch entry
#[derive(Debug)]
pub struct SceneOutcome {
    pub scene_id: String,
    pub status: SceneStatus,
}

/// Aggregated result of one AOI's batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<SceneOutcome>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn completed(&self) -> impl Iterator<Item = &MaskedScene> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            SceneStatus::Completed(scene) => Some(scene),
            SceneStatus::Skipped { .. } => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            SceneStatus::Completed(_) => None,
            SceneStatus::Skipped { reason } => Some((o.scene_id.as_str(), reason.as_str())),
        })
    }

    pub fn completed_count(&self) -> usize {
        self.completed().count()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped().count()
    }
}

/// Mask synthesis batch pipeline
pub struct MaskPipeline {
    config: PipelineConfig,
}

impl Default for MaskPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskPipeline {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Join the two collections and process every combined scene.
    ///
    /// Zero joined scenes yields an empty, valid report.
    pub fn process_collections(
        &self,
        primary: &[SceneRecord],
        secondary: &[SceneRecord],
    ) -> MaskResult<BatchReport> {
        self.validate_config()?;

        let combined = CollectionJoiner::new().join(primary, secondary)?;
        if combined.is_empty() {
            log::info!("No joined scenes for this AOI/time window, nothing to process");
            return Ok(BatchReport::default());
        }

        let outcomes = match self.config.concurrency {
            Some(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| MaskError::Processing(e.to_string()))?;
                pool.install(|| self.process_scenes(&combined))
            }
            None => self.process_scenes(&combined),
        };

        let report = BatchReport { outcomes };
        log::info!(
            "Batch finished: {} completed, {} skipped",
            report.completed_count(),
            report.skipped_count()
        );
        Ok(report)
    }

    /// Query a [`SceneSource`] for an AOI and time window, then process
    /// the returned collections.
    pub fn process_source<S: SceneSource>(
        &self,
        source: &S,
        aoi: &AreaOfInterest,
        window: &TimeWindow,
    ) -> MaskResult<BatchReport> {
        let primary = source.reflectance_scenes(aoi, window)?;
        let secondary = source.cloud_probability_scenes(aoi, window)?;
        log::info!(
            "Acquired {} reflectance and {} cloud-probability scenes",
            primary.len(),
            secondary.len()
        );
        self.process_collections(&primary, &secondary)
    }

    fn validate_config(&self) -> MaskResult<()> {
        self.config.mask_params.validate()?;
        if self.config.min_component_size == 0 {
            return Err(MaskError::InvalidParameter(
                "min_component_size must be positive".to_string(),
            ));
        }
        if self.config.concurrency == Some(0) {
            return Err(MaskError::InvalidParameter(
                "concurrency must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    fn process_scenes(&self, records: &[SceneRecord]) -> Vec<SceneOutcome> {
        records
            .par_iter()
            .map(|record| self.process_scene(record))
            .collect()
    }

    /// Synthesize and filter the masks for one combined scene. Failures
    /// become skip-with-reason outcomes so one bad scene cannot abort the
    /// AOI batch.
    fn process_scene(&self, record: &SceneRecord) -> SceneOutcome {
        let scene_id = record.scene_id().to_string();

        for band in REQUIRED_BANDS {
            if !record.has_band(band) {
                log::warn!("Skipping scene {}: missing band {}", scene_id, band);
                return SceneOutcome {
                    scene_id,
                    status: SceneStatus::Skipped {
                        reason: format!("missing band {}", band),
                    },
                };
            }
        }

        let synthesizer = MaskSynthesizer::with_params(self.config.mask_params.clone());
        let result = synthesizer.synthesize(record).and_then(|masks| {
            let cloud_mask =
                remove_small_components(&masks.cloud_mask, self.config.min_component_size)?;
            let shadow_mask =
                remove_small_components(&masks.shadow_mask, self.config.min_component_size)?;
            Ok(MaskedScene {
                record: record.clone(),
                cloud_mask,
                shadow_mask,
            })
        });

        match result {
            Ok(scene) => SceneOutcome {
                scene_id,
                status: SceneStatus::Completed(scene),
            },
            Err(e) => {
                log::warn!("Skipping scene {}: {}", scene_id, e);
                SceneOutcome {
                    scene_id,
                    status: SceneStatus::Skipped {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }
}

//! Cloud and shadow mask synthesis for Sentinel-2 scenes.
//!
//! Combines three noisy signals into binary masks: the scene classification
//! layer (SCL), the external cloud-probability band, and near-infrared
//! brightness. NIR gates suppress bright-surface false positives (sand
//! classified as cloud) and a water exclusion keeps naturally dark water
//! out of the shadow mask.

use serde::{Deserialize, Serialize};

use crate::core::morphology::{opening, MorphologyParams};
use crate::types::{BandGrid, MaskError, MaskGrid, MaskResult, SceneRecord};

/// Digital-count divisor converting B8 to approximate surface reflectance
pub const REFLECTANCE_SCALE: f32 = 10_000.0;

/// Mask synthesis parameters.
///
/// The SCL code lists are domain-tuned defaults for the current sensor
/// generation, kept configurable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudShadowMaskParams {
    /// Cloud-probability band threshold (0-100, exclusive)
    pub cloud_prob_threshold: f32,
    /// NIR reflectance below which a pixel counts as dark (shadow rule)
    pub nir_threshold: f32,
    /// NIR reflectance above which a pixel counts as bright (cloud gate)
    pub cloud_nir_threshold: f32,
    /// Opening applied to both raw masks
    pub morphology: MorphologyParams,
    /// SCL codes treated as cloud (medium/high probability, cirrus, snow)
    pub cloud_scl_codes: Vec<u8>,
    /// SCL codes excluded from the probability rule (bare soil/rock)
    pub soil_scl_codes: Vec<u8>,
    /// SCL code for cloud shadow
    pub shadow_scl_code: u8,
    /// SCL code for water, excluded from the darkness rule
    pub water_scl_code: u8,
}

impl Default for CloudShadowMaskParams {
    fn default() -> Self {
        Self {
            cloud_prob_threshold: 50.0,
            nir_threshold: 0.2,
            cloud_nir_threshold: 0.3,
            morphology: MorphologyParams::default(),
            cloud_scl_codes: vec![8, 9, 10, 11],
            soil_scl_codes: vec![5, 7],
            shadow_scl_code: 3,
            water_scl_code: 6,
        }
    }
}

impl CloudShadowMaskParams {
    pub fn validate(&self) -> MaskResult<()> {
        if !(0.0..=100.0).contains(&self.cloud_prob_threshold) {
            return Err(MaskError::InvalidParameter(format!(
                "cloud_prob_threshold must be in [0, 100], got {}",
                self.cloud_prob_threshold
            )));
        }
        if !self.nir_threshold.is_finite() || !self.cloud_nir_threshold.is_finite() {
            return Err(MaskError::InvalidParameter(
                "NIR thresholds must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Raw synthesis output, pixel-aligned with the input bands
#[derive(Debug, Clone)]
pub struct CloudShadowMasks {
    pub cloud_mask: MaskGrid,
    pub shadow_mask: MaskGrid,
}

/// Rule-based cloud/shadow mask synthesizer
pub struct MaskSynthesizer {
    params: CloudShadowMaskParams,
}

impl Default for MaskSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskSynthesizer {
    /// Create a synthesizer with default parameters
    pub fn new() -> Self {
        Self {
            params: CloudShadowMaskParams::default(),
        }
    }

    pub fn with_params(params: CloudShadowMaskParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &CloudShadowMaskParams {
        &self.params
    }

    /// Synthesize cloud and shadow masks for a combined scene record.
    ///
    /// Requires the `SCL`, `probability` and `B8` bands; a missing band is
    /// a precondition violation, not a recoverable case.
    pub fn synthesize(&self, scene: &SceneRecord) -> MaskResult<CloudShadowMasks> {
        let scl = scene.band("SCL")?;
        let probability = scene.band("probability")?;
        let b8 = scene.band("B8")?;
        log::info!(
            "Synthesizing cloud/shadow masks for scene {}",
            scene.scene_id()
        );
        self.synthesize_from_bands(scl, probability, b8)
    }

    /// Band-level synthesis entry point.
    ///
    /// Cloud = (SCL in cloud codes AND bright NIR)
    ///      OR (probability above threshold AND bright NIR AND not soil).
    /// Shadow = (SCL is cloud shadow) OR (dark NIR AND not water).
    /// Both raw masks are refined by morphological opening.
    pub fn synthesize_from_bands(
        &self,
        scl: &BandGrid,
        probability: &BandGrid,
        b8: &BandGrid,
    ) -> MaskResult<CloudShadowMasks> {
        self.params.validate()?;

        let shape = scl.dim();
        for (name, band) in [("probability", probability), ("B8", b8)] {
            if band.dim() != shape {
                return Err(MaskError::ShapeMismatch {
                    band: name.to_string(),
                    expected: shape,
                    actual: band.dim(),
                });
            }
        }
        log::debug!("Mask parameters: {:?}", self.params);

        let (rows, cols) = shape;
        let mut cloud_raw = MaskGrid::zeros(shape);
        let mut shadow_raw = MaskGrid::zeros(shape);

        for row in 0..rows {
            for col in 0..cols {
                // SCL stores integer codes in a float band
                let code = scl[[row, col]].round() as i16;
                let nir = b8[[row, col]] / REFLECTANCE_SCALE;
                let prob = probability[[row, col]];
                let bright = nir > self.params.cloud_nir_threshold;

                let cloud_scl = bright
                    && self
                        .params
                        .cloud_scl_codes
                        .iter()
                        .any(|&k| code == k as i16);
                let cloud_prob = prob > self.params.cloud_prob_threshold
                    && bright
                    && !self
                        .params
                        .soil_scl_codes
                        .iter()
                        .any(|&k| code == k as i16);
                if cloud_scl || cloud_prob {
                    cloud_raw[[row, col]] = 1;
                }

                let shadow_scl = code == self.params.shadow_scl_code as i16;
                let shadow_dark = nir < self.params.nir_threshold
                    && code != self.params.water_scl_code as i16;
                if shadow_scl || shadow_dark {
                    shadow_raw[[row, col]] = 1;
                }
            }
        }

        let cloud_mask = opening(&cloud_raw, &self.params.morphology);
        let shadow_mask = opening(&shadow_raw, &self.params.morphology);

        log::debug!(
            "Raw cloud {} px -> refined {} px; raw shadow {} px -> refined {} px",
            cloud_raw.iter().filter(|&&v| v != 0).count(),
            cloud_mask.iter().filter(|&&v| v != 0).count(),
            shadow_raw.iter().filter(|&&v| v != 0).count(),
            shadow_mask.iter().filter(|&&v| v != 0).count()
        );

        Ok(CloudShadowMasks {
            cloud_mask,
            shadow_mask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::morphology::KernelShape;

    /// Params with refinement disabled so single-pixel rules are visible
    fn raw_params() -> CloudShadowMaskParams {
        CloudShadowMaskParams {
            morphology: MorphologyParams {
                radius: 0,
                kernel: KernelShape::Square,
            },
            ..CloudShadowMaskParams::default()
        }
    }

    fn uniform_bands(scl: f32, prob: f32, b8: f32) -> (BandGrid, BandGrid, BandGrid) {
        (
            BandGrid::from_elem((4, 4), scl),
            BandGrid::from_elem((4, 4), prob),
            BandGrid::from_elem((4, 4), b8),
        )
    }

    #[test]
    fn test_high_proba_class_with_bright_nir_is_cloud() {
        // SCL 9 (cloud high probability), nir = 0.35
        let (scl, prob, b8) = uniform_bands(9.0, 0.0, 3500.0);
        let masks = MaskSynthesizer::with_params(raw_params())
            .synthesize_from_bands(&scl, &prob, &b8)
            .unwrap();
        assert_eq!(masks.cloud_mask[[2, 2]], 1);
    }

    #[test]
    fn test_dark_cloud_class_not_cloud() {
        // Cloud class but nir below the brightness gate
        let (scl, prob, b8) = uniform_bands(9.0, 0.0, 2500.0);
        let masks = MaskSynthesizer::with_params(raw_params())
            .synthesize_from_bands(&scl, &prob, &b8)
            .unwrap();
        assert_eq!(masks.cloud_mask.sum(), 0);
    }

    #[test]
    fn test_bare_soil_guard_beats_probability() {
        // SCL 5 (bare soil), probability 70, nir 0.4: the soil exclusion
        // wins despite high probability and brightness
        let (scl, prob, b8) = uniform_bands(5.0, 70.0, 4000.0);
        let masks = MaskSynthesizer::with_params(raw_params())
            .synthesize_from_bands(&scl, &prob, &b8)
            .unwrap();
        assert_eq!(masks.cloud_mask.sum(), 0);
    }

    #[test]
    fn test_probability_rule_fires_off_soil() {
        // Vegetation class (4), probability 70, bright
        let (scl, prob, b8) = uniform_bands(4.0, 70.0, 4000.0);
        let masks = MaskSynthesizer::with_params(raw_params())
            .synthesize_from_bands(&scl, &prob, &b8)
            .unwrap();
        assert_eq!(masks.cloud_mask[[0, 0]], 1);
    }

    #[test]
    fn test_water_not_shadow() {
        // SCL 6 (water), nir 0.05: dark but excluded
        let (scl, prob, b8) = uniform_bands(6.0, 0.0, 500.0);
        let masks = MaskSynthesizer::with_params(raw_params())
            .synthesize_from_bands(&scl, &prob, &b8)
            .unwrap();
        assert_eq!(masks.shadow_mask.sum(), 0);
    }

    #[test]
    fn test_dark_land_is_shadow() {
        let (scl, prob, b8) = uniform_bands(4.0, 0.0, 500.0);
        let masks = MaskSynthesizer::with_params(raw_params())
            .synthesize_from_bands(&scl, &prob, &b8)
            .unwrap();
        assert_eq!(masks.shadow_mask[[1, 1]], 1);
    }

    #[test]
    fn test_shadow_class_is_shadow_regardless_of_nir() {
        let (scl, prob, b8) = uniform_bands(3.0, 0.0, 5000.0);
        let masks = MaskSynthesizer::with_params(raw_params())
            .synthesize_from_bands(&scl, &prob, &b8)
            .unwrap();
        assert_eq!(masks.shadow_mask[[0, 3]], 1);
    }

    #[test]
    fn test_probability_threshold_monotonicity() {
        // Raising the threshold can only shrink the probability-rule
        // contribution, all other inputs held fixed
        let scl = BandGrid::from_elem((3, 3), 4.0);
        let b8 = BandGrid::from_elem((3, 3), 4000.0);
        let mut prob = BandGrid::zeros((3, 3));
        for (i, v) in [10.0, 30.0, 45.0, 55.0, 60.0, 75.0, 85.0, 95.0, 100.0]
            .iter()
            .enumerate()
        {
            prob[[i / 3, i % 3]] = *v;
        }

        let mut previous_count = usize::MAX;
        for threshold in [20.0, 40.0, 60.0, 80.0] {
            let params = CloudShadowMaskParams {
                cloud_prob_threshold: threshold,
                ..raw_params()
            };
            let masks = MaskSynthesizer::with_params(params)
                .synthesize_from_bands(&scl, &prob, &b8)
                .unwrap();
            let count = masks.cloud_mask.iter().filter(|&&v| v != 0).count();
            assert!(count <= previous_count);
            previous_count = count;
        }
    }

    #[test]
    fn test_refinement_removes_isolated_pixel() {
        // Default params carry radius-1 opening: one cloudy pixel in an
        // otherwise clear scene does not survive
        let mut scl = BandGrid::from_elem((7, 7), 4.0);
        scl[[3, 3]] = 9.0;
        let prob = BandGrid::zeros((7, 7));
        let b8 = BandGrid::from_elem((7, 7), 4000.0);
        let masks = MaskSynthesizer::new()
            .synthesize_from_bands(&scl, &prob, &b8)
            .unwrap();
        assert_eq!(masks.cloud_mask.sum(), 0);
    }

    #[test]
    fn test_missing_band_fails_fast() {
        use crate::types::SceneMetadata;
        use chrono::{TimeZone, Utc};

        let meta =
            SceneMetadata::new("S2A", Utc.with_ymd_and_hms(2021, 1, 5, 13, 0, 0).unwrap());
        let mut scene = SceneRecord::new(meta);
        scene
            .insert_band("SCL", BandGrid::zeros((2, 2)))
            .unwrap();
        scene
            .insert_band("B8", BandGrid::zeros((2, 2)))
            .unwrap();
        let result = MaskSynthesizer::new().synthesize(&scene);
        assert!(matches!(result, Err(MaskError::MissingBand(_))));
    }

    #[test]
    fn test_shape_mismatch_fails_fast() {
        let scl = BandGrid::zeros((2, 2));
        let prob = BandGrid::zeros((2, 2));
        let b8 = BandGrid::zeros((3, 3));
        let result = MaskSynthesizer::new().synthesize_from_bands(&scl, &prob, &b8);
        assert!(matches!(result, Err(MaskError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let params = CloudShadowMaskParams {
            cloud_prob_threshold: 130.0,
            ..CloudShadowMaskParams::default()
        };
        assert!(params.validate().is_err());
    }
}

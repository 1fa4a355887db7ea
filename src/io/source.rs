//! Acquisition and export collaborator interfaces.
//!
//! The core never performs network or file I/O; it consumes collections a
//! `SceneSource` has already resolved into in-memory band grids, and hands
//! finished scenes to a `MaskedSceneSink`. Remote catalogs, raster
//! serialization and authentication all live behind these traits.

use chrono::{DateTime, Utc};

use crate::types::{AreaOfInterest, MaskError, MaskResult, MaskedScene, SceneRecord};

/// Ground sample distance the export collaborator serializes at, in meters
pub const EXPORT_GSD_METERS: f64 = 10.0;

/// Scene-wide cloud-coverage pre-filter applied to reflectance queries
pub const DEFAULT_MAX_CLOUDY_PERCENTAGE: f32 = 60.0;

/// Half-open acquisition time window
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> MaskResult<Self> {
        if start >= end {
            return Err(MaskError::InvalidParameter(format!(
                "time window start {} is not before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Supplies the two independently filtered collections for an AOI and
/// time window: reflectance scenes (B2, B3, B4, B8, SCL) and
/// cloud-probability scenes (probability).
pub trait SceneSource {
    fn reflectance_scenes(
        &self,
        aoi: &AreaOfInterest,
        window: &TimeWindow,
    ) -> MaskResult<Vec<SceneRecord>>;

    fn cloud_probability_scenes(
        &self,
        aoi: &AreaOfInterest,
        window: &TimeWindow,
    ) -> MaskResult<Vec<SceneRecord>>;
}

/// Consumes finished scenes for serialization at [`EXPORT_GSD_METERS`]
/// clipped to the AOI.
pub trait MaskedSceneSink {
    fn export_scene(&mut self, scene: MaskedScene, aoi: &AreaOfInterest) -> MaskResult<()>;
}

/// A `SceneSource` over already-materialized collections.
///
/// Filters by AOI bounding-box intersection, time window and the
/// scene-wide cloud percentage, mirroring the catalog-side filters a
/// remote source applies before download.
#[derive(Debug)]
pub struct InMemorySceneSource {
    reflectance: Vec<(AreaOfInterest, SceneRecord)>,
    cloud_probability: Vec<(AreaOfInterest, SceneRecord)>,
    max_cloudy_percentage: f32,
}

impl Default for InMemorySceneSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySceneSource {
    pub fn new() -> Self {
        Self {
            reflectance: Vec::new(),
            cloud_probability: Vec::new(),
            max_cloudy_percentage: DEFAULT_MAX_CLOUDY_PERCENTAGE,
        }
    }

    pub fn with_max_cloudy_percentage(mut self, percentage: f32) -> Self {
        self.max_cloudy_percentage = percentage;
        self
    }

    pub fn add_reflectance_scene(&mut self, footprint: AreaOfInterest, scene: SceneRecord) {
        self.reflectance.push((footprint, scene));
    }

    pub fn add_cloud_probability_scene(
        &mut self,
        footprint: AreaOfInterest,
        scene: SceneRecord,
    ) {
        self.cloud_probability.push((footprint, scene));
    }

    fn select(
        entries: &[(AreaOfInterest, SceneRecord)],
        aoi: &AreaOfInterest,
        window: &TimeWindow,
        max_cloudy: Option<f32>,
    ) -> Vec<SceneRecord> {
        let aoi_bbox = aoi.bounding_box();
        entries
            .iter()
            .filter(|(footprint, scene)| {
                if !footprint.bounding_box().intersects(&aoi_bbox) {
                    return false;
                }
                if !window.contains(scene.metadata.timestamp) {
                    return false;
                }
                if let (Some(limit), Some(actual)) =
                    (max_cloudy, scene.metadata.cloudy_pixel_percentage)
                {
                    if actual >= limit {
                        return false;
                    }
                }
                true
            })
            .map(|(_, scene)| scene.clone())
            .collect()
    }
}

impl SceneSource for InMemorySceneSource {
    fn reflectance_scenes(
        &self,
        aoi: &AreaOfInterest,
        window: &TimeWindow,
    ) -> MaskResult<Vec<SceneRecord>> {
        let scenes = Self::select(
            &self.reflectance,
            aoi,
            window,
            Some(self.max_cloudy_percentage),
        );
        log::debug!(
            "Reflectance query matched {}/{} scenes",
            scenes.len(),
            self.reflectance.len()
        );
        Ok(scenes)
    }

    fn cloud_probability_scenes(
        &self,
        aoi: &AreaOfInterest,
        window: &TimeWindow,
    ) -> MaskResult<Vec<SceneRecord>> {
        // The probability collection carries no scene-wide cloud metadata
        Ok(Self::select(&self.cloud_probability, aoi, window, None))
    }
}

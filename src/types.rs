use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Single reflectance, classification or probability sample
pub type BandValue = f32;

/// 2D raster band (rows x cols), pixel-aligned within a scene
pub type BandGrid = Array2<BandValue>;

/// Binary raster mask (0 = background, 1 = foreground)
pub type MaskGrid = Array2<u8>;

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Half-open overlap test; touching edges do not count as intersection
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon < other.max_lon
            && self.max_lon > other.min_lon
            && self.min_lat < other.max_lat
            && self.max_lat > other.min_lat
    }
}

/// Area of interest: a simple polygon in geographic coordinates.
///
/// The ring is stored without a closing vertex. Construction fails on
/// degenerate geometry (fewer than 3 vertices or zero area), so a value of
/// this type always has positive area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaOfInterest {
    ring: Vec<(f64, f64)>,
}

impl AreaOfInterest {
    /// Build an AOI from an axis-aligned lon/lat rectangle
    pub fn rectangle(
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> MaskResult<Self> {
        Self::from_ring(vec![
            (min_lon, min_lat),
            (max_lon, min_lat),
            (max_lon, max_lat),
            (min_lon, max_lat),
        ])
    }

    /// Build an AOI from a polygon ring of (lon, lat) vertices
    pub fn from_ring(ring: Vec<(f64, f64)>) -> MaskResult<Self> {
        if ring.len() < 3 {
            return Err(MaskError::InvalidGeometry(format!(
                "AOI ring needs at least 3 vertices, got {}",
                ring.len()
            )));
        }
        for &(lon, lat) in &ring {
            if !lon.is_finite() || !lat.is_finite() {
                return Err(MaskError::InvalidGeometry(
                    "AOI ring contains non-finite coordinates".to_string(),
                ));
            }
        }
        let aoi = Self { ring };
        if aoi.area() <= 0.0 {
            return Err(MaskError::InvalidGeometry(
                "AOI polygon has zero area".to_string(),
            ));
        }
        Ok(aoi)
    }

    pub fn ring(&self) -> &[(f64, f64)] {
        &self.ring
    }

    /// Unsigned shoelace area in squared degrees
    pub fn area(&self) -> f64 {
        let n = self.ring.len();
        let mut twice_area = 0.0;
        for i in 0..n {
            let (x1, y1) = self.ring[i];
            let (x2, y2) = self.ring[(i + 1) % n];
            twice_area += x1 * y2 - x2 * y1;
        }
        (twice_area / 2.0).abs()
    }

    /// Axis-aligned bounding box of the ring
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox {
            min_lon: f64::MAX,
            max_lon: f64::MIN,
            min_lat: f64::MAX,
            max_lat: f64::MIN,
        };
        for &(lon, lat) in &self.ring {
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.max_lon = bbox.max_lon.max(lon);
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lat = bbox.max_lat.max(lat);
        }
        bbox
    }

    /// Ray-casting point-in-polygon test (boundary points are ambiguous)
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let n = self.ring.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.ring[i];
            let (xj, yj) = self.ring[j];
            if ((yi > lat) != (yj > lat))
                && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi)
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Per-scene acquisition metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMetadata {
    /// Scene identity key, unique within a temporal window
    pub scene_id: String,
    /// Acquisition timestamp
    pub timestamp: DateTime<Utc>,
    /// Provider-reported scene-wide cloud coverage, 0-100
    pub cloudy_pixel_percentage: Option<f32>,
}

impl SceneMetadata {
    pub fn new(scene_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            scene_id: scene_id.into(),
            timestamp,
            cloudy_pixel_percentage: None,
        }
    }

    pub fn with_cloud_percentage(mut self, percentage: f32) -> Self {
        self.cloudy_pixel_percentage = Some(percentage);
        self
    }
}

/// One satellite observation: named bands sharing a single pixel grid.
///
/// Band insertion enforces the alignment invariant; all mask arithmetic in
/// the core assumes every band of a record has identical dimensions.
#[derive(Debug, Clone)]
pub struct SceneRecord {
    pub metadata: SceneMetadata,
    bands: HashMap<String, BandGrid>,
}

impl SceneRecord {
    pub fn new(metadata: SceneMetadata) -> Self {
        Self {
            metadata,
            bands: HashMap::new(),
        }
    }

    pub fn scene_id(&self) -> &str {
        &self.metadata.scene_id
    }

    /// Add or replace a band, enforcing pixel alignment with existing bands
    pub fn insert_band(
        &mut self,
        name: impl Into<String>,
        grid: BandGrid,
    ) -> MaskResult<()> {
        let name = name.into();
        if let Some(shape) = self.grid_shape() {
            if grid.dim() != shape {
                return Err(MaskError::ShapeMismatch {
                    band: name,
                    expected: shape,
                    actual: grid.dim(),
                });
            }
        }
        self.bands.insert(name, grid);
        Ok(())
    }

    /// Look up a band, failing fast when it is missing
    pub fn band(&self, name: &str) -> MaskResult<&BandGrid> {
        self.bands
            .get(name)
            .ok_or_else(|| MaskError::MissingBand(name.to_string()))
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.contains_key(name)
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(String::as_str)
    }

    /// (rows, cols) of the shared pixel grid, if any band is present
    pub fn grid_shape(&self) -> Option<(usize, usize)> {
        self.bands.values().next().map(|grid| grid.dim())
    }
}

/// A scene with synthesized cloud and shadow masks, ready for export
#[derive(Debug, Clone)]
pub struct MaskedScene {
    pub record: SceneRecord,
    pub cloud_mask: MaskGrid,
    pub shadow_mask: MaskGrid,
}

impl MaskedScene {
    /// Fold the masks back into the record as `cloud_mask` / `shadow_mask`
    /// f32 bands, the multi-band layout the export collaborator serializes
    pub fn into_record(self) -> MaskResult<SceneRecord> {
        let MaskedScene {
            mut record,
            cloud_mask,
            shadow_mask,
        } = self;
        record.insert_band("cloud_mask", cloud_mask.mapv(|v| v as BandValue))?;
        record.insert_band("shadow_mask", shadow_mask.mapv(|v| v as BandValue))?;
        Ok(record)
    }
}

/// One cell of a tile grid covering an AOI.
///
/// Corners are geographic (lon, lat), ordered SW, SE, NE, NW as produced by
/// reprojecting a square cell from the metric construction system. The cell
/// is square in that metric system, not in lon/lat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tile {
    /// Row index in the generation grid (y direction)
    pub row: usize,
    /// Column index in the generation grid (x direction)
    pub col: usize,
    /// Geographic corner coordinates
    pub corners: [(f64, f64); 4],
}

impl Tile {
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox {
            min_lon: f64::MAX,
            max_lon: f64::MIN,
            min_lat: f64::MAX,
            max_lat: f64::MIN,
        };
        for &(lon, lat) in &self.corners {
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.max_lon = bbox.max_lon.max(lon);
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lat = bbox.max_lat.max(lat);
        }
        bbox
    }
}

/// Error types for mask processing
#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    #[error("missing required band: {0}")]
    MissingBand(String),

    #[error("band {band} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        band: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("processing error: {0}")]
    Processing(String),
}

/// Result type for mask operations
pub type MaskResult<T> = Result<T, MaskError>;

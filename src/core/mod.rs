//! Core mask synthesis, refinement and tiling modules

pub mod join;
pub mod mask;
pub mod morphology;
pub mod components;
pub mod projection;
pub mod tiling;
pub mod pipeline;

// Re-export main types
pub use join::{CollectionJoiner, JoinParams};
pub use mask::{CloudShadowMaskParams, CloudShadowMasks, MaskSynthesizer, REFLECTANCE_SCALE};
pub use morphology::{dilate, erode, opening, KernelShape, MorphologyParams};
pub use components::{label_components, remove_small_components};
pub use projection::{
    geographic_to_utm, project_bounding_box, utm_to_geographic, MetricBounds, UtmZone,
};
pub use tiling::{aoi_utm_zone, generate_tile_grid};
pub use pipeline::{
    BatchReport, MaskPipeline, PipelineConfig, SceneOutcome, SceneStatus, REQUIRED_BANDS,
};

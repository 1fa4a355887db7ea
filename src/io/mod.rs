//! Collaborator interfaces for scene acquisition and mask export

pub mod source;

pub use source::{
    InMemorySceneSource, MaskedSceneSink, SceneSource, TimeWindow,
    DEFAULT_MAX_CLOUDY_PERCENTAGE, EXPORT_GSD_METERS,
};

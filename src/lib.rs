//! Cirrus: A Fast, Modular Sentinel-2 Cloud & Shadow Mask Generator
//!
//! This library pairs Sentinel-2 surface-reflectance scenes with their
//! independently distributed cloud-probability imagery and derives refined
//! binary cloud and shadow masks for labeled training-data preparation,
//! along with metric tile grids for scalable export of large areas of
//! interest.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use numpy::{PyReadonlyArray2, ToPyArray};

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AreaOfInterest, BandGrid, BandValue, BoundingBox, MaskError, MaskGrid, MaskResult,
    MaskedScene, SceneMetadata, SceneRecord, Tile,
};

pub use crate::core::{
    generate_tile_grid, label_components, remove_small_components, BatchReport,
    CloudShadowMaskParams, CloudShadowMasks, CollectionJoiner, MaskPipeline,
    MaskSynthesizer, MorphologyParams, PipelineConfig,
};

pub use io::{InMemorySceneSource, MaskedSceneSink, SceneSource, TimeWindow};

/// Convert PyReadonlyArray2 to ndarray Array2
fn numpy_to_array2<T>(arr: PyReadonlyArray2<T>) -> ndarray::Array2<T>
where
    T: Copy + numpy::Element,
{
    arr.as_array().to_owned()
}

/// Convert Array2<T> to numpy array
fn array2_to_numpy<T>(py: Python, arr: &ndarray::Array2<T>) -> PyResult<PyObject>
where
    T: numpy::Element + Copy,
{
    let numpy_array = arr.to_pyarray(py);
    Ok(numpy_array.into())
}

/// Synthesize refined cloud and shadow masks from the SCL, probability and
/// B8 bands of one combined scene
#[pyfunction]
#[pyo3(signature = (
    scl,
    probability,
    b8,
    cloud_prob_threshold = 50.0,
    morphology_radius = 1,
    nir_threshold = 0.2,
    cloud_nir_threshold = 0.3
))]
fn generate_cloud_shadow_masks(
    py: Python,
    scl: PyReadonlyArray2<f32>,
    probability: PyReadonlyArray2<f32>,
    b8: PyReadonlyArray2<f32>,
    cloud_prob_threshold: f32,
    morphology_radius: usize,
    nir_threshold: f32,
    cloud_nir_threshold: f32,
) -> PyResult<(PyObject, PyObject)> {
    let params = CloudShadowMaskParams {
        cloud_prob_threshold,
        nir_threshold,
        cloud_nir_threshold,
        morphology: MorphologyParams {
            radius: morphology_radius,
            ..MorphologyParams::default()
        },
        ..CloudShadowMaskParams::default()
    };

    let masks = MaskSynthesizer::with_params(params)
        .synthesize_from_bands(
            &numpy_to_array2(scl),
            &numpy_to_array2(probability),
            &numpy_to_array2(b8),
        )
        .map_err(|e| PyValueError::new_err(format!("{}", e)))?;

    Ok((
        array2_to_numpy(py, &masks.cloud_mask)?,
        array2_to_numpy(py, &masks.shadow_mask)?,
    ))
}

/// Remove connected components smaller than `min_size` pixels from a
/// binary mask
#[pyfunction]
#[pyo3(signature = (mask, min_size = 8))]
fn remove_small_mask_components(
    py: Python,
    mask: PyReadonlyArray2<u8>,
    min_size: usize,
) -> PyResult<PyObject> {
    let filtered = remove_small_components(&numpy_to_array2(mask), min_size)
        .map_err(|e| PyValueError::new_err(format!("{}", e)))?;
    array2_to_numpy(py, &filtered)
}

/// Morphological opening of a binary mask with a square kernel
#[pyfunction]
#[pyo3(signature = (mask, radius = 1))]
fn morphological_opening(
    py: Python,
    mask: PyReadonlyArray2<u8>,
    radius: usize,
) -> PyResult<PyObject> {
    let params = MorphologyParams {
        radius,
        ..MorphologyParams::default()
    };
    let opened = crate::core::opening(&numpy_to_array2(mask), &params);
    array2_to_numpy(py, &opened)
}

/// Partition an AOI polygon into metric tiles, returning each retained
/// tile's geographic corner ring
#[pyfunction]
fn tile_grid_for_aoi(
    ring: Vec<(f64, f64)>,
    tile_size_meters: f64,
) -> PyResult<Vec<Vec<(f64, f64)>>> {
    let aoi = AreaOfInterest::from_ring(ring)
        .map_err(|e| PyValueError::new_err(format!("{}", e)))?;
    let tiles = generate_tile_grid(&aoi, tile_size_meters)
        .map_err(|e| PyValueError::new_err(format!("{}", e)))?;
    Ok(tiles
        .into_iter()
        .map(|tile| tile.corners.to_vec())
        .collect())
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(generate_cloud_shadow_masks, m)?)?;
    m.add_function(wrap_pyfunction!(remove_small_mask_components, m)?)?;
    m.add_function(wrap_pyfunction!(morphological_opening, m)?)?;
    m.add_function(wrap_pyfunction!(tile_grid_for_aoi, m)?)?;
    Ok(())
}

//! Tile grid generation for scalable AOI export.
//!
//! Large AOIs are partitioned into fixed-size square tiles in a projected
//! metric system (the UTM zone of the AOI center), reprojected back to
//! geographic coordinates and clipped to the tiles that intersect the AOI.

use crate::core::projection::{
    project_bounding_box, utm_to_geographic, MetricBounds, UtmZone,
};
use crate::types::{AreaOfInterest, MaskError, MaskResult, Tile};

/// A grid cell in the metric construction system
#[derive(Debug, Clone, Copy)]
struct MetricTile {
    row: usize,
    col: usize,
    x_min: f64,
    y_min: f64,
}

/// Number of tile columns and rows needed to cover the bounds.
///
/// Rounding up guarantees full coverage; the last row/column may extend
/// beyond the bounding box.
fn tile_counts(bounds: &MetricBounds, tile_size: f64) -> (usize, usize) {
    let x_tiles = (bounds.width() / tile_size).ceil() as usize;
    let y_tiles = (bounds.height() / tile_size).ceil() as usize;
    (x_tiles.max(1), y_tiles.max(1))
}

/// Row-major metric grid over the bounds: all columns of the first row,
/// then the next row.
fn metric_grid(bounds: &MetricBounds, tile_size: f64) -> Vec<MetricTile> {
    let (x_tiles, y_tiles) = tile_counts(bounds, tile_size);
    let mut tiles = Vec::with_capacity(x_tiles * y_tiles);
    for row in 0..y_tiles {
        for col in 0..x_tiles {
            tiles.push(MetricTile {
                row,
                col,
                x_min: bounds.x_min + col as f64 * tile_size,
                y_min: bounds.y_min + row as f64 * tile_size,
            });
        }
    }
    tiles
}

/// Generate the tile grid covering an AOI.
///
/// Tiles are square with side `tile_size_meters` in the UTM zone of the AOI
/// center; only tiles whose reprojected footprint intersects the AOI
/// polygon are retained. No ordering guarantee on the returned set.
pub fn generate_tile_grid(
    aoi: &AreaOfInterest,
    tile_size_meters: f64,
) -> MaskResult<Vec<Tile>> {
    if !tile_size_meters.is_finite() || tile_size_meters <= 0.0 {
        return Err(MaskError::InvalidParameter(format!(
            "tile_size_meters must be positive and finite, got {}",
            tile_size_meters
        )));
    }

    let bbox = aoi.bounding_box();
    let zone = aoi_utm_zone(aoi);
    let bounds = project_bounding_box(&bbox, zone);

    let (x_tiles, y_tiles) = tile_counts(&bounds, tile_size_meters);
    log::info!(
        "Tiling AOI in EPSG:{}: {:.0}m x {:.0}m bounds -> {}x{} tiles of {}m",
        zone.epsg(),
        bounds.width(),
        bounds.height(),
        x_tiles,
        y_tiles,
        tile_size_meters
    );

    let mut retained = Vec::new();
    for cell in metric_grid(&bounds, tile_size_meters) {
        let x0 = cell.x_min;
        let y0 = cell.y_min;
        let x1 = x0 + tile_size_meters;
        let y1 = y0 + tile_size_meters;

        // SW, SE, NE, NW in the metric system
        let corners = [
            utm_to_geographic(x0, y0, zone),
            utm_to_geographic(x1, y0, zone),
            utm_to_geographic(x1, y1, zone),
            utm_to_geographic(x0, y1, zone),
        ];

        if quad_intersects_aoi(&corners, aoi) {
            retained.push(Tile {
                row: cell.row,
                col: cell.col,
                corners,
            });
        }
    }

    log::info!(
        "Retained {}/{} tiles intersecting the AOI",
        retained.len(),
        x_tiles * y_tiles
    );

    Ok(retained)
}

/// UTM zone the tile grid for an AOI is constructed in (zone of the AOI
/// bounding-box center). Exposed so consumers can measure tiles in the
/// same metric system.
pub fn aoi_utm_zone(aoi: &AreaOfInterest) -> UtmZone {
    let bbox = aoi.bounding_box();
    UtmZone::for_point(
        (bbox.min_lon + bbox.max_lon) / 2.0,
        (bbox.min_lat + bbox.max_lat) / 2.0,
    )
}

// ── Quad/polygon intersection ────────────────────────────────────────────
//
// Two simple polygons intersect iff a vertex of one lies inside the other
// or some pair of edges crosses.

fn quad_intersects_aoi(corners: &[(f64, f64); 4], aoi: &AreaOfInterest) -> bool {
    // Tile corner inside the AOI
    if corners.iter().any(|&(lon, lat)| aoi.contains(lon, lat)) {
        return true;
    }
    // AOI vertex inside the tile
    if aoi
        .ring()
        .iter()
        .any(|&(lon, lat)| point_in_ring(corners, lon, lat))
    {
        return true;
    }
    // Edge crossing
    let ring = aoi.ring();
    let n = ring.len();
    for i in 0..4 {
        let p1 = corners[i];
        let p2 = corners[(i + 1) % 4];
        for j in 0..n {
            let q1 = ring[j];
            let q2 = ring[(j + 1) % n];
            if segments_intersect(p1, p2, q1, q2) {
                return true;
            }
        }
    }
    false
}

fn point_in_ring(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let n = ring.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn orientation(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

fn segments_intersect(
    p1: (f64, f64),
    p2: (f64, f64),
    q1: (f64, f64),
    q2: (f64, f64),
) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);
    ((d1 > 0.0) != (d2 > 0.0)) && ((d3 > 0.0) != (d4 > 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projection::geographic_to_utm;

    #[test]
    fn test_tile_counts_exact_division() {
        let bounds = MetricBounds {
            x_min: 0.0,
            y_min: 0.0,
            x_max: 1000.0,
            y_max: 1000.0,
        };
        // 1000m / 400m rounds up to 3 per axis -> 9 raw tiles
        assert_eq!(tile_counts(&bounds, 400.0), (3, 3));
        assert_eq!(metric_grid(&bounds, 400.0).len(), 9);
        // Even division stays exact
        assert_eq!(tile_counts(&bounds, 250.0), (4, 4));
    }

    #[test]
    fn test_metric_grid_row_major_and_coverage() {
        let bounds = MetricBounds {
            x_min: 100.0,
            y_min: 200.0,
            x_max: 1100.0,
            y_max: 1200.0,
        };
        let size = 400.0;
        let grid = metric_grid(&bounds, size);

        // Row-major: the first x_tiles cells are row 0
        assert_eq!(grid[0].row, 0);
        assert_eq!(grid[0].col, 0);
        assert_eq!(grid[1].row, 0);
        assert_eq!(grid[1].col, 1);
        assert_eq!(grid[3].row, 1);

        // Union of cells covers the bounds
        for cell in &grid {
            assert!(cell.x_min >= bounds.x_min);
            assert!(cell.y_min >= bounds.y_min);
        }
        let max_x = grid
            .iter()
            .map(|c| c.x_min + size)
            .fold(f64::MIN, f64::max);
        let max_y = grid
            .iter()
            .map(|c| c.y_min + size)
            .fold(f64::MIN, f64::max);
        assert!(max_x >= bounds.x_max);
        assert!(max_y >= bounds.y_max);
    }

    #[test]
    fn test_generate_rejects_bad_tile_size() {
        let aoi = AreaOfInterest::rectangle(-47.95, -15.83, -47.91, -15.79).unwrap();
        assert!(generate_tile_grid(&aoi, 0.0).is_err());
        assert!(generate_tile_grid(&aoi, -10.0).is_err());
        assert!(generate_tile_grid(&aoi, f64::NAN).is_err());
    }

    #[test]
    fn test_generate_covers_rectangular_aoi() {
        // ~4.3 km x ~4.4 km over Brasília; 2000 m tiles -> 3x3 grid, all
        // intersecting the rectangle
        let aoi = AreaOfInterest::rectangle(-47.95, -15.83, -47.91, -15.79).unwrap();
        let tiles = generate_tile_grid(&aoi, 2000.0).unwrap();
        assert_eq!(tiles.len(), 9);
        for tile in &tiles {
            assert!(tile.bounding_box().intersects(&aoi.bounding_box()));
        }
    }

    #[test]
    fn test_generate_filters_non_intersecting_tiles() {
        // L-shaped AOI: the notch corner of its bbox has tiles that miss it
        let aoi = AreaOfInterest::from_ring(vec![
            (-47.95, -15.83),
            (-47.87, -15.83),
            (-47.87, -15.79),
            (-47.91, -15.79),
            (-47.91, -15.75),
            (-47.95, -15.75),
        ])
        .unwrap();
        let tiles = generate_tile_grid(&aoi, 2000.0).unwrap();
        let bbox = aoi.bounding_box();
        let zone = aoi_utm_zone(&aoi);
        let bounds = project_bounding_box(&bbox, zone);
        let (x_tiles, y_tiles) = tile_counts(&bounds, 2000.0);
        // Something was filtered out of the raw grid
        assert!(tiles.len() < x_tiles * y_tiles);
        assert!(!tiles.is_empty());
    }

    #[test]
    fn test_generate_deterministic() {
        let aoi = AreaOfInterest::rectangle(-43.22, -22.95, -43.18, -22.91).unwrap();
        let a = generate_tile_grid(&aoi, 1000.0).unwrap();
        let b = generate_tile_grid(&aoi, 1000.0).unwrap();
        assert_eq!(a.len(), b.len());
        for (ta, tb) in a.iter().zip(b.iter()) {
            assert_eq!(ta.row, tb.row);
            assert_eq!(ta.col, tb.col);
            assert_eq!(ta.corners, tb.corners);
        }
    }

    #[test]
    fn test_tile_side_length_in_metric_system() {
        let aoi = AreaOfInterest::rectangle(-47.95, -15.83, -47.91, -15.79).unwrap();
        let zone = aoi_utm_zone(&aoi);
        let tiles = generate_tile_grid(&aoi, 1500.0).unwrap();
        let tile = &tiles[0];
        // Reproject corners back to the metric system; sides must measure
        // the requested size up to reprojection tolerance
        let (x0, y0) = geographic_to_utm(tile.corners[0].0, tile.corners[0].1, zone);
        let (x1, _) = geographic_to_utm(tile.corners[1].0, tile.corners[1].1, zone);
        let (_, y3) = geographic_to_utm(tile.corners[3].0, tile.corners[3].1, zone);
        assert!((x1 - x0 - 1500.0).abs() < 0.5);
        assert!((y3 - y0 - 1500.0).abs() < 0.5);
    }

    #[test]
    fn test_segments_intersect() {
        assert!(segments_intersect(
            (0.0, 0.0),
            (2.0, 2.0),
            (0.0, 2.0),
            (2.0, 0.0)
        ));
        assert!(!segments_intersect(
            (0.0, 0.0),
            (1.0, 0.0),
            (0.0, 1.0),
            (1.0, 1.0)
        ));
    }
}

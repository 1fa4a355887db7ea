use std::collections::HashMap;

use crate::types::{MaskResult, SceneRecord};

/// Collection join configuration
#[derive(Debug, Clone)]
pub struct JoinParams {
    /// Band copied from the matching secondary record
    pub secondary_band: String,
    /// On a band-name collision the primary wins unless this is set
    pub overwrite_collisions: bool,
}

impl Default for JoinParams {
    fn default() -> Self {
        Self {
            secondary_band: "probability".to_string(),
            overwrite_collisions: false,
        }
    }
}

/// Joins a primary (reflectance) collection with a secondary
/// (cloud-probability) collection on exact scene-identity equality.
pub struct CollectionJoiner {
    params: JoinParams,
}

impl Default for CollectionJoiner {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionJoiner {
    pub fn new() -> Self {
        Self {
            params: JoinParams::default(),
        }
    }

    pub fn with_params(params: JoinParams) -> Self {
        Self { params }
    }

    /// Inner join: one combined record per scene id present in both
    /// collections; unmatched records on either side are silently dropped.
    /// Zero matches is a valid empty result. Output order follows the
    /// primary collection.
    pub fn join(
        &self,
        primary: &[SceneRecord],
        secondary: &[SceneRecord],
    ) -> MaskResult<Vec<SceneRecord>> {
        let secondary_by_id: HashMap<&str, &SceneRecord> = secondary
            .iter()
            .map(|record| (record.scene_id(), record))
            .collect();

        let mut combined = Vec::new();
        for record in primary {
            let Some(matching) = secondary_by_id.get(record.scene_id()) else {
                continue;
            };

            let mut merged = record.clone();
            let collision = merged.has_band(&self.params.secondary_band);
            if !collision || self.params.overwrite_collisions {
                let grid = matching.band(&self.params.secondary_band)?;
                merged.insert_band(self.params.secondary_band.clone(), grid.clone())?;
            }
            combined.push(merged);
        }

        log::info!(
            "Joined collections: {} primary x {} secondary -> {} combined scenes",
            primary.len(),
            secondary.len(),
            combined.len()
        );

        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BandGrid, SceneMetadata};
    use chrono::{TimeZone, Utc};

    fn scene(id: &str, bands: &[(&str, f32)]) -> SceneRecord {
        let meta =
            SceneMetadata::new(id, Utc.with_ymd_and_hms(2021, 6, 1, 13, 0, 0).unwrap());
        let mut record = SceneRecord::new(meta);
        for &(name, value) in bands {
            record
                .insert_band(name, BandGrid::from_elem((2, 2), value))
                .unwrap();
        }
        record
    }

    #[test]
    fn test_inner_join_matches_only() {
        let primary = vec![
            scene("A", &[("B8", 0.5)]),
            scene("B", &[("B8", 0.6)]),
            scene("C", &[("B8", 0.7)]),
        ];
        let secondary = vec![
            scene("B", &[("probability", 80.0)]),
            scene("C", &[("probability", 20.0)]),
            scene("D", &[("probability", 99.0)]),
        ];

        let joined = CollectionJoiner::new().join(&primary, &secondary).unwrap();
        let ids: Vec<&str> = joined.iter().map(|r| r.scene_id()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert!(joined[0].has_band("B8"));
        assert_eq!(joined[0].band("probability").unwrap()[[0, 0]], 80.0);
    }

    #[test]
    fn test_zero_matches_is_empty_not_error() {
        let primary = vec![scene("A", &[("B8", 0.5)])];
        let secondary = vec![scene("Z", &[("probability", 10.0)])];
        let joined = CollectionJoiner::new().join(&primary, &secondary).unwrap();
        assert!(joined.is_empty());
    }

    #[test]
    fn test_collision_primary_wins() {
        let primary = vec![scene("A", &[("B8", 0.5), ("probability", 1.0)])];
        let secondary = vec![scene("A", &[("probability", 80.0)])];

        let joined = CollectionJoiner::new().join(&primary, &secondary).unwrap();
        assert_eq!(joined[0].band("probability").unwrap()[[0, 0]], 1.0);

        let joiner = CollectionJoiner::with_params(JoinParams {
            overwrite_collisions: true,
            ..JoinParams::default()
        });
        let joined = joiner.join(&primary, &secondary).unwrap();
        assert_eq!(joined[0].band("probability").unwrap()[[0, 0]], 80.0);
    }

    #[test]
    fn test_missing_secondary_band_fails_fast() {
        let primary = vec![scene("A", &[("B8", 0.5)])];
        let secondary = vec![scene("A", &[("clouds", 80.0)])];
        assert!(CollectionJoiner::new().join(&primary, &secondary).is_err());
    }

    #[test]
    fn test_shape_mismatch_fails_fast() {
        let primary = vec![scene("A", &[("B8", 0.5)])];
        let meta =
            SceneMetadata::new("A", Utc.with_ymd_and_hms(2021, 6, 1, 13, 0, 0).unwrap());
        let mut odd = SceneRecord::new(meta);
        odd.insert_band("probability", BandGrid::zeros((3, 3)))
            .unwrap();
        assert!(CollectionJoiner::new().join(&primary, &[odd]).is_err());
    }
}

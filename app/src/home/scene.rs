use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One mapping entry: a preset applied to a set of devices. The IDs are
/// free text at creation time and resolved lazily at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMapping {
    pub preset_id: String,
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub scene_id: String,
    pub scene_name: String,
    pub scene_category_id: Option<String>,
    pub mapping: Vec<SceneMapping>,
}

impl Scene {
    /// Flatten the mapping into (device_id, preset_id) pairs.
    ///
    /// A device appearing under more than one mapping entry keeps the
    /// first preset encountered in mapping order; later entries for the
    /// same device are dropped with a warning.
    pub fn device_preset_pairs(&self) -> Vec<(String, String)> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut pairs = Vec::new();

        for mapping in &self.mapping {
            for device_id in &mapping.devices {
                if !seen.insert(device_id.as_str()) {
                    tracing::warn!(
                        "Device {} is mapped more than once in scene {}, keeping the first preset",
                        device_id,
                        self.scene_name
                    );
                    continue;
                }

                pairs.push((device_id.clone(), mapping.preset_id.clone()));
            }
        }

        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_with_mapping(mapping: Vec<SceneMapping>) -> Scene {
        Scene {
            scene_id: "s1".to_owned(),
            scene_name: "Evening".to_owned(),
            scene_category_id: None,
            mapping,
        }
    }

    #[test]
    fn pairs_expand_in_mapping_order() {
        let scene = scene_with_mapping(vec![
            SceneMapping {
                preset_id: "p1".to_owned(),
                devices: vec!["d1".to_owned(), "d2".to_owned()],
            },
            SceneMapping {
                preset_id: "p2".to_owned(),
                devices: vec!["d3".to_owned()],
            },
        ]);

        assert_eq!(
            scene.device_preset_pairs(),
            vec![
                ("d1".to_owned(), "p1".to_owned()),
                ("d2".to_owned(), "p1".to_owned()),
                ("d3".to_owned(), "p2".to_owned()),
            ]
        );
    }

    #[test]
    fn duplicate_device_keeps_first_preset() {
        let scene = scene_with_mapping(vec![
            SceneMapping {
                preset_id: "p1".to_owned(),
                devices: vec!["d1".to_owned()],
            },
            SceneMapping {
                preset_id: "p2".to_owned(),
                devices: vec!["d1".to_owned(), "d2".to_owned()],
            },
        ]);

        assert_eq!(
            scene.device_preset_pairs(),
            vec![("d1".to_owned(), "p1".to_owned()), ("d2".to_owned(), "p2".to_owned())]
        );
    }
}

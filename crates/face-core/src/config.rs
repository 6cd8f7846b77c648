use serde::{Deserialize, Serialize};

use crate::matcher::{MatchPolicy, DEFAULT_TOLERANCE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Maximum Euclidean distance (exclusive) for two encodings to match
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,

    /// How a label is chosen when several gallery entries are within tolerance
    #[serde(default)]
    pub match_policy: MatchPolicy,

    /// Reject enrollment images that do not contain exactly one face
    #[serde(default)]
    pub require_single_face_enrollment: bool,
}

fn default_tolerance() -> f32 {
    DEFAULT_TOLERANCE
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            match_policy: MatchPolicy::default(),
            require_single_face_enrollment: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RecognitionConfig::default();
        assert_eq!(config.tolerance, 0.6);
        assert_eq!(config.match_policy, MatchPolicy::FirstMatch);
        assert!(!config.require_single_face_enrollment);
    }

    #[test]
    fn test_config_partial_json() {
        let config: RecognitionConfig =
            serde_json::from_value(serde_json::json!({ "match_policy": "nearest" })).unwrap();
        assert_eq!(config.tolerance, 0.6);
        assert_eq!(config.match_policy, MatchPolicy::Nearest);
    }
}

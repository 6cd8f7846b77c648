use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{FaceEncoding, GalleryEntry, GalleryIndex, UNKNOWN_LABEL};

/// Conventional distance tolerance for 128-d face encodings.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Selection rule among gallery entries within tolerance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// First entry within tolerance in gallery iteration order. This is not
    /// necessarily the closest one.
    #[default]
    FirstMatch,
    /// Closest entry within tolerance; ties go to the earlier entry.
    Nearest,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first_match" | "first" => Ok(Self::FirstMatch),
            "nearest" => Ok(Self::Nearest),
            other => Err(format!("unknown match policy '{}'", other)),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstMatch => f.write_str("first_match"),
            Self::Nearest => f.write_str("nearest"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    tolerance: f32,
    policy: MatchPolicy,
}

impl Matcher {
    pub fn new(tolerance: f32, policy: MatchPolicy) -> Self {
        Self { tolerance, policy }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Strictly below tolerance; a NaN distance never matches.
    pub fn is_match(&self, distance: f32) -> bool {
        distance < self.tolerance
    }

    /// Gallery entry the query resolves to, if any.
    pub fn resolve<'a>(
        &self,
        query: &FaceEncoding,
        gallery: &'a GalleryIndex,
    ) -> Option<&'a GalleryEntry> {
        match self.policy {
            MatchPolicy::FirstMatch => gallery
                .iter()
                .find(|entry| self.is_match(query.distance(&entry.encoding))),
            MatchPolicy::Nearest => {
                let mut best: Option<(&GalleryEntry, f32)> = None;
                for entry in gallery {
                    let distance = query.distance(&entry.encoding);
                    if !self.is_match(distance) {
                        continue;
                    }
                    if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                        best = Some((entry, distance));
                    }
                }
                best.map(|(entry, _)| entry)
            }
        }
    }

    /// Matched label, or [`UNKNOWN_LABEL`].
    pub fn label_for(&self, query: &FaceEncoding, gallery: &GalleryIndex) -> String {
        self.resolve(query, gallery)
            .map(|entry| entry.label.clone())
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE, MatchPolicy::default())
    }
}

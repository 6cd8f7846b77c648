use crate::types::{DetectedFace, MatchResult};

/// Pair each detected face with its resolved label, preserving detector order.
pub fn assemble(faces: Vec<DetectedFace>, labels: Vec<String>) -> Vec<MatchResult> {
    debug_assert_eq!(faces.len(), labels.len(), "faces and labels must be index-aligned");

    faces
        .into_iter()
        .zip(labels)
        .map(|(face, label)| MatchResult {
            bounding_box: face.bounding_box,
            label,
        })
        .collect()
}

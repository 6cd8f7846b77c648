//! Enrollment image storage.
//!
//! The gallery builder only needs "label -> image blobs"; the filesystem store
//! below exposes one of three directory layouts as that view. Writes are
//! additive: a new image is written to a hidden temporary file and published
//! with a hard link, which fails rather than replace an existing file.
//! Concurrent readers see either the whole file or nothing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::FaceError;

/// One enrolled image and the label it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentSource {
    pub label: String,
    pub path: PathBuf,
}

/// Outcome of a successful enrollment write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedImage {
    pub label: String,
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Every enrollment image, grouped by label and in a stable order.
    async fn list_sources(&self) -> Result<Vec<EnrollmentSource>, FaceError>;

    async fn read_source(&self, source: &EnrollmentSource) -> Result<Vec<u8>, FaceError>;

    /// Persist a new enrollment image; never overwrites an existing one.
    async fn save_image(
        &self,
        label: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<SavedImage, FaceError>;

    /// Image count per label, in label order.
    async fn label_counts(&self) -> Result<Vec<(String, usize)>, FaceError> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for source in self.list_sources().await? {
            match counts.iter_mut().find(|(label, _)| *label == source.label) {
                Some((_, count)) => *count += 1,
                None => counts.push((source.label, 1)),
            }
        }
        counts.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(counts)
    }

    /// Whether the backing storage is reachable.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Directory layout of an enrollment root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreLayout {
    /// `<root>/<label>/<name>.<ext>`
    PerLabel,
    /// `<root>/<username>/pics/<name>.<ext>`
    PerUserPics,
    /// `<root>/<label>.<ext>`, one image per label
    FlatFiles,
}

impl FromStr for StoreLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per_label" => Ok(Self::PerLabel),
            "per_user_pics" => Ok(Self::PerUserPics),
            "flat_files" | "flat" => Ok(Self::FlatFiles),
            other => Err(format!("unknown store layout '{}'", other)),
        }
    }
}

impl fmt::Display for StoreLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerLabel => f.write_str("per_label"),
            Self::PerUserPics => f.write_str("per_user_pics"),
            Self::FlatFiles => f.write_str("flat_files"),
        }
    }
}

const PICS_DIR: &str = "pics";

#[derive(Debug, Clone)]
pub struct FsEnrollmentStore {
    root: PathBuf,
    layout: StoreLayout,
}

impl FsEnrollmentStore {
    pub fn new(root: impl Into<PathBuf>, layout: StoreLayout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> StoreLayout {
        self.layout
    }

    fn label_dir(&self, label: &str) -> PathBuf {
        match self.layout {
            StoreLayout::PerLabel => self.root.join(label),
            StoreLayout::PerUserPics => self.root.join(label).join(PICS_DIR),
            StoreLayout::FlatFiles => self.root.clone(),
        }
    }

    async fn sources_in(&self, label: &str, dir: &Path) -> Vec<EnrollmentSource> {
        match list_entries(dir, EntryKind::File).await {
            Ok(files) => files
                .into_iter()
                .map(|path| EnrollmentSource {
                    label: label.to_string(),
                    path,
                })
                .collect(),
            Err(e) => {
                warn!(label, dir = %dir.display(), error = %e, "skipping unreadable enrollment directory");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl EnrollmentStore for FsEnrollmentStore {
    async fn list_sources(&self) -> Result<Vec<EnrollmentSource>, FaceError> {
        let kind = match self.layout {
            StoreLayout::FlatFiles => EntryKind::File,
            StoreLayout::PerLabel | StoreLayout::PerUserPics => EntryKind::Dir,
        };

        let entries = match list_entries(&self.root, kind).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "enrollment root does not exist yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(FaceError::StoreUnavailable(format!(
                    "{}: {}",
                    self.root.display(),
                    e
                )))
            }
        };

        let mut sources = Vec::new();
        for path in entries {
            match self.layout {
                StoreLayout::FlatFiles => {
                    if let Some(label) = path.file_stem().and_then(|s| s.to_str()) {
                        sources.push(EnrollmentSource {
                            label: label.to_string(),
                            path: path.clone(),
                        });
                    }
                }
                StoreLayout::PerLabel | StoreLayout::PerUserPics => {
                    let Some(label) = path.file_name().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    let dir = self.label_dir(label);
                    if self.layout == StoreLayout::PerUserPics && !is_dir(&dir).await {
                        continue;
                    }
                    sources.extend(self.sources_in(label, &dir).await);
                }
            }
        }

        Ok(sources)
    }

    async fn read_source(&self, source: &EnrollmentSource) -> Result<Vec<u8>, FaceError> {
        tokio::fs::read(&source.path)
            .await
            .map_err(|e| FaceError::EnrollmentRead {
                path: source.path.display().to_string(),
                source: e,
            })
    }

    async fn save_image(
        &self,
        label: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<SavedImage, FaceError> {
        common::validation::validate_label(label, "label")
            .map_err(|e| FaceError::InvalidLabel(e.to_string()))?;
        let extension = common::validation::validate_image_extension(extension)
            .map_err(|e| FaceError::StorageWrite(e.to_string()))?;

        let dir = self.label_dir(label);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| FaceError::StorageWrite(format!("{}: {}", dir.display(), e)))?;

        let filename = match self.layout {
            StoreLayout::FlatFiles => format!("{}.{}", label, extension),
            StoreLayout::PerLabel | StoreLayout::PerUserPics => {
                format!("{}.{}", Uuid::new_v4().simple(), extension)
            }
        };
        let path = dir.join(&filename);

        let temp_path = dir.join(format!(".{}.tmp", Uuid::new_v4().simple()));
        let published = write_then_link(&temp_path, &path, bytes).await;
        if let Err(e) = tokio::fs::remove_file(&temp_path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %temp_path.display(), error = %e, "failed to remove temporary upload");
            }
        }
        match published {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(FaceError::StorageWrite(format!(
                    "{} already exists",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(FaceError::StorageWrite(format!("{}: {}", path.display(), e)));
            }
        }

        debug!(label, path = %path.display(), bytes = bytes.len(), "stored enrollment image");

        Ok(SavedImage {
            label: label.to_string(),
            filename,
            path,
        })
    }

    async fn health_check(&self) -> bool {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) => meta.is_dir(),
            // A missing root is created on first enrollment.
            Err(e) => e.kind() == ErrorKind::NotFound,
        }
    }
}

/// Write `bytes` to `temp_path`, then publish it at `path` with a hard link.
/// Linking fails with `AlreadyExists` instead of replacing the target.
async fn write_then_link(temp_path: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(temp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::hard_link(temp_path, path).await
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
}

/// Non-hidden entries of `dir` of the given kind, sorted by path.
async fn list_entries(dir: &Path, kind: EntryKind) -> std::io::Result<Vec<PathBuf>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden {
            continue;
        }

        let path = entry.path();
        if is_wanted(&path, entry.file_type().await, kind) {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

/// An entry whose type cannot be read is skipped on its own.
fn is_wanted(path: &Path, file_type: std::io::Result<std::fs::FileType>, kind: EntryKind) -> bool {
    match file_type {
        Ok(file_type) => match kind {
            EntryKind::File => file_type.is_file(),
            EntryKind::Dir => file_type.is_dir(),
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable directory entry");
            false
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

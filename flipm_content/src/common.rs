use std::{
    ffi::OsString,
    fmt::{self, Formatter},
    io,
    path::{Path, PathBuf},
    result,
    time::SystemTime,
};

use flipm_shared::thiserror;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),
    #[error("IoError: {0}")]
    IoError(#[from] io::Error),
    #[error("Failed to {operation} '{}': {source}", .path.display())]
    IoFailure {
        operation: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    #[error("Encoder exited with {}", describe_exit_code(.exit_code))]
    ProcessFailure { exit_code: Option<i32> },
    #[error("Failed to parse '{}': {message}", .path.display())]
    ParseFailure { path: PathBuf, message: String },
    #[error("Failed to start directory watcher in directory: {0}")]
    FailedToStartDirectoryWatcher(PathBuf),
    #[error("Failed to start thread")]
    FailedToStartThread,
}

impl Error {
    /// Wraps an [`io::Error`] with the operation and the path it happened on.
    pub fn io(operation: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Error::IoFailure { operation, path, source }
    }
}

fn describe_exit_code(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by a signal)".to_owned(),
    }
}

/// Kind of source asset that has a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// 3D model that is encoded into a `.gpb` bundle together with material and scene files
    Fbx,
    /// Font that is encoded into a `.gpb` bundle
    Ttf,
}

impl AssetKind {
    /// Determines the [`AssetKind`] from an extension. The comparison is case-insensitive.
    ///
    /// # Example
    ///
    /// ```rust
    /// use flipm_content::AssetKind;
    /// assert_eq!(AssetKind::from_extension("FbX"), Some(AssetKind::Fbx));
    /// assert_eq!(AssetKind::from_extension("png"), None);
    /// ```
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_uppercase().as_str() {
            "FBX" => Some(AssetKind::Fbx),
            "TTF" => Some(AssetKind::Ttf),
            _ => None,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Fbx => write!(f, "FBX"),
            AssetKind::Ttf => write!(f, "TTF"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Changed,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Changed => write!(f, "changed"),
            ChangeKind::Removed => write!(f, "removed"),
        }
    }
}

/// A file system notification for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEvent {
    pub path: PathBuf,
    pub change: ChangeKind,
}

impl AssetEvent {
    pub fn new(path: impl Into<PathBuf>, change: ChangeKind) -> Self {
        Self { path: path.into(), change }
    }

    /// Uppercased extension of the path or an empty string when there is none.
    ///
    /// # Example
    ///
    /// ```rust
    /// use flipm_content::{AssetEvent, ChangeKind};
    /// let event = AssetEvent::new("res/models/Board-1.fbx", ChangeKind::Created);
    /// assert_eq!(event.extension(), "FBX");
    /// ```
    pub fn extension(&self) -> String {
        extract_extension_from_path(&self.path).to_uppercase()
    }

    /// Path without the extension.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::path::Path;
    /// use flipm_content::{AssetEvent, ChangeKind};
    /// let event = AssetEvent::new("res/fonts/arial.ttf", ChangeKind::Changed);
    /// assert_eq!(event.base_path(), Path::new("res/fonts/arial"));
    /// ```
    pub fn base_path(&self) -> PathBuf {
        self.path.with_extension("")
    }

    /// Returns the [`AssetKind`] when the extension belongs to an asset with a pipeline.
    pub fn kind(&self) -> Option<AssetKind> {
        AssetKind::from_extension(&self.extension())
    }
}

impl fmt::Display for AssetEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.change)
    }
}

pub(crate) fn extract_extension_from_path(path: &Path) -> String {
    path.extension()
        .map(|extension| extension.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub(crate) fn extract_file_name_from_path(path: &Path) -> Result<String> {
    Ok(path
        .file_name()
        .and_then(|file_name| file_name.to_str())
        .ok_or(Error::InvalidPath(path.to_owned()))?
        .to_owned())
}

pub(crate) fn path_to_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or(Error::InvalidPath(path.to_owned()))
}

/// Appends `suffix` to the path without interpreting dots that are already part of the file name.
pub(crate) fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(base.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}

pub(crate) fn modified_system_time(path: &Path) -> Option<SystemTime> {
    path.metadata().ok().and_then(|metadata| metadata.modified().ok())
}

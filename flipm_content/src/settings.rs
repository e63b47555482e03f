use std::{
    io,
    path::{Path, PathBuf, MAIN_SEPARATOR},
    time::Duration,
};

use crate::{Error, Result};

/// Resource directory that is used when none is given.
pub const DEFAULT_RESOURCE_DIR: &str = "./res";

/// Encoder that ships with the gameplay3d SDK for the current platform.
pub const fn default_encoder_path() -> &'static str {
    if cfg!(target_os = "windows") {
        "./gameplay3d/bin/windows/gameplay-encoder.exe"
    } else if cfg!(target_os = "macos") {
        "./gameplay3d/bin/macosx/gameplay-encoder"
    } else {
        "./gameplay3d/bin/linux/gameplay-encoder"
    }
}

/// Configuration of the watcher and the pipelines. Created once and shared read-only.
#[derive(Debug, Clone)]
pub struct Settings {
    resource_dir: PathBuf,
    encoder_path: PathBuf,
    /// Time the watcher waits for further events of the same file
    pub debounce: Duration,
    /// Process the assets whose `.gpb` file is missing or outdated when the watcher starts
    pub scan_on_start: bool,
}

impl Settings {
    /// Creates the [`Settings`] and checks that the resource directory exists.
    ///
    /// # Example
    ///
    /// ```rust
    /// use flipm_content::Settings;
    /// std::fs::create_dir_all("res").unwrap();
    /// let settings = Settings::new("res", "gameplay-encoder").unwrap();
    /// assert!(settings.resource_dir().is_absolute());
    /// ```
    pub fn new(resource_dir: impl AsRef<Path>, encoder_path: impl Into<PathBuf>) -> Result<Self> {
        let resource_dir = resource_dir.as_ref();
        if !resource_dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Directory '{}' does not exist", resource_dir.display()),
            )
            .into());
        }
        let resource_dir = resource_dir
            .canonicalize()
            .map_err(Error::io("canonicalize", resource_dir))?;
        Ok(Self {
            resource_dir,
            encoder_path: encoder_path.into(),
            debounce: Duration::from_millis(1000),
            scan_on_start: false,
        })
    }

    /// Absolute path of the watched directory.
    pub fn resource_dir(&self) -> &Path {
        &self.resource_dir
    }

    pub fn encoder_path(&self) -> &Path {
        &self.encoder_path
    }

    /// Parent of the resource directory including a trailing separator. Removing it from
    /// an absolute path yields a path that starts with the name of the resource directory.
    ///
    /// `None` when the parent is a file system root like `/`. Removing the root would
    /// turn every absolute path into a relative one, not only the paths of resources.
    pub fn resource_parent_prefix(&self) -> Option<String> {
        parent_prefix(&self.resource_dir)
    }

    /// Turns an absolute path inside the resource directory into a path relative to its
    /// parent, e.g. `/home/flipm/res/box.gpb` into `res/box.gpb`. Other paths are returned as they are.
    pub fn relative_to_resource_parent(&self, path: &Path) -> String {
        let path = path.to_string_lossy();
        match self.resource_parent_prefix() {
            Some(prefix) => path.strip_prefix(prefix.as_str()).unwrap_or(&*path).to_owned(),
            None => path.into_owned(),
        }
    }
}

fn parent_prefix(resource_dir: &Path) -> Option<String> {
    let parent = resource_dir.parent()?;
    if parent.parent().is_none() {
        return None;
    }
    let parent = parent.to_string_lossy();
    if parent.ends_with(MAIN_SEPARATOR) {
        Some(parent.into_owned())
    } else {
        Some(format!("{parent}{MAIN_SEPARATOR}"))
    }
}

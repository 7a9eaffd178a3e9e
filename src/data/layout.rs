//! On-disk layout of a measurement campaign.
//!
//! ```text
//! {root}/
//!   {component}/
//!     {component}_0.txt           completed repeat
//!     {component}_1.txt.partial   interrupted repeat, never aggregated
//!     {component}.txt             standalone sweep
//!     {COMPONENT}averages.txt     aggregated profile
//! ```

use crate::component::ComponentUnderTest;
use crate::error::{AppResult, DaqError};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

const SAMPLE_EXTENSION: &str = "txt";
const PARTIAL_SUFFIX: &str = ".partial";

/// Path conventions rooted at the configured output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    /// Layout under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every file of `component`.
    pub fn component_dir(&self, component: &ComponentUnderTest) -> PathBuf {
        self.root.join(component.name())
    }

    /// Raw file for repeat `index` of `component`.
    pub fn repeat_path(&self, component: &ComponentUnderTest, index: usize) -> PathBuf {
        self.component_dir(component)
            .join(format!("{}_{}.{}", component.name(), index, SAMPLE_EXTENSION))
    }

    /// Raw file for a standalone sweep of `component`.
    pub fn single_sweep_path(&self, component: &ComponentUnderTest) -> PathBuf {
        self.component_dir(component)
            .join(format!("{}.{}", component.name(), SAMPLE_EXTENSION))
    }

    /// Aggregated profile of `component`.
    pub fn profile_path(&self, component: &ComponentUnderTest) -> PathBuf {
        self.component_dir(component).join(format!(
            "{}averages.{}",
            component.name().to_uppercase(),
            SAMPLE_EXTENSION
        ))
    }

    /// Create the component directory; an existing one is fine.
    pub fn ensure_component_dir(&self, component: &ComponentUnderTest) -> AppResult<PathBuf> {
        let dir = self.component_dir(component);
        ensure_dir(&dir)?;
        Ok(dir)
    }

    /// Completed sample files of `component`, sorted by file name.
    ///
    /// A file qualifies when its name contains the component name and has the
    /// sample extension. The aggregated profile and interrupted (`.partial`)
    /// sweeps never qualify.
    pub fn discover_repeats(&self, component: &ComponentUnderTest) -> AppResult<Vec<PathBuf>> {
        let dir = self.component_dir(component);
        let profile = self.profile_path(component);

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DaqError::NoSampleFiles {
                    component: component.name().to_string(),
                    dir,
                })
            }
            Err(e) => return Err(DaqError::filesystem(&dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DaqError::filesystem(&dir, e))?;
            let path = entry.path();
            let is_file = entry
                .file_type()
                .map_err(|e| DaqError::filesystem(&path, e))?
                .is_file();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(component.name()));
            let is_sample =
                path.extension().and_then(|e| e.to_str()) == Some(SAMPLE_EXTENSION);

            if is_file && matches && is_sample && path != profile {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Where a sweep writes until it has completed every point.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Create `dir` (and parents). An existing directory is logged, not an error.
pub fn ensure_dir(dir: &Path) -> AppResult<()> {
    if dir.is_dir() {
        info!(dir = %dir.display(), "Directory already exists");
        return Ok(());
    }
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => {
            info!(dir = %dir.display(), "Directory already exists");
            Ok(())
        }
        Err(e) => Err(DaqError::filesystem(dir, e)),
    }
}

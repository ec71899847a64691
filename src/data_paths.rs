use std::path::{Path, PathBuf};

/// Default data directory (relative to current working directory)
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Subdirectory paths relative to the data directory
pub const DATASETS_DIR: &str = "datasets";
pub const LOGS_DIR: &str = "logs";

/// File names inside the data directory
pub const SNIPPETS_FILE: &str = "snippets.json";
pub const SETTINGS_FILE: &str = "settings.json";

/// Helper struct to manage data paths
#[derive(Clone, Debug)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Create a new DataPaths instance with the given root directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root data directory
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Get the datasets directory (one JSON file per dataset record)
    pub fn datasets(&self) -> PathBuf {
        self.root.join(DATASETS_DIR)
    }

    /// Get the snippet collection file
    pub fn snippets_file(&self) -> PathBuf {
        self.root.join(SNIPPETS_FILE)
    }

    /// Get the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    /// Get the logs directory
    pub fn logs(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// Ensure all directories exist
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.datasets())?;
        std::fs::create_dir_all(self.logs())?;
        Ok(())
    }
}

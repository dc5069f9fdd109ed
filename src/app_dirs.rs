use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn attempt_db_path() -> Option<PathBuf> {
        Self::state_dir().map(|d| d.join("attempts.db"))
    }

    pub fn receipt_dir() -> Option<PathBuf> {
        Self::state_dir().map(|d| d.join("receipts"))
    }

    fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("invigil"),
            )
        } else {
            ProjectDirs::from("", "", "invigil").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }
}

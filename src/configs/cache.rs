use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Flat directory holding one `<id>.<extension>` file per track.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            extension: default_extension(),
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from("audio")
}

fn default_extension() -> String {
    "dca".to_string()
}

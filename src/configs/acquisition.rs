use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionConfig {
    #[serde(default = "default_yt_dlp_path")]
    pub yt_dlp_path: String,
    /// yt-dlp format selector; the WebM/Opus itags in preference order.
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: default_yt_dlp_path(),
            format: default_format(),
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }
}

fn default_yt_dlp_path() -> String {
    if cfg!(windows) {
        "cmd/yt-dlp/yt-dlp.exe".to_string()
    } else {
        "cmd/yt-dlp/yt-dlp".to_string()
    }
}

fn default_format() -> String {
    "251/250/249".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

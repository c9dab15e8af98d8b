use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlaybackConfig {
    /// Chunks the live pipe buffers before the converter blocks on the reader.
    #[serde(default = "default_live_buffer_chunks")]
    pub live_buffer_chunks: usize,
    /// Frames read ahead of the playback sink.
    #[serde(default = "default_frame_buffer")]
    pub frame_buffer: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            live_buffer_chunks: default_live_buffer_chunks(),
            frame_buffer: default_frame_buffer(),
        }
    }
}

fn default_live_buffer_chunks() -> usize {
    256
}

fn default_frame_buffer() -> usize {
    50
}

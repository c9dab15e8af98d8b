pub mod audio;
pub mod cache;
pub mod common;
pub mod configs;
pub mod jukebox;
pub mod player;
pub mod sources;
pub mod voice;

pub use jukebox::Jukebox;

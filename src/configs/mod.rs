pub mod acquisition;
pub mod base;
pub mod cache;
pub mod logging;
pub mod playback;

pub use acquisition::*;
pub use base::*;
pub use cache::*;
pub use logging::*;
pub use playback::*;

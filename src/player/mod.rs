pub mod events;
pub mod manager;
pub mod playback;
pub mod state;

pub use events::{EventSender, PlaybackEvent, TrackEndReason, TrackException};
pub use manager::{PlayOutcome, PlaybackManager, SessionHandle};
pub use playback::SessionReport;
pub use state::SessionState;

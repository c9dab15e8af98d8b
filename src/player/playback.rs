//! The `Speaking → Draining → Disconnected` half of a session.
//!
//! Frames are read on a dedicated pump thread (sources block on disk or on
//! the live pipe) and handed to the async loop through a bounded channel, so
//! the sink is never starved by a slow read and the runtime never blocks.

use std::{sync::Arc, thread};

use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::{
    events::{self, EventSender, PlaybackEvent, TrackEndReason, TrackException},
    state::{SessionState, StateCell},
};
use crate::{
    audio::source::FrameSource,
    common::{
        errors::{FrameError, PlaybackError},
        types::{Destination, GuildId},
    },
    voice::PlaybackSink,
};

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub destination: Destination,
    pub frames: u64,
    pub reason: TrackEndReason,
    pub error: Option<PlaybackError>,
}

/// Per-guild marker in the manager's session map.
#[derive(Debug)]
pub(crate) struct ActiveSession {
    pub destination: Destination,
    pub state: StateCell,
}

/// Clears the guild marker, but only if it is still ours.
pub(crate) struct Release {
    pub sessions: Arc<DashMap<GuildId, Arc<ActiveSession>>>,
    pub marker: Arc<ActiveSession>,
}

impl Release {
    pub fn release(&self) {
        let guild_id = &self.marker.destination.guild_id;
        self.sessions
            .remove_if(guild_id, |_, current| Arc::ptr_eq(current, &self.marker));
    }
}

pub(crate) struct Session {
    pub title: String,
    pub live: bool,
    pub sink: Box<dyn PlaybackSink>,
    pub source: Box<dyn FrameSource>,
    pub frame_buffer: usize,
    pub events: EventSender,
    pub release: Release,
}

impl Session {
    pub async fn run(self) -> SessionReport {
        let Session {
            title,
            live,
            mut sink,
            source,
            frame_buffer,
            events,
            release,
        } = self;
        let destination = release.marker.destination.clone();
        let state = release.marker.state.clone();

        info!("Playing \"{}\" in {}", title, destination);
        events::emit(
            &events,
            PlaybackEvent::TrackStart {
                guild_id: destination.guild_id.clone(),
                title: title.clone(),
                live,
            },
        );

        let mut frames = 0u64;
        let mut failure: Option<(TrackEndReason, PlaybackError)> = None;

        match spawn_pump(source, frame_buffer) {
            Err(e) => failure = Some((TrackEndReason::LoadFailed, e.into())),
            Ok(rx) => {
                if let Err(e) = sink.set_speaking(true).await {
                    failure = Some((TrackEndReason::Cleanup, e));
                } else {
                    while let Ok(item) = rx.recv_async().await {
                        match item {
                            Ok(frame) => {
                                if let Err(e) = sink.send_frame(frame).await {
                                    failure = Some((TrackEndReason::Cleanup, e));
                                    break;
                                }
                                frames += 1;
                            }
                            Err(e) => {
                                failure = Some((TrackEndReason::LoadFailed, e.into()));
                                break;
                            }
                        }
                    }
                }
                // Dropping the receiver stops the pump at its next frame.
                drop(rx);
            }
        }

        state.set(SessionState::Draining);
        if let Err(e) = sink.set_speaking(false).await {
            debug!("Failed to clear speaking state in {}: {}", destination, e);
        }
        sink.disconnect().await;
        drop(sink);

        release.release();
        state.set(SessionState::Disconnected);

        let (reason, error) = match failure {
            None => (TrackEndReason::Finished, None),
            Some((reason, e)) => {
                warn!("Session in {} ended after {} frames: {}", destination, frames, e);
                events::emit(
                    &events,
                    PlaybackEvent::TrackException {
                        guild_id: destination.guild_id.clone(),
                        title: title.clone(),
                        exception: TrackException::new(e.to_string(), e.severity()),
                    },
                );
                (reason, Some(e))
            }
        };

        info!(
            "Finished \"{}\" in {} ({} frames, {:?})",
            title, destination, frames, reason
        );
        events::emit(
            &events,
            PlaybackEvent::TrackEnd {
                guild_id: destination.guild_id.clone(),
                title,
                reason,
                frames,
            },
        );

        SessionReport {
            destination,
            frames,
            reason,
            error,
        }
    }
}

type PumpItem = Result<Bytes, FrameError>;

fn spawn_pump(
    mut source: Box<dyn FrameSource>,
    capacity: usize,
) -> Result<flume::Receiver<PumpItem>, FrameError> {
    let (tx, rx) = flume::bounded::<PumpItem>(capacity.max(1));

    thread::Builder::new()
        .name("frame-pump".to_string())
        .spawn(move || {
            loop {
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        if tx.send(Ok(frame)).is_err() {
                            debug!("Session stopped reading; frame pump exits");
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        })?;

    Ok(rx)
}

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    events::EventSender,
    playback::{ActiveSession, Release, Session, SessionReport},
    state::{SessionState, StateCell},
};
use crate::{
    audio::source::AudioSource,
    common::{
        errors::{PipelineError, PlaybackError},
        types::{Destination, GuildId},
    },
    configs::PlaybackConfig,
    voice::VoiceConnector,
};

/// Result of a play request that did not fail outright.
#[derive(Debug)]
pub enum PlayOutcome {
    Started(SessionHandle),
    /// The same channel already has a session; the request is dropped.
    AlreadyPlaying(Destination),
    /// Another channel of the same guild holds the guild.
    AlreadyActiveElsewhere(Destination),
}

/// Owns the one-session-per-guild rule and starts sessions.
pub struct PlaybackManager {
    connector: Arc<dyn VoiceConnector>,
    sessions: Arc<DashMap<GuildId, Arc<ActiveSession>>>,
    frame_buffer: usize,
}

impl PlaybackManager {
    pub fn new(connector: Arc<dyn VoiceConnector>, config: &PlaybackConfig) -> Self {
        Self {
            connector,
            sessions: Arc::new(DashMap::new()),
            frame_buffer: config.frame_buffer,
        }
    }

    /// State of the session currently holding `guild_id`, if any.
    pub fn state_of(&self, guild_id: &GuildId) -> Option<SessionState> {
        self.sessions.get(guild_id).map(|s| s.state.get())
    }

    /// Destination of the session currently holding `guild_id`, if any.
    pub fn active_destination(&self, guild_id: &GuildId) -> Option<Destination> {
        self.sessions.get(guild_id).map(|s| s.destination.clone())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Checks exclusivity without claiming anything.
    pub fn check(&self, destination: &Destination) -> Option<PlayOutcome> {
        self.sessions
            .get(&destination.guild_id)
            .map(|active| conflict(&active.destination, destination))
    }

    /// Claims the destination's guild, joins it and starts streaming
    /// `source`. On any failure before streaming starts, the guild is
    /// released again and the error is returned.
    pub async fn play(
        &self,
        destination: Destination,
        title: impl Into<String>,
        source: AudioSource,
        events: EventSender,
    ) -> Result<PlayOutcome, PlaybackError> {
        let marker = match self.sessions.entry(destination.guild_id.clone()) {
            Entry::Occupied(entry) => {
                let outcome = conflict(&entry.get().destination, &destination);
                debug!("Rejected play request for {}: {:?}", destination, outcome);
                return Ok(outcome);
            }
            Entry::Vacant(entry) => {
                let marker = Arc::new(ActiveSession {
                    destination: destination.clone(),
                    state: StateCell::new(SessionState::Joining),
                });
                entry.insert(marker.clone());
                marker
            }
        };

        let release = Release {
            sessions: self.sessions.clone(),
            marker,
        };
        let state = release.marker.state.clone();
        let live = source.is_live();

        let source = match source.open() {
            Ok(source) => source,
            Err(e) => {
                state.set(SessionState::Disconnected);
                release.release();
                return Err(e);
            }
        };

        let sink = match self.connector.join(&destination).await {
            Ok(sink) => sink,
            Err(e) => {
                warn!("Error joining voice channel {}: {}", destination, e);
                state.set(SessionState::Disconnected);
                release.release();
                return Err(e);
            }
        };

        state.set(SessionState::Speaking);
        info!("Session started in {}", destination);

        let session = Session {
            title: title.into(),
            live,
            sink,
            source,
            frame_buffer: self.frame_buffer,
            events,
            release,
        };
        let task = tokio::spawn(session.run());

        Ok(PlayOutcome::Started(SessionHandle {
            destination,
            state,
            task,
        }))
    }
}

fn conflict(active: &Destination, requested: &Destination) -> PlayOutcome {
    if active.channel_id == requested.channel_id {
        PlayOutcome::AlreadyPlaying(active.clone())
    } else {
        PlayOutcome::AlreadyActiveElsewhere(active.clone())
    }
}

/// Handle to a running session.
#[derive(Debug)]
pub struct SessionHandle {
    destination: Destination,
    state: StateCell,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Waits for the session to reach `Disconnected`.
    pub async fn wait(self) -> Result<SessionReport, PipelineError> {
        self.task
            .await
            .map_err(|e| PipelineError::Aborted(e.to_string()))
    }
}

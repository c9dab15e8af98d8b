use serde::Serialize;

use crate::{
    cache::ContentId,
    common::{errors::Severity, types::GuildId},
};

pub type EventSender = flume::Sender<PlaybackEvent>;

/// Requester-visible notifications. Delivery is best effort: a requester
/// that dropped its receiver simply stops hearing about things.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PlaybackEvent {
    #[serde(rename = "StatusEvent")]
    Status {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        message: String,
    },

    #[serde(rename = "TrackStartEvent")]
    TrackStart {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        title: String,
        live: bool,
    },

    #[serde(rename = "TrackEndEvent")]
    TrackEnd {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        title: String,
        reason: TrackEndReason,
        frames: u64,
    },

    #[serde(rename = "TrackExceptionEvent")]
    TrackException {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        title: String,
        exception: TrackException,
    },

    #[serde(rename = "CacheStoredEvent")]
    CacheStored {
        #[serde(rename = "contentId")]
        content_id: ContentId,
        path: String,
        frames: u64,
    },

    #[serde(rename = "ConversionFailedEvent")]
    ConversionFailed {
        #[serde(rename = "contentId")]
        content_id: ContentId,
        exception: TrackException,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    /// The source reached a clean end of stream.
    Finished,
    /// The source failed mid-stream.
    LoadFailed,
    /// The playback sink failed; the session was torn down.
    Cleanup,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackException {
    pub message: String,
    pub severity: Severity,
}

impl TrackException {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

pub(crate) fn emit(events: &EventSender, event: PlaybackEvent) {
    let _ = events.send(event);
}

pub(crate) fn status(events: &EventSender, guild_id: &GuildId, message: impl Into<String>) {
    emit(
        events,
        PlaybackEvent::Status {
            guild_id: guild_id.clone(),
            message: message.into(),
        },
    );
}

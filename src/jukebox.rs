//! Play-request glue: query → cache or conversion → playback session.
//!
//! Every step reports to the requester through [`PlaybackEvent`]s so a chat
//! front end can relay them verbatim.

use std::sync::Arc;

use tracing::{error, info};

use crate::{
    audio::processor::{AudioProcessor, Prepared},
    common::{errors::PipelineError, types::Destination},
    player::{
        EventSender, PlayOutcome, PlaybackEvent, PlaybackManager, TrackException,
        events::{emit, status},
    },
    sources::Query,
};

pub struct Jukebox {
    processor: Arc<AudioProcessor>,
    manager: PlaybackManager,
}

impl Jukebox {
    pub fn new(processor: Arc<AudioProcessor>, manager: PlaybackManager) -> Self {
        Self { processor, manager }
    }

    pub fn processor(&self) -> &Arc<AudioProcessor> {
        &self.processor
    }

    pub fn manager(&self) -> &PlaybackManager {
        &self.manager
    }

    /// Handles one play request for `destination`.
    ///
    /// A busy guild is reported before anything is resolved. Once a
    /// conversion starts it runs to the end and lands in the cache, even if
    /// the session never starts or stops early.
    pub async fn play(
        &self,
        input: &str,
        destination: Destination,
        events: EventSender,
    ) -> Result<PlayOutcome, PipelineError> {
        let guild_id = destination.guild_id.clone();

        if let Some(outcome) = self.manager.check(&destination) {
            report_conflict(&events, &outcome, &destination);
            return Ok(outcome);
        }

        let query = match Query::parse(input) {
            Ok(query) => query,
            Err(e) => {
                status(&events, &guild_id, format!("Error processing audio: {e}"));
                return Err(e.into());
            }
        };
        if let Query::Search(text) = &query {
            status(&events, &guild_id, format!("Searching for: {text}"));
        }

        let prepared = match self.processor.prepare(&query).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Error processing audio for {}: {}", query, e);
                status(&events, &guild_id, format!("Error processing audio: {e}"));
                return Err(e);
            }
        };

        let title = match &prepared {
            Prepared::Cached { id, .. } => {
                status(
                    &events,
                    &guild_id,
                    format!("Found cached audio for video ID: {id}. Playing now..."),
                );
                id.to_string()
            }
            Prepared::Live { track, .. } => {
                status(
                    &events,
                    &guild_id,
                    format!("Processing audio from YouTube video: {}", track.title),
                );
                track.title.clone()
            }
        };

        let (source, completion) = prepared.into_source();
        if let Some(completion) = completion {
            let events = events.clone();
            tokio::spawn(async move {
                let id = completion.id().clone();
                match completion.wait().await {
                    Ok(report) => emit(
                        &events,
                        PlaybackEvent::CacheStored {
                            content_id: report.id,
                            path: report.path.display().to_string(),
                            frames: report.stats.frames,
                        },
                    ),
                    Err(e) => emit(
                        &events,
                        PlaybackEvent::ConversionFailed {
                            content_id: id,
                            exception: TrackException::new(e.to_string(), e.severity()),
                        },
                    ),
                }
            });
        }

        match self
            .manager
            .play(destination.clone(), title, source, events.clone())
            .await
        {
            Ok(outcome) => {
                if let PlayOutcome::Started(_) = &outcome {
                    info!("Play request for {} started", destination);
                } else {
                    report_conflict(&events, &outcome, &destination);
                }
                Ok(outcome)
            }
            Err(e) => {
                status(&events, &guild_id, e.to_string());
                Err(e.into())
            }
        }
    }
}

fn report_conflict(events: &EventSender, outcome: &PlayOutcome, requested: &Destination) {
    let message = match outcome {
        PlayOutcome::AlreadyPlaying(_) => "I'm already playing in this channel",
        PlayOutcome::AlreadyActiveElsewhere(_) => "I'm already in another channel",
        PlayOutcome::Started(_) => return,
    };
    info!("Play request for {} rejected: {}", requested, message);
    status(events, &requested.guild_id, message);
}

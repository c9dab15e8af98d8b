//! Playback sink seam.
//!
//! The real-time transport is somebody else's problem; a session only needs
//! to join a destination, toggle speaking and push frame payloads. Any
//! transport that can do that implements [`VoiceConnector`].

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::common::{errors::PlaybackError, types::Destination};

/// Acquires a playback sink for one destination.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn join(&self, destination: &Destination)
    -> Result<Box<dyn PlaybackSink>, PlaybackError>;
}

/// A joined voice link.
#[async_trait]
pub trait PlaybackSink: Send {
    async fn set_speaking(&mut self, speaking: bool) -> Result<(), PlaybackError>;

    /// Payload only; the length prefix never leaves the process.
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), PlaybackError>;

    /// Leaves the destination. Called exactly once per joined sink.
    async fn disconnect(&mut self);
}

/// What a [`ChannelConnector`] forwards to the transport task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoicePacket {
    Joined(Destination),
    Speaking(Destination, bool),
    Frame(Destination, Bytes),
    Left(Destination),
}

/// Connector that hands everything to a transport task over a bounded
/// channel. A full channel makes `send_frame` wait, which paces playback.
#[derive(Clone)]
pub struct ChannelConnector {
    tx: flume::Sender<VoicePacket>,
}

impl ChannelConnector {
    pub fn new(capacity: usize) -> (Self, flume::Receiver<VoicePacket>) {
        let (tx, rx) = flume::bounded(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl VoiceConnector for ChannelConnector {
    async fn join(
        &self,
        destination: &Destination,
    ) -> Result<Box<dyn PlaybackSink>, PlaybackError> {
        self.tx
            .send_async(VoicePacket::Joined(destination.clone()))
            .await
            .map_err(|_| PlaybackError::Join("voice transport is not running".into()))?;

        debug!("Joined voice channel {}", destination);
        Ok(Box::new(ChannelSink {
            tx: self.tx.clone(),
            destination: destination.clone(),
        }))
    }
}

struct ChannelSink {
    tx: flume::Sender<VoicePacket>,
    destination: Destination,
}

impl ChannelSink {
    async fn send(&self, packet: VoicePacket) -> Result<(), PlaybackError> {
        self.tx
            .send_async(packet)
            .await
            .map_err(|_| PlaybackError::Sink("voice transport went away".into()))
    }
}

#[async_trait]
impl PlaybackSink for ChannelSink {
    async fn set_speaking(&mut self, speaking: bool) -> Result<(), PlaybackError> {
        self.send(VoicePacket::Speaking(self.destination.clone(), speaking))
            .await
    }

    async fn send_frame(&mut self, frame: Bytes) -> Result<(), PlaybackError> {
        self.send(VoicePacket::Frame(self.destination.clone(), frame))
            .await
    }

    async fn disconnect(&mut self) {
        // The transport may already be gone; leaving is then implicit.
        let _ = self.send(VoicePacket::Left(self.destination.clone())).await;
        debug!("Left voice channel {}", self.destination);
    }
}

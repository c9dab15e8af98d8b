#![allow(dead_code)]

use std::{
    io::Cursor,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use dcastream::{
    Jukebox,
    audio::{AudioProcessor, demux::ebml::ids::*},
    cache::ContentCache,
    common::{
        errors::{AcquisitionError, PlaybackError},
        types::Destination,
    },
    configs::PlaybackConfig,
    player::{PlaybackEvent, PlaybackManager},
    sources::{MediaFetcher, MediaStream, Query, Resolver, TrackInfo},
    voice::{PlaybackSink, VoiceConnector},
};

pub const RICK: &str = "dQw4w9WgXcQ";
pub const RICK_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

fn element(id: u32, body: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = id.to_be_bytes().into_iter().skip_while(|&b| b == 0).collect();
    out.push(0x01);
    out.extend_from_slice(&(body.len() as u64).to_be_bytes()[1..]);
    out.extend_from_slice(body);
    out
}

fn uint(id: u32, value: u64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

fn simple_block(body: &[u8]) -> Vec<u8> {
    element(SIMPLE_BLOCK, body)
}

fn block_body(packet: &[u8]) -> Vec<u8> {
    let mut out = vec![0x81, 0x00, 0x00, 0x80];
    out.extend_from_slice(packet);
    out
}

fn container(cluster_body: Vec<u8>) -> Vec<u8> {
    let mut entry = uint(TRACK_NUMBER, 1);
    entry.extend(element(CODEC_ID, b"A_OPUS"));

    let mut segment = element(INFO, &uint(TIMECODE_SCALE, 1_000_000));
    segment.extend(element(TRACKS, &element(TRACK_ENTRY, &entry)));
    segment.extend(element(CLUSTER, &cluster_body));

    let mut out = element(EBML, &element(DOC_TYPE, b"webm"));
    out.extend(element(SEGMENT, &segment));
    out
}

/// Audio-only WebM carrying `packets` as SimpleBlocks.
pub fn webm(packets: &[Vec<u8>]) -> Vec<u8> {
    let mut cluster = uint(TIMECODE, 0);
    for packet in packets {
        cluster.extend(simple_block(&block_body(packet)));
    }
    container(cluster)
}

/// WebM whose third block is only three bytes long.
pub fn malformed_webm() -> Vec<u8> {
    let mut cluster = uint(TIMECODE, 0);
    cluster.extend(simple_block(&block_body(&[0xFC, 1])));
    cluster.extend(simple_block(&block_body(&[0xFC, 2])));
    cluster.extend(simple_block(&[0x81, 0x00, 0x00]));
    cluster.extend(simple_block(&block_body(&[0xFC, 3])));
    container(cluster)
}

pub fn packets(count: u8) -> Vec<Vec<u8>> {
    (0..count).map(|i| vec![0xFC, i, 0xFF - i]).collect()
}

pub struct MockResolver {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Resolver for MockResolver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn resolve(&self, _query: &Query) -> Result<TrackInfo, AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TrackInfo {
            title: "Never Gonna Give You Up".into(),
            duration: Some(212.0),
            id: RICK.into(),
            media_url: "https://media.invalid/videoplayback".into(),
        })
    }
}

pub struct MockFetcher {
    pub body: Vec<u8>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn open(&self, _url: &str) -> Result<MediaStream, AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Cursor::new(self.body.clone())))
    }
}

/// Voice connector whose first joined sink can be told to fail after a
/// number of frames, or to hold every frame until released.
pub struct TestConnector {
    pub joins: AtomicUsize,
    pub fail_first_after: Option<usize>,
    pub gate: Option<flume::Receiver<()>>,
    pub delivered: Arc<AtomicUsize>,
}

impl TestConnector {
    pub fn new() -> Self {
        Self {
            joins: AtomicUsize::new(0),
            fail_first_after: None,
            gate: None,
            delivered: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct TestSink {
    fail_after: Option<usize>,
    sent: usize,
    gate: Option<flume::Receiver<()>>,
    delivered: Arc<AtomicUsize>,
}

#[async_trait]
impl VoiceConnector for TestConnector {
    async fn join(
        &self,
        _destination: &Destination,
    ) -> Result<Box<dyn PlaybackSink>, PlaybackError> {
        let first = self.joins.fetch_add(1, Ordering::SeqCst) == 0;
        Ok(Box::new(TestSink {
            fail_after: if first { self.fail_first_after } else { None },
            sent: 0,
            gate: if first { self.gate.clone() } else { None },
            delivered: self.delivered.clone(),
        }))
    }
}

#[async_trait]
impl PlaybackSink for TestSink {
    async fn set_speaking(&mut self, _speaking: bool) -> Result<(), PlaybackError> {
        Ok(())
    }

    async fn send_frame(&mut self, _frame: Bytes) -> Result<(), PlaybackError> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv_async().await;
        }
        if self.fail_after == Some(self.sent) {
            return Err(PlaybackError::Sink("voice link dropped".into()));
        }
        self.sent += 1;
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) {}
}

pub struct Harness {
    pub jukebox: Jukebox,
    pub cache: Arc<ContentCache>,
    pub resolver: Arc<MockResolver>,
    pub fetcher: Arc<MockFetcher>,
}

pub fn harness(root: &Path, body: Vec<u8>, connector: TestConnector) -> Harness {
    let config = PlaybackConfig {
        live_buffer_chunks: 8,
        frame_buffer: 4,
    };
    let cache = Arc::new(ContentCache::empty(root.to_path_buf(), "dca"));
    let resolver = Arc::new(MockResolver {
        calls: AtomicUsize::new(0),
    });
    let fetcher = Arc::new(MockFetcher {
        body,
        calls: AtomicUsize::new(0),
    });
    let processor = Arc::new(AudioProcessor::new(
        cache.clone(),
        resolver.clone(),
        fetcher.clone(),
        &config,
    ));
    let manager = PlaybackManager::new(Arc::new(connector), &config);

    Harness {
        jukebox: Jukebox::new(processor, manager),
        cache,
        resolver,
        fetcher,
    }
}

/// Waits for the first event matching `pred`.
pub async fn next_event(
    events: &flume::Receiver<PlaybackEvent>,
    pred: impl Fn(&PlaybackEvent) -> bool,
) -> PlaybackEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv_async().await.expect("event channel open");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event arrived in time")
}

//! `AudioProcessor` — ties query → cache / resolver → fetch → demux → fan-out.
//!
//! ```text
//!                 ┌──────────────┐      ┌─────────────┐
//!  media stream ─►│ WebM demuxer │─DCA─►│ FanoutWriter│──► .<id>.<uuid>.part ──rename──► <id>.dca
//!                 └──────────────┘      └──────┬──────┘
//!                     "dca-convert" thread     └────────► PipeWriter ──► PipeReader (live playback)
//! ```
//!
//! A conversion runs on its own thread and reports through a
//! [`ConversionHandle`]. The cache learns about the file only after it has
//! been synced and renamed into place.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        demux::{DemuxStats, demux_to_frames},
        fanout::FanoutWriter,
        pipe::{PipeReader, PipeWriter, pipe},
        source::AudioSource,
    },
    cache::{ContentCache, ContentId},
    common::errors::PipelineError,
    configs::PlaybackConfig,
    sources::{MediaFetcher, MediaStream, Query, Resolver, TrackInfo},
};

/// What a play request gets back from [`AudioProcessor::prepare`].
pub enum Prepared {
    /// Already converted; nothing was resolved or fetched unless the query
    /// had to be searched to learn the id.
    Cached { id: ContentId, path: PathBuf },
    /// Converting now. `stream` yields frames as they are demuxed.
    Live {
        track: TrackInfo,
        id: ContentId,
        stream: PipeReader,
        completion: ConversionHandle,
    },
}

impl Prepared {
    pub fn id(&self) -> &ContentId {
        match self {
            Self::Cached { id, .. } | Self::Live { id, .. } => id,
        }
    }

    /// Splits into a playable source and, for live conversions, the handle
    /// that reports when the cache file is done.
    pub fn into_source(self) -> (AudioSource, Option<ConversionHandle>) {
        match self {
            Self::Cached { path, .. } => (AudioSource::Cached(path), None),
            Self::Live {
                stream, completion, ..
            } => (AudioSource::Live(stream), Some(completion)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub id: ContentId,
    pub path: PathBuf,
    pub stats: DemuxStats,
}

/// Completion signal of one background conversion.
pub struct ConversionHandle {
    id: ContentId,
    rx: flume::Receiver<Result<ConversionReport, PipelineError>>,
}

impl ConversionHandle {
    pub fn id(&self) -> &ContentId {
        &self.id
    }

    /// Resolves once the file is registered in the cache, or with the error
    /// that stopped the conversion.
    pub async fn wait(self) -> Result<ConversionReport, PipelineError> {
        match self.rx.recv_async().await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Aborted(format!(
                "conversion of {} exited without a result",
                self.id
            ))),
        }
    }
}

pub struct AudioProcessor {
    cache: Arc<ContentCache>,
    resolver: Arc<dyn Resolver>,
    fetcher: Arc<dyn MediaFetcher>,
    live_buffer: usize,
}

impl AudioProcessor {
    pub fn new(
        cache: Arc<ContentCache>,
        resolver: Arc<dyn Resolver>,
        fetcher: Arc<dyn MediaFetcher>,
        config: &PlaybackConfig,
    ) -> Self {
        Self {
            cache,
            resolver,
            fetcher,
            live_buffer: config.live_buffer_chunks,
        }
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    pub async fn prepare(&self, query: &Query) -> Result<Prepared, PipelineError> {
        if let Some(id) = query.content_id() {
            if let Some(path) = self.cache.lookup(id) {
                debug!("Cache hit for {} before resolving", id);
                return Ok(Prepared::Cached {
                    id: id.clone(),
                    path,
                });
            }
        }

        let track = self.resolver.resolve(query).await?;
        let id = ContentId::parse(&track.id)?;

        if let Some(path) = self.cache.lookup(&id) {
            debug!("{} resolved to cached {}", query, id);
            return Ok(Prepared::Cached { id, path });
        }

        info!("Processing audio from YouTube video: {}", track.title);
        let media = self.fetcher.open(&track.media_url).await?;

        let (writer, stream) = pipe(self.live_buffer);
        let completion = spawn_conversion(self.cache.clone(), id.clone(), media, writer)?;

        Ok(Prepared::Live {
            track,
            id,
            stream,
            completion,
        })
    }

    /// Makes sure `query` ends up in the cache without playing it.
    pub async fn prefetch(&self, query: &Query) -> Result<(ContentId, PathBuf), PipelineError> {
        match self.prepare(query).await? {
            Prepared::Cached { id, path } => Ok((id, path)),
            Prepared::Live {
                stream, completion, ..
            } => {
                drop(stream);
                let report = completion.wait().await?;
                Ok((report.id, report.path))
            }
        }
    }
}

fn spawn_conversion(
    cache: Arc<ContentCache>,
    id: ContentId,
    media: MediaStream,
    live: PipeWriter,
) -> Result<ConversionHandle, PipelineError> {
    let (tx, rx) = flume::bounded(1);
    let thread_id = id.clone();

    thread::Builder::new()
        .name("dca-convert".to_string())
        .spawn(move || {
            let result = convert(&cache, &thread_id, media, live);
            match &result {
                Ok(report) => info!(
                    "Converted {} ({} frames, {} bytes) to {}",
                    report.id,
                    report.stats.frames,
                    report.stats.bytes,
                    report.path.display()
                ),
                Err(e) => error!("Error processing audio for {}: {}", thread_id, e),
            }
            let _ = tx.send(result);
        })
        .map_err(|e| PipelineError::Aborted(format!("failed to start conversion: {e}")))?;

    Ok(ConversionHandle { id, rx })
}

fn convert(
    cache: &ContentCache,
    id: &ContentId,
    media: MediaStream,
    mut live: PipeWriter,
) -> Result<ConversionReport, PipelineError> {
    let staging = cache.staging_path_for(id);
    let file = match File::create(&staging) {
        Ok(file) => file,
        Err(e) => {
            live.fail(format!("failed to create cache file: {e}"));
            return Err(PipelineError::Sink(e));
        }
    };
    let mut file = BufWriter::new(file);

    let demuxed = {
        let sinks: Vec<&mut dyn Write> = vec![&mut file as &mut dyn Write, &mut live];
        demux_to_frames(media, FanoutWriter::new(sinks))
    };

    let stats = match demuxed {
        Ok(stats) => stats,
        Err(e) => {
            let e = PipelineError::from(e);
            live.fail(&e);
            drop(file);
            discard(&staging);
            return Err(e);
        }
    };

    if live.is_detached() {
        debug!("Live reader of {} left early; cache file completed anyway", id);
    }
    // The live side has every frame; let playback finish while we seal.
    drop(live);

    let path = cache.path_for(id);
    if let Err(e) = seal(file, &staging, &path) {
        discard(&staging);
        return Err(PipelineError::Sink(e));
    }

    cache.register(id.clone(), path.clone());
    Ok(ConversionReport {
        id: id.clone(),
        path,
        stats,
    })
}

fn seal(file: BufWriter<File>, staging: &Path, path: &Path) -> std::io::Result<()> {
    let file = file.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);
    fs::rename(staging, path)
}

fn discard(staging: &Path) {
    if let Err(e) = fs::remove_file(staging) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove staging file {}: {}", staging.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Cursor, Read},
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        audio::{
            demux::{
                ebml::ids,
                test_support::{block, element, webm},
            },
            frame::FrameReader,
        },
        common::errors::{AcquisitionError, ParseError},
    };

    const RICK: &str = "dQw4w9WgXcQ";

    struct FixedResolver {
        id: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Resolver for FixedResolver {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn resolve(&self, _query: &Query) -> Result<TrackInfo, AcquisitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TrackInfo {
                title: "Never Gonna Give You Up".into(),
                duration: Some(212.0),
                id: self.id.into(),
                media_url: "memory://webm".into(),
            })
        }
    }

    struct MemoryFetcher {
        body: Vec<u8>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaFetcher for MemoryFetcher {
        async fn open(&self, _url: &str) -> Result<MediaStream, AcquisitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Cursor::new(self.body.clone())))
        }
    }

    struct Fixture {
        dir: TempDir,
        resolver: Arc<FixedResolver>,
        fetcher: Arc<MemoryFetcher>,
        processor: AudioProcessor,
    }

    fn fixture(body: Vec<u8>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(ContentCache::empty(dir.path().to_path_buf(), "dca"));
        let resolver = Arc::new(FixedResolver {
            id: RICK,
            calls: AtomicUsize::new(0),
        });
        let fetcher = Arc::new(MemoryFetcher {
            body,
            calls: AtomicUsize::new(0),
        });
        let processor = AudioProcessor::new(
            cache,
            resolver.clone(),
            fetcher.clone(),
            &PlaybackConfig {
                live_buffer_chunks: 2,
                frame_buffer: 2,
            },
        );
        Fixture {
            dir,
            resolver,
            fetcher,
            processor,
        }
    }

    fn packets() -> Vec<Vec<u8>> {
        (0..40u8).map(|i| vec![0xFC, i, i, i]).collect()
    }

    fn read_frames(reader: impl Read) -> Result<Vec<Bytes>, crate::common::errors::FrameError> {
        FrameReader::new(reader).collect()
    }

    fn leftover_staging(dir: &TempDir) -> usize {
        fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".part")
            })
            .count()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn live_stream_and_cache_file_carry_the_same_frames() {
        let fx = fixture(webm(&packets()));
        let query = Query::parse("https://youtu.be/dQw4w9WgXcQ").unwrap();

        let Prepared::Live {
            stream, completion, ..
        } = fx.processor.prepare(&query).await.unwrap()
        else {
            panic!("empty cache should convert");
        };

        let live = tokio::task::spawn_blocking(move || read_frames(stream))
            .await
            .unwrap()
            .unwrap();
        let report = completion.wait().await.unwrap();

        assert_eq!(report.stats.frames, 40);
        let cached = read_frames(File::open(&report.path).unwrap()).unwrap();
        assert_eq!(live, cached);
        assert_eq!(live[7], Bytes::from(vec![0xFC, 7, 7, 7]));

        let id = ContentId::parse(RICK).unwrap();
        assert_eq!(fx.processor.cache().lookup(&id), Some(report.path));
        assert_eq!(leftover_staging(&fx.dir), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unread_live_stream_holds_the_cache_file_back() {
        let fx = fixture(webm(&packets()));
        let id = ContentId::parse(RICK).unwrap();
        let final_path = fx.processor.cache().path_for(&id);

        let Prepared::Live {
            stream, completion, ..
        } = fx.processor.prepare(&Query::Search("rick".into())).await.unwrap()
        else {
            panic!("empty cache should convert");
        };

        // The pipe holds two chunks, far fewer than 40 frames, so the
        // converter blocks until the stream is read.
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while leftover_staging(&fx.dir) == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("staging file created");
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert!(completion.rx.is_empty(), "conversion outran its live reader");
        assert!(fx.processor.cache().lookup(&id).is_none());
        assert!(!final_path.exists());
        assert_eq!(leftover_staging(&fx.dir), 1);

        let live = tokio::task::spawn_blocking(move || read_frames(stream))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.len(), 40);

        let report = completion.wait().await.unwrap();
        assert_eq!(report.path, final_path);
        assert_eq!(fx.processor.cache().lookup(&id), Some(final_path.clone()));
        assert_eq!(read_frames(File::open(&final_path).unwrap()).unwrap(), live);
        assert_eq!(leftover_staging(&fx.dir), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cached_ids_skip_acquisition() {
        let fx = fixture(webm(&packets()));
        let by_url = Query::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();

        fx.processor.prefetch(&by_url).await.unwrap();
        assert_eq!(fx.resolver.calls.load(Ordering::SeqCst), 1);

        let again = fx.processor.prepare(&by_url).await.unwrap();
        assert!(matches!(again, Prepared::Cached { .. }));
        assert_eq!(fx.resolver.calls.load(Ordering::SeqCst), 1);

        // A search must resolve first, but finds the cached id and stops there.
        let search = Query::parse("rick astley").unwrap();
        let found = fx.processor.prepare(&search).await.unwrap();
        assert!(matches!(found, Prepared::Cached { .. }));
        assert_eq!(fx.resolver.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fx.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn malformed_container_fails_both_sides() {
        let mut cluster = element(ids::SIMPLE_BLOCK, &block(&[0xAA]));
        cluster.extend(element(ids::SIMPLE_BLOCK, &[0x81, 0x00, 0x00]));
        cluster.extend(element(ids::SIMPLE_BLOCK, &block(&[0xBB])));
        let fx = fixture(element(ids::CLUSTER, &cluster));

        let prepared = fx
            .processor
            .prepare(&Query::Search("broken".into()))
            .await
            .unwrap();
        let (source, completion) = prepared.into_source();
        let AudioSource::Live(stream) = source else {
            panic!("expected a live source");
        };

        let mut frames = FrameReader::new(stream);
        let first = tokio::task::spawn_blocking(move || {
            let first = frames.next_frame();
            let second = frames.next_frame();
            (first, second)
        })
        .await
        .unwrap();
        assert_eq!(first.0.unwrap(), Some(Bytes::from_static(&[0xAA])));
        assert!(first.1.is_err());

        let err = completion.unwrap().wait().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Parse(ParseError::BlockTooShort { len: 3, .. })
        ));
        assert!(fx.processor.cache().is_empty());
        assert_eq!(leftover_staging(&fx.dir), 0);
        assert!(!fx.dir.path().join(format!("{RICK}.dca")).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_live_reader_does_not_cancel_caching() {
        let fx = fixture(webm(&packets()));
        let query = Query::Search("rick".into());

        let (source, completion) = fx.processor.prepare(&query).await.unwrap().into_source();
        drop(source);

        let report = completion.unwrap().wait().await.unwrap();
        assert_eq!(report.stats.frames, 40);
        assert!(report.path.exists());
    }

    #[tokio::test]
    async fn resolver_ids_are_validated() {
        let mut fx = fixture(Vec::new());
        fx.resolver = Arc::new(FixedResolver {
            id: "not/an/id",
            calls: AtomicUsize::new(0),
        });
        let processor = AudioProcessor::new(
            fx.processor.cache().clone(),
            fx.resolver.clone(),
            fx.fetcher.clone(),
            &PlaybackConfig::default(),
        );

        let err = processor
            .prepare(&Query::Search("x".into()))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PipelineError::Acquisition(AcquisitionError::InvalidContentId(_))
        ));
        assert_eq!(fx.fetcher.calls.load(Ordering::SeqCst), 0);
    }
}

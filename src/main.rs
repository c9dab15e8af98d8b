use std::sync::Arc;

use dcastream::{
    audio::AudioProcessor,
    cache::ContentCache,
    common::{
        logger,
        types::{AnyError, AnyResult},
    },
    configs::Config,
    sources::{HttpFetcher, Query, YtDlpResolver},
};
use futures::future::join_all;
use tracing::{error, info, warn};

/// Converts every query given on the command line into the cache.
#[tokio::main]
async fn main() -> AnyResult<()> {
    let queries: Vec<String> = std::env::args().skip(1).collect();
    if queries.is_empty() {
        eprintln!("usage: dcastream <url-or-search>...");
        std::process::exit(2);
    }

    let config = Config::load()?;
    logger::init(&config);

    let cache = Arc::new(ContentCache::open(&config.cache)?);
    let resolver = Arc::new(YtDlpResolver::new(&config.acquisition));
    let fetcher = Arc::new(HttpFetcher::new(&config.acquisition)?);
    let processor = Arc::new(AudioProcessor::new(
        cache,
        resolver,
        fetcher,
        &config.playback,
    ));

    let jobs = queries.into_iter().map(|raw| {
        let processor = processor.clone();
        async move {
            let query = Query::parse(&raw)?;
            let cached = processor.prefetch(&query).await?;
            Ok::<_, AnyError>(cached)
        }
    });

    let results = tokio::select! {
        results = join_all(jobs) => results,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; partial cache files are removed on the next start");
            std::process::exit(130);
        }
    };

    let mut failed = 0;
    for result in results {
        match result {
            Ok((id, path)) => {
                info!("{} cached", id);
                println!("{}\t{}", id, path.display());
            }
            Err(e) => {
                error!("{}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} queries failed").into());
    }
    Ok(())
}

pub mod http;
pub mod plugin;
pub mod youtube;

pub use http::{HttpFetcher, HttpStream};
pub use plugin::{MediaFetcher, MediaStream, Query, Resolver, TrackInfo};
pub use youtube::YtDlpResolver;

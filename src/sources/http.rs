use std::{
    io::{self, Read},
    time::Duration,
};

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use reqwest::{Client, Response, StatusCode};
use tokio::runtime::Handle;
use tracing::debug;

use super::plugin::{MediaFetcher, MediaStream};
use crate::{
    common::{errors::AcquisitionError, http::HttpClient},
    configs::AcquisitionConfig,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Downloads media URLs with a plain GET. Anything but `200 OK` is an error.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &AcquisitionConfig) -> Result<Self, AcquisitionError> {
        let client = HttpClient::new(config.user_agent.clone(), CONNECT_TIMEOUT)?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn open(&self, url: &str) -> Result<MediaStream, AcquisitionError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AcquisitionError::Status(status.as_u16()));
        }

        debug!(
            "Opened media stream ({} bytes advertised)",
            response
                .content_length()
                .map_or_else(|| "unknown".to_string(), |len| len.to_string())
        );

        Ok(Box::new(HttpStream::new(response, Handle::current())))
    }
}

/// A response body as a blocking `Read`. Must be read from a thread outside
/// the runtime's workers, such as a `spawn_blocking` task.
pub struct HttpStream {
    response: Response,
    handle: Handle,
    current: Bytes,
    done: bool,
}

impl HttpStream {
    pub fn new(response: Response, handle: Handle) -> Self {
        Self {
            response,
            handle,
            current: Bytes::new(),
            done: false,
        }
    }
}

impl Read for HttpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.current.is_empty() {
            if self.done {
                return Ok(0);
            }
            match self.handle.block_on(self.response.chunk()) {
                Ok(Some(bytes)) => self.current = bytes,
                Ok(None) => self.done = true,
                Err(e) => return Err(io::Error::other(e)),
            }
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}

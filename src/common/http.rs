use std::time::Duration;

use reqwest::{Client, Error};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

pub struct HttpClient;

impl HttpClient {
    pub fn default_user_agent() -> String {
        DEFAULT_USER_AGENT.to_string()
    }

    /// Client for media downloads. Only the connect phase is bounded: a body
    /// is read at playback pace and may legitimately take minutes.
    pub fn new(user_agent: Option<String>, connect_timeout: Duration) -> Result<Client, Error> {
        Client::builder()
            .user_agent(user_agent.unwrap_or_else(Self::default_user_agent))
            .connect_timeout(connect_timeout)
            .build()
    }
}

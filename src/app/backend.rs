use std::time::Duration;

use crate::reading::BackendEntry;
use crate::{Error, Result};

/// Entries requested per poll.
pub const FETCH_COUNT: u32 = 10;
/// Extra client-side slack on top of the server long-poll timeout.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Source of glucose entries, newest first.
pub trait Backend: Send {
    /// Long-poll for entries newer than `last_id` (`None` asks for the latest batch).
    fn fetch(&mut self, last_id: Option<&str>) -> Result<Vec<BackendEntry>>;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn fetch(&mut self, last_id: Option<&str>) -> Result<Vec<BackendEntry>> {
        (**self).fetch(last_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBackendConfig {
    pub endpoint: String,
    pub token: String,
    pub locale: String,
    /// Sent as `x-gms-tz`, e.g. `GMT+1:00`.
    pub timezone: String,
    pub timeout: Duration,
}

/// `entries.json` client over a blocking `ureq` agent.
pub struct HttpBackend {
    config: HttpBackendConfig,
    agent: ureq::Agent,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        if !config.endpoint.starts_with("http://") && !config.endpoint.starts_with("https://") {
            return Err(Error::Config(format!(
                "api_endpoint must start with http:// or https:// (got '{}')",
                config.endpoint
            )));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout + CLIENT_TIMEOUT_SLACK)
            .user_agent(concat!("glucoframe/", env!("CARGO_PKG_VERSION")))
            .build();
        Ok(Self { config, agent })
    }

    pub fn entries_url(&self) -> String {
        format!("{}/entries.json", self.config.endpoint.trim_end_matches('/'))
    }
}

impl Backend for HttpBackend {
    fn fetch(&mut self, last_id: Option<&str>) -> Result<Vec<BackendEntry>> {
        let response = self
            .agent
            .get(&self.entries_url())
            .query("count", &FETCH_COUNT.to_string())
            .query("waitfornextid", last_id.unwrap_or("-1"))
            .query("timeout", &self.config.timeout.as_millis().to_string())
            .set("api-secret", &self.config.token)
            .set("accept-language", &self.config.locale)
            .set("accept-charset", "ascii")
            .set("x-gms-tz", &self.config.timezone)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => Error::Network(format!("backend returned HTTP {code}")),
                ureq::Error::Transport(t) => Error::Network(t.to_string()),
            })?;
        let body = response.into_string()?;
        let entries: Vec<BackendEntry> = serde_json::from_str(&body)?;
        if entries.is_empty() {
            return Err(Error::Parse("backend returned no entries".into()));
        }
        Ok(entries)
    }
}

//! Remote bulletin source
//!
//! The Bureau publishes its XML products in an anonymous directory, mirrored
//! over HTTP at `http://reg.bom.gov.au/fwo/`. A product is addressed by its
//! file name (`IDV60920.xml`), which is the source id used everywhere else.
//!
//! Transport retries live here, at the collaborator boundary: the rest of the
//! crate only ever sees a final document or a final `FetchError`.

use std::time::Duration;

use crate::logging::Component;
use crate::model::FetchError;

pub const DEFAULT_BASE_URL: &str = "http://reg.bom.gov.au/fwo/";

/// Anything that can hand back the raw text of a bulletin by source id.
pub trait BulletinSource: Send + Sync {
    fn fetch(&self, source_id: &str) -> Result<String, FetchError>;
}

// ============================================================================
// HTTP source
// ============================================================================

/// Blocking HTTP source with bounded exponential backoff.
pub struct HttpBulletinSource {
    client: reqwest::blocking::Client,
    base_url: String,
    max_attempts: u32,
    backoff: Duration,
}

impl HttpBulletinSource {
    /// # Parameters
    /// - `base_url`: directory URL; a trailing `/` is added if missing
    /// - `timeout`: per-request timeout
    /// - `max_attempts`: total tries per fetch (at least 1)
    /// - `backoff`: delay before the second try, doubled for each further try
    pub fn new(
        base_url: &str,
        timeout: Duration,
        max_attempts: u32,
        backoff: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bomright/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(HttpBulletinSource {
            client,
            base_url,
            max_attempts: max_attempts.max(1),
            backoff,
        })
    }

    pub fn url_for(&self, source_id: &str) -> String {
        format!("{}{}", self.base_url, source_id)
    }

    fn fetch_once(&self, source_id: &str) -> Result<String, FetchError> {
        let url = self.url_for(source_id);
        let transport = |e: reqwest::Error| FetchError::Transport {
            source_id: source_id.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/xml")
            .send()
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(FetchError::Http {
                source_id: source_id.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().map_err(transport)
    }
}

impl BulletinSource for HttpBulletinSource {
    fn fetch(&self, source_id: &str) -> Result<String, FetchError> {
        let mut delay = self.backoff;
        let mut attempt = 1;

        loop {
            tracing::debug!(component = %Component::Bom, source_id, attempt, "Downloading bulletin");
            match self.fetch_once(source_id) {
                Ok(body) => return Ok(body),
                Err(err) if attempt < self.max_attempts && is_transient(&err) => {
                    tracing::warn!(
                        component = %Component::Bom,
                        source_id,
                        attempt,
                        "Fetch failed, retrying in {:?}: {}",
                        delay,
                        err
                    );
                    std::thread::sleep(delay);
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Server-side and transport failures are worth another try; 4xx are not.
pub fn is_transient(err: &FetchError) -> bool {
    match err {
        FetchError::Http { status, .. } => *status >= 500 || *status == 429,
        FetchError::Transport { .. } => true,
    }
}

// ============================================================================
// Tests
// ============================================================================

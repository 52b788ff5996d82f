//! HTTP fetch primitive for the log-cache read API.
//!
//! Issues `GET {addr}/api/v1/read/{source_id}` with the window and filter as
//! query parameters and decodes the JSON envelope batch.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use logcache::{Envelope, Fetch, FetchError, GaugeValue, LogStream, Payload, QueryFilter, TimeRange};
use reqwest::Url;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::debug;

use crate::error::CliError;

/// Maximum number of response body characters kept in a status error.
const MAX_ERROR_BODY: usize = 512;

/// Connection settings for [`HttpFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFetcherConfig {
    /// Base address, e.g. `https://log-cache.example.com`
    pub addr: String,
    /// Value for the Authorization header
    pub token: Option<String>,
    /// Accept invalid TLS certificates
    pub skip_ssl_validation: bool,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            addr: "http://localhost:8080".to_string(),
            token: None,
            skip_ssl_validation: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`Fetch`] implementation backed by the log-cache HTTP API.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpFetcher {
    /// Creates a fetcher.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] if the address is not an http(s) URL or
    /// the HTTP client cannot be built.
    pub fn new(config: &HttpFetcherConfig) -> Result<Self, CliError> {
        let base = Url::parse(&config.addr)
            .map_err(|e| CliError::Config(format!("invalid address {:?}: {e}", config.addr)))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(CliError::Config(format!(
                "address must be an http or https URL, got {:?}",
                config.addr
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.skip_ssl_validation)
            .build()
            .map_err(|e| CliError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            token: config.token.clone(),
        })
    }

    /// Returns the read URL for a source and window.
    #[must_use]
    pub fn read_url(&self, source_id: &str, window: TimeRange, filter: &QueryFilter) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "v1", "read", source_id]);
        }

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("start_time", &window.start.to_string())
                .append_pair("end_time", &window.end.to_string())
                .append_pair("limit", &filter.line_limit.to_string());
            if let Some(kind) = filter.effective_type() {
                query.append_pair("envelope_types", kind.label());
            }
            if let Some(name) = filter.name_filter() {
                query.append_pair("name_filter", &format!("^{}$", regex::escape(name)));
            }
        }
        url
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(
        &self,
        source_id: &str,
        window: TimeRange,
        filter: &QueryFilter,
    ) -> Result<Vec<Envelope>, FetchError> {
        let url = self.read_url(source_id, window, filter);
        let mut request = self.client.get(url);
        if let Some(ref token) = self.token {
            request = request.header(AUTHORIZATION, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        debug!(source_id, %window, status = status.as_u16(), bytes = body.len(), "read response");

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        decode_read_response(&body)
    }
}

/// Decodes a read response body into envelopes, preserving order.
///
/// # Errors
///
/// Returns [`FetchError::Decode`] for malformed JSON or envelopes without a
/// recognizable payload.
pub fn decode_read_response(body: &str) -> Result<Vec<Envelope>, FetchError> {
    let response: WireReadResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    response
        .envelopes
        .batch
        .into_iter()
        .map(WireEnvelope::into_envelope)
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct WireReadResponse {
    #[serde(default)]
    envelopes: WireBatch,
}

#[derive(Debug, Default, Deserialize)]
struct WireBatch {
    #[serde(default)]
    batch: Vec<WireEnvelope>,
}

/// 64-bit integers arrive as JSON strings, numbers are accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireInt {
    Number(serde_json::Number),
    Text(String),
}

impl WireInt {
    fn to_i64(&self) -> Result<i64, FetchError> {
        match self {
            Self::Number(n) => n.as_i64(),
            Self::Text(s) => s.parse().ok(),
        }
        .ok_or_else(|| FetchError::Decode(format!("invalid integer {self:?}")))
    }

    fn to_u64(&self) -> Result<u64, FetchError> {
        match self {
            Self::Number(n) => n.as_u64(),
            Self::Text(s) => s.parse().ok(),
        }
        .ok_or_else(|| FetchError::Decode(format!("invalid unsigned integer {self:?}")))
    }
}

fn opt_i64(value: Option<&WireInt>) -> Result<i64, FetchError> {
    value.map_or(Ok(0), WireInt::to_i64)
}

fn opt_u64(value: Option<&WireInt>) -> Result<u64, FetchError> {
    value.map_or(Ok(0), WireInt::to_u64)
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    timestamp: Option<WireInt>,
    #[serde(default)]
    source_id: String,
    #[serde(default)]
    instance_id: String,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    log: Option<WireLog>,
    counter: Option<WireCounter>,
    gauge: Option<WireGauge>,
    timer: Option<WireTimer>,
    event: Option<WireEvent>,
}

#[derive(Debug, Deserialize)]
struct WireLog {
    #[serde(default)]
    payload: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCounter {
    #[serde(default)]
    name: String,
    delta: Option<WireInt>,
    total: Option<WireInt>,
}

#[derive(Debug, Deserialize)]
struct WireGauge {
    #[serde(default)]
    metrics: BTreeMap<String, GaugeValue>,
}

#[derive(Debug, Deserialize)]
struct WireTimer {
    #[serde(default)]
    name: String,
    start: Option<WireInt>,
    stop: Option<WireInt>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
}

impl WireEnvelope {
    fn into_envelope(self) -> Result<Envelope, FetchError> {
        let timestamp = opt_i64(self.timestamp.as_ref())?;
        let payload = if let Some(log) = self.log {
            let bytes = STANDARD
                .decode(log.payload.as_bytes())
                .map_err(|e| FetchError::Decode(format!("log payload is not base64: {e}")))?;
            let stream = match log.kind.as_deref() {
                Some("ERR") => LogStream::Err,
                _ => LogStream::Out,
            };
            Payload::Log {
                body: String::from_utf8_lossy(&bytes).into_owned(),
                stream,
            }
        } else if let Some(counter) = self.counter {
            Payload::Counter {
                name: counter.name,
                delta: opt_u64(counter.delta.as_ref())?,
                total: opt_u64(counter.total.as_ref())?,
            }
        } else if let Some(gauge) = self.gauge {
            Payload::Gauge {
                metrics: gauge.metrics,
            }
        } else if let Some(timer) = self.timer {
            Payload::Timer {
                name: timer.name,
                start: opt_i64(timer.start.as_ref())?,
                stop: opt_i64(timer.stop.as_ref())?,
            }
        } else if let Some(event) = self.event {
            Payload::Event {
                title: event.title,
                body: event.body,
            }
        } else {
            return Err(FetchError::Decode(format!(
                "envelope from {:?} at {timestamp} has no payload",
                self.source_id
            )));
        };

        Ok(Envelope {
            source_id: self.source_id,
            instance_id: self.instance_id,
            timestamp,
            tags: self.tags,
            payload,
        })
    }
}

// Blocking JSON-over-HTTP client shared by the embedding and generation services


use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Config;
use crate::{Result, SupportError};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(1000);
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct HttpClient {
    service: &'static str,
    base_url: Url,
    api_key: Option<String>,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff: Duration,
}

/// Outcome of one request attempt
enum Attempt {
    Done(String),
    Retry(SupportError),
    Fail(SupportError),
}

impl HttpClient {
    /// `service` names the remote side in errors and logs. A trailing slash is added to
    /// `base_url` so endpoint paths join beneath it.
    #[inline]
    pub fn new(service: &'static str, mut base_url: Url, timeout: Duration) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            service,
            base_url,
            api_key: None,
            agent: build_agent(timeout),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Client for the configured OpenAI-compatible service. Fails without an API key.
    #[inline]
    pub fn from_config(service: &'static str, config: &Config) -> Result<Self> {
        let api_key = config.require_api_key()?;
        let base_url = config.service_url()?;
        Ok(Self::new(service, base_url, config.timeout())
            .with_api_key(api_key)
            .with_retry_attempts(config.service.retry_attempts))
    }

    #[inline]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay before the first retry; later retries double it
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    #[inline]
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| SupportError::Config(format!("Invalid {} endpoint '{}': {}", self.service, path, e)))
    }

    #[inline]
    pub fn get_json<Resp: DeserializeOwned>(&self, path: &str) -> Result<Resp> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);

        let text = self.send_with_retry(&url, || {
            let mut request = self.agent.get(url.as_str());
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", &format!("Bearer {}", key));
            }
            request.call()
        })?;

        self.parse(&text)
    }

    #[inline]
    pub fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = self.endpoint(path)?;
        let payload = serde_json::to_string(body).map_err(|e| {
            SupportError::InvalidArgument(format!("Failed to serialize {} request: {}", self.service, e))
        })?;
        debug!("POST {} ({} bytes)", url, payload.len());

        let text = self.send_with_retry(&url, || {
            let mut request = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json");
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", &format!("Bearer {}", key));
            }
            request.send(&payload)
        })?;

        self.parse(&text)
    }

    fn parse<Resp: DeserializeOwned>(&self, text: &str) -> Result<Resp> {
        serde_json::from_str(text).map_err(|e| SupportError::ExternalService {
            service: self.service,
            message: format!("unexpected response body: {}", e),
            retryable: false,
        })
    }

    fn send_with_retry<F>(&self, url: &Url, mut send: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    {
        let mut last_error = None;
        let mut every_attempt_timed_out = true;

        for attempt in 1..=self.retry_attempts {
            debug!(
                "{} request attempt {}/{}",
                self.service, attempt, self.retry_attempts
            );

            match self.attempt(&mut send) {
                Attempt::Done(text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(text);
                }
                Attempt::Fail(error) => {
                    warn!("{} request failed, not retrying: {}", self.service, error);
                    return Err(error);
                }
                Attempt::Retry(error) => {
                    if !matches!(error, SupportError::Timeout { .. }) {
                        every_attempt_timed_out = false;
                    }
                    warn!(
                        "{} request error: {}, attempt {}/{}",
                        self.service, error, attempt, self.retry_attempts
                    );
                    last_error = Some(error);

                    if attempt < self.retry_attempts {
                        let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", url);

        if every_attempt_timed_out {
            return Err(SupportError::Timeout {
                operation: format!(
                    "{} request to {} ({} attempts)",
                    self.service, url, self.retry_attempts
                ),
            });
        }

        Err(last_error.unwrap_or_else(|| SupportError::ExternalService {
            service: self.service,
            message: "request failed after retries".to_string(),
            retryable: true,
        }))
    }

    fn attempt<F>(&self, send: &mut F) -> Attempt
    where
        F: FnMut() -> std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    {
        let mut response = match send() {
            Ok(response) => response,
            Err(error) => return self.classify_transport_error(error),
        };

        let status = response.status().as_u16();
        let body = match response.body_mut().read_to_string() {
            Ok(body) => body,
            Err(error) => return self.classify_transport_error(error),
        };

        if (200..300).contains(&status) {
            return Attempt::Done(body);
        }

        let retryable = status == 429 || status >= 500;
        let error = SupportError::ExternalService {
            service: self.service,
            message: format!("HTTP {}: {}", status, error_summary(&body)),
            retryable,
        };

        if retryable {
            Attempt::Retry(error)
        } else {
            Attempt::Fail(error)
        }
    }

    fn classify_transport_error(&self, error: ureq::Error) -> Attempt {
        match error {
            ureq::Error::Timeout(timeout) => Attempt::Retry(SupportError::Timeout {
                operation: format!("{} request ({:?})", self.service, timeout),
            }),
            ureq::Error::ConnectionFailed | ureq::Error::HostNotFound | ureq::Error::Io(_) => {
                Attempt::Retry(SupportError::ExternalService {
                    service: self.service,
                    message: format!("transport error: {}", error),
                    retryable: true,
                })
            }
            other => Attempt::Fail(SupportError::ExternalService {
                service: self.service,
                message: format!("request failed: {}", other),
                retryable: false,
            }),
        }
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Pull a readable message out of an error body, preferring the OpenAI `error.message` shape
fn error_summary(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("error"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string());

    if message.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = message.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}…", truncated)
    } else {
        message
    }
}

//! Backoff policy and status classification for device reads

use crate::config::RequestConfig;
use crate::constants::{MAX_RETRIES, RETRY_BASE_DELAY_MS, RETRY_JITTER, RETRY_MAX_DELAY_MS};
use crate::error::HomevoltError;
use rand::Rng;
use reqwest::StatusCode;
use std::time::Duration;

/// Exponential backoff with a random multiplicative jitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the jitter fraction; each delay is scaled by `1 + uniform(0, jitter)`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(RETRY_MAX_DELAY_MS),
            jitter: RETRY_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RequestConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            jitter: config.retry_jitter.clamp(0.0, 1.0),
        }
    }

    /// Policy with the same shape but no waiting, for tests and probes
    pub const fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Delay before attempt `attempt + 1` for a given jitter sample
    ///
    /// `min(base * 2^attempt, max) * (1 + sample)`, with the sample clamped to
    /// `0..=jitter`.
    pub fn delay_for(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
        let backoff = (self.base_delay.as_secs_f64() * 2f64.powi(exponent))
            .min(self.max_delay.as_secs_f64());
        let sample = if jitter_sample.is_finite() {
            jitter_sample.clamp(0.0, self.jitter)
        } else {
            0.0
        };
        Duration::from_secs_f64(backoff * (1.0 + sample))
    }

    /// Delay before attempt `attempt + 1` with a fresh random jitter sample
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let sample = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter)
        } else {
            0.0
        };
        self.delay_for(attempt, sample)
    }
}

/// How a device HTTP status is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// 401: never retried, never served from cache
    Auth,
    /// 429: never retried, never served from cache
    RateLimit,
    /// 5xx: retried
    Server,
    /// Any other non-2xx: fails immediately
    Client,
}

pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::UNAUTHORIZED {
        StatusClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        StatusClass::RateLimit
    } else if status.is_server_error() {
        StatusClass::Server
    } else {
        StatusClass::Client
    }
}

/// Outcome of a single failed attempt
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Stop retrying and surface this error
    Fatal(HomevoltError),
    /// Worth another attempt; carries the failure description
    Retryable(String),
}

impl AttemptError {
    pub(crate) fn transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Retryable(format!("Timeout: {err}"))
        } else {
            Self::Retryable(err.to_string())
        }
    }
}

pub(crate) fn auth_error(url: &str) -> HomevoltError {
    HomevoltError::auth(format!("Authentication required for {url}"))
}

pub(crate) fn rate_limit_error(url: &str) -> HomevoltError {
    HomevoltError::rate_limit(format!(
        "Rate limited for {url} (too many failed auth attempts)"
    ))
}

//! HTTP client for the Homevolt local API
//!
//! Reads are JSON GETs with exponential backoff and a per-endpoint last-good
//! cache. Writes (`/params.json`) and console commands (`/console.json`) are
//! form POSTs that are never retried.

pub mod cache;
pub mod console;
pub mod retry;
pub mod schedule;

pub use cache::{Clock, ManualClock, MonotonicClock, ResponseCache};
pub use console::{CommandResult, parse_console_response};
pub use retry::{RetryPolicy, StatusClass, classify_status};
pub use schedule::{ControlMode, ModeParams, ScheduleEntry, build_mode_command};

use crate::config::{DeviceConfig, RequestConfig};
use crate::constants::{
    CACHE_EXPIRY_SECS, DEFAULT_TIMEOUT_SECS, DEFAULT_USERNAME, ENDPOINT_CONSOLE, ENDPOINT_EMS,
    ENDPOINT_ERROR_REPORT, ENDPOINT_MAINS, ENDPOINT_NODES, ENDPOINT_OTA_MANIFEST, ENDPOINT_PARAMS,
    ENDPOINT_SCHEDULE, ENDPOINT_STATUS,
};
use crate::error::{HomevoltError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, StatusCode};
use retry::{AttemptError, auth_error, rate_limit_error};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Endpoints collected by [`HomevoltApi::get_all_data`], keyed by logical name
pub const AGGREGATE_ENDPOINTS: [(&str, &str); 6] = [
    ("status", ENDPOINT_STATUS),
    ("ems", ENDPOINT_EMS),
    ("mains", ENDPOINT_MAINS),
    ("params", ENDPOINT_PARAMS),
    ("schedule", ENDPOINT_SCHEDULE),
    ("ota_manifest", ENDPOINT_OTA_MANIFEST),
];

const NOT_LOCAL_MODE_MESSAGE: &str = "Cannot set schedule: device is not in local mode. \
     Enable local mode first to prevent remote overrides.";

/// Prefix `http://` when no scheme is given and strip trailing slashes
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// Client for one Homevolt device
pub struct HomevoltApi {
    host: String,
    auth: Option<(String, String)>,
    session: Mutex<Option<Client>>,
    owns_session: bool,
    timeout: Duration,
    retry: RetryPolicy,
    cache: ResponseCache,
    logger: StructuredLogger,
}

impl fmt::Debug for HomevoltApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HomevoltApi")
            .field("host", &self.host)
            .field("username", &self.auth.as_ref().map(|(user, _)| user))
            .field("owns_session", &self.owns_session)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HomevoltApi {
    /// Create a client
    ///
    /// Basic auth is only sent when `password` is non-empty. A supplied
    /// `session` is shared and never closed by this client.
    pub fn new(
        host: &str,
        password: Option<&str>,
        username: Option<&str>,
        session: Option<Client>,
    ) -> Self {
        let host = normalize_host(host);
        let auth = password.filter(|p| !p.is_empty()).map(|p| {
            (
                username
                    .filter(|u| !u.is_empty())
                    .unwrap_or(DEFAULT_USERNAME)
                    .to_string(),
                p.to_string(),
            )
        });
        let owns_session = session.is_none();
        let logger = get_logger_with_context(LogContext::new("api").with_field("host", &host));

        Self {
            host,
            auth,
            session: Mutex::new(session),
            owns_session,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            cache: ResponseCache::new(
                Duration::from_secs(CACHE_EXPIRY_SECS),
                Arc::new(MonotonicClock),
            ),
            logger,
        }
    }

    /// Create a client from the service configuration
    pub fn from_config(
        device: &DeviceConfig,
        request: &RequestConfig,
        session: Option<Client>,
    ) -> Self {
        Self::new(
            &device.host,
            device.password.as_deref(),
            device.username.as_deref(),
            session,
        )
        .with_timeout(request.timeout())
        .with_retry_policy(RetryPolicy::from_config(request))
        .with_cache_expiry(request.cache_expiry())
    }

    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_cache_expiry(mut self, expiry: Duration) -> Self {
        self.cache = ResponseCache::new(expiry, self.cache.clock());
        self
    }

    /// Replace the time source used for cache ages
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = ResponseCache::new(self.cache.expiry(), clock);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Normalized base URL
    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub const fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    /// Whether an HTTP client is currently held
    pub fn has_session(&self) -> bool {
        self.lock_session().is_some()
    }

    /// Release a self-created HTTP client; shared clients are left alone
    pub fn close(&self) {
        if !self.owns_session {
            return;
        }
        if self.lock_session().take().is_some() {
            self.logger.debug("Closed HTTP session");
        }
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Client>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn client(&self) -> Result<Client> {
        let mut session = self.lock_session();
        if let Some(client) = session.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| HomevoltError::config(format!("Failed to build HTTP client: {e}")))?;
        *session = Some(client.clone());
        Ok(client)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.host)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.timeout(self.timeout);
        match &self.auth {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    /// GET `endpoint` with up to `retries` retries after the first attempt
    ///
    /// 401 and 429 fail immediately, as does any other non-5xx error status.
    /// 5xx answers and transport failures are retried with jittered backoff.
    pub async fn request(&self, endpoint: &str, retries: u32) -> Result<Value> {
        let client = self.client()?;
        let url = self.url(endpoint);
        let total = retries.saturating_add(1);
        let mut last_error: Option<String> = None;

        for attempt in 0..=retries {
            match self.attempt_get(&client, &url).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Retryable(reason)) => {
                    if attempt < retries {
                        let delay = self.retry.jittered_delay(attempt);
                        self.logger.debug(&format!(
                            "Request to {url} failed (attempt {}/{total}), retrying in {:.1}s: {reason}",
                            attempt + 1,
                            delay.as_secs_f64()
                        ));
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(reason);
                }
            }
        }

        Err(match last_error {
            Some(reason) => HomevoltError::connection(format!(
                "Connection error for {url} after {total} attempts: {reason}"
            )),
            None => {
                HomevoltError::connection(format!("Connection error for {url} after {total} attempts"))
            }
        })
    }

    async fn attempt_get(&self, client: &Client, url: &str) -> std::result::Result<Value, AttemptError> {
        let response = self
            .authorize(client.get(url))
            .send()
            .await
            .map_err(|e| AttemptError::transport(&e))?;

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => {}
            StatusClass::Auth => return Err(AttemptError::Fatal(auth_error(url))),
            StatusClass::RateLimit => return Err(AttemptError::Fatal(rate_limit_error(url))),
            StatusClass::Server => {
                return Err(AttemptError::Retryable(format!(
                    "Server error: {}",
                    status.as_u16()
                )));
            }
            StatusClass::Client => {
                return Err(AttemptError::Fatal(HomevoltError::api(format!(
                    "API error {} for {url}",
                    status.as_u16()
                ))));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::transport(&e))?;
        serde_json::from_str(&body).map_err(|e| {
            AttemptError::Fatal(HomevoltError::api(format!("Invalid JSON from {url}: {e}")))
        })
    }

    /// GET with the configured retry budget, falling back to a still-valid
    /// cached response unless the failure was auth or rate limiting
    pub async fn request_cached(&self, endpoint: &str) -> Result<Value> {
        match self.request(endpoint, self.retry.max_retries).await {
            Ok(data) => {
                self.cache.store(endpoint, data.clone());
                Ok(data)
            }
            Err(err) if err.is_auth_or_rate_limit() => Err(err),
            Err(err) => match self.cache.get_valid(endpoint) {
                Some((data, age)) => {
                    self.logger.debug(&format!(
                        "Request to {} failed, using cached data (age: {}s): {err}",
                        self.url(endpoint),
                        age.as_secs()
                    ));
                    Ok(data)
                }
                None => Err(err),
            },
        }
    }

    /// Still-valid cached response for `endpoint`, without any I/O
    pub fn get_cached(&self, endpoint: &str) -> Option<Value> {
        self.cache.get_valid(endpoint).map(|(data, _)| data)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub async fn get_status(&self) -> Result<Value> {
        self.request_cached(ENDPOINT_STATUS).await
    }

    /// Energy management data; a cluster leader lists every unit
    pub async fn get_ems(&self) -> Result<Value> {
        self.request_cached(ENDPOINT_EMS).await
    }

    pub async fn get_nodes(&self) -> Result<Value> {
        self.request_cached(ENDPOINT_NODES).await
    }

    pub async fn get_mains(&self) -> Result<Value> {
        self.request_cached(ENDPOINT_MAINS).await
    }

    /// Configurable parameters (a JSON array of `{name, value}` records)
    pub async fn get_params(&self) -> Result<Value> {
        self.request_cached(ENDPOINT_PARAMS).await
    }

    pub async fn get_schedule(&self) -> Result<Value> {
        self.request_cached(ENDPOINT_SCHEDULE).await
    }

    pub async fn get_error_report(&self) -> Result<Value> {
        self.request_cached(ENDPOINT_ERROR_REPORT).await
    }

    pub async fn get_ota_manifest(&self) -> Result<Value> {
        self.request_cached(ENDPOINT_OTA_MANIFEST).await
    }

    /// Quick status probe with a single retry and no cache
    pub async fn test_connection(&self) -> Result<Value> {
        self.request(ENDPOINT_STATUS, 1).await
    }

    /// Fetch every aggregate endpoint independently
    ///
    /// A failing endpoint is replaced with `{}`; auth and rate-limit errors
    /// abort the whole fetch.
    pub async fn get_all_data(&self) -> Result<Map<String, Value>> {
        let mut data = Map::new();
        for (key, endpoint) in AGGREGATE_ENDPOINTS {
            let value = match self.request_cached(endpoint).await {
                Ok(value) => value,
                Err(err) if err.is_auth_or_rate_limit() => return Err(err),
                Err(err) => {
                    self.logger.debug(&format!("Failed to fetch {key}: {err}"));
                    Value::Object(Map::new())
                }
            };
            data.insert(key.to_string(), value);
        }
        Ok(data)
    }

    async fn post_form(
        &self,
        endpoint: &str,
        form: &[(&str, &str)],
        accept_json: bool,
    ) -> Result<(StatusCode, String)> {
        let client = self.client()?;
        let url = self.url(endpoint);
        self.logger
            .debug(&format!("POST {url} with data: {form:?}"));

        let mut builder = self.authorize(client.post(&url)).form(form);
        if accept_json {
            builder = builder.header(ACCEPT, "application/json");
        }
        let response = builder
            .send()
            .await
            .map_err(|e| HomevoltError::connection(format!("Connection error for {url}: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| HomevoltError::connection(format!("Connection error for {url}: {e}")))?;
        self.logger.debug(&format!(
            "POST {url} response (status={}): {text}",
            status.as_u16()
        ));
        Ok((status, text))
    }

    fn check_post_status(&self, endpoint: &str, status: StatusCode) -> Result<()> {
        let url = self.url(endpoint);
        match classify_status(status) {
            StatusClass::Success => Ok(()),
            StatusClass::Auth => Err(auth_error(&url)),
            StatusClass::RateLimit => Err(rate_limit_error(&url)),
            StatusClass::Server | StatusClass::Client => Err(HomevoltError::api(format!(
                "API error {} for {url}",
                status.as_u16()
            ))),
        }
    }

    /// Write a parameter and persist it to flash (`store=1`)
    pub async fn set_param(&self, key: &str, value: &str) -> Result<()> {
        let (status, _) = self
            .post_form(ENDPOINT_PARAMS, &[("k", key), ("v", value), ("store", "1")], false)
            .await?;
        self.check_post_status(ENDPOINT_PARAMS, status)
    }

    /// Run one console command and interpret the reply
    pub async fn send_console_command(&self, command: &str) -> Result<CommandResult> {
        let (status, text) = self
            .post_form(ENDPOINT_CONSOLE, &[("cmd", command)], true)
            .await?;
        if status == StatusCode::BAD_REQUEST {
            return Err(HomevoltError::api(format!(
                "Invalid command '{command}' for {}",
                self.url(ENDPOINT_CONSOLE)
            )));
        }
        self.check_post_status(ENDPOINT_CONSOLE, status)?;
        parse_console_response(command, &text)
    }

    /// Fail unless the device reports `local_mode: true`
    pub async fn ensure_local_mode(&self) -> Result<()> {
        let schedule = self.get_schedule().await?;
        let local = schedule
            .get("local_mode")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if local {
            Ok(())
        } else {
            Err(HomevoltError::not_local_mode(NOT_LOCAL_MODE_MESSAGE))
        }
    }

    /// Switch to `mode` immediately, after the local-mode check
    pub async fn set_mode(&self, mode: ControlMode, params: &ModeParams) -> Result<CommandResult> {
        params.validate(mode)?;
        self.ensure_local_mode().await?;
        self.send_console_command(&build_mode_command(mode, params))
            .await
    }

    /// Stop charging and discharging; `offline` also takes the inverter offline
    pub async fn set_idle(&self, offline: bool) -> Result<CommandResult> {
        self.ensure_local_mode().await?;
        let mut cmd = build_mode_command(ControlMode::Idle, &ModeParams::default());
        if offline {
            cmd.push_str(" --offline");
        }
        self.send_console_command(&cmd).await
    }

    pub async fn set_charge(&self, params: &ModeParams) -> Result<CommandResult> {
        self.set_mode(ControlMode::InverterCharge, params).await
    }

    pub async fn set_discharge(&self, params: &ModeParams) -> Result<CommandResult> {
        self.set_mode(ControlMode::InverterDischarge, params).await
    }

    pub async fn set_grid_charge(&self, params: &ModeParams) -> Result<CommandResult> {
        self.set_mode(ControlMode::GridCharge, params).await
    }

    pub async fn set_grid_discharge(&self, params: &ModeParams) -> Result<CommandResult> {
        self.set_mode(ControlMode::GridDischarge, params).await
    }

    /// Bidirectional grid control around a required baseline `setpoint`
    pub async fn set_grid_charge_discharge(
        &self,
        setpoint: u32,
        params: &ModeParams,
    ) -> Result<CommandResult> {
        let params = ModeParams {
            setpoint: Some(setpoint),
            ..*params
        };
        self.set_mode(ControlMode::GridChargeDischarge, &params)
            .await
    }

    pub async fn set_solar_charge(&self, params: &ModeParams) -> Result<CommandResult> {
        self.set_mode(ControlMode::SolarCharge, params).await
    }

    pub async fn set_solar_charge_discharge(&self, params: &ModeParams) -> Result<CommandResult> {
        self.set_mode(ControlMode::SolarChargeDischarge, params)
            .await
    }

    pub async fn set_full_solar_export(&self, params: &ModeParams) -> Result<CommandResult> {
        self.set_mode(ControlMode::FullSolarExport, params).await
    }

    /// Replace the device schedule with `entries`, in order
    ///
    /// The first entry goes out as `sched_set` (which clears the schedule),
    /// the rest as `sched_add`. Stops at the first failing command.
    pub async fn set_schedule(&self, entries: &[ScheduleEntry]) -> Result<Vec<CommandResult>> {
        if entries.is_empty() {
            return Err(HomevoltError::validation(
                "entries",
                "Schedule entries list cannot be empty",
            ));
        }
        for entry in entries {
            entry.validate()?;
        }
        self.ensure_local_mode().await?;

        let mut results = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let prefix = if i == 0 { "sched_set" } else { "sched_add" };
            let cmd = format!("{prefix} {}", entry.to_command_args());
            results.push(self.send_console_command(&cmd).await?);
        }
        Ok(results)
    }

    pub async fn clear_schedule(&self) -> Result<CommandResult> {
        self.send_console_command("sched_clear").await
    }

    /// Hardware reset
    pub async fn reboot(&self) -> Result<CommandResult> {
        self.send_console_command("reset_hard").await
    }
}

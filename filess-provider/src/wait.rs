//! Provisioning wait loop
//!
//! A freshly created database goes through `creating`, `deploying`,
//! `billing_pending` and finally `deployed`. The backend may report
//! `deployed` before it exposes connection details, so the loop checks the
//! credentials itself and treats any observation without them as
//! `waiting_credentials`.

use std::future::Future;
use std::time::{Duration, Instant};

use filess_core::provider::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

use crate::client::ClientError;
use crate::utils::{credentials_are_ready, extract_stripe_checkout_url};

pub const STATUS_CREATING: &str = "creating";
pub const STATUS_DEPLOYING: &str = "deploying";
pub const STATUS_WAITING_CREDENTIALS: &str = "waiting_credentials";
pub const STATUS_BILLING_PENDING: &str = "billing_pending";
pub const STATUS_DEPLOYED: &str = "deployed";

/// States that keep the loop polling
pub const PENDING_STATES: &[&str] = &[
    STATUS_CREATING,
    STATUS_DEPLOYING,
    STATUS_WAITING_CREDENTIALS,
    STATUS_BILLING_PENDING,
];

/// Timing of the wait loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Wait before the first poll
    pub delay: Duration,
    /// Wait between polls
    pub poll_interval: Duration,
    /// Give up after this long
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Time source for the wait loop
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// Clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Cooperative stop signal observed by the wait loop
///
/// Unlike dropping the operation, cancelling lets the loop return an error
/// that still names the database being waited on.
#[derive(Debug, Clone)]
pub struct Cancellation(watch::Receiver<bool>);

impl Cancellation {
    /// A signal and the sender that triggers it
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self(rx))
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender gone without cancelling
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timeout while waiting for state to become 'deployed' (last state: '{last_state}', timeout: {timeout:?})")]
    Timeout {
        last_state: String,
        timeout: Duration,
    },

    #[error("unexpected state '{state}', wanted target 'deployed'")]
    UnexpectedState { state: String },

    #[error("unexpected database response format")]
    UnexpectedFormat,

    #[error("cancelled while waiting (last state: '{last_state}')")]
    Cancelled { last_state: String },

    #[error(transparent)]
    Refresh(#[from] ClientError),
}

/// Result of classifying one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Keep polling; carries the effective state
    Pending(String),
    /// Credentials are exposed and the backend reports `deployed`
    Ready(String),
}

/// Classify a database payload into the effective wait state
pub fn observe(data: &Value) -> Result<Observation, WaitError> {
    let status = data.get("status").and_then(Value::as_str).unwrap_or_default();
    let state = if credentials_are_ready(data) {
        status
    } else {
        STATUS_WAITING_CREDENTIALS
    };

    if state == STATUS_DEPLOYED {
        Ok(Observation::Ready(state.to_string()))
    } else if PENDING_STATES.contains(&state) {
        Ok(Observation::Pending(state.to_string()))
    } else {
        Err(WaitError::UnexpectedState {
            state: state.to_string(),
        })
    }
}

/// Terminal payload of a successful wait
#[derive(Debug, Clone, PartialEq)]
pub struct Provisioned {
    /// Backend status observed when the credentials became ready
    pub status: String,
    pub data: Value,
}

/// Poll `refresh` until the database is deployed with credentials
///
/// Errors from `refresh` abort the wait immediately. Cancellation is checked
/// around every sleep and poll.
pub async fn wait_for_credentials<C, F, Fut>(
    config: &WaitConfig,
    clock: &C,
    cancel: &Cancellation,
    database_id: &str,
    mut refresh: F,
) -> Result<Provisioned, WaitError>
where
    C: Clock + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Value, ClientError>>,
{
    let deadline = clock.now() + config.timeout;
    let mut last_state = String::new();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(WaitError::Cancelled { last_state }),
        _ = clock.sleep(config.delay) => {}
    }

    loop {
        let now = clock.now();
        if now >= deadline {
            return Err(WaitError::Timeout {
                last_state,
                timeout: config.timeout,
            });
        }

        let data = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitError::Cancelled { last_state }),
            data = refresh() => data?,
        };
        if !data.is_object() {
            return Err(WaitError::UnexpectedFormat);
        }

        match observe(&data)? {
            Observation::Ready(status) => {
                tracing::debug!("database {} reached state '{}'", database_id, status);
                return Ok(Provisioned { status, data });
            }
            Observation::Pending(state) => {
                if let Some(url) = extract_stripe_checkout_url(&data) {
                    tracing::warn!(
                        database_id,
                        stripe_checkout_url = url,
                        "Waiting for user to complete Stripe checkout"
                    );
                }
                tracing::debug!("database {} is '{}', waiting", database_id, state);
                last_state = state;
            }
        }

        let remaining = deadline.saturating_duration_since(clock.now());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitError::Cancelled { last_state }),
            _ = clock.sleep(config.poll_interval.min(remaining)) => {}
        }
    }
}

use crate::config::ProbeConfig;
use crate::state::Snapshot;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("unable to perform healthz request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unable to decode healthz response (HTTP {status}): {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
    #[error("no healthy healthz response after {attempts} attempts, last failure: {last_failure}")]
    RetryExhausted { attempts: u32, last_failure: String },
    #[error("healthz probe cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl ProbeError {
    fn cause(&self) -> &'static str {
        match self {
            ProbeError::Transport(_) => "transport",
            ProbeError::Decode { status: 200, .. } => "decode",
            ProbeError::Decode { .. } => "status",
            ProbeError::RetryExhausted { .. } => "exhausted",
            ProbeError::Cancelled { .. } => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Prober {
    client: Client,
    base_backoff: Duration,
    timeout: Duration,
}

impl Prober {
    pub fn new(base_backoff: Duration, timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(concat!("healthd/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_backoff,
            timeout,
        }
    }

    pub fn from_config(cfg: &ProbeConfig) -> Self {
        Self::new(cfg.base_backoff, cfg.timeout)
    }

    // `status` is the code observed on the wire, whatever the body claims.
    pub async fn probe(&self, url: &str) -> Result<Snapshot, ProbeError> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        let mut snapshot: Snapshot = serde_json::from_slice(&body)
            .map_err(|source| ProbeError::Decode { status, source })?;
        snapshot.status = status;
        Ok(snapshot)
    }

    pub async fn probe_with_retry(
        &self,
        url: &str,
        max_attempts: u32,
    ) -> Result<Snapshot, ProbeError> {
        let (_never_cancel, cancel) = watch::channel(false);
        self.probe_with_retry_until(url, max_attempts, cancel).await
    }

    /// The wait after failed attempt `n` is `base_backoff * 2^n`; there is no
    /// wait after the last attempt.
    pub async fn probe_with_retry_until(
        &self,
        url: &str,
        max_attempts: u32,
        cancel: watch::Receiver<bool>,
    ) -> Result<Snapshot, ProbeError> {
        retry_with_backoff(url, self.base_backoff, max_attempts, cancel, || {
            self.probe(url)
        })
        .await
    }
}

async fn retry_with_backoff<F, Fut>(
    url: &str,
    base_backoff: Duration,
    max_attempts: u32,
    mut cancel: watch::Receiver<bool>,
    mut attempt_once: F,
) -> Result<Snapshot, ProbeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Snapshot, ProbeError>>,
{
    let mut last_failure = String::from("no attempts made");

    for attempt in 1..=max_attempts {
        if *cancel.borrow() {
            return Err(ProbeError::Cancelled {
                attempts: attempt - 1,
            });
        }

        let outcome = tokio::select! {
            outcome = attempt_once() => outcome,
            _ = cancelled(&mut cancel) => {
                return Err(ProbeError::Cancelled { attempts: attempt });
            }
        };

        match outcome {
            Ok(snapshot) if snapshot.status == 200 => {
                debug!(attempt, url, "healthz probe succeeded");
                return Ok(snapshot);
            }
            Ok(snapshot) => {
                info!(
                    attempt,
                    url,
                    cause = "status",
                    status = snapshot.status,
                    "healthz probe failed"
                );
                last_failure = format!("unexpected HTTP status {}", snapshot.status);
            }
            Err(err) => {
                info!(attempt, url, cause = err.cause(), error = %err, "healthz probe failed");
                last_failure = err.to_string();
            }
        }

        if attempt < max_attempts {
            let wait = backoff_delay(base_backoff, attempt);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancelled(&mut cancel) => {
                    return Err(ProbeError::Cancelled { attempts: attempt });
                }
            }
        }
    }

    Err(ProbeError::RetryExhausted {
        attempts: max_attempts,
        last_failure,
    })
}

// The wait doubles before the first sleep already.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: nobody can cancel any more.
            std::future::pending::<()>().await;
        }
    }
}

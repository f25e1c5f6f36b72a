//! HTTP transport for the onboarding endpoints.
//!
//! Every request carries a timeout. `check` is the read path and is retried
//! with exponential backoff and jitter on timeouts, network failures and 5xx.
//! `submit` consumes the token and is sent once: if it times out the request may
//! already have succeeded server-side, so the outcome is reported as unknown.

use super::{Operation, TransportOutcome};
use crate::redemption::{scope_path, PracticeSettings};
use crate::token::Scope;
use crate::APP_USER_AGENT;
use anyhow::{Context, Result};
use rand::Rng;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CHECK_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(250);
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(4);

#[derive(Debug, Clone)]
pub struct OnboardClient {
    http: Client,
    base_url: Url,
    check_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl OnboardClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Url) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(base_url: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Error creating reqwest client")?;

        Ok(Self {
            http,
            base_url,
            check_attempts: DEFAULT_CHECK_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        })
    }

    #[must_use]
    pub fn with_check_attempts(mut self, attempts: u32) -> Self {
        self.check_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Check whether a link is still usable. Never consumes the token.
    #[instrument(skip(self, token))]
    pub async fn check(&self, scope: Scope, token: &str) -> TransportOutcome {
        let url = self.link_url(scope, token);
        let mut attempt = 1;

        loop {
            let outcome = send(self.http.get(url.clone()), Operation::Check).await;
            if attempt >= self.check_attempts || !retryable(&outcome) {
                return outcome;
            }

            let delay = backoff_delay(attempt, self.backoff_base, self.backoff_max);
            warn!(attempt, ?delay, "onboarding link check failed, retrying");
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Submit settings and consume the token. Sent exactly once.
    #[instrument(skip(self, token, settings))]
    pub async fn submit(
        &self,
        scope: Scope,
        token: &str,
        settings: &PracticeSettings,
    ) -> TransportOutcome {
        let url = self.link_url(scope, token);
        send(self.http.post(url).json(settings), Operation::Submit).await
    }

    fn link_url(&self, scope: Scope, token: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/{}/{token}", scope_path(scope))
    }
}

async fn send(request: RequestBuilder, operation: Operation) -> TransportOutcome {
    match request.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            match response.text().await {
                Ok(body) => {
                    debug!(status, "onboarding response received");
                    TransportOutcome::Response { status, body }
                }
                Err(err) => transport_error(err, operation),
            }
        }
        Err(err) => transport_error(err, operation),
    }
}

// The request URL carries the token, so it is stripped before the error is shown.
fn transport_error(err: reqwest::Error, operation: Operation) -> TransportOutcome {
    if err.is_timeout() {
        TransportOutcome::Timeout(operation)
    } else {
        let err = err.without_url();
        debug!("onboarding request failed: {err}");
        TransportOutcome::Network(format!("Could not reach the onboarding service: {err}"))
    }
}

fn retryable(outcome: &TransportOutcome) -> bool {
    match outcome {
        TransportOutcome::Response { status, .. } => *status >= 500,
        TransportOutcome::Timeout(_) | TransportOutcome::Network(_) => true,
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_only_on_transient_failures() {
        assert!(retryable(&TransportOutcome::Timeout(Operation::Check)));
        assert!(retryable(&TransportOutcome::Network("reset".to_string())));
        assert!(retryable(&TransportOutcome::Response {
            status: 503,
            body: String::new()
        }));
        for status in [200, 401, 409, 410] {
            assert!(!retryable(&TransportOutcome::Response {
                status,
                body: String::new()
            }));
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1_000);
        for attempt in 1..=10 {
            let delay = backoff_delay(attempt, base, max);
            assert!(delay <= max);
        }
        let first = backoff_delay(1, base, max);
        assert!(first >= Duration::from_millis(50) && first <= base);
        let late = backoff_delay(8, base, max);
        assert!(late >= Duration::from_millis(500));
    }

    #[test]
    fn link_url_per_scope() -> Result<()> {
        let client = OnboardClient::new(Url::parse("http://127.0.0.1:8080/")?)?;
        assert_eq!(
            client.link_url(Scope::Onboarding, "a.b"),
            "http://127.0.0.1:8080/onboard/a.b"
        );
        assert_eq!(
            client.link_url(Scope::SettingsUpdate, "a.b"),
            "http://127.0.0.1:8080/settings/a.b"
        );
        Ok(())
    }

    #[tokio::test]
    async fn network_error_never_echoes_token() -> Result<()> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);

        let client = OnboardClient::with_timeout(
            Url::parse(&format!("http://{addr}"))?,
            Duration::from_secs(2),
        )?
        .with_check_attempts(1);

        let token = "eyJzdWIiOiJwMSJ9.c2VjcmV0LWRpZ2VzdA";
        let outcomes = [
            client.check(Scope::Onboarding, token).await,
            client
                .submit(Scope::Onboarding, token, &PracticeSettings::default())
                .await,
        ];
        for outcome in outcomes {
            let message = match outcome {
                TransportOutcome::Network(message) => message,
                other => anyhow::bail!("expected a network failure, got {other:?}"),
            };
            assert!(message.starts_with("Could not reach the onboarding service"));
            assert!(!message.contains(token));
            assert!(!message.contains("c2VjcmV0LWRpZ2VzdA"));
        }
        Ok(())
    }
}

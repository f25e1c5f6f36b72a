//! Client-side interpretation of onboarding link responses.
//!
//! Every transport result maps to exactly one [`ClientState`]. The mapping is
//! an exhaustive match: a new [`TransportOutcome`] variant does not compile until
//! it is given a state, and nothing falls through to `Valid`.

pub mod http;

pub use http::OnboardClient;

use crate::api::types::{ErrorResponse, OnboardResponse};
use std::borrow::Cow;
use thiserror::Error;

pub const MSG_LOADING: &str = "Checking your onboarding link...";
pub const MSG_VALID: &str = "Your onboarding link is valid.";
pub const MSG_INVALID: &str = "This onboarding link is invalid. Please request a new link.";
pub const MSG_EXPIRED: &str = "This onboarding link has expired. Please request a new link.";
pub const MSG_USED: &str = "This onboarding link has already been used. Please request a new link.";
pub const MSG_ERROR: &str =
    "Something went wrong while checking your onboarding link. Please try again.";
pub const MSG_CHECK_TIMEOUT: &str =
    "Checking your onboarding link took too long. Please try again.";
pub const MSG_SUBMIT_TIMEOUT: &str =
    "We could not confirm whether your settings were saved. Please check before trying again.";

/// Which call produced a transport outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `GET`: read path, safe to retry.
    Check,
    /// `POST`: consumes the token; a timeout leaves the outcome unknown.
    Submit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutcome {
    Response { status: u16, body: String },
    Timeout(Operation),
    Network(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Loading,
    Valid,
    Invalid,
    Expired,
    Used,
    Error,
}

impl StateKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::Used => "used",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Loading,
    /// Proceed to the form, prefilled from the snapshot.
    Valid(Box<OnboardResponse>),
    Invalid,
    Expired,
    Used,
    /// The only state offering a retry. `message` is transport-provided text.
    Error { message: Option<String> },
}

impl ClientState {
    #[must_use]
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Loading => StateKind::Loading,
            Self::Valid(_) => StateKind::Valid,
            Self::Invalid => StateKind::Invalid,
            Self::Expired => StateKind::Expired,
            Self::Used => StateKind::Used,
            Self::Error { .. } => StateKind::Error,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Loading)
    }

    #[must_use]
    pub fn can_retry(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// User-safe text. Only `Error` may carry transport-provided text.
    #[must_use]
    pub fn message(&self) -> Cow<'_, str> {
        match self {
            Self::Loading => Cow::Borrowed(MSG_LOADING),
            Self::Valid(_) => Cow::Borrowed(MSG_VALID),
            Self::Invalid => Cow::Borrowed(MSG_INVALID),
            Self::Expired => Cow::Borrowed(MSG_EXPIRED),
            Self::Used => Cow::Borrowed(MSG_USED),
            Self::Error { message: Some(message) } => Cow::Borrowed(message.as_str()),
            Self::Error { message: None } => Cow::Borrowed(MSG_ERROR),
        }
    }
}

/// Map a transport outcome to its terminal state.
#[must_use]
pub fn resolve(outcome: TransportOutcome) -> ClientState {
    match outcome {
        TransportOutcome::Response { status, body } => match status {
            200 => match serde_json::from_str::<OnboardResponse>(&body) {
                Ok(response) if response.success => ClientState::Valid(Box::new(response)),
                // A 200 we cannot read is not proof of validity.
                _ => ClientState::Error { message: None },
            },
            401 => ClientState::Invalid,
            410 => ClientState::Expired,
            409 => ClientState::Used,
            _ => ClientState::Error {
                message: error_message(&body),
            },
        },
        TransportOutcome::Timeout(Operation::Check) => ClientState::Error {
            message: Some(MSG_CHECK_TIMEOUT.to_string()),
        },
        TransportOutcome::Timeout(Operation::Submit) => ClientState::Error {
            message: Some(MSG_SUBMIT_TIMEOUT.to_string()),
        },
        TransportOutcome::Network(message) => ClientState::Error {
            message: Some(message),
        },
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .map(|response| response.error)
        .filter(|error| !error.trim().is_empty())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("flow already resolved to {0}")]
    AlreadyResolved(&'static str),
    #[error("retry is only available from the error state, current state is {0}")]
    NotRetryable(&'static str),
}

/// `loading -> {valid, invalid, expired, used, error}`, with `error -> loading` on retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardFlow {
    state: ClientState,
}

impl Default for OnboardFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl OnboardFlow {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ClientState::Loading,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// # Errors
    /// Returns an error if the flow is not waiting on a fetch.
    pub fn apply(&mut self, outcome: TransportOutcome) -> Result<&ClientState, FlowError> {
        if self.state.is_terminal() {
            return Err(FlowError::AlreadyResolved(self.state.kind().as_str()));
        }
        self.state = resolve(outcome);
        Ok(&self.state)
    }

    /// Re-enter `loading` so the caller can fetch again.
    ///
    /// # Errors
    /// Returns an error unless the current state is `error`; the other terminal
    /// states need a brand-new link.
    pub fn retry(&mut self) -> Result<(), FlowError> {
        if !self.state.can_retry() {
            return Err(FlowError::NotRetryable(self.state.kind().as_str()));
        }
        self.state = ClientState::Loading;
        Ok(())
    }
}

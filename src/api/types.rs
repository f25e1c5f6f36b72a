//! Request/response types for the onboarding endpoints.

use crate::redemption::RedemptionSnapshot;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body returned with `200` by both `GET` and `POST`.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OnboardResponse {
    pub success: bool,
    pub subject: String,
    pub snapshot: RedemptionSnapshot,
    pub redirect_url: String,
    /// Only present on `POST`: whether the settings sink accepted the submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_saved: Option<bool>,
}

/// Body returned with every non-200 status.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

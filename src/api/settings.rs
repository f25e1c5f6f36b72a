//! Hand-off for settings submitted through a redeemed link.
//!
//! Long-term storage of practice settings belongs to another system. The
//! handler calls a `SettingsSink` after the token has been consumed; the
//! default sink only logs.

use crate::redemption::PracticeSettings;
use anyhow::Result;
use tracing::info;

pub trait SettingsSink: Send + Sync {
    /// Accept settings for a subject whose link was just redeemed.
    fn apply(&self, subject_id: &str, settings: &PracticeSettings) -> Result<()>;
}

/// Local dev sink that logs field names instead of persisting anything.
#[derive(Clone, Debug)]
pub struct LogSettingsSink;

impl SettingsSink for LogSettingsSink {
    fn apply(&self, subject_id: &str, settings: &PracticeSettings) -> Result<()> {
        info!(
            subject_id,
            practice_name = settings.practice_name.is_some(),
            contact_email = settings.contact_email.is_some(),
            phone = settings.phone.is_some(),
            address = settings.address.is_some(),
            website = settings.website.is_some(),
            timezone = settings.timezone.is_some(),
            "settings submission stub"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sink_accepts() {
        let sink = LogSettingsSink;
        assert!(sink.apply("p1", &PracticeSettings::default()).is_ok());
    }
}

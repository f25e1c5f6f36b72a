pub mod health;
pub use self::health::health;

pub mod onboard;
pub use self::onboard::{check_onboarding, check_settings, redeem_onboarding, redeem_settings};

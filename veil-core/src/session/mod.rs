mod controller;
pub mod phase;

pub use controller::PrivacyController;
pub use phase::SessionPhase;

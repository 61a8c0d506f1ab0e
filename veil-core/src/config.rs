//! Tunables for the privacy controller.

use std::time::Duration;

use crate::host::DisplayBounds;

/// Configuration for [`PrivacyController`](crate::PrivacyController).
#[derive(Debug, Clone)]
pub struct PrivacyConfig {
    /// Backlight level forced while a session is active (0..=255).
    pub target_level: u8,
    /// How often the brightness override is re-applied.
    pub keep_alive_interval: Duration,
    /// Pixels the overlay extends past each display edge.
    pub overlay_margin: u32,
    /// Short message drawn in the middle of the overlay.
    pub warning_message: String,
    /// Label announced to the foreground-process registrar.
    pub foreground_label: String,
    /// Used when the compositor cannot report the display size.
    pub fallback_bounds: DisplayBounds,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            target_level: 0,
            keep_alive_interval: Duration::from_secs(1),
            overlay_margin: 1000,
            warning_message: "Remote maintenance in progress.\nPlease do not touch the screen."
                .into(),
            foreground_label: "Remote session active".into(),
            fallback_bounds: DisplayBounds::new(2560, 2560),
        }
    }
}

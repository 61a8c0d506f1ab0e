//! Configuration for the privacy agent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use veil_core::{BrightnessLevel, BrightnessMode, DeviceIdentity, DisplayBounds, OverlayLayer};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Obfuscation tunables.
    pub privacy: PrivacySection,
    /// Identity reported by the (simulated) device.
    pub device: DeviceIdentity,
    /// Behaviour of the simulated host.
    pub simulation: SimulationConfig,
    /// Brightness snapshot persistence.
    pub snapshot: SnapshotConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Obfuscation tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacySection {
    /// Backlight level forced during the session (0..=255).
    pub target_level: u8,
    /// Keep-alive period in milliseconds.
    pub keep_alive_ms: u64,
    /// Overlay oversize per edge, in pixels.
    pub overlay_margin: u32,
    /// Message drawn on the overlay.
    pub warning_message: String,
    /// Label shown for the foreground registration.
    pub foreground_label: String,
}

/// Simulated host behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Whether the elevated-overlay capability is granted.
    pub overlay_granted: bool,
    /// Whether display settings may be written.
    pub write_granted: bool,
    /// Overlay layers the compositor refuses to attach.
    pub rejected_layers: Vec<OverlayLayer>,
    /// Display width in pixels.
    pub display_width: u32,
    /// Display height in pixels.
    pub display_height: u32,
    /// Backlight level before the session.
    pub initial_level: u8,
    /// Backlight mode before the session.
    pub initial_mode: BrightnessMode,
}

/// Snapshot persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// JSON file holding the pre-session brightness while a session runs.
    pub path: PathBuf,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for PrivacySection {
    fn default() -> Self {
        let core = veil_core::PrivacyConfig::default();
        Self {
            target_level: core.target_level,
            keep_alive_ms: core.keep_alive_interval.as_millis() as u64,
            overlay_margin: core.overlay_margin,
            warning_message: core.warning_message,
            foreground_label: core.foreground_label,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            overlay_granted: true,
            write_granted: true,
            rejected_layers: Vec::new(),
            display_width: 1080,
            display_height: 2400,
            initial_level: 128,
            initial_mode: BrightnessMode::Automatic,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("veil-brightness.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl AgentConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Convert the privacy section into the core controller config.
    pub fn to_privacy_config(&self) -> veil_core::PrivacyConfig {
        veil_core::PrivacyConfig {
            target_level: self.privacy.target_level,
            keep_alive_interval: Duration::from_millis(self.privacy.keep_alive_ms.clamp(50, 60_000)),
            overlay_margin: self.privacy.overlay_margin.min(10_000),
            warning_message: self.privacy.warning_message.clone(),
            foreground_label: self.privacy.foreground_label.clone(),
            ..veil_core::PrivacyConfig::default()
        }
    }

    pub fn display_bounds(&self) -> DisplayBounds {
        DisplayBounds::new(self.simulation.display_width, self.simulation.display_height)
    }

    pub fn initial_brightness(&self) -> BrightnessLevel {
        BrightnessLevel {
            level: self.simulation.initial_level,
            mode: self.simulation.initial_mode,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = AgentConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("keep_alive_ms"));
        assert!(text.contains("overlay_granted"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let text = r#"
            [device]
            manufacturer = "Xiaomi"

            [simulation]
            rejected_layers = ["application-overlay"]
            initial_mode = "manual"
        "#;
        let cfg: AgentConfig = toml::from_str(text).unwrap();
        assert_eq!(cfg.device.manufacturer, "Xiaomi");
        assert_eq!(cfg.simulation.rejected_layers, vec![OverlayLayer::ApplicationOverlay]);
        assert_eq!(cfg.simulation.initial_mode, BrightnessMode::Manual);
        assert!(cfg.simulation.overlay_granted);
        assert_eq!(cfg.privacy.overlay_margin, 1000);
    }

    #[test]
    fn to_privacy_config_clamps() {
        let mut cfg = AgentConfig::default();
        cfg.privacy.keep_alive_ms = 1;
        cfg.privacy.overlay_margin = 1_000_000;
        let core = cfg.to_privacy_config();
        assert_eq!(core.keep_alive_interval, Duration::from_millis(50));
        assert_eq!(core.overlay_margin, 10_000);
    }

    #[test]
    fn missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AgentConfig::load(&dir.path().join("absent.toml"));
        assert_eq!(cfg.logging.level, "info");
    }
}

//! # veil-core
//!
//! Adaptive privacy obfuscation controller: keeps the local display of a
//! device unreadable to bystanders while a remote operator views it
//! through a framebuffer-capture channel.
//!
//! This crate contains:
//! - **Profile**: `resolve()`: device identity → ordered `OverlaySpec` candidates
//! - **Overlay**: `OverlayManager`: fallback-chain surface insertion and teardown
//! - **Brightness**: `BrightnessController`: backlight override with keep-alive
//! - **Session**: `PrivacyController`: the `start()` / `stop()` / `is_active()` surface
//! - **Host**: collaborator traits, plus an in-memory host for tests and simulation
//! - **Persist**: `JsonSnapshotStore` for crash-safe brightness rollback
//! - **Error**: typed, `thiserror`-based error hierarchy

pub mod brightness;
pub mod config;
pub mod error;
pub mod flags;
pub mod host;
pub mod overlay;
pub mod persist;
pub mod profile;
pub mod session;

use std::sync::{Mutex, MutexGuard, PoisonError};

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use brightness::{BrightnessController, BrightnessLevel, BrightnessMode, BrightnessSnapshot};
pub use config::PrivacyConfig;
pub use error::{
    BrightnessError, HostError, StartError, StrategyRejected, TeardownFailure, TeardownReport,
    VeilError,
};
pub use flags::SurfaceFlags;
pub use host::{
    Compositor, DisplayBounds, DisplaySettings, ForegroundRegistrar, ForegroundToken, Host, Notice,
    Notifier, OverlayCapability, SnapshotStore, SurfaceHandle,
};
pub use overlay::{InstalledOverlay, OverlayManager, SurfaceRequest};
pub use persist::JsonSnapshotStore;
pub use profile::{DeviceIdentity, OverlayLayer, OverlaySpec, VendorTag, resolve};
pub use session::{PrivacyController, SessionPhase};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Host collaborator interfaces.
//!
//! The controller never talks to the platform directly. Everything it
//! needs from the host (capability checks, the compositor, the global
//! display-configuration store, foreground registration, notifications
//! and snapshot persistence) comes through the traits below, bundled
//! in a [`Host`].
//!
//! All host calls are treated as fast, synchronous and fallible.
//! Compositor calls must be issued from the host's UI context, which is
//! why the controller only ever touches the compositor from inside
//! `start()` and `stop()`.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use crate::brightness::{BrightnessLevel, BrightnessSnapshot};
use crate::error::{HostError, VeilError};
use crate::overlay::SurfaceRequest;
use crate::profile::DeviceIdentity;

// ── Compositor ───────────────────────────────────────────────────

/// Physical display size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayBounds {
    pub width: u32,
    pub height: u32,
}

impl DisplayBounds {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Opaque handle to a surface created by the compositor.
///
/// Not `Clone`: whoever holds the handle owns the surface, and keeps
/// holding it until a release succeeds.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The host subsystem that stacks surfaces on the physical display.
///
/// Insertion is two-phase: a surface is created, then attached. A
/// created-but-unattached surface still has to be released.
pub trait Compositor: Send + Sync {
    /// Real size of the default display.
    fn display_bounds(&self) -> Result<DisplayBounds, HostError>;

    /// Build a surface for `request` without showing it.
    fn create_surface(&self, request: &SurfaceRequest) -> Result<SurfaceHandle, HostError>;

    /// Insert a created surface into the window stack.
    fn attach_surface(&self, surface: &SurfaceHandle) -> Result<(), HostError>;

    /// Detach (if attached) and free a surface.
    fn release_surface(&self, surface: &SurfaceHandle) -> Result<(), HostError>;
}

/// Provider of the elevated-overlay capability.
pub trait OverlayCapability: Send + Sync {
    fn is_granted(&self) -> bool;

    /// Ask the host to prompt the user for the capability.
    fn request(&self);

    /// Compositor reachable through the capability, `None` while not granted.
    fn compositor(&self) -> Option<Arc<dyn Compositor>>;
}

// ── Display configuration ────────────────────────────────────────

/// The device's global display-configuration store.
pub trait DisplaySettings: Send + Sync {
    fn read_brightness(&self) -> Result<BrightnessLevel, HostError>;

    /// Fails with [`HostError::Denied`] when the write is refused.
    fn write_brightness(&self, level: BrightnessLevel) -> Result<(), HostError>;

    fn can_write(&self) -> bool;

    /// Ask the host to prompt the user for write access.
    fn request_write_access(&self);
}

// ── Foreground registration ──────────────────────────────────────

/// Token proving the process is registered as user-visible work.
#[derive(Debug, PartialEq, Eq)]
pub struct ForegroundToken(u64);

impl ForegroundToken {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u64 {
        self.0
    }
}

pub trait ForegroundRegistrar: Send + Sync {
    fn announce(&self, label: &str) -> Result<ForegroundToken, HostError>;

    fn withdraw(&self, token: ForegroundToken);
}

// ── Notifications ────────────────────────────────────────────────

/// Human-readable status events. Rendering is up to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The overlay capability must be granted before privacy mode works.
    OverlayPermissionRequired,
    /// Brightness control needs write access to display settings.
    WriteSettingsPermissionRequired,
    PrivacyEngaged,
    PrivacyReleased,
    StartFailed,
}

/// Fire-and-forget notification channel.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

// ── Snapshot persistence ─────────────────────────────────────────

/// Minimal persistence contract for the brightness snapshot, so a
/// crashed session can still be rolled back on next launch.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &BrightnessSnapshot) -> Result<(), VeilError>;

    fn load(&self) -> Result<Option<BrightnessSnapshot>, VeilError>;

    fn clear(&self) -> Result<(), VeilError>;
}

// ── Host ─────────────────────────────────────────────────────────

/// Everything the controller consumes from the platform.
#[derive(Clone)]
pub struct Host {
    pub identity: DeviceIdentity,
    pub overlay: Arc<dyn OverlayCapability>,
    pub display: Arc<dyn DisplaySettings>,
    pub foreground: Arc<dyn ForegroundRegistrar>,
    pub notifier: Arc<dyn Notifier>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

//! Privacy session orchestration.
//!
//! [`PrivacyController`] is what the remote-control application talks
//! to. It owns the single session and composes the resolver, the
//! overlay manager and the brightness controller:
//!
//! 1. Announce the foreground process.
//! 2. Require the elevated-overlay capability (abort if missing).
//! 3. Query display-settings write access (informs strategy choice only).
//! 4. Resolve candidate specs and install the overlay (abort if exhausted).
//! 5. Dim the backlight, best-effort.
//!
//! `stop()` runs the mirror image and always ends `Inactive`.
//!
//! A session belongs to the connection that started it. Only that
//! connection can stop it; [`force_stop`](PrivacyController::force_stop)
//! ends it regardless of owner.

use std::sync::{Mutex, MutexGuard};

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::brightness::BrightnessController;
use crate::config::PrivacyConfig;
use crate::error::{StartError, TeardownReport};
use crate::host::{ForegroundToken, Host, Notice};
use crate::lock;
use crate::overlay::OverlayManager;
use crate::profile::{self, OverlaySpec, VendorTag};
use crate::session::phase::SessionPhase;

/// Everything one session owns. Guarded by the controller's mutex.
struct Session {
    phase: SessionPhase,
    overlay: Option<OverlayManager>,
    brightness: BrightnessController,
    foreground: Option<ForegroundToken>,
    /// Connection that started the current session.
    owner: Option<u64>,
}

/// The privacy mode entry point.
///
/// At most one session exists per controller; `start()` while a session
/// is running and `stop()` while none is are no-ops. `stop()` from a
/// connection other than the owner is ignored. Concurrent callers are
/// serialised by a single mutex around the session.
///
/// `start()` and `stop()` touch the compositor and must be called from
/// the host's UI context.
pub struct PrivacyController {
    host: Host,
    config: PrivacyConfig,
    session: Mutex<Session>,
}

impl PrivacyController {
    /// Build a controller on the current Tokio runtime.
    ///
    /// Called outside a runtime, the brightness override is written once
    /// per session and never reasserted. Use [`with_runtime`](Self::with_runtime)
    /// to pass a handle explicitly.
    pub fn new(host: Host, config: PrivacyConfig) -> Self {
        Self::with_runtime(host, config, Handle::try_current().ok())
    }

    /// Build a controller whose brightness keep-alive runs on `runtime`.
    pub fn with_runtime(host: Host, config: PrivacyConfig, runtime: Option<Handle>) -> Self {
        let mut brightness = BrightnessController::new(
            host.display.clone(),
            host.snapshots.clone(),
            config.target_level,
            config.keep_alive_interval,
            runtime,
        );
        if let Err(e) = brightness.recover() {
            warn!("brightness recovery failed: {e}");
        }

        Self {
            host,
            config,
            session: Mutex::new(Session {
                phase: SessionPhase::default(),
                overlay: None,
                brightness,
                foreground: None,
                owner: None,
            }),
        }
    }

    pub fn config(&self) -> &PrivacyConfig {
        &self.config
    }

    /// Engage privacy mode.
    ///
    /// Only [`StartError::CapabilityMissing`] and
    /// [`StartError::AllStrategiesExhausted`] abort; on either, the
    /// display is left untouched and the session stays `Inactive`.
    pub fn start(&self, conn_id: u64) -> Result<(), StartError> {
        let mut session = self.lock();
        if let Err(e) = session.phase.begin_start() {
            match session.owner {
                Some(owner) if owner != conn_id => {
                    warn!(conn_id, owner, "privacy mode held by another connection; start ignored")
                }
                _ => debug!(conn_id, "start ignored ({e}); session is {}", session.phase),
            }
            return Ok(());
        }
        session.owner = Some(conn_id);
        info!(conn_id, "privacy session starting");

        match self.host.foreground.announce(&self.config.foreground_label) {
            Ok(token) => session.foreground = Some(token),
            Err(e) => warn!("foreground registration failed: {e}"),
        }

        let compositor = if self.host.overlay.is_granted() {
            self.host.overlay.compositor()
        } else {
            None
        };
        let Some(compositor) = compositor else {
            warn!("overlay capability not granted; requesting it");
            self.host.overlay.request();
            self.host.notifier.notify(Notice::OverlayPermissionRequired);
            self.abort(&mut session);
            return Err(StartError::CapabilityMissing);
        };

        let brightness_writable = self.host.display.can_write();
        if !brightness_writable {
            info!("display settings not writable; using overlay-only strategies");
            self.host.display.request_write_access();
            self.host.notifier.notify(Notice::WriteSettingsPermissionRequired);
        }

        let vendor = VendorTag::classify(&self.host.identity);
        let specs = profile::resolve(&self.host.identity, brightness_writable);
        info!(%vendor, candidates = specs.len(), brightness_writable, "overlay strategies resolved");

        let mut overlay = OverlayManager::new(compositor, &self.config);
        if let Err(e) = overlay.install(&specs) {
            error!("privacy mode unavailable: {e}");
            self.host.notifier.notify(Notice::StartFailed);
            self.abort(&mut session);
            return Err(e);
        }
        session.overlay = Some(overlay);

        if let Err(e) = session.brightness.dim() {
            warn!("continuing with overlay only: {e}");
        }

        if let Err(e) = session.phase.activate() {
            error!("{e}");
        }
        self.host.notifier.notify(Notice::PrivacyEngaged);
        info!("privacy session active");
        Ok(())
    }

    /// Release privacy mode on behalf of `conn_id`.
    ///
    /// Ignored unless `conn_id` owns the session. Otherwise always leaves
    /// the session `Inactive`; individual rollback failures are logged.
    pub fn stop(&self, conn_id: u64) {
        let mut session = self.lock();
        let holder = session.owner;
        match holder {
            Some(owner) if owner != conn_id => {
                warn!(conn_id, owner, "privacy mode belongs to another connection; stop ignored");
            }
            _ => self.shutdown(&mut session),
        }
    }

    /// Release privacy mode whoever owns it.
    pub fn force_stop(&self) {
        let mut session = self.lock();
        self.shutdown(&mut session);
    }

    /// Connection holding privacy mode, if a session is running.
    pub fn owner(&self) -> Option<u64> {
        self.lock().owner
    }

    fn shutdown(&self, session: &mut Session) {
        if session.phase.begin_stop().is_err() {
            debug!("stop ignored; session is {}", session.phase);
            return;
        }
        info!(owner = ?session.owner, "privacy session stopping");

        let report = Self::release(session, &self.host);
        report.log("privacy teardown");

        if let Err(e) = session.phase.finish_stop() {
            error!("{e}");
            session.phase.force_reset();
        }
        self.host.notifier.notify(Notice::PrivacyReleased);
        info!(clean = report.is_clean(), "privacy session stopped");
    }

    pub fn is_active(&self) -> bool {
        self.lock().phase.is_active()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase.clone()
    }

    /// The overlay strategy in use, while a session is active.
    pub fn strategy(&self) -> Option<OverlaySpec> {
        self.lock()
            .overlay
            .as_ref()
            .and_then(OverlayManager::installed)
            .map(|installed| installed.spec)
    }

    /// Roll a failed start back to `Inactive`.
    fn abort(&self, session: &mut Session) {
        Self::release(session, &self.host).log("aborted start");
        if let Err(e) = session.phase.abort_start() {
            error!("{e}");
            session.phase.force_reset();
        }
    }

    /// Tear down every resource the session holds, each independently.
    fn release(session: &mut Session, host: &Host) -> TeardownReport {
        let mut report = TeardownReport::new();
        if let Some(mut overlay) = session.overlay.take() {
            report.merge(overlay.uninstall());
            // Stranded surfaces are retried by the next teardown.
            if overlay.stranded_surfaces() > 0 {
                session.overlay = Some(overlay);
            }
        }
        report.merge(session.brightness.restore());
        if let Some(token) = session.foreground.take() {
            host.foreground.withdraw(token);
        }
        session.owner = None;
        report
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }
}

impl Drop for PrivacyController {
    fn drop(&mut self) {
        self.force_stop();
    }
}

impl std::fmt::Debug for PrivacyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivacyController")
            .field("host", &self.host)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;
    use crate::profile::{DeviceIdentity, OverlayLayer};

    const CONN: u64 = 7;
    const OTHER: u64 = 9;

    fn controller(mem: &MemoryHost, manufacturer: &str) -> PrivacyController {
        PrivacyController::with_runtime(
            mem.host(DeviceIdentity::new(manufacturer, "", "")),
            PrivacyConfig::default(),
            None,
        )
    }

    #[test]
    fn start_then_stop() {
        let mem = MemoryHost::new();
        let ctl = controller(&mem, "genericcorp");

        ctl.start(CONN).unwrap();
        assert!(ctl.is_active());
        assert_eq!(mem.compositor.attached_surfaces().len(), 1);
        assert_eq!(mem.foreground.active_labels().len(), 1);

        ctl.stop(CONN);
        assert!(!ctl.is_active());
        assert_eq!(mem.compositor.live_surfaces(), 0);
        assert!(mem.foreground.active_labels().is_empty());
        assert_eq!(
            mem.notifier.notices(),
            vec![Notice::PrivacyEngaged, Notice::PrivacyReleased]
        );
    }

    #[test]
    fn missing_capability_is_requested() {
        let mem = MemoryHost::new();
        mem.capability.set_granted(false);
        let ctl = controller(&mem, "genericcorp");

        assert!(matches!(ctl.start(CONN), Err(StartError::CapabilityMissing)));
        assert_eq!(mem.capability.request_count(), 1);
        assert!(mem.foreground.active_labels().is_empty());
        assert_eq!(ctl.phase(), SessionPhase::Inactive);
        assert_eq!(mem.display.write_count(), 0);
    }

    #[test]
    fn failed_announce_does_not_abort() {
        let mem = MemoryHost::new();
        mem.foreground.fail_announce(true);
        let ctl = controller(&mem, "genericcorp");

        ctl.start(CONN).unwrap();
        assert!(ctl.is_active());
    }

    #[test]
    fn strategy_reports_installed_spec() {
        let mem = MemoryHost::new();
        mem.compositor.reject_layer(OverlayLayer::ApplicationOverlay);
        let ctl = controller(&mem, "Xiaomi");

        assert!(ctl.strategy().is_none());
        ctl.start(CONN).unwrap();
        assert_eq!(
            ctl.strategy().map(|s| s.layer),
            Some(OverlayLayer::AccessibilityOverlay)
        );
        ctl.stop(CONN);
        assert!(ctl.strategy().is_none());
    }

    #[test]
    fn dropping_active_controller_rolls_back() {
        let mem = MemoryHost::new();
        {
            let ctl = controller(&mem, "genericcorp");
            ctl.start(CONN).unwrap();
        }
        assert_eq!(mem.compositor.live_surfaces(), 0);
        assert_eq!(mem.display.current().level, 128);
    }

    #[test]
    fn owner_is_reported_while_active() {
        let mem = MemoryHost::new();
        let ctl = controller(&mem, "genericcorp");

        assert_eq!(ctl.owner(), None);
        ctl.start(CONN).unwrap();
        assert_eq!(ctl.owner(), Some(CONN));
        ctl.stop(CONN);
        assert_eq!(ctl.owner(), None);
    }

    #[test]
    fn failed_start_clears_owner() {
        let mem = MemoryHost::new();
        mem.capability.set_granted(false);
        let ctl = controller(&mem, "genericcorp");

        assert!(ctl.start(CONN).is_err());
        assert_eq!(ctl.owner(), None);
    }

    #[test]
    fn start_from_other_connection_keeps_owner() {
        let mem = MemoryHost::new();
        let ctl = controller(&mem, "genericcorp");

        ctl.start(CONN).unwrap();
        ctl.start(OTHER).unwrap();
        assert_eq!(ctl.owner(), Some(CONN));
        assert_eq!(mem.compositor.live_surfaces(), 1);
        assert_eq!(mem.display.write_count(), 1);
    }

    #[test]
    fn stop_from_other_connection_is_ignored() {
        let mem = MemoryHost::new();
        let ctl = controller(&mem, "genericcorp");

        ctl.start(CONN).unwrap();
        ctl.stop(OTHER);
        assert!(ctl.is_active());
        assert_eq!(mem.compositor.live_surfaces(), 1);
        assert_eq!(mem.display.current().level, 0);

        ctl.stop(CONN);
        assert!(!ctl.is_active());
        assert_eq!(mem.display.current().level, 128);
    }

    #[test]
    fn force_stop_ignores_owner() {
        let mem = MemoryHost::new();
        let ctl = controller(&mem, "genericcorp");

        ctl.start(CONN).unwrap();
        ctl.force_stop();
        assert!(!ctl.is_active());
        assert_eq!(ctl.owner(), None);
        assert_eq!(mem.compositor.live_surfaces(), 0);
    }

    #[test]
    fn stranded_surface_is_retried_on_next_start() {
        let mem = MemoryHost::new();
        let ctl = controller(&mem, "genericcorp");

        ctl.start(CONN).unwrap();
        mem.compositor.fail_releases(true);
        ctl.stop(CONN);
        assert_eq!(mem.compositor.live_surfaces(), 1);

        mem.compositor.fail_releases(false);
        ctl.start(CONN).unwrap();
        assert_eq!(mem.compositor.live_surfaces(), 1);
        ctl.stop(CONN);
        assert_eq!(mem.compositor.live_surfaces(), 0);
    }

    #[test]
    fn new_outside_runtime_still_dims_once() {
        let mem = MemoryHost::new();
        let ctl = PrivacyController::new(
            mem.host(DeviceIdentity::new("genericcorp", "", "")),
            PrivacyConfig::default(),
        );

        ctl.start(CONN).unwrap();
        assert_eq!(mem.display.writes(), vec![crate::BrightnessLevel::manual(0)]);
    }
}

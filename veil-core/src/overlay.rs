//! Overlay compositor manager.
//!
//! Tries each candidate [`OverlaySpec`] in order until the compositor
//! accepts one. A rejected attempt is cleaned up and the next candidate
//! is tried; the first success ends the search, so at most one strategy
//! is ever active.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::PrivacyConfig;
use crate::error::{HostError, StartError, StrategyRejected, TeardownFailure, TeardownReport};
use crate::flags::SurfaceFlags;
use crate::host::{Compositor, DisplayBounds, SurfaceHandle};
use crate::profile::{OverlayLayer, OverlaySpec};

// ── SurfaceRequest ───────────────────────────────────────────────

/// Full-coverage darkening surface as handed to the compositor.
///
/// The surface is larger than the display by `margin` on every edge and
/// offset by `-margin`, so bars, rounded corners and cutouts are covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceRequest {
    pub layer: OverlayLayer,
    pub insertion_priority: i32,
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub alpha: u8,
    pub opaque: bool,
    pub flags: SurfaceFlags,
    pub message: String,
}

impl SurfaceRequest {
    pub fn for_spec(spec: &OverlaySpec, bounds: DisplayBounds, margin: u32, message: &str) -> Self {
        let mut flags = SurfaceFlags::BASE;
        if spec.local_only {
            flags |= SurfaceFlags::LOCAL_ONLY;
        }
        let offset = i32::try_from(margin).unwrap_or(i32::MAX);
        Self {
            layer: spec.layer,
            insertion_priority: spec.insertion_priority,
            width: bounds.width.saturating_add(margin.saturating_mul(2)),
            height: bounds.height.saturating_add(margin.saturating_mul(2)),
            x: -offset,
            y: -offset,
            alpha: spec.surface_alpha,
            opaque: spec.opaque,
            flags,
            message: message.to_string(),
        }
    }
}

// ── InstalledOverlay ─────────────────────────────────────────────

/// The strategy that won and the surfaces it put on screen.
#[derive(Debug)]
pub struct InstalledOverlay {
    pub spec: OverlaySpec,
    surfaces: Vec<SurfaceHandle>,
}

impl InstalledOverlay {
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }
}

// ── OverlayManager ───────────────────────────────────────────────

/// Owns the darkening surfaces of one session.
pub struct OverlayManager {
    compositor: Arc<dyn Compositor>,
    margin: u32,
    message: String,
    fallback_bounds: DisplayBounds,
    installed: Option<InstalledOverlay>,
    /// Surfaces whose release failed; retried by every `uninstall()`.
    stranded: Vec<SurfaceHandle>,
}

impl OverlayManager {
    pub fn new(compositor: Arc<dyn Compositor>, config: &PrivacyConfig) -> Self {
        Self {
            compositor,
            margin: config.overlay_margin,
            message: config.warning_message.clone(),
            fallback_bounds: config.fallback_bounds,
            installed: None,
            stranded: Vec::new(),
        }
    }

    pub fn installed(&self) -> Option<&InstalledOverlay> {
        self.installed.as_ref()
    }

    /// Surfaces still live in the compositor after a failed release.
    pub fn stranded_surfaces(&self) -> usize {
        self.stranded.len()
    }

    /// Insert a darkening surface using the first spec the compositor accepts.
    ///
    /// Fails with [`StartError::AllStrategiesExhausted`] when every spec
    /// is rejected; nothing is left on screen in that case.
    pub fn install(&mut self, specs: &[OverlaySpec]) -> Result<OverlaySpec, StartError> {
        if let Some(installed) = &self.installed {
            debug!("overlay already installed; keeping {}", installed.spec.layer);
            return Ok(installed.spec);
        }

        let bounds = self.compositor.display_bounds().unwrap_or_else(|e| {
            warn!(
                "display bounds unavailable ({e}); assuming {}x{}",
                self.fallback_bounds.width, self.fallback_bounds.height
            );
            self.fallback_bounds
        });
        debug!("display bounds {}x{}", bounds.width, bounds.height);

        let mut attempts = Vec::new();
        for (index, spec) in specs.iter().enumerate() {
            match self.try_insert(spec, bounds) {
                Ok(surface) => {
                    info!(
                        attempt = index + 1,
                        layer = %spec.layer,
                        alpha = spec.surface_alpha,
                        local_only = spec.local_only,
                        "overlay installed as surface {surface}"
                    );
                    self.installed = Some(InstalledOverlay {
                        spec: *spec,
                        surfaces: vec![surface],
                    });
                    return Ok(*spec);
                }
                Err(reason) => {
                    warn!(
                        attempt = index + 1,
                        layer = %spec.layer,
                        alpha = spec.surface_alpha,
                        "overlay strategy rejected: {reason}"
                    );
                    attempts.push(StrategyRejected {
                        layer: spec.layer,
                        alpha: spec.surface_alpha,
                        reason,
                    });
                }
            }
        }

        Err(StartError::AllStrategiesExhausted { attempts })
    }

    /// One strategy attempt. A surface created but not attached is
    /// released again before returning the rejection; if that release
    /// fails the handle is kept for `uninstall()`.
    fn try_insert(&mut self, spec: &OverlaySpec, bounds: DisplayBounds) -> Result<SurfaceHandle, HostError> {
        spec.validate()
            .map_err(|e| HostError::Rejected(e.to_string()))?;

        let request = SurfaceRequest::for_spec(spec, bounds, self.margin, &self.message);
        let surface = self.compositor.create_surface(&request)?;

        if let Err(e) = self.compositor.attach_surface(&surface) {
            if let Err(undo) = self.compositor.release_surface(&surface) {
                warn!("failed to release rejected surface {surface}: {undo}");
                self.stranded.push(surface);
            }
            return Err(e);
        }

        Ok(surface)
    }

    /// Remove every installed surface, plus any left over from earlier
    /// failed releases. Each removal is attempted even if an earlier one
    /// failed; failed surfaces are kept and retried on the next call.
    pub fn uninstall(&mut self) -> TeardownReport {
        let mut report = TeardownReport::new();
        let installed = self.installed.take();

        let mut pending = std::mem::take(&mut self.stranded);
        if let Some(installed) = &installed {
            debug!(layer = %installed.spec.layer, "uninstalling overlay");
        }
        pending.extend(installed.into_iter().flat_map(|i| i.surfaces));
        if pending.is_empty() {
            return report;
        }

        for surface in pending {
            match self.compositor.release_surface(&surface) {
                Ok(()) => debug!("surface {surface} removed"),
                Err(reason) => {
                    report.push(TeardownFailure::Surface {
                        surface: surface.id(),
                        reason,
                    });
                    self.stranded.push(surface);
                }
            }
        }

        if self.stranded.is_empty() {
            info!("overlay uninstalled");
        } else {
            warn!(stranded = self.stranded.len(), "overlay surfaces left on screen");
        }
        report
    }
}

impl Drop for OverlayManager {
    fn drop(&mut self) {
        if self.installed.is_some() || !self.stranded.is_empty() {
            self.uninstall().log("overlay manager dropped while installed");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

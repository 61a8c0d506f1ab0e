//! In-memory host.
//!
//! Every collaborator keeps its state in memory and exposes it for
//! inspection. Failure knobs (denied capabilities, rejected layers,
//! refused writes) let tests and the agent's simulation mode walk every
//! fallback path without a real device.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::brightness::{BrightnessLevel, BrightnessSnapshot};
use crate::error::{HostError, VeilError};
use crate::host::{
    Compositor, DisplayBounds, DisplaySettings, ForegroundRegistrar, ForegroundToken, Host, Notice,
    Notifier, OverlayCapability, SnapshotStore, SurfaceHandle,
};
use crate::lock;
use crate::overlay::SurfaceRequest;
use crate::profile::{DeviceIdentity, OverlayLayer};

// ── MemoryCompositor ─────────────────────────────────────────────

/// Compositor call, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositorEvent {
    Created { id: u64, layer: OverlayLayer },
    CreateRejected { layer: OverlayLayer },
    Attached { id: u64 },
    AttachRejected { id: u64, layer: OverlayLayer },
    Released { id: u64 },
}

#[derive(Debug)]
struct MemorySurface {
    request: SurfaceRequest,
    attached: bool,
}

#[derive(Debug)]
pub struct MemoryCompositor {
    bounds: DisplayBounds,
    fail_bounds: AtomicBool,
    fail_releases: AtomicBool,
    rejected_layers: Mutex<HashSet<OverlayLayer>>,
    rejected_creates: Mutex<HashSet<OverlayLayer>>,
    next_id: AtomicU64,
    surfaces: Mutex<BTreeMap<u64, MemorySurface>>,
    events: Mutex<Vec<CompositorEvent>>,
}

impl MemoryCompositor {
    pub fn new(bounds: DisplayBounds) -> Self {
        Self {
            bounds,
            fail_bounds: AtomicBool::new(false),
            fail_releases: AtomicBool::new(false),
            rejected_layers: Mutex::new(HashSet::new()),
            rejected_creates: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
            surfaces: Mutex::new(BTreeMap::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Surfaces of `layer` are created but refused on attach.
    pub fn reject_layer(&self, layer: OverlayLayer) {
        lock(&self.rejected_layers).insert(layer);
    }

    /// Surfaces of `layer` cannot even be created.
    pub fn reject_create(&self, layer: OverlayLayer) {
        lock(&self.rejected_creates).insert(layer);
    }

    pub fn fail_bounds(&self, fail: bool) {
        self.fail_bounds.store(fail, Ordering::SeqCst);
    }

    pub fn fail_releases(&self, fail: bool) {
        self.fail_releases.store(fail, Ordering::SeqCst);
    }

    /// Surfaces created and not yet released, attached or not.
    pub fn live_surfaces(&self) -> usize {
        lock(&self.surfaces).len()
    }

    /// Requests of every surface currently shown.
    pub fn attached_surfaces(&self) -> Vec<SurfaceRequest> {
        lock(&self.surfaces)
            .values()
            .filter(|s| s.attached)
            .map(|s| s.request.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<CompositorEvent> {
        lock(&self.events).clone()
    }

    fn record(&self, event: CompositorEvent) {
        lock(&self.events).push(event);
    }
}

impl Compositor for MemoryCompositor {
    fn display_bounds(&self) -> Result<DisplayBounds, HostError> {
        if self.fail_bounds.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable("no default display".into()));
        }
        Ok(self.bounds)
    }

    fn create_surface(&self, request: &SurfaceRequest) -> Result<SurfaceHandle, HostError> {
        if lock(&self.rejected_creates).contains(&request.layer) {
            self.record(CompositorEvent::CreateRejected {
                layer: request.layer,
            });
            return Err(HostError::Rejected(format!(
                "{} surfaces are not supported",
                request.layer
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.surfaces).insert(
            id,
            MemorySurface {
                request: request.clone(),
                attached: false,
            },
        );
        self.record(CompositorEvent::Created {
            id,
            layer: request.layer,
        });
        Ok(SurfaceHandle::new(id))
    }

    fn attach_surface(&self, surface: &SurfaceHandle) -> Result<(), HostError> {
        let id = surface.id();
        let mut surfaces = lock(&self.surfaces);
        let entry = surfaces
            .get_mut(&id)
            .ok_or_else(|| HostError::Rejected(format!("unknown surface #{id}")))?;
        if lock(&self.rejected_layers).contains(&entry.request.layer) {
            let layer = entry.request.layer;
            drop(surfaces);
            self.record(CompositorEvent::AttachRejected { id, layer });
            return Err(HostError::Denied(format!("permission denied for window type {layer}")));
        }
        entry.attached = true;
        drop(surfaces);
        self.record(CompositorEvent::Attached { id });
        Ok(())
    }

    fn release_surface(&self, surface: &SurfaceHandle) -> Result<(), HostError> {
        let id = surface.id();
        if self.fail_releases.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable(format!("cannot remove surface #{id}")));
        }
        lock(&self.surfaces)
            .remove(&id)
            .ok_or_else(|| HostError::Rejected(format!("unknown surface #{id}")))?;
        self.record(CompositorEvent::Released { id });
        Ok(())
    }
}

// ── MemoryCapability ─────────────────────────────────────────────

#[derive(Debug)]
pub struct MemoryCapability {
    granted: AtomicBool,
    requests: AtomicUsize,
    compositor: Arc<MemoryCompositor>,
}

impl MemoryCapability {
    pub fn new(granted: bool, compositor: Arc<MemoryCompositor>) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            requests: AtomicUsize::new(0),
            compositor,
        }
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    /// How many times the capability was requested.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl OverlayCapability for MemoryCapability {
    fn is_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn compositor(&self) -> Option<Arc<dyn Compositor>> {
        self.is_granted()
            .then(|| Arc::clone(&self.compositor) as Arc<dyn Compositor>)
    }
}

// ── MemoryDisplay ────────────────────────────────────────────────

#[derive(Debug)]
pub struct MemoryDisplay {
    current: Mutex<BrightnessLevel>,
    writable: AtomicBool,
    deny_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: Mutex<Vec<BrightnessLevel>>,
    access_requests: AtomicUsize,
}

impl MemoryDisplay {
    pub fn new(initial: BrightnessLevel) -> Self {
        Self {
            current: Mutex::new(initial),
            writable: AtomicBool::new(true),
            deny_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            writes: Mutex::new(Vec::new()),
            access_requests: AtomicUsize::new(0),
        }
    }

    /// Controls what `can_write()` reports.
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// Refuse writes even though `can_write()` may say otherwise.
    pub fn deny_writes(&self, deny: bool) {
        self.deny_writes.store(deny, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Change the stored value the way the OS would (not counted as a write).
    pub fn set_level(&self, level: BrightnessLevel) {
        *lock(&self.current) = level;
    }

    pub fn current(&self) -> BrightnessLevel {
        *lock(&self.current)
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        lock(&self.writes).len()
    }

    pub fn writes(&self) -> Vec<BrightnessLevel> {
        lock(&self.writes).clone()
    }

    pub fn access_request_count(&self) -> usize {
        self.access_requests.load(Ordering::SeqCst)
    }
}

impl DisplaySettings for MemoryDisplay {
    fn read_brightness(&self) -> Result<BrightnessLevel, HostError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable("setting not found".into()));
        }
        Ok(self.current())
    }

    fn write_brightness(&self, level: BrightnessLevel) -> Result<(), HostError> {
        if !self.writable.load(Ordering::SeqCst) || self.deny_writes.load(Ordering::SeqCst) {
            return Err(HostError::Denied("WRITE_SETTINGS not granted".into()));
        }
        *lock(&self.current) = level;
        lock(&self.writes).push(level);
        Ok(())
    }

    fn can_write(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    fn request_write_access(&self) {
        self.access_requests.fetch_add(1, Ordering::SeqCst);
    }
}

// ── MemoryForeground ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryForeground {
    next_id: AtomicU64,
    fail: AtomicBool,
    active: Mutex<Vec<(u64, String)>>,
}

impl MemoryForeground {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_announce(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Labels currently announced.
    pub fn active_labels(&self) -> Vec<String> {
        lock(&self.active).iter().map(|(_, l)| l.clone()).collect()
    }
}

impl ForegroundRegistrar for MemoryForeground {
    fn announce(&self, label: &str) -> Result<ForegroundToken, HostError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::Denied("foreground start not allowed".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.active).push((id, label.to_string()));
        Ok(ForegroundToken::new(id))
    }

    fn withdraw(&self, token: ForegroundToken) {
        lock(&self.active).retain(|(id, _)| *id != token.id());
    }
}

// ── RecordingNotifier ────────────────────────────────────────────

/// Records notices; also logs them so the agent shows them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        info!(?notice, "notification");
        lock(&self.notices).push(notice);
    }
}

// ── MemorySnapshotStore ──────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<BrightnessSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &BrightnessSnapshot) -> Result<(), VeilError> {
        *lock(&self.slot) = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<BrightnessSnapshot>, VeilError> {
        Ok(lock(&self.slot).clone())
    }

    fn clear(&self) -> Result<(), VeilError> {
        *lock(&self.slot) = None;
        Ok(())
    }
}

// ── MemoryHost ───────────────────────────────────────────────────

/// All in-memory collaborators, kept typed for inspection.
#[derive(Clone)]
pub struct MemoryHost {
    pub compositor: Arc<MemoryCompositor>,
    pub capability: Arc<MemoryCapability>,
    pub display: Arc<MemoryDisplay>,
    pub foreground: Arc<MemoryForeground>,
    pub notifier: Arc<RecordingNotifier>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

impl MemoryHost {
    /// Capabilities granted, 1080x2400 display at manual level 128.
    pub fn new() -> Self {
        let compositor = Arc::new(MemoryCompositor::new(DisplayBounds::new(1080, 2400)));
        Self {
            capability: Arc::new(MemoryCapability::new(true, Arc::clone(&compositor))),
            compositor,
            display: Arc::new(MemoryDisplay::new(BrightnessLevel::manual(128))),
            foreground: Arc::new(MemoryForeground::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            snapshots: Arc::new(MemorySnapshotStore::new()),
        }
    }

    /// Replace the compositor with one reporting `bounds`.
    pub fn with_bounds(mut self, bounds: DisplayBounds) -> Self {
        self.compositor = Arc::new(MemoryCompositor::new(bounds));
        self.capability = Arc::new(MemoryCapability::new(
            self.capability.is_granted(),
            Arc::clone(&self.compositor),
        ));
        self
    }

    /// Replace the snapshot store (e.g. with a file-backed one).
    pub fn with_snapshots(mut self, snapshots: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = snapshots;
        self
    }

    /// Type-erased bundle for the controller.
    pub fn host(&self, identity: DeviceIdentity) -> Host {
        Host {
            identity,
            overlay: Arc::clone(&self.capability) as Arc<dyn OverlayCapability>,
            display: Arc::clone(&self.display) as Arc<dyn DisplaySettings>,
            foreground: Arc::clone(&self.foreground) as Arc<dyn ForegroundRegistrar>,
            notifier: Arc::clone(&self.notifier) as Arc<dyn Notifier>,
            snapshots: Arc::clone(&self.snapshots),
        }
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

//! Physical brightness override.
//!
//! Saves the current backlight configuration, forces the target level,
//! and keeps forcing it on a short interval until restored: some hosts
//! re-engage auto-brightness or reset manual overrides behind our back,
//! so one write does not stick.
//!
//! The display-configuration store is shared with the whole OS. It is
//! only ever written between [`dim`](BrightnessController::dim) and
//! [`restore`](BrightnessController::restore).

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BrightnessError, TeardownFailure, TeardownReport, VeilError};
use crate::host::{DisplaySettings, SnapshotStore};
use crate::lock;

/// Shortest keep-alive period accepted; shorter values are raised to it.
pub const MIN_KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(50);

// ── Levels ───────────────────────────────────────────────────────

/// Backlight control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrightnessMode {
    Manual,
    Automatic,
}

/// A `(level, mode)` pair as stored by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrightnessLevel {
    pub level: u8,
    pub mode: BrightnessMode,
}

impl BrightnessLevel {
    pub const fn manual(level: u8) -> Self {
        Self {
            level,
            mode: BrightnessMode::Manual,
        }
    }
}

/// Backlight configuration captured before the first override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightnessSnapshot {
    pub original_level: u8,
    pub original_mode: BrightnessMode,
    pub captured_at: SystemTime,
}

impl BrightnessSnapshot {
    pub fn capture(current: BrightnessLevel) -> Self {
        Self {
            original_level: current.level,
            original_mode: current.mode,
            captured_at: SystemTime::now(),
        }
    }

    /// The configuration to write back.
    pub fn original(&self) -> BrightnessLevel {
        BrightnessLevel {
            level: self.original_level,
            mode: self.original_mode,
        }
    }
}

// ── KeepAlive ────────────────────────────────────────────────────

/// Periodic re-application of the target level.
///
/// Every write happens under `gate` after re-checking the token, so
/// once [`cancel`](Self::cancel) returns no further write can land.
struct KeepAlive {
    token: CancellationToken,
    gate: Arc<Mutex<()>>,
    task: JoinHandle<()>,
}

impl KeepAlive {
    fn spawn(
        runtime: &Handle,
        display: Arc<dyn DisplaySettings>,
        target: BrightnessLevel,
        interval: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let gate = Arc::new(Mutex::new(()));

        let task = runtime.spawn({
            let token = token.clone();
            let gate = Arc::clone(&gate);
            async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    if !reassert(&gate, &token, display.as_ref(), target) {
                        break;
                    }
                }
                debug!("brightness keep-alive stopped");
            }
        });

        Self { token, gate, task }
    }

    /// Stop the loop. Synchronous: no reassertion runs after this returns.
    fn cancel(self) {
        {
            let _gate = lock(&self.gate);
            self.token.cancel();
        }
        self.task.abort();
    }
}

/// One keep-alive tick. Returns `false` once cancelled.
fn reassert(
    gate: &Mutex<()>,
    token: &CancellationToken,
    display: &dyn DisplaySettings,
    target: BrightnessLevel,
) -> bool {
    let _gate = lock(gate);
    if token.is_cancelled() {
        return false;
    }
    match display.write_brightness(target) {
        Ok(()) => debug!(level = target.level, "brightness reasserted"),
        Err(e) => warn!("brightness keep-alive write failed: {e}"),
    }
    true
}

// ── BrightnessController ─────────────────────────────────────────

/// Owns the brightness snapshot and the keep-alive loop.
pub struct BrightnessController {
    display: Arc<dyn DisplaySettings>,
    snapshots: Arc<dyn SnapshotStore>,
    target: BrightnessLevel,
    interval: Duration,
    runtime: Option<Handle>,
    snapshot: Option<BrightnessSnapshot>,
    keep_alive: Option<KeepAlive>,
}

impl BrightnessController {
    /// `runtime` hosts the keep-alive timer; without one only the
    /// initial write is applied. `interval` is raised to
    /// [`MIN_KEEP_ALIVE_INTERVAL`] if shorter.
    pub fn new(
        display: Arc<dyn DisplaySettings>,
        snapshots: Arc<dyn SnapshotStore>,
        target_level: u8,
        interval: Duration,
        runtime: Option<Handle>,
    ) -> Self {
        if interval < MIN_KEEP_ALIVE_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                "keep-alive interval too short; using {} ms",
                MIN_KEEP_ALIVE_INTERVAL.as_millis()
            );
        }
        Self {
            display,
            snapshots,
            target: BrightnessLevel::manual(target_level),
            interval: interval.max(MIN_KEEP_ALIVE_INTERVAL),
            runtime,
            snapshot: None,
            keep_alive: None,
        }
    }

    pub fn target(&self) -> BrightnessLevel {
        self.target
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The retained snapshot, if brightness was touched this session.
    pub fn snapshot(&self) -> Option<&BrightnessSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_dimmed(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn keep_alive_running(&self) -> bool {
        self.keep_alive
            .as_ref()
            .is_some_and(|k| !k.task.is_finished())
    }

    /// Roll back a snapshot persisted by a previous process that never
    /// reached `restore()`.
    ///
    /// Returns `true` if a stale snapshot was found and re-applied.
    pub fn recover(&mut self) -> Result<bool, VeilError> {
        if self.snapshot.is_some() {
            return Ok(false);
        }
        let Some(stale) = self.snapshots.load()? else {
            return Ok(false);
        };
        if !self.display.can_write() {
            warn!("stale brightness snapshot found but settings are not writable; keeping it");
            return Ok(false);
        }
        self.display.write_brightness(stale.original())?;
        self.snapshots.clear()?;
        info!(
            level = stale.original_level,
            mode = ?stale.original_mode,
            "restored brightness left over from an interrupted session"
        );
        Ok(true)
    }

    /// Apply the target override and start the keep-alive loop.
    ///
    /// The snapshot is taken once per session; a second call re-applies
    /// the target without overwriting it.
    pub fn dim(&mut self) -> Result<(), BrightnessError> {
        if !self.display.can_write() {
            return Err(BrightnessError::WriteUnavailable);
        }

        if self.snapshot.is_none() {
            self.snapshot = Some(self.take_snapshot()?);
        }

        if let Err(e) = self.display.write_brightness(self.target) {
            self.restore().log("brightness rollback after failed override");
            return Err(BrightnessError::WriteDenied(e));
        }

        if self.keep_alive.is_none() {
            match &self.runtime {
                Some(runtime) => {
                    self.keep_alive = Some(KeepAlive::spawn(
                        runtime,
                        Arc::clone(&self.display),
                        self.target,
                        self.interval,
                    ));
                }
                None => warn!("no async runtime available; brightness keep-alive disabled"),
            }
        }

        info!(level = self.target.level, "brightness override applied");
        Ok(())
    }

    /// The configuration to return to at the end of the session.
    ///
    /// A persisted snapshot still on disk means an earlier restore never
    /// landed and the display still holds our override, so it is reused
    /// rather than replaced by the current (dimmed) value.
    fn take_snapshot(&self) -> Result<BrightnessSnapshot, BrightnessError> {
        match self.snapshots.load() {
            Ok(Some(pending)) => {
                info!(
                    level = pending.original_level,
                    mode = ?pending.original_mode,
                    "reusing brightness snapshot from an unfinished restore"
                );
                return Ok(pending);
            }
            Ok(None) => {}
            Err(e) => warn!("failed to load persisted brightness snapshot: {e}"),
        }

        let current = self
            .display
            .read_brightness()
            .map_err(BrightnessError::ReadFailed)?;
        let snapshot = BrightnessSnapshot::capture(current);
        if let Err(e) = self.snapshots.save(&snapshot) {
            warn!("failed to persist brightness snapshot: {e}");
        }
        debug!(level = current.level, mode = ?current.mode, "brightness snapshot taken");
        Ok(snapshot)
    }

    /// Stop the keep-alive loop and write the snapshot back.
    ///
    /// No-op without a snapshot. Never writes a default value.
    pub fn restore(&mut self) -> TeardownReport {
        let mut report = TeardownReport::new();

        if let Some(keep_alive) = self.keep_alive.take() {
            keep_alive.cancel();
        }

        let Some(snapshot) = self.snapshot.take() else {
            return report;
        };

        match self.display.write_brightness(snapshot.original()) {
            Ok(()) => {
                if let Err(e) = self.snapshots.clear() {
                    report.push(TeardownFailure::Snapshot(e));
                }
                info!(
                    level = snapshot.original_level,
                    mode = ?snapshot.original_mode,
                    "brightness restored"
                );
            }
            // The persisted copy stays behind for `recover()`.
            Err(e) => report.push(TeardownFailure::Brightness(e)),
        }

        report
    }
}

impl Drop for BrightnessController {
    fn drop(&mut self) {
        if self.snapshot.is_some() {
            self.restore().log("brightness controller dropped while dimmed");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

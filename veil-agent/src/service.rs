//! Privacy agent core logic.
//!
//! Builds the simulated host from configuration, engages privacy mode,
//! holds it until stopped, then tears it down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use veil_core::host::memory::MemoryHost;
use veil_core::{DisplaySettings, JsonSnapshotStore, PrivacyController, StartError};

use crate::config::AgentConfig;

/// Connection id the agent holds privacy mode under.
const AGENT_CONN_ID: u64 = 1;

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Privacy mode was engaged and later released.
    Completed,
    /// `start()` failed; nothing on the display was modified.
    NotStarted(StartError),
}

// ── AgentService ─────────────────────────────────────────────────

/// The top-level privacy agent.
pub struct AgentService {
    config: AgentConfig,
    running: Arc<AtomicBool>,
}

impl AgentService {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the agent from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Build the simulated host described by `[simulation]` and `[snapshot]`.
    pub fn build_host(&self) -> MemoryHost {
        let sim = &self.config.simulation;
        let mem = MemoryHost::new()
            .with_bounds(self.config.display_bounds())
            .with_snapshots(Arc::new(JsonSnapshotStore::new(&self.config.snapshot.path)));

        mem.capability.set_granted(sim.overlay_granted);
        mem.display.set_writable(sim.write_granted);
        mem.display.set_level(self.config.initial_brightness());
        for layer in &sim.rejected_layers {
            mem.compositor.reject_layer(*layer);
        }
        mem
    }

    /// Run until stopped.
    ///
    /// 1. Builds the host and the controller (recovering any stale snapshot).
    /// 2. Engages privacy mode.
    /// 3. Waits for `running` to become `false`.
    /// 4. Releases privacy mode.
    pub async fn run(&self) -> RunOutcome {
        self.running.store(true, Ordering::SeqCst);

        let mem = self.build_host();
        let controller = PrivacyController::new(
            mem.host(self.config.device.clone()),
            self.config.to_privacy_config(),
        );

        if let Err(e) = controller.start(AGENT_CONN_ID) {
            error!("privacy mode not engaged: {e}");
            self.running.store(false, Ordering::SeqCst);
            return RunOutcome::NotStarted(e);
        }

        if let Some(spec) = controller.strategy() {
            info!(
                layer = %spec.layer,
                alpha = spec.surface_alpha,
                remote_visibility = spec.remote_visibility(),
                "privacy mode engaged"
            );
        }
        if !mem.display.can_write() {
            warn!("running with overlay only; grant display settings write access for full strength");
        }

        Self::wait_for_stop(&self.running).await;

        controller.stop(AGENT_CONN_ID);
        info!(
            brightness = mem.display.current().level,
            surfaces = mem.compositor.live_surfaces(),
            "privacy mode released"
        );
        RunOutcome::Completed
    }

    /// Signal the agent to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the agent is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Async helper: resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

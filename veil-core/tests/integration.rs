//! Integration tests: full privacy session lifecycle against the
//! in-memory host: strategy fallback, brightness round-trips,
//! exclusivity and crash recovery.

use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};
use veil_core::host::memory::{CompositorEvent, MemoryHost};
use veil_core::profile::strategy_table;
use veil_core::{
    BrightnessLevel, BrightnessMode, DeviceIdentity, JsonSnapshotStore, Notice, OverlayLayer,
    PrivacyConfig, PrivacyController, SessionPhase, SnapshotStore, StartError, VendorTag, resolve,
};

// ── Helpers ──────────────────────────────────────────────────────

const CONN: u64 = 1;

fn identity(manufacturer: &str) -> DeviceIdentity {
    DeviceIdentity::new(manufacturer, "", "")
}

/// Controller without a runtime: no keep-alive, fully synchronous.
fn sync_controller(mem: &MemoryHost, manufacturer: &str) -> PrivacyController {
    PrivacyController::with_runtime(
        mem.host(identity(manufacturer)),
        PrivacyConfig::default(),
        None,
    )
}

// ── Properties ───────────────────────────────────────────────────

#[test]
fn resolver_is_total() {
    let long = "x".repeat(4096);
    let samples = ["", " ", "genericcorp", "ÜNÏCÖDÉ", "Xiaomi", "sAmSuNg", long.as_str()];
    for manufacturer in samples {
        for brand in samples {
            for writable in [true, false] {
                let id = DeviceIdentity::new(manufacturer, brand, "");
                assert!(!resolve(&id, writable).is_empty());
            }
        }
    }
}

#[test]
fn fallback_exhaustion_retains_nothing() {
    let mem = MemoryHost::new();
    mem.compositor.reject_layer(OverlayLayer::AccessibilityOverlay);
    mem.compositor.reject_layer(OverlayLayer::ApplicationOverlay);
    let ctl = sync_controller(&mem, "genericcorp");

    match ctl.start(CONN) {
        Err(StartError::AllStrategiesExhausted { attempts }) => {
            assert_eq!(attempts.len(), strategy_table(VendorTag::Generic, true).len());
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert!(!ctl.is_active());
    assert_eq!(mem.compositor.live_surfaces(), 0);
    assert_eq!(mem.display.write_count(), 0);
    assert!(mem.foreground.active_labels().is_empty());
    assert!(mem.notifier.notices().contains(&Notice::StartFailed));
}

#[test]
fn at_most_one_strategy_is_active() {
    let mem = MemoryHost::new();
    let ctl = sync_controller(&mem, "Huawei");

    assert_ok!(ctl.start(CONN));
    let created = mem
        .compositor
        .events()
        .into_iter()
        .filter(|e| matches!(e, CompositorEvent::Created { .. }))
        .count();
    assert_eq!(created, 1);
    assert_eq!(mem.compositor.attached_surfaces().len(), 1);
}

#[test]
fn brightness_round_trip() {
    let mem = MemoryHost::new();
    let before = BrightnessLevel {
        level: 173,
        mode: BrightnessMode::Automatic,
    };
    mem.display.set_level(before);
    let ctl = sync_controller(&mem, "vivo");

    assert_ok!(ctl.start(CONN));
    assert_eq!(mem.display.current(), BrightnessLevel::manual(0));

    ctl.stop(CONN);
    assert_eq!(mem.display.current(), before);
}

#[test]
fn stop_when_inactive_is_a_no_op() {
    let mem = MemoryHost::new();
    let ctl = sync_controller(&mem, "genericcorp");

    ctl.stop(CONN);
    assert_eq!(mem.display.write_count(), 0);
    assert!(mem.compositor.events().is_empty());
    assert!(mem.notifier.notices().is_empty());

    assert_ok!(ctl.start(CONN));
    ctl.stop(CONN);
    let writes = mem.display.write_count();
    ctl.stop(CONN);
    assert_eq!(mem.display.write_count(), writes);
}

#[test]
fn second_start_is_a_no_op() {
    let mem = MemoryHost::new();
    let ctl = sync_controller(&mem, "genericcorp");

    assert_ok!(ctl.start(CONN));
    assert_ok!(ctl.start(CONN));

    assert_eq!(mem.compositor.live_surfaces(), 1);
    // One snapshot read, one override write.
    assert_eq!(mem.display.writes(), vec![BrightnessLevel::manual(0)]);
    assert_eq!(mem.foreground.active_labels().len(), 1);

    ctl.stop(CONN);
    assert_eq!(mem.display.current(), BrightnessLevel::manual(128));
}

#[test]
fn concurrent_starts_serialise() {
    let mem = MemoryHost::new();
    let ctl = sync_controller(&mem, "oppo");

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| ctl.start(CONN).unwrap());
        }
    });

    assert!(ctl.is_active());
    assert_eq!(mem.compositor.live_surfaces(), 1);
    assert_eq!(mem.display.write_count(), 1);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| ctl.stop(CONN));
        }
    });
    assert_eq!(ctl.phase(), SessionPhase::Inactive);
    assert_eq!(mem.compositor.live_surfaces(), 0);
}

// ── Scenarios ────────────────────────────────────────────────────

#[test]
fn scenario_a_generic_device_fully_granted() {
    let mem = MemoryHost::new();
    let ctl = sync_controller(&mem, "genericcorp");

    assert_ok!(ctl.start(CONN));
    assert!(ctl.is_active());

    let surfaces = mem.compositor.attached_surfaces();
    assert_eq!(surfaces.len(), 1);
    assert!(!surfaces[0].opaque);
    assert_eq!(
        surfaces[0].alpha,
        strategy_table(VendorTag::Generic, true)[0].surface_alpha
    );
    assert_eq!(mem.display.current().level, ctl.config().target_level);
}

#[test]
fn scenario_b_overlay_capability_denied() {
    let mem = MemoryHost::new();
    mem.capability.set_granted(false);
    let ctl = sync_controller(&mem, "genericcorp");

    let err = assert_err!(ctl.start(CONN));
    assert!(matches!(err, StartError::CapabilityMissing));
    assert!(!ctl.is_active());
    assert_eq!(mem.compositor.live_surfaces(), 0);
    assert_eq!(mem.capability.request_count(), 1);
    assert_eq!(mem.notifier.notices(), vec![Notice::OverlayPermissionRequired]);

    // Granted afterwards: the retry succeeds.
    mem.capability.set_granted(true);
    assert_ok!(ctl.start(CONN));
    assert!(ctl.is_active());
}

#[test]
fn scenario_c_first_vendor_strategy_rejected() {
    let mem = MemoryHost::new();
    let first = strategy_table(VendorTag::Xiaomi, true)[0];
    let second = strategy_table(VendorTag::Xiaomi, true)[1];
    mem.compositor.reject_layer(first.layer);
    let ctl = sync_controller(&mem, "Xiaomi");

    assert_ok!(ctl.start(CONN));
    assert_eq!(ctl.strategy(), Some(second));

    let events = mem.compositor.events();
    let rejections = events
        .iter()
        .filter(|e| matches!(e, CompositorEvent::AttachRejected { .. }))
        .count();
    let attaches = events
        .iter()
        .filter(|e| matches!(e, CompositorEvent::Attached { .. }))
        .count();
    assert_eq!((rejections, attaches), (1, 1));
    assert_eq!(mem.compositor.live_surfaces(), 1);
}

#[test]
fn scenario_d_write_capability_denied() {
    let mem = MemoryHost::new();
    mem.display.set_writable(false);
    let ctl = sync_controller(&mem, "genericcorp");

    assert_ok!(ctl.start(CONN));
    assert!(ctl.is_active());
    let overlay_only = strategy_table(VendorTag::Generic, false)[0];
    assert_eq!(ctl.strategy(), Some(overlay_only));
    assert!(overlay_only.surface_alpha > strategy_table(VendorTag::Generic, true)[0].surface_alpha);
    assert_eq!(mem.display.access_request_count(), 1);
    assert!(mem.notifier.notices().contains(&Notice::WriteSettingsPermissionRequired));

    ctl.stop(CONN);
    assert_eq!(mem.display.write_count(), 0);
    assert!(!ctl.is_active());
}

// ── Keep-alive & teardown ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn keep_alive_beats_os_revert_and_stops_with_session() {
    let mem = MemoryHost::new();
    let config = PrivacyConfig {
        keep_alive_interval: Duration::from_millis(250),
        ..PrivacyConfig::default()
    };
    let ctl = PrivacyController::new(mem.host(identity("samsung")), config);

    assert_ok!(ctl.start(CONN));
    for _ in 0..3 {
        mem.display.set_level(BrightnessLevel {
            level: 200,
            mode: BrightnessMode::Automatic,
        });
        tokio::time::sleep(Duration::from_millis(260)).await;
        assert_eq!(mem.display.current(), BrightnessLevel::manual(0));
    }

    ctl.stop(CONN);
    let writes = mem.display.write_count();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(mem.display.write_count(), writes);
    assert_eq!(mem.display.current(), BrightnessLevel::manual(128));
}

#[tokio::test(start_paused = true)]
async fn restarted_session_is_not_raced_by_old_keep_alive() {
    let mem = MemoryHost::new();
    let ctl = PrivacyController::new(mem.host(identity("genericcorp")), PrivacyConfig::default());

    assert_ok!(ctl.start(CONN));
    ctl.stop(CONN);
    mem.display.set_level(BrightnessLevel::manual(64));
    assert_ok!(ctl.start(CONN));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    ctl.stop(CONN);

    assert_eq!(mem.display.current(), BrightnessLevel::manual(64));
}

#[tokio::test(start_paused = true)]
async fn zero_keep_alive_interval_still_reasserts() {
    let mem = MemoryHost::new();
    let config = PrivacyConfig {
        keep_alive_interval: Duration::ZERO,
        ..PrivacyConfig::default()
    };
    let ctl = PrivacyController::new(mem.host(identity("genericcorp")), config);

    assert_ok!(ctl.start(CONN));
    mem.display.set_level(BrightnessLevel {
        level: 200,
        mode: BrightnessMode::Automatic,
    });
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(mem.display.current(), BrightnessLevel::manual(0));

    ctl.stop(CONN);
    assert_eq!(mem.display.current(), BrightnessLevel::manual(128));
}

#[test]
fn denied_restore_does_not_lose_original_brightness() {
    let mem = MemoryHost::new();
    let before = BrightnessLevel {
        level: 200,
        mode: BrightnessMode::Automatic,
    };
    mem.display.set_level(before);
    let ctl = sync_controller(&mem, "genericcorp");

    assert_ok!(ctl.start(CONN));
    mem.display.deny_writes(true);
    ctl.stop(CONN);
    assert_eq!(mem.display.current(), BrightnessLevel::manual(0));

    mem.display.deny_writes(false);
    assert_ok!(ctl.start(CONN));
    ctl.stop(CONN);
    assert_eq!(mem.display.current(), before);
    assert!(mem.snapshots.load().unwrap().is_none());
}

#[test]
fn only_the_owning_connection_can_release() {
    let mem = MemoryHost::new();
    let ctl = sync_controller(&mem, "genericcorp");

    assert_ok!(ctl.start(CONN));
    ctl.stop(CONN + 1);
    assert!(ctl.is_active());
    assert_eq!(ctl.owner(), Some(CONN));

    ctl.stop(CONN);
    assert!(!ctl.is_active());
    assert_eq!(ctl.owner(), None);
}

#[test]
fn surface_removal_failure_still_restores_brightness() {
    let mem = MemoryHost::new();
    let ctl = sync_controller(&mem, "genericcorp");

    assert_ok!(ctl.start(CONN));
    mem.compositor.fail_releases(true);
    ctl.stop(CONN);

    assert!(!ctl.is_active());
    assert_eq!(mem.display.current(), BrightnessLevel::manual(128));
}

#[test]
fn interrupted_session_is_rolled_back_on_next_launch() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonSnapshotStore::new(dir.path().join("brightness.json")));
    let mem = MemoryHost::new().with_snapshots(store.clone());
    mem.display.set_level(BrightnessLevel {
        level: 99,
        mode: BrightnessMode::Automatic,
    });

    let ctl = sync_controller(&mem, "genericcorp");
    assert_ok!(ctl.start(CONN));
    assert!(store.load().unwrap().is_some());
    // Simulated crash: no teardown runs.
    std::mem::forget(ctl);
    assert_eq!(mem.display.current(), BrightnessLevel::manual(0));

    let _relaunched = sync_controller(&mem, "genericcorp");
    assert_eq!(
        mem.display.current(),
        BrightnessLevel {
            level: 99,
            mode: BrightnessMode::Automatic
        }
    );
    assert!(store.load().unwrap().is_none());
}

//! Device profile resolution.
//!
//! Maps device identity strings to an ordered list of overlay
//! strategies. Compositors differ per vendor in which surface types
//! they silently drop or refuse, so each vendor tag carries its own
//! fallback order. Pure and table-driven: no I/O, no global state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::VeilError;

// ── DeviceIdentity ───────────────────────────────────────────────

/// Identity strings reported by the host build properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub brand: String,
    pub fingerprint: String,
}

impl DeviceIdentity {
    pub fn new(
        manufacturer: impl Into<String>,
        brand: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            brand: brand.into(),
            fingerprint: fingerprint.into(),
        }
    }

    fn fields(&self) -> [&str; 3] {
        [&self.manufacturer, &self.brand, &self.fingerprint]
    }
}

// ── VendorTag ────────────────────────────────────────────────────

/// Manufacturer class used as the lookup key into the strategy tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VendorTag {
    Generic,
    Xiaomi,
    Huawei,
    Oppo,
    Vivo,
    Samsung,
}

impl fmt::Display for VendorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Generic => "generic",
            Self::Xiaomi => "xiaomi",
            Self::Huawei => "huawei",
            Self::Oppo => "oppo",
            Self::Vivo => "vivo",
            Self::Samsung => "samsung",
        };
        f.write_str(name)
    }
}

/// Ordered matching table. First tag with any matching needle wins.
/// Needles are lower-case.
const VENDOR_NEEDLES: &[(VendorTag, &[&str])] = &[
    (VendorTag::Xiaomi, &["xiaomi", "redmi", "poco"]),
    (VendorTag::Huawei, &["huawei", "honor"]),
    (VendorTag::Oppo, &["oppo", "realme", "oneplus"]),
    (VendorTag::Vivo, &["vivo", "iqoo"]),
    (VendorTag::Samsung, &["samsung"]),
];

impl VendorTag {
    /// Classify a device. Unknown or empty identities are `Generic`.
    pub fn classify(identity: &DeviceIdentity) -> Self {
        let fields = identity.fields().map(str::to_ascii_lowercase);
        VENDOR_NEEDLES
            .iter()
            .find(|(_, needles)| {
                needles
                    .iter()
                    .any(|needle| fields.iter().any(|field| field.contains(needle)))
            })
            .map(|(tag, _)| *tag)
            .unwrap_or(VendorTag::Generic)
    }
}

// ── OverlayLayer ─────────────────────────────────────────────────

/// Compositor insertion type for the darkening surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayLayer {
    /// Inserted through the accessibility capability; stacks above
    /// every application window including system dialogs.
    AccessibilityOverlay,
    /// Regular "draw over other apps" surface.
    ApplicationOverlay,
    /// Legacy system alert surface, still honoured by some vendor builds.
    SystemAlert,
}

impl OverlayLayer {
    /// Relative z-order requested from the compositor; higher is on top.
    pub const fn insertion_priority(self) -> i32 {
        match self {
            Self::AccessibilityOverlay => 3,
            Self::ApplicationOverlay => 2,
            Self::SystemAlert => 1,
        }
    }
}

impl fmt::Display for OverlayLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AccessibilityOverlay => "accessibility-overlay",
            Self::ApplicationOverlay => "application-overlay",
            Self::SystemAlert => "system-alert",
        };
        f.write_str(name)
    }
}

// ── OverlaySpec ──────────────────────────────────────────────────

/// One candidate configuration for obscuring the local display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlaySpec {
    pub layer: OverlayLayer,
    pub insertion_priority: i32,
    /// 0 = fully transparent, 255 = fully dark.
    pub surface_alpha: u8,
    /// Opaque surfaces are not alpha-blended.
    pub opaque: bool,
    /// The surface is excluded from the remote capture path.
    pub local_only: bool,
}

impl OverlaySpec {
    pub const fn new(layer: OverlayLayer, surface_alpha: u8, opaque: bool, local_only: bool) -> Self {
        Self {
            layer,
            insertion_priority: layer.insertion_priority(),
            surface_alpha,
            opaque,
            local_only,
        }
    }

    /// Fraction of the original brightness the remote capture still sees.
    pub fn remote_visibility(&self) -> f32 {
        if self.local_only {
            1.0
        } else if self.opaque {
            0.0
        } else {
            f32::from(255 - self.surface_alpha) / 255.0
        }
    }

    /// Reject specs that would blind the remote operator.
    pub fn validate(&self) -> Result<(), VeilError> {
        if self.opaque && !self.local_only {
            return Err(VeilError::InvalidSpec(
                "opaque surfaces must be excluded from remote capture",
            ));
        }
        if !self.opaque && self.surface_alpha == 0 {
            return Err(VeilError::InvalidSpec("transparent surface obscures nothing"));
        }
        Ok(())
    }
}

// ── Strategy tables ──────────────────────────────────────────────
//
// Alphas are tuned empirically. The `_BACKLIT` tables assume the
// brightness override is in effect as well; `_OVERLAY_ONLY` tables
// compensate for a full backlight with a darker tint.

use OverlayLayer::{AccessibilityOverlay as A11y, ApplicationOverlay as App, SystemAlert as Alert};

const GENERIC_BACKLIT: &[OverlaySpec] = &[
    OverlaySpec::new(A11y, 160, false, false),
    OverlaySpec::new(App, 160, false, false),
];
const GENERIC_OVERLAY_ONLY: &[OverlaySpec] = &[
    OverlaySpec::new(A11y, 235, false, false),
    OverlaySpec::new(App, 235, false, false),
];

// MIUI drops accessibility overlays from non-system packages on some
// builds without reporting an error, so the app overlay goes first.
const XIAOMI_BACKLIT: &[OverlaySpec] = &[
    OverlaySpec::new(App, 180, false, false),
    OverlaySpec::new(A11y, 180, false, false),
    OverlaySpec::new(Alert, 200, false, false),
];
const XIAOMI_OVERLAY_ONLY: &[OverlaySpec] = &[
    OverlaySpec::new(App, 240, false, false),
    OverlaySpec::new(A11y, 240, false, false),
    OverlaySpec::new(Alert, 245, false, false),
];

const HUAWEI_BACKLIT: &[OverlaySpec] = &[
    OverlaySpec::new(A11y, 170, false, false),
    OverlaySpec::new(Alert, 190, false, false),
    OverlaySpec::new(App, 190, false, false),
];
const HUAWEI_OVERLAY_ONLY: &[OverlaySpec] = &[
    OverlaySpec::new(A11y, 240, false, false),
    OverlaySpec::new(Alert, 245, false, false),
    OverlaySpec::new(App, 245, false, false),
];

// ColorOS ignores the backlight hint on app overlays.
const OPPO_BACKLIT: &[OverlaySpec] = &[
    OverlaySpec::new(A11y, 190, false, false),
    OverlaySpec::new(App, 220, false, false),
];
const OPPO_OVERLAY_ONLY: &[OverlaySpec] = &[
    OverlaySpec::new(A11y, 245, false, false),
    OverlaySpec::new(App, 248, false, false),
];

const VIVO_BACKLIT: &[OverlaySpec] = &[
    OverlaySpec::new(A11y, 180, false, false),
    OverlaySpec::new(App, 200, false, false),
    OverlaySpec::new(Alert, 200, false, false),
];
const VIVO_OVERLAY_ONLY: &[OverlaySpec] = &[
    OverlaySpec::new(A11y, 240, false, false),
    OverlaySpec::new(App, 245, false, false),
    OverlaySpec::new(Alert, 245, false, false),
];

// One UI keeps accessibility overlays out of the projection, so an
// opaque local-only surface is possible there.
const SAMSUNG_BACKLIT: &[OverlaySpec] = &[
    OverlaySpec::new(A11y, 255, true, true),
    OverlaySpec::new(App, 170, false, false),
];
const SAMSUNG_OVERLAY_ONLY: &[OverlaySpec] = &[
    OverlaySpec::new(A11y, 255, true, true),
    OverlaySpec::new(App, 240, false, false),
];

/// The strategy table for a vendor tag.
pub fn strategy_table(tag: VendorTag, brightness_writable: bool) -> &'static [OverlaySpec] {
    match (tag, brightness_writable) {
        (VendorTag::Generic, true) => GENERIC_BACKLIT,
        (VendorTag::Generic, false) => GENERIC_OVERLAY_ONLY,
        (VendorTag::Xiaomi, true) => XIAOMI_BACKLIT,
        (VendorTag::Xiaomi, false) => XIAOMI_OVERLAY_ONLY,
        (VendorTag::Huawei, true) => HUAWEI_BACKLIT,
        (VendorTag::Huawei, false) => HUAWEI_OVERLAY_ONLY,
        (VendorTag::Oppo, true) => OPPO_BACKLIT,
        (VendorTag::Oppo, false) => OPPO_OVERLAY_ONLY,
        (VendorTag::Vivo, true) => VIVO_BACKLIT,
        (VendorTag::Vivo, false) => VIVO_OVERLAY_ONLY,
        (VendorTag::Samsung, true) => SAMSUNG_BACKLIT,
        (VendorTag::Samsung, false) => SAMSUNG_OVERLAY_ONLY,
    }
}

/// Resolve the ordered candidate list for a device, highest priority first.
///
/// Total: every identity, including empty strings, yields a non-empty list.
pub fn resolve(identity: &DeviceIdentity, brightness_writable: bool) -> Vec<OverlaySpec> {
    strategy_table(VendorTag::classify(identity), brightness_writable).to_vec()
}

// ── Tests ────────────────────────────────────────────────────────

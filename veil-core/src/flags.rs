use bitflags::bitflags;

bitflags! {
    /// Window flags requested for a darkening surface.
    ///
    /// No flag here may hide the content beneath the surface from capture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SurfaceFlags: u32 {
        /// Never takes input focus.
        const NOT_FOCUSABLE    = 1 << 0;
        /// Touches pass through to the windows below.
        const NOT_TOUCHABLE    = 1 << 1;
        /// May extend past the physical display bounds.
        const LAYOUT_NO_LIMITS = 1 << 2;
        /// Positioned in screen coordinates, ignoring decor insets.
        const LAYOUT_IN_SCREEN = 1 << 3;
        /// Hides status and navigation bars while shown.
        const FULLSCREEN       = 1 << 4;
        /// Extends into display cutout areas.
        const COVER_CUTOUTS    = 1 << 5;
        /// Excluded from the remote capture path.
        const LOCAL_ONLY       = 1 << 6;
    }
}

impl SurfaceFlags {
    /// Flags every darkening surface carries regardless of strategy.
    pub const BASE: Self = Self::NOT_FOCUSABLE
        .union(Self::NOT_TOUCHABLE)
        .union(Self::LAYOUT_NO_LIMITS)
        .union(Self::LAYOUT_IN_SCREEN)
        .union(Self::FULLSCREEN)
        .union(Self::COVER_CUTOUTS);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_flags_pass_input_through() {
        assert!(SurfaceFlags::BASE.contains(SurfaceFlags::NOT_TOUCHABLE | SurfaceFlags::NOT_FOCUSABLE));
        assert!(!SurfaceFlags::BASE.contains(SurfaceFlags::LOCAL_ONLY));
    }
}

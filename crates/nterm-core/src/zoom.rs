//! Zoom scale bounds
//!
//! A screen's zoom factor is clamped to the same range everywhere it can be
//! set: option parsing, factory requests, and parent-screen inheritance.

/// Smallest accepted zoom factor.
pub const ZOOM_MIN: f64 = 0.25;

/// Largest accepted zoom factor.
pub const ZOOM_MAX: f64 = 4.0;

/// Clamp a requested zoom factor into the supported range.
///
/// Returns the clamped value and whether clamping occurred, so callers can
/// warn without failing.
pub fn clamp_zoom(zoom: f64) -> (f64, bool) {
    if zoom < ZOOM_MIN {
        (ZOOM_MIN, true)
    } else if zoom > ZOOM_MAX {
        (ZOOM_MAX, true)
    } else {
        (zoom, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_untouched() {
        assert_eq!(clamp_zoom(1.0), (1.0, false));
        assert_eq!(clamp_zoom(ZOOM_MIN), (ZOOM_MIN, false));
        assert_eq!(clamp_zoom(ZOOM_MAX), (ZOOM_MAX, false));
    }

    #[test]
    fn test_below_minimum_clamps_up() {
        assert_eq!(clamp_zoom(0.05), (ZOOM_MIN, true));
    }

    #[test]
    fn test_above_maximum_clamps_down() {
        assert_eq!(clamp_zoom(50.0), (ZOOM_MAX, true));
    }
}

//! Volume scaling helpers for presentation layers.
//!
//! Most installations never turn the appliance past a fraction of its
//! range, so front-ends expose a percentage of a configured maximum
//! rather than raw device units.

use crate::types::MAX_VOLUME;

/// Convert a device volume into a percentage of `max_volume`.
///
/// The result is rounded and clamped to `0..=100`. A `max_volume` of zero
/// reports 0.
///
/// # Example
///
/// ```
/// use atelier_core::relative_volume;
///
/// assert_eq!(relative_volume(30, 60), 50);
/// assert_eq!(relative_volume(60, 60), 100);
/// assert_eq!(relative_volume(90, 60), 100);
/// ```
pub fn relative_volume(volume: u8, max_volume: u8) -> u8 {
    if max_volume == 0 {
        return 0;
    }
    let pct = (f64::from(volume) / f64::from(max_volume) * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Convert a percentage of `max_volume` back into device units.
///
/// The result is rounded and clamped to the appliance range `0..=100`, so
/// it is always a valid volume target.
///
/// # Example
///
/// ```
/// use atelier_core::absolute_volume;
///
/// assert_eq!(absolute_volume(50, 60), 30);
/// assert_eq!(absolute_volume(100, 60), 60);
/// assert_eq!(absolute_volume(150, 100), 100);
/// ```
pub fn absolute_volume(percent: u8, max_volume: u8) -> u8 {
    let max = max_volume.min(MAX_VOLUME);
    let abs = (f64::from(max) / 100.0 * f64::from(percent)).round();
    abs.clamp(0.0, f64::from(MAX_VOLUME)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_volume_scales() {
        assert_eq!(relative_volume(0, 60), 0);
        assert_eq!(relative_volume(15, 60), 25);
        assert_eq!(relative_volume(40, 100), 40);
    }

    #[test]
    fn relative_volume_rounds() {
        // 20 / 60 = 33.33%
        assert_eq!(relative_volume(20, 60), 33);
        // 1 / 60 = 1.67%
        assert_eq!(relative_volume(1, 60), 2);
    }

    #[test]
    fn relative_volume_zero_max() {
        assert_eq!(relative_volume(10, 0), 0);
    }

    #[test]
    fn absolute_volume_scales() {
        assert_eq!(absolute_volume(0, 60), 0);
        assert_eq!(absolute_volume(25, 60), 15);
        assert_eq!(absolute_volume(33, 60), 20);
    }

    #[test]
    fn absolute_volume_never_exceeds_device_range() {
        assert_eq!(absolute_volume(100, 200), 100);
        assert_eq!(absolute_volume(255, 100), 100);
    }
}

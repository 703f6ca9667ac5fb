//! Video adapter: frame-rate gating and dimension clamping for frames the
//! host hands in, matching SPEC_FULL.md §4.9. Pure, synchronous logic, kept
//! separate from the async send path the way the teacher keeps `h264.rs`'s
//! pure helpers (`h264_contains_idr`) apart from its async send loops.

const MAX_SEND_FPS: u32 = 32;
const MIN_DIMENSION: u32 = 360;
const MAX_DIMENSION: u32 = 720;

/// Decide whether a frame arriving `elapsed_since_last_ms` after the last
/// sent frame should be dropped to respect the 32fps ceiling.
pub fn should_drop_frame(elapsed_since_last_ms: u64) -> bool {
    let min_interval_ms = 1000 / u64::from(MAX_SEND_FPS);
    elapsed_since_last_ms < min_interval_ms
}

/// Clamp (width, height) so the shorter axis is at least 360px and the
/// longer axis is at most 720px, rounding both up to the nearest even
/// number (required by most video encoders' chroma subsampling).
pub fn clamp_dimensions(width: u32, height: u32) -> (u32, u32) {
    let (shorter, longer) = if width <= height { (width, height) } else { (height, width) };

    let scale_up = if shorter < MIN_DIMENSION {
        f64::from(MIN_DIMENSION) / f64::from(shorter.max(1))
    } else {
        1.0
    };
    let scaled_longer = (f64::from(longer) * scale_up).round() as u32;

    let scale_down = if scaled_longer > MAX_DIMENSION {
        f64::from(MAX_DIMENSION) / f64::from(scaled_longer)
    } else {
        1.0
    };

    let final_shorter = round_up_even((f64::from(shorter) * scale_up * scale_down).round() as u32);
    let final_longer = round_up_even((f64::from(longer) * scale_up * scale_down).round() as u32);

    if width <= height {
        (final_shorter, final_longer)
    } else {
        (final_longer, final_shorter)
    }
}

fn round_up_even(value: u32) -> u32 {
    if value % 2 == 0 {
        value
    } else {
        value + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_faster_than_32fps_are_dropped() {
        assert!(should_drop_frame(10));
    }

    #[test]
    fn frames_at_32fps_are_kept() {
        assert!(!should_drop_frame(1000 / 32));
    }

    #[test]
    fn frames_slower_than_32fps_are_kept() {
        assert!(!should_drop_frame(100));
    }

    #[test]
    fn upscales_when_shorter_axis_below_360() {
        let (w, h) = clamp_dimensions(180, 320);
        assert!(w.min(h) >= MIN_DIMENSION);
    }

    #[test]
    fn downscales_when_longer_axis_above_720() {
        let (w, h) = clamp_dimensions(1080, 1920);
        assert!(w.max(h) <= MAX_DIMENSION);
    }

    #[test]
    fn dimensions_already_in_range_are_even_and_stable() {
        let (w, h) = clamp_dimensions(480, 640);
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
    }

    #[test]
    fn clamped_dimensions_are_always_even() {
        let (w, h) = clamp_dimensions(361, 721);
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
    }
}

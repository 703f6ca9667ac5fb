//! Aspect ratio policy, matching `Policy.cpp::checkAspectRatio`. Pure
//! integer cross-multiplication, no floating point, to avoid boundary
//! rounding surprises at the exact ratio limits.

use caffeine_protocol::CaffeineError;

const MAX_ASPECT_WIDTH: i64 = 3;
const MAX_ASPECT_HEIGHT: i64 = 1;
const MIN_ASPECT_WIDTH: i64 = 1;
const MIN_ASPECT_HEIGHT: i64 = 3;

fn is_ratio_greater(w1: i64, h1: i64, w2: i64, h2: i64) -> bool {
    w1 * h2 > w2 * h1
}

fn is_ratio_less(w1: i64, h1: i64, w2: i64, h2: i64) -> bool {
    w1 * h2 < w2 * h1
}

/// Reject frame dimensions outside the allowed aspect ratio band
/// (narrower than 1:3, wider than 3:1).
pub fn check_aspect_ratio(width: i32, height: i32) -> Result<(), CaffeineError> {
    let (width, height) = (width as i64, height as i64);
    if is_ratio_greater(width, height, MAX_ASPECT_WIDTH, MAX_ASPECT_HEIGHT) {
        Err(CaffeineError::AspectTooWide {
            max_aspect_width: MAX_ASPECT_WIDTH,
            max_aspect_height: MAX_ASPECT_HEIGHT,
        })
    } else if is_ratio_less(width, height, MIN_ASPECT_WIDTH, MIN_ASPECT_HEIGHT) {
        Err(CaffeineError::AspectTooNarrow {
            min_aspect_width: MIN_ASPECT_WIDTH,
            min_aspect_height: MIN_ASPECT_HEIGHT,
        })
    } else {
        Ok(())
    }
}

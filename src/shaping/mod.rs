//! Analog signal shaping
//!
//! Pure functions turning raw physical axis positions into virtual axis
//! values. Inputs are expected in [-1, 1]. A NaN input is a caller bug: debug
//! builds panic on it, release builds treat it as the centred value.

pub mod curve;

pub use curve::{remap_curve, Curve, CurveError, STEERING_CURVE};

/// Backward pedal travel past this point overrides the forward pedal
pub const PEDAL_PRIORITY_THRESHOLD: f64 = 0.25;

fn sanitize(value: f64) -> f64 {
    debug_assert!(!value.is_nan(), "axis value must not be NaN");
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Linear interpolation along the segment `(x0, y0)`-`(x1, y1)`
fn along(x: f64, x0: f64, y0: f64, x1: f64, y1: f64) -> f64 {
    let span = x1 - x0;
    if span <= 0.0 {
        return y0;
    }
    y0 + (x - x0) / span * (y1 - y0)
}

/// Maps [-1, 1] onto [0, 1]
pub fn scale_unit(value: f64) -> f64 {
    (sanitize(value) + 1.0) / 2.0
}

pub fn invert(value: f64) -> f64 {
    -sanitize(value)
}

/// Piecewise-linear remap through `(-1, -1)`, `(low_in, low_out)`,
/// `(high_in, high_out)` and `(1, 1)`.
///
/// Inputs between `low_in` and `high_in` form the neutral band; with
/// `low_out == high_out` the band is flat.
pub fn deadzone(value: f64, low_in: f64, low_out: f64, high_in: f64, high_out: f64) -> f64 {
    debug_assert!(low_in <= high_in, "deadzone band is inverted");
    let v = sanitize(value);

    let shaped = if v < low_in {
        along(v, -1.0, -1.0, low_in, low_out)
    } else if v <= high_in {
        along(v, low_in, low_out, high_in, high_out)
    } else {
        along(v, high_in, high_out, 1.0, 1.0)
    };
    shaped.clamp(-1.0, 1.0)
}

/// Combines a forward lever and a backward lever into one signed throttle.
///
/// A full backward press always reaches -1 whatever the forward position;
/// partial backward presses scale with the forward magnitude.
pub fn blend_throttle(forward: f64, backward: f64) -> f64 {
    let f = scale_unit(forward);
    let b = -scale_unit(backward);
    let b_scaled = b * (1.0 + f);
    (f + b_scaled).clamp(-1.0, 1.0)
}

/// Two-pedal throttle where a clearly pressed back pedal wins outright
///
/// Past the priority threshold backward beats forward, then forward beats
/// idle; near-idle noise from both pedals is summed.
pub fn dual_pedal_blend(back_pedal: f64, fwd_pedal: f64) -> f64 {
    let back = -scale_unit(back_pedal);
    let forward = scale_unit(fwd_pedal);

    if back < -PEDAL_PRIORITY_THRESHOLD {
        back
    } else if forward > PEDAL_PRIORITY_THRESHOLD {
        forward
    } else {
        back + forward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_scale_unit_boundaries() {
        assert_eq!(scale_unit(-1.0), 0.0);
        assert_eq!(scale_unit(0.0), 0.5);
        assert_eq!(scale_unit(1.0), 1.0);
    }

    #[test]
    fn test_scale_unit_monotonic() {
        let mut previous = scale_unit(-1.0);
        for step in 1..=200 {
            let value = -1.0 + step as f64 * 0.01;
            let scaled = scale_unit(value);
            assert!(scaled >= previous, "not monotonic at {}", value);
            previous = scaled;
        }
    }

    #[test]
    fn test_blend_throttle_fixed_points() {
        assert_eq!(blend_throttle(-1.0, -1.0), 0.0);
        assert_eq!(blend_throttle(1.0, -1.0), 1.0);
        assert_eq!(blend_throttle(-1.0, 1.0), -1.0);
        assert_eq!(blend_throttle(1.0, 1.0), -1.0);
        assert_eq!(blend_throttle(1.0, 0.0), 0.0);
        assert!(blend_throttle(0.0, -0.333).abs() <= 0.001);
    }

    #[test]
    fn test_blend_throttle_stays_in_range() {
        for f in 0..=40 {
            for b in 0..=40 {
                let forward = -1.0 + f as f64 * 0.05;
                let backward = -1.0 + b as f64 * 0.05;
                let out = blend_throttle(forward, backward);
                assert!(
                    (-1.0..=1.0).contains(&out),
                    "blend_throttle({}, {}) = {}",
                    forward,
                    backward,
                    out
                );
            }
        }
    }

    #[test]
    fn test_deadzone_flat_band() {
        // Centre detent from -0.1 to 0.1
        assert_eq!(deadzone(0.0, -0.1, 0.0, 0.1, 0.0), 0.0);
        assert_eq!(deadzone(0.05, -0.1, 0.0, 0.1, 0.0), 0.0);
        assert_eq!(deadzone(-0.1, -0.1, 0.0, 0.1, 0.0), 0.0);
        assert_eq!(deadzone(1.0, -0.1, 0.0, 0.1, 0.0), 1.0);
        assert_eq!(deadzone(-1.0, -0.1, 0.0, 0.1, 0.0), -1.0);
        assert!((deadzone(0.55, -0.1, 0.0, 0.1, 0.0) - 0.5).abs() < EPSILON);
        assert!((deadzone(-0.55, -0.1, 0.0, 0.1, 0.0) + 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_deadzone_lever_idle_zone() {
        // Lever bottom 10% is idle, the rest ramps 0..1
        assert_eq!(deadzone(-1.0, -1.0, 0.0, -0.8, 0.0), 0.0);
        assert_eq!(deadzone(-0.9, -1.0, 0.0, -0.8, 0.0), 0.0);
        assert!((deadzone(0.1, -1.0, 0.0, -0.8, 0.0) - 0.5).abs() < EPSILON);
        assert_eq!(deadzone(1.0, -1.0, 0.0, -0.8, 0.0), 1.0);
    }

    #[test]
    fn test_deadzone_is_idempotent_on_identity_band() {
        for step in 0..=20 {
            let v = -1.0 + step as f64 * 0.1;
            assert!((deadzone(v, -0.5, -0.5, 0.5, 0.5) - v).abs() < EPSILON);
        }
    }

    #[test]
    fn test_dual_pedal_back_pedal_wins() {
        assert_eq!(dual_pedal_blend(1.0, 1.0), -1.0);
        assert_eq!(dual_pedal_blend(0.0, 1.0), -0.5);
    }

    #[test]
    fn test_dual_pedal_forward_beats_idle() {
        assert_eq!(dual_pedal_blend(-1.0, 1.0), 1.0);
        assert_eq!(dual_pedal_blend(-1.0, 0.0), 0.5);
    }

    #[test]
    fn test_dual_pedal_sums_near_idle() {
        assert_eq!(dual_pedal_blend(-1.0, -1.0), 0.0);
        // back = -0.2, forward = 0.1
        assert!((dual_pedal_blend(-0.6, -0.8) - -0.1).abs() < EPSILON);
    }

    #[test]
    fn test_dual_pedal_differs_from_blend_throttle() {
        // Half back pedal with the forward pedal floored: the pedal rule
        // reverses, the lever blend cancels out.
        assert_eq!(dual_pedal_blend(0.0, 1.0), -0.5);
        assert_eq!(blend_throttle(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_out_of_range_inputs_clamp() {
        assert_eq!(scale_unit(3.0), 1.0);
        assert_eq!(scale_unit(-7.5), 0.0);
        assert_eq!(invert(2.0), -1.0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "NaN")]
    fn test_nan_input_panics_in_debug() {
        scale_unit(f64::NAN);
    }
}

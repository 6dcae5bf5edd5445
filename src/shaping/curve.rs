//! Monotone piecewise-cubic response curves
//!
//! Used where a linear axis is too twitchy around centre, e.g. SRV steering.
//! Tangents follow Fritsch–Carlson so the curve never overshoots between
//! control points and passes exactly through each of them.

use thiserror::Error;

/// Soft-centre steering table, symmetric about the origin
pub const STEERING_CURVE: [(f64, f64); 5] = [
    (-1.0, -1.0),
    (-0.5, -0.25),
    (0.0, 0.0),
    (0.5, 0.25),
    (1.0, 1.0),
];

#[derive(Debug, Error, PartialEq)]
pub enum CurveError {
    #[error("a curve needs at least two control points, got {0}")]
    TooFewPoints(usize),

    #[error("control point {0} is not finite")]
    NonFinite(usize),

    #[error("control point inputs must strictly increase (point {0})")]
    NotIncreasing(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    xs: Vec<f64>,
    ys: Vec<f64>,
    tangents: Vec<f64>,
}

impl Curve {
    pub fn new(points: &[(f64, f64)]) -> Result<Self, CurveError> {
        if points.len() < 2 {
            return Err(CurveError::TooFewPoints(points.len()));
        }
        for (i, (x, y)) in points.iter().enumerate() {
            if !x.is_finite() || !y.is_finite() {
                return Err(CurveError::NonFinite(i));
            }
            if i > 0 && *x <= points[i - 1].0 {
                return Err(CurveError::NotIncreasing(i));
            }
        }

        let xs: Vec<f64> = points.iter().map(|(x, _)| *x).collect();
        let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
        let tangents = fritsch_carlson_tangents(&xs, &ys);

        Ok(Self { xs, ys, tangents })
    }

    /// Evaluates the curve; inputs beyond the table hold the end values
    pub fn eval(&self, x: f64) -> f64 {
        debug_assert!(!x.is_nan(), "curve input must not be NaN");
        let x = if x.is_nan() { 0.0 } else { x };
        let last = self.xs.len() - 1;
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[last] {
            return self.ys[last];
        }

        let k = self
            .xs
            .partition_point(|&p| p <= x)
            .saturating_sub(1)
            .min(last - 1);
        let h = self.xs[k + 1] - self.xs[k];
        let t = (x - self.xs[k]) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * self.ys[k]
            + h10 * h * self.tangents[k]
            + h01 * self.ys[k + 1]
            + h11 * h * self.tangents[k + 1]
    }

    pub fn into_fn(self) -> impl Fn(f64) -> f64 + Send + Sync + 'static {
        move |x| self.eval(x)
    }
}

/// Builds an interpolating response function through `points`
pub fn remap_curve(
    points: &[(f64, f64)],
) -> Result<impl Fn(f64) -> f64 + Send + Sync + 'static, CurveError> {
    Ok(Curve::new(points)?.into_fn())
}

fn fritsch_carlson_tangents(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let secants: Vec<f64> = (0..n - 1)
        .map(|k| (ys[k + 1] - ys[k]) / (xs[k + 1] - xs[k]))
        .collect();

    let mut tangents = vec![0.0; n];
    tangents[0] = secants[0];
    tangents[n - 1] = secants[n - 2];
    for k in 1..n - 1 {
        let (left, right) = (secants[k - 1], secants[k]);
        tangents[k] = if left * right <= 0.0 {
            0.0
        } else {
            (left + right) / 2.0
        };
    }

    for k in 0..n - 1 {
        let secant = secants[k];
        if secant == 0.0 {
            tangents[k] = 0.0;
            tangents[k + 1] = 0.0;
            continue;
        }
        let alpha = tangents[k] / secant;
        let beta = tangents[k + 1] / secant;
        let radius = alpha * alpha + beta * beta;
        if radius > 9.0 {
            let tau = 3.0 / radius.sqrt();
            tangents[k] = tau * alpha * secant;
            tangents[k + 1] = tau * beta * secant;
        }
    }

    tangents
}

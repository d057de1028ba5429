//! Monotone cubic Hermite interpolation (Fritsch–Carlson).
//!
//! The interpolant passes through every sample and never overshoots between
//! two consecutive samples: a run of non-decreasing samples yields a
//! non-decreasing curve, a plateau stays flat.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplineError {
    #[error("cannot interpolate without samples")]
    Empty,
    #[error("duplicate sample at x = {0}")]
    DuplicateX(f64),
    #[error("sample ({x}, {y}) is not finite")]
    NonFinite { x: f64, y: f64 },
}

#[derive(Debug, Clone)]
pub struct MonotoneSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    c1s: Vec<f64>,
    c2s: Vec<f64>,
    c3s: Vec<f64>,
}

impl MonotoneSpline {
    /// Builds the interpolant. Samples are sorted by `x`; at least one is
    /// required and no two may share an `x`.
    pub fn new(samples: impl IntoIterator<Item = (f64, f64)>) -> Result<Self, SplineError> {
        let mut samples: Vec<(f64, f64)> = samples.into_iter().collect();
        if samples.is_empty() {
            return Err(SplineError::Empty);
        }
        if let Some(&(x, y)) = samples
            .iter()
            .find(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(SplineError::NonFinite { x, y });
        }
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        if let Some(pair) = samples.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(SplineError::DuplicateX(pair[0].0));
        }

        let (xs, ys): (Vec<f64>, Vec<f64>) = samples.into_iter().unzip();
        let (c1s, c2s, c3s) = coefficients(&xs, &ys);
        Ok(Self {
            xs,
            ys,
            c1s,
            c2s,
            c3s,
        })
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Smallest and largest sample `x`.
    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    /// Interpolated value at `x`. Queries outside the sampled range take the
    /// value of the nearest end sample. A NaN query yields NaN.
    pub fn evaluate(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let last = self.xs.len() - 1;
        if x == self.xs[last] {
            return self.ys[last];
        }
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x > self.xs[last] {
            return self.ys[last];
        }

        match self.xs.binary_search_by(|probe| probe.total_cmp(&x)) {
            Ok(index) => self.ys[index],
            Err(insert_at) => {
                let segment = insert_at - 1;
                let diff = x - self.xs[segment];
                self.ys[segment]
                    + self.c1s[segment] * diff
                    + self.c2s[segment] * diff * diff
                    + self.c3s[segment] * diff * diff * diff
            }
        }
    }
}

/// Tangents (`c1`) per knot and the quadratic/cubic terms per segment.
fn coefficients(xs: &[f64], ys: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    if xs.len() < 2 {
        return (vec![0.0; xs.len()], Vec::new(), Vec::new());
    }

    let dxs: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let secants: Vec<f64> = ys
        .windows(2)
        .zip(&dxs)
        .map(|(w, dx)| (w[1] - w[0]) / dx)
        .collect();

    let mut c1s = Vec::with_capacity(xs.len());
    c1s.push(secants[0]);
    for i in 1..secants.len() {
        let (m_prev, m_next) = (secants[i - 1], secants[i]);
        if m_prev * m_next <= 0.0 {
            // local extremum or plateau edge
            c1s.push(0.0);
        } else {
            let (h_prev, h_next) = (dxs[i - 1], dxs[i]);
            let common = h_prev + h_next;
            c1s.push(3.0 * common / ((common + h_next) / m_prev + (common + h_prev) / m_next));
        }
    }
    c1s.push(secants[secants.len() - 1]);

    let mut c2s = Vec::with_capacity(secants.len());
    let mut c3s = Vec::with_capacity(secants.len());
    for (i, (&secant, &dx)) in secants.iter().zip(&dxs).enumerate() {
        let inv_dx = 1.0 / dx;
        let common = c1s[i] + c1s[i + 1] - 2.0 * secant;
        c2s.push((secant - c1s[i] - common) * inv_dx);
        c3s.push(common * inv_dx * inv_dx);
    }

    (c1s, c2s, c3s)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

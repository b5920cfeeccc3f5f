//! Singularity-robust pseudo-inverse strategies.
//!
//! The Jacobian pseudo-inverse is computed behind the
//! [`PseudoInverseStrategy`] trait so the inversion policy is swappable:
//! damped least squares for production, truncated SVD as an alternative,
//! and deterministic stand-ins in tests.

use nalgebra::DMatrix;

/// Conditioning of the configuration at inversion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InversionQuality {
    /// All singular values were inverted directly.
    WellConditioned,
    /// At least one singular value fell below the strategy's threshold;
    /// the result is bounded but degraded.
    NearSingular,
}

impl InversionQuality {
    /// True when the inversion was degraded.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::NearSingular)
    }
}

/// Computes a (pseudo-)inverse of the geometric Jacobian.
///
/// `out` is resized to `jacobian.ncols() x jacobian.nrows()` and receives
/// the result; the returned [`InversionQuality`] reports whether the
/// configuration was near singular.
pub trait PseudoInverseStrategy: Send {
    fn invert(&self, jacobian: &DMatrix<f64>, out: &mut DMatrix<f64>) -> InversionQuality;
}

// ---------------------------------------------------------------------------
// DampedLeastSquares
// ---------------------------------------------------------------------------

/// Damped least-squares pseudo-inverse.
///
/// Singular values above `singular_threshold` are inverted directly;
/// values below it are damped as `σ / (σ² + λ²)`, which bounds the output
/// near singular configurations instead of letting `1/σ` blow up.
#[derive(Debug, Clone)]
pub struct DampedLeastSquares {
    /// Damping factor λ applied to small singular values.
    pub damping: f64,
    /// Singular values below this are damped rather than inverted.
    pub singular_threshold: f64,
}

impl Default for DampedLeastSquares {
    fn default() -> Self {
        Self {
            damping: 0.01,
            singular_threshold: 0.01,
        }
    }
}

impl PseudoInverseStrategy for DampedLeastSquares {
    fn invert(&self, jacobian: &DMatrix<f64>, out: &mut DMatrix<f64>) -> InversionQuality {
        svd_pseudo_inverse(jacobian, out, |sigma| {
            if sigma >= self.singular_threshold {
                1.0 / sigma
            } else {
                sigma / (sigma * sigma + self.damping * self.damping)
            }
        }, self.singular_threshold)
    }
}

// ---------------------------------------------------------------------------
// TruncatedSvd
// ---------------------------------------------------------------------------

/// Truncated-SVD pseudo-inverse.
///
/// Singular values below `threshold` are zeroed: motion components along
/// nearly-lost directions are discarded entirely.
#[derive(Debug, Clone)]
pub struct TruncatedSvd {
    /// Singular values below this contribute nothing to the inverse.
    pub threshold: f64,
}

impl Default for TruncatedSvd {
    fn default() -> Self {
        Self { threshold: 0.01 }
    }
}

impl PseudoInverseStrategy for TruncatedSvd {
    fn invert(&self, jacobian: &DMatrix<f64>, out: &mut DMatrix<f64>) -> InversionQuality {
        svd_pseudo_inverse(jacobian, out, |sigma| {
            if sigma >= self.threshold {
                1.0 / sigma
            } else {
                0.0
            }
        }, self.threshold)
    }
}

// ---------------------------------------------------------------------------
// Shared SVD plumbing
// ---------------------------------------------------------------------------

/// Assemble `V · diag(f(σ)) · Uᵀ` from the SVD of `jacobian`.
fn svd_pseudo_inverse(
    jacobian: &DMatrix<f64>,
    out: &mut DMatrix<f64>,
    sigma_inverse: impl Fn(f64) -> f64,
    threshold: f64,
) -> InversionQuality {
    let (rows, cols) = jacobian.shape();
    let svd = jacobian.clone().svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        // SVD factors were not requested or failed to converge; fall back
        // to a zero inverse, the most conservative bounded result.
        *out = DMatrix::zeros(cols, rows);
        return InversionQuality::NearSingular;
    };

    let mut quality = InversionQuality::WellConditioned;
    let mut scaled_u_t = u.transpose();
    for (i, &sigma) in svd.singular_values.iter().enumerate() {
        if sigma < threshold {
            quality = InversionQuality::NearSingular;
        }
        let factor = sigma_inverse(sigma);
        scaled_u_t.row_mut(i).scale_mut(factor);
    }
    *out = v_t.transpose() * scaled_u_t;
    quality
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

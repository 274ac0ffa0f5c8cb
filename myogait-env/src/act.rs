//! Action of the biped environment.
use myogait_core::Act;
use nalgebra::DVector;

/// Residual pose offset over the active (non-root) DOFs.
///
/// The length must equal the environment's active DOF count; the environment
/// scales the residual internally before it offsets the target pose.
#[derive(Clone, Debug)]
pub struct GaitAct(pub DVector<f64>);

impl GaitAct {
    /// A zero action of the given length.
    pub fn zeros(n: usize) -> Self {
        Self(DVector::zeros(n))
    }
}

impl Act for GaitAct {
    fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<f64>> for GaitAct {
    fn from(v: Vec<f64>) -> Self {
        Self(DVector::from_vec(v))
    }
}

//! Observation of the biped environment.
use myogait_core::Obs;
use nalgebra::DVector;

/// Flat observation vector.
///
/// Layout: relative center-of-mass position of every non-root link (3 values
/// each), then the world-frame center-of-mass velocity of every link with the
/// root's last (3 values each), then the gait phase scalar. The ordering is
/// part of the learner contract and never changes for a given skeleton.
#[derive(Clone, Debug)]
pub struct GaitObs(pub DVector<f64>);

impl Obs for GaitObs {
    fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<DVector<f64>> for GaitObs {
    fn from(v: DVector<f64>) -> Self {
        Self(v)
    }
}

impl AsRef<[f64]> for GaitObs {
    fn as_ref(&self) -> &[f64] {
        self.0.as_slice()
    }
}

//! Muscle-torque training tuples.
use nalgebra::DVector;

/// One sampled snapshot relating muscle activation to joint torque.
///
/// Captured at one uniformly random substep per control step and consumed by
/// an external muscle-control training procedure.
#[derive(Clone, Debug)]
pub struct MuscleTuple {
    /// Concatenated related-DOF active torque per unit activation, ordered by
    /// muscle and each muscle's internal DOF ordering.
    pub jta: DVector<f64>,
    /// Row-flattened active-torque mapping over the non-root DOFs,
    /// `active_dof × muscle_count` values, row-major.
    pub l: DVector<f64>,
    /// Passive torque over the non-root DOFs.
    pub b: DVector<f64>,
    /// Desired-torque residual over the non-root DOFs.
    pub tau_des: DVector<f64>,
}

impl MuscleTuple {
    /// A zeroed tuple sized for the given DOF partition and muscle count.
    pub fn zeros(related_dofs: usize, active_dofs: usize, muscles: usize) -> Self {
        Self {
            jta: DVector::zeros(related_dofs),
            l: DVector::zeros(active_dofs * muscles),
            b: DVector::zeros(active_dofs),
            tau_des: DVector::zeros(active_dofs),
        }
    }
}

/// Accumulating buffer of muscle tuples.
///
/// The environment appends one tuple per control step while muscle actuation
/// is enabled. The buffer grows until a caller drains it; draining (or an
/// explicit clear) is the caller's responsibility between training passes.
#[derive(Debug, Default)]
pub struct TupleBuffer {
    items: Vec<MuscleTuple>,
}

impl TupleBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tuple.
    pub fn push(&mut self, tuple: MuscleTuple) {
        self.items.push(tuple);
    }

    /// Number of buffered tuples.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over the buffered tuples.
    pub fn iter(&self) -> std::slice::Iter<'_, MuscleTuple> {
        self.items.iter()
    }

    /// Removes and returns all buffered tuples.
    pub fn drain(&mut self) -> Vec<MuscleTuple> {
        std::mem::take(&mut self.items)
    }

    /// Discards all buffered tuples.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{MuscleTuple, TupleBuffer};

    #[test]
    fn drain_empties_the_buffer() {
        let mut buffer = TupleBuffer::new();
        buffer.push(MuscleTuple::zeros(4, 2, 2));
        buffer.push(MuscleTuple::zeros(4, 2, 2));
        assert_eq!(buffer.len(), 2);

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn zeroed_tuple_has_contract_lengths() {
        let t = MuscleTuple::zeros(7, 3, 5);
        assert_eq!(t.jta.len(), 7);
        assert_eq!(t.l.len(), 15);
        assert_eq!(t.b.len(), 3);
        assert_eq!(t.tau_des.len(), 3);
    }
}

//! The simulated character: body, muscles, reference clip, PD gains.
use crate::dynamics::{ArticulatedBody, MotionClip, PhysicsBackend};
use nalgebra::DVector;

/// Bundle of everything that makes up one character instance.
///
/// Owned exclusively by the episode controller; nothing here is shared
/// between environment instances.
pub struct Character<B: PhysicsBackend> {
    body: B::Body,
    muscles: Vec<B::Muscle>,
    clip: B::Clip,
    kp: DVector<f64>,
    kv: DVector<f64>,
}

impl<B: PhysicsBackend> Character<B> {
    /// Assembles a character.
    pub fn new(body: B::Body, muscles: Vec<B::Muscle>, clip: B::Clip) -> Self {
        let n = body.num_dofs();
        Self {
            body,
            muscles,
            clip,
            kp: DVector::zeros(n),
            kv: DVector::zeros(n),
        }
    }

    /// Sets uniform PD gains over all DOFs.
    pub fn set_pd_gains(&mut self, kp: f64, kv: f64) {
        self.kp.fill(kp);
        self.kv.fill(kv);
    }

    /// The articulated body.
    pub fn body(&self) -> &B::Body {
        &self.body
    }

    /// The articulated body, mutably.
    pub fn body_mut(&mut self) -> &mut B::Body {
        &mut self.body
    }

    /// The muscle set, in load order.
    pub fn muscles(&self) -> &[B::Muscle] {
        &self.muscles
    }

    /// The reference motion clip.
    pub fn clip(&self) -> &B::Clip {
        &self.clip
    }

    /// Splits into the body and the muscle set for interleaved updates.
    pub fn parts_mut(&mut self) -> (&mut B::Body, &mut [B::Muscle]) {
        (&mut self.body, &mut self.muscles)
    }

    /// Stable PD torques toward `p_des` with this character's gains.
    pub fn spd_forces(&self, p_des: &DVector<f64>, dt: f64) -> DVector<f64> {
        self.body.spd_forces(p_des, &self.kp, &self.kv, dt)
    }
}

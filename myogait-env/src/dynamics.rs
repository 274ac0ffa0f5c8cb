//! Contracts of the physics collaborators.
//!
//! The episode controller does not integrate rigid-body dynamics, parse asset
//! files, or evaluate muscle geometry itself. Those live behind the narrow
//! traits of this module, so a full dynamics engine, a file-driven asset
//! pipeline, or the in-crate [`dummy`](crate::dummy) backend can all drive the
//! same controller.
use anyhow::Result;
use nalgebra::{DVector, Vector3};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Kind of the joint connecting a link to its parent.
///
/// The kind decides both the root DOF partition and which position
/// differences a joint contributes to the tracking reward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JointKind {
    /// Free-floating six-DOF joint (three rotations, three translations).
    Free,
    /// Planar three-DOF joint.
    Planar,
    /// Three-axis rotational joint.
    Ball,
    /// Single-axis rotational joint.
    Revolute,
    /// Rigid connection, no DOFs.
    Fixed,
}

impl JointKind {
    /// Number of generalized coordinates of this joint kind.
    pub fn dof_count(self) -> usize {
        match self {
            JointKind::Free => 6,
            JointKind::Planar => 3,
            JointKind::Ball => 3,
            JointKind::Revolute => 1,
            JointKind::Fixed => 0,
        }
    }

    /// DOFs excluded from the action space when this kind roots the skeleton.
    pub fn root_dof_count(self) -> usize {
        match self {
            JointKind::Free => 6,
            JointKind::Planar => 3,
            _ => 0,
        }
    }

    /// Per-DOF difference values this kind contributes to pose tracking.
    ///
    /// A free root is excluded entirely, a revolute joint contributes its one
    /// scalar, a ball joint all three.
    pub fn tracked_dof_count(self) -> usize {
        match self {
            JointKind::Revolute => 1,
            JointKind::Ball => 3,
            _ => 0,
        }
    }
}

/// An articulated body: joint/link state, forward kinematics, and force
/// integration.
///
/// Links are indexed `0..num_links()` with the root at index 0; a link's
/// parent joint is addressed through the link index. Generalized coordinates
/// follow the engine's skeleton ordering, root DOFs first.
pub trait ArticulatedBody {
    /// Total number of generalized coordinates.
    fn num_dofs(&self) -> usize;

    /// Number of links, root included.
    fn num_links(&self) -> usize;

    /// Index of the link with the given name.
    fn link_index(&self, name: &str) -> Option<usize>;

    /// Links designated as tracked end-effectors by the model description.
    fn end_effector_links(&self) -> &[usize];

    /// Current generalized positions.
    fn positions(&self) -> DVector<f64>;

    /// Current generalized velocities.
    fn velocities(&self) -> DVector<f64>;

    /// Overwrites the generalized positions.
    fn set_positions(&mut self, q: &DVector<f64>);

    /// Overwrites the generalized velocities.
    fn set_velocities(&mut self, dq: &DVector<f64>);

    /// Difference `q1 ⊖ q0` respecting each joint's coordinate topology.
    fn position_differences(&self, q1: &DVector<f64>, q0: &DVector<f64>) -> DVector<f64>;

    /// Re-runs forward kinematics for poses and velocities after a direct
    /// state write. No dynamics or acceleration update.
    fn refresh_kinematics(&mut self);

    /// Kind of the parent joint of `link`.
    fn joint_kind(&self, link: usize) -> JointKind;

    /// Index of the parent joint's first coordinate in the skeleton ordering.
    fn joint_dof_offset(&self, link: usize) -> usize;

    /// Positions of the parent joint of `link`.
    fn joint_positions(&self, link: usize) -> DVector<f64>;

    /// Velocities of the parent joint of `link`.
    fn joint_velocities(&self, link: usize) -> DVector<f64>;

    /// Overwrites the generalized forces of the parent joint of `link`.
    fn set_joint_forces(&mut self, link: usize, tau: &DVector<f64>);

    /// Overwrites the full generalized force vector.
    fn set_forces(&mut self, tau: &DVector<f64>);

    /// Accumulates into the generalized force vector, as an external force
    /// contribution would.
    fn add_forces(&mut self, tau: &DVector<f64>);

    /// Clears impulses accumulated by the constraint solver.
    fn clear_constraint_impulses(&mut self);

    /// Clears internal (actuation) forces.
    fn clear_internal_forces(&mut self);

    /// Clears external forces.
    fn clear_external_forces(&mut self);

    /// World-frame center of mass of `link`.
    fn link_com(&self, link: usize) -> Vector3<f64>;

    /// Center of mass of `link` expressed in the frame of another link.
    fn link_com_relative(&self, link: usize, frame: usize) -> Vector3<f64>;

    /// World-frame linear velocity of the center of mass of `link`.
    fn link_com_velocity(&self, link: usize) -> Vector3<f64>;

    /// World-frame origin of `link`.
    fn link_translation(&self, link: usize) -> Vector3<f64>;

    /// Whole-body center of mass.
    fn com(&self) -> Vector3<f64>;

    /// Stable PD torques driving the body toward `p_des` at the current
    /// velocity, with per-DOF gains and the integration timestep.
    fn spd_forces(
        &self,
        p_des: &DVector<f64>,
        kp: &DVector<f64>,
        kv: &DVector<f64>,
        dt: f64,
    ) -> DVector<f64>;

    /// Sets the gravity vector applied during integration.
    fn set_gravity(&mut self, g: Vector3<f64>);

    /// Sets the fixed integration timestep.
    fn set_time_step(&mut self, dt: f64);

    /// Advances the dynamics by one fixed timestep, consuming the applied
    /// forces.
    fn integrate(&mut self);
}

/// A time-indexed source of target pose/velocity pairs, periodic with a known
/// cycle length.
pub trait MotionClip {
    /// Target pose at time `t` and target velocity over the following
    /// `horizon` seconds.
    fn target_pose(&self, t: f64, horizon: f64) -> (DVector<f64>, DVector<f64>);

    /// Duration of one reference cycle in seconds.
    fn cycle_length(&self) -> f64;

    /// Whether the clip wraps around past its last frame.
    fn is_cyclic(&self) -> bool;

    /// Links whose parent joints the clip drives.
    fn mapped_links(&self) -> &[usize];
}

/// One muscle: activation in, Jacobian-mapped joint torques out.
///
/// [`MuscleActuator::update`] recomputes the force state from the current
/// body pose; the torque accessors report that state until the next update.
pub trait MuscleActuator<B: ArticulatedBody> {
    /// Sets the activation level in `[0, 1]`.
    fn set_activation(&mut self, a: f64);

    /// Current activation level.
    fn activation(&self) -> f64;

    /// Recomputes the muscle force state from the current body pose.
    fn update(&mut self, body: &B);

    /// Applies the current muscle force to the bodies the muscle spans.
    fn apply_to(&self, body: &mut B);

    /// Skeleton coordinates this muscle can exert torque on, ascending.
    fn related_dofs(&self) -> &[usize];

    /// Active torque per unit activation on the related DOFs, in
    /// [`MuscleActuator::related_dofs`] order.
    fn related_active_torque(&self) -> DVector<f64>;

    /// Full-DOF active torque column per unit activation.
    fn active_torque_column(&self) -> DVector<f64>;

    /// Full-DOF passive (activation-independent) torque.
    fn passive_torque(&self) -> DVector<f64>;
}

/// The ground the character walks on.
pub trait Terrain {
    /// Height of the ground reference point, in world coordinates.
    fn reference_height(&self) -> f64;
}

/// Factory for the physics collaborators.
///
/// A backend owns the engine-specific asset loading; the environment hands it
/// the paths named by the meta file. The associated `Config` is serialized as
/// part of the environment configuration, mirroring the nested-config pattern
/// used throughout the workspace.
pub trait PhysicsBackend {
    /// Backend configuration.
    type Config: Clone + Default + Serialize + DeserializeOwned;

    /// Articulated body implementation.
    type Body: ArticulatedBody;

    /// Muscle implementation.
    type Muscle: MuscleActuator<Self::Body>;

    /// Reference motion implementation.
    type Clip: MotionClip;

    /// Terrain implementation.
    type Terrain: Terrain;

    /// Builds the backend.
    fn build(config: &Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Loads the articulated body from a skeleton description.
    fn load_skeleton(&self, path: &Path, load_visuals: bool) -> Result<Self::Body>;

    /// Loads the muscle set attached to `body`.
    fn load_muscles(&self, path: &Path, body: &Self::Body) -> Result<Vec<Self::Muscle>>;

    /// Loads the reference motion retargeted to `body`.
    fn load_motion(&self, path: &Path, cyclic: bool, body: &Self::Body) -> Result<Self::Clip>;

    /// Loads the ground model.
    fn load_terrain(&self, path: &Path) -> Result<Self::Terrain>;
}

#[cfg(test)]
mod tests {
    use super::JointKind;

    #[test]
    fn joint_kind_dof_counts() {
        assert_eq!(JointKind::Free.dof_count(), 6);
        assert_eq!(JointKind::Planar.dof_count(), 3);
        assert_eq!(JointKind::Ball.dof_count(), 3);
        assert_eq!(JointKind::Revolute.dof_count(), 1);
        assert_eq!(JointKind::Fixed.dof_count(), 0);
    }

    #[test]
    fn only_floating_roots_have_root_dofs() {
        assert_eq!(JointKind::Free.root_dof_count(), 6);
        assert_eq!(JointKind::Planar.root_dof_count(), 3);
        assert_eq!(JointKind::Ball.root_dof_count(), 0);
        assert_eq!(JointKind::Revolute.root_dof_count(), 0);
    }

    #[test]
    fn tracking_excludes_floating_joints() {
        assert_eq!(JointKind::Free.tracked_dof_count(), 0);
        assert_eq!(JointKind::Revolute.tracked_dof_count(), 1);
        assert_eq!(JointKind::Ball.tracked_dof_count(), 3);
    }
}

//! Analytic backend used for tests.
//!
//! Implements every collaborator contract with closed-form kinematics: a
//! small biped whose link positions are affine in the joint coordinates, a
//! sinusoidal reference clip, muscles with fixed torque columns, and flat
//! ground. Asset paths are accepted but ignored, so meta files can name
//! placeholder assets. Not a physics engine; it exists to exercise the
//! episode controller deterministically.
use crate::dynamics::{
    ArticulatedBody, JointKind, MotionClip, MuscleActuator, PhysicsBackend, Terrain,
};
use anyhow::Result;
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::path::Path;

/// Configuration of [`DummyBackend`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DummyConfig {
    /// Number of muscles the muscle loader fabricates.
    pub num_muscles: usize,
    /// Amplitude of the sinusoidal reference clip, radians.
    pub clip_amplitude: f64,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            num_muscles: 4,
            clip_amplitude: 0.1,
        }
    }
}

struct LinkDef {
    name: &'static str,
    kind: JointKind,
    offset: [f64; 3],
}

// A minimal biped: free-floating pelvis, ball hips, revolute knees and
// ankles, ball neck. Feet and head are the tracked end-effectors.
const LINKS: &[LinkDef] = &[
    LinkDef {
        name: "Pelvis",
        kind: JointKind::Free,
        offset: [0.0, 1.5, 0.0],
    },
    LinkDef {
        name: "FemurL",
        kind: JointKind::Ball,
        offset: [-0.1, 1.2, 0.0],
    },
    LinkDef {
        name: "FemurR",
        kind: JointKind::Ball,
        offset: [0.1, 1.2, 0.0],
    },
    LinkDef {
        name: "TibiaL",
        kind: JointKind::Revolute,
        offset: [-0.1, 0.8, 0.0],
    },
    LinkDef {
        name: "TibiaR",
        kind: JointKind::Revolute,
        offset: [0.1, 0.8, 0.0],
    },
    LinkDef {
        name: "TalusL",
        kind: JointKind::Revolute,
        offset: [-0.1, 0.4, 0.0],
    },
    LinkDef {
        name: "TalusR",
        kind: JointKind::Revolute,
        offset: [0.1, 0.4, 0.0],
    },
    LinkDef {
        name: "Head",
        kind: JointKind::Ball,
        offset: [0.0, 1.9, 0.0],
    },
];

/// Articulated body with closed-form kinematics.
///
/// Each non-root link translates along x by its parent joint's first
/// coordinate; the root translates by the last three free-joint coordinates.
/// Integration is semi-implicit Euler with unit inertia and gravity acting on
/// the root's vertical translation.
pub struct DummyBody {
    dof_offsets: Vec<usize>,
    end_effectors: Vec<usize>,
    q: DVector<f64>,
    dq: DVector<f64>,
    tau: DVector<f64>,
    gravity: Vector3<f64>,
    dt: f64,
}

impl DummyBody {
    /// Builds the biped at its rest pose.
    pub fn biped() -> Self {
        let mut dof_offsets = Vec::with_capacity(LINKS.len());
        let mut total = 0;
        for link in LINKS {
            dof_offsets.push(total);
            total += link.kind.dof_count();
        }
        let talus_l = 5;
        let talus_r = 6;
        let head = 7;
        Self {
            dof_offsets,
            end_effectors: vec![talus_l, talus_r, head],
            q: DVector::zeros(total),
            dq: DVector::zeros(total),
            tau: DVector::zeros(total),
            gravity: Vector3::zeros(),
            dt: 1.0 / 900.0,
        }
    }

    fn root_translation(&self) -> Vector3<f64> {
        Vector3::new(self.q[3], self.q[4], self.q[5])
    }

    fn root_velocity(&self) -> Vector3<f64> {
        Vector3::new(self.dq[3], self.dq[4], self.dq[5])
    }
}

impl ArticulatedBody for DummyBody {
    fn num_dofs(&self) -> usize {
        self.q.len()
    }

    fn num_links(&self) -> usize {
        LINKS.len()
    }

    fn link_index(&self, name: &str) -> Option<usize> {
        LINKS.iter().position(|l| l.name == name)
    }

    fn end_effector_links(&self) -> &[usize] {
        &self.end_effectors
    }

    fn positions(&self) -> DVector<f64> {
        self.q.clone()
    }

    fn velocities(&self) -> DVector<f64> {
        self.dq.clone()
    }

    fn set_positions(&mut self, q: &DVector<f64>) {
        self.q.copy_from(q);
    }

    fn set_velocities(&mut self, dq: &DVector<f64>) {
        self.dq.copy_from(dq);
    }

    fn position_differences(&self, q1: &DVector<f64>, q0: &DVector<f64>) -> DVector<f64> {
        q1 - q0
    }

    fn refresh_kinematics(&mut self) {
        // poses are computed on demand from the coordinates
    }

    fn joint_kind(&self, link: usize) -> JointKind {
        LINKS[link].kind
    }

    fn joint_dof_offset(&self, link: usize) -> usize {
        self.dof_offsets[link]
    }

    fn joint_positions(&self, link: usize) -> DVector<f64> {
        let offset = self.dof_offsets[link];
        self.q.rows(offset, LINKS[link].kind.dof_count()).into_owned()
    }

    fn joint_velocities(&self, link: usize) -> DVector<f64> {
        let offset = self.dof_offsets[link];
        self.dq.rows(offset, LINKS[link].kind.dof_count()).into_owned()
    }

    fn set_joint_forces(&mut self, link: usize, tau: &DVector<f64>) {
        let offset = self.dof_offsets[link];
        let dofs = LINKS[link].kind.dof_count();
        assert_eq!(tau.len(), dofs, "joint force length must match the joint");
        self.tau.rows_mut(offset, dofs).copy_from(tau);
    }

    fn set_forces(&mut self, tau: &DVector<f64>) {
        self.tau.copy_from(tau);
    }

    fn add_forces(&mut self, tau: &DVector<f64>) {
        self.tau += tau;
    }

    fn clear_constraint_impulses(&mut self) {}

    fn clear_internal_forces(&mut self) {
        self.tau.fill(0.0);
    }

    fn clear_external_forces(&mut self) {
        self.tau.fill(0.0);
    }

    fn link_com(&self, link: usize) -> Vector3<f64> {
        let mut com = self.root_translation() + Vector3::from(LINKS[link].offset);
        if link > 0 {
            com.x += self.q[self.dof_offsets[link]];
        }
        com
    }

    fn link_com_relative(&self, link: usize, frame: usize) -> Vector3<f64> {
        self.link_com(link) - self.link_com(frame)
    }

    fn link_com_velocity(&self, link: usize) -> Vector3<f64> {
        let mut vel = self.root_velocity();
        if link > 0 {
            vel.x += self.dq[self.dof_offsets[link]];
        }
        vel
    }

    fn link_translation(&self, link: usize) -> Vector3<f64> {
        self.link_com(link)
    }

    fn com(&self) -> Vector3<f64> {
        let mut sum = Vector3::zeros();
        for link in 0..LINKS.len() {
            sum += self.link_com(link);
        }
        sum / LINKS.len() as f64
    }

    fn spd_forces(
        &self,
        p_des: &DVector<f64>,
        kp: &DVector<f64>,
        kv: &DVector<f64>,
        dt: f64,
    ) -> DVector<f64> {
        let predicted = &self.q + &self.dq * dt;
        (p_des - predicted).component_mul(kp) - self.dq.component_mul(kv)
    }

    fn set_gravity(&mut self, g: Vector3<f64>) {
        self.gravity = g;
    }

    fn set_time_step(&mut self, dt: f64) {
        self.dt = dt;
    }

    fn integrate(&mut self) {
        let mut tau = self.tau.clone();
        if LINKS[0].kind == JointKind::Free {
            tau[4] += self.gravity.y;
        }
        self.dq += tau * self.dt;
        self.q += &self.dq * self.dt;
        self.tau.fill(0.0);
    }
}

/// Sinusoidal reference motion over the rotational coordinates.
pub struct DummyClip {
    num_dofs: usize,
    cycle: f64,
    cyclic: bool,
    amplitude: f64,
    mapped: Vec<usize>,
}

impl DummyClip {
    fn pose_at(&self, t: f64) -> DVector<f64> {
        let t = if self.cyclic { t } else { t.min(self.cycle) };
        let mut q = DVector::zeros(self.num_dofs);
        for j in 0..self.num_dofs {
            // the root translation stays on the spot
            if (3..6).contains(&j) {
                continue;
            }
            q[j] = self.amplitude * (TAU * t / self.cycle + 0.3 * j as f64).sin();
        }
        q
    }
}

impl MotionClip for DummyClip {
    fn target_pose(&self, t: f64, horizon: f64) -> (DVector<f64>, DVector<f64>) {
        let q = self.pose_at(t);
        let v = (self.pose_at(t + horizon) - &q) / horizon;
        (q, v)
    }

    fn cycle_length(&self) -> f64 {
        self.cycle
    }

    fn is_cyclic(&self) -> bool {
        self.cyclic
    }

    fn mapped_links(&self) -> &[usize] {
        &self.mapped
    }
}

/// Muscle with a fixed full-DOF torque column.
pub struct DummyMuscle {
    activation: f64,
    related: Vec<usize>,
    column: DVector<f64>,
    passive: DVector<f64>,
}

impl MuscleActuator<DummyBody> for DummyMuscle {
    fn set_activation(&mut self, a: f64) {
        self.activation = a;
    }

    fn activation(&self) -> f64 {
        self.activation
    }

    fn update(&mut self, _body: &DummyBody) {
        // the torque column is pose-independent
    }

    fn apply_to(&self, body: &mut DummyBody) {
        body.add_forces(&(&self.column * self.activation + &self.passive));
    }

    fn related_dofs(&self) -> &[usize] {
        &self.related
    }

    fn related_active_torque(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.related.len(),
            self.related.iter().map(|&d| self.column[d]),
        )
    }

    fn active_torque_column(&self) -> DVector<f64> {
        self.column.clone()
    }

    fn passive_torque(&self) -> DVector<f64> {
        self.passive.clone()
    }
}

/// Flat ground at height zero.
pub struct DummyTerrain;

impl Terrain for DummyTerrain {
    fn reference_height(&self) -> f64 {
        0.0
    }
}

/// Backend assembling the dummy collaborators.
#[derive(Clone, Debug)]
pub struct DummyBackend {
    config: DummyConfig,
}

impl PhysicsBackend for DummyBackend {
    type Config = DummyConfig;
    type Body = DummyBody;
    type Muscle = DummyMuscle;
    type Clip = DummyClip;
    type Terrain = DummyTerrain;

    fn build(config: &Self::Config) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
        })
    }

    fn load_skeleton(&self, _path: &Path, _load_visuals: bool) -> Result<Self::Body> {
        Ok(DummyBody::biped())
    }

    fn load_muscles(&self, _path: &Path, body: &Self::Body) -> Result<Vec<Self::Muscle>> {
        let n = body.num_dofs();
        let root = body.joint_kind(0).root_dof_count();
        let active = n - root;
        let mut muscles = Vec::with_capacity(self.config.num_muscles);
        for i in 0..self.config.num_muscles {
            let start = root + (3 * i) % active.saturating_sub(2).max(1);
            let related: Vec<usize> = (start..(start + 3).min(n)).collect();
            let gain = 1.0 + 0.1 * i as f64;
            let mut column = DVector::zeros(n);
            for (k, &dof) in related.iter().enumerate() {
                column[dof] = gain * [1.0, -0.5, 0.25][k];
            }
            let passive = &column * 0.01;
            muscles.push(DummyMuscle {
                activation: 0.0,
                related,
                column,
                passive,
            });
        }
        Ok(muscles)
    }

    fn load_motion(&self, _path: &Path, cyclic: bool, body: &Self::Body) -> Result<Self::Clip> {
        Ok(DummyClip {
            num_dofs: body.num_dofs(),
            cycle: 1.0,
            cyclic,
            amplitude: self.config.clip_amplitude,
            mapped: (0..body.num_links()).collect(),
        })
    }

    fn load_terrain(&self, _path: &Path) -> Result<Self::Terrain> {
        Ok(DummyTerrain)
    }
}

#[cfg(test)]
mod tests {
    use super::{DummyBackend, DummyBody, DummyConfig};
    use crate::dynamics::{ArticulatedBody, JointKind, MuscleActuator, PhysicsBackend};
    use nalgebra::{DVector, Vector3};
    use std::path::Path;

    #[test]
    fn biped_shape() {
        let body = DummyBody::biped();
        assert_eq!(body.num_links(), 8);
        assert_eq!(body.num_dofs(), 19);
        assert_eq!(body.joint_kind(0), JointKind::Free);
        assert_eq!(body.joint_dof_offset(3), 12);
        assert_eq!(body.end_effector_links(), &[5, 6, 7]);
        assert_eq!(body.link_index("TalusR"), Some(6));
        assert_eq!(body.link_index("Skull"), None);
    }

    #[test]
    fn gravity_only_moves_the_root_down() {
        let mut body = DummyBody::biped();
        body.set_gravity(Vector3::new(0.0, -9.8, 0.0));
        body.set_time_step(0.01);
        body.integrate();
        assert!(body.velocities()[4] < 0.0);
        assert_eq!(body.velocities()[0], 0.0);
    }

    #[test]
    fn joint_forces_land_on_their_dofs() {
        let mut body = DummyBody::biped();
        body.set_time_step(0.1);
        body.set_joint_forces(3, &DVector::from_element(1, 2.0));
        body.integrate();
        assert!(body.velocities()[12] > 0.0);
        assert_eq!(body.velocities()[13], 0.0);
    }

    #[test]
    fn muscles_report_consistent_related_torques() {
        let backend = DummyBackend::build(&DummyConfig::default()).unwrap();
        let body = backend.load_skeleton(Path::new("ignored"), false).unwrap();
        let muscles = backend.load_muscles(Path::new("ignored"), &body).unwrap();
        assert_eq!(muscles.len(), 4);
        for muscle in &muscles {
            let related = muscle.related_dofs();
            let torque = muscle.related_active_torque();
            let column = muscle.active_torque_column();
            assert_eq!(torque.len(), related.len());
            for (k, &dof) in related.iter().enumerate() {
                assert_eq!(torque[k], column[dof]);
            }
        }
    }
}

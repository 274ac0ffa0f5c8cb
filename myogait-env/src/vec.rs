//! Batched fan-out over independent environment instances.
//!
//! A thin wrapper for multi-instance training harnesses: every instance owns
//! its state exclusively, calls fan out one by one, and the per-instance
//! results are gathered into fixed-size aggregates. Nothing here is
//! parallel; horizontal scaling comes from the instances' independence.
use crate::{
    dynamics::PhysicsBackend,
    env::GaitEnv,
    tuple::MuscleTuple,
    GaitEnvConfig,
};
use anyhow::Result;
use nalgebra::{DMatrix, DVector};

/// Muscle tuples of all instances, stacked one tuple per row.
pub struct TupleBatch {
    /// Related-DOF active torques.
    pub jta: DMatrix<f64>,
    /// Desired-torque residuals.
    pub tau_des: DMatrix<f64>,
    /// Row-flattened active-torque mappings.
    pub l: DMatrix<f64>,
    /// Passive torques.
    pub b: DMatrix<f64>,
}

/// A set of independent environment instances behind batched accessors.
pub struct VecEnv<B: PhysicsBackend> {
    envs: Vec<GaitEnv<B>>,
}

impl<B: PhysicsBackend> VecEnv<B> {
    /// Builds `num_envs` instances from one configuration.
    ///
    /// Instance `i` is seeded with `seed + i`, so the set as a whole is
    /// reproducible while the instances stay decorrelated.
    pub fn build(config: &GaitEnvConfig<B>, num_envs: usize, seed: u64) -> Result<Self> {
        assert!(num_envs > 0, "a vectorized environment needs at least one instance");
        let backend = B::build(&config.backend)?;
        let mut envs = Vec::with_capacity(num_envs);
        for i in 0..num_envs {
            envs.push(GaitEnv::from_meta(
                &backend,
                &config.meta_file,
                config.load_visuals,
                config.random_start,
                seed + i as u64,
            )?);
        }
        Ok(Self { envs })
    }

    /// Number of instances.
    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    /// One instance, for inspection.
    pub fn env(&self, id: usize) -> &GaitEnv<B> {
        &self.envs[id]
    }

    /// One instance, mutably.
    pub fn env_mut(&mut self, id: usize) -> &mut GaitEnv<B> {
        &mut self.envs[id]
    }

    /// Observation length, identical across instances.
    pub fn num_state(&self) -> usize {
        self.envs[0].num_state()
    }

    /// Action length, identical across instances.
    pub fn num_action(&self) -> usize {
        self.envs[0].num_action()
    }

    /// Simulation frequency in Hz.
    pub fn simulation_hz(&self) -> u32 {
        self.envs[0].simulation_hz()
    }

    /// Control frequency in Hz.
    pub fn control_hz(&self) -> u32 {
        self.envs[0].control_hz()
    }

    /// Physical substeps per control step.
    pub fn substeps_per_control(&self) -> usize {
        self.envs[0].substeps_per_control()
    }

    /// Whether the muscle actuation path is enabled.
    pub fn use_muscle(&self) -> bool {
        self.envs[0].use_muscle()
    }

    /// Number of muscles per instance.
    pub fn num_muscles(&self) -> usize {
        self.envs[0].num_muscles()
    }

    /// Sum of per-muscle related-DOF counts.
    pub fn num_total_related_dofs(&self) -> usize {
        self.envs[0].num_total_related_dofs()
    }

    /// One physical substep of instance `id`.
    pub fn step(&mut self, id: usize) {
        self.envs[id].substep();
    }

    /// Resets instance `id`.
    pub fn reset(&mut self, random_start: bool, id: usize) {
        self.envs[id].reset(random_start);
    }

    /// Episode-end flag of instance `id`.
    pub fn is_end_of_episode(&self, id: usize) -> bool {
        self.envs[id].is_end_of_episode()
    }

    /// Tracking reward of instance `id`.
    pub fn reward(&mut self, id: usize) -> f64 {
        self.envs[id].reward()
    }

    /// Gait reward of instance `id`.
    pub fn gait_reward(&mut self, id: usize) -> f64 {
        self.envs[id].gait_reward()
    }

    /// `num` physical substeps on every instance.
    pub fn steps(&mut self, num: usize) {
        for env in &mut self.envs {
            for _ in 0..num {
                env.substep();
            }
        }
    }

    /// One full control horizon of substeps on every instance.
    pub fn steps_at_once(&mut self) {
        let substeps = self.substeps_per_control();
        self.steps(substeps);
    }

    /// Resets every instance.
    pub fn resets(&mut self, random_start: bool) {
        for env in &mut self.envs {
            env.reset(random_start);
        }
    }

    /// Episode-end flags of all instances.
    pub fn end_of_episodes(&self) -> Vec<bool> {
        self.envs.iter().map(|e| e.is_end_of_episode()).collect()
    }

    /// Observations of all instances, one row each.
    pub fn states(&self) -> DMatrix<f64> {
        let mut states = DMatrix::zeros(self.envs.len(), self.num_state());
        for (i, env) in self.envs.iter().enumerate() {
            states.row_mut(i).copy_from(&env.observe().transpose());
        }
        states
    }

    /// Applies one action row per instance.
    pub fn set_actions(&mut self, actions: &DMatrix<f64>) {
        assert_eq!(actions.nrows(), self.envs.len(), "one action row per instance");
        for (i, env) in self.envs.iter_mut().enumerate() {
            let action = actions.row(i).transpose();
            env.set_action(&action);
            env.desired_torques();
        }
    }

    /// Tracking rewards of all instances.
    pub fn rewards(&mut self) -> DVector<f64> {
        let n = self.envs.len();
        DVector::from_iterator(n, self.envs.iter_mut().map(|e| e.reward()))
    }

    /// Gait rewards of all instances.
    pub fn gait_rewards(&mut self) -> DVector<f64> {
        let n = self.envs.len();
        DVector::from_iterator(n, self.envs.iter_mut().map(|e| e.gait_reward()))
    }

    /// Hip/knee angles of all instances, one row each in (l-hip, l-knee,
    /// r-hip, r-knee) order.
    pub fn leg_joint_angles(&self) -> DMatrix<f64> {
        let mut angles = DMatrix::zeros(self.envs.len(), 4);
        for (i, env) in self.envs.iter().enumerate() {
            angles.row_mut(i).copy_from(&env.leg_joint_angles().transpose());
        }
        angles
    }

    /// Related-DOF muscle torques of all instances, one row each.
    pub fn muscle_torques(&mut self) -> DMatrix<f64> {
        let cols = self.num_total_related_dofs();
        let mut torques = DMatrix::zeros(self.envs.len(), cols);
        for (i, env) in self.envs.iter_mut().enumerate() {
            torques.row_mut(i).copy_from(&env.muscle_torques().transpose());
        }
        torques
    }

    /// Active-DOF desired torques of all instances, one row each.
    pub fn desired_torques(&mut self) -> DMatrix<f64> {
        let cols = self.num_action();
        let mut torques = DMatrix::zeros(self.envs.len(), cols);
        for (i, env) in self.envs.iter_mut().enumerate() {
            torques.row_mut(i).copy_from(&env.desired_torques().transpose());
        }
        torques
    }

    /// Applies one activation row per instance.
    pub fn set_activation_levels(&mut self, activations: &DMatrix<f64>) {
        assert_eq!(
            activations.nrows(),
            self.envs.len(),
            "one activation row per instance"
        );
        for (i, env) in self.envs.iter_mut().enumerate() {
            let row = activations.row(i).transpose();
            env.set_activation_levels(&row);
        }
    }

    /// Drains every instance's tuple buffer into stacked matrices.
    pub fn drain_tuples(&mut self) -> TupleBatch {
        let mut tuples: Vec<MuscleTuple> = Vec::new();
        for env in &mut self.envs {
            tuples.extend(env.drain_tuples());
        }

        let rows = tuples.len();
        let jta_cols = self.num_total_related_dofs();
        let active = self.num_action();
        let l_cols = active * self.num_muscles();

        let mut batch = TupleBatch {
            jta: DMatrix::zeros(rows, jta_cols),
            tau_des: DMatrix::zeros(rows, active),
            l: DMatrix::zeros(rows, l_cols),
            b: DMatrix::zeros(rows, active),
        };
        for (i, tuple) in tuples.iter().enumerate() {
            batch.jta.row_mut(i).copy_from(&tuple.jta.transpose());
            batch.tau_des.row_mut(i).copy_from(&tuple.tau_des.transpose());
            batch.l.row_mut(i).copy_from(&tuple.l.transpose());
            batch.b.row_mut(i).copy_from(&tuple.b.transpose());
        }
        batch
    }

    /// Sets the left-hip assistive torque on every instance.
    pub fn set_left_hip_torques(&mut self, t: f64) {
        for env in &mut self.envs {
            env.set_left_hip_torque(t);
        }
    }

    /// Sets the right-hip assistive torque on every instance.
    pub fn set_right_hip_torques(&mut self, t: f64) {
        for env in &mut self.envs {
            env.set_right_hip_torque(t);
        }
    }

    /// Sets the left-knee assistive torque on every instance.
    pub fn set_left_knee_torques(&mut self, t: f64) {
        for env in &mut self.envs {
            env.set_left_knee_torque(t);
        }
    }

    /// Sets the right-knee assistive torque on every instance.
    pub fn set_right_knee_torques(&mut self, t: f64) {
        for env in &mut self.envs {
            env.set_right_knee_torque(t);
        }
    }
}

//! The episode controller.
//!
//! One control step spans `simulation_hz / control_hz` physical substeps.
//! Within a substep the controller injects muscle forces, exoskeleton
//! torques and the PD fallback, then advances the dynamics by one fixed
//! timestep. At one uniformly random substep per control step it also
//! harvests a muscle-torque training tuple.
mod reward;

use crate::{
    act::GaitAct,
    character::Character,
    config::{GaitEnvConfig, SimMeta},
    dynamics::{ArticulatedBody, MotionClip, MuscleActuator, PhysicsBackend, Terrain},
    error::EnvError,
    obs::GaitObs,
    tuple::{MuscleTuple, TupleBuffer},
};
use anyhow::Result;
use log::info;
use myogait_core::{
    record::{Record, RecordValue},
    Env, Info, Step,
};
use nalgebra::{DMatrix, DVector, Vector3};
use std::path::Path;

/// Extra per-step information; empty.
#[derive(Clone, Debug)]
pub struct GaitInfo;

impl Info for GaitInfo {}

/// Proportional gain of the stable PD solver, uniform over all DOFs.
const PD_KP: f64 = 300.0;
/// Episode time cap in seconds.
const EPISODE_TIME_CAP: f64 = 10.0;
/// Terminal pelvis height above the ground reference.
const MIN_ROOT_HEIGHT: f64 = 1.3;
/// Scale applied to policy actions before they offset the target pose.
const ACTION_SCALE: f64 = 0.1;
/// Fraction of the reference cycle usable as a randomized start time.
const RANDOM_START_SPAN: f64 = 0.9;
/// Ground description, looked up next to the meta file.
const GROUND_FILE: &str = "data/ground.xml";

/// Links the actuation and gait paths address by name.
#[derive(Clone, Copy, Debug)]
struct LegLinks {
    pelvis: usize,
    femur_l: usize,
    femur_r: usize,
    tibia_l: usize,
    tibia_r: usize,
    talus_l: usize,
    talus_r: usize,
}

impl LegLinks {
    fn resolve<B: ArticulatedBody>(body: &B) -> Result<Self, EnvError> {
        let find = |name: &str| {
            body.link_index(name)
                .ok_or_else(|| EnvError::MissingLink(name.to_string()))
        };
        Ok(Self {
            pelvis: find("Pelvis")?,
            femur_l: find("FemurL")?,
            femur_r: find("FemurR")?,
            tibia_l: find("TibiaL")?,
            tibia_r: find("TibiaR")?,
            talus_l: find("TalusL")?,
            talus_r: find("TalusR")?,
        })
    }
}

/// The four assistive torques, one scalar per exoskeleton joint.
#[derive(Clone, Copy, Debug, Default)]
struct ExoTorques {
    left_hip: f64,
    right_hip: f64,
    left_knee: f64,
    right_knee: f64,
}

/// The musculoskeletal biped environment.
///
/// Generic over the physics backend supplying the articulated body, muscle,
/// reference-motion and terrain implementations.
pub struct GaitEnv<B: PhysicsBackend> {
    meta: SimMeta,
    random_start: bool,
    character: Character<B>,
    terrain: B::Terrain,
    legs: LegLinks,

    root_dof: usize,
    active_dof: usize,
    related_dof_total: usize,
    num_state: usize,
    time_step: f64,

    sim_time: f64,
    sim_count: usize,
    capture_index: usize,

    action: DVector<f64>,
    target_positions: DVector<f64>,
    target_velocities: DVector<f64>,
    desired_torque: DVector<f64>,

    activation: DVector<f64>,
    // cleared on every action; kept for interface compatibility
    avg_activation: DVector<f64>,
    current_tuple: MuscleTuple,
    tuples: TupleBuffer,

    exo: ExoTorques,
    rng: fastrand::Rng,
}

impl<B: PhysicsBackend> GaitEnv<B> {
    /// Builds an environment from a simulation meta file.
    ///
    /// Asset paths in the meta file are resolved against its directory. An
    /// unreadable meta file, a missing skeleton or motion entry, or a
    /// non-divisible rate pair all fail the build; no partially initialized
    /// environment is ever returned.
    pub fn from_meta(
        backend: &B,
        meta_file: &Path,
        load_visuals: bool,
        random_start: bool,
        seed: u64,
    ) -> Result<Self> {
        let meta = SimMeta::load(meta_file)?;
        meta.validate()?;
        let dir = meta_file.parent().unwrap_or_else(|| Path::new("."));

        let skel = meta.skel_file.as_ref().ok_or(EnvError::MissingSkeleton)?;
        let mut body = backend.load_skeleton(&dir.join(skel), load_visuals)?;
        let muscles = if meta.use_muscle {
            match &meta.muscle_file {
                Some(path) => backend.load_muscles(&dir.join(path), &body)?,
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };
        let bvh = meta.bvh_file.as_ref().ok_or(EnvError::MissingMotion)?;
        let clip = backend.load_motion(&dir.join(bvh), meta.bvh_cyclic, &body)?;
        let terrain = backend.load_terrain(&dir.join(GROUND_FILE))?;

        let n = body.num_dofs();
        let root_dof = body.joint_kind(0).root_dof_count();
        let active_dof = n - root_dof;
        let legs = LegLinks::resolve(&body)?;

        body.set_gravity(Vector3::new(0.0, -9.8, 0.0));
        let time_step = 1.0 / f64::from(meta.simulation_hz);
        body.set_time_step(time_step);

        let mut character = Character::<B>::new(body, muscles, clip);
        character.set_pd_gains(PD_KP, (2.0 * PD_KP).sqrt());

        let num_muscles = character.muscles().len();
        let mut related_dof_total = 0;
        {
            let (body, muscles) = character.parts_mut();
            for muscle in muscles.iter_mut() {
                muscle.update(body);
                related_dof_total += muscle.related_dofs().len();
            }
        }

        let mut env = Self {
            meta,
            random_start,
            character,
            terrain,
            legs,
            root_dof,
            active_dof,
            related_dof_total,
            num_state: 0,
            time_step,
            sim_time: 0.0,
            sim_count: 0,
            capture_index: 0,
            action: DVector::zeros(active_dof),
            target_positions: DVector::zeros(n),
            target_velocities: DVector::zeros(n),
            desired_torque: DVector::zeros(n),
            activation: DVector::zeros(num_muscles),
            avg_activation: DVector::zeros(num_muscles),
            current_tuple: MuscleTuple::zeros(related_dof_total, active_dof, num_muscles),
            tuples: TupleBuffer::new(),
            exo: ExoTorques::default(),
            rng: fastrand::Rng::with_seed(seed),
        };
        env.reset(false);
        env.num_state = env.observe().len();
        info!(
            "built gait environment: {} links, {} dofs ({} active), {} muscles",
            env.character.body().num_links(),
            n,
            active_dof,
            num_muscles,
        );
        Ok(env)
    }

    /// Resets the episode.
    ///
    /// With `random_start` the new simulation time is sampled uniformly from
    /// `[0, 0.9 · cycle_length)`; otherwise it is 0. The character is posed
    /// on the target trajectory with forward kinematics refreshed, leaving
    /// dynamics untouched until the first substep.
    pub fn reset(&mut self, random_start: bool) {
        {
            let body = self.character.body_mut();
            body.clear_constraint_impulses();
            body.clear_internal_forces();
            body.clear_external_forces();
        }
        self.exo = ExoTorques::default();

        let t = if random_start {
            RANDOM_START_SPAN * self.character.clip().cycle_length() * self.rng.f64()
        } else {
            0.0
        };
        self.sim_time = t;
        self.action.fill(0.0);

        let horizon = 1.0 / f64::from(self.meta.control_hz);
        let (tp, tv) = self.character.clip().target_pose(t, horizon);
        self.target_positions = tp;
        self.target_velocities = tv;

        let body = self.character.body_mut();
        body.set_positions(&self.target_positions);
        body.set_velocities(&self.target_velocities);
        body.refresh_kinematics();
    }

    /// Runs one physical substep.
    pub fn substep(&mut self) {
        if self.meta.use_muscle {
            {
                let (body, muscles) = self.character.parts_mut();
                for (i, muscle) in muscles.iter_mut().enumerate() {
                    muscle.set_activation(self.activation[i]);
                    muscle.update(body);
                    muscle.apply_to(body);
                }
            }

            let legs = self.legs;
            let exo = self.exo;
            let body = self.character.body_mut();
            // constant support torque at the pelvis root
            let hold_up = DVector::from_vec(vec![0.0, 0.0, 0.0, 0.0, 255.0, 0.0]);
            body.set_joint_forces(legs.pelvis, &hold_up);
            body.set_joint_forces(
                legs.femur_l,
                &DVector::from_vec(vec![exo.left_hip, 0.0, 0.0]),
            );
            body.set_joint_forces(
                legs.femur_r,
                &DVector::from_vec(vec![exo.right_hip, 0.0, 0.0]),
            );
            // each tibia receives the opposite knee's scalar
            body.set_joint_forces(legs.tibia_l, &DVector::from_element(1, exo.right_knee));
            body.set_joint_forces(legs.tibia_r, &DVector::from_element(1, exo.left_knee));

            if self.sim_count == self.capture_index {
                self.capture_tuple();
            }
        } else {
            self.desired_torques();
            let tau = self.desired_torque.clone();
            self.character.body_mut().set_forces(&tau);
        }

        self.character.body_mut().integrate();
        self.sim_time += self.time_step;
        self.sim_count += 1;
    }

    /// Applies a policy action for the next control horizon.
    ///
    /// The action is stored pre-scaled; the target trajectory is recomputed
    /// at the current simulation time, the substep counter restarts, and a
    /// fresh capture substep is drawn.
    pub fn set_action(&mut self, a: &DVector<f64>) {
        assert_eq!(a.len(), self.active_dof, "action length must equal the active DOF count");
        self.action = a * ACTION_SCALE;

        let horizon = 1.0 / f64::from(self.meta.control_hz);
        let (tp, tv) = self.character.clip().target_pose(self.sim_time, horizon);
        self.target_positions = tp;
        self.target_velocities = tv;

        self.sim_count = 0;
        self.capture_index = self.rng.usize(0..self.substeps_per_control());
        self.avg_activation.fill(0.0);
    }

    /// Desired torques over the active DOFs for the current target and
    /// action.
    ///
    /// The full-DOF solver result is cached for the tuple capture and the
    /// PD-only stepping path.
    pub fn desired_torques(&mut self) -> DVector<f64> {
        let mut p_des = self.target_positions.clone();
        {
            let mut tail = p_des.rows_mut(self.root_dof, self.active_dof);
            tail += &self.action;
        }
        self.desired_torque = self.character.spd_forces(&p_des, self.time_step);
        self.desired_torque
            .rows(self.root_dof, self.active_dof)
            .into_owned()
    }

    /// Refreshes every muscle and concatenates the related-DOF active torque
    /// contributions, ordered by muscle and each muscle's DOF ordering.
    pub fn muscle_torques(&mut self) -> DVector<f64> {
        let mut out = DVector::zeros(self.related_dof_total);
        let mut index = 0;
        let (body, muscles) = self.character.parts_mut();
        for muscle in muscles.iter_mut() {
            muscle.update(body);
            let jta = muscle.related_active_torque();
            out.rows_mut(index, jta.len()).copy_from(&jta);
            index += jta.len();
        }
        out
    }

    // One training tuple from the current substep.
    fn capture_tuple(&mut self) {
        let n = self.character.body().num_dofs();
        let m = self.character.muscles().len();
        let rows = n - self.root_dof;

        let mut jta = DMatrix::zeros(n, m);
        let mut jtp = DVector::zeros(n);
        for (i, muscle) in self.character.muscles().iter().enumerate() {
            jta.set_column(i, &muscle.active_torque_column());
            jtp += muscle.passive_torque();
        }

        self.current_tuple.jta = self.muscle_torques();
        let mut l = DVector::zeros(rows * m);
        for i in 0..rows {
            for j in 0..m {
                l[i * m + j] = jta[(self.root_dof + i, j)];
            }
        }
        self.current_tuple.l = l;
        self.current_tuple.b = jtp.rows(self.root_dof, rows).into_owned();
        self.current_tuple.tau_des = self.desired_torque.rows(self.root_dof, rows).into_owned();
        self.tuples.push(self.current_tuple.clone());
    }

    /// Encodes the current state for the learner.
    ///
    /// Layout: relative CoM position of every non-root link, CoM velocity of
    /// every link with the root's last, then the gait phase. Positions are
    /// scaled by 0.8 and velocities by 0.2 to match the reference motion's
    /// range.
    pub fn observe(&self) -> DVector<f64> {
        let body = self.character.body();
        let links = body.num_links();

        let mut p = DVector::zeros((links - 1) * 3);
        let mut v = DVector::zeros(links * 3);
        for i in 1..links {
            p.fixed_rows_mut::<3>(3 * (i - 1))
                .copy_from(&body.link_com_relative(i, 0));
            v.fixed_rows_mut::<3>(3 * (i - 1))
                .copy_from(&body.link_com_velocity(i));
        }
        v.fixed_rows_mut::<3>(3 * (links - 1))
            .copy_from(&body.link_com_velocity(0));

        p *= 0.8;
        v *= 0.2;

        let mut state = DVector::zeros(p.len() + v.len() + 1);
        state.rows_mut(0, p.len()).copy_from(&p);
        state.rows_mut(p.len(), v.len()).copy_from(&v);
        state[p.len() + v.len()] = self.phase();
        state
    }

    /// Fractional progress through the current reference cycle, in `[0, 1)`.
    pub fn phase(&self) -> f64 {
        let cycle = self.character.clip().cycle_length();
        (self.sim_time % cycle) / cycle
    }

    /// Whether the episode has ended, for any of the three reasons.
    pub fn is_end_of_episode(&self) -> bool {
        let (terminated, truncated) = self.episode_flags();
        terminated || truncated
    }

    // (terminated, truncated): fallen/diverged vs. time cap.
    fn episode_flags(&self) -> (bool, bool) {
        let body = self.character.body();
        let root_height = body.link_translation(0)[1] - self.terrain.reference_height();
        let fallen = root_height < MIN_ROOT_HEIGHT;
        let diverged = body.positions().iter().any(|x| !x.is_finite())
            || body.velocities().iter().any(|x| !x.is_finite());
        let timed_out = self.sim_time > EPISODE_TIME_CAP;
        (fallen || diverged, timed_out)
    }

    /// Sets every muscle's activation for the coming substeps.
    pub fn set_activation_levels(&mut self, a: &DVector<f64>) {
        assert_eq!(a.len(), self.activation.len(), "one activation per muscle");
        self.activation.copy_from(a);
    }

    /// Current per-muscle activations.
    pub fn activation_levels(&self) -> &DVector<f64> {
        &self.activation
    }

    /// Sets the left-hip assistive torque.
    pub fn set_left_hip_torque(&mut self, t: f64) {
        self.exo.left_hip = t;
    }

    /// Sets the right-hip assistive torque.
    pub fn set_right_hip_torque(&mut self, t: f64) {
        self.exo.right_hip = t;
    }

    /// Sets the left-knee assistive torque.
    pub fn set_left_knee_torque(&mut self, t: f64) {
        self.exo.left_knee = t;
    }

    /// Sets the right-knee assistive torque.
    pub fn set_right_knee_torque(&mut self, t: f64) {
        self.exo.right_knee = t;
    }

    /// Sets all four assistive torques in (l-hip, r-hip, l-knee, r-knee)
    /// order.
    pub fn set_exo_torques(&mut self, ts: &[f64; 4]) {
        self.exo.left_hip = ts[0];
        self.exo.right_hip = ts[1];
        self.exo.left_knee = ts[2];
        self.exo.right_knee = ts[3];
    }

    /// The four assistive torques in (l-hip, l-knee, r-hip, r-knee) order.
    ///
    /// The order differs from [`GaitEnv::set_exo_torques`]; downstream
    /// consumers depend on both orders as they are.
    pub fn exo_torques(&self) -> [f64; 4] {
        [
            self.exo.left_hip,
            self.exo.left_knee,
            self.exo.right_hip,
            self.exo.right_knee,
        ]
    }

    /// The accumulated training tuples.
    pub fn tuples(&self) -> &TupleBuffer {
        &self.tuples
    }

    /// Removes and returns all accumulated training tuples.
    pub fn drain_tuples(&mut self) -> Vec<MuscleTuple> {
        self.tuples.drain()
    }

    /// Observation length.
    pub fn num_state(&self) -> usize {
        self.num_state
    }

    /// Action length.
    pub fn num_action(&self) -> usize {
        self.active_dof
    }

    /// Control frequency in Hz.
    pub fn control_hz(&self) -> u32 {
        self.meta.control_hz
    }

    /// Simulation frequency in Hz.
    pub fn simulation_hz(&self) -> u32 {
        self.meta.simulation_hz
    }

    /// Physical substeps per control step.
    pub fn substeps_per_control(&self) -> usize {
        self.meta.substeps_per_control()
    }

    /// Whether the muscle actuation path is enabled.
    pub fn use_muscle(&self) -> bool {
        self.meta.use_muscle
    }

    /// Number of muscles.
    pub fn num_muscles(&self) -> usize {
        self.character.muscles().len()
    }

    /// Sum of every muscle's related-DOF count.
    pub fn num_total_related_dofs(&self) -> usize {
        self.related_dof_total
    }

    /// Current simulation time in seconds.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Substep index at which the current control step samples its tuple.
    pub fn capture_substep_index(&self) -> usize {
        self.capture_index
    }

    /// Target pose for the current control horizon.
    pub fn target_positions(&self) -> &DVector<f64> {
        &self.target_positions
    }

    /// Target velocity for the current control horizon.
    pub fn target_velocities(&self) -> &DVector<f64> {
        &self.target_velocities
    }

    /// The stored (pre-scaled) action.
    pub fn action(&self) -> &DVector<f64> {
        &self.action
    }

    /// The parsed meta file.
    pub fn meta(&self) -> &SimMeta {
        &self.meta
    }

    /// The character, for inspection.
    pub fn character(&self) -> &Character<B> {
        &self.character
    }

    /// The character, for direct state manipulation.
    pub fn character_mut(&mut self) -> &mut Character<B> {
        &mut self.character
    }
}

impl<B: PhysicsBackend> Env for GaitEnv<B> {
    type Config = GaitEnvConfig<B>;
    type Obs = GaitObs;
    type Act = GaitAct;
    type Info = GaitInfo;

    fn build(config: &Self::Config, seed: u64) -> Result<Self> {
        let backend = B::build(&config.backend)?;
        Self::from_meta(
            &backend,
            &config.meta_file,
            config.load_visuals,
            config.random_start,
            seed,
        )
    }

    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        self.set_action(&a.0);
        self.desired_torques();
        for _ in 0..self.substeps_per_control() {
            self.substep();
        }

        let reward = self.reward();
        let (is_terminated, is_truncated) = self.episode_flags();
        let obs = GaitObs(self.observe());

        let mut record = Record::from_scalar("phase", self.phase());
        record.insert("gait_reward", RecordValue::Scalar(self.gait_reward()));

        (
            Step::new(obs, a.clone(), reward, is_terminated, is_truncated, GaitInfo, None),
            record,
        )
    }

    fn reset(&mut self) -> Result<Self::Obs> {
        self.reset(self.random_start);
        Ok(GaitObs(self.observe()))
    }

    fn step_with_reset(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        let (mut step, record) = self.step(a);
        if step.is_done() {
            self.reset(self.random_start);
            step.init_obs = Some(GaitObs(self.observe()));
        }
        (step, record)
    }

    fn reset_with_index(&mut self, ix: usize) -> Result<Self::Obs> {
        self.rng = fastrand::Rng::with_seed(ix as u64);
        self.reset(self.random_start);
        Ok(GaitObs(self.observe()))
    }
}

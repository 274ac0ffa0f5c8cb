use myogait_core::{Env, Obs};
use myogait_env::{
    dummy::{DummyBackend, DummyConfig},
    dynamics::{ArticulatedBody, MuscleActuator, PhysicsBackend},
    GaitAct, GaitEnv, GaitEnvConfig, VecEnv,
};
use nalgebra::{DMatrix, DVector};
use std::{fs::File, io::Write, path::PathBuf};
use tempdir::TempDir;

const META: &str = "use_muscle true\n\
                    con_hz 30\n\
                    sim_hz 60\n\
                    skel_file data/human.xml\n\
                    muscle_file data/muscle.xml\n\
                    bvh_file data/walk.bvh true\n\
                    reward_param 0.65 0.1 0.15 0.1\n";

const META_NO_MUSCLE: &str = "use_muscle false\n\
                              con_hz 30\n\
                              sim_hz 60\n\
                              skel_file data/human.xml\n\
                              bvh_file data/walk.bvh true\n";

fn write_meta(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("metadata.txt");
    let mut file = File::create(&path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
    path
}

fn build_env(meta: &str, config: DummyConfig, seed: u64) -> (TempDir, GaitEnv<DummyBackend>) {
    let dir = TempDir::new("myogait").unwrap();
    let path = write_meta(&dir, meta);
    let backend = DummyBackend::build(&config).unwrap();
    let env = GaitEnv::from_meta(&backend, &path, false, false, seed).unwrap();
    (dir, env)
}

fn control_step(env: &mut GaitEnv<DummyBackend>) {
    env.set_action(&DVector::zeros(env.num_action()));
    env.desired_torques();
    for _ in 0..env.substeps_per_control() {
        env.substep();
    }
}

#[test]
fn state_layout_length() {
    let (_dir, env) = build_env(META, DummyConfig::default(), 0);
    let links = env.character().body().num_links();
    let expected = 3 * (links - 1) + 3 * links + 1;

    assert_eq!(env.num_state(), expected);
    let state = env.observe();
    assert_eq!(state.len(), expected);

    let phase = state[expected - 1];
    assert!((0.0..1.0).contains(&phase));
}

#[test]
fn state_position_block_is_scaled() {
    let (_dir, env) = build_env(META, DummyConfig::default(), 0);
    let state = env.observe();
    let body = env.character().body();

    let rel = body.link_com_relative(1, 0);
    for k in 0..3 {
        assert!((state[k] - 0.8 * rel[k]).abs() < 1e-12);
    }
    let links = body.num_links();
    let root_vel = body.link_com_velocity(0);
    let root_vel_start = 3 * (links - 1) + 3 * (links - 1);
    for k in 0..3 {
        assert!((state[root_vel_start + k] - 0.2 * root_vel[k]).abs() < 1e-12);
    }
}

#[test]
fn reset_zeroes_phase_action_and_exo() {
    let (_dir, mut env) = build_env(META, DummyConfig::default(), 3);
    env.set_exo_torques(&[1.0, 2.0, 3.0, 4.0]);
    for _ in 0..5 {
        control_step(&mut env);
    }

    env.reset(false);
    assert_eq!(env.sim_time(), 0.0);
    assert_eq!(env.phase(), 0.0);
    assert!(env.action().iter().all(|&a| a == 0.0));
    assert_eq!(env.exo_torques(), [0.0, 0.0, 0.0, 0.0]);
}

#[test]
fn zero_error_rewards() {
    let (_dir, mut env) = build_env(META, DummyConfig::default(), 0);
    env.reset(false);

    let r = env.reward();
    assert!((r - 0.75).abs() < 1e-12, "composite reward was {}", r);

    let rg = env.gait_reward();
    assert!((rg - 2.25).abs() < 1e-12, "gait reward was {}", rg);
}

#[test]
fn reward_weights_come_from_the_meta_file() {
    let meta = "use_muscle true\n\
                con_hz 30\n\
                sim_hz 60\n\
                skel_file data/human.xml\n\
                muscle_file data/muscle.xml\n\
                bvh_file data/walk.bvh true\n\
                reward_param 0.5 0.3 0.15 0.1\n";
    let (_dir, mut env) = build_env(meta, DummyConfig::default(), 0);
    env.reset(false);
    let r = env.reward();
    assert!((r - 0.8).abs() < 1e-12, "composite reward was {}", r);
}

#[test]
fn one_tuple_per_control_step() {
    let (_dir, mut env) = build_env(META, DummyConfig::default(), 1);
    for _ in 0..10 {
        control_step(&mut env);
    }
    assert_eq!(env.tuples().len(), 10);

    let drained = env.drain_tuples();
    assert_eq!(drained.len(), 10);
    assert!(env.tuples().is_empty());
}

#[test]
fn capture_index_spans_the_control_horizon() {
    let meta = "use_muscle true\n\
                con_hz 30\n\
                sim_hz 240\n\
                skel_file data/human.xml\n\
                muscle_file data/muscle.xml\n\
                bvh_file data/walk.bvh true\n";
    let (_dir, mut env) = build_env(meta, DummyConfig::default(), 7);
    let k = env.substeps_per_control();
    assert_eq!(k, 8);

    let mut counts = vec![0usize; k];
    for _ in 0..400 {
        env.set_action(&DVector::zeros(env.num_action()));
        counts[env.capture_substep_index()] += 1;
    }
    for (index, &count) in counts.iter().enumerate() {
        assert!(count >= 20, "substep {} drawn only {} times", index, count);
    }
}

#[test]
fn muscle_disabled_captures_nothing() {
    let (_dir, mut env) = build_env(META_NO_MUSCLE, DummyConfig::default(), 0);
    assert!(!env.use_muscle());
    assert_eq!(env.num_muscles(), 0);
    for _ in 0..10 {
        control_step(&mut env);
    }
    assert!(env.tuples().is_empty());
}

#[test]
fn tuple_fields_have_contract_shapes() {
    let (_dir, mut env) = build_env(META, DummyConfig::default(), 2);
    control_step(&mut env);

    let active = env.num_action();
    let muscles = env.num_muscles();
    let related = env.num_total_related_dofs();
    let tuples = env.drain_tuples();
    let tuple = &tuples[0];

    assert_eq!(tuple.jta.len(), related);
    assert_eq!(tuple.l.len(), active * muscles);
    assert_eq!(tuple.b.len(), active);
    assert_eq!(tuple.tau_des.len(), active);
}

#[test]
fn tuple_mapping_is_row_major() {
    let (_dir, mut env) = build_env(META, DummyConfig::default(), 2);
    control_step(&mut env);

    let root = env.character().body().num_dofs() - env.num_action();
    let muscles = env.num_muscles();
    let columns: Vec<DVector<f64>> = env
        .character()
        .muscles()
        .iter()
        .map(|m| m.active_torque_column())
        .collect();

    let tuples = env.drain_tuples();
    let tuple = &tuples[0];
    for i in 0..env.num_action() {
        for (j, column) in columns.iter().enumerate() {
            assert_eq!(tuple.l[i * muscles + j], column[root + i]);
        }
    }
}

#[test]
fn termination_boundaries() {
    let (_dir, mut env) = build_env(META, DummyConfig::default(), 0);
    env.reset(false);
    assert!(!env.is_end_of_episode());

    // pelvis height: world height is the root's vertical coordinate plus the
    // dummy build height of 1.5
    let mut q = env.character().body().positions();
    q[4] = -0.19;
    env.character_mut().body_mut().set_positions(&q);
    assert!(!env.is_end_of_episode());
    q[4] = -0.21;
    env.character_mut().body_mut().set_positions(&q);
    assert!(env.is_end_of_episode());

    env.reset(false);
    let mut q = env.character().body().positions();
    q[0] = f64::NAN;
    env.character_mut().body_mut().set_positions(&q);
    assert!(env.is_end_of_episode());

    env.reset(false);
    for _ in 0..610 {
        env.substep();
    }
    assert!(env.sim_time() > 10.0);
    assert!(env.is_end_of_episode());
}

#[test]
fn unreadable_meta_fails_the_build() {
    let backend = DummyBackend::build(&DummyConfig::default()).unwrap();
    let missing = PathBuf::from("/no/such/dir/metadata.txt");
    assert!(GaitEnv::from_meta(&backend, &missing, false, false, 0).is_err());

    let config = GaitEnvConfig::<DummyBackend>::default().meta_file(&missing);
    assert!(GaitEnv::build(&config, 0).is_err());
}

#[test]
fn zero_action_reproduces_the_reset_trajectory() {
    let (_dir, mut env) = build_env(META, DummyConfig::default(), 0);
    env.reset(false);
    let expected_p = env.target_positions().clone();
    let expected_v = env.target_velocities().clone();

    env.set_action(&DVector::zeros(env.num_action()));
    assert_eq!(env.target_positions(), &expected_p);
    assert_eq!(env.target_velocities(), &expected_v);
}

#[test]
fn exo_getter_and_setter_orders_differ() {
    let (_dir, mut env) = build_env(META, DummyConfig::default(), 0);
    // setter order: l-hip, r-hip, l-knee, r-knee
    env.set_exo_torques(&[1.0, 2.0, 3.0, 4.0]);
    // getter order: l-hip, l-knee, r-hip, r-knee
    assert_eq!(env.exo_torques(), [1.0, 3.0, 2.0, 4.0]);
}

#[test]
fn knee_torques_cross_to_the_opposite_tibia() {
    let config = DummyConfig {
        num_muscles: 0,
        clip_amplitude: 0.0,
    };
    let (_dir, mut env) = build_env(META, config, 0);
    env.reset(false);

    let tibia_l = env.character().body().link_index("TibiaL").unwrap();
    let tibia_r = env.character().body().link_index("TibiaR").unwrap();
    let dof_l = env.character().body().joint_dof_offset(tibia_l);
    let dof_r = env.character().body().joint_dof_offset(tibia_r);

    env.set_left_knee_torque(5.0);
    env.substep();

    let dq = env.character().body().velocities();
    assert_eq!(dq[dof_l], 0.0);
    assert!(dq[dof_r] > 0.0);
}

#[test]
fn env_trait_step_and_records() {
    let dir = TempDir::new("myogait").unwrap();
    let path = write_meta(&dir, META);
    let config = GaitEnvConfig::<DummyBackend>::default().meta_file(path);
    let mut env = GaitEnv::build(&config, 42).unwrap();

    let obs = Env::reset(&mut env).unwrap();
    assert_eq!(obs.len(), env.num_state());

    let (step, record) = env.step(&GaitAct::zeros(env.num_action()));
    assert!(step.reward > 0.0);
    assert!(!step.is_done());
    assert_eq!(step.obs.len(), env.num_state());

    let phase = record.get_scalar("phase").unwrap();
    assert!((0.0..1.0).contains(&phase));
    record.get_scalar("gait_reward").unwrap();
}

#[test]
fn step_with_reset_reports_the_fresh_observation() {
    let dir = TempDir::new("myogait").unwrap();
    let path = write_meta(&dir, META);
    let config = GaitEnvConfig::<DummyBackend>::default().meta_file(path);
    let mut env = GaitEnv::build(&config, 11).unwrap();

    let mut saw_reset = false;
    for _ in 0..320 {
        let (step, _) = env.step_with_reset(&GaitAct::zeros(env.num_action()));
        if step.is_done() {
            assert!(step.init_obs.is_some());
            saw_reset = true;
            break;
        }
    }
    assert!(saw_reset, "the time cap never ended the episode");
}

#[test]
fn reset_with_index_is_reproducible() {
    let dir = TempDir::new("myogait").unwrap();
    let path = write_meta(&dir, META);
    let config = GaitEnvConfig::<DummyBackend>::default()
        .meta_file(path)
        .random_start(true);
    let mut env = GaitEnv::build(&config, 5).unwrap();

    let first = env.reset_with_index(7).unwrap();
    let t_first = env.sim_time();
    let second = env.reset_with_index(7).unwrap();

    assert_eq!(env.sim_time(), t_first);
    assert_eq!(first.0, second.0);
    assert!(t_first >= 0.0 && t_first < 0.9);
}

#[test]
fn vec_env_aggregates() {
    let dir = TempDir::new("myogait").unwrap();
    let path = write_meta(&dir, META);
    let config = GaitEnvConfig::<DummyBackend>::default().meta_file(path);
    let mut vec_env = VecEnv::build(&config, 3, 0).unwrap();

    assert_eq!(vec_env.num_envs(), 3);
    let states = vec_env.states();
    assert_eq!(states.nrows(), 3);
    assert_eq!(states.ncols(), vec_env.num_state());

    let actions = DMatrix::zeros(3, vec_env.num_action());
    vec_env.set_actions(&actions);
    vec_env.steps_at_once();

    assert_eq!(vec_env.rewards().len(), 3);
    assert_eq!(vec_env.gait_rewards().len(), 3);
    assert_eq!(vec_env.end_of_episodes().len(), 3);

    let angles = vec_env.leg_joint_angles();
    assert_eq!((angles.nrows(), angles.ncols()), (3, 4));

    let torques = vec_env.muscle_torques();
    assert_eq!(
        (torques.nrows(), torques.ncols()),
        (3, vec_env.num_total_related_dofs())
    );

    let batch = vec_env.drain_tuples();
    assert_eq!(batch.jta.nrows(), 3);
    assert_eq!(batch.tau_des.ncols(), vec_env.num_action());
    assert_eq!(
        batch.l.ncols(),
        vec_env.num_action() * vec_env.num_muscles()
    );

    let empty = vec_env.drain_tuples();
    assert_eq!(empty.jta.nrows(), 0);

    vec_env.set_left_hip_torques(2.5);
    for id in 0..vec_env.num_envs() {
        assert_eq!(vec_env.env(id).exo_torques()[0], 2.5);
    }
}

#[test]
fn activation_levels_roundtrip() {
    let (_dir, mut env) = build_env(META, DummyConfig::default(), 0);
    let levels = DVector::from_vec(vec![0.1, 0.2, 0.3, 0.4]);
    env.set_activation_levels(&levels);
    assert_eq!(env.activation_levels(), &levels);
}

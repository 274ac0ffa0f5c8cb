#![warn(missing_docs)]
//! Musculoskeletal biped environment.
//!
//! The episode controller couples a fixed-rate physics substep loop to a
//! control-rate policy interface: muscle forces, exoskeleton torques or PD
//! torques are injected every substep, while observations, two reward
//! variants, termination and muscle-torque training tuples are produced at
//! control-step granularity.
//!
//! The rigid-body engine, asset parsing, the muscle force model and the PD
//! solver are external collaborators behind the traits in [`dynamics`]; the
//! [`dummy`] module ships an analytic implementation used by the test suite.
//!
//! ```no_run
//! use myogait_core::Env;
//! use myogait_env::{dummy::DummyBackend, GaitAct, GaitEnv, GaitEnvConfig};
//!
//! let config = GaitEnvConfig::<DummyBackend>::default().meta_file("data/metadata.txt");
//! let mut env = GaitEnv::build(&config, 42).unwrap();
//! let (step, _record) = env.step(&GaitAct::zeros(env.num_action()));
//! assert!(!step.is_done());
//! ```
mod act;
mod character;
mod env;
mod obs;
mod tuple;
mod vec;

pub mod config;
pub mod dummy;
pub mod dynamics;
pub mod error;

pub use act::GaitAct;
pub use character::Character;
pub use config::{GaitEnvConfig, RewardWeights, SimMeta};
pub use env::{GaitEnv, GaitInfo};
pub use error::EnvError;
pub use obs::GaitObs;
pub use tuple::{MuscleTuple, TupleBuffer};
pub use vec::{TupleBatch, VecEnv};

#![warn(missing_docs)]
//! Interaction contract shared by myogait environments.
//!
//! This crate defines how a control policy talks to a simulated
//! musculoskeletal environment: observations, actions, the [`Env`] trait with
//! its step/reset lifecycle, the [`Step`] emitted at every control step, and
//! the [`record::Record`] container carrying per-step diagnostics.
//!
//! No simulation code lives here; concrete environments are implemented in
//! sibling crates on top of these traits.
pub mod error;
pub mod record;

mod base;
pub use base::{Act, Env, Info, Obs, Step};

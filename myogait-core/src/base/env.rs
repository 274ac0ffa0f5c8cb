//! Environment trait.
use super::{Act, Info, Obs, Step};
use crate::record::Record;
use anyhow::Result;

/// A simulated environment driven at control-step granularity.
///
/// One [`Env::step`] spans a whole control horizon; environments that run an
/// inner physics loop at a higher rate hide that loop behind this method.
pub trait Env {
    /// Configuration from which the environment is built.
    type Config: Clone;

    /// Observation of the environment.
    type Obs: Obs;

    /// Action applied to the environment.
    type Act: Act;

    /// Extra information attached to every [`Step`].
    type Info: Info;

    /// Builds an environment.
    ///
    /// `seed` initializes the environment-owned random source; two
    /// environments built from the same configuration and seed step
    /// identically.
    fn build(config: &Self::Config, seed: u64) -> Result<Self>
    where
        Self: Sized;

    /// Applies an action over one control horizon.
    ///
    /// The returned [`Record`] carries per-step diagnostics for recorders and
    /// is free to be dropped by callers that do not log.
    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record)
    where
        Self: Sized;

    /// Resets the environment and returns the initial observation.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Applies an action and, if the episode ended, resets in place.
    ///
    /// On an episode end the fresh observation is stored in
    /// [`Step::init_obs`].
    fn step_with_reset(&mut self, a: &Self::Act) -> (Step<Self>, Record)
    where
        Self: Sized;

    /// Resets with an index.
    ///
    /// The index is used in an environment-defined way; environments with an
    /// owned random source reseed it from the index, which makes evaluation
    /// episodes reproducible.
    fn reset_with_index(&mut self, ix: usize) -> Result<Self::Obs>;
}

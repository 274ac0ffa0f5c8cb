//! Product of one control step.
use super::Env;

/// Additional, environment-specific information attached to a [`Step`].
pub trait Info {}

impl Info for () {}

/// What an environment emits at every control step: the applied action, the
/// resulting observation, the reward, and the episode-end flags.
///
/// `is_terminated` reports a genuine terminal state (the simulated character
/// fell or its state became non-finite), while `is_truncated` reports the
/// episode time cap. Learners that bootstrap values should treat only the
/// former as absorbing.
pub struct Step<E: Env> {
    /// The action that produced this step.
    pub act: E::Act,

    /// Observation after the step.
    pub obs: E::Obs,

    /// Reward collected during the step.
    pub reward: f64,

    /// The environment reached a terminal state.
    pub is_terminated: bool,

    /// The episode hit its time cap.
    pub is_truncated: bool,

    /// Environment-specific extras.
    pub info: E::Info,

    /// Observation of the fresh episode when the environment was reset during
    /// the step, `None` otherwise.
    pub init_obs: Option<E::Obs>,
}

impl<E: Env> Step<E> {
    /// Constructs a step.
    pub fn new(
        obs: E::Obs,
        act: E::Act,
        reward: f64,
        is_terminated: bool,
        is_truncated: bool,
        info: E::Info,
        init_obs: Option<E::Obs>,
    ) -> Self {
        Step {
            act,
            obs,
            reward,
            is_terminated,
            is_truncated,
            info,
            init_obs,
        }
    }

    /// Terminated or truncated.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.is_terminated || self.is_truncated
    }
}

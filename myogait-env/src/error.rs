//! Errors of the biped environment.
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or configuring the environment.
#[derive(Error, Debug)]
pub enum EnvError {
    /// The meta file could not be read.
    #[error("can't read file {path}")]
    UnreadableMeta {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The meta file names no skeleton, so no articulated body can be built.
    #[error("meta file names no skeleton")]
    MissingSkeleton,

    /// The meta file names no reference motion.
    #[error("meta file names no reference motion")]
    MissingMotion,

    /// The simulation rate must be an integer multiple of the control rate.
    #[error("simulation rate {sim_hz} Hz is not a multiple of control rate {con_hz} Hz")]
    RateMismatch {
        /// Configured simulation frequency.
        sim_hz: u32,
        /// Configured control frequency.
        con_hz: u32,
    },

    /// A link the actuation or gait paths address by name is absent.
    #[error("skeleton has no link named {0}")]
    MissingLink(String),
}

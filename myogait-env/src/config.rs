//! Environment configuration.
//!
//! Two layers: [`SimMeta`] is the line-oriented simulation meta file shared
//! with the asset pipeline (first whitespace-separated token of each line is
//! the key), and [`GaitEnvConfig`] is the serde-backed outer configuration
//! from which the environment is built.
use crate::{dynamics::PhysicsBackend, error::EnvError};
use anyhow::Result;
use log::{error, trace, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

/// Weights of the tracking-reward terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    /// Pose-tracking weight.
    pub w_q: f64,
    /// Velocity-tracking weight.
    pub w_v: f64,
    /// End-effector weight.
    pub w_ee: f64,
    /// Center-of-mass weight.
    pub w_com: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            w_q: 0.65,
            w_v: 0.1,
            w_ee: 0.15,
            w_com: 0.1,
        }
    }
}

/// Parsed simulation meta file.
///
/// Unrecognized keys are ignored; a recognized key with missing trailing
/// values keeps its default and logs a warning. Asset paths are kept as
/// written and resolved against the meta file's directory at load time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimMeta {
    /// Whether the muscle actuation path is enabled.
    pub use_muscle: bool,
    /// Control frequency in Hz.
    pub control_hz: u32,
    /// Simulation frequency in Hz; an integer multiple of `control_hz`.
    pub simulation_hz: u32,
    /// Skeleton description path.
    pub skel_file: Option<PathBuf>,
    /// Muscle description path; loaded only when `use_muscle` is set.
    pub muscle_file: Option<PathBuf>,
    /// Reference motion path.
    pub bvh_file: Option<PathBuf>,
    /// Whether the reference motion wraps around.
    pub bvh_cyclic: bool,
    /// Tracking-reward weights.
    pub reward_weights: RewardWeights,
}

impl Default for SimMeta {
    fn default() -> Self {
        Self {
            use_muscle: true,
            control_hz: 30,
            simulation_hz: 900,
            skel_file: None,
            muscle_file: None,
            bvh_file: None,
            bvh_cyclic: false,
            reward_weights: RewardWeights::default(),
        }
    }
}

impl SimMeta {
    /// Reads and parses a meta file.
    ///
    /// An unreadable file is reported and surfaced as an error; no
    /// environment can be built from it.
    pub fn load(path: &Path) -> Result<Self, EnvError> {
        let mut text = String::new();
        File::open(path)
            .and_then(|f| {
                let mut reader = BufReader::new(f);
                reader.read_to_string(&mut text).map(|_| ())
            })
            .map_err(|source| {
                error!("can't read file {}", path.display());
                EnvError::UnreadableMeta {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        Ok(Self::parse(&text))
    }

    /// Parses meta-file text.
    pub fn parse(text: &str) -> Self {
        let mut meta = Self::default();
        for line in text.lines() {
            let mut tokens = line.split_whitespace();
            let key = match tokens.next() {
                Some(k) => k,
                None => continue,
            };
            match key {
                "use_muscle" => {
                    meta.use_muscle = tokens.next() == Some("true");
                }
                "con_hz" => {
                    parse_value(&mut tokens, key, &mut meta.control_hz);
                }
                "sim_hz" => {
                    parse_value(&mut tokens, key, &mut meta.simulation_hz);
                }
                "skel_file" => {
                    meta.skel_file = path_value(&mut tokens, key);
                }
                "muscle_file" => {
                    meta.muscle_file = path_value(&mut tokens, key);
                }
                "bvh_file" => {
                    meta.bvh_file = path_value(&mut tokens, key);
                    meta.bvh_cyclic = tokens.next() == Some("true");
                }
                "reward_param" => {
                    let w = &mut meta.reward_weights;
                    parse_value(&mut tokens, key, &mut w.w_q);
                    parse_value(&mut tokens, key, &mut w.w_v);
                    parse_value(&mut tokens, key, &mut w.w_ee);
                    parse_value(&mut tokens, key, &mut w.w_com);
                }
                other => {
                    trace!("ignoring meta key {}", other);
                }
            }
        }
        meta
    }

    /// Checks the frequency contract.
    pub fn validate(&self) -> Result<(), EnvError> {
        if self.control_hz == 0
            || self.simulation_hz == 0
            || self.simulation_hz % self.control_hz != 0
        {
            return Err(EnvError::RateMismatch {
                sim_hz: self.simulation_hz,
                con_hz: self.control_hz,
            });
        }
        Ok(())
    }

    /// Physical substeps per control step.
    pub fn substeps_per_control(&self) -> usize {
        (self.simulation_hz / self.control_hz) as usize
    }
}

fn parse_value<'a, T, I>(tokens: &mut I, key: &str, slot: &mut T)
where
    T: std::str::FromStr,
    I: Iterator<Item = &'a str>,
{
    match tokens.next().and_then(|t| t.parse().ok()) {
        Some(v) => *slot = v,
        None => warn!("meta key {} is missing a value, keeping the default", key),
    }
}

fn path_value<'a, I>(tokens: &mut I, key: &str) -> Option<PathBuf>
where
    I: Iterator<Item = &'a str>,
{
    match tokens.next() {
        Some(p) => Some(PathBuf::from(p)),
        None => {
            warn!("meta key {} is missing a path", key);
            None
        }
    }
}

/// Configuration of [`GaitEnv`](crate::GaitEnv).
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct GaitEnvConfig<B: PhysicsBackend> {
    /// Path of the simulation meta file.
    pub meta_file: PathBuf,
    /// Whether the backend should load visual assets alongside the collision
    /// shapes.
    pub load_visuals: bool,
    /// Whether resets sample a random start time within the reference cycle.
    pub random_start: bool,
    /// Backend configuration.
    pub backend: B::Config,
}

impl<B: PhysicsBackend> Clone for GaitEnvConfig<B> {
    fn clone(&self) -> Self {
        Self {
            meta_file: self.meta_file.clone(),
            load_visuals: self.load_visuals,
            random_start: self.random_start,
            backend: self.backend.clone(),
        }
    }
}

impl<B: PhysicsBackend> Default for GaitEnvConfig<B> {
    fn default() -> Self {
        Self {
            meta_file: PathBuf::new(),
            load_visuals: false,
            random_start: false,
            backend: Default::default(),
        }
    }
}

impl<B: PhysicsBackend> GaitEnvConfig<B> {
    /// Sets the meta-file path.
    pub fn meta_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.meta_file = path.into();
        self
    }

    /// Enables loading of visual assets.
    pub fn load_visuals(mut self, v: bool) -> Self {
        self.load_visuals = v;
        self
    }

    /// Enables randomized start times on reset.
    pub fn random_start(mut self, v: bool) -> Self {
        self.random_start = v;
        self
    }

    /// Sets the backend configuration.
    pub fn backend(mut self, config: B::Config) -> Self {
        self.backend = config;
        self
    }

    /// Loads the configuration from YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let config = serde_yaml::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(serde_yaml::to_string(self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{RewardWeights, SimMeta};

    #[test]
    fn parses_recognized_keys() {
        let meta = SimMeta::parse(
            "use_muscle true\n\
             con_hz 30\n\
             sim_hz 600\n\
             skel_file data/human.xml\n\
             muscle_file data/muscle.xml\n\
             bvh_file data/walk.bvh true\n\
             reward_param 0.5 0.2 0.2 0.1\n",
        );
        assert!(meta.use_muscle);
        assert_eq!(meta.control_hz, 30);
        assert_eq!(meta.simulation_hz, 600);
        assert_eq!(meta.skel_file.as_deref().unwrap().to_str(), Some("data/human.xml"));
        assert!(meta.bvh_cyclic);
        assert_eq!(
            meta.reward_weights,
            RewardWeights {
                w_q: 0.5,
                w_v: 0.2,
                w_ee: 0.2,
                w_com: 0.1
            }
        );
        assert!(meta.validate().is_ok());
    }

    #[test]
    fn ignores_unknown_keys() {
        let meta = SimMeta::parse("frame_skip 4\ncon_hz 60\nsim_hz 120\n");
        assert_eq!(meta.control_hz, 60);
        assert_eq!(meta.simulation_hz, 120);
    }

    #[test]
    fn missing_values_keep_defaults() {
        let meta = SimMeta::parse("con_hz\nsim_hz abc\n");
        assert_eq!(meta.control_hz, SimMeta::default().control_hz);
        assert_eq!(meta.simulation_hz, SimMeta::default().simulation_hz);
    }

    #[test]
    fn use_muscle_defaults_to_false_on_other_tokens() {
        assert!(!SimMeta::parse("use_muscle yes\n").use_muscle);
        assert!(!SimMeta::parse("use_muscle false\n").use_muscle);
        assert!(SimMeta::parse("use_muscle true\n").use_muscle);
    }

    #[test]
    fn rejects_non_divisible_rates() {
        let meta = SimMeta::parse("con_hz 30\nsim_hz 100\n");
        assert!(meta.validate().is_err());
    }

    #[test]
    fn unreadable_file_is_an_error() {
        assert!(SimMeta::load(std::path::Path::new("/no/such/meta.txt")).is_err());
    }
}

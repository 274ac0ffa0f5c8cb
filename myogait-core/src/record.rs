//! Key/value container for per-step diagnostics.
//!
//! A [`Record`] is emitted alongside every [`Step`](crate::Step) and carries
//! whatever the environment wants logged for that step: reward components,
//! gait phase, timing. Recorders consume these; training code is free to drop
//! them.
use crate::error::CoreError;
use chrono::prelude::{DateTime, Local};
use std::{
    collections::{
        hash_map::{IntoIter, Iter, Keys},
        HashMap,
    },
    convert::Into,
    iter::IntoIterator,
};

/// Value types storable in a [`Record`].
#[derive(Debug, Clone)]
pub enum RecordValue {
    /// A single value, typically a reward component or a phase.
    Scalar(f64),

    /// A timestamp.
    DateTime(DateTime<Local>),

    /// A one-dimensional array, e.g. a joint-angle snapshot.
    Array1(Vec<f64>),

    /// A text value.
    String(String),
}

/// A set of named diagnostic values.
#[derive(Debug, Clone)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record holding a single scalar.
    pub fn from_scalar(name: impl Into<String>, value: f64) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from key/value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Inserts a value, replacing any previous entry under the same key.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns the value under `k`, if present.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Absorbs all entries of `other`, which wins on key collisions.
    pub fn merge(mut self, other: Record) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Iterates over the keys.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Iterates over entries.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Returns `true` if the record has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the scalar under `k`.
    pub fn get_scalar(&self, k: &str) -> Result<f64, CoreError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(CoreError::RecordValueType(k.into())),
            None => Err(CoreError::RecordKey(k.into())),
        }
    }

    /// Returns the one-dimensional array under `k`.
    pub fn get_array1(&self, k: &str) -> Result<&[f64], CoreError> {
        match self.0.get(k) {
            Some(RecordValue::Array1(v)) => Ok(v),
            Some(_) => Err(CoreError::RecordValueType(k.into())),
            None => Err(CoreError::RecordKey(k.into())),
        }
    }

    /// Returns the string under `k`.
    pub fn get_string(&self, k: &str) -> Result<&str, CoreError> {
        match self.0.get(k) {
            Some(RecordValue::String(s)) => Ok(s),
            Some(_) => Err(CoreError::RecordValueType(k.into())),
            None => Err(CoreError::RecordKey(k.into())),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, RecordValue);
    type IntoIter = IntoIter<String, RecordValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

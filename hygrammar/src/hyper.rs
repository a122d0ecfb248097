//! Hyperparameters
//!
//! Hyperparameters are values supplied from outside at instantiation time and
//! shared by every node of a primitive within one `instantiate` call (e.g. the
//! rank of a factor, or the shape of the target tensor). Each primitive
//! declares the names it consumes, optionally with a default value.
use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use strum::{EnumIs, EnumTryAs};

use crate::error::{Error, Result};

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumIs, EnumTryAs)]
#[serde(untagged)]
pub enum HyperValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl HyperValue {
    /// Short human-readable name of the value kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            HyperValue::Bool(_) => "a boolean",
            HyperValue::Int(_) => "an integer",
            HyperValue::Float(_) => "a float",
            HyperValue::Str(_) => "a string",
        }
    }
}

impl std::fmt::Display for HyperValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HyperValue::Bool(b) => write!(f, "{b}"),
            HyperValue::Int(i) => write!(f, "{i}"),
            HyperValue::Float(x) => write!(f, "{x:?}"),
            HyperValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

macro_rules! impl_from_for_hyper_value {
    ($variant:ident, $($t:ty => $conv:expr),* $(,)?) => {
        $(
            impl From<$t> for HyperValue {
                #[allow(clippy::redundant_closure_call)]
                fn from(value: $t) -> Self {
                    HyperValue::$variant(($conv)(value))
                }
            }
        )*
    };
}

impl_from_for_hyper_value!(Bool, bool => |v| v);
impl_from_for_hyper_value!(
    Int,
    i64 => |v| v,
    i32 => i64::from,
    u32 => i64::from,
    usize => |v: usize| i64::try_from(v).unwrap_or(i64::MAX),
);
impl_from_for_hyper_value!(Float, f64 => |v| v, f32 => f64::from);
impl_from_for_hyper_value!(Str, String => |v| v, &str => str::to_string);

/// The hyperparameter values supplied to one instantiation.
///
/// Example:
///
/// ```rust
/// # use hygrammar::hyper::{Hyperparams, HyperValue};
/// let params = Hyperparams::from_toml_str("rank = 4\nscale = 0.5\n").unwrap();
/// assert_eq!(params.get("rank"), Some(&HyperValue::Int(4)));
/// let params = params.with("name", "svd");
/// assert_eq!(params.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hyperparams(BTreeMap<String, HyperValue>);

impl Hyperparams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<HyperValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<HyperValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&HyperValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HyperValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Decode hyperparameters from a flat TOML table.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config {
            source: e,
            file: "<string>".to_string(),
        })
    }

    /// Load hyperparameters from a TOML file.
    pub fn load_from_toml(path: &Path) -> Result<Self> {
        let toml_str = std::fs::read_to_string(path)?;
        toml::from_str(&toml_str).map_err(|e| Error::Config {
            source: e,
            file: path.display().to_string(),
        })
    }
}

impl<K: Into<String>, V: Into<HyperValue>> FromIterator<(K, V)> for Hyperparams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Hyperparameters resolved for one node: the declared names of its
/// primitive, each bound to the supplied value or to its default.
#[derive(Debug, Clone, PartialEq)]
pub struct HyperArgs {
    primitive: String,
    values: Vec<(String, HyperValue)>,
}

impl HyperArgs {
    pub(crate) fn new(primitive: String, values: Vec<(String, HyperValue)>) -> Self {
        Self { primitive, values }
    }

    pub fn get(&self, name: &str) -> Option<&HyperValue> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HyperValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn require(&self, name: &str) -> Result<&HyperValue> {
        self.get(name).ok_or_else(|| Error::MissingHyperparameter {
            primitive: self.primitive.clone(),
            hyperparameter: name.to_string(),
        })
    }

    fn mismatch(&self, name: &str, expected: &'static str, found: &HyperValue) -> Error {
        Error::HyperparameterType {
            primitive: self.primitive.clone(),
            hyperparameter: name.to_string(),
            expected,
            found: found.kind(),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.require(name)? {
            HyperValue::Int(i) => Ok(*i),
            other => Err(self.mismatch(name, "an integer", other)),
        }
    }

    /// Non-negative integer, e.g. a dimension or a rank.
    pub fn usize(&self, name: &str) -> Result<usize> {
        match self.require(name)? {
            HyperValue::Int(i) if *i >= 0 => Ok(*i as usize),
            other => Err(self.mismatch(name, "a non-negative integer", other)),
        }
    }

    /// Floating-point value; integers are widened.
    pub fn float(&self, name: &str) -> Result<f64> {
        match self.require(name)? {
            HyperValue::Float(x) => Ok(*x),
            HyperValue::Int(i) => Ok(*i as f64),
            other => Err(self.mismatch(name, "a float", other)),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<bool> {
        match self.require(name)? {
            HyperValue::Bool(b) => Ok(*b),
            other => Err(self.mismatch(name, "a boolean", other)),
        }
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        match self.require(name)? {
            HyperValue::Str(s) => Ok(s.as_str()),
            other => Err(self.mismatch(name, "a string", other)),
        }
    }
}

//! Named material parameters and material kind names.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::MpmError;
use crate::math::Real;

/// Ordered set of named real parameters used to initialize a particle's
/// constitutive model. Lookups never fail: a missing key yields the default
/// supplied by the model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialConfig {
    params: IndexMap<String, Real>,
}

impl MaterialConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Real) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Real) {
        self.params.insert(key.into(), value);
    }

    #[inline]
    pub fn get(&self, key: &str, default: Real) -> Real {
        self.params.get(key).copied().unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Real)> {
        self.params.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Real)> for MaterialConfig {
    fn from_iter<I: IntoIterator<Item = (K, Real)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Constitutive model selected for a particle at creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    Visco,
    Snow,
    Linear,
    Jelly,
    Water,
    Sand,
    VonMises,
    Elastic,
    Nonlocal,
}

impl MaterialKind {
    pub const ALL: [MaterialKind; 9] = [
        MaterialKind::Visco,
        MaterialKind::Snow,
        MaterialKind::Linear,
        MaterialKind::Jelly,
        MaterialKind::Water,
        MaterialKind::Sand,
        MaterialKind::VonMises,
        MaterialKind::Elastic,
        MaterialKind::Nonlocal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Visco => "visco",
            Self::Snow => "snow",
            Self::Linear => "linear",
            Self::Jelly => "jelly",
            Self::Water => "water",
            Self::Sand => "sand",
            Self::VonMises => "von_mises",
            Self::Elastic => "elastic",
            Self::Nonlocal => "nonlocal",
        }
    }
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MaterialKind {
    type Err = MpmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| MpmError::UnknownMaterial(s.to_owned()))
    }
}

//! Generic key/value parameters, the configuration surface recognized by the
//! self-sizing thread manager.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::ConfigError;

/// String-keyed parameters with typed getters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    values: HashMap<String, String>,
}

impl Parameters {
    /// Empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any previous value.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Raw value of `name`.
    #[must_use]
    pub fn get_parameter(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Whether `name` is set.
    #[must_use]
    pub fn is_parameter(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Parse `name` as `V`, falling back to `default` when unset.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` when the value is present but does not parse.
    pub fn get_parsed_or<V>(&self, name: &str, default: V) -> Result<V, ConfigError>
    where
        V: FromStr,
        V::Err: std::fmt::Display,
    {
        self.get_parameter(name).map_or(Ok(default), |raw| {
            raw.trim()
                .parse()
                .map_err(|e: V::Err| ConfigError::invalid(name, e.to_string()))
        })
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no parameters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Parameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

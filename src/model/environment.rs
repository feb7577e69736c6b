//! # Environment
//!
//! Ordered property sources, active profiles and the set of keys that must
//! resolve before a container is allowed to boot.

use crate::error::{ContainerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A named map of properties. Earlier sources in an [`Environment`] win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySource {
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

impl PropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    sources: Vec<PropertySource>,
    active_profiles: BTreeSet<String>,
    required: BTreeSet<String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest precedence.
    pub fn add_first(&mut self, source: PropertySource) {
        self.sources.insert(0, source);
    }

    /// Lowest precedence.
    pub fn add_last(&mut self, source: PropertySource) {
        self.sources.push(source);
    }

    pub fn with_source(mut self, source: PropertySource) -> Self {
        self.add_last(source);
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.active_profiles.insert(profile.into());
        self
    }

    pub fn with_required(mut self, key: impl Into<String>) -> Self {
        self.required.insert(key.into());
        self
    }

    pub fn sources(&self) -> &[PropertySource] {
        &self.sources
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.sources
            .iter()
            .find_map(|source| source.properties.get(key))
            .map(String::as_str)
    }

    pub fn contains_property(&self, key: &str) -> bool {
        self.property(key).is_some()
    }

    pub fn active_profiles(&self) -> impl Iterator<Item = &str> {
        self.active_profiles.iter().map(String::as_str)
    }

    pub fn validate_required(&self) -> Result<()> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|key| !self.contains_property(key))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::MissingRequiredProperty(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::new()
            .with_source(PropertySource::new("overrides").with("db.url", "mem://test"))
            .with_source(
                PropertySource::new("defaults")
                    .with("db.url", "pg://prod")
                    .with("db.pool", "8"),
            )
    }

    #[test]
    fn test_precedence() {
        let env = env();
        assert_eq!(env.property("db.url"), Some("mem://test"));
        assert_eq!(env.property("db.pool"), Some("8"));
        assert_eq!(env.property("missing"), None);
    }

    #[test]
    fn test_validate_required() {
        let env = env().with_required("db.url").with_required("cache.size");
        match env.validate_required() {
            Err(ContainerError::MissingRequiredProperty(keys)) => {
                assert_eq!(keys, vec!["cache.size".to_string()])
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

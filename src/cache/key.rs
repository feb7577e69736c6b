use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Structural identity of a boot configuration.
///
/// Two keys are equal when every field is equal, including the parent chain.
/// Locations and classes keep their declared order; profiles, initializers
/// and property overrides do not depend on order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextKey {
    pub locations: Vec<String>,
    pub classes: Vec<String>,
    pub initializers: BTreeSet<String>,
    pub active_profiles: BTreeSet<String>,
    pub properties: BTreeMap<String, String>,
    pub loader: String,
    pub parent: Option<Box<ContextKey>>,
}

impl ContextKey {
    pub fn new(loader: impl Into<String>) -> Self {
        Self {
            loader: loader.into(),
            ..Self::default()
        }
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.locations.push(location.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn initializer(mut self, initializer: impl Into<String>) -> Self {
        self.initializers.insert(initializer.into());
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.active_profiles.insert(profile.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent: ContextKey) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn parent_key(&self) -> Option<&ContextKey> {
        self.parent.as_deref()
    }

    /// Topmost ancestor, or `self` without a parent.
    pub fn root(&self) -> &ContextKey {
        let mut current = self;
        while let Some(parent) = current.parent_key() {
            current = parent;
        }
        current
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        std::iter::successors(self.parent_key(), |k| k.parent_key()).count()
    }

    /// Whether `other` is this key or one of its ancestors.
    pub fn is_self_or_ancestor(&self, other: &ContextKey) -> bool {
        std::iter::successors(Some(self), |k| k.parent_key()).any(|k| k == other)
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[loader={}", self.loader)?;
        if !self.locations.is_empty() {
            write!(f, " locations={:?}", self.locations)?;
        }
        if !self.classes.is_empty() {
            write!(f, " classes={:?}", self.classes)?;
        }
        if !self.active_profiles.is_empty() {
            write!(f, " profiles={:?}", self.active_profiles)?;
        }
        if !self.properties.is_empty() {
            write!(f, " properties={}", self.properties.len())?;
        }
        if let Some(parent) = &self.parent {
            write!(f, " parent={parent}")?;
        }
        write!(f, "]")
    }
}

use super::ContextKey;
use crate::error::Result;
use crate::lifecycle::{Container, ContainerConfig};
use crate::model::PropertySource;
use async_trait::async_trait;
use std::sync::Arc;

/// Boots the container for a key. The parent, if the key has one, was already
/// resolved through the cache.
#[async_trait]
pub trait ContainerFactory: Send + Sync {
    async fn create(&self, key: &ContextKey, parent: Option<Arc<Container>>) -> Result<Arc<Container>>;
}

/// Builds a [`ContainerConfig`] from the key and refreshes it. The key's
/// active profiles and property overrides are applied to the environment,
/// overrides taking precedence over every other source.
pub struct ConfigFactory<F> {
    build: F,
}

impl<F> ConfigFactory<F>
where
    F: Fn(&ContextKey) -> ContainerConfig + Send + Sync,
{
    pub fn new(build: F) -> Self {
        Self { build }
    }
}

#[async_trait]
impl<F> ContainerFactory for ConfigFactory<F>
where
    F: Fn(&ContextKey) -> ContainerConfig + Send + Sync,
{
    async fn create(&self, key: &ContextKey, parent: Option<Arc<Container>>) -> Result<Arc<Container>> {
        let mut config = (self.build)(key);
        for profile in &key.active_profiles {
            config.environment = config.environment.with_profile(profile.clone());
        }
        if !key.properties.is_empty() {
            let overrides = key
                .properties
                .iter()
                .fold(PropertySource::new("inlinedProperties"), |source, (k, v)| source.with(k, v));
            config.environment.add_first(overrides);
        }

        let container = match &parent {
            Some(parent) => Container::with_parent(config, parent),
            None => Container::new(config),
        };
        container.refresh().await?;
        Ok(container)
    }
}

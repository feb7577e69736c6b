use container_lifecycle::cache::{CascadeMode, ConfigFactory, ContextCache, ContextKey};
use container_lifecycle::error::ContainerError;
use container_lifecycle::lifecycle::{setup_tracing, Container, ContainerConfig, ContainerState};
use container_lifecycle::model::{Definition, Environment, Instance};
use container_lifecycle::registry::DefinitionSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn app_config(key: &ContextKey) -> ContainerConfig {
    ContainerConfig::new(key.classes.join("+")).with_definitions(
        DefinitionSet::new().with(
            "mode",
            Definition::of(|r| {
                let environment = r.get_as::<Environment>("environment")?;
                let mode = environment.property("app.mode").unwrap_or("default").to_string();
                Ok(Instance::new(mode))
            }),
        ),
    )
}

/// Concurrent requests for the same configuration boot it once and share it.
#[tokio::test]
async fn test_concurrent_requests_share_one_boot() {
    setup_tracing();
    let cache = Arc::new(ContextCache::new());
    let boots = Arc::new(AtomicUsize::new(0));
    let key = ContextKey::new("default").class("App");

    let boot = |boots: Arc<AtomicUsize>, key: ContextKey| async move {
        boots.fetch_add(1, Ordering::SeqCst);
        let container = Container::new(app_config(&key));
        container.refresh().await?;
        Ok::<_, ContainerError>(container)
    };

    let (a, b) = tokio::join!(
        cache.get_or_boot(&key, || boot(boots.clone(), key.clone())),
        cache.get_or_boot(&key, || boot(boots.clone(), key.clone())),
    );
    let (a, b) = (a.expect("first"), b.expect("second"));

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(boots.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_key_properties_reach_the_environment() {
    setup_tracing();
    let cache = ContextCache::new();
    let factory = ConfigFactory::new(app_config);

    let plain = ContextKey::new("default").class("App");
    let tuned = ContextKey::new("default").class("App").property("app.mode", "fast");

    let a = cache.load(&plain, &factory).await.expect("plain");
    let b = cache.load(&tuned, &factory).await.expect("tuned");

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(*a.get_as::<String>("mode").unwrap(), "default");
    assert_eq!(*b.get_as::<String>("mode").unwrap(), "fast");
}

#[tokio::test]
async fn test_key_profiles_and_overrides_shape_the_environment() {
    setup_tracing();
    let cache = ContextCache::new();
    let factory = ConfigFactory::new(app_config);
    let key = ContextKey::new("default")
        .class("App")
        .profile("it")
        .property("app.mode", "fast");

    let container = cache.load(&key, &factory).await.expect("boot");
    let environment = container.environment();

    assert_eq!(environment.active_profiles().collect::<Vec<_>>(), vec!["it"]);
    assert_eq!(environment.sources()[0].name, "inlinedProperties");
    assert!(environment.contains_property("app.mode"));
}

#[tokio::test]
async fn test_invalidating_a_parent_closes_children_first() {
    setup_tracing();
    let cache = ContextCache::new();
    let factory = ConfigFactory::new(app_config);
    let root = ContextKey::new("default").class("Root");
    let left = ContextKey::new("default").class("Left").with_parent(root.clone());
    let right = ContextKey::new("default").class("Right").with_parent(root.clone());

    let l = cache.load(&left, &factory).await.expect("left");
    let r = cache.load(&right, &factory).await.expect("right");
    let parent = l.parent().expect("parent attached");
    assert!(Arc::ptr_eq(&parent, &r.parent().expect("parent attached")));

    let removed = cache.invalidate(&root, CascadeMode::DirectChildren).await;
    assert_eq!(removed, 3);
    for container in [&l, &r, &parent] {
        assert_eq!(container.state(), ContainerState::Closed);
    }
    assert!(cache.is_empty().await);

    // A fresh request boots a new container.
    let again = cache.load(&left, &factory).await.expect("reboot");
    assert!(!Arc::ptr_eq(&again, &l));
    assert!(again.is_active());
}

#[tokio::test]
async fn test_clear_closes_everything() {
    setup_tracing();
    let cache = ContextCache::with_max_size(8);
    let factory = ConfigFactory::new(app_config);
    let root = ContextKey::new("default").class("Root");
    let child = ContextKey::new("default").class("Child").with_parent(root.clone());

    let c = cache.load(&child, &factory).await.expect("child");
    let parent = c.parent().expect("parent attached");
    cache.clear().await;

    assert_eq!(c.state(), ContainerState::Closed);
    assert_eq!(parent.state(), ContainerState::Closed);
    assert_eq!(cache.stats().await.size, 0);
}

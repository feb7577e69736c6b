//! Message resolution for containers.
//!
//! A container looks for a `messageSource` definition during boot. Without one
//! it installs a [`DelegatingMessageSource`] that forwards to the parent
//! container's source, so lookups still work across the hierarchy.

use std::collections::HashMap;
use std::sync::Arc;

/// Name the container looks up at boot.
pub const MESSAGE_SOURCE_NAME: &str = "messageSource";

pub trait MessageSource: Send + Sync {
    /// Resolves `code`, substituting `{0}`, `{1}`... with `args`.
    fn message(&self, code: &str, args: &[&str]) -> Option<String>;
}

/// In-memory templates.
#[derive(Debug, Clone, Default)]
pub struct StaticMessageSource {
    templates: HashMap<String, String>,
}

impl StaticMessageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, code: impl Into<String>, template: impl Into<String>) -> Self {
        self.templates.insert(code.into(), template.into());
        self
    }
}

impl MessageSource for StaticMessageSource {
    fn message(&self, code: &str, args: &[&str]) -> Option<String> {
        let template = self.templates.get(code)?;
        Some(format_message(template, args))
    }
}

fn format_message(template: &str, args: &[&str]) -> String {
    args.iter()
        .enumerate()
        .fold(template.to_string(), |text, (i, arg)| text.replace(&format!("{{{i}}}"), arg))
}

/// Local source first, then the parent.
#[derive(Clone, Default)]
pub struct DelegatingMessageSource {
    local: Option<Arc<dyn MessageSource>>,
    parent: Option<Arc<dyn MessageSource>>,
}

impl DelegatingMessageSource {
    pub fn new(
        local: Option<Arc<dyn MessageSource>>,
        parent: Option<Arc<dyn MessageSource>>,
    ) -> Self {
        Self { local, parent }
    }
}

impl MessageSource for DelegatingMessageSource {
    fn message(&self, code: &str, args: &[&str]) -> Option<String> {
        self.local
            .as_ref()
            .and_then(|local| local.message(code, args))
            .or_else(|| self.parent.as_ref()?.message(code, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_are_substituted() {
        let source = StaticMessageSource::new().with("greet", "Hello {0}, you have {1} tasks");
        assert_eq!(
            source.message("greet", &["Ada", "3"]).as_deref(),
            Some("Hello Ada, you have 3 tasks")
        );
        assert!(source.message("missing", &[]).is_none());
    }

    #[test]
    fn test_delegation_prefers_local() {
        let parent: Arc<dyn MessageSource> = Arc::new(
            StaticMessageSource::new().with("a", "parent-a").with("b", "parent-b"),
        );
        let local: Arc<dyn MessageSource> = Arc::new(StaticMessageSource::new().with("a", "local-a"));
        let source = DelegatingMessageSource::new(Some(local), Some(parent));

        assert_eq!(source.message("a", &[]).as_deref(), Some("local-a"));
        assert_eq!(source.message("b", &[]).as_deref(), Some("parent-b"));
        assert!(DelegatingMessageSource::default().message("a", &[]).is_none());
    }
}

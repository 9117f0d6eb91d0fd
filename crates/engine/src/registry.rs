//! Job registry: maps job type tags to executable implementations.
//!
//! Populated once at process start; the cascade resolves a node's `klass`
//! here right before running it.

use std::collections::HashMap;
use std::sync::Arc;

use jobs::ExecutableJob;

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: HashMap<String, Arc<dyn ExecutableJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `noop`, `sleep` and `fail`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (tag, job) in jobs::builtin::all() {
            registry.register_arc(tag, job);
        }
        registry
    }

    /// Register (or replace) the implementation for `tag`.
    pub fn register<J>(&mut self, tag: impl Into<String>, job: J) -> &mut Self
    where
        J: ExecutableJob + 'static,
    {
        self.register_arc(tag, Arc::new(job))
    }

    pub fn register_arc(&mut self, tag: impl Into<String>, job: Arc<dyn ExecutableJob>) -> &mut Self {
        self.jobs.insert(tag.into(), job);
        self
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn ExecutableJob>> {
        self.jobs.get(tag).cloned()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.jobs.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry").field("tags", &self.tags()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobs::mock::MockJob;

    #[test]
    fn builtins_are_registered() {
        let registry = JobRegistry::with_builtins();
        assert_eq!(registry.tags(), vec!["fail", "noop", "sleep"]);
        assert!(registry.get("noop").is_some());
        assert!(registry.get("shell").is_none());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut registry = JobRegistry::new();
        registry
            .register("fetch", MockJob::succeeding())
            .register("fetch", MockJob::failing("nope"));
        assert_eq!(registry.tags(), vec!["fetch"]);
    }
}

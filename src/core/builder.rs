use std::sync::Arc;

use super::cache::LookupCache;
use super::engine::{Engine, EngineParts};
use crate::{
    config::CacheConfig,
    filter::FilterRef,
    model::Template,
    observers::Observe,
    registry::{FailureReporter, LogReporter},
};

/// Builder for constructing a [`LookupCache`] with optional collaborators.
pub struct CacheBuilder {
    template: Template,
    cfg: CacheConfig,
    filter: Option<FilterRef>,
    observers: Vec<Arc<dyn Observe>>,
    reporter: Arc<dyn FailureReporter>,
}

impl CacheBuilder {
    /// Creates a builder for records matching `template`, with default configuration.
    pub fn new(template: Template) -> Self {
        Self {
            template,
            cfg: CacheConfig::default(),
            filter: None,
            observers: Vec::new(),
            reporter: Arc::new(LogReporter),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, cfg: CacheConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the filter every record must pass before it becomes visible.
    ///
    /// Without a filter every usable record passes.
    pub fn with_filter(mut self, filter: FilterRef) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets observers registered before any registry is added.
    ///
    /// More can be added later with [`LookupCache::add_observer`].
    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observe>>) -> Self {
        self.observers = observers;
        self
    }

    /// Replaces the failure reporter (default: [`LogReporter`]).
    pub fn with_failure_reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Builds the cache and starts its workers.
    ///
    /// Must be called within a Tokio runtime:
    /// - Event bus and log listener
    /// - Notification dispatcher
    /// - Discard-retry worker
    /// - Observer workers
    pub fn build(self) -> LookupCache {
        let engine = Engine::start(EngineParts {
            cfg: self.cfg,
            template: self.template,
            filter: self.filter,
            reporter: self.reporter,
        });
        for observer in self.observers {
            engine.observers.add(observer, Vec::new);
        }
        LookupCache::from_engine(engine)
    }
}

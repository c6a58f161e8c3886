//! Display sinks
//!
//! A sink is a preview surface that shows the shared source without owning
//! it. The registry holds sinks weakly: a dropped surface simply disappears
//! from the set on the next pass.

use std::sync::{Arc, Weak};

use vigil_core::MediaSource;

/// Passive consumer of the shared camera source
pub trait VideoSink: Send + Sync {
    /// Mount `source`, or clear the surface with `None`.
    /// Called with the hub locked; must not call back into the hub.
    fn set_source(&self, source: Option<MediaSource>);
}

/// Set of weakly-held sinks, keyed by identity
#[derive(Default)]
pub struct SinkRegistry {
    sinks: Vec<Weak<dyn VideoSink>>,
}

fn addr(sink: &Arc<dyn VideoSink>) -> *const () {
    Arc::as_ptr(sink) as *const ()
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink. Returns false if it was already present.
    pub fn insert(&mut self, sink: &Arc<dyn VideoSink>) -> bool {
        self.prune();
        if self.contains(sink) {
            return false;
        }
        self.sinks.push(Arc::downgrade(sink));
        true
    }

    /// Remove a sink. Returns false if it was not present.
    pub fn remove(&mut self, sink: &Arc<dyn VideoSink>) -> bool {
        self.prune();
        let target = addr(sink);
        match self
            .sinks
            .iter()
            .position(|w| w.as_ptr() as *const () == target)
        {
            Some(index) => {
                self.sinks.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, sink: &Arc<dyn VideoSink>) -> bool {
        let target = addr(sink);
        self.sinks.iter().any(|w| w.as_ptr() as *const () == target)
    }

    /// Call `f` on every live sink, dropping dead entries
    pub fn for_each_live(&mut self, mut f: impl FnMut(&Arc<dyn VideoSink>)) {
        self.sinks.retain(|weak| match weak.upgrade() {
            Some(sink) => {
                f(&sink);
                true
            }
            None => false,
        });
    }

    /// Number of live sinks
    pub fn len(&self) -> usize {
        self.sinks.iter().filter(|w| w.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&mut self) {
        self.sinks.retain(|w| w.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Surface {
        mounted: Mutex<Option<MediaSource>>,
    }

    impl VideoSink for Surface {
        fn set_source(&self, source: Option<MediaSource>) {
            *self.mounted.lock() = source;
        }
    }

    fn surface() -> Arc<dyn VideoSink> {
        Arc::new(Surface::default())
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut registry = SinkRegistry::new();
        let a = surface();
        assert!(registry.insert(&a));
        assert!(!registry.insert(&a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = SinkRegistry::new();
        let a = surface();
        let b = surface();
        registry.insert(&a);
        registry.insert(&b);

        assert!(registry.remove(&a));
        assert!(!registry.remove(&a));
        assert!(registry.contains(&b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_dropped_sinks_are_pruned() {
        let mut registry = SinkRegistry::new();
        let keep = surface();
        registry.insert(&keep);
        {
            let temp = surface();
            registry.insert(&temp);
            assert_eq!(registry.len(), 2);
        }
        assert_eq!(registry.len(), 1);

        let mut visited = 0;
        registry.for_each_live(|_| visited += 1);
        assert_eq!(visited, 1);
    }
}

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// Process-wide registry of named `CacheController` instances.
///
/// Grounded on `cachelito-core::stats_registry`'s
/// `Lazy<RwLock<HashMap<String, ...>>>` pattern, applied to whole
/// controller handles instead of statistics handles. This is the optional
/// half of spec.md §9's "singleton with static mutable state" guidance:
/// `initialize` always returns an owned handle; registering it here under
/// a name is how a second, unrelated call site can retrieve the same
/// instance without threading the `Arc` through its own static.
///
/// Instances are stored as `Arc<dyn Any + Send + Sync>` because the
/// registry is shared across every `(K, V)` instantiation of
/// `CacheController<K, V>` in the process; callers downcast back to the
/// concrete type they registered.
static REGISTRY: Lazy<RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers `controller` under `name`. A later `lookup` with the same
/// name and type returns this same instance (spec.md §4.1: "re-initialize
/// is a no-op that returns the existing instance").
pub fn register<T: Send + Sync + 'static>(name: &str, controller: Arc<T>) {
    REGISTRY.write().insert(name.to_string(), controller);
}

/// Looks up a previously registered instance by name, downcasting to `T`.
/// Returns `None` if nothing is registered under that name, or if it was
/// registered with a different `(K, V)` instantiation.
pub fn lookup<T: Send + Sync + 'static>(name: &str) -> Option<Arc<T>> {
    REGISTRY
        .read()
        .get(name)
        .and_then(|entry| entry.clone().downcast::<T>().ok())
}

/// Removes a registered instance (used by `dispose`).
pub fn unregister(name: &str) {
    REGISTRY.write().remove(name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn register_then_lookup_returns_same_instance() {
        let value = Arc::new(42u32);
        register("answer", value.clone());
        let found: Arc<u32> = lookup("answer").unwrap();
        assert_eq!(*found, 42);
        unregister("answer");
        assert!(lookup::<u32>("answer").is_none());
    }
}

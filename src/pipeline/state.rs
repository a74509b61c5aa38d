//! Per-execution state bag

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// String-keyed, type-erased values owned by one pipeline execution
#[derive(Default)]
pub struct State {
    values: HashMap<String, Box<dyn Any + Send>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing whatever was under `key`
    pub fn set<T: Any + Send>(&mut self, key: &str, value: T) {
        self.values.insert(key.to_string(), Box::new(value));
    }

    /// Borrow a value; `None` when absent or stored with another type
    pub fn get<T: Any + Send>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any + Send>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Remove and return a value of the expected type
    ///
    /// A value stored with a different type is left in place.
    pub fn take<T: Any + Send>(&mut self, key: &str) -> Option<T> {
        if !self.values.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        self.values
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// Read a boolean flag; missing flags are false
    pub fn flag(&self, key: &str) -> bool {
        self.get::<bool>(key).copied().unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("State").field("keys", &keys).finish()
    }
}

//! Request-scoped typed values.
//!
//! A [`Bindings`] is an immutable chain of key/value nodes: binding pushes a
//! new node in front of the existing chain, so earlier bindings are shadowed
//! rather than overwritten and a lookup never observes partial mutation.

use std::any::Any;
use std::sync::Arc;

/// An immutable chain of typed key/value bindings attached to one request.
#[derive(Clone, Default)]
pub struct Bindings {
    head: Option<Arc<Node>>,
}

struct Node {
    key: String,
    value: Box<dyn Any + Send + Sync>,
    next: Option<Arc<Node>>,
}

impl Bindings {
    /// Binds `value` under `key`. An existing binding for the same key stays
    /// in the chain but is shadowed by the new one.
    pub fn bind<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.head = Some(Arc::new(Node { key: key.into(), value: Box::new(value), next: self.head.take() }));
    }

    /// Returns the most recent binding for `key`, or `None` if the key is
    /// unbound or bound to a value of a different type.
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        let mut node = self.head.as_deref();
        while let Some(current) = node {
            if current.key == key {
                return current.value.downcast_ref::<T>();
            }
            node = current.next.as_deref();
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn clear(&mut self) {
        self.head = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_get_typed() {
        let mut bindings = Bindings::default();
        bindings.bind("user_id", 42_u64);
        bindings.bind("name", String::from("ada"));

        assert_eq!(bindings.get::<u64>("user_id"), Some(&42));
        assert_eq!(bindings.get::<String>("name"), Some(&String::from("ada")));
        assert_eq!(bindings.get::<u64>("missing"), None);
    }

    #[test]
    fn wrong_type_reads_none() {
        let mut bindings = Bindings::default();
        bindings.bind("user_id", 42_u64);
        assert_eq!(bindings.get::<String>("user_id"), None);
    }

    #[test]
    fn later_binding_shadows_earlier() {
        let mut bindings = Bindings::default();
        bindings.bind("stage", "first");
        bindings.bind("stage", "second");
        assert_eq!(bindings.get::<&str>("stage"), Some(&"second"));
    }

    #[test]
    fn clear_drops_the_chain() {
        let mut bindings = Bindings::default();
        bindings.bind("stage", "first");
        bindings.clear();
        assert!(bindings.is_empty());
        assert_eq!(bindings.get::<&str>("stage"), None);
    }
}

//! Attribute scope: ambient string attributes attached to created symbols.
//!
//! Scopes nest per thread. Entering a scope pushes the parent's attributes
//! merged with the new ones; dropping the returned guard pops it again.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// Attribute key/value pairs, ordered by key.
pub type Attrs = BTreeMap<String, String>;

thread_local! {
    static ATTR_STACK: RefCell<Vec<Attrs>> = RefCell::new(vec![Attrs::new()]);
}

/// A set of attributes to apply to every symbol created while it is active.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttrScope {
    attrs: Attrs,
}

impl AttrScope {
    pub fn new<I, K, V>(attrs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            attrs: attrs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Activate this scope on the current thread until the guard is dropped.
    pub fn enter(self) -> AttrScopeGuard {
        let depth = ATTR_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let mut merged = stack.last().cloned().unwrap_or_default();
            merged.extend(self.attrs);
            stack.push(merged);
            stack.len() - 1
        });
        AttrScopeGuard {
            depth,
            _not_send: PhantomData,
        }
    }

    /// Attributes of the innermost active scope.
    pub fn current() -> Attrs {
        ATTR_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_default())
    }

    /// Ambient attributes merged with an explicit override; explicit wins.
    pub fn current_merged(explicit: Option<&Attrs>) -> Attrs {
        let mut attrs = Self::current();
        if let Some(explicit) = explicit {
            attrs.extend(explicit.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        attrs
    }
}

/// Keeps an [`AttrScope`] active; pops it on drop.
#[must_use = "the attribute scope is popped as soon as the guard is dropped"]
pub struct AttrScopeGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for AttrScopeGuard {
    fn drop(&mut self) {
        ATTR_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            // Guards dropped out of order still restore the stack below them.
            stack.truncate(self.depth.max(1));
        });
    }
}

//! Name manager: unique, deterministic symbol names.
//!
//! Each manager keeps one counter per hint, so unnamed `Concat` calls yield
//! `concat0`, `concat1`, ... Managers nest per thread like attribute scopes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;

thread_local! {
    static NAME_STACK: RefCell<Vec<NameManager>> = RefCell::new(vec![NameManager::new()]);
}

#[derive(Clone, Debug, Default)]
pub struct NameManager {
    counter: HashMap<String, usize>,
    prefix: String,
}

impl NameManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager that prepends `prefix` to every name it hands out,
    /// explicit names included.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            counter: HashMap::new(),
            prefix: prefix.into(),
        }
    }

    /// Return `requested` if given, else a fresh name derived from `hint`.
    pub fn get(&mut self, requested: Option<&str>, hint: &str) -> String {
        let name = match requested {
            Some(name) => name.to_string(),
            None => {
                let n = self.counter.entry(hint.to_string()).or_insert(0);
                let name = format!("{hint}{n}");
                *n += 1;
                name
            }
        };
        format!("{}{name}", self.prefix)
    }

    /// Make this manager the active one on the current thread until the
    /// guard is dropped.
    pub fn enter(self) -> NameScopeGuard {
        let depth = NAME_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(self);
            stack.len() - 1
        });
        NameScopeGuard {
            depth,
            _not_send: PhantomData,
        }
    }

    /// Resolve a name with the active manager of the current thread.
    pub fn resolve(requested: Option<&str>, hint: &str) -> String {
        NAME_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last_mut() {
                Some(manager) => manager.get(requested, hint),
                None => NameManager::new().get(requested, hint),
            }
        })
    }
}

/// Keeps a [`NameManager`] active; pops it on drop.
#[must_use = "the name manager is popped as soon as the guard is dropped"]
pub struct NameScopeGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for NameScopeGuard {
    fn drop(&mut self) {
        NAME_STACK.with(|stack| stack.borrow_mut().truncate(self.depth.max(1)));
    }
}

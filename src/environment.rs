//! The global table of top-level bindings.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::program_representation::TermRef;

/// Maps names bound by top-level `name = expr` statements to their terms.
///
/// Parameters of abstractions never live here; they are resolved inside the
/// terms themselves. Defining a name again only affects later lookups.
#[derive(Debug, Default, Clone)]
pub struct Environment {
    bindings: HashMap<String, TermRef>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    /// Return the term bound to `name`, or `None` if it is not bound.
    pub fn lookup(&self, name: &str) -> Option<TermRef> {
        self.bindings.get(name).map(Rc::clone)
    }

    /// Bind `name` to `term`, replacing any previous binding.
    pub fn define(&mut self, name: impl Into<String>, term: TermRef) {
        self.bindings.insert(name.into(), term);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Every bound name together with every name occurring free in some
    /// definition. A parameter with one of these names could be confused
    /// with the global, or capture a name expanded from a definition.
    pub fn reserved_names(&self) -> HashSet<&str> {
        let mut names: HashSet<&str> = self.bindings.keys().map(String::as_str).collect();
        for term in self.bindings.values() {
            names.extend(term.free_variables());
        }
        names
    }
}

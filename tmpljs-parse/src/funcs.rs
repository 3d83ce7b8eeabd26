//! Function tables consulted while parsing.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::BuildHasher;

/// Names of the functions predefined by Go templates.
pub const BUILTINS: &[&str] = &[
    "and", "call", "html", "index", "slice", "js", "len", "not", "or", "print", "printf", "println",
    "urlquery", "eq", "ge", "gt", "le", "lt", "ne",
];

/// A set of function names an identifier in a template may refer to.
pub trait FuncNames {
    /// Whether `name` is a known function.
    fn has_func(&self, name: &str) -> bool;

    /// All known names, used to suggest a replacement for a typo.
    fn func_names(&self) -> Vec<&str>;
}

impl<T: FuncNames + ?Sized> FuncNames for &T {
    fn has_func(&self, name: &str) -> bool {
        (**self).has_func(name)
    }

    fn func_names(&self) -> Vec<&str> {
        (**self).func_names()
    }
}

impl FuncNames for [&str] {
    fn has_func(&self, name: &str) -> bool {
        self.iter().any(|known| *known == name)
    }

    fn func_names(&self) -> Vec<&str> {
        self.to_vec()
    }
}

impl<const N: usize> FuncNames for [&str; N] {
    fn has_func(&self, name: &str) -> bool {
        self.as_slice().has_func(name)
    }

    fn func_names(&self) -> Vec<&str> {
        self.to_vec()
    }
}

impl<V> FuncNames for BTreeMap<String, V> {
    fn has_func(&self, name: &str) -> bool {
        self.contains_key(name)
    }

    fn func_names(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }
}

impl<V, S: BuildHasher> FuncNames for HashMap<String, V, S> {
    fn has_func(&self, name: &str) -> bool {
        self.contains_key(name)
    }

    fn func_names(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }
}

impl FuncNames for BTreeSet<String> {
    fn has_func(&self, name: &str) -> bool {
        self.contains(name)
    }

    fn func_names(&self) -> Vec<&str> {
        self.iter().map(String::as_str).collect()
    }
}

impl<S: BuildHasher> FuncNames for HashSet<String, S> {
    fn has_func(&self, name: &str) -> bool {
        self.contains(name)
    }

    fn func_names(&self) -> Vec<&str> {
        self.iter().map(String::as_str).collect()
    }
}

/// The known name closest to `unknown`, if any is close enough to be a
/// plausible typo.
#[cfg(feature = "suggestions")]
pub(crate) fn suggest<F: FuncNames + ?Sized>(unknown: &str, funcs: &F) -> Option<String> {
    const SIMILARITY_THRESHOLD: f64 = 0.6;

    let mut best_match: Option<(&str, f64)> = None;
    for known in funcs.func_names() {
        let similarity = strsim::jaro_winkler(unknown, known);
        if similarity >= SIMILARITY_THRESHOLD
            && best_match.is_none_or(|(_, best_sim)| similarity > best_sim)
        {
            best_match = Some((known, similarity));
        }
    }
    best_match.map(|(name, _)| name.to_string())
}

/// Without the `suggestions` feature there are never suggestions.
#[cfg(not(feature = "suggestions"))]
pub(crate) fn suggest<F: FuncNames + ?Sized>(_unknown: &str, _funcs: &F) -> Option<String> {
    None
}

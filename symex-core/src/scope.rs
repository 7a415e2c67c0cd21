use std::collections::HashMap;

use crate::error::{ErrorKind, ResolveError};

/// Stack of block frames. Lookup walks frames from the innermost outwards;
/// insertion always targets the innermost frame.
#[derive(Clone, Debug)]
pub struct ScopeStack<T> {
    frames: Vec<HashMap<String, T>>,
}

impl<T> Default for ScopeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ScopeStack<T> {
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            let _ = self.frames.pop();
        }
    }

    /// Run `f` inside a fresh frame. The frame is dropped whatever `f` returns.
    pub fn scoped<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push();
        let out = f(self);
        self.pop();
        out
    }

    /// Number of frames above the outermost one.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Bind `name` in the innermost frame. `_` is never bound.
    pub fn insert(&mut self, name: &str, value: T) -> Result<(), ResolveError> {
        if name == "_" {
            return Ok(());
        }
        let Some(top) = self.frames.last_mut() else {
            return Ok(());
        };
        if top.contains_key(name) {
            return Err(ResolveError::new(
                ErrorKind::DuplicateSymbol,
                name,
                format!("{name} redeclared in this block"),
            ));
        }
        top.insert(name.to_string(), value);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }

    pub fn in_top_frame(&self, name: &str) -> bool {
        self.frames.last().is_some_and(|f| f.contains_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_names_vanish_on_exit() {
        let mut s = ScopeStack::new();
        s.insert("x", 1).expect("outer");
        s.scoped(|s| {
            s.insert("x", 2).expect("shadow");
            s.insert("y", 3).expect("inner");
            assert_eq!(s.lookup("x"), Some(&2));
            assert_eq!(s.depth(), 1);
        });
        assert_eq!(s.lookup("x"), Some(&1));
        assert_eq!(s.lookup("y"), None);
        assert_eq!(s.depth(), 0);
    }

    #[test]
    fn same_frame_redeclaration_fails() {
        let mut s = ScopeStack::new();
        s.insert("x", ()).expect("first");
        let err = s.insert("x", ()).expect_err("second");
        assert_eq!(err.kind, ErrorKind::DuplicateSymbol);
        s.insert("_", ()).expect("blank");
        s.insert("_", ()).expect("blank again");
    }
}

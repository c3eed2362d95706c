use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Template label name → concrete label
pub type LabelMap = FxHashMap<Rc<str>, Rc<str>>;

/// Source of fresh label and temporary names.
///
/// Every name is `prefix` followed by a counter, so names from one
/// generator never repeat. One generator is shared by everything that
/// rewrites code for an interpreter, including code typed at the shell.
#[derive(Debug, Clone)]
pub struct LabelGen {
    prefix: Rc<str>,
    next: usize,
}

impl LabelGen {
    pub fn new(prefix: impl Into<Rc<str>>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }

    pub fn fresh(&mut self) -> Rc<str> {
        let name = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        name.into()
    }

    /// Whether `name` could have come from this generator
    pub fn is_generated(&self, name: &str) -> bool {
        name.strip_prefix(&*self.prefix)
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_names_are_unique_and_recognized() {
        let mut labels = LabelGen::new("___l");
        let a = labels.fresh();
        let b = labels.fresh();

        assert_ne!(a, b);
        assert!(labels.is_generated(&a));
        assert!(!labels.is_generated("___lx"));
        assert!(!labels.is_generated("count"));
    }
}

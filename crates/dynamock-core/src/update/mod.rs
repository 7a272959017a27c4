//! Per-attribute update directives.
//!
//! [`Updates`] keeps directives in the order they were added. Naming an
//! attribute again replaces its earlier directive in place.

mod apply;
mod compile;

use std::fmt;

use dynamock_model::AttributeValue;

pub use compile::CompiledUpdate;

/// What to do with one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateDirective {
    /// Store the value.
    Put(AttributeValue),
    /// Add to a number, or union into a set.
    Increment(AttributeValue),
    /// Remove the attribute, or subtract a set from it.
    Delete(Option<AttributeValue>),
}

impl UpdateDirective {
    /// The update expression clause this directive renders into.
    #[must_use]
    pub fn action(&self) -> UpdateAction {
        match self {
            Self::Put(_) => UpdateAction::Set,
            Self::Increment(_) => UpdateAction::Add,
            Self::Delete(Some(_)) => UpdateAction::Delete,
            Self::Delete(None) => UpdateAction::Remove,
        }
    }

    /// The operand value, if the directive carries one.
    #[must_use]
    pub fn value(&self) -> Option<&AttributeValue> {
        match self {
            Self::Put(v) | Self::Increment(v) | Self::Delete(Some(v)) => Some(v),
            Self::Delete(None) => None,
        }
    }
}

/// Update expression clause keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateAction {
    /// `SET a = :v`
    Set,
    /// `ADD a :v`
    Add,
    /// `REMOVE a`
    Remove,
    /// `DELETE a :v`
    Delete,
}

impl UpdateAction {
    /// The clause keyword.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "SET",
            Self::Add => "ADD",
            Self::Remove => "REMOVE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered set of update directives keyed by attribute name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Updates {
    entries: Vec<(String, UpdateDirective)>,
}

impl Updates {
    /// No directives.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the directive for `name`.
    pub fn set(&mut self, name: impl Into<String>, directive: UpdateDirective) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = directive;
        } else {
            self.entries.push((name, directive));
        }
    }

    /// Chains a `Put`.
    #[must_use]
    pub fn put(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, UpdateDirective::Put(value.into()));
        self
    }

    /// Chains an `Increment`.
    #[must_use]
    pub fn increment(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, UpdateDirective::Increment(value.into()));
        self
    }

    /// Chains a set subtraction.
    #[must_use]
    pub fn delete_value(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, UpdateDirective::Delete(Some(value.into())));
        self
    }

    /// Chains removal of the attribute.
    #[must_use]
    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.set(name, UpdateDirective::Delete(None));
        self
    }

    /// The directive for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&UpdateDirective> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    /// True when `name` has a directive.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Directives in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &UpdateDirective)> {
        self.entries.iter().map(|(n, d)| (n, d))
    }

    /// Attribute names in insertion order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of directives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no directives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, UpdateDirective)> for Updates {
    fn from_iter<I: IntoIterator<Item = (S, UpdateDirective)>>(iter: I) -> Self {
        let mut updates = Self::new();
        for (name, directive) in iter {
            updates.set(name, directive);
        }
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_keep_insertion_order_and_replace_in_place() {
        let updates = Updates::new()
            .put("a", 1_i64)
            .remove("b")
            .increment("a", 2_i64);
        let names: Vec<_> = updates.attribute_names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(
            updates.get("a"),
            Some(&UpdateDirective::Increment(AttributeValue::from(2_i64)))
        );
    }

    #[test]
    fn test_should_map_directives_to_actions() {
        assert_eq!(UpdateDirective::Put("x".into()).action(), UpdateAction::Set);
        assert_eq!(UpdateDirective::Increment(1_i64.into()).action(), UpdateAction::Add);
        assert_eq!(UpdateDirective::Delete(None).action(), UpdateAction::Remove);
        assert_eq!(
            UpdateDirective::Delete(Some(AttributeValue::Ss(vec!["x".to_owned()]))).action(),
            UpdateAction::Delete
        );
    }
}

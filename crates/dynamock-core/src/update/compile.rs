//! Rendering of update directives to an update expression.

use std::collections::HashMap;

use dynamock_model::AttributeValue;

use super::{UpdateAction, Updates};
use crate::expression::AliasCounter;
use crate::naming;

/// Wire form of a set of updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledUpdate {
    /// The `UpdateExpression` string. Empty when there are no directives.
    pub expression: String,
    /// Aliases needed by the expression.
    pub attribute_names: HashMap<String, String>,
    /// Values bound to `:U<n>` placeholders.
    pub attribute_values: HashMap<String, AttributeValue>,
}

impl Updates {
    /// Groups directives into `SET`, `ADD`, `REMOVE` and `DELETE` clauses,
    /// in order of first appearance, drawing placeholders from `counter`.
    #[must_use]
    pub fn compile(&self, counter: &mut AliasCounter) -> CompiledUpdate {
        let mut out = CompiledUpdate::default();
        let mut groups: Vec<(UpdateAction, Vec<String>)> = Vec::new();

        for (name, directive) in self.iter() {
            let attr = naming::alias(name);
            if naming::needs_alias(name) {
                out.attribute_names.insert(attr.clone(), name.clone());
            }

            let action = directive.action();
            let clause = match directive.value() {
                Some(value) => {
                    let placeholder = format!(":{}", counter.update_token());
                    out.attribute_values.insert(placeholder.clone(), value.clone());
                    if action == UpdateAction::Set {
                        format!("{attr} = {placeholder}")
                    } else {
                        format!("{attr} {placeholder}")
                    }
                }
                None => attr,
            };

            match groups.iter_mut().find(|(a, _)| *a == action) {
                Some((_, clauses)) => clauses.push(clause),
                None => groups.push((action, vec![clause])),
            }
        }

        out.expression = groups
            .into_iter()
            .map(|(action, clauses)| format!("{action} {}", clauses.join(",")))
            .collect::<Vec<_>>()
            .join(" ");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_group_clauses_by_action() {
        let updates = Updates::new()
            .put("nick", "ace")
            .increment("age", 1_i64)
            .put("status", "active")
            .remove("column")
            .delete_value("tags", AttributeValue::Ss(vec!["x".to_owned()]));
        let mut counter = AliasCounter::new();
        let compiled = updates.compile(&mut counter);

        assert_eq!(
            compiled.expression,
            "SET nick = :U1,#status = :U3 ADD age :U2 REMOVE #column DELETE tags :U4"
        );
        assert_eq!(compiled.attribute_names["#status"], "status");
        assert_eq!(compiled.attribute_names["#column"], "column");
        assert_eq!(compiled.attribute_values.len(), 4);
        assert_eq!(compiled.attribute_values[":U2"], AttributeValue::from(1_i64));
    }

    #[test]
    fn test_should_compile_nothing_to_empty_expression() {
        let mut counter = AliasCounter::new();
        let compiled = Updates::new().compile(&mut counter);
        assert!(compiled.expression.is_empty());
        assert!(compiled.attribute_values.is_empty());
    }

    #[test]
    fn test_should_continue_shared_counter() {
        let mut counter = AliasCounter::new();
        counter.next_id();
        let compiled = Updates::new().put("a", 1_i64).compile(&mut counter);
        assert_eq!(compiled.expression, "SET a = :U2");
    }
}

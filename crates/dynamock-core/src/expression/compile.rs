//! Alias assignment and rendering of condition trees to expression strings.

use std::collections::HashMap;

use dynamock_model::{AttributeValue, EngineError, Item};

use super::{AliasCounter, Expression, Operator, arity_error};
use crate::naming;

/// An [`Expression`] whose nodes carry unique tokens.
///
/// Operators hold a `C<n>` token and literals a `:V<n>` placeholder, handed
/// out in post-order from the counter passed to
/// [`Expression::assign_unique_names`].
#[derive(Debug, Clone)]
pub struct AssignedExpression<'a> {
    source: &'a Expression,
    root: Node<'a>,
}

#[derive(Debug, Clone)]
enum Node<'a> {
    Operator {
        op: Operator,
        token: String,
        children: Vec<Node<'a>>,
    },
    Attribute(&'a str),
    Literal {
        placeholder: String,
        value: &'a AttributeValue,
    },
}

impl Expression {
    /// Gives every node of the tree a unique token drawn from `counter`.
    ///
    /// Sub-expressions that end up in the same request must share one
    /// counter.
    pub fn assign_unique_names(&self, counter: &mut AliasCounter) -> AssignedExpression<'_> {
        AssignedExpression {
            source: self,
            root: assign(self, counter),
        }
    }
}

fn assign<'a>(expr: &'a Expression, counter: &mut AliasCounter) -> Node<'a> {
    match expr {
        Expression::Operator { op, children } => {
            let children = children.iter().map(|c| assign(c, counter)).collect();
            Node::Operator {
                op: *op,
                token: counter.condition_token(),
                children,
            }
        }
        Expression::Attribute(name) => Node::Attribute(name),
        Expression::Literal(value) => Node::Literal {
            placeholder: counter.value_placeholder(),
            value,
        },
    }
}

impl AssignedExpression<'_> {
    /// The tree the tokens were assigned to.
    #[must_use]
    pub fn expression(&self) -> &Expression {
        self.source
    }

    /// Token of the root node.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match &self.root {
            Node::Operator { token, .. } => Some(token),
            Node::Literal { placeholder, .. } => Some(placeholder),
            Node::Attribute(_) => None,
        }
    }

    /// Renders the wire expression string.
    ///
    /// # Errors
    ///
    /// Returns a validation error when an operator has the wrong operands.
    pub fn compile_to_string(&self) -> Result<String, EngineError> {
        self.source.validate()?;
        render(&self.root)
    }

    /// Alias to attribute name, for every referenced name that needs one.
    #[must_use]
    pub fn collect_attribute_names(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        visit(&self.root, &mut |node| {
            if let Node::Attribute(name) = node {
                if naming::needs_alias(name) {
                    out.insert(naming::alias(name), (*name).to_owned());
                }
            }
        });
        out
    }

    /// Placeholder to value, one entry per literal node.
    #[must_use]
    pub fn collect_attribute_values(&self) -> HashMap<String, AttributeValue> {
        let mut out = HashMap::new();
        visit(&self.root, &mut |node| {
            if let Node::Literal { placeholder, value } = node {
                out.insert(placeholder.clone(), (*value).clone());
            }
        });
        out
    }

    /// Evaluates the underlying tree against `item`.
    ///
    /// # Errors
    ///
    /// See [`Expression::evaluate`].
    pub fn evaluate(&self, item: &Item) -> Result<bool, EngineError> {
        self.source.evaluate(item)
    }
}

fn visit<'a>(node: &Node<'a>, f: &mut impl FnMut(&Node<'a>)) {
    if let Node::Operator { children, .. } = node {
        for child in children {
            visit(child, f);
        }
    }
    f(node);
}

fn render(node: &Node<'_>) -> Result<String, EngineError> {
    match node {
        Node::Attribute(name) => Ok(naming::alias(name)),
        Node::Literal { placeholder, .. } => Ok(placeholder.clone()),
        Node::Operator { op, children, .. } => render_operator(*op, children),
    }
}

fn render_operator(op: Operator, children: &[Node<'_>]) -> Result<String, EngineError> {
    let mut parts = children.iter().map(render).collect::<Result<Vec<_>, _>>()?;

    if op.is_junction() {
        parts.retain(|p| !p.is_empty());
        return match (op, parts.len()) {
            (Operator::Not, 1) => Ok(format!("(NOT {})", parts[0])),
            (Operator::Not, _) => Err(arity_error(op)),
            (_, 0) => Ok(String::new()),
            (_, 1) => Ok(parts.swap_remove(0)),
            _ => Ok(format!("({})", parts.join(&*format!(" {op} ")))),
        };
    }

    let rendered = match (op, parts.as_slice()) {
        (Operator::Eq, [a, v]) => format!("({a} = {v})"),
        (Operator::Ne, [a, v]) => format!("({a} <> {v})"),
        (Operator::Le, [a, v]) => format!("({a} <= {v})"),
        (Operator::Lt, [a, v]) => format!("({a} < {v})"),
        (Operator::Ge, [a, v]) => format!("({a} >= {v})"),
        (Operator::Gt, [a, v]) => format!("({a} > {v})"),
        (Operator::BeginsWith, [a, v]) => format!("begins_with({a}, {v})"),
        (Operator::Between, [a, low, high]) => format!("({a} BETWEEN {low} AND {high})"),
        (Operator::In, [a, rest @ ..]) if !rest.is_empty() => {
            format!("({a} IN ({}))", rest.join(", "))
        }
        (Operator::Contains, [a, v]) => format!("contains({a}, {v})"),
        (Operator::NotContains, [a, v]) => {
            format!("(attribute_exists({a}) AND NOT contains({a}, {v}))")
        }
        (Operator::Null, [a]) => format!("attribute_not_exists({a})"),
        (Operator::NotNull, [a]) => format!("attribute_exists({a})"),
        _ => return Err(arity_error(op)),
    };
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(expr: &Expression) -> String {
        let mut counter = AliasCounter::new();
        expr.assign_unique_names(&mut counter)
            .compile_to_string()
            .unwrap()
    }

    #[test]
    fn test_should_render_key_condition_with_reserved_name() {
        let expr = Expression::all(vec![
            Expression::eq("userId", "userA"),
            Expression::begins_with("column", "@"),
        ]);
        let mut counter = AliasCounter::new();
        let assigned = expr.assign_unique_names(&mut counter);

        assert_eq!(
            assigned.compile_to_string().unwrap(),
            "((userId = :V1) AND begins_with(#column, :V3))"
        );
        assert_eq!(assigned.token(), Some("C5"));

        let names = assigned.collect_attribute_names();
        assert_eq!(names.len(), 1);
        assert_eq!(names["#column"], "column");

        let values = assigned.collect_attribute_values();
        assert_eq!(values[":V1"], AttributeValue::from("userA"));
        assert_eq!(values[":V3"], AttributeValue::from("@"));
    }

    #[test]
    fn test_should_render_every_comparison_symbol() {
        assert_eq!(compile(&Expression::eq("a", 1_i64)), "(a = :V1)");
        assert_eq!(compile(&Expression::ne("a", 1_i64)), "(a <> :V1)");
        assert_eq!(compile(&Expression::le("a", 1_i64)), "(a <= :V1)");
        assert_eq!(compile(&Expression::lt("a", 1_i64)), "(a < :V1)");
        assert_eq!(compile(&Expression::ge("a", 1_i64)), "(a >= :V1)");
        assert_eq!(compile(&Expression::gt("a", 1_i64)), "(a > :V1)");
    }

    #[test]
    fn test_should_render_functions_and_ranges() {
        assert_eq!(
            compile(&Expression::between("age", 1_i64, 9_i64)),
            "(age BETWEEN :V1 AND :V2)"
        );
        assert_eq!(
            compile(&Expression::is_in(
                "age",
                vec![AttributeValue::from(1_i64), AttributeValue::from(2_i64)]
            )),
            "(age IN (:V1, :V2))"
        );
        assert_eq!(compile(&Expression::contains("tags", "x")), "contains(tags, :V1)");
        assert_eq!(
            compile(&Expression::not_contains("tags", "x")),
            "(attribute_exists(tags) AND NOT contains(tags, :V1))"
        );
        assert_eq!(compile(&Expression::null("age")), "attribute_not_exists(age)");
        assert_eq!(compile(&Expression::not_null("age")), "attribute_exists(age)");
    }

    #[test]
    fn test_should_render_junctions() {
        assert_eq!(compile(&Expression::all(vec![])), "");
        assert_eq!(
            compile(&Expression::any(vec![Expression::null("a")])),
            "attribute_not_exists(a)"
        );
        assert_eq!(
            compile(&Expression::negate(Expression::any(vec![
                Expression::null("a"),
                Expression::null("b"),
            ]))),
            "(NOT (attribute_not_exists(a) OR attribute_not_exists(b)))"
        );
    }

    #[test]
    fn test_should_key_values_by_token_not_attribute() {
        let expr = Expression::all(vec![Expression::gt("age", 1_i64), Expression::lt("age", 9_i64)]);
        let mut counter = AliasCounter::new();
        let values = expr.assign_unique_names(&mut counter).collect_attribute_values();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_should_not_collide_across_shared_counter() {
        let mut counter = AliasCounter::new();
        let first = Expression::eq("a", 1_i64);
        let second = Expression::eq("a", 2_i64);
        let a = first.assign_unique_names(&mut counter);
        let b = second.assign_unique_names(&mut counter);
        assert_eq!(a.compile_to_string().unwrap(), "(a = :V1)");
        assert_eq!(b.compile_to_string().unwrap(), "(a = :V3)");
    }

    #[test]
    fn test_should_hex_alias_odd_names() {
        let expr = Expression::eq("first-name", "x");
        let mut counter = AliasCounter::new();
        let assigned = expr.assign_unique_names(&mut counter);
        assert_eq!(
            assigned.compile_to_string().unwrap(),
            "(#66697273742d6e616d65 = :V1)"
        );
        assert_eq!(assigned.collect_attribute_names()["#66697273742d6e616d65"], "first-name");
    }

    #[test]
    fn test_should_reject_malformed_operator() {
        let expr = Expression::Operator {
            op: Operator::Between,
            children: vec![Expression::Attribute("a".to_owned())],
        };
        let mut counter = AliasCounter::new();
        assert!(expr.assign_unique_names(&mut counter).compile_to_string().is_err());
    }

    #[test]
    fn test_should_reject_nested_empty_junctions_in_both_forms() {
        let item: dynamock_model::Item =
            [("a".to_owned(), AttributeValue::from(1_i64))].into_iter().collect();
        for expr in [
            Expression::all(vec![Expression::any(vec![]), Expression::eq("a", 1_i64)]),
            Expression::any(vec![Expression::all(vec![]), Expression::eq("a", 2_i64)]),
            Expression::negate(Expression::all(vec![])),
            Expression::any(vec![]),
        ] {
            let mut counter = AliasCounter::new();
            let assigned = expr.assign_unique_names(&mut counter);
            assert!(assigned.compile_to_string().is_err());
            assert!(assigned.evaluate(&item).is_err());
        }

        let root = Expression::all(vec![]);
        let mut counter = AliasCounter::new();
        let assigned = root.assign_unique_names(&mut counter);
        assert_eq!(assigned.compile_to_string().unwrap(), "");
        assert!(assigned.evaluate(&item).unwrap());
    }
}

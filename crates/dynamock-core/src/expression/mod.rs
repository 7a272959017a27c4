//! Condition expression trees.
//!
//! An [`Expression`] is built once, then either evaluated directly against an
//! item or given unique alias tokens with [`Expression::assign_unique_names`]
//! and compiled to the wire expression string.
//!
//! ```text
//! Expression --assign_unique_names(&mut AliasCounter)--> AssignedExpression
//!     |                                                      |
//!  evaluate(item)                              compile_to_string / collect_*
//! ```

mod compile;
mod evaluator;
pub mod parser;

use std::fmt;
use std::str::FromStr;

use dynamock_model::{AttributeValue, EngineError};

pub use compile::AssignedExpression;
pub use evaluator::{compare_values, parse_number};
pub(crate) use evaluator::{compare_numbers, normalize};
pub(crate) use evaluator::format_number;
pub use parser::{ExpressionError, parse_condition, parse_projection, parse_update};

/// Operators of a condition tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `a = v`
    Eq,
    /// `a <> v`
    Ne,
    /// `a <= v`
    Le,
    /// `a < v`
    Lt,
    /// `a >= v`
    Ge,
    /// `a > v`
    Gt,
    /// `begins_with(a, v)`
    BeginsWith,
    /// `a BETWEEN v0 AND v1`
    Between,
    /// `a IN (v0, ...)`
    In,
    /// `contains(a, v)`
    Contains,
    /// The attribute exists and does not contain the value.
    NotContains,
    /// `attribute_not_exists(a)`
    Null,
    /// `attribute_exists(a)`
    NotNull,
    /// Conjunction of any number of children.
    And,
    /// Disjunction of any number of children.
    Or,
    /// Negation of a single child.
    Not,
}

impl Operator {
    /// Returns the operator name as used by the legacy parameters.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Le => "LE",
            Self::Lt => "LT",
            Self::Ge => "GE",
            Self::Gt => "GT",
            Self::BeginsWith => "BEGINS_WITH",
            Self::Between => "BETWEEN",
            Self::In => "IN",
            Self::Contains => "CONTAINS",
            Self::NotContains => "NOT_CONTAINS",
            Self::Null => "NULL",
            Self::NotNull => "NOT_NULL",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
        }
    }

    /// True for operators that join other expressions.
    #[must_use]
    pub fn is_junction(&self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Not)
    }

    /// True for the six binary comparisons.
    #[must_use]
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Le | Self::Lt | Self::Ge | Self::Gt
        )
    }

    /// Number of literal operands an attribute predicate takes, or `None`
    /// when any non-zero number is accepted.
    #[must_use]
    pub fn literal_arity(&self) -> Option<usize> {
        match self {
            Self::Null | Self::NotNull => Some(0),
            Self::Between => Some(2),
            Self::In | Self::And | Self::Or | Self::Not => None,
            _ => Some(1),
        }
    }
}

impl FromStr for Operator {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "EQ" => Self::Eq,
            "NE" => Self::Ne,
            "LE" => Self::Le,
            "LT" => Self::Lt,
            "GE" => Self::Ge,
            "GT" => Self::Gt,
            "BEGINS_WITH" => Self::BeginsWith,
            "BETWEEN" => Self::Between,
            "IN" => Self::In,
            "CONTAINS" => Self::Contains,
            "NOT_CONTAINS" => Self::NotContains,
            "NULL" => Self::Null,
            "NOT_NULL" => Self::NotNull,
            "AND" => Self::And,
            "OR" => Self::Or,
            "NOT" => Self::Not,
            other => return Err(EngineError::invalid_operator(other)),
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic source of alias tokens shared by every sub-expression of one
/// request, so condition, filter and update placeholders never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasCounter {
    next: u64,
}

impl AliasCounter {
    /// A counter starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns the next value and advances.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Next condition token, `C<n>`.
    pub fn condition_token(&mut self) -> String {
        format!("C{}", self.next_id())
    }

    /// Next update token, `U<n>`.
    pub fn update_token(&mut self) -> String {
        format!("U{}", self.next_id())
    }

    /// Next value placeholder, `:V<n>`.
    pub fn value_placeholder(&mut self) -> String {
        format!(":V{}", self.next_id())
    }
}

impl Default for AliasCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A node of a condition tree.
///
/// Attribute predicates are operators whose first child is an
/// [`Expression::Attribute`] and whose remaining children are literals.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// An operator applied to its children.
    Operator {
        /// The operator.
        op: Operator,
        /// Operands, in order.
        children: Vec<Expression>,
    },
    /// A reference to a top-level attribute.
    Attribute(String),
    /// A literal value.
    Literal(AttributeValue),
}

impl Expression {
    fn predicate(op: Operator, name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        let mut children = Vec::with_capacity(values.len() + 1);
        children.push(Self::Attribute(name.into()));
        children.extend(values.into_iter().map(Self::Literal));
        Self::Operator { op, children }
    }

    /// `name = value`
    pub fn eq(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::predicate(Operator::Eq, name, vec![value.into()])
    }

    /// `name <> value`
    pub fn ne(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::predicate(Operator::Ne, name, vec![value.into()])
    }

    /// `name < value`
    pub fn lt(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::predicate(Operator::Lt, name, vec![value.into()])
    }

    /// `name <= value`
    pub fn le(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::predicate(Operator::Le, name, vec![value.into()])
    }

    /// `name > value`
    pub fn gt(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::predicate(Operator::Gt, name, vec![value.into()])
    }

    /// `name >= value`
    pub fn ge(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::predicate(Operator::Ge, name, vec![value.into()])
    }

    /// `begins_with(name, prefix)`
    pub fn begins_with(name: impl Into<String>, prefix: impl Into<AttributeValue>) -> Self {
        Self::predicate(Operator::BeginsWith, name, vec![prefix.into()])
    }

    /// `name BETWEEN low AND high`
    pub fn between(
        name: impl Into<String>,
        low: impl Into<AttributeValue>,
        high: impl Into<AttributeValue>,
    ) -> Self {
        Self::predicate(Operator::Between, name, vec![low.into(), high.into()])
    }

    /// `name IN (values...)`
    pub fn is_in(name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self::predicate(Operator::In, name, values)
    }

    /// `contains(name, value)`
    pub fn contains(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::predicate(Operator::Contains, name, vec![value.into()])
    }

    /// Attribute exists and does not contain `value`.
    pub fn not_contains(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::predicate(Operator::NotContains, name, vec![value.into()])
    }

    /// `attribute_not_exists(name)`
    pub fn null(name: impl Into<String>) -> Self {
        Self::predicate(Operator::Null, name, Vec::new())
    }

    /// `attribute_exists(name)`
    pub fn not_null(name: impl Into<String>) -> Self {
        Self::predicate(Operator::NotNull, name, Vec::new())
    }

    /// Conjunction of `children`.
    #[must_use]
    pub fn all(children: Vec<Expression>) -> Self {
        Self::Operator {
            op: Operator::And,
            children,
        }
    }

    /// Disjunction of `children`.
    #[must_use]
    pub fn any(children: Vec<Expression>) -> Self {
        Self::Operator {
            op: Operator::Or,
            children,
        }
    }

    /// Negation of `inner`.
    #[must_use]
    pub fn negate(inner: Expression) -> Self {
        Self::Operator {
            op: Operator::Not,
            children: vec![inner],
        }
    }

    /// Builds an attribute predicate from an operator name such as `"EQ"`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperator` for an unknown operator name or a junction,
    /// and a validation error when the operand count does not fit.
    pub fn condition(
        name: impl Into<String>,
        operator: &str,
        values: Vec<AttributeValue>,
    ) -> Result<Self, EngineError> {
        let op: Operator = operator.parse()?;
        if op.is_junction() {
            return Err(EngineError::invalid_operator(operator));
        }
        let expr = Self::predicate(op, name, values);
        expr.validate()?;
        Ok(expr)
    }

    /// Joins optional sub-expressions with AND, dropping absent ones.
    ///
    /// Returns `None` when nothing remains and the single expression itself
    /// when only one does.
    #[must_use]
    pub fn and_all(parts: impl IntoIterator<Item = Option<Expression>>) -> Option<Self> {
        let mut children: Vec<Expression> = parts.into_iter().flatten().collect();
        match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(Self::all(children)),
        }
    }

    /// Checks operand shapes for every operator in the tree.
    ///
    /// An empty AND is accepted only as the root, where it stands for "no
    /// condition". Any other empty junction is rejected: it has no wire form.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first malformed operator.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.validate_node(true)
    }

    fn validate_node(&self, root: bool) -> Result<(), EngineError> {
        let Self::Operator { op, children } = self else {
            return Ok(());
        };
        if op.is_junction() {
            match op {
                Operator::Not if children.len() != 1 => return Err(arity_error(*op)),
                Operator::And if children.is_empty() && root => return Ok(()),
                Operator::And | Operator::Or if children.is_empty() => {
                    return Err(EngineError::validation(format!(
                        "{op} requires at least one operand"
                    )));
                }
                _ => {}
            }
            return children.iter().try_for_each(|c| c.validate_node(false));
        }
        let Some((Self::Attribute(_), literals)) = children.split_first() else {
            return Err(EngineError::validation(format!(
                "{op} expects an attribute as its first operand"
            )));
        };
        if !literals.iter().all(|c| matches!(c, Self::Literal(_))) {
            return Err(EngineError::validation(format!(
                "{op} expects literal values after the attribute"
            )));
        }
        let fits = match op.literal_arity() {
            Some(n) => literals.len() == n,
            None => !literals.is_empty(),
        };
        if fits { Ok(()) } else { Err(arity_error(*op)) }
    }

    /// Names of every attribute referenced by the tree, in order of appearance.
    #[must_use]
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk_attributes(&mut out);
        out
    }

    fn walk_attributes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Attribute(name) => out.push(name),
            Self::Operator { children, .. } => {
                for child in children {
                    child.walk_attributes(out);
                }
            }
            Self::Literal(_) => {}
        }
    }

    /// True when the tree references `name`.
    #[must_use]
    pub fn references(&self, name: &str) -> bool {
        self.attribute_names().contains(&name)
    }
}

pub(crate) fn arity_error(op: Operator) -> EngineError {
    EngineError::validation(format!("Invalid number of argument(s) for the {op} ComparisonOperator"))
}

#[cfg(test)]
mod tests {
    use dynamock_model::ErrorCode;

    use super::*;

    #[test]
    fn test_should_parse_operator_names() {
        assert_eq!("BEGINS_WITH".parse::<Operator>().unwrap(), Operator::BeginsWith);
        let err = "LIKE".parse::<Operator>().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOperator);
        assert_eq!(err.message, "Invalid comparison operator 'LIKE'");
    }

    #[test]
    fn test_should_count_aliases_from_one() {
        let mut counter = AliasCounter::new();
        assert_eq!(counter.condition_token(), "C1");
        assert_eq!(counter.value_placeholder(), ":V2");
        assert_eq!(counter.update_token(), "U3");
    }

    #[test]
    fn test_should_build_condition_from_operator_name() {
        let expr = Expression::condition("age", "GT", vec![AttributeValue::from(3_i64)]).unwrap();
        assert_eq!(expr, Expression::gt("age", 3_i64));
    }

    #[test]
    fn test_should_reject_wrong_operand_count() {
        let err = Expression::condition("age", "BETWEEN", vec![AttributeValue::from(1_i64)])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationException);

        let err = Expression::condition("age", "AND", vec![]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOperator);
    }

    #[test]
    fn test_should_join_optional_parts() {
        assert!(Expression::and_all([None, None]).is_none());
        let single = Expression::and_all([Some(Expression::null("a")), None]).unwrap();
        assert_eq!(single, Expression::null("a"));
        let both = Expression::and_all([Some(Expression::null("a")), Some(Expression::null("b"))])
            .unwrap();
        assert_eq!(both.attribute_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_should_detect_referenced_attributes() {
        let expr = Expression::all(vec![
            Expression::eq("userId", "userA"),
            Expression::negate(Expression::contains("tags", "x")),
        ]);
        assert!(expr.references("tags"));
        assert!(!expr.references("column"));
        assert!(expr.validate().is_ok());
    }
}

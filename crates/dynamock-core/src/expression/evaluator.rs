//! Direct evaluation of condition trees against an item.
//!
//! Predicates on an absent attribute are false, except `NULL` which tests for
//! absence. Values of different types are never equal.

use std::cmp::Ordering;

use dynamock_model::{AttributeValue, EngineError, Item};

use super::{Expression, Operator, arity_error};

impl Expression {
    /// Evaluates the tree against `item`. An absent item is an empty map.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed tree (see
    /// [`Expression::validate`]) and `TypeMismatch` when `begins_with` or
    /// `contains` meet operands they cannot compare.
    pub fn evaluate(&self, item: &Item) -> Result<bool, EngineError> {
        self.validate()?;
        self.eval(item)
    }

    fn eval(&self, item: &Item) -> Result<bool, EngineError> {
        match self {
            Self::Operator { op, children } => eval_operator(*op, children, item),
            Self::Attribute(_) | Self::Literal(_) => Err(EngineError::validation(
                "A condition must be an operator, not a bare operand",
            )),
        }
    }
}

fn eval_operator(op: Operator, children: &[Expression], item: &Item) -> Result<bool, EngineError> {
    match op {
        Operator::And => {
            for child in children {
                if !child.eval(item)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Operator::Or => {
            for child in children {
                if child.eval(item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Operator::Not => match children {
            [inner] => inner.eval(item).map(|v| !v),
            _ => Err(arity_error(op)),
        },
        _ => eval_predicate(op, children, item),
    }
}

fn eval_predicate(op: Operator, children: &[Expression], item: &Item) -> Result<bool, EngineError> {
    let Some((Expression::Attribute(name), rest)) = children.split_first() else {
        return Err(EngineError::validation(format!(
            "{op} expects an attribute as its first operand"
        )));
    };
    let values = rest
        .iter()
        .map(|c| match c {
            Expression::Literal(v) => Ok(v),
            _ => Err(EngineError::validation(format!(
                "{op} expects literal values after the attribute"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let fits = match op.literal_arity() {
        Some(n) => values.len() == n,
        None => !values.is_empty(),
    };
    if !fits {
        return Err(arity_error(op));
    }

    let current = item.get(name.as_str());
    match op {
        Operator::Null => return Ok(current.is_none()),
        Operator::NotNull => return Ok(current.is_some()),
        _ => {}
    }
    let Some(current) = current else {
        return Ok(false);
    };

    match (op, values.as_slice()) {
        (Operator::BeginsWith, [prefix]) => begins_with(current, prefix),
        (Operator::Between, [low, high]) => Ok(compare_values(current, low, Operator::Ge)?
            && compare_values(current, high, Operator::Le)?),
        (Operator::In, candidates) => {
            for candidate in candidates {
                if compare_values(current, candidate, Operator::Eq)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        (Operator::Contains, [needle]) => contains(current, needle),
        (Operator::NotContains, [needle]) => contains(current, needle).map(|found| !found),
        (cmp, [value]) if cmp.is_comparison() => compare_values(current, value, cmp),
        _ => Err(arity_error(op)),
    }
}

/// Compares two values with a binary comparison operator.
///
/// Strings compare by bytes and numbers numerically. Sets compare equal
/// regardless of element order. Values of different types only satisfy `NE`.
///
/// # Errors
///
/// Returns `TypeMismatch` when a number does not parse, and a validation
/// error when `op` is not a comparison.
pub fn compare_values(
    left: &AttributeValue,
    right: &AttributeValue,
    op: Operator,
) -> Result<bool, EngineError> {
    if !op.is_comparison() {
        return Err(EngineError::validation(format!("{op} is not a comparison")));
    }
    let ordering = match (left, right) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            Some(compare_numbers(parse_number(a)?, parse_number(b)?))
        }
        (AttributeValue::Bool(a), AttributeValue::Bool(b)) => Some(a.cmp(b)),
        (AttributeValue::Null(a), AttributeValue::Null(b)) => Some(a.cmp(b)),
        (AttributeValue::Ss(a), AttributeValue::Ss(b)) => {
            return Ok(equality_only(op, same_members(a, b, |x, y| Ok(x == y))?));
        }
        (AttributeValue::Ns(a), AttributeValue::Ns(b)) => {
            return Ok(equality_only(op, same_members(a, b, numbers_equal)?));
        }
        (AttributeValue::L(_), AttributeValue::L(_)) | (AttributeValue::M(_), AttributeValue::M(_)) => {
            return Ok(equality_only(op, left == right));
        }
        _ => None,
    };

    let Some(ordering) = ordering else {
        return Ok(op == Operator::Ne);
    };
    Ok(match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Le => ordering != Ordering::Greater,
        Operator::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

fn equality_only(op: Operator, equal: bool) -> bool {
    match op {
        Operator::Eq => equal,
        Operator::Ne => !equal,
        _ => false,
    }
}

fn same_members(
    a: &[String],
    b: &[String],
    eq: impl Fn(&str, &str) -> Result<bool, EngineError>,
) -> Result<bool, EngineError> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for x in a {
        let mut found = false;
        for y in b {
            if eq(x.as_str(), y.as_str())? {
                found = true;
                break;
            }
        }
        if !found {
            return Ok(false);
        }
    }
    Ok(true)
}

fn numbers_equal(a: &str, b: &str) -> Result<bool, EngineError> {
    Ok(compare_numbers(parse_number(a)?, parse_number(b)?) == Ordering::Equal)
}

/// Exact numeric order shared by conditions and key storage. Negative zero
/// equals zero.
pub(crate) fn compare_numbers(a: f64, b: f64) -> Ordering {
    normalize(a).total_cmp(&normalize(b))
}

/// Folds negative zero into zero so equal numbers share one bit pattern.
pub(crate) fn normalize(v: f64) -> f64 {
    v + 0.0
}

fn begins_with(current: &AttributeValue, prefix: &AttributeValue) -> Result<bool, EngineError> {
    match (current, prefix) {
        (AttributeValue::S(s), AttributeValue::S(p)) => Ok(s.starts_with(p.as_str())),
        _ => Err(EngineError::type_mismatch(format!(
            "begins_with requires string operands, got {} and {}",
            current.type_descriptor(),
            prefix.type_descriptor()
        ))),
    }
}

fn contains(current: &AttributeValue, needle: &AttributeValue) -> Result<bool, EngineError> {
    match (current, needle) {
        (AttributeValue::S(s), AttributeValue::S(sub)) => Ok(s.contains(sub.as_str())),
        (AttributeValue::Ss(set), AttributeValue::S(v)) => Ok(set.contains(v)),
        (AttributeValue::Ns(set), AttributeValue::N(v)) => {
            for member in set {
                if numbers_equal(member, v)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        (AttributeValue::L(list), _) => Ok(list.contains(needle)),
        _ => Err(EngineError::type_mismatch(format!(
            "contains cannot look for {} in {}",
            needle.type_descriptor(),
            current.type_descriptor()
        ))),
    }
}

/// Parses a number string for comparison and arithmetic.
///
/// # Errors
///
/// Returns `TypeMismatch` when the string is not a number.
pub fn parse_number(s: &str) -> Result<f64, EngineError> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| EngineError::type_mismatch(format!("'{s}' is not a valid number")))
}

/// Formats an arithmetic result the way numbers are stored: integral values
/// without a fractional part.
pub(crate) fn format_number(v: f64) -> String {
    #[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use dynamock_model::ErrorCode;

    use super::*;

    fn make_item(pairs: &[(&str, AttributeValue)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn user() -> Item {
        make_item(&[
            ("userId", AttributeValue::from("userA")),
            ("column", AttributeValue::from("@")),
            ("age", AttributeValue::from(29_i64)),
            (
                "luckyNumbers",
                AttributeValue::Ns(vec!["1".to_owned(), "3".to_owned(), "5".to_owned()]),
            ),
            ("nick", AttributeValue::from("ace of spades")),
        ])
    }

    #[test]
    fn test_should_evaluate_comparisons() {
        let item = user();
        assert!(Expression::eq("userId", "userA").evaluate(&item).unwrap());
        assert!(Expression::gt("age", 10_i64).evaluate(&item).unwrap());
        assert!(Expression::le("age", 29_i64).evaluate(&item).unwrap());
        assert!(!Expression::lt("age", 29_i64).evaluate(&item).unwrap());
        assert!(Expression::ne("age", 30_i64).evaluate(&item).unwrap());
    }

    #[test]
    fn test_should_compare_numbers_numerically() {
        let item = make_item(&[("n", AttributeValue::N("10".to_owned()))]);
        assert!(Expression::gt("n", AttributeValue::N("9".to_owned())).evaluate(&item).unwrap());
        assert!(Expression::eq("n", AttributeValue::N("10.0".to_owned())).evaluate(&item).unwrap());
    }

    #[test]
    fn test_should_be_false_when_attribute_is_absent() {
        let item = user();
        assert!(!Expression::eq("missing", "x").evaluate(&item).unwrap());
        assert!(!Expression::ne("missing", "x").evaluate(&item).unwrap());
        assert!(!Expression::contains("missing", "x").evaluate(&item).unwrap());
        assert!(!Expression::not_contains("missing", "x").evaluate(&item).unwrap());
    }

    #[test]
    fn test_should_test_presence_with_null_operators() {
        let item = user();
        assert!(Expression::null("missing").evaluate(&item).unwrap());
        assert!(Expression::not_null("age").evaluate(&item).unwrap());
        assert!(Expression::null("age").evaluate(&HashMap::new()).unwrap());
    }

    #[test]
    fn test_should_treat_mismatched_types_as_unequal() {
        let item = user();
        assert!(!Expression::eq("age", "29").evaluate(&item).unwrap());
        assert!(Expression::ne("age", "29").evaluate(&item).unwrap());
        assert!(!Expression::gt("age", "1").evaluate(&item).unwrap());
    }

    #[test]
    fn test_should_evaluate_between_and_in() {
        let item = user();
        assert!(Expression::between("age", 20_i64, 30_i64).evaluate(&item).unwrap());
        assert!(!Expression::between("age", 30_i64, 40_i64).evaluate(&item).unwrap());
        assert!(
            Expression::is_in("age", vec![AttributeValue::from(1_i64), AttributeValue::from(29_i64)])
                .evaluate(&item)
                .unwrap()
        );
    }

    #[test]
    fn test_should_evaluate_string_and_set_functions() {
        let item = user();
        assert!(Expression::begins_with("nick", "ace").evaluate(&item).unwrap());
        assert!(Expression::contains("nick", "of").evaluate(&item).unwrap());
        assert!(
            Expression::contains("luckyNumbers", AttributeValue::N("3".to_owned()))
                .evaluate(&item)
                .unwrap()
        );
        assert!(
            Expression::not_contains("luckyNumbers", AttributeValue::N("4".to_owned()))
                .evaluate(&item)
                .unwrap()
        );
    }

    #[test]
    fn test_should_reject_begins_with_on_number() {
        let err = Expression::begins_with("age", "2").evaluate(&user()).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeMismatch);
    }

    #[test]
    fn test_should_compare_sets_ignoring_order() {
        let item = user();
        let shuffled = AttributeValue::Ns(vec!["5".to_owned(), "1".to_owned(), "3".to_owned()]);
        assert!(Expression::eq("luckyNumbers", shuffled).evaluate(&item).unwrap());
    }

    #[test]
    fn test_should_evaluate_junctions() {
        let item = user();
        assert!(Expression::all(vec![]).evaluate(&item).unwrap());
        assert!(Expression::any(vec![]).evaluate(&item).is_err());
        let expr = Expression::any(vec![
            Expression::eq("userId", "nobody"),
            Expression::negate(Expression::null("age")),
        ]);
        assert!(expr.evaluate(&item).unwrap());
    }

    #[test]
    fn test_should_agree_with_compiled_form_on_key_condition() {
        let expr = Expression::all(vec![
            Expression::eq("userId", "userA"),
            Expression::begins_with("column", "@"),
        ]);
        let mut counter = super::super::AliasCounter::new();
        let assigned = expr.assign_unique_names(&mut counter);
        assert!(assigned.evaluate(&user()).unwrap());
    }

    #[test]
    fn test_should_compare_tiny_numbers_exactly() {
        let item = make_item(&[("n", AttributeValue::N("1e-300".to_owned()))]);
        assert!(!Expression::eq("n", AttributeValue::N("2e-300".to_owned())).evaluate(&item).unwrap());
        assert!(Expression::lt("n", AttributeValue::N("2e-300".to_owned())).evaluate(&item).unwrap());
        let zero = make_item(&[("n", AttributeValue::N("-0".to_owned()))]);
        assert!(Expression::eq("n", AttributeValue::N("0".to_owned())).evaluate(&zero).unwrap());
    }

    #[test]
    fn test_should_format_integral_numbers_without_fraction() {
        assert_eq!(format_number(30.0), "30");
        assert_eq!(format_number(2.5), "2.5");
    }
}

//! In-memory application of update directives.

use dynamock_model::{AttributeValue, EngineError, Item};

use super::{UpdateDirective, Updates};
use crate::expression::{format_number, parse_number};

impl Updates {
    /// Applies every directive to a copy of `item` and returns the copy.
    ///
    /// # Errors
    ///
    /// - validation error when a `Put` value is empty or any operand holds a
    ///   number that does not parse
    /// - `InvalidUpdate` when `ADD` targets something other than a number or
    ///   set, or `DELETE` is given a value that is not a set
    /// - `TypeMismatch` when operand and stored value are different kinds
    pub fn apply(&self, item: &Item) -> Result<Item, EngineError> {
        let mut next = item.clone();
        for (name, directive) in self.iter() {
            if let UpdateDirective::Put(value)
            | UpdateDirective::Increment(value)
            | UpdateDirective::Delete(Some(value)) = directive
            {
                if let Some(n) = value.first_invalid_number() {
                    return Err(EngineError::invalid_number(n));
                }
            }
            match directive {
                UpdateDirective::Put(value) => {
                    if value.contains_empty_value() {
                        return Err(EngineError::empty_value());
                    }
                    next.insert(name.clone(), value.clone());
                }
                UpdateDirective::Increment(value) => {
                    let added = add(next.get(name), value)?;
                    next.insert(name.clone(), added);
                }
                UpdateDirective::Delete(None) => {
                    next.remove(name);
                }
                UpdateDirective::Delete(Some(value)) => match subtract(next.get(name), value)? {
                    Some(rest) => {
                        next.insert(name.clone(), rest);
                    }
                    None => {
                        next.remove(name);
                    }
                },
            }
        }
        Ok(next)
    }
}

fn add(current: Option<&AttributeValue>, operand: &AttributeValue) -> Result<AttributeValue, EngineError> {
    if operand.contains_empty_value() {
        return Err(EngineError::empty_value());
    }
    match (current, operand) {
        (None, AttributeValue::N(n)) => Ok(AttributeValue::N(format_number(parse_number(n)?))),
        (Some(AttributeValue::N(a)), AttributeValue::N(b)) => Ok(AttributeValue::N(
            format_number(parse_number(a)? + parse_number(b)?),
        )),
        (None, AttributeValue::Ss(_) | AttributeValue::Ns(_)) => Ok(operand.clone()),
        (Some(AttributeValue::Ss(a)), AttributeValue::Ss(b)) => Ok(AttributeValue::Ss(union(a, b))),
        (Some(AttributeValue::Ns(a)), AttributeValue::Ns(b)) => Ok(AttributeValue::Ns(union(a, b))),
        (Some(existing), AttributeValue::N(_) | AttributeValue::Ss(_) | AttributeValue::Ns(_))
            if existing.is_n() || existing.is_set() =>
        {
            Err(mismatch(existing, operand))
        }
        _ => Err(EngineError::invalid_update(
            "Trying to ADD to a field which isnt an array or number",
        )),
    }
}

fn subtract(
    current: Option<&AttributeValue>,
    operand: &AttributeValue,
) -> Result<Option<AttributeValue>, EngineError> {
    let Some(remove) = operand.as_set() else {
        return Err(EngineError::invalid_update(format!(
            "DELETE expects a set value, got {}",
            operand.type_descriptor()
        )));
    };
    let rest = match (current, operand) {
        (None, _) => return Ok(None),
        (Some(AttributeValue::Ss(a)), AttributeValue::Ss(_)) => AttributeValue::Ss(difference(a, remove)),
        (Some(AttributeValue::Ns(a)), AttributeValue::Ns(_)) => AttributeValue::Ns(difference(a, remove)),
        (Some(existing), _) => return Err(mismatch(existing, operand)),
    };
    if rest.contains_empty_value() {
        Ok(None)
    } else {
        Ok(Some(rest))
    }
}

fn union(a: &[String], b: &[String]) -> Vec<String> {
    let mut out = a.to_vec();
    for v in b {
        if !out.contains(v) {
            out.push(v.clone());
        }
    }
    out
}

fn difference(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|v| !b.contains(v)).cloned().collect()
}

fn mismatch(existing: &AttributeValue, operand: &AttributeValue) -> EngineError {
    EngineError::type_mismatch(format!(
        "An operand in the update expression has an incorrect data type: stored {}, operand {}",
        existing.type_descriptor(),
        operand.type_descriptor()
    ))
}

#[cfg(test)]
mod tests {
    use dynamock_model::ErrorCode;

    use super::*;

    fn ns(values: &[&str]) -> AttributeValue {
        AttributeValue::Ns(values.iter().map(|v| (*v).to_owned()).collect())
    }

    fn user() -> Item {
        let mut item = Item::new();
        item.insert("userId".to_owned(), AttributeValue::from("userA"));
        item.insert("age".to_owned(), AttributeValue::from(29_i64));
        item.insert("luckyNumbers".to_owned(), ns(&["1", "3", "5"]));
        item
    }

    #[test]
    fn test_should_increment_number() {
        let next = Updates::new().increment("age", 1_i64).apply(&user()).unwrap();
        assert_eq!(next["age"], AttributeValue::from(30_i64));
    }

    #[test]
    fn test_should_treat_absent_number_as_zero() {
        let next = Updates::new().increment("visits", 2_i64).apply(&user()).unwrap();
        assert_eq!(next["visits"], AttributeValue::from(2_i64));
    }

    #[test]
    fn test_should_union_sets_without_duplicates() {
        let next = Updates::new()
            .increment("luckyNumbers", ns(&["3", "8"]))
            .apply(&user())
            .unwrap();
        assert_eq!(next["luckyNumbers"], ns(&["1", "3", "5", "8"]));
    }

    #[test]
    fn test_should_reject_add_to_string() {
        let err = Updates::new().increment("userId", 1_i64).apply(&user()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidUpdate);
        let err = Updates::new().increment("flag", true).apply(&user()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidUpdate);
    }

    #[test]
    fn test_should_reject_mismatched_set_types() {
        let err = Updates::new()
            .increment("luckyNumbers", AttributeValue::Ss(vec!["x".to_owned()]))
            .apply(&user())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeMismatch);
    }

    #[test]
    fn test_should_remove_attribute_when_set_becomes_empty() {
        let next = Updates::new()
            .delete_value("luckyNumbers", ns(&["1", "3", "5"]))
            .apply(&user())
            .unwrap();
        assert!(!next.contains_key("luckyNumbers"));
    }

    #[test]
    fn test_should_subtract_part_of_set() {
        let next = Updates::new()
            .delete_value("luckyNumbers", ns(&["3"]))
            .apply(&user())
            .unwrap();
        assert_eq!(next["luckyNumbers"], ns(&["1", "5"]));
    }

    #[test]
    fn test_should_reject_delete_with_scalar() {
        let err = Updates::new().delete_value("age", 1_i64).apply(&user()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidUpdate);
    }

    #[test]
    fn test_should_remove_key_and_ignore_absent() {
        let next = Updates::new().remove("age").remove("nothing").apply(&user()).unwrap();
        assert!(!next.contains_key("age"));
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn test_should_reject_empty_put() {
        let err = Updates::new().put("nick", "").apply(&user()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationException);
        assert_eq!(err.message, "AttributeValue may not contain an empty value");
    }

    #[test]
    fn test_should_leave_input_untouched() {
        let before = user();
        let _ = Updates::new().put("age", 40_i64).apply(&before).unwrap();
        assert_eq!(before["age"], AttributeValue::from(29_i64));
    }

    #[test]
    fn test_should_reject_operands_with_bad_numbers() {
        let err = Updates::new()
            .increment("luckyNumbers", ns(&["9", "nine"]))
            .apply(&user())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationException);
        assert!(err.message.contains("nine"));
        let err = Updates::new()
            .put("scores", AttributeValue::L(vec![AttributeValue::N("1x".to_owned())]))
            .apply(&user())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationException);
    }
}

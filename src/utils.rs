// Sequence helpers for path evaluation

use serde_json::Value;

/// Flatten nested arrays
pub fn flatten(arr: &[Value]) -> Vec<Value> {
    let mut result = Vec::new();
    for item in arr {
        if let Value::Array(inner) = item {
            result.extend(flatten(inner));
        } else {
            result.push(item.clone());
        }
    }
    result
}

/// Turn a result sequence into a value: empty is undefined, a singleton is
/// its only item, anything longer stays an array.
pub fn collapse(mut values: Vec<Value>) -> Option<Value> {
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(Value::Array(values)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten() {
        let nested = vec![
            json!(1),
            Value::Array(vec![json!(2), Value::Array(vec![json!(3)])]),
            json!(4),
        ];
        let flat = flatten(&nested);
        assert_eq!(flat, vec![json!(1), json!(2), json!(3), json!(4)]);
    }

    #[test]
    fn test_collapse() {
        assert_eq!(collapse(vec![]), None);
        assert_eq!(collapse(vec![json!("only")]), Some(json!("only")));
        assert_eq!(collapse(vec![json!(1), json!(2)]), Some(json!([1, 2])));
    }
}

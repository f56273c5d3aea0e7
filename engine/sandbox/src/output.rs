use serde::Serialize;

use crate::failure::{ExecutionFailure, FailureKind};
use crate::value::Value;

/// One `(state, score)` pair returned by an expansion function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSuccessor {
    pub state: serde_json::Value,
    pub score: f64,
}

fn invalid(function: &str, index: usize, detail: String) -> ExecutionFailure {
    ExecutionFailure::new(FailureKind::InvalidOutput, function, detail).at_index(index)
}

/// Check the returned value against the successor contract and convert it.
///
/// Accepted element shapes are a two-element list `[state, score]` or a map
/// with exactly the keys `state` and `score`.
pub(crate) fn collect_successors(
    output: &Value,
    function: &str,
) -> Result<Vec<ScoredSuccessor>, ExecutionFailure> {
    let Value::List(list) = output else {
        return Err(ExecutionFailure::new(
            FailureKind::InvalidOutput,
            function,
            format!(
                "expected a list of (state, score) pairs, got {}",
                output.type_name()
            ),
        ));
    };

    let mut successors = Vec::with_capacity(list.items.len());
    for (index, element) in list.items.iter().enumerate() {
        let (state, score) = match element {
            Value::List(pair) if pair.items.len() == 2 => (&pair.items[0], &pair.items[1]),
            Value::List(pair) => {
                return Err(invalid(
                    function,
                    index,
                    format!("expected a (state, score) pair, got {} elements", pair.items.len()),
                ));
            }
            Value::Map(map) => {
                let (Some(state), Some(score)) =
                    (map.entries.get("state"), map.entries.get("score"))
                else {
                    return Err(invalid(
                        function,
                        index,
                        "map successors need both 'state' and 'score' keys".to_string(),
                    ));
                };
                if let Some(extra) = map.entries.keys().find(|k| *k != "state" && *k != "score") {
                    return Err(invalid(
                        function,
                        index,
                        format!("unexpected key '{}' in successor map", extra),
                    ));
                }
                (state, score)
            }
            other => {
                return Err(invalid(
                    function,
                    index,
                    format!("expected a (state, score) pair, got {}", other.type_name()),
                ));
            }
        };

        let score = match score {
            Value::Num(n) if n.is_finite() => *n,
            Value::Num(n) => {
                return Err(invalid(function, index, format!("score must be finite, got {}", n)));
            }
            other => {
                return Err(invalid(
                    function,
                    index,
                    format!("score must be a number, got {}", other.type_name()),
                ));
            }
        };
        let state = state.to_json().map_err(|detail| invalid(function, index, detail))?;
        successors.push(ScoredSuccessor { state, score });
    }
    Ok(successors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn pair<'a>(state: Value<'a>, score: Value<'a>) -> Value<'a> {
        Value::list(vec![state, score])
    }

    #[test]
    fn test_accepts_pairs_and_maps() {
        let mut entries = BTreeMap::new();
        entries.insert("state".to_string(), Value::Num(3.0));
        entries.insert("score".to_string(), Value::Num(0.25));
        let output = Value::list(vec![
            pair(Value::str("a"), Value::Num(0.5)),
            Value::map(entries),
        ]);
        let successors = collect_successors(&output, "gen").unwrap();
        assert_eq!(successors.len(), 2);
        assert_eq!(successors[0].state, json!("a"));
        assert_eq!(successors[1].state, json!(3));
        assert_eq!(successors[1].score, 0.25);
    }

    #[test]
    fn test_rejects_non_list() {
        let err = collect_successors(&Value::Num(1.0), "gen").unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidOutput);
        assert_eq!(err.index, None);
    }

    #[test]
    fn test_reports_offending_index() {
        let output = Value::list(vec![
            pair(Value::str("ok"), Value::Num(0.1)),
            pair(Value::str("bad"), Value::str("high")),
        ]);
        let err = collect_successors(&output, "gen").unwrap_err();
        assert_eq!(err.index, Some(1));
        assert!(err.detail.contains("must be a number"));
    }

    #[test]
    fn test_rejects_non_finite_and_root_states() {
        let nan = Value::list(vec![pair(Value::Null, Value::Num(f64::INFINITY))]);
        assert!(collect_successors(&nan, "gen").unwrap_err().detail.contains("finite"));

        let root = Value::list(vec![pair(Value::Root, Value::Num(0.5))]);
        let err = collect_successors(&root, "gen").unwrap_err();
        assert!(err.detail.contains("root"));
        assert_eq!(err.index, Some(0));
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let output = Value::list(vec![Value::list(vec![Value::Num(1.0)])]);
        let err = collect_successors(&output, "gen").unwrap_err();
        assert!(err.detail.contains("1 elements"));
    }
}

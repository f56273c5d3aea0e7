//! Request parameter parsing.
//!
//! Tool arguments arrive as loose JSON. Everything here turns them into the
//! typed values the engine works with, naming the offending field on
//! failure. Nothing is clamped: an out-of-range value is rejected.

use std::collections::BTreeMap;

use engine_config::SearchConfig;
use mcts::config::validate_exploration_weight;
use mcts::{
    AbMctsAParams, AbMctsMParams, AlgorithmKind, AlgorithmParams, PriorConfig, RewardPriors,
    StandardParams,
};
use sandbox::{check_source, Limits};
use serde_json::{Map, Value};

use crate::error::EngineError;

/// Parameters every algorithm accepts; those it has no use for are
/// validated, then reported back as ignored.
pub const COMMON_PARAMS: &[&str] = &["exploration_weight", "samples_per_action"];

/// Validated algorithm parameters plus the common keys that had no effect.
#[derive(Debug, Clone, PartialEq)]
pub struct InitParams {
    pub params: AlgorithmParams,
    pub ignored: Vec<String>,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expected(field: &str, what: &str, value: &Value) -> EngineError {
    EngineError::validation(field, format!("must be {}, got {}", what, type_name(value)))
}

fn number(field: &str, value: &Value) -> Result<f64, EngineError> {
    value.as_f64().ok_or_else(|| expected(field, "a number", value))
}

fn integer(field: &str, value: &Value) -> Result<u32, EngineError> {
    let n = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        _ => None,
    };
    match n {
        Some(n) => u32::try_from(n)
            .map_err(|_| EngineError::validation(field, format!("is too large: {}", n))),
        None if value.is_number() => Err(EngineError::validation(
            field,
            format!("must be a non-negative integer, got {}", value),
        )),
        None => Err(expected(field, "an integer", value)),
    }
}

fn boolean(field: &str, value: &Value) -> Result<bool, EngineError> {
    value.as_bool().ok_or_else(|| expected(field, "a boolean", value))
}

fn string<'v>(field: &str, value: &'v Value) -> Result<&'v str, EngineError> {
    value.as_str().ok_or_else(|| expected(field, "a string", value))
}

fn object<'v>(field: &str, value: &'v Value) -> Result<&'v Map<String, Value>, EngineError> {
    value.as_object().ok_or_else(|| expected(field, "an object", value))
}

fn reward_priors(value: &Value) -> Result<RewardPriors, EngineError> {
    const FIELD: &str = "reward_average_priors";
    match value {
        Value::Number(_) => Ok(RewardPriors::Shared(number(FIELD, value)?)),
        Value::Object(map) => map
            .iter()
            .map(|(action, p)| Ok((action.clone(), number(&format!("{FIELD}.{action}"), p)?)))
            .collect::<Result<BTreeMap<_, _>, EngineError>>()
            .map(RewardPriors::PerAction),
        other => Err(expected(FIELD, "a number or an object of numbers", other)),
    }
}

fn prior_config(value: &Value) -> Result<Option<PriorConfig>, EngineError> {
    if value.is_null() {
        return Ok(None);
    }
    object("prior_config", value)?
        .iter()
        .map(|(key, v)| Ok((key.clone(), number(&format!("prior_config.{key}"), v)?)))
        .collect::<Result<PriorConfig, EngineError>>()
        .map(Some)
}

fn validate_common(key: &str, value: &Value) -> Result<(), EngineError> {
    match key {
        "exploration_weight" => validate_exploration_weight(number(key, value)?)?,
        "samples_per_action" => StandardParams::default()
            .with_samples_per_action(integer(key, value)?)
            .validate()?,
        _ => {}
    }
    Ok(())
}

fn unknown(key: &str, kind: AlgorithmKind) -> EngineError {
    EngineError::validation(key, format!("unknown parameter for {}", kind))
}

/// Parse an algorithm name such as `"ABMCTSA"`.
pub fn parse_algorithm(name: &str) -> Result<AlgorithmKind, EngineError> {
    Ok(name.parse::<AlgorithmKind>()?)
}

/// Build validated parameters for `kind` from the optional `params` object.
///
/// Omitted fields take their defaults; StandardMCTS defaults come from the
/// `[search]` configuration section.
///
/// # Arguments
///
/// * `kind` - Algorithm the session will run
/// * `raw` - The `params` tool argument (absent and `null` mean "all defaults")
/// * `defaults` - Search configuration supplying StandardMCTS defaults
///
/// # Returns
///
/// The typed parameters plus the sorted list of ignored common keys.
pub fn parse_init_params(
    kind: AlgorithmKind,
    raw: Option<&Value>,
    defaults: &SearchConfig,
) -> Result<InitParams, EngineError> {
    let empty = Map::new();
    let map = match raw {
        None | Some(Value::Null) => &empty,
        Some(value) => object("params", value)?,
    };

    let mut ignored = Vec::new();
    let mut ignore = |key: &str, value: &Value| -> Result<(), EngineError> {
        validate_common(key, value)?;
        ignored.push(key.to_string());
        Ok(())
    };

    let params = match kind {
        AlgorithmKind::Standard => {
            let mut p = StandardParams::default()
                .with_exploration_weight(defaults.default_exploration_weight)
                .with_samples_per_action(defaults.default_samples_per_action);
            for (key, value) in map {
                match key.as_str() {
                    "exploration_weight" => p.exploration_weight = number(key, value)?,
                    "samples_per_action" => p.samples_per_action = integer(key, value)?,
                    other => return Err(unknown(other, kind)),
                }
            }
            AlgorithmParams::Standard(p)
        }
        AlgorithmKind::AbMctsA => {
            let mut p = AbMctsAParams::default();
            for (key, value) in map {
                match key.as_str() {
                    "dist_type" => p.dist_type = string(key, value)?.parse()?,
                    "reward_average_priors" => p.reward_average_priors = reward_priors(value)?,
                    "prior_config" => p.prior_config = prior_config(value)?,
                    "model_selection_strategy" => {
                        p.model_selection_strategy = string(key, value)?.parse()?
                    }
                    common if COMMON_PARAMS.contains(&common) => ignore(common, value)?,
                    other => return Err(unknown(other, kind)),
                }
            }
            AlgorithmParams::AbMctsA(p)
        }
        AlgorithmKind::AbMctsM => {
            let mut p = AbMctsMParams::default();
            for (key, value) in map {
                match key.as_str() {
                    "enable_pruning" => p.enable_pruning = boolean(key, value)?,
                    "reward_average_priors" => p.reward_average_priors = reward_priors(value)?,
                    "model_selection_strategy" => {
                        p.model_selection_strategy = string(key, value)?.parse()?
                    }
                    "min_subtree_size_for_pruning" => {
                        p.min_subtree_size_for_pruning = integer(key, value)?
                    }
                    "same_score_proportion_threshold" => {
                        p.same_score_proportion_threshold = number(key, value)?
                    }
                    common if COMMON_PARAMS.contains(&common) => ignore(common, value)?,
                    other => return Err(unknown(other, kind)),
                }
            }
            AlgorithmParams::AbMctsM(p)
        }
    };

    params.validate()?;
    Ok(InitParams { params, ignored })
}

/// Convert the `generate_functions` argument into name -> source pairs.
pub fn parse_sources(raw: Option<&Value>) -> Result<BTreeMap<String, String>, EngineError> {
    const FIELD: &str = "generate_functions";
    let map = match raw {
        None | Some(Value::Null) => {
            return Err(EngineError::validation(FIELD, "is required"));
        }
        Some(value) => object(FIELD, value)?,
    };
    map.iter()
        .map(|(name, source)| {
            let field = format!("{FIELD}.{name}");
            Ok((name.clone(), string(&field, source)?.to_string()))
        })
        .collect()
}

/// Reject unusable expansion sources before anything is compiled.
pub fn validate_sources(
    sources: &BTreeMap<String, String>,
    limits: &Limits,
) -> Result<(), EngineError> {
    if sources.is_empty() {
        return Err(EngineError::validation(
            "generate_functions",
            "at least one expansion function is required",
        ));
    }
    for (name, source) in sources {
        if name.trim().is_empty() {
            return Err(EngineError::validation(
                "generate_functions",
                "expansion function names must not be blank",
            ));
        }
        check_source(source, limits.max_source_len, limits.max_nesting).map_err(|e| {
            EngineError::validation(format!("generate_functions.{name}"), e.to_string())
        })?;
    }
    Ok(())
}

/// Check a requested ranking size against `1..=max`.
pub fn validate_rank_k(k: i64, max: i64) -> Result<usize, EngineError> {
    if k <= 0 {
        return Err(EngineError::validation(
            "k",
            format!("must be a positive integer, got {k}"),
        ));
    }
    if k > max {
        return Err(EngineError::validation("k", format!("must not exceed {max}, got {k}")));
    }
    usize::try_from(k).map_err(|_| EngineError::validation("k", format!("is too large: {k}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcts::{DistType, SelectionStrategy};
    use serde_json::json;

    fn field_of(err: EngineError) -> String {
        match err {
            EngineError::Validation { field, .. } => field,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    fn parse(kind: AlgorithmKind, raw: Value) -> Result<InitParams, EngineError> {
        parse_init_params(kind, Some(&raw), &SearchConfig::default())
    }

    #[test]
    fn test_standard_defaults_come_from_config() {
        let config = SearchConfig {
            default_exploration_weight: 2.5,
            default_samples_per_action: 3,
            ..SearchConfig::default()
        };
        let init = parse_init_params(AlgorithmKind::Standard, None, &config).unwrap();
        assert_eq!(
            init.params,
            AlgorithmParams::Standard(StandardParams {
                exploration_weight: 2.5,
                samples_per_action: 3,
            })
        );
        assert!(init.ignored.is_empty());
    }

    #[test]
    fn test_standard_params_are_parsed() {
        let init = parse(
            AlgorithmKind::Standard,
            json!({"exploration_weight": 1.4, "samples_per_action": 2}),
        )
        .unwrap();
        let AlgorithmParams::Standard(p) = init.params else {
            panic!("wrong variant");
        };
        assert_eq!(p.exploration_weight, 1.4);
        assert_eq!(p.samples_per_action, 2);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let err = parse(AlgorithmKind::Standard, json!({"exploration_weight": 11})).unwrap_err();
        assert_eq!(field_of(err), "exploration_weight");

        let err = parse(AlgorithmKind::Standard, json!({"samples_per_action": 0})).unwrap_err();
        assert_eq!(field_of(err), "samples_per_action");

        let err = parse(AlgorithmKind::Standard, json!({"samples_per_action": 1.5})).unwrap_err();
        assert_eq!(field_of(err), "samples_per_action");
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let err =
            parse(AlgorithmKind::Standard, json!({"exploration_weight": "high"})).unwrap_err();
        assert_eq!(field_of(err), "exploration_weight");

        let err = parse(AlgorithmKind::AbMctsM, json!({"enable_pruning": 1})).unwrap_err();
        assert_eq!(field_of(err), "enable_pruning");

        let err = parse(AlgorithmKind::Standard, json!([1, 2])).unwrap_err();
        assert_eq!(field_of(err), "params");
    }

    #[test]
    fn test_common_params_are_ignored_after_validation() {
        let init = parse(
            AlgorithmKind::AbMctsA,
            json!({"exploration_weight": 2.0, "dist_type": "beta", "samples_per_action": 4}),
        )
        .unwrap();
        assert_eq!(init.ignored, vec!["exploration_weight", "samples_per_action"]);
        let AlgorithmParams::AbMctsA(p) = init.params else {
            panic!("wrong variant");
        };
        assert_eq!(p.dist_type, DistType::Beta);

        let err = parse(AlgorithmKind::AbMctsM, json!({"exploration_weight": -1})).unwrap_err();
        assert_eq!(field_of(err), "exploration_weight");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = parse(AlgorithmKind::Standard, json!({"dist_type": "beta"})).unwrap_err();
        assert_eq!(field_of(err), "dist_type");

        let err = parse(AlgorithmKind::AbMctsA, json!({"temperature": 0.3})).unwrap_err();
        assert_eq!(field_of(err), "temperature");
    }

    #[test]
    fn test_ab_mcts_a_priors() {
        let init = parse(
            AlgorithmKind::AbMctsA,
            json!({
                "reward_average_priors": {"expand": 0.7},
                "prior_config": {"m": 0.0, "kappa": 1.0},
                "model_selection_strategy": "multiarm_bandit_ucb"
            }),
        )
        .unwrap();
        let AlgorithmParams::AbMctsA(p) = init.params else {
            panic!("wrong variant");
        };
        assert_eq!(p.reward_average_priors.for_action("expand"), 0.7);
        assert_eq!(p.model_selection_strategy, SelectionStrategy::MultiarmBanditUcb);
        assert_eq!(p.prior_config.unwrap().len(), 2);

        let err = parse(AlgorithmKind::AbMctsA, json!({"prior_config": {"a": 1.0}})).unwrap_err();
        assert_eq!(field_of(err), "prior_config.a");

        let err = parse(AlgorithmKind::AbMctsA, json!({"reward_average_priors": {"f": "x"}}))
            .unwrap_err();
        assert_eq!(field_of(err), "reward_average_priors.f");
    }

    #[test]
    fn test_ab_mcts_m_params() {
        let init = parse(
            AlgorithmKind::AbMctsM,
            json!({
                "enable_pruning": false,
                "min_subtree_size_for_pruning": 6,
                "same_score_proportion_threshold": 0.9
            }),
        )
        .unwrap();
        let AlgorithmParams::AbMctsM(p) = init.params else {
            panic!("wrong variant");
        };
        assert!(!p.enable_pruning);
        assert_eq!(p.min_subtree_size_for_pruning, 6);

        let err = parse(AlgorithmKind::AbMctsM, json!({"same_score_proportion_threshold": 1.5}))
            .unwrap_err();
        assert_eq!(field_of(err), "same_score_proportion_threshold");
    }

    #[test]
    fn test_unknown_algorithm() {
        assert_eq!(field_of(parse_algorithm("UCT").unwrap_err()), "algorithm");
        assert_eq!(parse_algorithm("ABMCTSM").unwrap(), AlgorithmKind::AbMctsM);
    }

    #[test]
    fn test_sources_parsing_and_validation() {
        let sources = parse_sources(Some(&json!({"expand": "s -> []"}))).unwrap();
        assert_eq!(sources["expand"], "s -> []");

        let err = parse_sources(Some(&json!({"expand": 3}))).unwrap_err();
        assert_eq!(field_of(err), "generate_functions.expand");
        assert_eq!(field_of(parse_sources(None).unwrap_err()), "generate_functions");

        let limits = Limits::default();
        let err = validate_sources(&BTreeMap::new(), &limits).unwrap_err();
        assert_eq!(field_of(err), "generate_functions");

        let blank = BTreeMap::from([("  ".to_string(), "s -> []".to_string())]);
        assert_eq!(field_of(validate_sources(&blank, &limits).unwrap_err()), "generate_functions");

        let empty = BTreeMap::from([("expand".to_string(), "   ".to_string())]);
        assert_eq!(
            field_of(validate_sources(&empty, &limits).unwrap_err()),
            "generate_functions.expand"
        );
    }

    #[test]
    fn test_rank_k_bounds() {
        assert_eq!(validate_rank_k(5, 1000).unwrap(), 5);
        assert_eq!(field_of(validate_rank_k(0, 1000).unwrap_err()), "k");
        assert_eq!(field_of(validate_rank_k(-3, 1000).unwrap_err()), "k");
        assert_eq!(field_of(validate_rank_k(1001, 1000).unwrap_err()), "k");
    }
}

//! Algorithm kinds and their typed, range-checked parameters.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A parameter that failed validation. Never clamped.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ParamError {
    pub field: String,
    pub message: String,
}

impl ParamError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AlgorithmKind {
    #[serde(rename = "StandardMCTS")]
    Standard,
    #[serde(rename = "ABMCTSA")]
    AbMctsA,
    #[serde(rename = "ABMCTSM")]
    AbMctsM,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 3] = [Self::Standard, Self::AbMctsA, Self::AbMctsM];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "StandardMCTS",
            Self::AbMctsA => "ABMCTSA",
            Self::AbMctsM => "ABMCTSM",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmKind {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                ParamError::new(
                    "algorithm",
                    format!(
                        "unknown algorithm '{s}', expected one of StandardMCTS, ABMCTSA, ABMCTSM"
                    ),
                )
            })
    }
}

/// Posterior family used by ABMCTSA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistType {
    Gaussian,
    Beta,
}

impl FromStr for DistType {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gaussian" => Ok(Self::Gaussian),
            "beta" => Ok(Self::Beta),
            other => Err(ParamError::new(
                "dist_type",
                format!("unknown distribution '{other}', expected gaussian or beta"),
            )),
        }
    }
}

/// How an AB-MCTS node decides which expansion function to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Every (GEN, action) pair competes with every child
    Stack,
    /// One shared GEN option; action picked by Thompson sampling
    MultiarmBanditThompson,
    /// One shared GEN option; action picked by UCB1
    MultiarmBanditUcb,
}

impl FromStr for SelectionStrategy {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stack" => Ok(Self::Stack),
            "multiarm_bandit_thompson" => Ok(Self::MultiarmBanditThompson),
            "multiarm_bandit_ucb" => Ok(Self::MultiarmBanditUcb),
            other => Err(ParamError::new(
                "model_selection_strategy",
                format!(
                    "unknown strategy '{other}', expected stack, \
                     multiarm_bandit_thompson or multiarm_bandit_ucb"
                ),
            )),
        }
    }
}

/// Prior mean reward, either shared or per expansion function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RewardPriors {
    Shared(f64),
    PerAction(BTreeMap<String, f64>),
}

impl Default for RewardPriors {
    fn default() -> Self {
        Self::Shared(0.5)
    }
}

impl RewardPriors {
    /// Prior for `action`; unknown actions fall back to 0.5.
    pub fn for_action(&self, action: &str) -> f64 {
        match self {
            Self::Shared(p) => *p,
            Self::PerAction(map) => map.get(action).copied().unwrap_or(0.5),
        }
    }

    fn validate(&self) -> Result<(), ParamError> {
        let check = |field: String, p: f64| {
            if p.is_finite() && (0.0..=1.0).contains(&p) {
                Ok(())
            } else {
                Err(ParamError::new(field, format!("must be in [0, 1], got {p}")))
            }
        };
        match self {
            Self::Shared(p) => check("reward_average_priors".into(), *p),
            Self::PerAction(map) => map
                .iter()
                .try_for_each(|(k, p)| check(format!("reward_average_priors.{k}"), *p)),
        }
    }
}

/// Explicit prior hyper-parameters for ABMCTSA.
///
/// Gaussian uses `m`, `kappa`, `nu`, `tau_square`; beta uses `a`, `b`.
/// Missing entries fall back to values derived from the reward prior.
pub type PriorConfig = BTreeMap<String, f64>;

const GAUSSIAN_PRIOR_KEYS: &[&str] = &["m", "kappa", "nu", "tau_square"];
const BETA_PRIOR_KEYS: &[&str] = &["a", "b"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardParams {
    pub exploration_weight: f64,
    pub samples_per_action: u32,
}

impl Default for StandardParams {
    fn default() -> Self {
        Self {
            exploration_weight: 1.0,
            samples_per_action: 1,
        }
    }
}

impl StandardParams {
    /// Builder pattern: set the UCT exploration weight.
    pub fn with_exploration_weight(mut self, w: f64) -> Self {
        self.exploration_weight = w;
        self
    }

    /// Builder pattern: set expansions per (node, action).
    pub fn with_samples_per_action(mut self, n: u32) -> Self {
        self.samples_per_action = n;
        self
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        validate_exploration_weight(self.exploration_weight)?;
        if !(1..=100).contains(&self.samples_per_action) {
            return Err(ParamError::new(
                "samples_per_action",
                format!("must be between 1 and 100, got {}", self.samples_per_action),
            ));
        }
        Ok(())
    }
}

pub fn validate_exploration_weight(w: f64) -> Result<(), ParamError> {
    if !w.is_finite() || w < 0.0 {
        return Err(ParamError::new(
            "exploration_weight",
            format!("must be a non-negative number, got {w}"),
        ));
    }
    if w > 10.0 {
        return Err(ParamError::new(
            "exploration_weight",
            format!("must not exceed 10, got {w}"),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbMctsAParams {
    pub dist_type: DistType,
    pub reward_average_priors: RewardPriors,
    pub prior_config: Option<PriorConfig>,
    pub model_selection_strategy: SelectionStrategy,
}

impl Default for AbMctsAParams {
    fn default() -> Self {
        Self {
            dist_type: DistType::Gaussian,
            reward_average_priors: RewardPriors::default(),
            prior_config: None,
            model_selection_strategy: SelectionStrategy::Stack,
        }
    }
}

impl AbMctsAParams {
    pub fn with_dist_type(mut self, dist_type: DistType) -> Self {
        self.dist_type = dist_type;
        self
    }

    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.model_selection_strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        self.reward_average_priors.validate()?;
        if let Some(prior) = &self.prior_config {
            let allowed = match self.dist_type {
                DistType::Gaussian => GAUSSIAN_PRIOR_KEYS,
                DistType::Beta => BETA_PRIOR_KEYS,
            };
            for (key, value) in prior {
                let field = format!("prior_config.{key}");
                if !allowed.contains(&key.as_str()) {
                    return Err(ParamError::new(
                        field,
                        format!(
                            "not a {:?} prior parameter, expected one of {allowed:?}",
                            self.dist_type
                        ),
                    ));
                }
                // m is a location and may be any finite number
                let ok = if key == "m" {
                    value.is_finite()
                } else {
                    value.is_finite() && *value > 0.0
                };
                if !ok {
                    return Err(ParamError::new(
                        field,
                        format!("must be a positive finite number, got {value}"),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbMctsMParams {
    pub enable_pruning: bool,
    pub reward_average_priors: RewardPriors,
    pub model_selection_strategy: SelectionStrategy,
    pub min_subtree_size_for_pruning: u32,
    pub same_score_proportion_threshold: f64,
}

impl Default for AbMctsMParams {
    fn default() -> Self {
        Self {
            enable_pruning: true,
            reward_average_priors: RewardPriors::default(),
            model_selection_strategy: SelectionStrategy::Stack,
            min_subtree_size_for_pruning: 4,
            same_score_proportion_threshold: 0.75,
        }
    }
}

impl AbMctsMParams {
    pub fn with_pruning(mut self, enable: bool) -> Self {
        self.enable_pruning = enable;
        self
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        self.reward_average_priors.validate()?;
        if self.min_subtree_size_for_pruning < 1 {
            return Err(ParamError::new(
                "min_subtree_size_for_pruning",
                "must be at least 1",
            ));
        }
        let t = self.same_score_proportion_threshold;
        if !(t.is_finite() && t > 0.0 && t <= 1.0) {
            return Err(ParamError::new(
                "same_score_proportion_threshold",
                format!("must be in (0, 1], got {t}"),
            ));
        }
        Ok(())
    }
}

/// Effective parameters of one session's algorithm.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AlgorithmParams {
    Standard(StandardParams),
    AbMctsA(AbMctsAParams),
    AbMctsM(AbMctsMParams),
}

impl AlgorithmParams {
    /// Defaults for `kind`.
    pub fn defaults_for(kind: AlgorithmKind) -> Self {
        match kind {
            AlgorithmKind::Standard => Self::Standard(StandardParams::default()),
            AlgorithmKind::AbMctsA => Self::AbMctsA(AbMctsAParams::default()),
            AlgorithmKind::AbMctsM => Self::AbMctsM(AbMctsMParams::default()),
        }
    }

    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::Standard(_) => AlgorithmKind::Standard,
            Self::AbMctsA(_) => AlgorithmKind::AbMctsA,
            Self::AbMctsM(_) => AlgorithmKind::AbMctsM,
        }
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        match self {
            Self::Standard(p) => p.validate(),
            Self::AbMctsA(p) => p.validate(),
            Self::AbMctsM(p) => p.validate(),
        }
    }
}

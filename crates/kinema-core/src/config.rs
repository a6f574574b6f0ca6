use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_max_error() -> f32 {
    0.01
}
const fn default_max_iterations() -> u32 {
    50
}
const fn default_min_distance() -> f32 {
    1e-5
}
const fn default_iterations_per_tick() -> f32 {
    1.0
}
const fn default_error_clamp_factor() -> f32 {
    2.0
}
const fn default_singular_threshold() -> f32 {
    1e-3
}
const fn default_change_tolerance() -> f32 {
    1e-5
}
const fn default_true() -> bool {
    true
}
const fn default_population_size() -> usize {
    20
}
const fn default_crossover_probability() -> f32 {
    0.5
}
const fn default_mutation_probability() -> f32 {
    0.8
}
const fn default_tournament_size() -> usize {
    3
}
const fn default_elite_share() -> f32 {
    0.1
}
const fn default_middle_share() -> f32 {
    0.7
}
const fn default_max_delta() -> f32 {
    0.3
}

// ---------------------------------------------------------------------------
// ChangePolicy
// ---------------------------------------------------------------------------

/// Which components of a target force a solver reset when they change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePolicy {
    /// Reset when the target position moves.
    #[serde(default = "default_true")]
    pub position: bool,
    /// Reset when the target orientation turns.
    #[serde(default = "default_true")]
    pub orientation: bool,
    /// Reset when the target scale changes.
    #[serde(default)]
    pub scale: bool,
    /// Reset when the chain's external reference frame moves.
    #[serde(default)]
    pub reference: bool,
}

impl Default for ChangePolicy {
    fn default() -> Self {
        Self {
            position: true,
            orientation: true,
            scale: false,
            reference: false,
        }
    }
}

// ---------------------------------------------------------------------------
// SolverConfig
// ---------------------------------------------------------------------------

/// Iteration budget and termination settings shared by every solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Effector distance at or below which the solver stops (default: 0.01).
    #[serde(default = "default_max_error")]
    pub max_error: f32,

    /// Iterations allowed between two resets (default: 50).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// An iteration moving the effector by no more than this is a stall
    /// and ends the burst (default: 1e-5).
    #[serde(default = "default_min_distance")]
    pub min_distance: f32,

    /// Iterations granted per external tick; fractional values spread one
    /// iteration over several ticks (default: 1.0).
    #[serde(default = "default_iterations_per_tick")]
    pub iterations_per_tick: f32,

    /// The position error is clamped to `factor * max_reach` (default: 2.0).
    #[serde(default = "default_error_clamp_factor")]
    pub error_clamp_factor: f32,

    /// The Jacobian step is skipped when `|J Jᵗ e|²` is at or below this
    /// fraction of `|e|²` (default: 1e-3).
    #[serde(default = "default_singular_threshold")]
    pub singular_threshold: f32,

    /// Tolerance used when comparing successive targets (default: 1e-5).
    #[serde(default = "default_change_tolerance")]
    pub change_tolerance: f32,

    /// Which target components trigger a reset.
    #[serde(default)]
    pub change_policy: ChangePolicy,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_error: default_max_error(),
            max_iterations: default_max_iterations(),
            min_distance: default_min_distance(),
            iterations_per_tick: default_iterations_per_tick(),
            error_clamp_factor: default_error_clamp_factor(),
            singular_threshold: default_singular_threshold(),
            change_tolerance: default_change_tolerance(),
            change_policy: ChangePolicy::default(),
        }
    }
}

impl SolverConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("max_error", self.max_error)?;
        non_negative("min_distance", self.min_distance)?;
        non_negative("iterations_per_tick", self.iterations_per_tick)?;
        non_negative("singular_threshold", self.singular_threshold)?;
        non_negative("change_tolerance", self.change_tolerance)?;
        if !self.error_clamp_factor.is_finite() || self.error_clamp_factor <= 0.0 {
            return Err(ConfigError::invalid("error_clamp_factor", "must be finite and > 0"));
        }
        Ok(())
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// HeuristicConfig
// ---------------------------------------------------------------------------

/// Order in which the heuristic solver visits joints each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicKind {
    /// Tip to root (cyclic coordinate descent).
    #[default]
    Ccd,
    /// Root to tip.
    Forward,
    /// Tip to root, then root to tip.
    BackAndForth,
}

/// Settings for the heuristic (TRIK-style) solver.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeuristicConfig {
    /// Joint visiting order.
    #[serde(default)]
    pub heuristic: HeuristicKind,
    /// Weight of orientation error against position error, in `[0, 1]`.
    #[serde(default)]
    pub orientation_weight: f32,
}

impl HeuristicConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.orientation_weight) {
            return Err(ConfigError::invalid("orientation_weight", "must lie in [0, 1]"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EvolutionConfig
// ---------------------------------------------------------------------------

/// Whether lower or higher fitness is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    Minimize,
    Maximize,
}

impl Objective {
    /// Whether fitness `a` is strictly better than `b`.
    #[must_use]
    pub fn better(self, a: f32, b: f32) -> bool {
        match self {
            Self::Minimize => a < b,
            Self::Maximize => a > b,
        }
    }

    /// Ordering that sorts the best fitness first.
    #[must_use]
    pub fn ordering(self, a: f32, b: f32) -> std::cmp::Ordering {
        match self {
            Self::Minimize => a.total_cmp(&b),
            Self::Maximize => b.total_cmp(&a),
        }
    }
}

/// Parent selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionConfig {
    Uniform,
    Roulette,
    Ranking {
        /// Exponential rank bias in `(0, 1)`; `None` means linear ranks.
        #[serde(default)]
        exponential: Option<f32>,
    },
    Tournament {
        #[serde(default = "default_tournament_size")]
        size: usize,
    },
    Elitism {
        #[serde(default = "default_elite_share")]
        elite_share: f32,
        #[serde(default = "default_middle_share")]
        middle_share: f32,
    },
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self::Tournament {
            size: default_tournament_size(),
        }
    }
}

/// Mutation operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationConfig {
    /// Perturb Euler angles by `U(-max_delta, max_delta)`.
    Uniform {
        #[serde(default = "default_max_delta")]
        max_delta: f32,
    },
    /// Perturb Euler angles by `N(0, std²)`.
    Gaussian { std: f32 },
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self::Uniform {
            max_delta: default_max_delta(),
        }
    }
}

/// Settings for the genetic solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Individuals kept across generations (default: 20).
    #[serde(default = "default_population_size")]
    pub population_size: usize,

    /// Fitness direction (default: minimize effector distance).
    #[serde(default)]
    pub objective: Objective,

    /// Parent selection (default: tournament of 3).
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Whether parents are drawn with replacement (default: true).
    #[serde(default = "default_true")]
    pub replacement: bool,

    /// Chance that a child is produced by convex combination (default: 0.5).
    #[serde(default = "default_crossover_probability")]
    pub crossover_probability: f32,

    /// Chance that a child is mutated (default: 0.8).
    #[serde(default = "default_mutation_probability")]
    pub mutation_probability: f32,

    /// Mutation operator (default: uniform, 0.3 rad).
    #[serde(default)]
    pub mutation: MutationConfig,

    /// Seed of the solver's random source.
    #[serde(default)]
    pub seed: u64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            objective: Objective::default(),
            selection: SelectionConfig::default(),
            replacement: true,
            crossover_probability: default_crossover_probability(),
            mutation_probability: default_mutation_probability(),
            mutation: MutationConfig::default(),
            seed: 0,
        }
    }
}

impl EvolutionConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size < 2 {
            return Err(ConfigError::invalid("population_size", "must be >= 2"));
        }
        probability("crossover_probability", self.crossover_probability)?;
        probability("mutation_probability", self.mutation_probability)?;
        match self.selection {
            SelectionConfig::Tournament { size } if size == 0 => {
                return Err(ConfigError::invalid("selection.size", "must be >= 1"));
            }
            SelectionConfig::Ranking {
                exponential: Some(c),
            } if !(c > 0.0 && c < 1.0) => {
                return Err(ConfigError::invalid("selection.exponential", "must lie in (0, 1)"));
            }
            SelectionConfig::Elitism {
                elite_share,
                middle_share,
            } => {
                probability("selection.elite_share", elite_share)?;
                probability("selection.middle_share", middle_share)?;
                if elite_share + middle_share > 1.0 {
                    return Err(ConfigError::invalid(
                        "selection",
                        "elite_share + middle_share must be <= 1",
                    ));
                }
            }
            _ => {}
        }
        match self.mutation {
            MutationConfig::Uniform { max_delta } => non_negative("mutation.max_delta", max_delta)?,
            MutationConfig::Gaussian { std } => non_negative("mutation.std", std)?,
        }
        Ok(())
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// KinemaConfig
// ---------------------------------------------------------------------------

/// Full configuration file: one table per solver family.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KinemaConfig {
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub heuristic: HeuristicConfig,
    #[serde(default)]
    pub evolution: EvolutionConfig,
}

impl KinemaConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.solver.validate()?;
        self.heuristic.validate()?;
        self.evolution.validate()
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

fn non_negative(field: &str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::invalid(field, format!("must be finite and >= 0, got {value}")));
    }
    Ok(())
}

fn probability(field: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(field, format!("must lie in [0, 1], got {value}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

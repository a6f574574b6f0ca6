use thiserror::Error;

/// Top-level error type for the kinema crates.
#[derive(Debug, Error)]
pub enum KinemaError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Constraint error: {0}")]
    Constraint(#[from] ConstraintError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Evolution error: {0}")]
    Evolution(#[from] EvolutionError),
}

/// Errors from building or addressing a chain.
///
/// Copy + static messages for cheap propagation from the cache mutators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Unknown joint: {0}")]
    UnknownJoint(usize),

    #[error("Parent {parent} must precede joint {joint}")]
    ParentOutOfOrder { joint: usize, parent: usize },

    #[error("Chain has no joints")]
    Empty,

    #[error("Joint {dependent} is not a descendant of joint {joint}")]
    NotADescendant { joint: usize, dependent: usize },

    #[error("Joint {0} is not an end-effector of this chain")]
    NotAnEffector(usize),
}

/// Errors from constructing a joint constraint.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstraintError {
    #[error("Invalid angular bounds: min ({min}) > max ({max}) or not finite")]
    InvalidBounds { min: f32, max: f32 },

    #[error("Cone angle must lie in (0, pi]: {0}")]
    InvalidConeAngle(f32),

    #[error("Polygon needs at least 3 vertices, got {0}")]
    DegeneratePolygon(usize),

    #[error("Cone height must be finite and > 0, got {0}")]
    InvalidHeight(f32),

    #[error("Axis has zero length")]
    ZeroAxis,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_owned(),
            message: message.into(),
        }
    }
}

/// Errors from the evolutionary optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EvolutionError {
    #[error("Population is empty")]
    EmptyPopulation,

    #[error("Cannot draw {requested} individuals without replacement from {available}")]
    SampleTooLarge { requested: usize, available: usize },

    #[error("Tournament size must be >= 1, got {0}")]
    InvalidTournamentSize(usize),

    #[error("Operator needs {expected} parents, got {got}")]
    ParentCount { expected: usize, got: usize },
}

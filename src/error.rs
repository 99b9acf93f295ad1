use thiserror::Error;

/// Top-level error type for the tetref refinement engine.
#[derive(Debug, Error)]
pub enum RefineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Algebra(#[from] AlgebraError),
}

/// Errors raised during engine configuration and startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown best-full-refrule policy: {0}")]
    UnknownPolicy(String),
}

/// Errors concerning the refinement rule table and pattern decoder.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("rule file carries {found} rules, limit is {limit}")]
    RuleCountMismatch { found: i64, limit: usize },

    #[error("rule file carries {found} pattern entries, expected {expected}")]
    PatternCountMismatch { found: i64, expected: usize },

    #[error("rule file field {field} = {value} is out of range")]
    FieldOutOfRange { field: &'static str, value: i64 },

    #[error("no rule for edge pattern {edge_pattern:#04x}, side pattern {side_pattern:#04x}")]
    DecoderMiss { edge_pattern: u8, side_pattern: u8 },
}

/// Errors related to the mesh entity structure.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("entity not found: {0}")]
    EntityNotFound(&'static str),

    #[error("missing edge between element corners")]
    MissingEdge,

    #[error("element is regularly refined and cannot be marked")]
    MarkRefused,

    #[error("edge element counter overflow")]
    EdgeElementOverflow,

    #[error("edge element counter underflow")]
    EdgeElementUnderflow,

    #[error("grid level {0} is not disposable")]
    LevelNotDisposable(usize),

    #[error("invalid topology: {0}")]
    InvalidTopology(&'static str),
}

/// Errors related to geometric computations.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("degenerate element: singular corner Jacobian")]
    SingularJacobian,

    #[error("two boundary segments with a common edge are not consistent")]
    InconsistentSegments,

    #[error("degenerate geometry: {0}")]
    Degenerate(&'static str),
}

/// Errors related to the algebraic overlay.
#[derive(Debug, Error)]
pub enum AlgebraError {
    #[error("matrix type of ({0}, {1}) has size zero in the format")]
    UnusedMatrixType(usize, usize),

    #[error("vector list corrupted during reordering")]
    OrderingCorrupted,

    #[error("no cut vector can be found")]
    NoCutVector,
}

/// Convenience type alias for results using [`RefineError`].
pub type Result<T> = std::result::Result<T, RefineError>;

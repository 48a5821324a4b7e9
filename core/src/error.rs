use thiserror::Error;

// Problems found while compiling a single expression string.
// `pos` is a byte offset into the source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("malformed number '{text}' at {pos}")]
    BadNumber { text: String, pos: usize },

    #[error("expected {expected} at {pos}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        pos: usize,
    },

    #[error("unknown identifier '{name}' at {pos}")]
    UnknownIdentifier { name: String, pos: usize },

    #[error("function '{name}' takes {expected} arguments, got {found} (at {pos})")]
    Arity {
        name: &'static str,
        expected: usize,
        found: usize,
        pos: usize,
    },

    #[error("expression nests deeper than {limit} levels at {pos}")]
    TooDeep { limit: usize, pos: usize },

    #[error("argument {arg} of '{name}' must be positive, got {value} (at {pos})")]
    InvalidArgument {
        name: &'static str,
        arg: usize,
        value: f64,
        pos: usize,
    },
}

// Everything that can stop a regeneration.
// A failed regeneration never touches previously published height matrices.
#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("terrain grid must be at least 2x2 points, got {width}x{length}")]
    InvalidDimensions { width: u32, length: u32 },

    #[error("layer {layer}, function {function}: {source}")]
    Expression {
        layer: usize,
        function: usize,
        #[source]
        source: ParseError,
    },

    #[error("layer {layer}: invalid appearance, {reason}")]
    InvalidAppearance { layer: usize, reason: String },

    #[error("layer index {index} out of bounds for {len} layers")]
    LayerIndex { index: usize, len: usize },

    #[error("layer {layer}, function {function} produced a non-finite height at ({row}, {col})")]
    NonFiniteHeight {
        layer: usize,
        function: usize,
        row: usize,
        col: usize,
    },

    #[error("layer {layer}: height {value} at ({row}, {col}) is too large to mesh")]
    HeightOutOfRange {
        layer: usize,
        row: usize,
        col: usize,
        value: f64,
    },

    #[error("grid of {width}x{length} points does not fit in memory")]
    GridTooLarge { width: u32, length: u32 },

    #[error("terrain has not been evaluated")]
    NotEvaluated,
}

pub type Result<T> = std::result::Result<T, TerrainError>;

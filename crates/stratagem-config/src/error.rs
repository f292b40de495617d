use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Failed to parse KDL")]
    #[diagnostic(code(stratagem::config::parse_error))]
    ParseError {
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
        #[source]
        source: kdl::KdlError,
    },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(stratagem::config::invalid))]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    #[diagnostic(code(stratagem::config::missing_field))]
    MissingField { field: String },

    #[error("Found {} invalid direction(s) in the stratagem catalog", directions.len())]
    #[diagnostic(
        code(stratagem::config::invalid_directions),
        help("directions must be one of: up, down, left, right")
    )]
    InvalidDirections {
        #[source_code]
        src: String,
        #[related]
        directions: Vec<InvalidDirectionInfo>,
    },

    #[error("Stratagem '{name}' is defined more than once")]
    #[diagnostic(code(stratagem::config::duplicate_stratagem))]
    DuplicateStratagem { name: String },

    #[error("Key code {key} is bound to both slot {first} and slot {second}")]
    #[diagnostic(
        code(stratagem::config::duplicate_key),
        help("every slot needs its own physical key")
    )]
    DuplicateKey { key: u16, first: usize, second: usize },

    #[error("Unknown slot id {slot}")]
    #[diagnostic(code(stratagem::config::unknown_slot))]
    UnknownSlot { slot: i64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A direction token that is not one of up/down/left/right.
#[derive(Error, Diagnostic, Debug, Clone)]
#[error("Unknown direction '{token}' in stratagem '{stratagem}'")]
#[diagnostic(code(stratagem::config::unknown_direction))]
pub struct InvalidDirectionInfo {
    pub token: String,
    pub stratagem: String,
    #[label("not a direction")]
    pub span: SourceSpan,
}

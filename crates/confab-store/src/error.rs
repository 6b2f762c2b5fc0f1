use thiserror::Error;

/// Why a raw swarm message could not be turned into a typed interaction.
/// Conversion errors never abort a batch; the message becomes an invalid
/// placeholder instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid number in {field}: {value}")]
    BadNumber { field: &'static str, value: String },

    #[error("Unknown member action: {0}")]
    UnknownAction(String),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

use thiserror::Error;

/// Fatal engine errors. Per-reference problems are [`crate::model::Issue`]s, not errors.
#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (empty path, clashing tag keys, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
}

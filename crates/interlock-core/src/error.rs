use thiserror::Error;

/// Shared lightweight error type for core primitive operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A configured signal-kind literal is neither hex, decimal, nor `*`.
    #[error("invalid signal kind literal `{0}`")]
    BadKindLiteral(String),
}

//! Error types for the envelope layer.

use thiserror::Error;

/// Errors raised while decoding or validating an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("envelope exceeds maximum frame size ({len} > {max})")]
    TooLarge { len: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_message_is_descriptive() {
        let err = EnvelopeError::TooLarge { len: 10, max: 5 };
        assert_eq!(err.to_string(), "envelope exceeds maximum frame size (10 > 5)");
    }
}

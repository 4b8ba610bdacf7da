//! JSON codec for protocol messages.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The bytes are not a valid message.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encodes a message to JSON bytes.
pub fn encode<T: Serialize>(message: &T) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(CodecError::Encode)
}

/// Decodes a message from JSON bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PushResponse;

    #[test]
    fn decode_rejects_garbage() {
        let result: CodecResult<PushResponse> = decode(b"not json");
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn decode_tolerates_missing_optional_fields() {
        let response: PushResponse = decode(br#"{"success":true,"serverTime":5}"#).unwrap();
        assert!(response.success);
        assert!(response.conflicts.is_empty());
        assert_eq!(response.server_time, 5);
    }
}

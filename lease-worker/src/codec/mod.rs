//! Wire encoding of tasks.
//!
//! Bodies are Base64-encoded JSON on the wire, but producers outside this
//! crate sometimes enqueue raw JSON. Decoding therefore tries Base64 first and
//! falls back to reading the body as plain JSON.

pub mod base64_json;
pub mod json;

pub use base64_json::Base64Codec;
pub use self::json::PlainJsonCodec;

use crate::error::DecodeError;
use crate::types::Task;

/// Largest encoded body the transport accepts inline (64 KiB)
pub const MAX_INLINE_BODY_BYTES: usize = 64 * 1024;

/// Maps between JSON bytes and a message body
pub trait BodyCodec: Send + Sync {
    /// Wrap JSON bytes into a message body
    fn encode_body(&self, json: &[u8]) -> String;

    /// Recover JSON bytes from a message body
    fn decode_body(&self, body: &str) -> Result<Vec<u8>, DecodeError>;

    /// Get codec identifier
    fn codec_id(&self) -> &'static str;
}

/// Encode a task the way the gateway puts it on the wire
pub fn encode_task(task: &Task) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(task)?;
    Ok(Base64Codec.encode_body(&json))
}

/// Dual-path decode: Base64 JSON first, plain JSON as fallback.
///
/// A plain JSON body that also happens to be valid Base64 is decoded as
/// Base64; when that inner content does not parse, the raw body is tried as
/// JSON before giving up.
pub fn decode_task(body: &str) -> Result<Task, DecodeError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }

    match Base64Codec.decode_body(body) {
        Ok(bytes) => match json::parse_task(&bytes) {
            Ok(task) => Ok(task),
            Err(DecodeError::Null) => Err(DecodeError::Null),
            Err(inner) => match PlainJsonCodec
                .decode_body(body)
                .and_then(|bytes| json::parse_task(&bytes))
            {
                Ok(task) => Ok(task),
                Err(DecodeError::Null) => Err(DecodeError::Null),
                Err(_) => Err(inner),
            },
        },
        Err(_) => PlainJsonCodec
            .decode_body(body)
            .and_then(|bytes| json::parse_task(&bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    #[test]
    fn decodes_base64_body() {
        let task = Task::new("SendEmail", "user@example.com");
        let body = encode_task(&task).unwrap();

        assert_eq!(decode_task(&body).unwrap(), task);
    }

    #[test]
    fn falls_back_to_plain_json() {
        let task = Task::new("SendEmail", "user@example.com");
        let body = serde_json::to_string(&task).unwrap();

        assert_eq!(decode_task(&body).unwrap(), task);
    }

    #[test]
    fn null_body_is_rejected() {
        assert_eq!(decode_task("null"), Err(DecodeError::Null));
        assert_eq!(decode_task(&BASE64.encode("null")), Err(DecodeError::Null));
    }

    #[test]
    fn empty_body_is_rejected() {
        assert_eq!(decode_task("   "), Err(DecodeError::Empty));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(decode_task("not a task!"), Err(DecodeError::Malformed(_))));
        // valid Base64, but the inner bytes are not JSON
        assert!(matches!(decode_task("aGVsbG8="), Err(DecodeError::Malformed(_))));
    }
}

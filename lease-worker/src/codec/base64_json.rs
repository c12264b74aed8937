use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::BodyCodec;
use crate::error::DecodeError;

/// Standard-alphabet, padded Base64 wrapping of JSON bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl BodyCodec for Base64Codec {
    fn encode_body(&self, json: &[u8]) -> String {
        BASE64.encode(json)
    }

    fn decode_body(&self, body: &str) -> Result<Vec<u8>, DecodeError> {
        BASE64
            .decode(body)
            .map_err(|e| DecodeError::Malformed(format!("invalid base64: {}", e)))
    }

    fn codec_id(&self) -> &'static str {
        "base64-json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_codec_roundtrip() {
        let codec = Base64Codec;
        let body = codec.encode_body(br#"{"a":1}"#);

        assert_eq!(body, "eyJhIjoxfQ==");
        assert_eq!(codec.decode_body(&body).unwrap(), br#"{"a":1}"#.to_vec());
    }

    #[test]
    fn rejects_json_text() {
        assert!(Base64Codec.decode_body(r#"{"a":1}"#).is_err());
    }
}

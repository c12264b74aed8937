use super::BodyCodec;
use crate::error::DecodeError;
use crate::types::Task;

/// Body is the JSON document itself
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainJsonCodec;

impl BodyCodec for PlainJsonCodec {
    fn encode_body(&self, json: &[u8]) -> String {
        String::from_utf8_lossy(json).into_owned()
    }

    fn decode_body(&self, body: &str) -> Result<Vec<u8>, DecodeError> {
        Ok(body.as_bytes().to_vec())
    }

    fn codec_id(&self) -> &'static str {
        "json"
    }
}

/// Deserialize a task, treating a JSON `null` as its own failure
pub(crate) fn parse_task(bytes: &[u8]) -> Result<Task, DecodeError> {
    match serde_json::from_slice::<Option<Task>>(bytes) {
        Ok(Some(task)) => Ok(task),
        Ok(None) => Err(DecodeError::Null),
        Err(e) => Err(DecodeError::Malformed(e.to_string())),
    }
}

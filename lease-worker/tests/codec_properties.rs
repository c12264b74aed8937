use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use lease_worker::{
    DecodeError, Priority, Task, TaskId,
    codec::{decode_task, encode_task},
};

prop_compose! {
    fn arb_task()(
        id in "[a-f0-9-]{1,36}",
        task_type in "[A-Za-z]{1,20}",
        payload in ".{0,200}",
        blob in proptest::option::of("[a-z0-9/._-]{1,40}"),
        seconds in 0i64..4_000_000_000,
        priority in 0u8..=9,
    ) -> Task {
        Task {
            id: TaskId::from(id.as_str()),
            task_type,
            payload: if blob.is_some() { String::new() } else { payload },
            blob_payload_reference: blob,
            submitted_at: Utc.timestamp_opt(seconds, 0).unwrap(),
            priority: Priority::new(priority),
        }
    }
}

proptest! {
    #[test]
    fn encode_then_decode_is_identity(task in arb_task()) {
        let body = encode_task(&task).unwrap();
        prop_assert_eq!(decode_task(&body).unwrap(), task);
    }

    #[test]
    fn base64_wrapped_json_decodes_like_direct_json(task in arb_task()) {
        let json = serde_json::to_string(&task).unwrap();
        let direct: Task = serde_json::from_str(&json).unwrap();

        prop_assert_eq!(decode_task(&BASE64.encode(&json)).unwrap(), direct.clone());
        prop_assert_eq!(decode_task(&json).unwrap(), direct);
    }

    #[test]
    fn garbage_never_panics(body in "[^{}\\[\\]\"]{0,200}") {
        // Neither Base64 of a task nor JSON: either path fails with an error value
        let result = decode_task(&body);
        prop_assert!(result.is_err());
    }

    #[test]
    fn arbitrary_input_never_panics(body in ".{0,300}") {
        let _ = decode_task(&body);
    }
}

#[test]
fn consumer_shape_with_defaults() {
    let json = r#"{"taskId":"t-9","taskType":"DataMigration","enqueuedAt":"2024-05-01T10:00:00Z"}"#;
    let task = decode_task(&BASE64.encode(json)).unwrap();

    assert_eq!(task.id.as_str(), "t-9");
    assert_eq!(task.payload, "");
    assert_eq!(task.priority, Priority::NORMAL);
}

#[test]
fn out_of_range_priority_is_clamped_not_rejected() {
    for (raw, expected) in [(10, Priority::LOWEST), (-1, Priority::HIGHEST), (300, Priority::LOWEST), (2, Priority::new(2))] {
        let json = format!(
            r#"{{"taskId":"t1","taskType":"SendEmail","payload":"a@b.c","enqueuedAt":"2024-05-01T10:00:00Z","priority":{}}}"#,
            raw
        );
        let task = decode_task(&json).unwrap();
        assert_eq!(task.priority, expected, "priority {}", raw);
    }
}

#[test]
fn priority_serializes_as_plain_number() {
    let task = Task::new("SendEmail", "a@b.c").with_priority(Priority::new(3));
    let json = serde_json::to_value(&task).unwrap();
    assert_eq!(json["priority"], 3);
}

#[test]
fn whitespace_only_body_is_empty() {
    assert_eq!(decode_task("\n\t "), Err(DecodeError::Empty));
}

//! Webhook payload builders

use serde_json::{json, Value};

fn user(id: i64) -> Value {
    json!({"id": id, "is_bot": false, "first_name": "Tester", "username": format!("tester{}", id)})
}

fn message(id: i64, extra: Value) -> Value {
    let mut message = json!({
        "message_id": 1,
        "from": user(id),
        "chat": {"id": id, "type": "private"},
        "date": 1_700_000_000
    });
    if let (Some(target), Some(fields)) = (message.as_object_mut(), extra.as_object()) {
        for (k, v) in fields {
            target.insert(k.clone(), v.clone());
        }
    }
    message
}

/// Text message (commands included) from user `id` in their private chat
pub fn text(id: i64, text: &str) -> Value {
    json!({"update_id": 1, "message": message(id, json!({"text": text}))})
}

/// Photo upload with two sizes; the larger one has file_id "photo-large"
pub fn photo(id: i64) -> Value {
    json!({
        "update_id": 2,
        "message": message(id, json!({
            "photo": [
                {"file_id": "photo-small", "file_unique_id": "s", "width": 90, "height": 90},
                {"file_id": "photo-large", "file_unique_id": "l", "width": 1280, "height": 1280}
            ]
        }))
    })
}

/// Inline keyboard press
pub fn callback(id: i64, callback_id: &str) -> Value {
    json!({
        "update_id": 3,
        "callback_query": {
            "id": callback_id,
            "from": user(id),
            "message": message(id, json!({"text": "Try again?"})),
            "data": "again"
        }
    })
}

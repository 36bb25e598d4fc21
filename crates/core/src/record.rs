//! Record helpers: id assignment and the textual form used for matching.

use std::borrow::Cow;

use serde_json::Value;
use uuid::Uuid;

use crate::Record;

pub const ID_FIELD: &str = "id";

/// Fresh random identifier (UUIDv4, hyphenated).
pub fn new_id() -> String { Uuid::new_v4().to_string() }

/// Insert a generated `id` if the record has none. Returns true when one was added.
pub fn ensure_id(record: &mut Record) -> bool {
    if record.contains_key(ID_FIELD) {
        return false;
    }
    record.insert(ID_FIELD.to_string(), Value::String(new_id()));
    true
}

/// Text form of a value for search, filter, sort and id matching.
///
/// Strings are used verbatim (no quotes). Floats use their shortest decimal form, so an
/// integral `30.0` reads `"30"` and matches `?price=30`. Everything else renders as
/// compact JSON: `true` -> `"true"`, `null` -> `"null"`.
pub fn stringify(v: &Value) -> Cow<'_, str> {
    match v {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) => Cow::Owned(f.to_string()),
            None => Cow::Owned(n.to_string()),
        },
        other => Cow::Owned(other.to_string()),
    }
}

pub fn record_id(record: &Record) -> Option<Cow<'_, str>> { record.get(ID_FIELD).map(stringify) }

/// True when the record's `id` stringifies equal to `id`.
pub fn matches_id(record: &Record, id: &str) -> bool {
    record_id(record).map(|rid| rid == id).unwrap_or(false)
}

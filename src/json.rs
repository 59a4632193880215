// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! JSON representation of [`View`]s.
//!
//! Value-level conflicts, which can only occur in registers, are represented
//! as a JSON array of the conflicting values in an **arbitrary but
//! deterministic order**; an empty register renders as `null`. Byte values
//! render as base64 strings.
//!
//! # Examples
//!
//! A document where two users concurrently edited the "name" field:
//!
//! ```json
//! {
//!   "name": ["John Doe", "Jon Dough"],
//!   "age": 43,
//!   "phones": [
//!     "+44 1234567",
//!     "+44 2345678"
//!   ]
//! }
//! ```
use crate::crdts::{mvreg::RegisterValue, view::View};
use serde_json::Value;

/// Converts a [`RegisterValue`] to a [`serde_json::Value`].
impl From<&RegisterValue> for Value {
    fn from(val: &RegisterValue) -> Self {
        match val {
            RegisterValue::Bytes(v) => {
                base64::Engine::encode(&base64::engine::general_purpose::STANDARD, v).into()
            }
            RegisterValue::String(v) => v.clone().into(),
            RegisterValue::Double(v) => (*v).into(),
            RegisterValue::U64(v) => (*v).into(),
            RegisterValue::I64(v) => (*v).into(),
            RegisterValue::Bool(v) => (*v).into(),
        }
    }
}

/// Converts a [`View`] to a [`serde_json::Value`].
///
/// * An empty register renders as `Null`.
/// * A single-valued register renders as its value.
/// * A conflicted register renders as the array of its values.
impl From<View<'_>> for Value {
    fn from(view: View<'_>) -> Self {
        match view {
            View::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
            View::Sequence(elements) => {
                Value::Array(elements.into_iter().map(Value::from).collect())
            }
            View::Register(values) => match values.len() {
                0 => Value::Null,
                1 => values[0].into(),
                _ => Value::Array(values.into_iter().map(Value::from).collect()),
            },
        }
    }
}

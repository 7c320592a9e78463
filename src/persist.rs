//! Persisting object references through serializer pairs.
//!
//! A reference is stored as a two-line token:
//!
//! ```text
//! <class>\n<payload>\n
//! ```
//!
//! An absent reference is the single line `nil\n`. Tokens are concatenated
//! into one stream and read back with a [`TokenCursor`].
//!
//! The same records can be written as JSON objects
//! `{"class": <class>, "inner": <payload>}`, with `null` for an absent
//! reference.

use serde::Deserialize;
use tracing::debug;

use crate::bridge::Bridge;
use crate::error::{BridgeError, SerializationError};
use crate::registry::EntityView;
use crate::value::Value;

/// Class line used for an absent reference.
pub const NIL_TOKEN: &str = "nil";

/// Read position within a token stream.
#[derive(Debug, Clone)]
pub struct TokenCursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Byte offset of the next unread line.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Unread part of the stream.
    pub fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Next newline-terminated line, without its terminator.
    ///
    /// An unterminated tail is not a line; the cursor does not move.
    pub fn next_line(&mut self) -> Option<&'a str> {
        let rest = self.remaining();
        let end = rest.find('\n')?;
        self.pos += end + 1;
        Some(&rest[..end])
    }

    fn rewind(&mut self, pos: usize) {
        self.pos = pos;
    }
}

#[derive(Deserialize)]
struct ObjectRecord {
    class: String,
    inner: String,
}

impl Bridge {
    fn encode_parts(&self, value: &Value) -> Result<Option<(String, String)>, SerializationError> {
        let proxy = match value {
            Value::Nil => return Ok(None),
            Value::Object(proxy) => proxy,
            other => {
                return Err(SerializationError::NotAnObject {
                    actual: other.type_name(),
                });
            }
        };
        let class = proxy.class_name();
        let pair = self
            .registry()
            .serializer(class)
            .ok_or_else(|| SerializationError::NoSerializer {
                class: class.to_string(),
            })?;
        let cell = proxy
            .resolve()
            .ok_or_else(|| SerializationError::DeadObject {
                class: class.to_string(),
            })?;
        let guard = cell.try_borrow().map_err(|_| BridgeError::EntityBorrowed {
            class: class.to_string(),
        })?;

        let view = EntityView::new(class, &*guard, self.registry().upcasts());
        let payload = (pair.encode)(&view)?;
        if payload.contains('\n') {
            return Err(SerializationError::InvalidPayload {
                class: class.to_string(),
                payload,
            });
        }
        Ok(Some((class.to_string(), payload)))
    }

    /// Encode one reference as a token.
    pub fn encode(&self, value: &Value) -> Result<String, SerializationError> {
        match self.encode_parts(value)? {
            Some((class, payload)) => Ok(format!("{class}\n{payload}\n")),
            None => Ok(format!("{NIL_TOKEN}\n")),
        }
    }

    /// Encode a sequence of references into one stream.
    pub fn encode_all<'v>(
        &self,
        values: impl IntoIterator<Item = &'v Value>,
    ) -> Result<String, SerializationError> {
        let mut out = String::new();
        for value in values {
            out.push_str(&self.encode(value)?);
        }
        Ok(out)
    }

    fn decode_payload(&self, class: &str, payload: &str) -> Result<Value, SerializationError> {
        if !self.registry().contains_class(class) {
            return Err(SerializationError::UnknownClass(class.to_string()));
        }
        let pair = self
            .registry()
            .serializer(class)
            .ok_or_else(|| SerializationError::NoSerializer {
                class: class.to_string(),
            })?;

        let value = (pair.decode)(self, payload)?;
        match &value {
            Value::Nil => {}
            Value::Object(proxy) if self.registry().is_a(proxy.class_name(), class) => {}
            Value::Object(proxy) => {
                return Err(SerializationError::malformed(
                    class,
                    payload,
                    format!("decoded object has class {}", proxy.class_name()),
                ));
            }
            other => {
                return Err(SerializationError::malformed(
                    class,
                    payload,
                    format!("decoded a {} instead of an object", other.type_name()),
                ));
            }
        }
        Ok(value)
    }

    fn decode_token(&self, cursor: &mut TokenCursor<'_>) -> Result<Option<Value>, SerializationError> {
        if cursor.is_at_end() {
            return Ok(None);
        }
        let Some(class) = cursor.next_line() else {
            return Err(SerializationError::Truncated {
                offset: cursor.position(),
            });
        };
        if class == NIL_TOKEN {
            return Ok(Some(Value::Nil));
        }
        if !self.registry().contains_class(class) {
            return Err(SerializationError::UnknownClass(class.to_string()));
        }
        let Some(payload) = cursor.next_line() else {
            return Err(SerializationError::Truncated {
                offset: cursor.position(),
            });
        };
        self.decode_payload(class, payload).map(Some)
    }

    /// Decode the next token from `cursor`.
    ///
    /// Returns `Ok(None)` once the stream is exhausted. On error the cursor
    /// is left where it was.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn decode_next(
        &self,
        cursor: &mut TokenCursor<'_>,
    ) -> Result<Option<Value>, SerializationError> {
        let start = cursor.position();
        let result = self.decode_token(cursor);
        if let Err(err) = &result {
            debug!(offset = start, error = %err, "rejected token");
            cursor.rewind(start);
        }
        result
    }

    /// Decode every token in `input`.
    pub fn decode_all(&self, input: &str) -> Result<Vec<Value>, SerializationError> {
        let mut cursor = TokenCursor::new(input);
        let mut values = Vec::new();
        while let Some(value) = self.decode_next(&mut cursor)? {
            values.push(value);
        }
        Ok(values)
    }

    // === JSON records ===

    /// Encode one reference as a JSON record.
    pub fn to_json(&self, value: &Value) -> Result<serde_json::Value, SerializationError> {
        Ok(match self.encode_parts(value)? {
            Some((class, payload)) => serde_json::json!({ "class": class, "inner": payload }),
            None => serde_json::Value::Null,
        })
    }

    /// Decode a JSON record written by [`to_json`](Self::to_json).
    pub fn from_json(&self, record: &serde_json::Value) -> Result<Value, SerializationError> {
        if record.is_null() {
            return Ok(Value::Nil);
        }
        let record = ObjectRecord::deserialize(record).map_err(|err| {
            SerializationError::malformed("object record", record.to_string(), err.to_string())
        })?;
        self.decode_payload(&record.class, &record.inner)
    }
}

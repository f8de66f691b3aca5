//! Payload sanitization.
//!
//! Runs over every inbound body before anything else reads it.

use serde_json::{Map, Value};

/// Default cap on string length.
///
/// Lengths are counted in Unicode scalar values (`char`s), not bytes or
/// UTF-16 code units, so a string of emoji keeps as many symbols as a
/// string of ASCII letters.
pub const DEFAULT_MAX_STRING_LENGTH: usize = 10_000;

/// Sanitizer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanitizer {
    max_string_length: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
        }
    }
}

impl Sanitizer {
    pub fn new(max_string_length: usize) -> Self {
        Self { max_string_length }
    }

    pub fn max_string_length(&self) -> usize {
        self.max_string_length
    }

    /// Sanitize a JSON value, depth-first.
    ///
    /// - object keys starting with `__` or containing `prototype` are dropped
    /// - NUL characters are removed from strings
    /// - strings are truncated to the configured number of Unicode scalar
    ///   values, never splitting a character
    ///
    /// Numbers, booleans and nulls pass through unchanged.
    pub fn sanitize(&self, value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.clean_string(s)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|item| self.sanitize(item)).collect())
            }
            Value::Object(map) => {
                let mut cleaned = Map::with_capacity(map.len());
                for (key, item) in map {
                    if is_dangerous_key(&key) {
                        continue;
                    }
                    cleaned.insert(key, self.sanitize(item));
                }
                Value::Object(cleaned)
            }
            other => other,
        }
    }

    fn clean_string(&self, s: String) -> String {
        let needs_nul_strip = s.contains('\0');
        let needs_truncation = s.chars().count() > self.max_string_length;
        if !needs_nul_strip && !needs_truncation {
            return s;
        }

        s.chars()
            .filter(|c| *c != '\0')
            .take(self.max_string_length)
            .collect()
    }
}

/// Keys that could be used for prototype pollution by downstream consumers
fn is_dangerous_key(key: &str) -> bool {
    key.starts_with("__") || key.contains("prototype")
}

/// Sanitize with the default settings.
pub fn sanitize(value: Value) -> Value {
    Sanitizer::default().sanitize(value)
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;

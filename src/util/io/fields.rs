// src/util/io/fields.rs
//! Field Parser - key-seeking extraction from loose `key:value` text.
//!
//! The command payloads look like JSON but are never parsed as a whole:
//! each field is located by its quoted key, wherever it appears, and read
//! with a small typed rule. Extra fields and arbitrary order are fine;
//! nesting is not checked.

use thiserror::Error;

/// Capacities of the bounded string reads, counted like a C buffer
/// (one slot is reserved for the terminator).
pub const OP_CAPACITY: usize = 28;
pub const VALUE_CAPACITY: usize = 16;
pub const EUI64_CAPACITY: usize = 40;
pub const NUMBER_CAPACITY: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("missing field {0}")]
    Missing(String),
    #[error("malformed field {0}")]
    Malformed(String),
    #[error("field {0} out of range")]
    Overflow(String),
}

/// A borrowed command payload, queried field by field
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    text: &'a str,
}

impl<'a> Fields<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }

    /// Locate the value that follows `"key"` and its `:` separator,
    /// with leading whitespace skipped.
    fn value_of(&self, key: &str) -> Result<&'a str, FieldError> {
        let quoted = format!("\"{}\"", key);
        let at = self
            .text
            .find(&quoted)
            .ok_or_else(|| FieldError::Missing(key.to_string()))?;
        let rest = &self.text[at + quoted.len()..];
        let colon = rest
            .find(':')
            .ok_or_else(|| FieldError::Missing(key.to_string()))?;
        Ok(rest[colon + 1..].trim_start())
    }

    /// Consecutive decimal digits
    pub fn uint(&self, key: &str) -> Result<u32, FieldError> {
        let value = self.value_of(key)?;
        let digits: &str = leading(value, |c| c.is_ascii_digit());
        if digits.is_empty() {
            return Err(FieldError::Malformed(key.to_string()));
        }
        digits
            .parse::<u32>()
            .map_err(|_| FieldError::Overflow(key.to_string()))
    }

    /// A quoted string up to its closing quote, or a bare token up to a
    /// comma, brace or whitespace. `capacity` counts the terminator, so at
    /// most `capacity - 1` characters come back. A quoted value that does
    /// not close within capacity is rejected; a bare token is truncated.
    pub fn string(&self, key: &str, capacity: usize) -> Result<String, FieldError> {
        let value = self.value_of(key)?;
        let limit = capacity.saturating_sub(1);

        if let Some(body) = value.strip_prefix('"') {
            let mut out = String::new();
            for (taken, c) in body.chars().enumerate() {
                if c == '"' {
                    return Ok(out);
                }
                if taken >= limit {
                    break;
                }
                out.push(c);
            }
            return Err(FieldError::Malformed(key.to_string()));
        }

        let out: String = value
            .chars()
            .take_while(|c| *c != ',' && *c != '}' && !c.is_whitespace())
            .take(limit)
            .collect();
        if out.is_empty() {
            Err(FieldError::Malformed(key.to_string()))
        } else {
            Ok(out)
        }
    }

    /// Bounded string holding `0x`-prefixed hex or plain decimal
    pub fn auto_base(&self, key: &str) -> Result<u32, FieldError> {
        let raw = self.string(key, NUMBER_CAPACITY)?;
        let value = parse_auto_base(&raw)
            .ok_or_else(|| FieldError::Malformed(key.to_string()))?;
        u32::try_from(value).map_err(|_| FieldError::Overflow(key.to_string()))
    }

    /// Auto-base first, then the plain unsigned rule
    pub fn any_uint(&self, key: &str) -> Result<u32, FieldError> {
        self.auto_base(key).or_else(|_| self.uint(key))
    }

    /// Like `any_uint` but accepts a leading minus sign
    pub fn any_int(&self, key: &str) -> Result<i64, FieldError> {
        let raw = self.string(key, NUMBER_CAPACITY)?;
        let (negative, digits) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.as_str()),
        };
        let magnitude = parse_auto_base(digits)
            .ok_or_else(|| FieldError::Malformed(key.to_string()))?;
        let magnitude = i64::try_from(magnitude)
            .map_err(|_| FieldError::Overflow(key.to_string()))?;
        Ok(if negative { -magnitude } else { magnitude })
    }
}

fn leading(s: &str, pred: impl Fn(char) -> bool) -> &str {
    let end = s.find(|c: char| !pred(c)).unwrap_or(s.len());
    &s[..end]
}

/// Longest valid digit prefix, hex when `0x`/`0X` prefixed. `None` when no
/// digit was consumed; saturates rather than wraps on overflow.
pub fn parse_auto_base(text: &str) -> Option<u64> {
    let text = text.trim_start();
    let (radix, body) = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) if hex.starts_with(|c: char| c.is_ascii_hexdigit()) => (16, hex),
        // a bare "0x" still reads as the digit zero
        _ => (10, text),
    };

    let digits = leading(body, |c| c.is_digit(radix));
    if digits.is_empty() {
        return None;
    }
    Some(u64::from_str_radix(digits, radix).unwrap_or(u64::MAX))
}

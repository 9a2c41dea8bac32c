//! Recover one JSON value from free-form model output.
//!
//! Two stages: a direct parse from the first opening bracket to the end of
//! the text, then a bracket-balance scan that cuts the text where the
//! container closes and parses that slice. Nothing else is repaired.

use std::fmt;

use serde_json::Value;

/// The JSON container the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Object,
    Array,
}

impl Container {
    fn open(self) -> u8 {
        match self {
            Self::Object => b'{',
            Self::Array => b'[',
        }
    }

    fn close(self) -> u8 {
        match self {
            Self::Object => b'}',
            Self::Array => b']',
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => f.write_str("object"),
            Self::Array => f.write_str("array"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("no JSON {expected} in model output")]
    NotFound { expected: Container },

    #[error("{0}")]
    Malformed(String),
}

/// Extract exactly one JSON `expected` container from `text`.
pub fn extract(text: &str, expected: Container) -> Result<Value, ExtractError> {
    let text = strip_fences(text);
    let start = text
        .bytes()
        .position(|b| b == expected.open())
        .ok_or(ExtractError::NotFound { expected })?;
    let candidate = &text[start..];

    let first_err = match serde_json::from_str::<Value>(candidate.trim_end()) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let end = balanced_end(candidate, expected).ok_or_else(|| {
        ExtractError::Malformed(format!(
            "unbalanced {expected}: brackets never close ({first_err})"
        ))
    })?;
    serde_json::from_str(&candidate[..=end])
        .map_err(|e| ExtractError::Malformed(format!("balanced {expected} did not parse: {e}")))
}

/// Drop a leading ```` ```lang ```` line and a trailing ```` ``` ```` marker.
fn strip_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest,
        };
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s
}

/// Byte index of the bracket that brings the depth of `expected` back to
/// zero. Brackets inside string literals are ignored.
fn balanced_end(candidate: &str, expected: Container) -> Option<usize> {
    let (open, close) = (expected.open(), expected.close());
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in candidate.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

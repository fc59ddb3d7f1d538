//! Received-header storage.
//!
//! A small ordered list with case-insensitive name lookup — header
//! names compare ASCII-case-insensitively, values are kept verbatim.
//! Folded continuation lines are joined by the response parser before
//! insertion, so values never contain CRLF.

/// Ordered header list.
#[derive(Debug, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Headers {
        Headers::default()
    }

    /// Append a header.
    pub fn push(&mut self, name: String, value: String) {
        self.entries.push((name, value));
    }

    /// Extend the most recently pushed value (header unfolding).
    pub fn extend_last(&mut self, continuation: &str) {
        if let Some((_, value)) = self.entries.last_mut() {
            value.push(' ');
            value.push_str(continuation);
        }
    }

    /// First value for `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// True when a comma-separated header value contains `token`
/// (case-insensitively) — the `Connection: keep-alive, close` shape.
pub fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

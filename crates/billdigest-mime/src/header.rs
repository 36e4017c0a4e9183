//! MIME header handling.

use crate::encoding::encode_rfc2047;
use crate::error::{Error, Result};
use std::fmt;

/// Ordered collection of email headers.
///
/// Insertion order is preserved so generated messages render their headers
/// in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value contains a line break.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        if value.contains(['\r', '\n']) {
            return Err(Error::HeaderInjection(name));
        }
        self.headers.push((name, value));
        Ok(())
    }

    /// Adds a header value, RFC 2047 encoding it if it is not plain ASCII.
    ///
    /// # Errors
    ///
    /// Returns an error if the value contains a line break.
    pub fn add_encoded(&mut self, name: impl Into<String>, value: &str) -> Result<()> {
        self.add(name, encode_rfc2047(value, "utf-8"))
    }

    /// Gets the first value for a header, ignoring name case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if no headers are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl fmt::Display for Headers {
    /// Renders headers with CRLF line endings.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

//! Identity line.
//!
//! Sent once the channel is encrypted to tell the server which local user is
//! on the other end. The server uses it for access decisions this crate knows
//! nothing about.

use crate::{LINE_TERMINATOR, LineError, Result};

/// Keyword every identity line starts with.
pub const IDENTITY_KEYWORD: &str = "IDENTITY";

/// Maximum encoded size of an identity line, terminator included.
pub const MAX_IDENTITY_LINE: usize = 1024;

const USERNAME_ATTRIBUTE: &str = "USERNAME";

/// An identity announcement: `IDENTITY[ USERNAME=<name>]\n`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityLine {
    /// Local username, if the caller chose to disclose one.
    pub username: Option<String>,
}

impl IdentityLine {
    /// Identity line carrying no attributes.
    pub fn anonymous() -> Self {
        Self { username: None }
    }

    /// Identity line declaring `username`.
    pub fn with_username(username: impl Into<String>) -> Self {
        Self { username: Some(username.into()) }
    }

    /// Encode the line, terminator included.
    ///
    /// Nothing is returned unless the whole line fits in
    /// [`MAX_IDENTITY_LINE`] bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut line = String::with_capacity(MAX_IDENTITY_LINE);
        line.push_str(IDENTITY_KEYWORD);

        if let Some(username) = &self.username {
            if username.contains(['\n', '\r']) {
                return Err(LineError::EmbeddedNewline { field: "username" });
            }
            line.push(' ');
            line.push_str(USERNAME_ATTRIBUTE);
            line.push('=');
            line.push_str(username);
        }

        let size = line.len() + 1;
        if size > MAX_IDENTITY_LINE {
            return Err(LineError::TooLong { size, limit: MAX_IDENTITY_LINE });
        }

        let mut bytes = line.into_bytes();
        bytes.push(LINE_TERMINATOR);
        Ok(bytes)
    }

    /// Parse an identity line, with or without its terminator.
    ///
    /// Unknown attributes are ignored so newer clients can add fields.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(line)
            .map_err(|_| LineError::Malformed { reason: "not valid UTF-8" })?;
        let text = text.trim_end_matches(['\n', '\r']);

        let rest = text
            .strip_prefix(IDENTITY_KEYWORD)
            .ok_or(LineError::UnexpectedKeyword { expected: IDENTITY_KEYWORD })?;

        if rest.is_empty() {
            return Ok(Self::anonymous());
        }
        let rest = rest
            .strip_prefix(' ')
            .ok_or(LineError::Malformed { reason: "keyword not followed by a space" })?;

        let mut username = None;
        for attribute in rest.split(' ').filter(|a| !a.is_empty()) {
            let (key, value) = attribute
                .split_once('=')
                .ok_or(LineError::Malformed { reason: "attribute without '='" })?;
            if key == USERNAME_ATTRIBUTE {
                username = Some(value.to_string());
            }
        }

        Ok(Self { username })
    }
}

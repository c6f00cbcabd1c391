//! Version announcement line.
//!
//! Both sides announce the protocol they speak as
//! `CFE_v<N> <agent-tag> <version>\n`. The client's announcement is what the
//! server accepts or rejects; the server's own announcement is informational.

use std::fmt;

use crate::{LINE_TERMINATOR, LineError, Result};

/// Literal prefix in front of the numeric protocol identifier.
pub const VERSION_PREFIX: &str = "CFE_v";

/// Maximum encoded size of a version announcement, terminator included.
///
/// Peers format this line into a 128-byte C string, so one byte is reserved
/// for the NUL and never goes on the wire.
pub const MAX_VERSION_LINE: usize = 127;

/// Software tag announced by the agent.
pub const DEFAULT_AGENT_TAG: &str = "cf-agent";

/// A version announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLine {
    /// Numeric protocol identifier.
    pub protocol: u32,
    /// Software tag of the sender (`cf-agent`, `cf-serverd`, ...).
    pub agent: String,
    /// Free-form software version of the sender.
    pub version: String,
}

impl VersionLine {
    /// Create a version announcement.
    pub fn new(protocol: u32, agent: impl Into<String>, version: impl Into<String>) -> Self {
        Self { protocol, agent: agent.into(), version: version.into() }
    }

    /// Encode the line, terminator included.
    ///
    /// # Errors
    ///
    /// - `EmbeddedWhitespace` if the agent tag contains whitespace
    /// - `EmbeddedNewline` if the version contains a line terminator
    /// - `TooLong` if the line exceeds [`MAX_VERSION_LINE`]
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.agent.is_empty() {
            return Err(LineError::Malformed { reason: "empty agent tag" });
        }
        if self.agent.chars().any(char::is_whitespace) {
            return Err(LineError::EmbeddedWhitespace { field: "agent" });
        }
        if self.version.contains(['\n', '\r']) {
            return Err(LineError::EmbeddedNewline { field: "version" });
        }

        let mut line = self.to_string().into_bytes();
        line.push(LINE_TERMINATOR);

        if line.len() > MAX_VERSION_LINE {
            return Err(LineError::TooLong { size: line.len(), limit: MAX_VERSION_LINE });
        }

        Ok(line)
    }

    /// Parse an announcement, with or without its terminator.
    ///
    /// The version field is everything after the agent tag, so versions
    /// containing spaces survive a round trip.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(line)
            .map_err(|_| LineError::Malformed { reason: "not valid UTF-8" })?;
        let text = text.trim_end_matches(['\n', '\r']);

        let rest = text
            .strip_prefix(VERSION_PREFIX)
            .ok_or(LineError::UnexpectedKeyword { expected: VERSION_PREFIX })?;

        let mut fields = rest.splitn(3, ' ');
        let protocol = fields
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or(LineError::Malformed { reason: "missing protocol number" })?;
        let agent = fields
            .next()
            .filter(|a| !a.is_empty())
            .ok_or(LineError::Malformed { reason: "missing agent tag" })?;
        let version = fields.next().unwrap_or_default();

        Ok(Self::new(protocol, agent, version))
    }
}

impl fmt::Display for VersionLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{VERSION_PREFIX}{} {} {}", self.protocol, self.agent, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_exact_template() {
        let line = VersionLine::new(3, "cf-agent", "3.21.0").encode().unwrap();
        assert_eq!(line, b"CFE_v3 cf-agent 3.21.0\n");
    }

    #[test]
    fn empty_version_keeps_separator() {
        let line = VersionLine::new(2, "cf-agent", "").encode().unwrap();
        assert_eq!(line, b"CFE_v2 cf-agent \n");
    }

    #[test]
    fn line_at_limit_is_accepted() {
        // "CFE_v1 a " is 9 bytes, plus terminator
        let version = "x".repeat(MAX_VERSION_LINE - 10);
        let line = VersionLine::new(1, "a", version).encode().unwrap();
        assert_eq!(line.len(), MAX_VERSION_LINE);
    }

    #[test]
    fn line_over_limit_is_rejected() {
        let version = "x".repeat(MAX_VERSION_LINE - 9);
        let err = VersionLine::new(1, "a", version).encode().unwrap_err();
        assert_eq!(err, LineError::TooLong { size: MAX_VERSION_LINE + 1, limit: MAX_VERSION_LINE });
    }

    #[test]
    fn line_filling_c_buffer_is_rejected() {
        // 128 bytes on the wire would not leave room for the NUL.
        let version = "x".repeat(128 - 10);
        let err = VersionLine::new(1, "a", version).encode().unwrap_err();
        assert_eq!(err, LineError::TooLong { size: 128, limit: 127 });
    }

    #[test]
    fn rejects_newline_in_version() {
        let err = VersionLine::new(1, "cf-agent", "3.21\nOK").encode().unwrap_err();
        assert_eq!(err, LineError::EmbeddedNewline { field: "version" });
    }

    #[test]
    fn rejects_whitespace_in_agent() {
        let err = VersionLine::new(1, "cf agent", "3.21").encode().unwrap_err();
        assert_eq!(err, LineError::EmbeddedWhitespace { field: "agent" });
    }

    #[test]
    fn parses_server_announcement() {
        let line = VersionLine::parse(b"CFE_v2 cf-serverd 3.21.0\n").unwrap();
        assert_eq!(line, VersionLine::new(2, "cf-serverd", "3.21.0"));
    }

    #[test]
    fn parse_keeps_spaces_in_version() {
        let line = VersionLine::parse(b"CFE_v2 cf-serverd 3.21.0 (build 7)\r\n").unwrap();
        assert_eq!(line.version, "3.21.0 (build 7)");
    }

    #[test]
    fn parse_rejects_other_keywords() {
        assert_eq!(
            VersionLine::parse(b"BAD protocol\n").unwrap_err(),
            LineError::UnexpectedKeyword { expected: VERSION_PREFIX }
        );
        assert!(matches!(
            VersionLine::parse(b"CFE_vX cf-agent 1\n"),
            Err(LineError::Malformed { .. })
        ));
    }
}

//! Server replies to a version announcement.

/// Prefix of a reply accepting the announced version.
pub const ACCEPT_PREFIX: &[u8] = b"OK";

/// Largest line a client reads during negotiation, terminator included.
pub const MAX_RECV_LINE: usize = 128;

/// Server verdict on the announced protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The server speaks the announced version.
    Accepted,
    /// The server declined; the client may fall back to another protocol.
    Rejected,
}

impl Verdict {
    /// Classify a reply line. Only the first two bytes are significant.
    pub fn classify(line: &[u8]) -> Self {
        if line.starts_with(ACCEPT_PREFIX) { Self::Accepted } else { Self::Rejected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_prefix_accepts() {
        assert_eq!(Verdict::classify(b"OK\n"), Verdict::Accepted);
        assert_eq!(Verdict::classify(b"OK WELCOME cf-agent"), Verdict::Accepted);
        assert_eq!(Verdict::classify(b"OK"), Verdict::Accepted);
    }

    #[test]
    fn anything_else_rejects() {
        assert_eq!(Verdict::classify(b"NO\n"), Verdict::Rejected);
        assert_eq!(Verdict::classify(b"BAD protocol version\n"), Verdict::Rejected);
        assert_eq!(Verdict::classify(b"ok\n"), Verdict::Rejected);
        assert_eq!(Verdict::classify(b"O"), Verdict::Rejected);
        assert_eq!(Verdict::classify(b""), Verdict::Rejected);
    }
}

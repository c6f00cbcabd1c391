//! Feed arbitrary server bytes to the line parsers.
//!
//! Parsers must never panic, and anything they accept must survive
//! re-encoding unchanged.

#![no_main]

use cfnet_proto::{IdentityLine, Verdict, VersionLine};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = Verdict::classify(data);

    if let Ok(line) = VersionLine::parse(data) {
        if let Ok(encoded) = line.encode() {
            assert_eq!(VersionLine::parse(&encoded).ok(), Some(line));
        }
    }

    if let Ok(identity) = IdentityLine::parse(data) {
        if let Ok(encoded) = identity.encode() {
            let reparsed = IdentityLine::parse(&encoded).ok();
            assert_eq!(reparsed.map(|i| i.username.is_some()), Some(identity.username.is_some()));
        }
    }
});

//! Test harness for cfnet connection establishment.
//!
//! Real TLS over loopback TCP, with the server side scripted and the client
//! socket optionally wrapped to inject faults. Tests drive the production
//! client code unchanged and inspect what the server actually received.

pub mod server;
pub mod socket;

pub use server::{HarnessError, ServerReport, ServerScript, ServerStep, TestServer};
pub use socket::{FaultProbe, FlakySocket};

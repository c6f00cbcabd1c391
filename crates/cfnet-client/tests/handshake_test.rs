//! TLS handshake integration tests.
//!
//! Real rustls sessions over loopback TCP:
//! - handshake against a scripted server, client certificate delivered
//! - second handshake on a secured connection is a no-op
//! - exactly one retry after a transient failure, never two
//! - a peer that does not speak TLS leaves the connection as it was

use std::time::Duration;

use cfnet_client::{
    ClientContext, Connection, ContextConfig, ContextError, HandshakeConfig, HandshakeError,
    HandshakeOutcome, HostKeyPair, MemoryKeyStore, ProtocolVersion, TlsVersion, initiate,
};
use cfnet_harness::{FlakySocket, ServerScript, TestServer};

fn initialized_context(config: ContextConfig) -> ClientContext<MemoryKeyStore> {
    let keys = HostKeyPair::generate().unwrap();
    let mut ctx = ClientContext::new(MemoryKeyStore::with_keys(keys), config);
    ctx.initialize().unwrap();
    ctx
}

fn quick_retry() -> HandshakeConfig {
    HandshakeConfig { retry_wait: Duration::from_secs(1), ..HandshakeConfig::default() }
}

#[test]
fn handshake_secures_connection() {
    let server = TestServer::spawn(ServerScript::new()).unwrap();
    let ctx = initialized_context(ContextConfig::default());
    let mut conn = Connection::new(server.connect().unwrap());

    let outcome = initiate(&mut conn, &ctx, &HandshakeConfig::default()).unwrap();

    let HandshakeOutcome::Established(peer) = outcome else {
        panic!("expected a new session, got {outcome:?}");
    };
    assert_eq!(peer.end_entity(), Some(server.certificate()));
    assert!(peer.cipher_suite.is_some());
    assert!(conn.is_secured());
    assert_eq!(conn.protocol_version(), ProtocolVersion::Tls);

    conn.close();
    let report = server.finish().unwrap();
    assert_eq!(report.client_certificates.first(), ctx.certificate());
}

#[test]
fn second_handshake_is_noop() {
    let server = TestServer::spawn(ServerScript::new()).unwrap();
    let ctx = initialized_context(ContextConfig::default());
    let (socket, probe) = FlakySocket::new(server.connect().unwrap());
    let mut conn = Connection::new(socket);

    let first = initiate(&mut conn, &ctx, &HandshakeConfig::default()).unwrap();
    let HandshakeOutcome::Established(peer) = first else {
        panic!("expected a new session, got {first:?}");
    };
    let session = std::ptr::from_ref(conn.session().unwrap());
    let written = probe.bytes_written();

    let second = initiate(&mut conn, &ctx, &HandshakeConfig::default()).unwrap();
    assert_eq!(second, HandshakeOutcome::AlreadySecured);

    // Same session object, untouched, and nothing sent to the server.
    let current = conn.session().unwrap();
    assert!(std::ptr::eq(session, current));
    assert_eq!(current.cipher_suite(), peer.cipher_suite);
    assert_eq!(current.tls_version(), peer.tls_version);
    assert_eq!(current.peer_certificates(), Some(peer.certificates.as_slice()));
    assert_eq!(probe.bytes_written(), written);
    assert_eq!(probe.wait_calls(), 0);
    assert_eq!(conn.protocol_version(), ProtocolVersion::Tls);

    conn.close();
    server.finish().unwrap();
}

#[test]
fn uninitialized_context_is_refused() {
    let server = TestServer::spawn(ServerScript::new()).unwrap();
    let ctx = ClientContext::new(MemoryKeyStore::empty(), ContextConfig::default());
    let mut conn = Connection::new(server.connect().unwrap());

    let result = initiate(&mut conn, &ctx, &HandshakeConfig::default());

    assert!(matches!(result, Err(HandshakeError::Context(ContextError::NotInitialized))));
    assert!(!conn.is_secured());
    assert!(conn.socket().is_some());
    assert_eq!(conn.protocol_version(), ProtocolVersion::Undefined);

    // Server is still waiting for a ClientHello; hang up so it exits.
    conn.close();
    let _ = server.finish();
}

#[test]
fn tls13_only_context_negotiates_tls13() {
    let server = TestServer::spawn(ServerScript::new()).unwrap();
    let ctx = initialized_context(ContextConfig { min_tls_version: TlsVersion::Tls13 });
    let mut conn = Connection::new(server.connect().unwrap());

    let outcome = initiate(&mut conn, &ctx, &HandshakeConfig::default()).unwrap();

    let HandshakeOutcome::Established(peer) = outcome else {
        panic!("expected a new session, got {outcome:?}");
    };
    assert_eq!(peer.tls_version, Some(rustls::ProtocolVersion::TLSv1_3));

    conn.close();
    server.finish().unwrap();
}

#[test]
fn transient_failure_is_retried_once() {
    let server = TestServer::spawn(ServerScript::new()).unwrap();
    let ctx = initialized_context(ContextConfig::default());
    let (socket, probe) = FlakySocket::new(server.connect().unwrap());
    let mut conn = Connection::new(socket.fail_reads(1));

    let outcome = initiate(&mut conn, &ctx, &quick_retry()).unwrap();

    assert!(matches!(outcome, HandshakeOutcome::Established(_)));
    assert_eq!(probe.read_failures(), 1);
    assert_eq!(probe.wait_calls(), 1);
    assert!(conn.is_secured());

    conn.close();
    server.finish().unwrap();
}

#[test]
fn retry_happens_at_most_once() {
    let server = TestServer::spawn(ServerScript::new()).unwrap();
    let ctx = initialized_context(ContextConfig::default());
    let (socket, probe) = FlakySocket::new(server.connect().unwrap());
    let mut conn = Connection::new(socket.fail_reads(5));

    let result = initiate(&mut conn, &ctx, &quick_retry());

    assert!(matches!(result, Err(HandshakeError::RetryFailed { .. })));
    // One failure per attempt, and only two attempts.
    assert_eq!(probe.read_failures(), 2);
    assert_eq!(probe.wait_calls(), 1);
    assert!(!conn.is_secured());
    assert_eq!(conn.protocol_version(), ProtocolVersion::Undefined);

    conn.close();
    let _ = server.finish();
}

#[test]
fn no_retry_when_socket_not_writable() {
    let server = TestServer::spawn(ServerScript::new()).unwrap();
    let ctx = initialized_context(ContextConfig::default());
    let (socket, probe) = FlakySocket::new(server.connect().unwrap());
    let mut conn = Connection::new(socket.fail_reads(1).never_writable());

    let result = initiate(&mut conn, &ctx, &quick_retry());

    assert!(matches!(result, Err(HandshakeError::NotWritable { .. })));
    assert_eq!(probe.read_failures(), 1);
    assert_eq!(probe.wait_calls(), 1);
    assert!(!conn.is_secured());

    conn.close();
    let _ = server.finish();
}

#[test]
fn non_tls_peer_fails_and_restores_connection() {
    let server = TestServer::spawn_plaintext(b"CFE_v1 cf-serverd 3.6.0\n").unwrap();
    let ctx = initialized_context(ContextConfig::default());
    let mut conn = Connection::new(server.connect().unwrap());
    conn.set_protocol_version(ProtocolVersion::Classic).unwrap();

    let result = initiate(&mut conn, &ctx, &quick_retry());

    assert!(result.is_err());
    assert!(!conn.is_secured());
    assert!(conn.session().is_none());
    assert!(conn.socket().is_some());
    assert_eq!(conn.protocol_version(), ProtocolVersion::Classic);

    conn.close();
    let _ = server.finish();
}

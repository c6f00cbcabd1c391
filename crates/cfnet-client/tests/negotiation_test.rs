//! Version negotiation and identity announcement over a live TLS session.

use std::net::TcpStream;

use cfnet_client::{
    AgentInfo, ClientContext, Connection, ContextConfig, HandshakeConfig, HostKeyPair,
    IdentityError, MemoryKeyStore, Negotiation, NegotiationError, RecvError, initiate,
    negotiate_protocol, send_identity,
};
use cfnet_harness::{FlakySocket, ServerScript, TestServer};
use cfnet_proto::{LineError, MAX_IDENTITY_LINE};

fn secured(server: &TestServer) -> Connection<TcpStream> {
    let mut ctx = ClientContext::new(
        MemoryKeyStore::with_keys(HostKeyPair::generate().unwrap()),
        ContextConfig::default(),
    );
    ctx.initialize().unwrap();

    let mut conn = Connection::new(server.connect().unwrap());
    let _ = initiate(&mut conn, &ctx, &HandshakeConfig::default()).unwrap();
    conn
}

fn agent() -> AgentInfo {
    AgentInfo::new(3, "cf-agent", "3.21.0")
}

#[test]
fn ok_reply_is_accepted() {
    let server = TestServer::spawn(
        ServerScript::new()
            .send_line("CFE_v3 cf-serverd 3.21.0")
            .receive_line()
            .send_line("OK WELCOME"),
    )
    .unwrap();
    let mut conn = secured(&server);

    let negotiation = negotiate_protocol(&mut conn, &agent()).unwrap();

    assert_eq!(negotiation, Negotiation::Accepted);
    conn.close();
    let report = server.finish().unwrap();
    assert_eq!(report.received_text(), vec!["CFE_v3 cf-agent 3.21.0\n".to_string()]);
}

#[test]
fn non_ok_replies_are_rejected() {
    for reply in ["NO", "BAD protocol", "ok lowercase", ""] {
        let server = TestServer::spawn(
            ServerScript::new().send_line("CFE_v3 cf-serverd 3.21.0").receive_line().send_line(reply),
        )
        .unwrap();
        let mut conn = secured(&server);

        let negotiation = negotiate_protocol(&mut conn, &agent()).unwrap();

        assert_eq!(negotiation, Negotiation::Rejected, "reply {reply:?}");
        assert!(conn.is_secured(), "rejection keeps the session open");
        conn.close();
        server.finish().unwrap();
    }
}

#[test]
fn unparsable_announcement_is_tolerated() {
    let server = TestServer::spawn(
        ServerScript::new().send_line("HELLO THERE").receive_line().send_line("OK"),
    )
    .unwrap();
    let mut conn = secured(&server);

    let negotiation = negotiate_protocol(&mut conn, &agent()).unwrap();

    assert!(negotiation.is_accepted());
    conn.close();
    server.finish().unwrap();
}

#[test]
fn server_hangup_before_reply_is_an_error() {
    let server =
        TestServer::spawn(ServerScript::new().send_line("CFE_v3 cf-serverd 3.21.0").receive_line())
            .unwrap();
    let mut conn = secured(&server);

    let result = negotiate_protocol(&mut conn, &agent());

    assert!(matches!(result, Err(NegotiationError::Recv(_))));
    conn.close();
    server.finish().unwrap();
}

#[test]
fn failed_send_is_a_hangup() {
    let server = TestServer::spawn(
        ServerScript::new().send_line("CFE_v3 cf-serverd 3.21.0").receive_to_end(),
    )
    .unwrap();
    let mut ctx = ClientContext::new(
        MemoryKeyStore::with_keys(HostKeyPair::generate().unwrap()),
        ContextConfig::default(),
    );
    ctx.initialize().unwrap();
    let (socket, probe) = FlakySocket::new(server.connect().unwrap());
    let mut conn = Connection::new(socket);
    let _ = initiate(&mut conn, &ctx, &HandshakeConfig::default()).unwrap();

    probe.hang_up();
    let result = negotiate_protocol(&mut conn, &agent());

    assert!(matches!(result, Err(NegotiationError::HungUp(_))));
    conn.close();
    let report = server.finish().unwrap();
    assert_eq!(report.received, vec![Vec::<u8>::new()]);
}

#[test]
fn oversized_announcement_is_an_error() {
    let long = "X".repeat(300);
    let server = TestServer::spawn(ServerScript::new().send_line(&long)).unwrap();
    let mut conn = secured(&server);

    let result = negotiate_protocol(&mut conn, &agent());

    assert!(matches!(result, Err(NegotiationError::Recv(RecvError::TooLong { .. }))));
    conn.close();
    server.finish().unwrap();
}

#[test]
fn oversized_version_line_sends_nothing() {
    let server = TestServer::spawn(
        ServerScript::new().send_line("CFE_v3 cf-serverd 3.21.0").receive_to_end(),
    )
    .unwrap();
    let mut conn = secured(&server);
    let agent = AgentInfo::new(3, "cf-agent", "9".repeat(200));

    let result = negotiate_protocol(&mut conn, &agent);

    assert!(matches!(result, Err(NegotiationError::Format(LineError::TooLong { .. }))));
    conn.close();
    let report = server.finish().unwrap();
    assert_eq!(report.received, vec![Vec::<u8>::new()]);
}

#[test]
fn plain_connection_cannot_negotiate() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut conn = Connection::new(TcpStream::connect(listener.local_addr().unwrap()).unwrap());

    assert!(matches!(negotiate_protocol(&mut conn, &agent()), Err(NegotiationError::NotSecured)));
    assert!(matches!(send_identity(&mut conn, None), Err(IdentityError::NotSecured)));
}

#[test]
fn identity_lines_on_the_wire() {
    let server = TestServer::spawn(ServerScript::new().receive_line().receive_line()).unwrap();
    let mut conn = secured(&server);

    send_identity(&mut conn, None).unwrap();
    send_identity(&mut conn, Some("alice")).unwrap();

    conn.close();
    let report = server.finish().unwrap();
    assert_eq!(
        report.received_text(),
        vec!["IDENTITY\n".to_string(), "IDENTITY USERNAME=alice\n".to_string()]
    );
}

#[test]
fn oversized_identity_writes_zero_bytes() {
    let server = TestServer::spawn(ServerScript::new().receive_to_end()).unwrap();
    let mut ctx = ClientContext::new(
        MemoryKeyStore::with_keys(HostKeyPair::generate().unwrap()),
        ContextConfig::default(),
    );
    ctx.initialize().unwrap();
    let (socket, probe) = FlakySocket::new(server.connect().unwrap());
    let mut conn = Connection::new(socket);
    let _ = initiate(&mut conn, &ctx, &HandshakeConfig::default()).unwrap();

    let written = probe.bytes_written();
    let username = "u".repeat(MAX_IDENTITY_LINE);
    let result = send_identity(&mut conn, Some(&username));

    assert!(matches!(result, Err(IdentityError::Format(LineError::TooLong { .. }))));
    assert_eq!(probe.bytes_written(), written);

    conn.close();
    let report = server.finish().unwrap();
    assert_eq!(report.received, vec![Vec::<u8>::new()]);
}

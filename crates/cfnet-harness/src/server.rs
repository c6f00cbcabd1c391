//! Scripted TLS test server.
//!
//! Accepts a single connection on a loopback port, completes the TLS
//! handshake (requesting and accepting any client certificate), then plays a
//! fixed script of sends and receives. Everything received is returned in a
//! [`ServerReport`] once the script ends.

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use rustls::{
    DigitallySignedStruct, DistinguishedName, ServerConfig, ServerConnection, SignatureScheme,
    StreamOwned,
    crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature},
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, UnixTime},
    server::danger::{ClientCertVerified, ClientCertVerifier},
};
use thiserror::Error;
use tracing::debug;

/// Bound on every blocking server-side read, so a broken test fails instead
/// of hanging.
const IO_TIMEOUT: Duration = Duration::from_secs(15);

/// Server-side failures
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Socket error
    #[error("server I/O failed: {0}")]
    Io(#[from] io::Error),

    /// TLS configuration or session error
    #[error("server TLS failed: {0}")]
    Tls(#[from] rustls::Error),

    /// Server certificate generation failed
    #[error("server certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),

    /// The server thread panicked
    #[error("server thread panicked")]
    Panicked,
}

/// One step of the server script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStep {
    /// Send these bytes.
    Send(Vec<u8>),
    /// Read one line, terminator included.
    ReceiveLine,
    /// Read until the client closes the connection.
    ReceiveToEnd,
}

/// Ordered list of server steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerScript {
    steps: Vec<ServerStep>,
}

impl ServerScript {
    /// Empty script: handshake only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `line` followed by a newline.
    pub fn send_line(mut self, line: &str) -> Self {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(cfnet_proto::LINE_TERMINATOR);
        self.steps.push(ServerStep::Send(bytes));
        self
    }

    /// Send raw bytes.
    pub fn send_raw(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.steps.push(ServerStep::Send(bytes.into()));
        self
    }

    /// Receive one line.
    pub fn receive_line(mut self) -> Self {
        self.steps.push(ServerStep::ReceiveLine);
        self
    }

    /// Receive everything until the client closes.
    pub fn receive_to_end(mut self) -> Self {
        self.steps.push(ServerStep::ReceiveToEnd);
        self
    }

    /// The standard server side of a negotiation that accepts the client.
    pub fn accepting() -> Self {
        Self::new().send_line("CFE_v2 cf-serverd 3.21.0").receive_line().send_line("OK WELCOME")
    }
}

/// What the server observed.
#[derive(Debug, Clone, Default)]
pub struct ServerReport {
    /// Data received, one entry per receive step.
    pub received: Vec<Vec<u8>>,
    /// Certificate chain presented by the client.
    pub client_certificates: Vec<CertificateDer<'static>>,
}

impl ServerReport {
    /// Received entries as lossy UTF-8.
    pub fn received_text(&self) -> Vec<String> {
        self.received.iter().map(|r| String::from_utf8_lossy(r).into_owned()).collect()
    }
}

/// A single-connection TLS server running on a background thread.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    certificate: CertificateDer<'static>,
    handle: JoinHandle<Result<ServerReport, HarnessError>>,
}

impl TestServer {
    /// Start a TLS server on a loopback port that will run `script`.
    pub fn spawn(script: ServerScript) -> Result<Self, HarnessError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
        let certificate = cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

        let mut config = ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(Arc::new(AcceptAnyClientCert { provider }))
            .with_single_cert(vec![certificate.clone()], key)?;
        // Tickets the client never reads turn its close into a reset.
        config.send_tls13_tickets = 0;
        let config = Arc::new(config);

        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let handle = thread::spawn(move || serve_tls(&listener, config, &script));

        Ok(Self { addr, certificate, handle })
    }

    /// Start a plaintext server that writes `reply` and hangs up, the way a
    /// peer that does not speak TLS answers a ClientHello.
    pub fn spawn_plaintext(reply: &[u8]) -> Result<Self, HarnessError> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let reply = reply.to_vec();
        let handle = thread::spawn(move || {
            let (mut tcp, _) = listener.accept()?;
            tcp.write_all(&reply)?;
            tcp.flush()?;
            Ok(ServerReport::default())
        });

        Ok(Self { addr, certificate: CertificateDer::from(Vec::new()), handle })
    }

    /// Address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Certificate the server presents.
    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.certificate
    }

    /// Open a blocking TCP connection to the server.
    pub fn connect(&self) -> io::Result<TcpStream> {
        TcpStream::connect(self.addr)
    }

    /// Wait for the script to finish and collect the report.
    pub fn finish(self) -> Result<ServerReport, HarnessError> {
        self.handle.join().map_err(|_| HarnessError::Panicked)?
    }
}

fn serve_tls(
    listener: &TcpListener,
    config: Arc<ServerConfig>,
    script: &ServerScript,
) -> Result<ServerReport, HarnessError> {
    let (tcp, peer) = listener.accept()?;
    tcp.set_read_timeout(Some(IO_TIMEOUT))?;
    tcp.set_write_timeout(Some(IO_TIMEOUT))?;
    debug!(%peer, "test server accepted connection");

    let mut tls = StreamOwned::new(ServerConnection::new(config)?, tcp);
    while tls.conn.is_handshaking() {
        tls.conn.complete_io(&mut tls.sock)?;
    }

    let mut report = ServerReport {
        client_certificates: tls.conn.peer_certificates().map(<[_]>::to_vec).unwrap_or_default(),
        ..ServerReport::default()
    };

    for step in &script.steps {
        match step {
            ServerStep::Send(bytes) => {
                tls.write_all(bytes)?;
                tls.flush()?;
            },
            ServerStep::ReceiveLine => report.received.push(read_line(&mut tls)?),
            ServerStep::ReceiveToEnd => report.received.push(read_to_end(&mut tls)?),
        }
    }

    tls.conn.send_close_notify();
    // The client may already be gone.
    let _ = tls.conn.complete_io(&mut tls.sock);

    Ok(report)
}

fn read_line(tls: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match tls.read(&mut byte) {
            Ok(0) => return Ok(line),
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == cfnet_proto::LINE_TERMINATOR {
                    return Ok(line);
                }
            },
            Err(e) if client_gone(&e) => return Ok(line),
            Err(e) => return Err(e),
        }
    }
}

fn read_to_end(tls: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match tls.read(&mut buf) {
            Ok(0) => return Ok(data),
            Ok(n) => data.extend_from_slice(&buf[..n]),
            Err(e) if client_gone(&e) => return Ok(data),
            Err(e) => return Err(e),
        }
    }
}

/// Client dropped the socket without close_notify, or with unread data.
fn client_gone(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset)
}

/// Requests a client certificate and accepts whatever is presented, after
/// checking the client holds its key.
#[derive(Debug)]
struct AcceptAnyClientCert {
    provider: Arc<CryptoProvider>,
}

impl ClientCertVerifier for AcceptAnyClientCert {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

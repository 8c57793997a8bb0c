// Shared fixtures: a scripted TLS engine and a scripted transport.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tls_socket_wrapper::{
    EngineError, Error, IoBridge, Result, Sigio, Socket, Timeout, TlsBackend, TlsContext,
    TlsSocketWrapper, TransportControl, VerifyFailure, VerifyPolicy, allow_clock_skew,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn peer_address() -> SocketAddr {
    "192.0.2.10:443".parse().unwrap()
}

thread_local! {
    static DROPPED: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Ids of mock credentials released on this thread
pub fn dropped() -> Vec<String> {
    DROPPED.with(|log| log.borrow().clone())
}

fn record_drop(id: &str) {
    DROPPED.with(|log| log.borrow_mut().push(id.to_string()));
}

/// Parsed from `CERT:<id>`
#[derive(Debug)]
pub struct MockCert {
    pub id: String,
}

impl Drop for MockCert {
    fn drop(&mut self) {
        record_drop(&self.id);
    }
}

/// Parsed from `CERT:<id>` + `KEY:<anything>`
#[derive(Debug)]
pub struct MockIdentity {
    pub id: String,
}

impl Drop for MockIdentity {
    fn drop(&mut self) {
        record_drop(&format!("identity:{}", self.id));
    }
}

pub struct MockConfig {
    pub ca: Option<String>,
    pub identity: Option<String>,
    pub policy: VerifyPolicy,
    /// Verification failure the "server" presents
    pub peer_failure: Option<VerifyFailure>,
    /// Server answers the hello with a fatal alert
    pub fail_handshake: bool,
    /// Handshake steps run by contexts created from this config
    pub steps: Arc<AtomicUsize>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            ca: None,
            identity: None,
            policy: Arc::new(allow_clock_skew),
            peer_failure: None,
            fail_handshake: false,
            steps: Arc::new(AtomicUsize::new(0)),
        }
    }
}

pub struct MockContext {
    pub hostname: Option<String>,
    peer_failure: Option<VerifyFailure>,
    policy: VerifyPolicy,
    fail_handshake: bool,
    established: bool,
    overridden: Option<VerifyFailure>,
    pub steps: Arc<AtomicUsize>,
}

fn engine_error(error: Error, want: EngineError) -> EngineError {
    match error {
        Error::WouldBlock => want,
        other => EngineError::Transport(other.to_string()),
    }
}

impl TlsContext for MockContext {
    fn handshake(&mut self, io: &mut IoBridge<'_>) -> std::result::Result<(), EngineError> {
        self.steps.fetch_add(1, Ordering::SeqCst);
        if self.established {
            return Ok(());
        }
        let mut buf = [0u8; 64];
        match io.recv(&mut buf) {
            Ok(0) => Err(EngineError::Protocol("eof during handshake".into())),
            Ok(_) => {
                if self.fail_handshake {
                    return Err(EngineError::Protocol("handshake_failure alert".into()));
                }
                if let Some(failure) = self.peer_failure.clone() {
                    if !(self.policy)(&failure) {
                        return Err(EngineError::Verification(failure.to_string()));
                    }
                    self.overridden = Some(failure);
                }
                self.established = true;
                Ok(())
            }
            Err(e) => Err(engine_error(e, EngineError::WantRead)),
        }
    }

    fn write(&mut self, io: &mut IoBridge<'_>, data: &[u8]) -> std::result::Result<usize, EngineError> {
        io.send(data).map_err(|e| engine_error(e, EngineError::WantWrite))
    }

    fn read(&mut self, io: &mut IoBridge<'_>, buf: &mut [u8]) -> std::result::Result<usize, EngineError> {
        match io.recv(buf) {
            Ok(0) => Err(EngineError::PeerClosed),
            Ok(size) => Ok(size),
            Err(e) => Err(engine_error(e, EngineError::WantRead)),
        }
    }

    fn close_notify(&mut self, io: &mut IoBridge<'_>) -> std::result::Result<(), EngineError> {
        io.send(b"CLOSE_NOTIFY")
            .map(|_| ())
            .map_err(|e| engine_error(e, EngineError::WantWrite))
    }

    fn peer_certificate(&self) -> Option<Vec<u8>> {
        self.established.then(|| b"PEER".to_vec())
    }

    fn verify_result(&self) -> Option<VerifyFailure> {
        self.overridden.clone()
    }
}

pub struct MockBackend;

fn parse_id(data: &[u8], prefix: &str) -> std::result::Result<String, EngineError> {
    let text = std::str::from_utf8(data).map_err(|e| EngineError::Credential(e.to_string()))?;
    text.strip_prefix(prefix)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EngineError::Credential(format!("expected {}<id>", prefix)))
}

impl TlsBackend for MockBackend {
    type Config = MockConfig;
    type Certificate = MockCert;
    type Identity = MockIdentity;
    type Context = MockContext;

    fn default_config() -> std::result::Result<MockConfig, EngineError> {
        Ok(MockConfig::default())
    }

    fn parse_certificates(data: &[u8]) -> std::result::Result<MockCert, EngineError> {
        Ok(MockCert {
            id: parse_id(data, "CERT:")?,
        })
    }

    fn parse_identity(cert: &[u8], key: &[u8]) -> std::result::Result<MockIdentity, EngineError> {
        let id = parse_id(cert, "CERT:")?;
        parse_id(key, "KEY:")?;
        Ok(MockIdentity { id })
    }

    fn install_ca_chain(
        config: &mut MockConfig,
        chain: Option<&MockCert>,
    ) -> std::result::Result<(), EngineError> {
        config.ca = chain.map(|cert| cert.id.clone());
        Ok(())
    }

    fn install_identity(
        config: &mut MockConfig,
        identity: Option<&MockIdentity>,
    ) -> std::result::Result<(), EngineError> {
        config.identity = identity.map(|id| id.id.clone());
        Ok(())
    }

    fn set_verify_policy(config: &mut MockConfig, policy: VerifyPolicy) {
        config.policy = policy;
    }

    fn new_context(
        config: &MockConfig,
        hostname: Option<&str>,
    ) -> std::result::Result<MockContext, EngineError> {
        Ok(MockContext {
            hostname: hostname.map(str::to_string),
            peer_failure: config.peer_failure.clone(),
            policy: config.policy.clone(),
            fail_handshake: config.fail_handshake,
            established: false,
            overridden: None,
            steps: Arc::clone(&config.steps),
        })
    }
}

/// One scripted `recv` outcome
#[derive(Debug, Clone)]
pub enum Step {
    /// Would block, then signal readiness right away
    WouldBlock,
    /// Would block with no readiness signal
    Stall,
    /// Deliver bytes
    Data(Vec<u8>),
    /// Orderly end of stream
    Eof,
    /// Transport failure
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    AlreadyConnected,
    Refused,
}

/// Shared view of what a scripted transport was asked to do
#[derive(Clone, Default)]
pub struct Probe {
    pub log: Arc<Mutex<Vec<String>>>,
    pub sent: Arc<Mutex<Vec<u8>>>,
    /// Make every later `send` fail
    pub fail_send: Arc<AtomicBool>,
    /// Make `close` fail
    pub fail_close: Arc<AtomicBool>,
}

impl Probe {
    pub fn break_send(&self) {
        self.fail_send.store(true, Ordering::SeqCst);
    }

    pub fn break_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    pub fn count(&self, entry: &str) -> usize {
        self.log.lock().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

pub struct ScriptedTransport {
    script: VecDeque<Step>,
    probe: Probe,
    sigio: Option<Sigio>,
    connect: ConnectOutcome,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Step>) -> (Self, Probe) {
        let probe = Probe::default();
        let transport = Self {
            script: script.into(),
            probe: probe.clone(),
            sigio: None,
            connect: ConnectOutcome::Connected,
        };
        (transport, probe)
    }

    pub fn with_connect(mut self, outcome: ConnectOutcome) -> Self {
        self.connect = outcome;
        self
    }

    fn log(&self, entry: impl Into<String>) {
        self.probe.log.lock().push(entry.into());
    }

    /// Fire the registered readiness callback
    pub fn signal(&self) {
        if let Some(callback) = &self.sigio {
            callback();
        }
    }
}

impl Socket for ScriptedTransport {
    fn connect(&mut self, _address: SocketAddr) -> Result<()> {
        self.log("connect");
        match self.connect {
            ConnectOutcome::Connected => Ok(()),
            ConnectOutcome::AlreadyConnected => Err(Error::IsConnected),
            ConnectOutcome::Refused => Err(Error::NoConnection),
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        if self.probe.fail_send.load(Ordering::SeqCst) {
            return Err(Error::DeviceError("link down".into()));
        }
        self.probe.sent.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.script.pop_front() {
            None | Some(Step::Stall) => Err(Error::WouldBlock),
            Some(Step::WouldBlock) => {
                self.signal();
                Err(Error::WouldBlock)
            }
            Some(Step::Data(data)) => {
                let size = data.len().min(buf.len());
                buf[..size].copy_from_slice(&data[..size]);
                Ok(size)
            }
            Some(Step::Eof) => Ok(0),
            Some(Step::Fail) => Err(Error::DeviceError("link down".into())),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.log("close");
        if self.probe.fail_close.load(Ordering::SeqCst) {
            return Err(Error::NoConnection);
        }
        Ok(())
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.log(format!("blocking={}", blocking));
    }

    fn set_timeout(&mut self, timeout: Timeout) {
        self.log(format!("timeout={}", timeout.as_millis()));
    }

    fn sigio(&mut self, callback: Option<Sigio>) {
        self.log(if callback.is_some() { "sigio" } else { "sigio-cleared" });
        self.sigio = callback;
    }

    fn getpeername(&self) -> Result<SocketAddr> {
        Ok(peer_address())
    }
}

pub type MockSession = TlsSocketWrapper<MockBackend, ScriptedTransport>;

/// Session over a scripted transport, with the given timeout
pub fn session(script: Vec<Step>, timeout: Timeout) -> (MockSession, Probe) {
    session_with(script, timeout, TransportControl::ConnectAndClose)
}

pub fn session_with(
    script: Vec<Step>,
    timeout: Timeout,
    control: TransportControl,
) -> (MockSession, Probe) {
    init_logging();
    let (transport, probe) = ScriptedTransport::new(script);
    let mut session = TlsSocketWrapper::new(transport, Some("device.example.com"), control).unwrap();
    session.set_timeout(timeout);
    (session, probe)
}

/// Handshake steps recorded by the session's engine context
pub fn steps(session: &MockSession) -> usize {
    session
        .ssl_context()
        .map_or(0, |ctx| ctx.steps.load(Ordering::SeqCst))
}

pub fn hello() -> Step {
    Step::Data(b"SERVER_HELLO".to_vec())
}

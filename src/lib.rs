/*!
# TLS Socket Wrapper

A TLS client session layered over any non-blocking, connection-oriented
socket, exposed through the same socket interface so it can stand in for the
plain socket it wraps.

## Overview

This library provides:

- An incremental handshake state machine that is re-entrant across calls
- Blocking, non-blocking and deadline-bounded operation, driven by transport
  readiness callbacks
- Credential handling with explicit owned/external slots for the CA chain,
  client identity and engine configuration
- A clock-skew tolerant certificate verification policy for devices whose
  clock may be unset at boot
- A rustls engine backend (feature `rustls-backend`, on by default)
- An in-memory transport pair for testing and loopback use

## Example

```no_run
use tls_socket_wrapper::{MemoryTransport, Timeout, client};

# fn main() -> tls_socket_wrapper::Result<()> {
# let ca_pem = "";
let (transport, _server_side) = MemoryTransport::pair();
let mut session = client("device.example.com")
    .with_root_ca(ca_pem)
    .with_timeout(Timeout::Infinite)
    .build(transport)?;

session.connect("127.0.0.1:443".parse().unwrap())?;
session.send(b"GET / HTTP/1.0\r\n\r\n")?;
# Ok(())
# }
```
*/

// Core components
pub mod core;

// Builder, Socket impl and std::io adapters
pub mod protocol;

// Re-export commonly used types for convenience
pub use core::constants::VERSION;
pub use core::engine::verify::{allow_clock_skew, certificate_fingerprint};
pub use core::engine::{IoBridge, TlsBackend, TlsContext, VerifyFailure, VerifyPolicy};
pub use core::error::{EngineError, Error, Result};
pub use core::readiness::Readiness;
pub use core::session::{Credentials, HandshakeState, Slot, TlsSocketWrapper, TransportControl};
pub use core::socket::{Sigio, Socket, Timeout};
pub use core::transport::{MemoryTransport, loopback};

// Re-export protocol builder and extension traits
pub use protocol::builder::TlsSocketBuilder;
pub use protocol::stream::{TlsReadExt, TlsWriteExt};

// Re-export the rustls backend
#[cfg(feature = "rustls-backend")]
pub use core::engine::rustls_backend::{
    CertificateChain, ClientIdentity, ProtocolVersions, RustlsBackend, RustlsConfig, RustlsContext,
    VerifyMode,
};
#[cfg(feature = "rustls-backend")]
pub use core::session::TlsSocket;
#[cfg(feature = "rustls-backend")]
pub use protocol::builder::client;

//! Leaf certificate retrieval over TLS.
//!
//! Peer verification is switched off: the point is to look at whatever
//! certificate a server presents, including self-signed or expired ones.

use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::debug;
use openssl::ssl::{Ssl, SslContext, SslMethod, SslVerifyMode};

use crate::{Certificate, SanCheckError};

/// Source of peer certificates.
///
/// Implementations never fail: any problem reaching `host:port` is reported
/// as `None`.
pub trait CertificateFetcher {
    fn fetch(&self, host: &str, port: u16, timeout: Duration) -> Option<Certificate>;
}

/// Fetches certificates with a real TCP connection and TLS handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsFetcher;

impl TlsFetcher {
    /// Connects to `host:port` and returns the peer's leaf certificate.
    ///
    /// `timeout` bounds the TCP connect (across all resolved addresses) and
    /// every read and write of the handshake. `host` is sent as SNI unless it
    /// is an IP literal.
    pub fn try_fetch(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Certificate, SanCheckError> {
        if timeout.is_zero() {
            return Err(SanCheckError::InvalidInput {
                field: "timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let address = format!("{}:{}", host, port);
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| SanCheckError::DnsResolution {
                hostname: host.to_string(),
                source,
            })?
            .collect();

        let tcp_stream = connect(&address, &addrs, timeout)?;
        tcp_stream.set_read_timeout(Some(timeout))?;
        tcp_stream.set_write_timeout(Some(timeout))?;

        let mut context = SslContext::builder(SslMethod::tls())?;
        context.set_verify(SslVerifyMode::NONE);
        let context = context.build();

        let mut ssl = Ssl::new(&context)?;
        if host.parse::<IpAddr>().is_err() {
            ssl.set_hostname(host)?;
        }

        let mut stream = ssl.connect(tcp_stream)?;
        let peer = stream
            .ssl()
            .peer_certificate()
            .ok_or_else(|| SanCheckError::CertificateError {
                reason: format!("{} presented no certificate", address),
            })?;
        let certificate = Certificate::from_x509(&peer)?;

        // best effort close_notify, the socket is dropped either way
        let _ = stream.shutdown();
        Ok(certificate)
    }
}

impl CertificateFetcher for TlsFetcher {
    fn fetch(&self, host: &str, port: u16, timeout: Duration) -> Option<Certificate> {
        match self.try_fetch(host, port, timeout) {
            Ok(certificate) => Some(certificate),
            Err(e) => {
                debug!("No certificate from {}:{}: {}", host, port, e);
                None
            }
        }
    }
}

fn connect(
    address: &str,
    addrs: &[SocketAddr],
    timeout: Duration,
) -> Result<TcpStream, SanCheckError> {
    let deadline = Instant::now() + timeout;
    let mut last_error = None;

    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SanCheckError::Timeout {
                operation: format!("connect to {}", address),
            });
        }
        match TcpStream::connect_timeout(addr, remaining) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    match last_error {
        Some(source) => Err(SanCheckError::ConnectionFailed {
            address: address.to_string(),
            source,
        }),
        None => Err(SanCheckError::Other {
            message: format!("{} resolved to no addresses", address),
        }),
    }
}

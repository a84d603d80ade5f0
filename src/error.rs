//! Error types for SAN certificate probing.
//!
//! Only [`SanCheckError::NoCertificate`] ever reaches the caller of a trace;
//! the other variants describe why a single fetch failed and are logged
//! before the fetch is reported as absent.

use std::fmt;
use std::io;

/// Error type for certificate probing failures.
#[derive(Debug)]
pub enum SanCheckError {
    /// DNS resolution failed for the given hostname
    DnsResolution {
        /// The hostname that failed to resolve
        hostname: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TCP connection failed to the target address
    ConnectionFailed {
        /// The address (host:port) that connection failed to
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TLS handshake failed
    HandshakeFailed {
        /// Details about why the handshake failed
        details: String,
    },

    /// Certificate parsing error
    CertificateError {
        /// Description of what went wrong
        reason: String,
    },

    /// Network operation timeout
    Timeout {
        /// Description of which operation timed out
        operation: String,
    },

    /// Invalid input provided to the API
    InvalidInput {
        /// Which field/parameter was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },

    /// The source host did not present a certificate
    NoCertificate {
        /// Source host
        host: String,
        /// Source port
        port: u16,
    },

    /// OpenSSL error occurred
    OpenSSLError {
        /// The underlying OpenSSL error
        details: String,
    },

    /// Generic I/O error
    IoError {
        /// The underlying I/O error
        source: io::Error,
    },

    /// A generic error with a custom message
    Other {
        /// Error message
        message: String,
    },
}

impl fmt::Display for SanCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DnsResolution { hostname, .. } => {
                write!(f, "Failed to resolve hostname: {}", hostname)
            }
            Self::ConnectionFailed { address, .. } => {
                write!(f, "Connection failed to: {}", address)
            }
            Self::HandshakeFailed { details } => {
                write!(f, "TLS handshake failed: {}", details)
            }
            Self::CertificateError { reason } => {
                write!(f, "Certificate error: {}", reason)
            }
            Self::Timeout { operation } => {
                write!(f, "Operation timed out: {}", operation)
            }
            Self::InvalidInput { field, reason } => {
                write!(f, "Invalid input for '{}': {}", field, reason)
            }
            Self::NoCertificate { host, port } => {
                write!(
                    f,
                    "No certificate retrieved from source host {}:{}",
                    host, port
                )
            }
            Self::OpenSSLError { details } => {
                write!(f, "OpenSSL error: {}", details)
            }
            Self::IoError { source } => {
                write!(f, "I/O error: {}", source)
            }
            Self::Other { message } => {
                write!(f, "{}", message)
            }
        }
    }
}

impl std::error::Error for SanCheckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DnsResolution { source, .. } => Some(source),
            Self::ConnectionFailed { source, .. } => Some(source),
            Self::IoError { source } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for SanCheckError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout {
                operation: e.to_string(),
            },
            _ => Self::IoError { source: e },
        }
    }
}

impl From<openssl::error::ErrorStack> for SanCheckError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::OpenSSLError {
            details: e.to_string(),
        }
    }
}

impl<S: fmt::Debug> From<openssl::ssl::HandshakeError<S>> for SanCheckError {
    fn from(e: openssl::ssl::HandshakeError<S>) -> Self {
        Self::HandshakeFailed {
            details: format!("{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = SanCheckError::InvalidInput {
            field: "hostname".to_string(),
            reason: "cannot be empty".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid input for 'hostname': cannot be empty"
        );
    }

    #[test]
    fn test_no_certificate_display() {
        let err = SanCheckError::NoCertificate {
            host: "example.com".to_string(),
            port: 8443,
        };
        assert_eq!(
            err.to_string(),
            "No certificate retrieved from source host example.com:8443"
        );
    }

    #[test]
    fn test_timeout_io_error_maps_to_timeout() {
        let err: SanCheckError = io::Error::new(io::ErrorKind::TimedOut, "connect").into();
        assert!(matches!(err, SanCheckError::Timeout { .. }));

        let err: SanCheckError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, SanCheckError::IoError { .. }));
        assert!(err.source().is_some());
    }
}

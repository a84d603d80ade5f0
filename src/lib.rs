//! Trace which Subject Alternative Names of a TLS certificate are live.
//!
//! `sanchecker` connects to a host, reads its leaf certificate, pulls the
//! DNS names out of the Subject Alternative Name extension and then connects
//! to every one of those names on a set of ports. Each name/port that answers
//! with a certificate is reported together with whether it is the very same
//! certificate the source host presented.
//!
//! ```no_run
//! use sanchecker::ProbeConfig;
//!
//! let mut config = ProbeConfig::new("example.com");
//! config.try_ports = vec![443, 8443];
//!
//! let trace = sanchecker::trace(&config)?;
//! for result in &trace.results {
//!     println!("{}:{} match={}", result.hostname, result.port, result.is_match);
//! }
//! # Ok::<(), sanchecker::SanCheckError>(())
//! ```

use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::hash::{DigestBytes, MessageDigest};
use openssl::nid::Nid;
use openssl::x509::{X509NameRef, X509Ref, X509};
use serde::Serialize;

pub mod config;
pub mod error;
pub mod fetch;
pub mod hostname;
pub mod probe;
pub mod san;

pub use error::SanCheckError;
pub use fetch::{CertificateFetcher, TlsFetcher};
pub use probe::{ProbeConfig, ProbeResult, SanProbe, SourceSummary, Trace};
pub use san::SanMode;

/// Leaf certificate presented by a TLS server.
///
/// Only the pieces needed to compare certificates are kept: the subject
/// common name, the thumbprint, the expiry and the raw Subject Alternative
/// Name extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Certificate {
    pub subject_common_name: String,
    /// SHA-1 of the DER encoding, upper-case hex
    pub thumbprint: String,
    pub not_after: DateTime<Utc>,
    pub validity_days: i32,
    pub is_expired: bool,
    #[serde(skip)]
    der: Vec<u8>,
    #[serde(skip)]
    san_extension: Option<Vec<u8>>,
}

impl Certificate {
    pub fn from_x509(cert: &X509Ref) -> Result<Certificate, SanCheckError> {
        let der = cert.to_der()?;
        let now = Asn1Time::days_from_now(0)?;
        let diff = now.diff(cert.not_after())?;

        Ok(Certificate {
            subject_common_name: common_name(cert.subject_name()),
            thumbprint: thumbprint(&cert.digest(MessageDigest::sha1())?),
            not_after: to_datetime(cert.not_after())?,
            validity_days: diff.days,
            is_expired: diff.days < 0 || (diff.days == 0 && diff.secs < 0),
            san_extension: san::find_san_extension(&der),
            der,
        })
    }

    pub fn from_der(der: &[u8]) -> Result<Certificate, SanCheckError> {
        let cert = X509::from_der(der)?;
        Certificate::from_x509(&cert)
    }

    pub fn from_pem(pem: &[u8]) -> Result<Certificate, SanCheckError> {
        let cert = X509::from_pem(pem)?;
        Certificate::from_x509(&cert)
    }

    /// DER encoding of the whole certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Raw value of the Subject Alternative Name extension (OID 2.5.29.17).
    pub fn san_extension(&self) -> Option<&[u8]> {
        self.san_extension.as_deref()
    }

    /// Whether `other` is byte-for-byte the same certificate.
    pub fn same_as(&self, other: &Certificate) -> bool {
        self.thumbprint == other.thumbprint
    }
}

/// Probes `config.host` and every SAN hostname found in its certificate.
///
/// Shorthand for running a [`SanProbe`] with the network [`TlsFetcher`].
pub fn trace(config: &ProbeConfig) -> Result<Trace, SanCheckError> {
    SanProbe::new(TlsFetcher).run(config)
}

fn common_name(name: &X509NameRef) -> String {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .or_else(|| name.entries().next())
        .and_then(|entry| entry.data().to_string().ok())
        .unwrap_or_default()
}

fn to_datetime(time: &Asn1TimeRef) -> Result<DateTime<Utc>, SanCheckError> {
    let since_epoch = Asn1Time::from_unix(0)?.diff(time)?;
    let seconds = i64::from(since_epoch.days) * 86_400 + i64::from(since_epoch.secs);
    DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| SanCheckError::CertificateError {
        reason: format!("expiry {} is out of range", time),
    })
}

fn thumbprint(digest: &DigestBytes) -> String {
    digest.iter().map(|b| format!("{:02X}", b)).collect()
}

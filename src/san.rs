//! Subject Alternative Name extraction.
//!
//! The extension value is an ASN.1 `SEQUENCE OF GeneralName`. Two readings
//! are supported:
//!
//! - [`SanMode::Dns`] decodes the sequence and keeps the `dNSName` entries.
//! - [`SanMode::Legacy`] renders every entry as `<Type>=<value>` text and
//!   splits it on `=`, `:`, `,` and line breaks, keeping every second token.
//!   Entry types are not told apart, so addresses and URIs come out as
//!   candidates too and values containing a delimiter are cut apart.
//!
//! Both return entries in certificate order and keep duplicates. A missing
//! or malformed extension yields no entries.

use std::net::{Ipv4Addr, Ipv6Addr};

use log::debug;
use strum_macros::{Display, EnumString};
use x509_parser::oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME;
use x509_parser::prelude::*;

use crate::Certificate;

/// How SAN entries are read out of the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SanMode {
    /// DNS-name entries of the decoded `GeneralNames`
    #[default]
    Dns,
    /// Text rendering split on punctuation, all entry types
    Legacy,
}

/// Returns the SAN values of `cert` according to `mode`.
pub fn extract_sans(cert: &Certificate, mode: SanMode) -> Vec<String> {
    match cert.san_extension() {
        Some(raw) => extract_from_extension(raw, mode),
        None => Vec::new(),
    }
}

/// Decodes a raw SAN extension value.
pub fn extract_from_extension(raw: &[u8], mode: SanMode) -> Vec<String> {
    let san = match SubjectAlternativeName::from_der(raw) {
        Ok((_, san)) => san,
        Err(e) => {
            debug!("Ignoring malformed Subject Alternative Name extension: {}", e);
            return Vec::new();
        }
    };

    match mode {
        SanMode::Dns => san
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        SanMode::Legacy => split_rendered(&render_general_names(&san.general_names)),
    }
}

/// Finds the value of the SAN extension (OID 2.5.29.17) in a DER certificate.
pub fn find_san_extension(der: &[u8]) -> Option<Vec<u8>> {
    let (_, cert) = parse_x509_certificate(der).ok()?;
    cert.extensions()
        .iter()
        .find(|ext| ext.oid == OID_X509_EXT_SUBJECT_ALT_NAME)
        .map(|ext| ext.value.to_vec())
}

/// One `<Type>=<value>` line per entry.
pub fn render_general_names(names: &[GeneralName]) -> String {
    names
        .iter()
        .map(|name| match name {
            GeneralName::DNSName(dns) => format!("DNS Name={}", dns),
            GeneralName::RFC822Name(email) => format!("RFC822 Name={}", email),
            GeneralName::URI(uri) => format!("URL={}", uri),
            GeneralName::IPAddress(bytes) => format!("IP Address={}", render_ip(bytes)),
            GeneralName::RegisteredID(oid) => format!("Registered ID={}", oid),
            GeneralName::DirectoryName(dn) => format!("Directory Address:{}", dn),
            GeneralName::OtherName(oid, _) => format!("Other Name:{}", oid),
            _ => "Unknown:".to_string(),
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Splits rendered SAN text into tokens and keeps the value half of each
/// `(type, value)` pair. A trailing unpaired token is dropped.
pub fn split_rendered(text: &str) -> Vec<String> {
    let tokens: Vec<&str> = text
        .split(|c| matches!(c, '=' | ':' | ',' | '\r' | '\n'))
        .filter(|token| !token.is_empty())
        .collect();

    tokens
        .chunks_exact(2)
        .map(|pair| pair[1].to_string())
        .collect()
}

fn render_ip(bytes: &[u8]) -> String {
    match bytes.len() {
        4 => Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string(),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            Ipv6Addr::from(octets).to_string()
        }
        _ => bytes.iter().map(|b| format!("{:02X}", b)).collect(),
    }
}

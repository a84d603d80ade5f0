//! The probe pipeline: source certificate, SAN candidates, fan-out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::fetch::CertificateFetcher;
use crate::hostname::is_valid_hostname;
use crate::san::{extract_sans, SanMode};
use crate::{Certificate, SanCheckError};

pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Resolved, validated input of a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Source host, a hostname or IP literal
    pub host: String,
    /// Port of the source probe
    pub port: u16,
    /// Ports tried on every SAN hostname, in order
    pub try_ports: Vec<u16>,
    /// Per connection timeout, covers connect and handshake
    pub timeout: Duration,
    /// Number of SAN probes in flight; 1 probes sequentially
    pub concurrency: usize,
    pub san_mode: SanMode,
}

impl ProbeConfig {
    /// Config for `host` with the defaults: port 443, try port 443, 1s timeout.
    pub fn new(host: &str) -> Self {
        ProbeConfig {
            host: host.to_string(),
            port: DEFAULT_PORT,
            try_ports: vec![DEFAULT_PORT],
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            concurrency: 1,
            san_mode: SanMode::default(),
        }
    }
}

/// Identity of the certificate presented by the source host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub hostname: String,
    pub port: u16,
    pub subject_common_name: String,
    pub thumbprint: String,
}

/// Outcome of one successful SAN hostname/port probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub hostname: String,
    pub port: u16,
    pub subject_common_name: String,
    pub thumbprint: String,
    /// Not-after of the presented certificate, RFC 3339 in JSON
    pub expiry: DateTime<Utc>,
    pub validity_days: i32,
    pub is_expired: bool,
    /// The probed host presented the source certificate
    #[serde(rename = "match")]
    pub is_match: bool,
}

impl ProbeResult {
    pub fn compare(source: &Certificate, candidate: &Certificate, hostname: &str, port: u16) -> Self {
        ProbeResult {
            hostname: hostname.to_string(),
            port,
            subject_common_name: candidate.subject_common_name.clone(),
            thumbprint: candidate.thumbprint.clone(),
            expiry: candidate.not_after,
            validity_days: candidate.validity_days,
            is_expired: candidate.is_expired,
            is_match: candidate.same_as(source),
        }
    }
}

/// Source summary followed by the results in hostname, then port order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trace {
    pub source: SourceSummary,
    pub results: Vec<ProbeResult>,
}

impl Trace {
    pub fn mismatches(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|result| !result.is_match)
    }
}

/// SAN entries worth probing: valid hostnames other than `host` itself.
///
/// Order is kept and duplicates are not removed.
pub fn candidate_hostnames(sans: Vec<String>, host: &str) -> Vec<String> {
    sans.into_iter()
        .filter(|san| is_valid_hostname(san) && san != host)
        .collect()
}

/// Runs traces with a given [`CertificateFetcher`].
pub struct SanProbe<F> {
    fetcher: F,
}

impl<F: CertificateFetcher + Sync> SanProbe<F> {
    pub fn new(fetcher: F) -> Self {
        SanProbe { fetcher }
    }

    /// Probes the source host and then every SAN hostname on every try port.
    ///
    /// Fails only when the source host yields no certificate. Candidates that
    /// cannot be reached are left out of the results.
    pub fn run(&self, config: &ProbeConfig) -> Result<Trace, SanCheckError> {
        info!("Connecting to host: {} TCP Port: {}", config.host, config.port);
        let source = self
            .fetcher
            .fetch(&config.host, config.port, config.timeout)
            .ok_or_else(|| SanCheckError::NoCertificate {
                host: config.host.clone(),
                port: config.port,
            })?;

        let sans = extract_sans(&source, config.san_mode);
        info!("Yielded {} Subject Alternative Names", sans.len());

        let candidates = candidate_hostnames(sans, &config.host);
        info!("Yielded {} valid hostnames", candidates.len());

        let jobs: Vec<(&str, u16)> = candidates
            .iter()
            .flat_map(|san| config.try_ports.iter().map(move |port| (san.as_str(), *port)))
            .collect();

        let results = if config.concurrency > 1 && jobs.len() > 1 {
            self.probe_parallel(&source, &jobs, config)
        } else {
            jobs.iter()
                .filter_map(|(host, port)| self.probe_one(&source, host, *port, config.timeout))
                .collect()
        };

        Ok(Trace {
            source: SourceSummary {
                hostname: config.host.clone(),
                port: config.port,
                subject_common_name: source.subject_common_name.clone(),
                thumbprint: source.thumbprint.clone(),
            },
            results,
        })
    }

    fn probe_one(
        &self,
        source: &Certificate,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Option<ProbeResult> {
        info!("Checking hostname: {} Port: {}", host, port);
        self.fetcher
            .fetch(host, port, timeout)
            .map(|candidate| ProbeResult::compare(source, &candidate, host, port))
    }

    fn probe_parallel(
        &self,
        source: &Certificate,
        jobs: &[(&str, u16)],
        config: &ProbeConfig,
    ) -> Vec<ProbeResult> {
        let next = AtomicUsize::new(0);
        let (sender, receiver) = mpsc::channel();

        thread::scope(|scope| {
            for _ in 0..config.concurrency.min(jobs.len()) {
                let sender = sender.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let (host, port) = match jobs.get(index) {
                        Some(job) => *job,
                        None => break,
                    };
                    if let Some(result) = self.probe_one(source, host, port, config.timeout) {
                        let _ = sender.send((index, result));
                    }
                });
            }
        });
        drop(sender);

        let mut collected: Vec<(usize, ProbeResult)> = receiver.into_iter().collect();
        collected.sort_by_key(|(index, _)| *index);
        collected.into_iter().map(|(_, result)| result).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::self_signed;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves fixed certificates per host:port and records every attempt.
    struct StubFetcher {
        certificates: HashMap<(String, u16), Certificate>,
        attempts: Mutex<Vec<(String, u16)>>,
    }

    impl StubFetcher {
        fn new() -> Self {
            StubFetcher {
                certificates: HashMap::new(),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn serve(mut self, host: &str, port: u16, certificate: &Certificate) -> Self {
            self.certificates
                .insert((host.to_string(), port), certificate.clone());
            self
        }

        fn attempts(&self) -> Vec<(String, u16)> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl CertificateFetcher for StubFetcher {
        fn fetch(&self, host: &str, port: u16, _timeout: Duration) -> Option<Certificate> {
            self.attempts.lock().unwrap().push((host.to_string(), port));
            self.certificates.get(&(host.to_string(), port)).cloned()
        }
    }

    fn certificate(common_name: &str, sans: &[&str]) -> Certificate {
        let (x509, _) = self_signed(common_name, sans, 90);
        Certificate::from_x509(&x509).unwrap()
    }

    #[test]
    fn test_candidates_exclude_source_host() {
        let sans = vec![
            "a.example.com".to_string(),
            "b.example.com".to_string(),
            "example.com".to_string(),
        ];
        assert_eq!(
            candidate_hostnames(sans, "example.com"),
            vec!["a.example.com", "b.example.com"]
        );
    }

    #[test]
    fn test_candidates_drop_invalid_and_keep_duplicates() {
        let sans = vec![
            "*.example.com".to_string(),
            "b.test".to_string(),
            "bad..name".to_string(),
            "b.test".to_string(),
        ];
        assert_eq!(candidate_hostnames(sans, "a.test"), vec!["b.test", "b.test"]);
    }

    #[test]
    fn test_shared_certificate_end_to_end() {
        let source = certificate("a.test", &["b.test", "c.test"]);
        let fetcher = StubFetcher::new()
            .serve("a.test", 443, &source)
            .serve("b.test", 443, &source)
            .serve("c.test", 443, &source);

        let trace = SanProbe::new(fetcher).run(&ProbeConfig::new("a.test")).unwrap();

        assert_eq!(trace.source.hostname, "a.test");
        assert_eq!(trace.source.subject_common_name, "a.test");
        assert_eq!(trace.source.thumbprint, source.thumbprint);

        let seen: Vec<(&str, u16, bool)> = trace
            .results
            .iter()
            .map(|r| (r.hostname.as_str(), r.port, r.is_match))
            .collect();
        assert_eq!(seen, vec![("b.test", 443, true), ("c.test", 443, true)]);
        assert_eq!(trace.mismatches().count(), 0);
    }

    #[test]
    fn test_different_certificate_does_not_match() {
        let source = certificate("a.test", &["b.test"]);
        let other = certificate("b.test", &["b.test"]);
        let fetcher = StubFetcher::new()
            .serve("a.test", 443, &source)
            .serve("b.test", 443, &other);

        let trace = SanProbe::new(fetcher).run(&ProbeConfig::new("a.test")).unwrap();

        assert_eq!(trace.results.len(), 1);
        let result = &trace.results[0];
        assert!(!result.is_match);
        assert_eq!(result.subject_common_name, "b.test");
        assert_eq!(result.thumbprint, other.thumbprint);
        assert_eq!(result.expiry, other.not_after);
        assert_eq!(trace.mismatches().count(), 1);
    }

    #[test]
    fn test_source_failure_is_fatal_and_stops_probing() {
        let fetcher = StubFetcher::new();
        let probe = SanProbe::new(fetcher);

        let err = probe.run(&ProbeConfig::new("a.test")).unwrap_err();

        assert!(matches!(
            err,
            SanCheckError::NoCertificate { ref host, port: 443 } if host == "a.test"
        ));
        assert_eq!(probe.fetcher.attempts(), vec![("a.test".to_string(), 443)]);
    }

    #[test]
    fn test_unreachable_candidates_are_skipped() {
        let source = certificate("a.test", &["b.test", "c.test"]);
        let fetcher = StubFetcher::new()
            .serve("a.test", 8443, &source)
            .serve("c.test", 8443, &source);

        let mut config = ProbeConfig::new("a.test");
        config.port = 8443;
        config.try_ports = vec![443, 8443];
        let probe = SanProbe::new(fetcher);
        let trace = probe.run(&config).unwrap();

        assert_eq!(trace.results.len(), 1);
        assert_eq!(trace.results[0].hostname, "c.test");
        assert_eq!(trace.results[0].port, 8443);
        assert_eq!(
            probe.fetcher.attempts(),
            vec![
                ("a.test".to_string(), 8443),
                ("b.test".to_string(), 443),
                ("b.test".to_string(), 8443),
                ("c.test".to_string(), 443),
                ("c.test".to_string(), 8443),
            ]
        );
    }

    #[test]
    fn test_parallel_results_keep_canonical_order() {
        let hosts = ["h1.test", "h2.test", "h3.test", "h4.test", "h5.test"];
        let source = certificate("src.test", &hosts);
        let other = certificate("other.test", &[]);

        let mut fetcher = StubFetcher::new().serve("src.test", 443, &source);
        for (i, host) in hosts.iter().enumerate() {
            let served = if i % 2 == 0 { &source } else { &other };
            fetcher = fetcher.serve(host, 443, served).serve(host, 8443, served);
        }

        let mut config = ProbeConfig::new("src.test");
        config.try_ports = vec![443, 8443];
        let probe = SanProbe::new(fetcher);

        let sequential = probe.run(&config).unwrap();
        config.concurrency = 4;
        let parallel = probe.run(&config).unwrap();

        assert_eq!(sequential, parallel);
        let order: Vec<(&str, u16)> = parallel
            .results
            .iter()
            .map(|r| (r.hostname.as_str(), r.port))
            .collect();
        let expected: Vec<(&str, u16)> = hosts
            .iter()
            .flat_map(|h| vec![(*h, 443), (*h, 8443)])
            .collect();
        assert_eq!(order, expected);
        assert_eq!(parallel.mismatches().count(), 4);
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let source = certificate("a.test", &["b.test", "c.test"]);
        let fetcher = StubFetcher::new()
            .serve("a.test", 443, &source)
            .serve("b.test", 443, &source);
        let probe = SanProbe::new(fetcher);
        let config = ProbeConfig::new("a.test");

        assert_eq!(probe.run(&config).unwrap(), probe.run(&config).unwrap());
    }

    #[test]
    fn test_result_serializes_match_field() {
        let source = certificate("a.test", &[]);
        let result = ProbeResult::compare(&source, &source, "b.test", 443);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["match"], serde_json::Value::Bool(true));
        assert_eq!(json["hostname"], "b.test");
    }
}

//! TLS impersonation targets.
//!
//! A [`TlsProfile`] pairs a browser's JA3 fingerprint with its ALPN offer and
//! header profile. The profile is turned into a rustls `ClientConfig` whose
//! cipher suites and key-exchange groups follow the order in the
//! fingerprint, so the ClientHello leads with the same preferences the
//! browser advertises instead of the system OpenSSL defaults.
//!
//! rustls does not expose extension order, GREASE values or legacy CBC
//! suites; entries of the fingerprint it cannot express are skipped.

use std::str::FromStr;
use std::sync::Arc;

use rustls::crypto::{CryptoProvider, SupportedKxGroup, ring};
use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use rustls::{ClientConfig, RootCertStore, SupportedCipherSuite, SupportedProtocolVersion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::headers::{BrowserType, HeaderProfile};

const TLS13_SUITE_PREFIX: u16 = 0x1300;

#[derive(Debug, Error)]
pub enum TlsProfileError {
    #[error("malformed ja3 fingerprint '{0}'")]
    InvalidJa3(String),
    #[error("{0:?} profile lists no cipher suite the TLS backend supports")]
    NoSupportedCipherSuites(BrowserType),
    #[error("no system root certificates found")]
    NoRootCertificates,
    #[error("failed to read root certificates: {0}")]
    RootCertificates(String),
    #[error("tls configuration rejected: {0}")]
    Config(#[from] rustls::Error),
}

/// Parsed JA3 string: `version,ciphers,extensions,groups,point_formats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ja3 {
    pub tls_version: u16,
    pub cipher_suites: Vec<u16>,
    pub extensions: Vec<u16>,
    pub groups: Vec<u16>,
    pub point_formats: Vec<u16>,
}

impl FromStr for Ja3 {
    type Err = TlsProfileError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || TlsProfileError::InvalidJa3(raw.to_string());
        let fields: Vec<&str> = raw.trim().split(',').collect();
        let &[version, ciphers, extensions, groups, point_formats] = fields.as_slice() else {
            return Err(invalid());
        };

        let list = |field: &str| -> Result<Vec<u16>, TlsProfileError> {
            field
                .split('-')
                .filter(|item| !item.is_empty())
                .map(|item| item.parse::<u16>().map_err(|_| invalid()))
                .collect()
        };

        Ok(Self {
            tls_version: version.parse().map_err(|_| invalid())?,
            cipher_suites: list(ciphers)?,
            extensions: list(extensions)?,
            groups: list(groups)?,
            point_formats: list(point_formats)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsProfile {
    pub browser: BrowserType,
    pub ja3: String,
    pub alpn_protocols: Vec<String>,
    pub headers: HeaderProfile,
}

impl TlsProfile {
    pub fn firefox() -> Self {
        Self {
            browser: BrowserType::Firefox,
            ja3: "771,4865-4867-4866-49195-49199-52393-52392-49196-49200-49162-49161-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-34-51-43-13-45-28-27-65037,4588-29-23-24-25-256-257,0".into(),
            alpn_protocols: vec!["h2".into(), "http/1.1".into()],
            headers: HeaderProfile::firefox(),
        }
    }

    pub fn chrome() -> Self {
        Self {
            browser: BrowserType::Chrome,
            ja3: "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513-65037,25497-29-23-24,0".into(),
            alpn_protocols: vec!["h2".into(), "http/1.1".into()],
            headers: HeaderProfile::chrome(),
        }
    }

    pub fn safari() -> Self {
        Self {
            browser: BrowserType::Safari,
            ja3: "771,4865-4866-4867-49196-49195-52393-49200-49199-52392-49162-49161-49172-49171-157-156-53-47-49160-49170-10,0-23-65281-10-11-16-5-13-18-51-45-43-27-21,29-23-24-25,0".into(),
            alpn_protocols: vec!["h2".into(), "http/1.1".into()],
            headers: HeaderProfile::safari(),
        }
    }

    pub fn for_browser(browser: BrowserType) -> Self {
        match browser {
            BrowserType::Firefox => Self::firefox(),
            BrowserType::Chrome => Self::chrome(),
            BrowserType::Safari => Self::safari(),
        }
    }

    /// Whether the profile advertises HTTP/2 during ALPN.
    pub fn offers_h2(&self) -> bool {
        self.alpn_protocols.iter().any(|proto| proto == "h2")
    }

    pub fn fingerprint(&self) -> Result<Ja3, TlsProfileError> {
        self.ja3.parse()
    }

    /// Crypto provider restricted to the fingerprint's cipher suites and
    /// groups, in fingerprint order.
    pub fn crypto_provider(&self) -> Result<CryptoProvider, TlsProfileError> {
        let ja3 = self.fingerprint()?;
        let base = ring::default_provider();

        let cipher_suites: Vec<SupportedCipherSuite> = ja3
            .cipher_suites
            .iter()
            .filter_map(|id| {
                base.cipher_suites
                    .iter()
                    .copied()
                    .find(|suite| u16::from(suite.suite()) == *id)
            })
            .collect();
        if cipher_suites.is_empty() {
            return Err(TlsProfileError::NoSupportedCipherSuites(self.browser));
        }

        let mut kx_groups: Vec<&'static dyn SupportedKxGroup> = ja3
            .groups
            .iter()
            .filter_map(|id| {
                base.kx_groups
                    .iter()
                    .copied()
                    .find(|group| u16::from(group.name()) == *id)
            })
            .collect();
        if kx_groups.is_empty() {
            kx_groups = base.kx_groups.clone();
        }

        Ok(CryptoProvider {
            cipher_suites,
            kx_groups,
            ..base
        })
    }

    /// Protocol versions implied by the fingerprint's cipher suites.
    pub fn protocol_versions(
        &self,
    ) -> Result<Vec<&'static SupportedProtocolVersion>, TlsProfileError> {
        let ja3 = self.fingerprint()?;
        let mut versions = Vec::new();
        if ja3.cipher_suites.iter().any(|id| id & 0xff00 == TLS13_SUITE_PREFIX) {
            versions.push(&rustls::version::TLS13);
        }
        if ja3.cipher_suites.iter().any(|id| id & 0xff00 != TLS13_SUITE_PREFIX) {
            versions.push(&rustls::version::TLS12);
        }
        Ok(versions)
    }

    /// Client configuration presenting this profile, trusting `roots`.
    pub fn client_config(&self, roots: RootCertStore) -> Result<ClientConfig, TlsProfileError> {
        let provider = Arc::new(self.crypto_provider()?);
        let versions = self.protocol_versions()?;

        let mut config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&versions)?
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = self
            .alpn_protocols
            .iter()
            .map(|proto| proto.as_bytes().to_vec())
            .collect();
        Ok(config)
    }
}

impl Default for TlsProfile {
    fn default() -> Self {
        Self::firefox()
    }
}

/// Root store loaded from the system certificate bundle OpenSSL would use.
pub fn system_roots() -> Result<RootCertStore, TlsProfileError> {
    let locations = openssl_probe::probe();
    let bundle = locations.cert_file.ok_or(TlsProfileError::NoRootCertificates)?;

    let certs = CertificateDer::pem_file_iter(&bundle)
        .map_err(|err| TlsProfileError::RootCertificates(format!("{}: {err}", bundle.display())))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| TlsProfileError::RootCertificates(format!("{}: {err}", bundle.display())))?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    log::debug!("loaded {added} root certificates from {} ({ignored} ignored)", bundle.display());

    if roots.is_empty() {
        return Err(TlsProfileError::NoRootCertificates);
    }
    Ok(roots)
}

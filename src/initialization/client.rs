//! HTTP client initialization.
//!
//! This module builds the clients used by one logical request. Redirects are
//! always disabled at the client level so the redirect chain can be followed
//! and recorded manually.

use log::warn;
use reqwest::tls::Version;
use reqwest::{Certificate, Client, ClientBuilder, Identity, Url};

use crate::config::DEFAULT_USER_AGENT;
use crate::error_handling::InitializationError;
use crate::request::TlsOptions;

/// Clients for one logical request: one for plain HTTP and one carrying the
/// TLS options, so that certificate settings only ever apply to `https`.
#[derive(Debug, Clone)]
pub struct Clients {
    plain: Client,
    secure: Client,
}

impl Clients {
    /// Picks the client matching the URL scheme.
    pub fn for_url(&self, url: &Url) -> &Client {
        if url.scheme() == "https" {
            &self.secure
        } else {
            &self.plain
        }
    }
}

fn base_builder() -> ClientBuilder {
    ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(DEFAULT_USER_AGENT)
}

/// Initializes the clients for a request.
///
/// # Errors
///
/// Returns `InitializationError::HttpClientError` when the certificate,
/// identity or CA material cannot be loaded.
pub fn init_clients(tls: &TlsOptions) -> Result<Clients, InitializationError> {
    let plain = base_builder().build()?;
    let secure = if tls.is_empty() {
        plain.clone()
    } else {
        secure_builder(tls)?.build()?
    };
    Ok(Clients { plain, secure })
}

fn secure_builder(tls: &TlsOptions) -> Result<ClientBuilder, InitializationError> {
    let mut builder = base_builder();

    if let Some(pfx) = &tls.pfx {
        let identity = Identity::from_pkcs12_der(pfx, tls.passphrase.as_deref().unwrap_or(""))?;
        builder = builder.use_native_tls().identity(identity);
    } else if let (Some(cert), Some(key)) = (&tls.cert, &tls.key) {
        if tls.passphrase.is_some() {
            warn!("TLS passphrase is only used for pfx identities; the PEM key must be unencrypted");
        }
        let mut pem = cert.clone();
        pem.push(b'\n');
        pem.extend_from_slice(key);
        builder = builder.use_rustls_tls().identity(Identity::from_pem(&pem)?);
    } else if tls.cert.is_some() || tls.key.is_some() {
        warn!("TLS client identity needs both cert and key; ignoring the one supplied");
    }

    for ca in &tls.ca {
        builder = builder.add_root_certificate(Certificate::from_pem(ca)?);
    }

    if tls.reject_unauthorized == Some(false) {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(protocol) = &tls.secure_protocol {
        match min_tls_version(protocol) {
            Some(version) => builder = builder.min_tls_version(version),
            None => warn!("Unrecognized secureProtocol '{protocol}', using the TLS defaults"),
        }
    }
    if tls.ciphers.is_some() {
        warn!("TLS cipher selection is not configurable; ignoring ciphers");
    }
    if let Some(servername) = &tls.servername {
        warn!("TLS servername override '{servername}' is not supported; the URL host is used for SNI");
    }

    Ok(builder)
}

/// Maps a protocol name (`TLSv1.2`, `TLSv1_2_method`) to a minimum version.
fn min_tls_version(protocol: &str) -> Option<Version> {
    let normalized = protocol
        .trim_end_matches("_method")
        .replace('_', ".")
        .to_ascii_lowercase();
    match normalized.as_str() {
        "tlsv1" | "tlsv1.0" => Some(Version::TLS_1_0),
        "tlsv1.1" => Some(Version::TLS_1_1),
        "tlsv1.2" => Some(Version::TLS_1_2),
        "tlsv1.3" => Some(Version::TLS_1_3),
        _ => None,
    }
}

//! Shared HTTPS client used by adapters and webhook transports.

use std::sync::Arc;

use hyper::client::HttpConnector;
use hyper::{Body, Client};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use webpki_roots::TLS_SERVER_ROOTS;

/// Hyper client speaking both plain HTTP and HTTPS.
pub type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Builds a client trusting the bundled web PKI roots.
///
/// Plain `http://` URLs are allowed so local model servers and webhook
/// receivers work without TLS.
#[must_use]
pub fn build_https_client() -> HyperClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Client::builder()
        .pool_max_idle_per_host(10)
        .build::<_, Body>(connector)
}

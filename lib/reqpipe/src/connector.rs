//! HTTPS connector using rustls.

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;

use crate::ExecutorConfig;

/// Create a connector speaking plain HTTP and HTTPS over rustls.
///
/// HTTP/1.1 and HTTP/2 are both negotiated; trust anchors are the Mozilla
/// roots from `webpki-roots`. The TCP connect is bounded by
/// [`ExecutorConfig::connect_timeout`].
#[must_use]
pub fn https_connector(config: &ExecutorConfig) -> HttpsConnector<HttpConnector> {
    let root_store: rustls::RootCertStore =
        webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(config.connect_timeout));

    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http)
}

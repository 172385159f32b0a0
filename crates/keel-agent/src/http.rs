//! Minimal HTTPS GET with caller-supplied CA trust.
//!
//! Raw TCP connect, TLS via rustls with a root store built from the
//! supplied PEM bundle, then a hyper http1 handshake. The whole request
//! sits under one outer timeout; cancellation propagates by dropping
//! the future.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use http_body_util::BodyExt;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Split an `https://host[:port][/...]` base URL into host and port.
pub(crate) fn parse_authority(base_url: &str) -> anyhow::Result<(String, u16)> {
    let rest = base_url
        .strip_prefix("https://")
        .with_context(|| format!("management server URL must be https: {base_url}"))?;
    let authority = rest.split('/').next().unwrap_or(rest);

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid port in {authority}"))?;
            Ok((host.to_string(), port))
        }
        _ if authority.is_empty() => bail!("empty host in {base_url}"),
        _ => Ok((authority.to_string(), 443)),
    }
}

/// Build a TLS client config trusting only the supplied CA bundle.
fn tls_config(ca_pem: &str) -> anyhow::Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut ca_pem.as_bytes()) {
        let cert = cert.context("parsing CA bundle")?;
        roots.add(cert).context("adding CA certificate")?;
    }
    if roots.is_empty() {
        bail!("CA bundle contains no certificates");
    }
    Ok(ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// Perform an HTTPS GET against `base_url` + `path`, returning the body.
pub async fn https_get(
    base_url: &str,
    path: &str,
    ca_pem: &str,
    timeout: Duration,
) -> anyhow::Result<Vec<u8>> {
    let (host, port) = parse_authority(base_url)?;
    let config = tls_config(ca_pem)?;

    let result = tokio::time::timeout(timeout, async {
        let stream = tokio::net::TcpStream::connect((host.as_str(), port))
            .await
            .with_context(|| format!("connecting to {host}:{port}"))?;

        let server_name = ServerName::try_from(host.clone())
            .with_context(|| format!("invalid server name {host}"))?;
        let tls = TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await
            .context("TLS handshake")?;

        let io = hyper_util::rt::TokioIo::new(tls);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .context("HTTP handshake")?;

        // Drive the connection for the lifetime of the request.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", &host)
            .header("user-agent", "keel-agent/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())?;

        let resp = sender.send_request(req).await.context("sending request")?;
        debug!(status = %resp.status(), path, "manifest response");
        if !resp.status().is_success() {
            bail!("unexpected status {} fetching {path}", resp.status());
        }

        let body = resp.into_body().collect().await.context("reading body")?;
        Ok(body.to_bytes().to_vec())
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_) => bail!("timed out fetching {path} after {timeout:?}"),
    }
}

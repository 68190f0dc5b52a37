//! HTTP publisher
//!
//! POSTs the PEM public key to `config.endpoint`. Plain `http://` is only
//! accepted when the target sets `tls.insecureSkipVerify`.

use crate::error::{PublishError, Result};
use crate::publisher::{Publisher, PublisherConfig};
use async_trait::async_trait;
use keywarden_core::PublishTarget;
use keywarden_crypto::encoding::{KeyEncoder, PemEncoder};
use keywarden_crypto::KeyPair;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client, ClientBuilder, Url};

pub const CONFIG_ENDPOINT: &str = "endpoint";
pub const CONTENT_TYPE_PEM: &str = "application/x-pem-file";
pub const HEADER_KEY_ID: &str = "X-Key-ID";

const PEM_CERT_END: &str = "-----END CERTIFICATE-----";

pub struct HttpPublisher {
    config: PublisherConfig,
    client: Client,
}

impl HttpPublisher {
    pub fn new(config: PublisherConfig) -> Result<Self> {
        let client = base_builder(&config)
            .build()
            .map_err(|e| PublishError::Client(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Shared client for ordinary targets, a dedicated one when the target
    /// carries its own trust settings.
    fn client_for(&self, target: &PublishTarget) -> Result<Client> {
        let Some(tls) = target.tls.as_ref() else {
            return Ok(self.client.clone());
        };
        if !tls.insecure_skip_verify && tls.ca_bundle_pem.is_none() {
            return Ok(self.client.clone());
        }

        let mut builder = base_builder(&self.config);
        if tls.insecure_skip_verify {
            tracing::warn!(target_type = %target.target_type, "certificate verification disabled for publish target");
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(bundle) = tls.ca_bundle_pem.as_deref() {
            for cert in parse_ca_bundle(bundle)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        builder.build().map_err(|e| PublishError::Client(e.to_string()))
    }
}

fn base_builder(config: &PublisherConfig) -> ClientBuilder {
    Client::builder()
        .timeout(config.http_timeout)
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
}

fn parse_ca_bundle(bundle: &str) -> Result<Vec<Certificate>> {
    let certs = bundle
        .split_inclusive(PEM_CERT_END)
        .map(str::trim)
        .filter(|block| block.contains(PEM_CERT_END))
        .map(|block| {
            Certificate::from_pem(block.as_bytes())
                .map_err(|e| PublishError::Client(format!("invalid CA bundle: {}", e)))
        })
        .collect::<Result<Vec<_>>>()?;

    if certs.is_empty() {
        return Err(PublishError::Client("CA bundle contains no certificates".to_string()));
    }
    Ok(certs)
}

fn checked_endpoint(raw: &str, insecure: bool) -> Result<Url> {
    if !insecure && !raw.starts_with("https://") {
        return Err(PublishError::InsecureEndpoint(raw.to_string()));
    }
    let url = Url::parse(raw).map_err(|e| PublishError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(PublishError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: format!("unsupported scheme {:?}", other),
        }),
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, target: &PublishTarget, kp: &KeyPair) -> Result<()> {
        let raw = target
            .config_value(CONFIG_ENDPOINT)
            .ok_or(PublishError::MissingConfig(CONFIG_ENDPOINT))?;
        let url = checked_endpoint(raw, target.is_insecure())?;
        let client = self.client_for(target)?;

        let pem = PemEncoder.encode_public(kp.public_key()?)?;
        let request_error = |source| PublishError::Request {
            endpoint: raw.to_string(),
            source,
        };

        let mut resp = client
            .post(url)
            .header(CONTENT_TYPE, CONTENT_TYPE_PEM)
            .header(HEADER_KEY_ID, kp.key_id())
            .body(pem)
            .send()
            .await
            .map_err(request_error)?;

        // Bounded drain so a misbehaving endpoint cannot stall or flood us.
        let mut drained = 0usize;
        while drained < self.config.max_response_bytes {
            match resp.chunk().await {
                Ok(Some(chunk)) => drained += chunk.len(),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(endpoint = %raw, error = %e, "response body read failed");
                    break;
                }
            }
        }

        let status = resp.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(PublishError::Status {
                endpoint: raw.to_string(),
                status,
            });
        }

        tracing::debug!(key_id = %kp.key_id(), endpoint = %raw, status = status.as_u16(), "public key posted");
        Ok(())
    }
}

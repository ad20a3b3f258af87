//! DigitalOcean droplet API — implements `InstanceApi` over REST.

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::application::ports::InstanceApi;
use crate::domain::{AccessToken, CreatedInstance, InstanceId, InstanceRequest};

/// Production API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.digitalocean.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST client for the droplet endpoints.
pub struct DigitalOceanApi {
    http: Client,
    base_url: String,
    token: AccessToken,
}

#[derive(Debug, Serialize)]
struct CreateDropletRequest<'a> {
    name: &'a str,
    region: &'a str,
    size: &'a str,
    image: &'a str,
    ssh_keys: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DropletEnvelope {
    droplet: Droplet,
}

#[derive(Debug, Deserialize)]
struct Droplet {
    id: u64,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    networks: Networks,
}

#[derive(Debug, Default, Deserialize)]
struct Networks {
    #[serde(default)]
    v4: Vec<NetworkV4>,
}

#[derive(Debug, Deserialize)]
struct NetworkV4 {
    ip_address: Ipv4Addr,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl Droplet {
    fn public_ipv4(&self) -> Option<Ipv4Addr> {
        self.networks
            .v4
            .iter()
            .find(|n| n.kind == "public")
            .map(|n| n.ip_address)
    }
}

/// Numeric key ids are sent as numbers, fingerprints as strings.
fn ssh_key_value(key: &str) -> serde_json::Value {
    key.parse::<u64>()
        .map_or_else(|_| serde_json::Value::from(key), serde_json::Value::from)
}

impl DigitalOceanApi {
    /// Client against the production endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: AccessToken) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Client against an alternate endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(token: AccessToken, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("proxyfleet/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body).map_or(body, |e| e.message);
        anyhow::bail!("{status}: {message}")
    }
}

impl InstanceApi for DigitalOceanApi {
    #[instrument(skip(self, request), fields(name = %request.name, region = %request.region))]
    async fn create_instance(&self, request: &InstanceRequest) -> Result<CreatedInstance> {
        let body = CreateDropletRequest {
            name: &request.name,
            region: &request.region,
            size: &request.size,
            image: &request.image,
            ssh_keys: vec![ssh_key_value(&request.ssh_key)],
        };
        let response = self
            .http
            .post(self.url("/v2/droplets"))
            .bearer_auth(self.token.expose())
            .json(&body)
            .send()
            .await
            .context("droplet create request failed")?;
        let envelope: DropletEnvelope = Self::check(response)
            .await?
            .json()
            .await
            .context("cannot decode droplet create response")?;
        Ok(CreatedInstance {
            id: InstanceId(envelope.droplet.id),
            created_at: envelope.droplet.created_at.unwrap_or_else(Utc::now),
        })
    }

    #[instrument(skip(self))]
    async fn public_ipv4(&self, id: InstanceId) -> Result<Option<Ipv4Addr>> {
        let response = self
            .http
            .get(self.url(&format!("/v2/droplets/{id}")))
            .bearer_auth(self.token.expose())
            .send()
            .await
            .context("droplet lookup request failed")?;
        let envelope: DropletEnvelope = Self::check(response)
            .await?
            .json()
            .await
            .context("cannot decode droplet lookup response")?;
        Ok(envelope.droplet.public_ipv4())
    }

    #[instrument(skip(self))]
    async fn delete_instance(&self, id: InstanceId) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/v2/droplets/{id}")))
            .bearer_auth(self.token.expose())
            .send()
            .await
            .context("droplet delete request failed")?;
        Self::check(response).await?;
        Ok(())
    }
}

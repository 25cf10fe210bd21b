//! HTTP custody backend

use crate::wire::{
    decode_key, CreateOperationRequest, OperationResponse, OperationStatusResponse,
    PublicKeyResponse,
};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use staking_core::config::CustodyConfig;
use staking_core::custody::{CustodyBackend, OperationSnapshot, RemoteOperation};
use staking_core::signer::SigningRequest;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Custody backend over the REST operations API
pub struct HttpCustodyBackend {
    base_url: Url,
    api_token: Option<String>,
    client: Client,
}

impl HttpCustodyBackend {
    /// Create new HTTP custody backend
    pub fn new(config: &CustodyConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::Config(format!("custody.base_url {:?}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "custody.base_url {:?} cannot be a base URL",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Self {
            base_url,
            api_token: config.api_token.clone(),
            client,
        })
    }

    /// Base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("cannot extend {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("Custody API returned {}: {}", status, body);

            return Err(Error::CustodyApi {
                status_code: status,
                message: body,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl CustodyBackend for HttpCustodyBackend {
    async fn create_operation(
        &self,
        request: &SigningRequest,
    ) -> staking_core::Result<RemoteOperation> {
        let body = CreateOperationRequest::from(request);
        info!(
            "Creating custody operation {} for {}",
            body.external_id, body.signer_address
        );

        let response = self
            .authorized(self.client.post(self.endpoint(&["v1", "operations"])?))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        Self::read_json::<OperationResponse>(response)
            .await?
            .into_operation()
    }

    async fn get_operation(&self, operation_id: &str) -> staking_core::Result<OperationSnapshot> {
        let response = self
            .authorized(
                self.client
                    .get(self.endpoint(&["v1", "operations", operation_id])?),
            )
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let snapshot = Self::read_json::<OperationStatusResponse>(response)
            .await?
            .into_snapshot()?;
        debug!("Custody operation {} is {}", operation_id, snapshot.status);
        Ok(snapshot)
    }

    async fn get_public_key(&self, address: &str) -> staking_core::Result<Vec<u8>> {
        let response = self
            .authorized(
                self.client
                    .get(self.endpoint(&["v1", "addresses", address, "public-key"])?),
            )
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let key = Self::read_json::<PublicKeyResponse>(response).await?;
        Ok(decode_key(&key.public_key)?)
    }
}

impl std::fmt::Debug for HttpCustodyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCustodyBackend")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.api_token.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> CustodyConfig {
        CustodyConfig {
            base_url: base_url.to_string(),
            api_token: Some("secret".into()),
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn test_endpoint_paths() {
        let backend = HttpCustodyBackend::new(&config("https://custody.example/api/")).unwrap();
        let url = backend
            .endpoint(&["v1", "addresses", "stake1 abc/def", "public-key"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://custody.example/api/v1/addresses/stake1%20abc%2Fdef/public-key"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpCustodyBackend::new(&config("not a url")),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            HttpCustodyBackend::new(&config("mailto:ops@example.com")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_debug_hides_token() {
        let backend = HttpCustodyBackend::new(&config("https://custody.example")).unwrap();
        assert!(!format!("{backend:?}").contains("secret"));
    }
}

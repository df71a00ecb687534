//! Proving artifact retrieval
//!
//! Each artifact location is either an `http(s)://` URL or a local path.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ArtifactsConfig;
use crate::types::{CircuitDefinition, VerificationKey};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to fetch {location}: {reason}")]
    Fetch { location: String, reason: String },

    #[error("failed to parse {location}: {reason}")]
    Parse { location: String, reason: String },
}

#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn circuit_definition(&self) -> Result<CircuitDefinition, ArtifactError>;

    async fn proving_key(&self) -> Result<Vec<u8>, ArtifactError>;

    async fn verification_key(&self) -> Result<VerificationKey, ArtifactError>;
}

pub struct ArtifactFetcher {
    circuit: String,
    proving_key: String,
    verification_key: String,
    client: reqwest::Client,
}

impl ArtifactFetcher {
    pub fn new(config: &ArtifactsConfig, timeout: Duration) -> Result<Self, ArtifactError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArtifactError::Fetch {
                location: "http client".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            circuit: config.circuit.clone(),
            proving_key: config.proving_key.clone(),
            verification_key: config.verification_key.clone(),
            client,
        })
    }

    async fn fetch(&self, location: &str) -> Result<Vec<u8>, ArtifactError> {
        let fetch_error = |reason: String| ArtifactError::Fetch {
            location: location.to_string(),
            reason,
        };

        debug!(location, "fetching artifact");

        if location.starts_with("http://") || location.starts_with("https://") {
            let response = self
                .client
                .get(location)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| fetch_error(e.to_string()))?;
            let bytes = response.bytes().await.map_err(|e| fetch_error(e.to_string()))?;
            Ok(bytes.to_vec())
        } else {
            tokio::fs::read(location)
                .await
                .map_err(|e| fetch_error(e.to_string()))
        }
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(location: &str, bytes: &[u8]) -> Result<T, ArtifactError> {
    serde_json::from_slice(bytes).map_err(|e| ArtifactError::Parse {
        location: location.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl ArtifactSource for ArtifactFetcher {
    async fn circuit_definition(&self) -> Result<CircuitDefinition, ArtifactError> {
        let bytes = self.fetch(&self.circuit).await?;
        parse_json(&self.circuit, &bytes)
    }

    async fn proving_key(&self) -> Result<Vec<u8>, ArtifactError> {
        self.fetch(&self.proving_key).await
    }

    async fn verification_key(&self) -> Result<VerificationKey, ArtifactError> {
        let bytes = self.fetch(&self.verification_key).await?;
        parse_json(&self.verification_key, &bytes)
    }
}

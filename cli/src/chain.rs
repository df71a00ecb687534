//! Chain context: network health, mixer leaves and balances
//!
//! The production implementation talks EVM JSON-RPC to a node through an
//! ethers `Provider<Http>`:
//! - `eth_chainId` decides whether the node is on the mixer's network
//! - `eth_getCode` decides whether the mixer is deployed
//! - `eth_call` of `getLeaves()` returns the published commitments
//! - `eth_getBalance` backs the `balance` command

use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest};
use reqwest::Url;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::types::Field;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("no contract code at {address}")]
    ContractNotDeployed { address: String },

    #[error("connected to chain {actual}, expected {expected}")]
    UnsupportedNetwork { expected: u64, actual: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::ContractNotDeployed { .. } => ErrorKind::ContractNotDeployed,
            ChainError::UnsupportedNetwork { .. } => ErrorKind::ConnectionUnsupportedNetwork,
            ChainError::Transport(_) | ChainError::Rpc { .. } | ChainError::Malformed(_) => {
                ErrorKind::NetworkOrContract
            }
        }
    }
}

/// Why the chain context is not usable right now
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("connected to chain {actual}, expected {expected}")]
    UnsupportedNetwork { expected: u64, actual: u64 },

    #[error("node unreachable: {0}")]
    Unreachable(String),
}

impl ConnectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectionError::UnsupportedNetwork { .. } => ErrorKind::ConnectionUnsupportedNetwork,
            ConnectionError::Unreachable(_) => ErrorKind::NetworkOrContract,
        }
    }
}

#[async_trait]
pub trait ChainContext: Send + Sync {
    /// Mixer contract address, also the external nullifier
    fn mixer_address(&self) -> &str;

    /// `None` when the context is connected to the right network
    async fn connection_error(&self) -> Option<ConnectionError>;

    /// All identity commitments published by the mixer, in insertion order
    async fn get_leaves(&self) -> Result<Vec<Field>, ChainError>;

    async fn get_balance(&self, address: &str) -> Result<Field, ChainError>;
}

// ============================================================================
// ABI helpers
// ============================================================================

/// First four bytes of the Keccak-256 hash of a function signature
pub fn function_selector(signature: &str) -> [u8; 4] {
    ethers::utils::id(signature)
}

/// Decode the return data of a function returning a single `uint256[]`
pub fn decode_uint256_array(data: &[u8]) -> Result<Vec<Field>, ChainError> {
    let leaves_type = ParamType::Array(Box::new(ParamType::Uint(256)));
    let tokens = abi::decode(&[leaves_type], data)
        .map_err(|e| ChainError::Malformed(format!("abi decode: {}", e)))?;

    let array = tokens
        .into_iter()
        .next()
        .and_then(Token::into_array)
        .ok_or_else(|| ChainError::Malformed("expected a uint256 array".into()))?;

    array
        .into_iter()
        .map(|token| {
            token
                .into_uint()
                .map(Field::from)
                .ok_or_else(|| ChainError::Malformed("expected a uint256".into()))
        })
        .collect()
}

fn parse_address(address: &str) -> Result<Address, ChainError> {
    address
        .parse()
        .map_err(|_| ChainError::Malformed(format!("invalid address {}", address)))
}

impl From<ProviderError> for ChainError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::JsonRpcClientError(inner) => match inner.as_error_response() {
                Some(rpc) => ChainError::Rpc {
                    code: rpc.code,
                    message: rpc.message.clone(),
                },
                None => ChainError::Transport(inner.to_string()),
            },
            ProviderError::SerdeJson(e) => ChainError::Malformed(e.to_string()),
            other => ChainError::Transport(other.to_string()),
        }
    }
}

// ============================================================================
// JSON-RPC implementation
// ============================================================================

pub struct JsonRpcChain {
    provider: Provider<Http>,
    chain_id: u64,
    mixer_address: String,
}

impl JsonRpcChain {
    /// Every request is bounded by `timeout`, so a silent node surfaces as a
    /// connection error instead of stalling the caller
    pub fn new(
        rpc_url: &str,
        chain_id: u64,
        mixer_address: &str,
        timeout: Duration,
    ) -> Result<Self, ChainError> {
        let url = Url::parse(rpc_url)
            .map_err(|e| ChainError::Transport(format!("invalid rpc url {}: {}", rpc_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        Ok(Self {
            provider: Provider::new(Http::new_with_client(url, client)),
            chain_id,
            mixer_address: mixer_address.to_string(),
        })
    }

    async fn fetch_chain_id(&self) -> Result<u64, ChainError> {
        let chain_id = self.provider.get_chainid().await?;
        if chain_id.bits() > 64 {
            return Err(ChainError::Malformed(format!("chain id {} out of range", chain_id)));
        }
        Ok(chain_id.low_u64())
    }

    async fn ensure_deployed(&self, mixer: Address) -> Result<(), ChainError> {
        let code = self.provider.get_code(mixer, None).await?;
        if code.is_empty() {
            return Err(ChainError::ContractNotDeployed {
                address: self.mixer_address.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainContext for JsonRpcChain {
    fn mixer_address(&self) -> &str {
        &self.mixer_address
    }

    async fn connection_error(&self) -> Option<ConnectionError> {
        match self.fetch_chain_id().await {
            Ok(actual) if actual == self.chain_id => None,
            Ok(actual) => {
                warn!(expected = self.chain_id, actual, "node is on an unsupported network");
                Some(ConnectionError::UnsupportedNetwork {
                    expected: self.chain_id,
                    actual,
                })
            }
            Err(e) => {
                warn!("chain connection check failed: {}", e);
                Some(ConnectionError::Unreachable(e.to_string()))
            }
        }
    }

    async fn get_leaves(&self) -> Result<Vec<Field>, ChainError> {
        let mixer = parse_address(&self.mixer_address)?;
        self.ensure_deployed(mixer).await?;

        let call: TypedTransaction = TransactionRequest::new()
            .to(mixer)
            .data(Bytes::from(function_selector("getLeaves()").to_vec()))
            .into();
        debug!(mixer = %self.mixer_address, "calling getLeaves()");
        let result = self.provider.call(&call, None).await?;

        let leaves = decode_uint256_array(&result)?;
        debug!(count = leaves.len(), "fetched mixer leaves");
        Ok(leaves)
    }

    async fn get_balance(&self, address: &str) -> Result<Field, ChainError> {
        let balance = self.provider.get_balance(parse_address(address)?, None).await?;
        Ok(Field::from(balance))
    }
}

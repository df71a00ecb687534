//! User-facing withdrawal error taxonomy
//!
//! Component errors (chain, artifacts, primitives, pipeline, relayer, store)
//! keep their causes for logging. At the orchestrator boundary each one is
//! reduced to exactly one [`ErrorKind`], and each kind maps to exactly one
//! message shown to the user.

/// Relayer error name for a proof rejected before broadcast
pub const PRE_BROADCAST_INVALID: &str = "BACKEND_MIX_PROOF_PRE_BROADCAST_INVALID";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("connection to an unsupported network")]
    ConnectionUnsupportedNetwork,

    #[error("mixer contract not deployed")]
    ContractNotDeployed,

    #[error("identity commitment not found in the mixer")]
    CommitmentNotFound,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("witness generation failed")]
    WitnessGenerationError,

    #[error("invalid witness")]
    InvalidWitness,

    #[error("invalid proof")]
    InvalidProof,

    #[error("relayer pre-broadcast check failed")]
    PreBroadcastCheckFailed,

    #[error("network or contract error")]
    NetworkOrContract,

    /// Relayer error whose name is not recognized
    #[error("relayer error: {0}")]
    Unclassified(String),

    /// Bug conditions: malformed leaves, inconsistent Merkle paths, primitive failures
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// The single human-readable message for this kind
    pub fn message(&self) -> String {
        match self {
            ErrorKind::ConnectionUnsupportedNetwork => {
                "Connected to an unsupported network. Switch to the mixer's network and try again."
                    .to_string()
            }
            ErrorKind::ContractNotDeployed => {
                "The mixer contract is not deployed at the configured address.".to_string()
            }
            ErrorKind::CommitmentNotFound => {
                "This deposit's identity commitment is not in the mixer. Was the deposit made on this network?"
                    .to_string()
            }
            ErrorKind::InvalidSignature => {
                "Could not produce a valid signature for this identity.".to_string()
            }
            ErrorKind::WitnessGenerationError => {
                "Could not generate the witness for the withdrawal proof.".to_string()
            }
            ErrorKind::InvalidWitness => "The generated witness is invalid.".to_string(),
            ErrorKind::InvalidProof => {
                "The generated proof failed local verification. Nothing was submitted.".to_string()
            }
            ErrorKind::PreBroadcastCheckFailed => {
                "The relayer rejected the proof before broadcasting it. This deposit may already have been withdrawn."
                    .to_string()
            }
            ErrorKind::NetworkOrContract => {
                "A network or contract error occurred. Check your connection and withdraw manually."
                    .to_string()
            }
            ErrorKind::Unclassified(name) => {
                format!("The relayer rejected the withdrawal ({}).", name)
            }
            ErrorKind::Internal(_) => {
                "An internal error occurred while preparing the withdrawal. Please report it."
                    .to_string()
            }
        }
    }

    /// Map a structured relayer error name to its kind
    pub fn from_relayer_error(name: &str) -> Self {
        match name {
            PRE_BROADCAST_INVALID => ErrorKind::PreBroadcastCheckFailed,
            other => ErrorKind::Unclassified(other.to_string()),
        }
    }
}

//! Withdrawal proof construction
//!
//! [`ProofPipeline::run`] turns a deposit record into a [`ProofPackage`] by
//! calling the chain, the artifact source and the cryptographic primitives
//! in a fixed order. The first failing step aborts the run; nothing after
//! it is invoked and no package is produced.
//!
//! Order:
//!  1. leaves from the mixer
//!  2. membership tree
//!  3. public key
//!  4. identity commitment
//!  5. Merkle path, cross-checked against the tree's own lookup
//!  6. signal
//!  7. signature over (external nullifier, signal hash)
//!  8. signature check, before any large download
//!  9. circuit
//! 10. witness (blocking pool)
//! 11. witness check
//! 12. proving and verification keys
//! 13. proof (blocking pool)
//! 14. public signals
//! 15. local proof verification

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactError, ArtifactSource};
use crate::chain::{ChainContext, ChainError};
use crate::error::ErrorKind;
use crate::primitives::{CryptoPrimitives, PrimitiveError};
use crate::store::DepositRecord;
use crate::types::{parse_address, Field, ProofPackage, WitnessInputs};

/// Progress label emitted before each network or compute-heavy step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DownloadingLeaves,
    BuildingMembershipProof,
    DownloadingCircuit,
    GeneratingWitness,
    DownloadingKeys,
    GeneratingProof,
    VerifyingProof,
    Submitting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::DownloadingLeaves => "Downloading leaves...",
            Stage::BuildingMembershipProof => "Building membership proof...",
            Stage::DownloadingCircuit => "Downloading circuit...",
            Stage::GeneratingWitness => "Generating witness...",
            Stage::DownloadingKeys => "Downloading proving and verification keys...",
            Stage::GeneratingProof => "Generating proof...",
            Stage::VerifyingProof => "Verifying proof...",
            Stage::Submitting => "Submitting to relayer...",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to fetch leaves: {0}")]
    Chain(#[from] ChainError),

    #[error("failed to build membership tree: {0}")]
    Tree(PrimitiveError),

    #[error("failed to derive identity: {0}")]
    Identity(PrimitiveError),

    #[error("identity commitment not among {leaves} leaves")]
    CommitmentNotFound { leaves: usize },

    #[error("merkle path from path finder disagrees with tree lookup")]
    PathMismatch,

    #[error("failed to compute signal: {0}")]
    Signal(PrimitiveError),

    #[error("invalid external nullifier: {0}")]
    ExternalNullifier(String),

    #[error("failed to sign: {0}")]
    Signing(PrimitiveError),

    #[error("signature does not verify against the identity public key")]
    InvalidSignature,

    #[error("failed to fetch artifact: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("failed to load circuit: {0}")]
    Circuit(PrimitiveError),

    #[error("witness generation failed: {0}")]
    WitnessGeneration(String),

    #[error("witness fails the circuit check")]
    InvalidWitness,

    #[error("proof generation failed: {0}")]
    ProofGeneration(String),

    #[error("proof fails local verification")]
    InvalidProof,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Chain(e) => e.kind(),
            PipelineError::CommitmentNotFound { .. } => ErrorKind::CommitmentNotFound,
            PipelineError::Signing(_) | PipelineError::InvalidSignature => {
                ErrorKind::InvalidSignature
            }
            PipelineError::Artifact(_) => ErrorKind::NetworkOrContract,
            PipelineError::WitnessGeneration(_) => ErrorKind::WitnessGenerationError,
            PipelineError::InvalidWitness => ErrorKind::InvalidWitness,
            PipelineError::InvalidProof => ErrorKind::InvalidProof,
            PipelineError::Tree(_)
            | PipelineError::Identity(_)
            | PipelineError::PathMismatch
            | PipelineError::Signal(_)
            | PipelineError::ExternalNullifier(_)
            | PipelineError::Circuit(_)
            | PipelineError::ProofGeneration(_) => ErrorKind::Internal(self.to_string()),
        }
    }
}

pub struct ProofPipeline {
    primitives: Arc<dyn CryptoPrimitives>,
    chain: Arc<dyn ChainContext>,
    artifacts: Arc<dyn ArtifactSource>,
    broadcaster_address: String,
    fee_wei: Field,
}

impl ProofPipeline {
    pub fn new(
        primitives: Arc<dyn CryptoPrimitives>,
        chain: Arc<dyn ChainContext>,
        artifacts: Arc<dyn ArtifactSource>,
        broadcaster_address: &str,
        fee_wei: Field,
    ) -> Self {
        Self {
            primitives,
            chain,
            artifacts,
            broadcaster_address: broadcaster_address.to_string(),
            fee_wei,
        }
    }

    pub fn chain(&self) -> &Arc<dyn ChainContext> {
        &self.chain
    }

    pub fn fee_wei(&self) -> &Field {
        &self.fee_wei
    }

    pub async fn run(
        &self,
        record: &DepositRecord,
        progress: &(dyn Fn(Stage) + Send + Sync),
    ) -> Result<ProofPackage, PipelineError> {
        let primitives = &self.primitives;
        info!(deposit = %record.id(), "building withdrawal proof");

        // 1
        progress(Stage::DownloadingLeaves);
        let leaves = self.chain.get_leaves().await?;
        debug!(count = leaves.len(), "leaves downloaded");

        // 2
        progress(Stage::BuildingMembershipProof);
        let tree = primitives.build_tree(&leaves).map_err(PipelineError::Tree)?;

        // 3, 4
        let public_key = primitives
            .derive_public_key(&record.identity_private_key)
            .map_err(PipelineError::Identity)?;
        let commitment = primitives
            .derive_identity_commitment(&record.identity_nullifier, &public_key)
            .map_err(PipelineError::Identity)?;

        // 5
        let path = match primitives.find_merkle_path(tree.as_ref(), &commitment) {
            Ok(path) => path,
            Err(PrimitiveError::LeafNotFound) => {
                return Err(PipelineError::CommitmentNotFound {
                    leaves: leaves.len(),
                })
            }
            Err(e) => return Err(PipelineError::Tree(e)),
        };
        let tree_path = tree
            .leaf_index(&commitment)
            .and_then(|index| tree.path(index))
            .ok_or(PipelineError::PathMismatch)?;
        if tree_path != path {
            warn!(deposit = %record.id(), "merkle path disagreement");
            return Err(PipelineError::PathMismatch);
        }

        // 6
        let signal = primitives
            .compute_signal(&record.recipient_address, &self.broadcaster_address, &self.fee_wei)
            .map_err(PipelineError::Signal)?;

        // 7
        let external_nullifier = external_nullifier(self.chain.mixer_address())?;
        let signed = primitives
            .sign(&record.identity_private_key, &external_nullifier, &signal.signal_hash)
            .map_err(PipelineError::Signing)?;

        // 8
        if !primitives.verify_signature(&signed.message, &signed.signature, &public_key) {
            return Err(PipelineError::InvalidSignature);
        }

        // 9
        progress(Stage::DownloadingCircuit);
        let definition = self.artifacts.circuit_definition().await?;
        let circuit = primitives
            .load_circuit(&definition)
            .map_err(PipelineError::Circuit)?;

        // 10
        progress(Stage::GeneratingWitness);
        let inputs = WitnessInputs {
            public_key,
            signature: signed.signature,
            signal_hash: signal.signal_hash.clone(),
            external_nullifier,
            identity_nullifier: record.identity_nullifier.clone(),
            path,
        };
        let witness = {
            let primitives = Arc::clone(primitives);
            let circuit = Arc::clone(&circuit);
            match tokio::task::spawn_blocking(move || {
                primitives.generate_witness(circuit.as_ref(), &inputs)
            })
            .await
            {
                Ok(Ok(witness)) => witness,
                Ok(Err(e)) => {
                    warn!(deposit = %record.id(), error = %e, "witness generation failed");
                    return Err(PipelineError::WitnessGeneration(e.to_string()));
                }
                Err(e) => {
                    warn!(deposit = %record.id(), error = %e, "witness generation task aborted");
                    return Err(PipelineError::WitnessGeneration(e.to_string()));
                }
            }
        };

        // 11
        if !circuit.check_witness(&witness) {
            return Err(PipelineError::InvalidWitness);
        }

        // 12
        progress(Stage::DownloadingKeys);
        let proving_key = self.artifacts.proving_key().await?;
        let verification_key = self.artifacts.verification_key().await?;

        // 13
        progress(Stage::GeneratingProof);
        let witness = Arc::new(witness);
        let proof = {
            let primitives = Arc::clone(primitives);
            let witness = Arc::clone(&witness);
            match tokio::task::spawn_blocking(move || {
                primitives.generate_proof(&witness, &proving_key)
            })
            .await
            {
                Ok(Ok(proof)) => proof,
                Ok(Err(e)) => return Err(PipelineError::ProofGeneration(e.to_string())),
                Err(e) => return Err(PipelineError::ProofGeneration(e.to_string())),
            }
        };

        // 14
        let public_signals = primitives.derive_public_signals(&witness, circuit.as_ref());

        // 15
        progress(Stage::VerifyingProof);
        if !primitives.verify_proof(&verification_key, &proof, &public_signals) {
            warn!(deposit = %record.id(), "proof failed local verification");
            return Err(PipelineError::InvalidProof);
        }

        info!(deposit = %record.id(), "withdrawal proof ready");

        Ok(ProofPackage {
            signal: signal.signal,
            signal_hash: signal.signal_hash,
            proof,
            public_signals,
            recipient_address: record.recipient_address.clone(),
            fee_wei: self.fee_wei.clone(),
        })
    }
}

/// The mixer address read as an integer
pub fn external_nullifier(mixer_address: &str) -> Result<Field, PipelineError> {
    parse_address(mixer_address)
        .map(|bytes| Field::from_bytes_be(&bytes))
        .ok_or_else(|| PipelineError::ExternalNullifier(mixer_address.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(Stage::DownloadingLeaves.to_string(), "Downloading leaves...");
        assert_eq!(Stage::GeneratingProof.to_string(), "Generating proof...");
        assert_eq!(Stage::Submitting.to_string(), "Submitting to relayer...");
    }

    #[test]
    fn test_external_nullifier_is_mixer_address() {
        let field = external_nullifier("0x00000000000000000000000000000000000000ff").unwrap();
        assert_eq!(field, Field::from(255));
        assert!(external_nullifier("mixer").is_err());
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            PipelineError::Chain(ChainError::ContractNotDeployed { address: "0x1".into() }).kind(),
            ErrorKind::ContractNotDeployed
        );
        assert_eq!(
            PipelineError::Chain(ChainError::Transport("timeout".into())).kind(),
            ErrorKind::NetworkOrContract
        );
        assert_eq!(
            PipelineError::CommitmentNotFound { leaves: 3 }.kind(),
            ErrorKind::CommitmentNotFound
        );
        assert_eq!(PipelineError::InvalidSignature.kind(), ErrorKind::InvalidSignature);
        assert_eq!(
            PipelineError::WitnessGeneration("boom".into()).kind(),
            ErrorKind::WitnessGenerationError
        );
        assert_eq!(PipelineError::InvalidWitness.kind(), ErrorKind::InvalidWitness);
        assert_eq!(PipelineError::InvalidProof.kind(), ErrorKind::InvalidProof);
        assert!(matches!(PipelineError::PathMismatch.kind(), ErrorKind::Internal(_)));
        assert!(matches!(
            PipelineError::Tree(PrimitiveError::MalformedLeaf { index: 0, reason: "x".into() }).kind(),
            ErrorKind::Internal(_)
        ));
    }
}

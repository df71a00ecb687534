//! Cryptographic toolchain consumed by the proof pipeline
//!
//! The pipeline only sequences these calls; it never looks inside a tree,
//! circuit or proof. Implementations must be deterministic for identical
//! inputs. Witness and proof generation may take seconds and are invoked
//! from a blocking worker, hence the `Send + Sync` bounds.

use std::sync::Arc;

use crate::types::{
    CircuitDefinition, Field, IdentityKey, MerklePath, Proof, PublicKey, PublicSignals,
    Signal, Signature, SignedMessage, VerificationKey, Witness, WitnessInputs,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimitiveError {
    #[error("malformed leaf at index {index}: {reason}")]
    MalformedLeaf { index: usize, reason: String },

    #[error("too many leaves for a tree of depth {depth}: {count}")]
    TreeFull { depth: usize, count: usize },

    #[error("commitment is not a leaf of the tree")]
    LeafNotFound,

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported circuit: {0}")]
    UnsupportedCircuit(String),

    #[error("witness generation failed: {0}")]
    Witness(String),

    #[error("invalid proving key: {0}")]
    ProvingKey(String),
}

/// Membership tree built from the mixer's published leaves
pub trait MembershipTree: Send + Sync {
    fn depth(&self) -> usize;

    fn root(&self) -> Field;

    fn leaves(&self) -> &[Field];

    fn leaf_index(&self, leaf: &Field) -> Option<usize>;

    fn path(&self, index: usize) -> Option<MerklePath>;
}

/// A loaded circuit
pub trait Circuit: Send + Sync {
    /// Number of public signals the circuit exposes
    fn n_public(&self) -> usize;

    /// Internal consistency check of a full witness
    fn check_witness(&self, witness: &Witness) -> bool;
}

pub trait CryptoPrimitives: Send + Sync {
    fn build_tree(&self, leaves: &[Field]) -> Result<Box<dyn MembershipTree>, PrimitiveError>;

    fn derive_public_key(&self, private_key: &IdentityKey) -> Result<PublicKey, PrimitiveError>;

    fn derive_identity_commitment(
        &self,
        nullifier: &Field,
        public_key: &PublicKey,
    ) -> Result<Field, PrimitiveError>;

    fn find_merkle_path(
        &self,
        tree: &dyn MembershipTree,
        commitment: &Field,
    ) -> Result<MerklePath, PrimitiveError>;

    fn compute_signal(
        &self,
        recipient_address: &str,
        relayer_address: &str,
        fee_wei: &Field,
    ) -> Result<Signal, PrimitiveError>;

    fn sign(
        &self,
        private_key: &IdentityKey,
        external_nullifier: &Field,
        signal_hash: &Field,
    ) -> Result<SignedMessage, PrimitiveError>;

    fn verify_signature(&self, message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool;

    fn load_circuit(&self, definition: &CircuitDefinition) -> Result<Arc<dyn Circuit>, PrimitiveError>;

    fn generate_witness(
        &self,
        circuit: &dyn Circuit,
        inputs: &WitnessInputs,
    ) -> Result<Witness, PrimitiveError>;

    fn generate_proof(&self, witness: &Witness, proving_key: &[u8]) -> Result<Proof, PrimitiveError>;

    fn derive_public_signals(&self, witness: &Witness, circuit: &dyn Circuit) -> PublicSignals;

    fn verify_proof(
        &self,
        verification_key: &VerificationKey,
        proof: &Proof,
        public_signals: &PublicSignals,
    ) -> bool;
}

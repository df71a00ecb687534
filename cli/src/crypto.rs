//! Development cryptographic backend
//!
//! A transparent implementation of [`CryptoPrimitives`] used to run the
//! withdrawal flow against local artifacts and in tests:
//! - SHA-256 sparse Merkle tree with zero-subtree hashes
//! - Ed25519 identity keys signed through an expanded secret key
//! - A "proof" that binds the public signals to the proving key fingerprint
//!
//! The proof system here is NOT zero-knowledge and offers no soundness
//! against a malicious prover. It exists so that every pipeline step has a
//! real, checkable implementation.

use std::sync::Arc;

use curve25519_dalek::{constants::ED25519_BASEPOINT_POINT, scalar::Scalar};
use ed25519_dalek::{
    ExpandedSecretKey, PublicKey as DalekPublicKey, Signature as DalekSignature, Verifier,
};
use num_bigint::BigUint;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::primitives::{Circuit, CryptoPrimitives, MembershipTree, PrimitiveError};
use crate::types::{
    parse_address, CircuitDefinition, Field, IdentityKey, MerklePath, Proof, PublicKey,
    PublicSignals, Signal, Signature, SignedMessage, VerificationKey, Witness, WitnessInputs,
};

/// Domain separator for every hash in this backend
const DOMAIN_SEPARATOR: &[u8] = b"mixer_dev_v1";

/// Domain separator for nonce derivation in signing
const NONCE_DOMAIN: &[u8] = b"mixer_dev_nonce_v1";

/// Prefix of a development proving key
const PROVING_KEY_MAGIC: &[u8; 8] = b"MIXDEVPK";

pub const DEV_PROTOCOL: &str = "dev-transparent";
pub const DEFAULT_TREE_DEPTH: usize = 20;
const MAX_TREE_DEPTH: usize = 32;

/// root, nullifiers hash, signal hash, external nullifier
const N_PUBLIC: usize = 4;

// Witness layout
const W_ONE: usize = 0;
const W_ROOT: usize = 1;
const W_NULLIFIERS_HASH: usize = 2;
const W_SIGNAL_HASH: usize = 3;
const W_EXTERNAL_NULLIFIER: usize = 4;
const W_IDENTITY_NULLIFIER: usize = 5;
const W_PUBLIC_KEY: usize = 6;
const W_SIG_R: usize = 7;
const W_SIG_S: usize = 8;
const W_PATH: usize = 9;

// ============================================================================
// Hashing helpers
// ============================================================================

fn hash_parts(tag: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_SEPARATOR);
    hasher.update(tag);
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    hash_parts(b"node", &[left, right])
}

fn field_bytes(field: &Field, what: &str) -> Result<[u8; 32], PrimitiveError> {
    field
        .to_bytes32()
        .ok_or_else(|| PrimitiveError::InvalidInput(format!("{} exceeds 256 bits", what)))
}

fn commitment_bytes(identity_nullifier: &[u8; 32], public_key: &[u8; 32]) -> [u8; 32] {
    hash_parts(b"commitment", &[identity_nullifier, public_key])
}

fn nullifiers_hash(external_nullifier: &[u8; 32], identity_nullifier: &[u8; 32]) -> [u8; 32] {
    hash_parts(b"nullifier", &[external_nullifier, identity_nullifier])
}

fn signing_message(external_nullifier: &[u8; 32], signal_hash: &[u8; 32]) -> [u8; 32] {
    hash_parts(b"message", &[external_nullifier, signal_hash])
}

/// Hashes of empty subtrees, `zeros[d]` is the root of an empty subtree of height `d`
fn zero_hashes(depth: usize) -> Vec<[u8; 32]> {
    let mut zeros = Vec::with_capacity(depth + 1);
    zeros.push([0u8; 32]);
    for level in 0..depth {
        let next = hash_pair(&zeros[level], &zeros[level]);
        zeros.push(next);
    }
    zeros
}

/// Fold a leaf up a path to the root, `None` if the path is malformed
fn root_from_path(leaf: [u8; 32], path: &MerklePath) -> Option<[u8; 32]> {
    if path.elements.len() != path.indices.len() {
        return None;
    }
    let mut node = leaf;
    for (element, bit) in path.elements.iter().zip(&path.indices) {
        let sibling = element.to_bytes32()?;
        node = match bit {
            0 => hash_pair(&node, &sibling),
            1 => hash_pair(&sibling, &node),
            _ => return None,
        };
    }
    Some(node)
}

// ============================================================================
// Membership Tree
// ============================================================================

/// Fixed-depth SHA-256 Merkle tree, only populated nodes are stored
pub struct Sha256Tree {
    depth: usize,
    leaves: Vec<Field>,
    layers: Vec<Vec<[u8; 32]>>,
    zeros: Vec<[u8; 32]>,
}

impl Sha256Tree {
    pub fn build(depth: usize, leaves: &[Field]) -> Result<Self, PrimitiveError> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(PrimitiveError::InvalidInput(format!("unsupported tree depth {}", depth)));
        }
        if leaves.len() > 1usize << depth {
            return Err(PrimitiveError::TreeFull {
                depth,
                count: leaves.len(),
            });
        }

        let mut level = leaves
            .iter()
            .enumerate()
            .map(|(index, leaf)| {
                leaf.to_bytes32().ok_or_else(|| PrimitiveError::MalformedLeaf {
                    index,
                    reason: "value exceeds 256 bits".to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let zeros = zero_hashes(depth);
        let mut layers = Vec::with_capacity(depth + 1);

        for zero in zeros.iter().take(depth) {
            let next: Vec<[u8; 32]> = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(zero)))
                .collect();
            layers.push(level);
            level = next;
        }
        layers.push(level);

        Ok(Self {
            depth,
            leaves: leaves.to_vec(),
            layers,
            zeros,
        })
    }
}

impl MembershipTree for Sha256Tree {
    fn depth(&self) -> usize {
        self.depth
    }

    fn root(&self) -> Field {
        let root = self.layers[self.depth]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.depth]);
        Field::from_bytes_be(&root)
    }

    fn leaves(&self) -> &[Field] {
        &self.leaves
    }

    fn leaf_index(&self, leaf: &Field) -> Option<usize> {
        self.leaves.iter().position(|l| l == leaf)
    }

    fn path(&self, index: usize) -> Option<MerklePath> {
        if index >= self.leaves.len() {
            return None;
        }

        let mut path = MerklePath::default();
        let mut position = index;
        for level in 0..self.depth {
            let sibling = self.layers[level]
                .get(position ^ 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            path.elements.push(Field::from_bytes_be(&sibling));
            path.indices.push((position & 1) as u8);
            position >>= 1;
        }
        Some(path)
    }
}

// ============================================================================
// Circuit
// ============================================================================

#[derive(Deserialize)]
struct DevCircuitDefinition {
    protocol: String,
    tree_depth: usize,
    #[serde(default = "default_n_public")]
    n_public: usize,
}

fn default_n_public() -> usize {
    N_PUBLIC
}

/// Circuit whose constraints are re-derived in software
pub struct DevCircuit {
    depth: usize,
}

impl DevCircuit {
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    fn witness_len(&self) -> usize {
        W_PATH + 2 * self.depth
    }

    fn check(&self, witness: &Witness) -> Option<()> {
        let w = &witness.0;
        if w.len() != self.witness_len() || w[W_ONE] != Field::one() {
            return None;
        }

        let external_nullifier = w[W_EXTERNAL_NULLIFIER].to_bytes32()?;
        let identity_nullifier = w[W_IDENTITY_NULLIFIER].to_bytes32()?;
        let public_key = w[W_PUBLIC_KEY].to_bytes32()?;
        let signal_hash = w[W_SIGNAL_HASH].to_bytes32()?;

        let path_end = W_PATH + self.depth;
        let indices = w[path_end..]
            .iter()
            .map(|bit| match bit.bits() {
                0 => Some(0u8),
                1 => Some(1u8),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        let path = MerklePath {
            elements: w[W_PATH..path_end].to_vec(),
            indices,
        };

        let commitment = commitment_bytes(&identity_nullifier, &public_key);
        let root = root_from_path(commitment, &path)?;
        if Field::from_bytes_be(&root) != w[W_ROOT] {
            return None;
        }

        let expected_nullifiers = nullifiers_hash(&external_nullifier, &identity_nullifier);
        if Field::from_bytes_be(&expected_nullifiers) != w[W_NULLIFIERS_HASH] {
            return None;
        }

        let mut signature = Vec::with_capacity(64);
        signature.extend_from_slice(&w[W_SIG_R].to_bytes32()?);
        signature.extend_from_slice(&w[W_SIG_S].to_bytes32()?);
        let message = signing_message(&external_nullifier, &signal_hash);
        if !verify_ed25519(&public_key, &signature, &message) {
            return None;
        }

        Some(())
    }
}

impl Circuit for DevCircuit {
    fn n_public(&self) -> usize {
        N_PUBLIC
    }

    fn check_witness(&self, witness: &Witness) -> bool {
        self.check(witness).is_some()
    }
}

// ============================================================================
// Identity keys and signing
// ============================================================================

/// A scalar that zeroizes its contents on drop
struct SecretScalar {
    bytes: [u8; 32],
}

impl SecretScalar {
    fn from_identity(key: &IdentityKey) -> Result<Self, PrimitiveError> {
        let scalar = Scalar::from_bytes_mod_order(*key.as_bytes());
        if scalar == Scalar::zero() {
            return Err(PrimitiveError::InvalidKey("identity key reduces to zero".into()));
        }
        Ok(Self {
            bytes: scalar.to_bytes(),
        })
    }

    fn to_scalar(&self) -> Scalar {
        Scalar::from_bytes_mod_order(self.bytes)
    }

    fn public_bytes(&self) -> [u8; 32] {
        (&self.to_scalar() * &ED25519_BASEPOINT_POINT)
            .compress()
            .to_bytes()
    }
}

impl Drop for SecretScalar {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Sign with the raw identity scalar
///
/// The identity key is a scalar, not an ed25519 seed, so the expanded key is
/// assembled by hand: [scalar (32) | nonce prefix (32)].
fn sign_with_scalar(secret: &SecretScalar, message: &[u8]) -> Result<[u8; 64], PrimitiveError> {
    let public_bytes = secret.public_bytes();

    let mut nonce_hasher = Sha512::new();
    nonce_hasher.update(NONCE_DOMAIN);
    nonce_hasher.update(&secret.bytes);
    let nonce_hash = nonce_hasher.finalize();

    let mut expanded_bytes = [0u8; 64];
    expanded_bytes[..32].copy_from_slice(&secret.bytes);
    expanded_bytes[32..].copy_from_slice(&nonce_hash[..32]);

    let expanded = ExpandedSecretKey::from_bytes(&expanded_bytes)
        .map_err(|e| PrimitiveError::InvalidKey(format!("invalid scalar: {}", e)));
    expanded_bytes.zeroize();
    let expanded = expanded?;

    let public = DalekPublicKey::from_bytes(&public_bytes)
        .map_err(|e| PrimitiveError::InvalidKey(format!("invalid public key: {}", e)))?;

    Ok(expanded.sign(message, &public).to_bytes())
}

fn verify_ed25519(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let public = match DalekPublicKey::from_bytes(public_key) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let signature = match DalekSignature::try_from(signature) {
        Ok(s) => s,
        Err(_) => return false,
    };
    public.verify(message, &signature).is_ok()
}

/// Random identity: 32-byte private key and 31-byte identity nullifier
pub fn generate_identity() -> (IdentityKey, Field) {
    let mut rng = rand::rngs::OsRng;

    let mut key = [0u8; 32];
    rng.fill_bytes(&mut key);
    let identity = IdentityKey::from_bytes(key);
    key.zeroize();

    let mut nullifier = [0u8; 31];
    rng.fill_bytes(&mut nullifier);

    (identity, Field::from_bytes_be(&nullifier))
}

// ============================================================================
// Transparent proving
// ============================================================================

struct DevProvingKey {
    key_id: [u8; 32],
    n_public: usize,
}

impl DevProvingKey {
    fn parse(bytes: &[u8]) -> Result<Self, PrimitiveError> {
        if bytes.len() != PROVING_KEY_MAGIC.len() + 33 || !bytes.starts_with(PROVING_KEY_MAGIC) {
            return Err(PrimitiveError::ProvingKey("not a development proving key".into()));
        }
        let mut key_id = [0u8; 32];
        key_id.copy_from_slice(&bytes[8..40]);
        Ok(Self {
            key_id,
            n_public: bytes[40] as usize,
        })
    }
}

fn transparent_proof(key_id: &[u8; 32], public_signals: &[Field]) -> Option<Proof> {
    let mut encoded = Vec::with_capacity(public_signals.len() * 32);
    for signal in public_signals {
        encoded.extend_from_slice(&signal.to_bytes32()?);
    }
    let digest = hash_parts(b"publics", &[&encoded]);

    let a = hash_parts(b"pi_a", &[key_id, &digest]);
    let b0 = hash_parts(b"pi_b0", &[key_id, &digest]);
    let b1 = hash_parts(b"pi_b1", &[key_id, &digest]);
    let c = hash_parts(b"pi_c", &[key_id, &a]);

    Some(Proof {
        pi_a: vec![Field::from_bytes_be(&a), Field::one()],
        pi_b: vec![
            vec![Field::from_bytes_be(&b0), Field::from_bytes_be(&b1)],
            vec![Field::one(), Field::zero()],
        ],
        pi_c: vec![Field::from_bytes_be(&c), Field::one()],
        protocol: DEV_PROTOCOL.to_string(),
    })
}

fn proof_bytes(proof: &Proof) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let coordinates = proof
        .pi_a
        .iter()
        .chain(proof.pi_b.iter().flatten())
        .chain(proof.pi_c.iter());
    for coordinate in coordinates {
        out.extend_from_slice(&coordinate.to_bytes32()?);
    }
    Some(out)
}

/// Circuit definition, proving key and verification key that belong together
pub struct DevArtifacts {
    pub circuit: CircuitDefinition,
    pub proving_key: Vec<u8>,
    pub verification_key: VerificationKey,
}

impl DevArtifacts {
    pub fn generate(tree_depth: usize) -> Self {
        let mut key_id = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key_id);
        Self::from_key_id(tree_depth, key_id)
    }

    pub fn from_key_id(tree_depth: usize, key_id: [u8; 32]) -> Self {
        let circuit = CircuitDefinition(serde_json::json!({
            "protocol": DEV_PROTOCOL,
            "tree_depth": tree_depth,
            "n_public": N_PUBLIC,
        }));

        let mut proving_key = PROVING_KEY_MAGIC.to_vec();
        proving_key.extend_from_slice(&key_id);
        proving_key.push(N_PUBLIC as u8);

        let identity_g2 = vec![
            vec![Field::one(), Field::zero()],
            vec![Field::zero(), Field::one()],
        ];
        let verification_key = VerificationKey {
            protocol: DEV_PROTOCOL.to_string(),
            n_public: N_PUBLIC,
            vk_alpha_1: vec![Field::from_bytes_be(&key_id), Field::one()],
            vk_beta_2: identity_g2.clone(),
            vk_gamma_2: identity_g2.clone(),
            vk_delta_2: identity_g2,
            ic: (0..=N_PUBLIC as u64)
                .map(|i| vec![Field::from(i), Field::one()])
                .collect(),
        };

        Self {
            circuit,
            proving_key,
            verification_key,
        }
    }
}

// ============================================================================
// CryptoPrimitives
// ============================================================================

pub struct DevPrimitives {
    tree_depth: usize,
}

impl DevPrimitives {
    pub fn new(tree_depth: usize) -> Self {
        Self { tree_depth }
    }
}

impl Default for DevPrimitives {
    fn default() -> Self {
        Self::new(DEFAULT_TREE_DEPTH)
    }
}

impl CryptoPrimitives for DevPrimitives {
    fn build_tree(&self, leaves: &[Field]) -> Result<Box<dyn MembershipTree>, PrimitiveError> {
        Ok(Box::new(Sha256Tree::build(self.tree_depth, leaves)?))
    }

    fn derive_public_key(&self, private_key: &IdentityKey) -> Result<PublicKey, PrimitiveError> {
        let secret = SecretScalar::from_identity(private_key)?;
        Ok(PublicKey(secret.public_bytes().to_vec()))
    }

    fn derive_identity_commitment(
        &self,
        nullifier: &Field,
        public_key: &PublicKey,
    ) -> Result<Field, PrimitiveError> {
        let nullifier = field_bytes(nullifier, "identity nullifier")?;
        let public_key: [u8; 32] = public_key
            .0
            .as_slice()
            .try_into()
            .map_err(|_| PrimitiveError::InvalidKey("public key must be 32 bytes".into()))?;
        Ok(Field::from_bytes_be(&commitment_bytes(&nullifier, &public_key)))
    }

    /// Walks the leaves level by level without touching the tree's cached layers
    fn find_merkle_path(
        &self,
        tree: &dyn MembershipTree,
        commitment: &Field,
    ) -> Result<MerklePath, PrimitiveError> {
        let leaves = tree.leaves();
        let mut position = leaves
            .iter()
            .position(|leaf| leaf == commitment)
            .ok_or(PrimitiveError::LeafNotFound)?;

        let mut level = leaves
            .iter()
            .enumerate()
            .map(|(index, leaf)| {
                leaf.to_bytes32().ok_or_else(|| PrimitiveError::MalformedLeaf {
                    index,
                    reason: "value exceeds 256 bits".to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut zero = [0u8; 32];
        let mut path = MerklePath::default();
        for _ in 0..tree.depth() {
            let sibling = level.get(position ^ 1).copied().unwrap_or(zero);
            path.elements.push(Field::from_bytes_be(&sibling));
            path.indices.push((position & 1) as u8);

            level = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&zero)))
                .collect();
            zero = hash_pair(&zero, &zero);
            position >>= 1;
        }
        Ok(path)
    }

    fn compute_signal(
        &self,
        recipient_address: &str,
        relayer_address: &str,
        fee_wei: &Field,
    ) -> Result<Signal, PrimitiveError> {
        let recipient = parse_address(recipient_address)
            .ok_or_else(|| PrimitiveError::InvalidInput("invalid recipient address".into()))?;
        let relayer = parse_address(relayer_address)
            .ok_or_else(|| PrimitiveError::InvalidInput("invalid relayer address".into()))?;
        let fee = field_bytes(fee_wei, "fee")?;

        let mut packed = Vec::with_capacity(72);
        packed.extend_from_slice(&recipient);
        packed.extend_from_slice(&relayer);
        packed.extend_from_slice(&fee);

        // Drop the low byte so the hash fits comfortably in a circuit field
        let digest = Sha256::digest(&packed);
        let signal_hash = BigUint::from_bytes_be(&digest) >> 8u32;

        Ok(Signal {
            signal: format!("0x{}", hex::encode(&packed)),
            signal_hash: Field(signal_hash),
        })
    }

    fn sign(
        &self,
        private_key: &IdentityKey,
        external_nullifier: &Field,
        signal_hash: &Field,
    ) -> Result<SignedMessage, PrimitiveError> {
        let external_nullifier = field_bytes(external_nullifier, "external nullifier")?;
        let signal_hash = field_bytes(signal_hash, "signal hash")?;
        let message = signing_message(&external_nullifier, &signal_hash);

        let secret = SecretScalar::from_identity(private_key)?;
        let signature = sign_with_scalar(&secret, &message)?;

        Ok(SignedMessage {
            message: message.to_vec(),
            signature: Signature(signature.to_vec()),
        })
    }

    fn verify_signature(&self, message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
        verify_ed25519(&public_key.0, &signature.0, message)
    }

    fn load_circuit(&self, definition: &CircuitDefinition) -> Result<Arc<dyn Circuit>, PrimitiveError> {
        let parsed: DevCircuitDefinition = serde_json::from_value(definition.0.clone())
            .map_err(|e| PrimitiveError::UnsupportedCircuit(e.to_string()))?;

        if parsed.protocol != DEV_PROTOCOL {
            return Err(PrimitiveError::UnsupportedCircuit(parsed.protocol));
        }
        if parsed.n_public != N_PUBLIC {
            return Err(PrimitiveError::UnsupportedCircuit(format!(
                "expected {} public signals, got {}",
                N_PUBLIC, parsed.n_public
            )));
        }
        if parsed.tree_depth != self.tree_depth {
            return Err(PrimitiveError::UnsupportedCircuit(format!(
                "circuit depth {} does not match tree depth {}",
                parsed.tree_depth, self.tree_depth
            )));
        }

        Ok(Arc::new(DevCircuit::new(parsed.tree_depth)))
    }

    fn generate_witness(
        &self,
        _circuit: &dyn Circuit,
        inputs: &WitnessInputs,
    ) -> Result<Witness, PrimitiveError> {
        let public_key: [u8; 32] = inputs
            .public_key
            .0
            .as_slice()
            .try_into()
            .map_err(|_| PrimitiveError::Witness("public key must be 32 bytes".into()))?;
        if inputs.signature.0.len() != 64 {
            return Err(PrimitiveError::Witness("signature must be 64 bytes".into()));
        }
        let identity_nullifier = field_bytes(&inputs.identity_nullifier, "identity nullifier")
            .map_err(|e| PrimitiveError::Witness(e.to_string()))?;
        let external_nullifier = field_bytes(&inputs.external_nullifier, "external nullifier")
            .map_err(|e| PrimitiveError::Witness(e.to_string()))?;

        let commitment = commitment_bytes(&identity_nullifier, &public_key);
        let root = root_from_path(commitment, &inputs.path)
            .ok_or_else(|| PrimitiveError::Witness("malformed merkle path".into()))?;
        let nullifiers = nullifiers_hash(&external_nullifier, &identity_nullifier);

        let mut signals = vec![
            Field::one(),
            Field::from_bytes_be(&root),
            Field::from_bytes_be(&nullifiers),
            inputs.signal_hash.clone(),
            inputs.external_nullifier.clone(),
            inputs.identity_nullifier.clone(),
            Field::from_bytes_be(&public_key),
            Field::from_bytes_be(&inputs.signature.0[..32]),
            Field::from_bytes_be(&inputs.signature.0[32..]),
        ];
        signals.extend(inputs.path.elements.iter().cloned());
        signals.extend(inputs.path.indices.iter().map(|&bit| Field::from(bit as u64)));

        Ok(Witness(signals))
    }

    fn generate_proof(&self, witness: &Witness, proving_key: &[u8]) -> Result<Proof, PrimitiveError> {
        let key = DevProvingKey::parse(proving_key)?;
        let publics = witness
            .0
            .get(1..=key.n_public)
            .ok_or_else(|| PrimitiveError::Witness("witness too short for proving key".into()))?;
        transparent_proof(&key.key_id, publics)
            .ok_or_else(|| PrimitiveError::Witness("public signal exceeds 256 bits".into()))
    }

    fn derive_public_signals(&self, witness: &Witness, circuit: &dyn Circuit) -> PublicSignals {
        PublicSignals(
            witness
                .0
                .iter()
                .skip(1)
                .take(circuit.n_public())
                .cloned()
                .collect(),
        )
    }

    fn verify_proof(
        &self,
        verification_key: &VerificationKey,
        proof: &Proof,
        public_signals: &PublicSignals,
    ) -> bool {
        if verification_key.protocol != DEV_PROTOCOL
            || public_signals.0.len() != verification_key.n_public
        {
            return false;
        }

        let key_id = match verification_key.vk_alpha_1.first().and_then(Field::to_bytes32) {
            Some(id) => id,
            None => return false,
        };

        let expected = match transparent_proof(&key_id, &public_signals.0).as_ref().and_then(proof_bytes) {
            Some(bytes) => bytes,
            None => return false,
        };
        let actual = match proof_bytes(proof) {
            Some(bytes) => bytes,
            None => return false,
        };

        expected.len() == actual.len() && bool::from(expected.ct_eq(&actual))
    }
}

// ============================================================================
// Tests
// ============================================================================

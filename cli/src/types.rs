//! Shared data types for proof construction and relayer submission
//!
//! Every large integer that crosses a boundary (leaves, commitments, proof
//! coordinates, the fee) is an exact-precision [`Field`]. On the wire a
//! field is a decimal string; parsing also accepts `0x`-hex strings and
//! plain JSON integers, which is what verification keys and RPC nodes emit.

use std::fmt;
use std::str::FromStr;

use ethers::types::U256;
use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

// ============================================================================
// Field
// ============================================================================

/// Arbitrary-precision unsigned integer used for every circuit value
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Field(pub BigUint);

impl Field {
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    pub fn one() -> Self {
        Self(BigUint::from(1u8))
    }

    pub fn from_bytes_be(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }

    /// Left-padded 32-byte big-endian encoding, `None` if the value needs more than 256 bits
    pub fn to_bytes32(&self) -> Option<[u8; 32]> {
        if self.0.bits() > 256 {
            return None;
        }
        let bytes = self.0.to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(&bytes);
        Some(out)
    }

    pub fn bits(&self) -> u64 {
        self.0.bits()
    }

    pub fn to_u256(&self) -> Option<U256> {
        self.to_bytes32().map(|bytes| U256::from_big_endian(&bytes))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", self.0.to_str_radix(16))
    }

    /// Parse a decimal or `0x`-prefixed hexadecimal string
    pub fn parse(input: &str) -> Result<Self, FieldParseError> {
        let trimmed = input.trim();
        let (digits, radix) = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => (hex, 16),
            None => (trimmed, 10),
        };

        if digits.is_empty() {
            return Err(FieldParseError(input.to_string()));
        }

        BigUint::parse_bytes(digits.as_bytes(), radix)
            .map(Self)
            .ok_or_else(|| FieldParseError(input.to_string()))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Field {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<u64> for Field {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<U256> for Field {
    fn from(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        Self::from_bytes_be(&bytes)
    }
}

impl From<BigUint> for Field {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid integer literal: {0:?}")]
pub struct FieldParseError(pub String);

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_str_radix(10))
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldVisitor;

        impl<'de> de::Visitor<'de> for FieldVisitor {
            type Value = Field;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer as a decimal string, 0x-hex string, or number")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Field, E> {
                Ok(Field::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Field, E> {
                u64::try_from(v)
                    .map(Field::from)
                    .map_err(|_| E::custom("negative integer"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Field, E> {
                Field::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(FieldVisitor)
    }
}

// ============================================================================
// Identity material
// ============================================================================

/// 32-byte identity private key, hex encoded at rest, zeroized on drop
#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct IdentityKey([u8; 32]);

impl IdentityKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes (handle with care)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentityKey(<redacted>)")
    }
}

impl Serialize for IdentityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for IdentityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut encoded = String::deserialize(deserializer)?;
        let decoded = hex::decode(encoded.trim_start_matches("0x")).map_err(de::Error::custom);
        encoded.zeroize();
        let mut decoded = decoded?;
        if decoded.len() != 32 {
            decoded.zeroize();
            return Err(de::Error::custom("identity key must be 32 bytes"));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }
}

/// Public key produced by the identity key derivation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(pub Vec<u8>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

/// A signature together with the exact message bytes that were signed
#[derive(Clone, Debug)]
pub struct SignedMessage {
    pub message: Vec<u8>,
    pub signature: Signature,
}

// ============================================================================
// Membership proof inputs
// ============================================================================

/// Sibling hashes and left/right bits from a leaf up to the root
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    pub elements: Vec<Field>,
    /// 0 when the running node is the left child, 1 when it is the right child
    pub indices: Vec<u8>,
}

/// Withdrawal signal and its field-sized hash
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signal {
    /// 0x-prefixed hex of the packed signal bytes
    pub signal: String,
    pub signal_hash: Field,
}

/// Everything the witness generator needs
#[derive(Clone, Debug)]
pub struct WitnessInputs {
    pub public_key: PublicKey,
    pub signature: Signature,
    pub signal_hash: Field,
    pub external_nullifier: Field,
    pub identity_nullifier: Field,
    pub path: MerklePath,
}

/// Full assignment of circuit signals
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Witness(pub Vec<Field>);

/// Circuit definition as downloaded (opaque to the orchestrator)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircuitDefinition(pub serde_json::Value);

// ============================================================================
// Proof artifacts
// ============================================================================

/// Groth16-shaped proof, coordinates serialized as decimal strings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub pi_a: Vec<Field>,
    pub pi_b: Vec<Vec<Field>>,
    pub pi_c: Vec<Field>,
    #[serde(default)]
    pub protocol: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicSignals(pub Vec<Field>);

/// Verification key in the layout emitted by common Groth16 tooling
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    pub protocol: String,
    #[serde(rename = "nPublic")]
    pub n_public: usize,
    pub vk_alpha_1: Vec<Field>,
    pub vk_beta_2: Vec<Vec<Field>>,
    pub vk_gamma_2: Vec<Vec<Field>>,
    pub vk_delta_2: Vec<Vec<Field>>,
    #[serde(rename = "IC")]
    pub ic: Vec<Vec<Field>>,
}

/// Submission-ready withdrawal authorization
///
/// Built once per attempt and handed to the relayer client by value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProofPackage {
    pub signal: String,
    pub signal_hash: Field,
    pub proof: Proof,
    pub public_signals: PublicSignals,
    pub recipient_address: String,
    pub fee_wei: Field,
}

// ============================================================================
// Addresses
// ============================================================================

/// Parse a 20-byte `0x`-prefixed account address
pub fn parse_address(input: &str) -> Option<[u8; 20]> {
    let hex_part = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X"))?;
    if hex_part.len() != 40 {
        return None;
    }
    let bytes = hex::decode(hex_part).ok()?;
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Some(out)
}

pub fn is_valid_address(input: &str) -> bool {
    parse_address(input).is_some()
}

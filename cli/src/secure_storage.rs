//! Encrypted deposit vault
//!
//! Uses AES-256-GCM for encryption and Argon2id for key derivation.
//! Identity keys are never stored in plaintext. The whole record list is
//! one ciphertext, rewritten on every mutation.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{bail, Context, Result};
use argon2::{
    password_hash::{rand_core::RngCore, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use zeroize::{Zeroize, Zeroizing};

use crate::store::{
    apply_insert, apply_withdrawal, find_record, DepositRecord, DepositRecordStore, StoreError,
};

/// Argon2 parameters for key derivation
const ARGON2_M_COST: u32 = 65536; // 64 MB memory
const ARGON2_T_COST: u32 = 3; // 3 iterations
const ARGON2_P_COST: u32 = 4; // 4 parallel lanes

const VAULT_VERSION: u8 = 1;

/// Environment variable that replaces the interactive password prompt
pub const PASSWORD_ENV: &str = "MIXER_VAULT_PASSWORD";

/// Encrypted vault file format
#[derive(Serialize, Deserialize)]
pub struct EncryptedVaultFile {
    /// Version for future compatibility
    pub version: u8,
    /// Salt for Argon2
    pub salt: String,
    /// Nonce for AES-GCM (base64)
    pub nonce: String,
    /// Encrypted record list (base64)
    pub ciphertext: String,
    /// Password hash for verification
    pub password_hash: Option<String>,
    pub updated_at: String,
}

fn derive_cipher(password: &str, salt: &str) -> Result<Aes256Gcm> {
    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(32))
            .map_err(|e| anyhow::anyhow!("Argon2 params error: {}", e))?,
    );

    let mut key_bytes = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key_bytes)
        .map_err(|e| anyhow::anyhow!("Key derivation failed: {}", e))?;

    let cipher = Aes256Gcm::new_from_slice(&key_bytes)
        .map_err(|e| anyhow::anyhow!("Cipher creation failed: {}", e));
    key_bytes.zeroize();
    cipher
}

impl EncryptedVaultFile {
    pub fn encrypt(plaintext: &[u8], password: &str) -> Result<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let cipher = derive_cipher(password, salt.as_str())?;

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .ok()
            .map(|h| h.to_string());

        Ok(Self {
            version: VAULT_VERSION,
            salt: salt.as_str().to_string(),
            nonce: b64::encode(&nonce_bytes),
            ciphertext: b64::encode(&ciphertext),
            password_hash,
            updated_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn decrypt(&self, password: &str) -> Result<Zeroizing<Vec<u8>>> {
        if self.version != VAULT_VERSION {
            bail!("Unsupported vault version {}", self.version);
        }

        if let Some(ref hash) = self.password_hash {
            let parsed_hash = argon2::PasswordHash::new(hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash: {}", e))?;

            Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .map_err(|_| anyhow::anyhow!("Invalid password"))?;
        }

        let cipher = derive_cipher(password, &self.salt)?;

        let nonce_bytes = b64::decode(&self.nonce).context("Invalid nonce encoding")?;
        let ciphertext = b64::decode(&self.ciphertext).context("Invalid ciphertext encoding")?;

        let nonce_array: [u8; 12] = nonce_bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid nonce length"))?;
        let nonce = Nonce::from(nonce_array);

        let plaintext = cipher
            .decrypt(&nonce, ciphertext.as_ref())
            .map_err(|_| anyhow::anyhow!("Decryption failed - wrong password or corrupted data"))?;

        Ok(Zeroizing::new(plaintext))
    }
}

/// Deposit store backed by an encrypted file
pub struct DepositVault {
    path: PathBuf,
    password: Zeroizing<String>,
    records: Mutex<Vec<DepositRecord>>,
}

impl DepositVault {
    /// Open the vault at `path`, starting empty if the file does not exist yet
    pub fn open(path: PathBuf, password: Zeroizing<String>) -> Result<Self> {
        let records = if path.exists() {
            Self::read(&path, &password)?
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            password,
            records: Mutex::new(records),
        })
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path, password: &str) -> Result<Vec<DepositRecord>> {
        let json = fs::read_to_string(path).context("Failed to read vault file")?;
        let encrypted: EncryptedVaultFile =
            serde_json::from_str(&json).context("Failed to parse vault file")?;

        let plaintext = encrypted.decrypt(password)?;
        serde_json::from_slice(&plaintext).context("Failed to parse decrypted deposit records")
    }

    fn write(&self, records: &[DepositRecord]) -> Result<(), StoreError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(records)?);
        let encrypted = EncryptedVaultFile::encrypt(&plaintext, &self.password)
            .map_err(|e| StoreError::Vault(e.to_string()))?;
        let json = serde_json::to_string_pretty(&encrypted)?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        // Replace by rename so an interrupted write never truncates the vault.
        // The temporary file is created with 0600 on Unix.
        let mut staged = NamedTempFile::new_in(parent)?;
        staged.write_all(json.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| e.error)?;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DepositRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a mutation to a copy, persist it, then commit it in memory
    fn mutate<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<DepositRecord>) -> Result<(), StoreError>,
    {
        let mut records = self.lock();
        let mut updated = records.clone();
        change(&mut updated)?;
        self.write(&updated)?;
        *records = updated;
        Ok(())
    }
}

impl DepositRecordStore for DepositVault {
    fn records(&self) -> Result<Vec<DepositRecord>, StoreError> {
        Ok(self.lock().clone())
    }

    fn get(&self, id: &str) -> Result<DepositRecord, StoreError> {
        find_record(&self.lock(), id).cloned()
    }

    fn insert(&self, record: DepositRecord) -> Result<(), StoreError> {
        self.mutate(|records| apply_insert(records, record))
    }

    fn record_withdrawal(&self, id: &str, tx_hash: &str) -> Result<(), StoreError> {
        self.mutate(|records| apply_withdrawal(records, id, tx_hash))
    }
}

/// Password strength validation
pub fn validate_password_strength(password: &str) -> Result<()> {
    if password.len() < 8 {
        bail!("Password must be at least 8 characters");
    }

    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_numeric());

    if !has_upper || !has_lower || !has_digit {
        bail!("Password must contain uppercase, lowercase, and numeric characters");
    }

    Ok(())
}

/// Prompt for password securely (hides input)
pub fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    rpassword::prompt_password(prompt)
        .map(Zeroizing::new)
        .context("Failed to read password")
}

/// Prompt for password with confirmation
pub fn prompt_new_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = prompt_password(prompt)?;
    let confirm = prompt_password("Confirm password: ")?;

    if *password != *confirm {
        bail!("Passwords do not match");
    }

    validate_password_strength(&password)?;

    Ok(password)
}

/// Vault password from the environment, else from the terminal
///
/// A vault that does not exist yet asks for a new password with confirmation.
pub fn vault_password(path: &Path) -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(Zeroizing::new(password));
    }

    if DepositVault::exists(path) {
        prompt_password("Vault password: ")
    } else {
        prompt_new_password("New vault password: ")
    }
}

// Base64 encoding/decoding helpers
mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};

    pub fn encode(data: &[u8]) -> String {
        STANDARD.encode(data)
    }

    pub fn decode(s: &str) -> anyhow::Result<Vec<u8>> {
        STANDARD
            .decode(s)
            .map_err(|e| anyhow::anyhow!("Base64 decode error: {}", e))
    }
}

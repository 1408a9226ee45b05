use rand::rngs::OsRng;
use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;
use std::str::FromStr;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Failed to sign message: {0}")]
    SigningError(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Returns the SHA-256 digest of `data` as a lowercase hexadecimal string
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Represents a wallet address (compressed secp256k1 public key in hex format)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Creates a new address from a public key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Address(hex::encode(public_key.serialize()))
    }

    /// Converts the address to a public key
    pub fn to_public_key(&self) -> Result<PublicKey, CryptoError> {
        let bytes = hex::decode(&self.0).map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        PublicKey::from_slice(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address = Address(s.to_string());
        // Only well-formed public keys are addresses
        address.to_public_key()?;
        Ok(address)
    }
}

/// Represents a digital signature (compact ECDSA signature in hex format)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Creates a new digital signature from a signature
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(hex::encode(signature.serialize_compact()))
    }

    /// Converts the digital signature to a signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = hex::decode(&self.0).map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        Signature::from_compact(&bytes).map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Represents a wallet with a keypair
#[derive(Debug, Clone)]
pub struct Wallet {
    secret_key: SecretKey,
    address: Address,
}

impl Wallet {
    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Exports the wallet's secret key as bytes
    pub fn export_secret_key(&self) -> Vec<u8> {
        self.secret_key.secret_bytes().to_vec()
    }
}

/// The secp256k1 context used for key derivation, signing and verification.
///
/// One context is created by whoever owns the ledger and handed to every
/// operation that needs it; there is no shared global instance.
#[derive(Debug, Clone)]
pub struct CryptoContext {
    secp: Secp256k1<All>,
}

impl Default for CryptoContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoContext {
    pub fn new() -> Self {
        CryptoContext {
            secp: Secp256k1::new(),
        }
    }

    /// Creates a new wallet with a random keypair
    pub fn generate_wallet(&self) -> Wallet {
        let (secret_key, public_key) = self.secp.generate_keypair(&mut OsRng);
        let address = Address::from_public_key(&public_key);

        Wallet { secret_key, address }
    }

    /// Creates a wallet from an existing secret key
    pub fn wallet_from_secret_key(&self, secret_key_bytes: &[u8]) -> Result<Wallet, CryptoError> {
        let secret_key = SecretKey::from_slice(secret_key_bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        let public_key = PublicKey::from_secret_key(&self.secp, &secret_key);
        let address = Address::from_public_key(&public_key);

        Ok(Wallet { secret_key, address })
    }

    /// Signs the SHA-256 digest of `message` with the wallet's private key
    pub fn sign(&self, wallet: &Wallet, message: &[u8]) -> Result<DigitalSignature, CryptoError> {
        let digest = Sha256::digest(message);
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| CryptoError::SigningError(e.to_string()))?;

        let signature = self.secp.sign_ecdsa(&message, &wallet.secret_key);
        Ok(DigitalSignature::from_signature(&signature))
    }

    /// Verifies a signature against a message and public key
    ///
    /// A well-formed signature that does not match yields `Ok(false)`;
    /// malformed inputs are reported as errors.
    pub fn verify(
        &self,
        message: &[u8],
        signature: &DigitalSignature,
        public_key: &PublicKey,
    ) -> Result<bool, CryptoError> {
        let signature = signature.to_signature()?;
        let digest = Sha256::digest(message);
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

        Ok(self.secp.verify_ecdsa(&message, &signature, public_key).is_ok())
    }
}

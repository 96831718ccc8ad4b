use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt;
use std::str::FromStr;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Hashes an ordered list of already-encoded fields into a hex SHA-256 digest.
///
/// Each field is prefixed with its byte length, so field boundaries are part
/// of the digest. The same fields in a different order hash differently.
pub fn crypto_hash<S: AsRef<str>>(fields: &[S]) -> String {
    let mut hasher = Sha256::new();

    for field in fields {
        let bytes = field.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }

    format!("{:x}", hasher.finalize())
}

/// Represents a wallet address (public key in base58 format)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    /// Creates a new address from a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        let bytes = public_key.as_bytes();
        let encoded = bs58::encode(bytes).into_string();
        Address(encoded)
    }

    /// Converts the address to a public key
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        VerifyingKey::from_bytes(&bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey("Invalid public key bytes".to_string())
        })?)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
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
        // Only real public keys are accepted from the outside
        let address = Address(s.to_string());
        address.to_public_key()?;
        Ok(address)
    }
}

/// Represents a digital signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Creates a new digital signature from a signature
    pub fn from_signature(signature: &Signature) -> Self {
        let bytes = signature.to_bytes();
        let encoded = bs58::encode(bytes).into_string();
        DigitalSignature(encoded)
    }

    /// Converts the digital signature to a signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSignature("Invalid signature length".to_string())
        })?;

        Ok(Signature::from_bytes(&signature_bytes))
    }
}

/// An ed25519 key pair and the address derived from it
#[derive(Debug, Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    address: Address,
}

impl KeyPair {
    /// Creates a new random keypair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        Self::from_signing_key(signing_key)
    }

    /// Restores a keypair from an existing secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_array: [u8; 32] = secret_key_bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes_array)))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = VerifyingKey::from(&signing_key);
        let address = Address::from_public_key(&verifying_key);

        KeyPair {
            signing_key,
            verifying_key,
            address,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Signs the JSON encoding of `payload`
    pub fn sign<T: Serialize + ?Sized>(&self, payload: &T) -> Result<DigitalSignature, CryptoError> {
        let message =
            serde_json::to_vec(payload).map_err(|e| CryptoError::EncodingError(e.to_string()))?;
        let signature = self.signing_key.sign(&message);
        Ok(DigitalSignature::from_signature(&signature))
    }
}

/// Verifies a signature over the JSON encoding of `payload` against an address.
///
/// Malformed keys or signatures are reported as errors, a well-formed
/// signature that does not match yields `Ok(false)`.
pub fn verify_signature<T: Serialize + ?Sized>(
    address: &Address,
    payload: &T,
    signature: &DigitalSignature,
) -> Result<bool, CryptoError> {
    let public_key = address.to_public_key()?;
    let signature = signature.to_signature()?;
    let message =
        serde_json::to_vec(payload).map_err(|e| CryptoError::EncodingError(e.to_string()))?;

    Ok(public_key.verify(&message, &signature).is_ok())
}

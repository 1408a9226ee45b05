use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{sha256_hex, Address, CryptoContext, CryptoError, DigitalSignature, Wallet};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Cannot sign a transaction for another address")]
    Unauthorized,

    #[error("No signature in this transaction")]
    MissingSignature,

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// Represents a transfer of value between two addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    /// Sender's address; `None` marks a mining reward
    pub from_address: Option<Address>,

    /// Recipient's address
    pub to_address: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Timestamp when the transaction was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Digital signature of the transaction
    pub signature: Option<DigitalSignature>,
}

impl Transaction {
    /// Creates a new unsigned transfer
    pub fn new(from_address: Address, to_address: Address, amount: f64) -> Self {
        Transaction {
            from_address: Some(from_address),
            to_address,
            amount,
            timestamp: Utc::now(),
            signature: None,
        }
    }

    /// Creates a mining reward transaction, which has no sender
    pub fn new_reward(to_address: Address, amount: f64) -> Self {
        Transaction {
            from_address: None,
            to_address,
            amount,
            timestamp: Utc::now(),
            signature: None,
        }
    }

    pub fn is_reward(&self) -> bool {
        self.from_address.is_none()
    }

    /// The signed fields as a JSON array, in fixed order
    pub(crate) fn digest_fields(&self) -> Value {
        json!([
            self.from_address.as_ref().map(|a| a.0.as_str()),
            self.to_address.0,
            self.amount,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
        ])
    }

    fn canonical_string(&self) -> String {
        self.digest_fields().to_string()
    }

    /// SHA-256 of the sender, recipient, amount and timestamp
    pub fn calculate_hash(&self) -> String {
        sha256_hex(self.canonical_string().as_bytes())
    }

    /// Signs the transaction with a wallet
    ///
    /// The wallet's address must be the transaction's sender.
    pub fn sign(&mut self, ctx: &CryptoContext, wallet: &Wallet) -> Result<(), TransactionError> {
        if self.from_address.as_ref() != Some(wallet.address()) {
            return Err(TransactionError::Unauthorized);
        }

        let hash = self.calculate_hash();
        self.signature = Some(ctx.sign(wallet, hash.as_bytes())?);

        Ok(())
    }

    /// Verifies the transaction's signature
    ///
    /// Reward transactions are always valid. Any other transaction must carry
    /// a signature that verifies against its sender's public key.
    pub fn verify(&self, ctx: &CryptoContext) -> Result<bool, TransactionError> {
        let sender = match &self.from_address {
            Some(sender) => sender,
            None => return Ok(true),
        };

        let signature = match &self.signature {
            Some(sig) if !sig.is_empty() => sig,
            _ => return Err(TransactionError::MissingSignature),
        };

        let public_key = sender.to_public_key()?;
        let hash = self.calculate_hash();

        ctx.verify(hash.as_bytes(), signature, &public_key)
            .map_err(TransactionError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_transaction() {
        let ctx = CryptoContext::new();
        let sender = ctx.generate_wallet();
        let recipient = ctx.generate_wallet();

        let transaction = Transaction::new(sender.address().clone(), recipient.address().clone(), 10.5);

        assert_eq!(transaction.from_address.as_ref(), Some(sender.address()));
        assert_eq!(&transaction.to_address, recipient.address());
        assert_eq!(transaction.amount, 10.5);
        assert!(transaction.signature.is_none());
        assert!(!transaction.is_reward());
    }

    #[test]
    fn test_sign_transaction() {
        let ctx = CryptoContext::new();
        let sender = ctx.generate_wallet();
        let recipient = ctx.generate_wallet();

        let mut transaction = Transaction::new(sender.address().clone(), recipient.address().clone(), 10.0);
        transaction.sign(&ctx, &sender).unwrap();

        assert!(transaction.signature.is_some());
        assert!(transaction.verify(&ctx).unwrap());
    }

    #[test]
    fn test_sign_with_foreign_key_is_rejected() {
        let ctx = CryptoContext::new();
        let sender = ctx.generate_wallet();
        let intruder = ctx.generate_wallet();

        for amount in [0.0, 1.0, 1_000_000.0] {
            let mut transaction = Transaction::new(sender.address().clone(), intruder.address().clone(), amount);
            let result = transaction.sign(&ctx, &intruder);

            assert!(matches!(result, Err(TransactionError::Unauthorized)));
            assert!(transaction.signature.is_none());
        }

        // A reward has no sender, so nobody may sign it
        let mut reward = Transaction::new_reward(sender.address().clone(), 100.0);
        assert!(matches!(reward.sign(&ctx, &sender), Err(TransactionError::Unauthorized)));
    }

    #[test]
    fn test_reward_transaction_is_valid_without_signature() {
        let ctx = CryptoContext::new();
        let miner = ctx.generate_wallet();

        let transaction = Transaction::new_reward(miner.address().clone(), 100.0);

        assert!(transaction.is_reward());
        assert!(transaction.signature.is_none());
        assert!(transaction.verify(&ctx).unwrap());
    }

    #[test]
    fn test_unsigned_transaction_is_missing_signature() {
        let ctx = CryptoContext::new();
        let sender = ctx.generate_wallet();
        let recipient = ctx.generate_wallet();

        let mut transaction = Transaction::new(sender.address().clone(), recipient.address().clone(), 5.0);
        assert!(matches!(transaction.verify(&ctx), Err(TransactionError::MissingSignature)));

        transaction.signature = Some(DigitalSignature(String::new()));
        assert!(matches!(transaction.verify(&ctx), Err(TransactionError::MissingSignature)));
    }

    #[test]
    fn test_tampered_transaction_fails_verification() {
        let ctx = CryptoContext::new();
        let sender = ctx.generate_wallet();
        let recipient = ctx.generate_wallet();

        let mut transaction = Transaction::new(sender.address().clone(), recipient.address().clone(), 5.0);
        transaction.sign(&ctx, &sender).unwrap();

        transaction.amount = 500.0;
        assert!(!transaction.verify(&ctx).unwrap());
    }

    #[test]
    fn test_hash_covers_timestamp() {
        let ctx = CryptoContext::new();
        let sender = ctx.generate_wallet();
        let recipient = ctx.generate_wallet();

        let first = Transaction::new(sender.address().clone(), recipient.address().clone(), 5.0);
        let mut second = first.clone();
        assert_eq!(first.calculate_hash(), second.calculate_hash());

        second.timestamp = first.timestamp + chrono::Duration::milliseconds(1);
        assert_ne!(first.calculate_hash(), second.calculate_hash());
    }

    #[test]
    fn test_shifted_digit_changes_hash() {
        let ctx = CryptoContext::new();
        let sender = ctx.generate_wallet();
        let recipient = ctx.generate_wallet();

        let original = Transaction::new(sender.address().clone(), recipient.address().clone(), 100.0);

        // Move the first digit of the timestamp into the amount
        let millis = original.timestamp.timestamp_millis().to_string();
        let mut shifted = original.clone();
        shifted.amount = format!("{}{}", original.amount, &millis[..1]).parse().unwrap();
        shifted.timestamp = Utc.timestamp_millis_opt(millis[1..].parse().unwrap()).unwrap();

        assert_ne!(original.calculate_hash(), shifted.calculate_hash());
    }

    #[test]
    fn test_hash_covers_sub_millisecond_timestamp() {
        let ctx = CryptoContext::new();
        let sender = ctx.generate_wallet();
        let recipient = ctx.generate_wallet();

        let first = Transaction::new(sender.address().clone(), recipient.address().clone(), 5.0);
        let mut second = first.clone();
        second.timestamp = first.timestamp + chrono::Duration::nanoseconds(1);

        assert_eq!(first.timestamp.timestamp_millis(), second.timestamp.timestamp_millis());
        assert_ne!(first.calculate_hash(), second.calculate_hash());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let json = r#"{
            "from_address": null,
            "to_address": "abc",
            "amount": 1.0,
            "timestamp": "2023-01-01T12:00:00Z",
            "signature": null,
            "memo": "extra"
        }"#;

        assert!(serde_json::from_str::<Transaction>(json).is_err());
    }
}

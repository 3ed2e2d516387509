//! On-chain payment verification.
//!
//! The verifier is ledger-neutral: it reads transactions through a
//! [`LedgerClient`] that reports finality and the token operations a
//! transaction performed. `pyre-svm` provides the Solana implementation.

use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::amount::TokenAmount;

/// Commitment level a transaction has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finality {
    /// Seen by the queried node only.
    Processed,
    /// Voted on by a supermajority of the cluster.
    Confirmed,
    /// Rooted and irreversible.
    Finalized,
}

impl Finality {
    /// Returns `true` if the transaction can be relied upon for payment.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Confirmed | Self::Finalized)
    }
}

/// Kind of a token operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Tokens moved between accounts.
    Transfer,
    /// Tokens destroyed.
    Burn,
}

/// A token movement performed by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenOperation {
    /// Transfer or burn.
    pub kind: OperationKind,
    /// Signer that authorized the movement.
    pub authority: Option<String>,
    /// Mint of the moved token, if the ledger could resolve it.
    pub mint: Option<String>,
    /// Source token account.
    pub source: Option<String>,
    /// Destination token account. `None` for burns.
    pub destination: Option<String>,
    /// Owner wallet of the destination account, if known.
    pub destination_owner: Option<String>,
    /// Raw amount in minor units.
    pub amount: TokenAmount,
}

impl TokenOperation {
    /// Returns `true` if this operation credits `recipient`, either as the
    /// destination token account or as its owner.
    #[must_use]
    pub fn credits(&self, recipient: &str) -> bool {
        self.kind == OperationKind::Transfer
            && (self.destination.as_deref() == Some(recipient)
                || self.destination_owner.as_deref() == Some(recipient))
    }
}

/// A transaction as read from the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerTransaction {
    /// On-chain execution error, if the transaction failed.
    pub error: Option<String>,
    /// Token operations, in instruction order.
    pub operations: Vec<TokenOperation>,
}

/// Transport-level failure talking to the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The reference is not a valid transaction identifier for this ledger.
    #[error("Invalid transaction reference: {0}")]
    InvalidReference(String),
    /// The ledger node could not be reached or answered with an error.
    #[error("Ledger request failed: {0}")]
    Transport(String),
    /// The ledger node answered with a payload that could not be understood.
    #[error("Unexpected ledger response: {0}")]
    InvalidResponse(String),
}

/// Read access to a ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetches a transaction by reference. `Ok(None)` if it does not exist.
    async fn get_transaction(
        &self,
        tx_reference: &str,
    ) -> Result<Option<LedgerTransaction>, LedgerError>;

    /// Returns the commitment level of a transaction, `Ok(None)` if unknown.
    async fn confirmation_status(&self, tx_reference: &str)
    -> Result<Option<Finality>, LedgerError>;
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for Arc<T> {
    async fn get_transaction(
        &self,
        tx_reference: &str,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        (**self).get_transaction(tx_reference).await
    }

    async fn confirmation_status(
        &self,
        tx_reference: &str,
    ) -> Result<Option<Finality>, LedgerError> {
        (**self).confirmation_status(tx_reference).await
    }
}

/// What a payment transaction is expected to contain.
///
/// Every expectation is optional; unset expectations are not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyRequest {
    /// Transaction reference (signature) to verify.
    pub tx_reference: String,
    /// Wallet that must have authorized the payment.
    pub expected_sender: Option<String>,
    /// Wallet (or token account) that must be credited.
    pub expected_recipient: Option<String>,
    /// Minimum amount in minor units, with a 1% tolerance.
    pub expected_amount: Option<TokenAmount>,
    /// Mint the payment must be made in.
    pub expected_mint: Option<String>,
}

impl VerifyRequest {
    /// Creates a request with no expectations.
    #[must_use]
    pub fn new(tx_reference: impl Into<String>) -> Self {
        Self {
            tx_reference: tx_reference.into(),
            ..Self::default()
        }
    }

    /// Requires the payment to be authorized by `sender`.
    #[must_use]
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.expected_sender = Some(sender.into());
        self
    }

    /// Requires the payment to credit `recipient`.
    #[must_use]
    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.expected_recipient = Some(recipient.into());
        self
    }

    /// Requires at least `amount` (within 1%) to be moved.
    #[must_use]
    pub const fn amount(mut self, amount: TokenAmount) -> Self {
        self.expected_amount = Some(amount);
        self
    }

    /// Requires the payment to be made in `mint`.
    #[must_use]
    pub fn mint(mut self, mint: impl Into<String>) -> Self {
        self.expected_mint = Some(mint.into());
        self
    }
}

/// A payment confirmed on-chain. Only constructed by a verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPayment {
    /// Wallet that authorized the payment, if any operation named one.
    pub sender: Option<String>,
    /// Total amount moved, in minor units.
    pub amount: TokenAmount,
    /// Transaction reference.
    pub tx_reference: String,
    /// Verification time, milliseconds since the Unix epoch.
    pub verified_at: i64,
}

/// Reasons a payment does not verify.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// The transaction reference is empty or not well-formed.
    #[error("Transaction signature is required")]
    MalformedReference,
    /// The ledger does not know the transaction.
    #[error("Transaction not found")]
    NotFound,
    /// The transaction has not reached confirmed commitment.
    #[error("Transaction not confirmed")]
    NotFinalized,
    /// The transaction executed with an error.
    #[error("Transaction failed on-chain")]
    OnChainFailure,
    /// The payment was authorized by someone else.
    #[error("Transaction sender does not match expected wallet")]
    SenderMismatch,
    /// Not enough tokens were moved.
    #[error("Insufficient payment: expected {expected}, got {actual}")]
    InsufficientAmount {
        /// Expected minor units.
        expected: TokenAmount,
        /// Moved minor units.
        actual: TokenAmount,
    },
    /// An amount was expected but the transaction moved no matching tokens.
    #[error("Transaction contains no matching token transfer")]
    NoTokenMovement,
    /// No counted transfer credits the expected recipient.
    #[error("Transaction does not pay the expected recipient")]
    RecipientMismatch,
    /// The ledger could not be queried.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Display form of a verification outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// Whether the payment verified.
    pub valid: bool,
    /// Amount moved, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<TokenAmount>,
    /// Sender, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Result<VerifiedPayment, VerificationError>> for VerificationResult {
    fn from(result: &Result<VerifiedPayment, VerificationError>) -> Self {
        match result {
            Ok(payment) => Self {
                valid: true,
                amount: Some(payment.amount),
                sender: payment.sender.clone(),
                error: None,
            },
            Err(err) => Self {
                valid: false,
                amount: None,
                sender: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Object-safe verification seam used by the payment gate.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Verifies a payment transaction against `request`.
    async fn verify(&self, request: &VerifyRequest)
    -> Result<VerifiedPayment, VerificationError>;
}

/// Verifies payments by reading transactions through a [`LedgerClient`].
///
/// Makes a single attempt per call; retrying is left to the ledger client.
#[derive(Clone)]
pub struct TransactionVerifier<L> {
    ledger: L,
}

impl<L> Debug for TransactionVerifier<L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionVerifier").finish_non_exhaustive()
    }
}

impl<L: LedgerClient> TransactionVerifier<L> {
    /// Creates a verifier over `ledger`.
    pub const fn new(ledger: L) -> Self {
        Self { ledger }
    }

    /// Returns the underlying ledger client.
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Verifies a payment transaction.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a [`VerificationError`].
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "pyre.verify", skip_all, fields(tx = %request.tx_reference), err)
    )]
    pub async fn verify_payment(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifiedPayment, VerificationError> {
        let tx_reference = request.tx_reference.trim();
        if tx_reference.is_empty() {
            return Err(VerificationError::MalformedReference);
        }

        let tx = self
            .ledger
            .get_transaction(tx_reference)
            .await?
            .ok_or(VerificationError::NotFound)?;
        let finality = self.ledger.confirmation_status(tx_reference).await?;
        if !finality.is_some_and(Finality::is_settled) {
            return Err(VerificationError::NotFinalized);
        }
        if tx.error.is_some() {
            return Err(VerificationError::OnChainFailure);
        }

        let recipient = request.expected_recipient.as_deref();
        let tally = Tally::collect(&tx.operations, request.expected_mint.as_deref(), recipient);

        if let (Some(expected), Some(sender)) = (&request.expected_sender, &tally.sender)
            && expected != sender
        {
            return Err(VerificationError::SenderMismatch);
        }

        if let Some(expected) = request.expected_amount
            && !expected.is_zero()
        {
            if tally.amount.is_zero() {
                // Movement of the mint that never reached the recipient.
                if recipient.is_some() && tally.matched > 0 {
                    return Err(VerificationError::RecipientMismatch);
                }
                return Err(VerificationError::NoTokenMovement);
            }
            if !within_tolerance(tally.amount, expected) {
                return Err(VerificationError::InsufficientAmount {
                    expected,
                    actual: tally.amount,
                });
            }
        }

        if recipient.is_some() && tally.counted.is_empty() {
            return Err(VerificationError::RecipientMismatch);
        }

        Ok(VerifiedPayment {
            sender: tally.sender,
            amount: tally.amount,
            tx_reference: tx_reference.to_owned(),
            verified_at: chrono::Utc::now().timestamp_millis(),
        })
    }
}

#[async_trait]
impl<L: LedgerClient> PaymentVerifier for TransactionVerifier<L> {
    async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifiedPayment, VerificationError> {
        self.verify_payment(request).await
    }
}

/// Accumulated view of the operations that count toward a payment.
///
/// With an expected recipient only transfers crediting it are counted, so
/// movements back into the payer's own accounts never inflate the amount.
struct Tally<'a> {
    amount: TokenAmount,
    sender: Option<String>,
    counted: Vec<&'a TokenOperation>,
    /// Operations of the expected mint, credited or not.
    matched: usize,
}

impl<'a> Tally<'a> {
    fn collect(
        operations: &'a [TokenOperation],
        expected_mint: Option<&str>,
        expected_recipient: Option<&str>,
    ) -> Self {
        let mut tally = Self {
            amount: TokenAmount::ZERO,
            sender: None,
            counted: Vec::new(),
            matched: 0,
        };
        for op in operations {
            // Unknown mints are skipped when a mint is expected.
            if let Some(expected) = expected_mint
                && op.mint.as_deref() != Some(expected)
            {
                continue;
            }
            tally.matched += 1;
            if let Some(recipient) = expected_recipient
                && !op.credits(recipient)
            {
                continue;
            }
            if tally.sender.is_none() {
                tally.sender.clone_from(&op.authority);
            }
            tally.amount = tally.amount.saturating_add(op.amount);
            tally.counted.push(op);
        }
        tally
    }
}

/// `actual >= expected * 0.99`, evaluated on integers.
fn within_tolerance(actual: TokenAmount, expected: TokenAmount) -> bool {
    let lhs = actual.minor_units().checked_mul(100);
    let rhs = expected.minor_units().checked_mul(99);
    match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => lhs >= rhs,
        // Compare at reduced precision when either side would overflow.
        _ => actual.minor_units() / 99 >= expected.minor_units() / 100,
    }
}

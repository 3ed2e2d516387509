//! Extraction of SPL token movements from `jsonParsed` transactions.
//!
//! Only top-level instructions of the SPL Token and Token-2022 programs are
//! considered. `transfer` and `burn` do not name their mint; it is resolved
//! through the transaction's `postTokenBalances`, which also supply the owner
//! wallet of the destination account. Instructions that fail to decode are
//! skipped.

use pyre::amount::TokenAmount;
use pyre::verifier::{LedgerTransaction, OperationKind, TokenOperation};
use serde::Deserialize;
use serde_with::{VecSkipError, serde_as};
use solana_pubkey::Pubkey;

use crate::networks::{SPL_TOKEN_2022_PROGRAM_ID, SPL_TOKEN_PROGRAM_ID};

/// `result` of a `getTransaction` call with `jsonParsed` encoding.
#[derive(Debug, Clone, Deserialize)]
pub struct EncodedTransaction {
    /// Execution metadata.
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
    /// The transaction itself.
    pub transaction: ParsedTransaction,
}

/// Execution metadata of a transaction.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    /// Execution error, `null` on success.
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    /// Token balances after execution.
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    pub post_token_balances: Vec<TokenBalance>,
}

/// A token account balance entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    /// Index into the message's account keys.
    pub account_index: usize,
    /// Mint of the account.
    pub mint: String,
    /// Owner wallet of the account.
    #[serde(default)]
    pub owner: Option<String>,
}

/// Signed transaction with a parsed message.
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedTransaction {
    /// The message.
    pub message: ParsedMessage,
}

/// Parsed transaction message.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage {
    /// Accounts referenced by the transaction.
    pub account_keys: Vec<AccountKey>,
    /// Top-level instructions. Entries that fail to decode are dropped.
    #[serde_as(as = "VecSkipError<_>")]
    pub instructions: Vec<ParsedInstruction>,
}

/// An account key, either as an object or a bare address.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AccountKey {
    /// `{ "pubkey": ..., "signer": ..., "writable": ... }`
    Parsed {
        /// Address.
        pubkey: String,
    },
    /// Bare address.
    Plain(String),
}

impl AccountKey {
    /// The address.
    #[must_use]
    pub fn pubkey(&self) -> &str {
        match self {
            Self::Parsed { pubkey } | Self::Plain(pubkey) => pubkey,
        }
    }
}

/// A top-level instruction decoded by the RPC node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedInstruction {
    /// Program label, such as `spl-token`.
    #[serde(default)]
    pub program: Option<String>,
    /// Program address.
    #[serde(default)]
    pub program_id: Option<String>,
    /// Decoded instruction. Absent for programs the node cannot decode.
    #[serde(default)]
    pub parsed: Option<ParsedBody>,
}

/// `parsed` body of a token program instruction.
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedBody {
    /// Instruction name, such as `transferChecked`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Instruction accounts and arguments.
    #[serde(default)]
    pub info: TokenInstructionInfo,
}

/// Union of the `info` fields of SPL token transfers and burns.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInstructionInfo {
    /// Source token account of a transfer.
    pub source: Option<String>,
    /// Destination token account of a transfer.
    pub destination: Option<String>,
    /// Token account a burn debits.
    pub account: Option<String>,
    /// Mint, present on checked variants and burns.
    pub mint: Option<String>,
    /// Single signer authority.
    pub authority: Option<String>,
    /// Multisig authority.
    pub multisig_authority: Option<String>,
    /// Raw amount of unchecked variants.
    pub amount: Option<String>,
    /// Amount of checked variants.
    pub token_amount: Option<UiTokenAmount>,
}

/// Amount of a checked instruction.
#[derive(Debug, Clone, Deserialize)]
pub struct UiTokenAmount {
    /// Raw amount in minor units.
    pub amount: String,
}

impl ParsedInstruction {
    fn is_token_program(&self) -> bool {
        match (self.program.as_deref(), self.program_id.as_deref()) {
            (Some("spl-token" | "spl-token-2022"), _) => true,
            (_, Some(id)) => id
                .parse::<Pubkey>()
                .is_ok_and(|id| id == SPL_TOKEN_PROGRAM_ID || id == SPL_TOKEN_2022_PROGRAM_ID),
            _ => false,
        }
    }
}

impl TokenInstructionInfo {
    fn raw_amount(&self) -> Option<TokenAmount> {
        let raw = self
            .token_amount
            .as_ref()
            .map(|t| t.amount.as_str())
            .or(self.amount.as_deref())?;
        raw.parse().ok()
    }
}

impl EncodedTransaction {
    /// Converts the transaction into its ledger-neutral form.
    #[must_use]
    pub fn into_ledger_transaction(self) -> LedgerTransaction {
        let meta = self.meta.unwrap_or_default();
        let error = meta.err.filter(|e| !e.is_null()).map(|e| e.to_string());
        let keys = &self.transaction.message.account_keys;
        let balances = &meta.post_token_balances;

        let lookup = |account: Option<&str>| find_balance(keys, balances, account);

        let operations = self
            .transaction
            .message
            .instructions
            .iter()
            .filter(|ix| ix.is_token_program())
            .filter_map(|ix| {
                let body = ix.parsed.as_ref()?;
                let info = &body.info;
                let kind = match body.kind.as_str() {
                    "transfer" | "transferChecked" => OperationKind::Transfer,
                    "burn" | "burnChecked" => OperationKind::Burn,
                    _ => return None,
                };
                let amount = info.raw_amount()?;
                let (source, destination) = match kind {
                    OperationKind::Transfer => (info.source.clone(), info.destination.clone()),
                    OperationKind::Burn => (info.account.clone(), None),
                };
                let destination_owner = lookup(destination.as_deref()).and_then(|b| b.owner.clone());
                let mint = info.mint.clone().or_else(|| {
                    lookup(destination.as_deref())
                        .or_else(|| lookup(source.as_deref()))
                        .map(|b| b.mint.clone())
                });
                Some(TokenOperation {
                    kind,
                    authority: info
                        .authority
                        .clone()
                        .or_else(|| info.multisig_authority.clone()),
                    mint,
                    source,
                    destination,
                    destination_owner,
                    amount,
                })
            })
            .collect();

        LedgerTransaction { error, operations }
    }
}

/// Post-execution balance entry of the token account `account`.
fn find_balance<'a>(
    keys: &[AccountKey],
    balances: &'a [TokenBalance],
    account: Option<&str>,
) -> Option<&'a TokenBalance> {
    let account = account?;
    let index = keys.iter().position(|k| k.pubkey() == account)?;
    balances.iter().find(|b| b.account_index == index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MINT: &str = "Ecqv1vJq8dDHqq7hU5bLFZC42DQSsKgnANFdaFEtBAGS";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const SENDER: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
    const RECIPIENT: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const SENDER_ATA: &str = "3Kx1yZGRGkbPUZrvmzFmNXPpNDLFp1vyaAG4ZhdvPhBR";
    const RECIPIENT_ATA: &str = "BwGKGuzKkZe1Qm2WUctDWnFKqNBCyjUpGGvyjVNnrFqQ";

    fn fixture(instructions: serde_json::Value, err: serde_json::Value) -> EncodedTransaction {
        serde_json::from_value(json!({
            "slot": 312_000_000,
            "meta": {
                "err": err,
                "postTokenBalances": [
                    { "accountIndex": 1, "mint": MINT, "owner": SENDER },
                    { "accountIndex": 2, "mint": MINT, "owner": RECIPIENT }
                ]
            },
            "transaction": {
                "signatures": ["sig"],
                "message": {
                    "accountKeys": [
                        { "pubkey": SENDER, "signer": true, "writable": true },
                        { "pubkey": SENDER_ATA, "signer": false, "writable": true },
                        { "pubkey": RECIPIENT_ATA, "signer": false, "writable": true }
                    ],
                    "instructions": instructions
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_transfer_resolves_mint_and_owner() {
        let tx = fixture(
            json!([{
                "program": "spl-token",
                "programId": SPL_TOKEN_PROGRAM_ID.to_string(),
                "parsed": {
                    "type": "transfer",
                    "info": {
                        "source": SENDER_ATA,
                        "destination": RECIPIENT_ATA,
                        "authority": SENDER,
                        "amount": "20000000000"
                    }
                }
            }]),
            json!(null),
        )
        .into_ledger_transaction();

        assert!(tx.error.is_none());
        assert_eq!(tx.operations.len(), 1);
        let op = &tx.operations[0];
        assert_eq!(op.kind, OperationKind::Transfer);
        assert_eq!(op.mint.as_deref(), Some(MINT));
        assert_eq!(op.destination_owner.as_deref(), Some(RECIPIENT));
        assert_eq!(op.authority.as_deref(), Some(SENDER));
        assert_eq!(op.amount, TokenAmount::new(20_000_000_000));
    }

    #[test]
    fn test_checked_variants_and_burn() {
        let tx = fixture(
            json!([
                {
                    "program": "spl-token",
                    "parsed": {
                        "type": "transferChecked",
                        "info": {
                            "source": SENDER_ATA,
                            "destination": RECIPIENT_ATA,
                            "mint": USDC,
                            "authority": SENDER,
                            "tokenAmount": { "amount": "5000", "decimals": 6, "uiAmount": 0.005 }
                        }
                    }
                },
                {
                    "program": "spl-token",
                    "parsed": {
                        "type": "burnChecked",
                        "info": {
                            "account": SENDER_ATA,
                            "mint": MINT,
                            "authority": SENDER,
                            "tokenAmount": { "amount": "7", "decimals": 9 }
                        }
                    }
                }
            ]),
            json!(null),
        )
        .into_ledger_transaction();

        assert_eq!(tx.operations.len(), 2);
        assert_eq!(tx.operations[0].mint.as_deref(), Some(USDC));
        assert_eq!(tx.operations[1].kind, OperationKind::Burn);
        assert_eq!(tx.operations[1].destination, None);
        assert_eq!(tx.operations[1].amount, TokenAmount::new(7));
    }

    #[test]
    fn test_unknown_mint_stays_unknown() {
        let tx = fixture(
            json!([{
                "program": "spl-token",
                "parsed": {
                    "type": "transfer",
                    "info": {
                        "source": "unknown-source",
                        "destination": "unknown-destination",
                        "authority": SENDER,
                        "amount": "1"
                    }
                }
            }]),
            json!(null),
        )
        .into_ledger_transaction();
        assert_eq!(tx.operations[0].mint, None);
    }

    #[test]
    fn test_non_token_instructions_are_ignored() {
        let tx = fixture(
            json!([
                { "program": "spl-memo", "parsed": "pay for /api/data/time" },
                {
                    "programId": "ComputeBudget111111111111111111111111111111",
                    "accounts": [],
                    "data": "3DdGGhkhJbjm"
                },
                {
                    "program": "system",
                    "parsed": { "type": "transfer", "info": { "lamports": 5000 } }
                },
                {
                    "program": "spl-token",
                    "parsed": { "type": "approve", "info": { "amount": "1" } }
                }
            ]),
            json!(null),
        )
        .into_ledger_transaction();
        assert!(tx.operations.is_empty());
    }

    #[test]
    fn test_execution_error_is_reported() {
        let tx = fixture(json!([]), json!({ "InstructionError": [0, "Custom"] }))
            .into_ledger_transaction();
        assert!(tx.error.unwrap().contains("InstructionError"));
    }
}

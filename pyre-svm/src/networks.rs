//! Well-known Solana clusters and program addresses.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use solana_pubkey::{Pubkey, pubkey};

/// SPL Token program.
pub const SPL_TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// SPL Token-2022 program.
pub const SPL_TOKEN_2022_PROGRAM_ID: Pubkey =
    pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// Solana incinerator. Tokens sent here are unrecoverable.
pub const INCINERATOR: Pubkey = pubkey!("1nc1nerator11111111111111111111111111111111");

/// A public Solana cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolanaCluster {
    /// Mainnet beta.
    Mainnet,
    /// Devnet.
    Devnet,
}

impl SolanaCluster {
    /// Public JSON-RPC endpoint of the cluster.
    ///
    /// Public endpoints are heavily rate limited; production deployments
    /// should configure a dedicated RPC provider.
    #[must_use]
    pub const fn public_rpc_url(self) -> &'static str {
        match self {
            Self::Mainnet => "https://api.mainnet-beta.solana.com",
            Self::Devnet => "https://api.devnet.solana.com",
        }
    }

    /// Solscan URL of a transaction on this cluster.
    #[must_use]
    pub fn explorer_tx_url(self, signature: &str) -> String {
        match self {
            Self::Mainnet => format!("https://solscan.io/tx/{signature}"),
            Self::Devnet => format!("https://solscan.io/tx/{signature}?cluster=devnet"),
        }
    }
}

impl Display for SolanaCluster {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => f.write_str("mainnet"),
            Self::Devnet => f.write_str("devnet"),
        }
    }
}

/// The string does not name a known cluster.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown Solana cluster: {0}")]
pub struct UnknownCluster(pub String);

impl FromStr for SolanaCluster {
    type Err = UnknownCluster;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" | "mainnet-beta" | "solana" => Ok(Self::Mainnet),
            "devnet" | "solana-devnet" => Ok(Self::Devnet),
            other => Err(UnknownCluster(other.to_owned())),
        }
    }
}

/// Returns `true` if `address` is a valid base58 public key.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    Pubkey::from_str(address).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_parse() {
        assert_eq!("mainnet-beta".parse(), Ok(SolanaCluster::Mainnet));
        assert_eq!("devnet".parse(), Ok(SolanaCluster::Devnet));
        assert!("testnet".parse::<SolanaCluster>().is_err());
    }

    #[test]
    fn test_explorer_url() {
        assert_eq!(
            SolanaCluster::Devnet.explorer_tx_url("abc"),
            "https://solscan.io/tx/abc?cluster=devnet"
        );
        assert_eq!(
            SolanaCluster::Mainnet.explorer_tx_url("abc"),
            "https://solscan.io/tx/abc"
        );
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address(&INCINERATOR.to_string()));
        assert!(is_valid_address("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"));
        assert!(!is_valid_address("PYRE_TOKEN_MINT_ADDRESS_HERE"));
    }
}

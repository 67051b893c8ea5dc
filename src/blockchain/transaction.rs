use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::asset::Asset;
use super::hash;

/// Reserved account that mints new assets and pays mining rewards. Assets
/// enter the ledger through it; nothing is ever transferred to it.
pub const SYSTEM_ACCOUNT: &str = "SYSTEM";

/// Content-addressed transaction identifier: the SHA-256 hex digest of the
/// transaction's canonical encoding.
pub type TxId = String;

/// A named account in the ledger. Accounts are plain identifiers with no
/// key material attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn system() -> Self {
        AccountId(SYSTEM_ACCOUNT.to_string())
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_ACCOUNT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        AccountId(value.to_string())
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        AccountId(value)
    }
}

/// A transfer of ownership recorded in the ledger.
///
/// Three shapes occur:
/// - mint: sender is [`SYSTEM_ACCOUNT`] and an asset is attached,
/// - transfer: sender is a regular account that currently owns the asset,
/// - mining reward: sender is [`SYSTEM_ACCOUNT`], no asset, price zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Account giving up ownership (`SYSTEM` for mints and rewards).
    pub sender: AccountId,

    /// Account receiving ownership.
    pub receiver: AccountId,

    /// The asset changing hands. Absent for mining rewards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<Asset>,

    /// Sale price in minor currency units.
    pub price: u64,

    /// Set once when the transaction is first submitted and carried verbatim
    /// through relays and mining, so its identifier never drifts.
    #[serde(default = "Utc::now")]
    #[schema(value_type = String, example = "2024-04-13T12:00:00Z")]
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Creates a new transaction timestamped now
    ///
    /// # Arguments
    ///
    /// * `sender` - The account giving up ownership
    /// * `receiver` - The account receiving ownership
    /// * `asset` - The asset changing hands, or None for a mining reward
    /// * `price` - The sale price in minor currency units
    ///
    /// # Returns
    ///
    /// A new Transaction instance
    pub fn new(sender: AccountId, receiver: AccountId, asset: Option<Asset>, price: u64) -> Self {
        Transaction {
            sender,
            receiver,
            asset,
            price,
            timestamp: Utc::now(),
        }
    }

    /// Creates a mining reward transaction
    ///
    /// # Arguments
    ///
    /// * `miner` - The account credited for sealing the block
    ///
    /// # Returns
    ///
    /// A new Transaction instance from `SYSTEM`, with no asset and price zero
    pub fn reward(miner: AccountId) -> Self {
        Transaction::new(AccountId::system(), miner, None, 0)
    }

    /// Calculates the content-addressed identifier
    ///
    /// # Returns
    ///
    /// The SHA-256 hex digest of the transaction's canonical encoding; two
    /// transactions with identical fields (timestamp included) share an id
    pub fn id(&self) -> TxId {
        hash::digest(self)
    }

    /// True for mining rewards: issued by `SYSTEM` with no asset attached.
    pub fn is_reward(&self) -> bool {
        self.sender.is_system() && self.asset.is_none()
    }

    /// True when this transaction mints an asset rather than transferring one.
    pub fn is_mint(&self) -> bool {
        self.sender.is_system() && self.asset.is_some()
    }
}

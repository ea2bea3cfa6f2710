//! Demand bookkeeping for recording sinks.
//!
//! Every credit a [`RecordingSink`](crate::lab::RecordingSink) grants and
//! every value it receives is written to a [`DemandLedger`] together with
//! the resulting balance. Unlike [`Demand`], a balance can go negative:
//! that is exactly how an over-delivering source shows up.

use crate::types::{Demand, VirtualTime};
use core::fmt;
use serde::{Deserialize, Serialize};

/// Signed demand balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandBalance {
    /// A finite balance; negative after unauthorized deliveries.
    Finite(i64),
    /// Unlimited credit. Debits leave it unlimited.
    Unlimited,
}

impl DemandBalance {
    /// A zero balance.
    pub const ZERO: Self = Self::Finite(0);

    /// Returns the balance after crediting `demand`.
    #[must_use]
    pub fn credit(self, demand: Demand) -> Self {
        match (self, demand) {
            (Self::Unlimited, _) | (_, Demand::Unlimited) => Self::Unlimited,
            (Self::Finite(balance), Demand::Max(amount)) => {
                let amount = i64::try_from(amount).unwrap_or(i64::MAX);
                Self::Finite(balance.saturating_add(amount))
            }
        }
    }

    /// Returns the balance after one delivered value.
    #[must_use]
    pub const fn debit(self) -> Self {
        match self {
            Self::Finite(balance) => Self::Finite(balance.saturating_sub(1)),
            Self::Unlimited => Self::Unlimited,
        }
    }

    /// Returns true if at least one more value is authorized.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        match self {
            Self::Finite(balance) => balance > 0,
            Self::Unlimited => true,
        }
    }

    /// Returns true for a finite zero balance.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        matches!(self, Self::Finite(0))
    }

    /// Returns true for a finite balance below zero.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        matches!(self, Self::Finite(balance) if balance < 0)
    }

    /// Returns the finite balance, or `None` when unlimited.
    #[must_use]
    pub const fn finite(self) -> Option<i64> {
        match self {
            Self::Finite(balance) => Some(balance),
            Self::Unlimited => None,
        }
    }
}

impl Default for DemandBalance {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for DemandBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(balance) => write!(f, "{balance}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// One ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transaction {
    /// Credit granted upstream.
    Credit {
        /// Amount granted.
        amount: Demand,
    },
    /// One value received.
    Debit {
        /// Whether the balance covered the value before it arrived.
        authorized: bool,
    },
}

/// A ledger line: when, what, and the balance afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DemandLedgerEntry {
    /// Virtual time of the movement.
    pub time: VirtualTime,
    /// Balance after the movement.
    pub balance: DemandBalance,
    /// The movement itself.
    pub transaction: Transaction,
}

/// Chronological record of a sink's demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemandLedger {
    entries: Vec<DemandLedgerEntry>,
}

impl DemandLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, time: VirtualTime, balance: DemandBalance, transaction: Transaction) {
        self.entries.push(DemandLedgerEntry {
            time,
            balance,
            transaction,
        });
    }

    /// Returns all entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[DemandLedgerEntry] {
        &self.entries
    }

    /// Iterates over the entries, oldest first.
    pub fn iter(&self) -> core::slice::Iter<'_, DemandLedgerEntry> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the balance after the latest entry.
    #[must_use]
    pub fn balance(&self) -> DemandBalance {
        self.entries
            .last()
            .map_or(DemandBalance::ZERO, |entry| entry.balance)
    }

    /// Returns true if the balance ever went below zero.
    #[must_use]
    pub fn has_negative_balance(&self) -> bool {
        self.entries.iter().any(|entry| entry.balance.is_negative())
    }

    /// Returns the entries for values that arrived without credit.
    #[must_use]
    pub fn unauthorized_debits(&self) -> Vec<DemandLedgerEntry> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.transaction, Transaction::Debit { authorized: false }))
            .copied()
            .collect()
    }

    /// Returns a JSON report of the ledger.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        json!({
            "balance": self.balance(),
            "negative": self.has_negative_balance(),
            "unauthorized_debits": self.unauthorized_debits().len(),
            "entries": self.entries,
        })
    }
}

impl<'a> IntoIterator for &'a DemandLedger {
    type Item = &'a DemandLedgerEntry;
    type IntoIter = core::slice::Iter<'a, DemandLedgerEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

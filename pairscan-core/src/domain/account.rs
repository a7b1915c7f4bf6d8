//! Account state consumed from the broker-facing collaborator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: f64,
    pub currency: String,
}

impl AccountState {
    pub fn new(balance: f64, currency: impl Into<String>) -> Self {
        Self {
            balance,
            currency: currency.into(),
        }
    }
}

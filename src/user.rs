//! Marketplace accounts

use crate::error::MarketError;
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum AccountType {
    #[n(0)]
    Buyer,
    #[n(1)]
    Seller,
    #[n(2)]
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct User {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded
    #[n(1)]
    pub email: String, // unique, doubles as the tree key
    #[n(2)]
    pub name: String,
    #[n(3)]
    pub account_type: AccountType,
    #[n(4)]
    pub is_verified: bool,
}

impl User {
    /// Fresh account. Verification starts false; only an admin action
    /// flips it.
    pub fn new(email: &str, name: &str, account_type: AccountType) -> Result<Self, MarketError> {
        if email.trim().is_empty() {
            return Err(MarketError::Validation("email is required".into()));
        }

        let id = utils::new_uuid_to_bech32("user_").map_err(MarketError::Upstream)?;

        Ok(Self {
            id,
            email: email.to_owned(),
            name: name.to_owned(),
            account_type,
            is_verified: false,
        })
    }
}

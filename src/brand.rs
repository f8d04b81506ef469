//! Phone brand catalogue

use crate::error::MarketError;
use crate::utils;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Brand {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded
    #[n(1)]
    pub name: String,
}

impl Brand {
    /// Brands are immutable once created; the name is the only required
    /// field.
    pub fn new(name: &str) -> Result<Self, MarketError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MarketError::Validation("brand name is required".into()));
        }

        let id = utils::new_uuid_to_bech32("brand_").map_err(MarketError::Upstream)?;

        Ok(Self {
            id,
            name: name.to_owned(),
        })
    }
}

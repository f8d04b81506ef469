//! Phone listings and their sale lifecycle
//!
//! A listing starts `Available` and moves to `Sold` exactly once; the
//! orthogonal advertised flag moves false to true exactly once. Neither
//! transition can be undone, so both fields stay private and the only
//! write paths are [`PhoneListing::advertise`] and
//! [`PhoneListing::mark_sold`].

use chrono::Utc;

use crate::error::MarketError;
use crate::utils::{self, TimeStamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum ListingState {
    #[n(0)]
    Available,
    #[n(1)]
    Sold,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PhoneListing {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded
    #[n(1)]
    pub phone_name: String,
    #[n(2)]
    pub phone_brand: String, // Brand id
    #[n(3)]
    pub seller_email: String,
    #[n(4)]
    pub condition: String,
    #[n(5)]
    pub years_of_use: u32,
    #[n(6)]
    pub original_price: u64, // integer major units
    #[n(7)]
    pub reselling_price: u64,
    #[n(8)]
    pub posted_at: TimeStamp<Utc>,
    #[n(9)]
    state: ListingState,
    #[n(10)]
    is_advertised: bool,
}

impl PhoneListing {
    pub fn state(&self) -> ListingState {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state == ListingState::Available
    }

    pub fn is_advertised(&self) -> bool {
        self.is_advertised
    }

    /// One-way promotion flag. Reapplying is a no-op, never a failure.
    pub fn advertise(&mut self) {
        self.is_advertised = true;
    }

    /// Available -> Sold. There is no way back.
    pub fn mark_sold(&mut self) {
        self.state = ListingState::Sold;
    }
}

// What sellers submit. The stored record only exists once
// validate_and_finalise has checked the required fields and assigned an id.
#[derive(Debug, Default)]
pub struct ListingDraft {
    phone_name: Option<String>,
    phone_brand: Option<String>,
    seller_email: Option<String>,
    condition: Option<String>,
    years_of_use: u32,
    original_price: u64,
    reselling_price: u64,
}

impl ListingDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_phone_name(mut self, name: &str) -> Self {
        self.phone_name = Some(name.to_owned());
        self
    }
    pub fn set_phone_brand(mut self, brand_id: &str) -> Self {
        self.phone_brand = Some(brand_id.to_owned());
        self
    }
    pub fn set_seller_email(mut self, email: &str) -> Self {
        self.seller_email = Some(email.to_owned());
        self
    }
    pub fn set_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_owned());
        self
    }
    pub fn set_years_of_use(mut self, years: u32) -> Self {
        self.years_of_use = years;
        self
    }
    pub fn set_original_price(mut self, price: u64) -> Self {
        self.original_price = price;
        self
    }
    pub fn set_reselling_price(mut self, price: u64) -> Self {
        self.reselling_price = price;
        self
    }

    /// The owner field as submitted, for the owner-matches guard.
    pub fn seller_email(&self) -> Option<&str> {
        self.seller_email.as_deref()
    }

    // Checks fields, then mints the stored record in its initial state.
    pub fn validate_and_finalise(&self) -> Result<PhoneListing, MarketError> {
        let phone_name = self
            .phone_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| MarketError::Validation("phoneName is required".into()))?;
        let phone_brand = self
            .phone_brand
            .as_deref()
            .filter(|brand| !brand.trim().is_empty())
            .ok_or_else(|| MarketError::Validation("phoneBrand is required".into()))?;
        let seller_email = self
            .seller_email
            .as_deref()
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| MarketError::Validation("sellerEmail is required".into()))?;
        if self.reselling_price == 0 {
            return Err(MarketError::Validation(
                "resellingPrice must be greater than zero".into(),
            ));
        }

        let id = utils::new_uuid_to_bech32("phone_").map_err(MarketError::Upstream)?;

        Ok(PhoneListing {
            id,
            phone_name: phone_name.to_owned(),
            phone_brand: phone_brand.to_owned(),
            seller_email: seller_email.to_owned(),
            condition: self.condition.clone().unwrap_or_default(),
            years_of_use: self.years_of_use,
            original_price: self.original_price,
            reselling_price: self.reselling_price,
            posted_at: TimeStamp::new(),
            state: ListingState::Available,
            is_advertised: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ListingDraft {
        ListingDraft::new()
            .set_phone_name("Pixel 6")
            .set_phone_brand("brand_google")
            .set_seller_email("seller@x.com")
            .set_condition("good")
            .set_years_of_use(1)
            .set_original_price(600)
            .set_reselling_price(250)
    }

    #[test]
    fn new_listings_start_available_and_unadvertised() {
        let listing = draft().validate_and_finalise().unwrap();

        assert!(listing.id.starts_with("phone_"));
        assert_eq!(listing.state(), ListingState::Available);
        assert!(!listing.is_advertised());
    }

    #[test]
    fn advertise_is_one_way() {
        let mut listing = draft().validate_and_finalise().unwrap();

        listing.advertise();
        listing.advertise();

        assert!(listing.is_advertised());
    }

    #[test]
    fn mark_sold_is_terminal() {
        let mut listing = draft().validate_and_finalise().unwrap();

        listing.mark_sold();

        assert!(!listing.is_available());
        assert_eq!(listing.state(), ListingState::Sold);
    }

    #[test]
    fn draft_requires_a_brand() {
        let draft = ListingDraft::new()
            .set_phone_name("Pixel 6")
            .set_seller_email("seller@x.com")
            .set_reselling_price(250);

        assert!(draft.validate_and_finalise().is_err());
    }

    #[test]
    fn draft_rejects_a_zero_price() {
        let draft = draft().set_reselling_price(0);

        assert!(draft.validate_and_finalise().is_err());
    }
}

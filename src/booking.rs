//! Bookings and duplicate detection

use chrono::Utc;

use crate::error::MarketError;
use crate::utils::{self, TimeStamp};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PaymentInfo {
    #[n(0)]
    pub transaction_id: String,
    #[n(1)]
    pub amount_minor: u64,
    #[n(2)]
    pub paid_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Booking {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded
    #[n(1)]
    pub booker_email: String,
    #[n(2)]
    pub phone_id: String,
    #[n(3)]
    pub phone_name: String,
    #[n(4)]
    pub price: u64, // major units, agreed at booking time
    #[n(5)]
    pub meeting_location: String,
    #[n(6)]
    pub booker_contact: String,
    #[n(7)]
    pub booked_at: TimeStamp<Utc>,
    #[n(8)]
    pub payment: Option<PaymentInfo>,
}

// The dedup key is the hash of the identifying fields encoded into cbor.
// Contact and meeting location are retyped on every attempt so they stay
// out of the key; id, timestamp and payment are assigned after the check.
#[derive(minicbor::Encode)]
struct DedupKey<'a> {
    #[n(0)]
    booker_email: &'a str,
    #[n(1)]
    phone_id: &'a str,
    #[n(2)]
    phone_name: &'a str,
    #[n(3)]
    price: u64,
}

impl Booking {
    /// Key under which duplicate attempts by the same buyer for the same
    /// item and terms collide.
    pub fn dedup_key(&self) -> anyhow::Result<String> {
        let key = DedupKey {
            booker_email: &self.booker_email,
            phone_id: &self.phone_id,
            phone_name: &self.phone_name,
            price: self.price,
        };

        let cbor = minicbor::to_vec(&key)?;
        Ok(sha256::digest(&cbor))
    }
}

/// What `create_booking` hands back. A duplicate is a normal response,
/// not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    /// Stored a fresh booking.
    Created(Booking),
    /// Same buyer, same item, same terms already on file; nothing was
    /// inserted.
    AlreadyBooked { existing_id: String },
}

impl BookingOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::AlreadyBooked { .. })
    }
}

#[derive(Debug, Default)]
pub struct BookingDraft {
    booker_email: Option<String>,
    phone_id: Option<String>,
    phone_name: Option<String>,
    price: u64,
    meeting_location: Option<String>,
    booker_contact: Option<String>,
}

impl BookingDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_booker_email(mut self, email: &str) -> Self {
        self.booker_email = Some(email.to_owned());
        self
    }
    pub fn set_phone_id(mut self, phone_id: &str) -> Self {
        self.phone_id = Some(phone_id.to_owned());
        self
    }
    pub fn set_phone_name(mut self, name: &str) -> Self {
        self.phone_name = Some(name.to_owned());
        self
    }
    pub fn set_price(mut self, price: u64) -> Self {
        self.price = price;
        self
    }
    pub fn set_meeting_location(mut self, location: &str) -> Self {
        self.meeting_location = Some(location.to_owned());
        self
    }
    pub fn set_booker_contact(mut self, contact: &str) -> Self {
        self.booker_contact = Some(contact.to_owned());
        self
    }

    /// The owner field as submitted, for the owner-matches guard.
    pub fn booker_email(&self) -> Option<&str> {
        self.booker_email.as_deref()
    }

    // Checks fields, then mints the record. Payment is never set here;
    // it arrives later through attach_payment.
    pub fn validate_and_finalise(&self) -> Result<Booking, MarketError> {
        let booker_email = self
            .booker_email
            .as_deref()
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| MarketError::Validation("bookerEmail is required".into()))?;
        let phone_id = self
            .phone_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| MarketError::Validation("phoneId is required".into()))?;
        let phone_name = self
            .phone_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| MarketError::Validation("phoneName is required".into()))?;
        let meeting_location = self
            .meeting_location
            .as_deref()
            .filter(|location| !location.trim().is_empty())
            .ok_or_else(|| MarketError::Validation("meetingLocation is required".into()))?;
        let booker_contact = self
            .booker_contact
            .as_deref()
            .filter(|contact| !contact.trim().is_empty())
            .ok_or_else(|| MarketError::Validation("bookerContact is required".into()))?;
        if self.price == 0 {
            return Err(MarketError::Validation(
                "price must be greater than zero".into(),
            ));
        }

        let id = utils::new_uuid_to_bech32("booking_").map_err(MarketError::Upstream)?;

        Ok(Booking {
            id,
            booker_email: booker_email.to_owned(),
            phone_id: phone_id.to_owned(),
            phone_name: phone_name.to_owned(),
            price: self.price,
            meeting_location: meeting_location.to_owned(),
            booker_contact: booker_contact.to_owned(),
            booked_at: TimeStamp::new(),
            payment: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(location: &str, contact: &str) -> BookingDraft {
        BookingDraft::new()
            .set_booker_email("buyer@x.com")
            .set_phone_id("phone_abc")
            .set_phone_name("iPhone 11")
            .set_price(300)
            .set_meeting_location(location)
            .set_booker_contact(contact)
    }

    #[test]
    fn dedup_key_ignores_contact_and_location() {
        let first = draft("mall", "555-1").validate_and_finalise().unwrap();
        let second = draft("park", "555-2").validate_and_finalise().unwrap();

        assert_eq!(
            first.dedup_key().unwrap(),
            second.dedup_key().unwrap(),
            "varying contact details must not defeat duplicate detection"
        );
    }

    #[test]
    fn dedup_key_tracks_the_item() {
        let first = draft("mall", "555-1").validate_and_finalise().unwrap();
        let second = draft("mall", "555-1")
            .set_phone_id("phone_def")
            .validate_and_finalise()
            .unwrap();

        assert_ne!(first.dedup_key().unwrap(), second.dedup_key().unwrap());
    }

    #[test]
    fn drafts_never_carry_payment() {
        let booking = draft("mall", "555-1").validate_and_finalise().unwrap();

        assert!(booking.payment.is_none());
    }
}

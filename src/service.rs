//! Service layer API for marketplace operations
//!
//! Every sensitive operation follows the same order: verify the bearer
//! token, enforce the operation's guard chain, then touch the store.
//! All state lives in sled; nothing is held in memory across requests.

use std::sync::Arc;

use crate::booking::{Booking, BookingDraft, BookingOutcome, PaymentInfo};
use crate::brand::Brand;
use crate::config::Config;
use crate::error::MarketError;
use crate::guard::{self, Guard, GuardContext, IssuePolicy};
use crate::listing::{ListingDraft, PhoneListing};
use crate::payment::{Currency, PaymentIntent, PaymentProvider};
use crate::token::TokenService;
use crate::user::{AccountType, User};
use crate::utils;

pub struct MarketService {
    users: sled::Tree,
    brands: sled::Tree,
    listings: sled::Tree,
    bookings: sled::Tree,
    booking_dedup: sled::Tree, // dedup key -> booking id
    tokens: TokenService,
    payments: Arc<dyn PaymentProvider>,
}

impl MarketService {
    pub fn new(
        db: Arc<sled::Db>,
        tokens: TokenService,
        payments: Arc<dyn PaymentProvider>,
    ) -> Result<Self, MarketError> {
        Ok(Self {
            users: db.open_tree("users")?,
            brands: db.open_tree("brands")?,
            listings: db.open_tree("listings")?,
            bookings: db.open_tree("bookings")?,
            booking_dedup: db.open_tree("booking_dedup")?,
            tokens,
            payments,
        })
    }

    /// Open the sled database named by `config` and build the service on
    /// top of it.
    pub fn open(config: &Config, payments: Arc<dyn PaymentProvider>) -> Result<Self, MarketError> {
        let db = sled::open(&config.db_path)?;
        Self::new(
            Arc::new(db),
            TokenService::new(config.token_secret.as_bytes()),
            payments,
        )
    }

    fn guard_ctx(&self) -> GuardContext<'_> {
        GuardContext { users: &self.users }
    }

    // --- identity -------------------------------------------------------

    /// Mint a bearer token for `email`. `RequireRegistered` is the normal
    /// path; `AllowUnregistered` exists only for the first-registration
    /// flow, which creates the account and mints a token in one round
    /// trip.
    pub fn issue_token(&self, email: &str, policy: IssuePolicy) -> Result<String, MarketError> {
        if policy == IssuePolicy::RequireRegistered && self.users.get(email.as_bytes())?.is_none() {
            return Err(MarketError::NotFound("user"));
        }

        let token = self.tokens.issue(email)?;
        log::debug!("issued token for {email}");
        Ok(token)
    }

    // --- users ----------------------------------------------------------

    /// Registration is idempotent: a repeat call returns the stored
    /// account untouched.
    pub fn create_user(
        &self,
        email: &str,
        name: &str,
        account_type: AccountType,
    ) -> Result<User, MarketError> {
        if let Some(bytes) = self.users.get(email.as_bytes())? {
            return utils::from_cbor(&bytes).map_err(MarketError::Upstream);
        }

        let user = User::new(email, name, account_type)?;
        self.users.insert(
            user.email.as_bytes(),
            utils::to_cbor(&user).map_err(MarketError::Upstream)?,
        )?;
        log::info!("registered {:?} account {}", user.account_type, user.id);
        Ok(user)
    }

    pub fn get_user(&self, email: &str) -> Result<User, MarketError> {
        match self.users.get(email.as_bytes())? {
            Some(bytes) => utils::from_cbor(&bytes).map_err(MarketError::Upstream),
            None => Err(MarketError::NotFound("user")),
        }
    }

    pub fn list_users(&self, account_type: AccountType) -> Result<Vec<User>, MarketError> {
        let mut users = Vec::new();
        for entry in self.users.iter() {
            let (_, bytes) = entry?;
            let user: User = utils::from_cbor(&bytes).map_err(MarketError::Upstream)?;
            if user.account_type == account_type {
                users.push(user);
            }
        }
        Ok(users)
    }

    /// Admin action: mark a seller account as verified.
    pub fn verify_seller(&self, token: &str, user_id: &str) -> Result<User, MarketError> {
        let claims = self.tokens.verify(token)?;
        guard::enforce(&[Guard::AdminRole], &claims, &self.guard_ctx())?;

        let mut user = self
            .find_user_by_id(user_id)?
            .ok_or(MarketError::NotFound("user"))?;
        user.is_verified = true;
        self.users.insert(
            user.email.as_bytes(),
            utils::to_cbor(&user).map_err(MarketError::Upstream)?,
        )?;
        log::info!("{} verified seller {}", claims.email, user.id);
        Ok(user)
    }

    /// Admin action: hard-delete an account.
    pub fn delete_user(&self, token: &str, user_id: &str) -> Result<(), MarketError> {
        let claims = self.tokens.verify(token)?;
        guard::enforce(&[Guard::AdminRole], &claims, &self.guard_ctx())?;

        let user = self
            .find_user_by_id(user_id)?
            .ok_or(MarketError::NotFound("user"))?;
        self.users.remove(user.email.as_bytes())?;
        log::warn!("{} deleted account {}", claims.email, user.id);
        Ok(())
    }

    // accounts are keyed by email; admin actions address them by id
    fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, MarketError> {
        for entry in self.users.iter() {
            let (_, bytes) = entry?;
            let user: User = utils::from_cbor(&bytes).map_err(MarketError::Upstream)?;
            if user.id == user_id {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }

    // --- brands ---------------------------------------------------------

    pub fn create_brand(&self, name: &str) -> Result<Brand, MarketError> {
        let brand = Brand::new(name)?;
        self.brands.insert(
            brand.id.as_bytes(),
            utils::to_cbor(&brand).map_err(MarketError::Upstream)?,
        )?;
        Ok(brand)
    }

    pub fn list_brands(&self) -> Result<Vec<Brand>, MarketError> {
        let mut brands = Vec::new();
        for entry in self.brands.iter() {
            let (_, bytes) = entry?;
            brands.push(utils::from_cbor(&bytes).map_err(MarketError::Upstream)?);
        }
        Ok(brands)
    }

    // --- listings -------------------------------------------------------

    pub fn create_listing(
        &self,
        token: &str,
        draft: ListingDraft,
    ) -> Result<PhoneListing, MarketError> {
        let claims = self.tokens.verify(token)?;
        let claimed_owner = draft
            .seller_email()
            .ok_or_else(|| MarketError::Validation("sellerEmail is required".into()))?;
        let chain = [
            Guard::SellerRole,
            Guard::OwnerMatches {
                claimed_owner: claimed_owner.to_owned(),
            },
        ];
        guard::enforce(&chain, &claims, &self.guard_ctx())?;

        let listing = draft.validate_and_finalise()?;
        self.listings.insert(
            listing.id.as_bytes(),
            utils::to_cbor(&listing).map_err(MarketError::Upstream)?,
        )?;
        log::info!("{} listed {} ({})", claims.email, listing.id, listing.phone_name);
        Ok(listing)
    }

    /// Buyers only ever see available stock.
    pub fn list_listings_by_brand(&self, brand_id: &str) -> Result<Vec<PhoneListing>, MarketError> {
        let mut listings = Vec::new();
        for entry in self.listings.iter() {
            let (_, bytes) = entry?;
            let listing: PhoneListing = utils::from_cbor(&bytes).map_err(MarketError::Upstream)?;
            if listing.is_available() && listing.phone_brand == brand_id {
                listings.push(listing);
            }
        }
        Ok(listings)
    }

    pub fn list_advertised_listings(&self) -> Result<Vec<PhoneListing>, MarketError> {
        let mut listings = Vec::new();
        for entry in self.listings.iter() {
            let (_, bytes) = entry?;
            let listing: PhoneListing = utils::from_cbor(&bytes).map_err(MarketError::Upstream)?;
            // advertised but already sold stays out of the shop window
            if listing.is_advertised() && listing.is_available() {
                listings.push(listing);
            }
        }
        Ok(listings)
    }

    /// The seller's own inventory view; sold items stay visible here.
    pub fn list_own_listings(
        &self,
        token: &str,
        seller_email: &str,
    ) -> Result<Vec<PhoneListing>, MarketError> {
        let claims = self.tokens.verify(token)?;
        let chain = [
            Guard::SellerRole,
            Guard::OwnerMatches {
                claimed_owner: seller_email.to_owned(),
            },
        ];
        guard::enforce(&chain, &claims, &self.guard_ctx())?;

        let mut listings = Vec::new();
        for entry in self.listings.iter() {
            let (_, bytes) = entry?;
            let listing: PhoneListing = utils::from_cbor(&bytes).map_err(MarketError::Upstream)?;
            if listing.seller_email == seller_email {
                listings.push(listing);
            }
        }
        Ok(listings)
    }

    /// Hard remove, not a state transition. Irreversible.
    pub fn delete_listing(&self, token: &str, listing_id: &str) -> Result<(), MarketError> {
        let claims = self.tokens.verify(token)?;
        guard::enforce(&[Guard::SellerRole], &claims, &self.guard_ctx())?;

        let listing = self
            .load_listing(listing_id)?
            .ok_or(MarketError::NotFound("listing"))?;
        if listing.seller_email != claims.email {
            return Err(MarketError::Forbidden(
                "only the owning seller may delete a listing".into(),
            ));
        }

        self.listings.remove(listing_id.as_bytes())?;
        log::info!("{} deleted listing {}", claims.email, listing_id);
        Ok(())
    }

    /// Set the one-way advertised flag. Safe to reapply.
    pub fn advertise_listing(
        &self,
        token: &str,
        listing_id: &str,
    ) -> Result<PhoneListing, MarketError> {
        let claims = self.tokens.verify(token)?;
        guard::enforce(&[Guard::SellerRole], &claims, &self.guard_ctx())?;

        let listing = self
            .load_listing(listing_id)?
            .ok_or(MarketError::NotFound("listing"))?;
        if listing.seller_email != claims.email {
            return Err(MarketError::Forbidden(
                "only the owning seller may advertise a listing".into(),
            ));
        }

        self.update_listing(listing_id, |listing| listing.advertise())
    }

    /// Available -> Sold. Driven by the booking/payment flow rather than
    /// a seller action, so the only gate is a verified identity.
    pub fn mark_listing_sold(
        &self,
        token: &str,
        listing_id: &str,
    ) -> Result<PhoneListing, MarketError> {
        let claims = self.tokens.verify(token)?;

        let listing = self.update_listing(listing_id, |listing| listing.mark_sold())?;
        log::info!("listing {} marked sold (by {})", listing_id, claims.email);
        Ok(listing)
    }

    fn load_listing(&self, listing_id: &str) -> Result<Option<PhoneListing>, MarketError> {
        match self.listings.get(listing_id.as_bytes())? {
            Some(bytes) => Ok(Some(
                utils::from_cbor(&bytes).map_err(MarketError::Upstream)?,
            )),
            None => Ok(None),
        }
    }

    // Single atomic read-modify-write. Transitions are monotonic, so
    // concurrent applications converge on the same record.
    fn update_listing(
        &self,
        listing_id: &str,
        apply: impl Fn(&mut PhoneListing),
    ) -> Result<PhoneListing, MarketError> {
        let updated = self
            .listings
            .update_and_fetch(listing_id.as_bytes(), |old| {
                let bytes = old?;
                match utils::from_cbor::<PhoneListing>(bytes) {
                    Ok(mut listing) => {
                        apply(&mut listing);
                        utils::to_cbor(&listing).ok().or_else(|| Some(bytes.to_vec()))
                    }
                    // leave unreadable rows untouched
                    Err(_) => Some(bytes.to_vec()),
                }
            })?;

        match updated {
            Some(bytes) => utils::from_cbor(&bytes).map_err(MarketError::Upstream),
            None => Err(MarketError::NotFound("listing")),
        }
    }

    // --- bookings -------------------------------------------------------

    /// Create a booking for the verified buyer. At most one booking may
    /// exist per (buyer, item, terms); a repeat attempt is answered with
    /// the stored booking's id instead of a second insert.
    pub fn create_booking(
        &self,
        token: &str,
        draft: BookingDraft,
    ) -> Result<BookingOutcome, MarketError> {
        let claims = self.tokens.verify(token)?;
        let claimed_owner = draft
            .booker_email()
            .ok_or_else(|| MarketError::Validation("bookerEmail is required".into()))?;
        let chain = [Guard::OwnerMatches {
            claimed_owner: claimed_owner.to_owned(),
        }];
        guard::enforce(&chain, &claims, &self.guard_ctx())?;

        let booking = draft.validate_and_finalise()?;

        let listing = self
            .load_listing(&booking.phone_id)?
            .ok_or(MarketError::NotFound("listing"))?;
        if !listing.is_available() {
            return Err(MarketError::Validation(
                "listing is no longer available".into(),
            ));
        }

        // compare_and_swap makes check-then-insert atomic: the first
        // writer claims the dedup key, every later identical request
        // observes the winner's id.
        let key = booking.dedup_key().map_err(MarketError::Upstream)?;
        let claimed = self.booking_dedup.compare_and_swap(
            key.as_bytes(),
            None as Option<&[u8]>,
            Some(booking.id.as_bytes()),
        )?;
        if let Err(existing) = claimed {
            let existing_id = existing
                .current
                .as_deref()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            log::debug!(
                "duplicate booking attempt by {} for {}",
                claims.email,
                booking.phone_id
            );
            return Ok(BookingOutcome::AlreadyBooked { existing_id });
        }

        self.bookings.insert(
            booking.id.as_bytes(),
            utils::to_cbor(&booking).map_err(MarketError::Upstream)?,
        )?;
        log::info!("{} booked {} as {}", claims.email, booking.phone_id, booking.id);
        Ok(BookingOutcome::Created(booking))
    }

    pub fn list_bookings(
        &self,
        token: &str,
        buyer_email: &str,
    ) -> Result<Vec<Booking>, MarketError> {
        let claims = self.tokens.verify(token)?;
        let chain = [Guard::OwnerMatches {
            claimed_owner: buyer_email.to_owned(),
        }];
        guard::enforce(&chain, &claims, &self.guard_ctx())?;

        let mut bookings = Vec::new();
        for entry in self.bookings.iter() {
            let (_, bytes) = entry?;
            let booking: Booking = utils::from_cbor(&bytes).map_err(MarketError::Upstream)?;
            if booking.booker_email == buyer_email {
                bookings.push(booking);
            }
        }
        Ok(bookings)
    }

    pub fn get_booking(&self, token: &str, booking_id: &str) -> Result<Booking, MarketError> {
        self.tokens.verify(token)?;

        match self.bookings.get(booking_id.as_bytes())? {
            Some(bytes) => utils::from_cbor(&bytes).map_err(MarketError::Upstream),
            None => Err(MarketError::NotFound("booking")),
        }
    }

    /// Upsert payment details onto a booking. Reapplying overwrites with
    /// the latest info; the dedup check is not revisited.
    pub fn attach_payment(
        &self,
        token: &str,
        booking_id: &str,
        payment: PaymentInfo,
    ) -> Result<Booking, MarketError> {
        let claims = self.tokens.verify(token)?;

        let updated = self
            .bookings
            .update_and_fetch(booking_id.as_bytes(), |old| {
                let bytes = old?;
                match utils::from_cbor::<Booking>(bytes) {
                    Ok(mut booking) => {
                        booking.payment = Some(payment.clone());
                        utils::to_cbor(&booking).ok().or_else(|| Some(bytes.to_vec()))
                    }
                    Err(_) => Some(bytes.to_vec()),
                }
            })?;

        match updated {
            Some(bytes) => {
                log::info!("{} attached payment to booking {}", claims.email, booking_id);
                utils::from_cbor(&bytes).map_err(MarketError::Upstream)
            }
            None => Err(MarketError::NotFound("booking")),
        }
    }

    // --- payments -------------------------------------------------------

    /// Store prices are integer major units; the gateway wants minor
    /// units.
    pub fn create_payment_intent(
        &self,
        price: u64,
        currency: Currency,
    ) -> Result<PaymentIntent, MarketError> {
        let amount_minor = price
            .checked_mul(100)
            .ok_or_else(|| MarketError::Validation("price out of range".into()))?;
        self.payments
            .create_payment_intent(amount_minor, currency)
            .map_err(MarketError::Upstream)
    }
}

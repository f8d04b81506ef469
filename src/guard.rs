//! Request authorization guards
//!
//! Every sensitive operation names an ordered guard chain; evaluation
//! runs left-to-right and the first denial short-circuits before any
//! mutation happens. Role and ownership guards take the acting identity
//! from the verified token claims, never from client-supplied fields.

use crate::error::MarketError;
use crate::token::Claims;
use crate::user::{AccountType, User};
use crate::utils;

/// Registration policy for the token-issuance bootstrap. This is the
/// only check in the system that runs before a token exists, so it is
/// its own type rather than a bypass flag on [`Guard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuePolicy {
    /// The email must belong to a stored account.
    RequireRegistered,
    /// First-registration flow: mint without a lookup.
    AllowUnregistered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// The acting account must hold the seller role.
    SellerRole,
    /// The acting account must hold the admin role.
    AdminRole,
    /// A client-supplied owner field must equal the verified identity.
    OwnerMatches { claimed_owner: String },
}

/// Store access the guards need. Role guards re-fetch the account on
/// every evaluation; nothing is cached across requests.
pub struct GuardContext<'a> {
    pub users: &'a sled::Tree,
}

impl GuardContext<'_> {
    pub fn load_user(&self, email: &str) -> Result<Option<User>, MarketError> {
        match self.users.get(email.as_bytes())? {
            Some(bytes) => Ok(Some(
                utils::from_cbor(&bytes).map_err(MarketError::Upstream)?,
            )),
            None => Ok(None),
        }
    }

    fn require_role(
        &self,
        email: &str,
        role: AccountType,
        denial: &str,
    ) -> Result<(), MarketError> {
        let user = self
            .load_user(email)?
            .ok_or(MarketError::NotFound("user"))?;
        if user.account_type != role {
            return Err(MarketError::Forbidden(denial.to_owned()));
        }
        Ok(())
    }
}

impl Guard {
    pub fn check(&self, claims: &Claims, ctx: &GuardContext) -> Result<(), MarketError> {
        match self {
            Guard::SellerRole => {
                ctx.require_role(&claims.email, AccountType::Seller, "seller account required")
            }
            Guard::AdminRole => {
                ctx.require_role(&claims.email, AccountType::Admin, "admin account required")
            }
            Guard::OwnerMatches { claimed_owner } => {
                if claimed_owner != &claims.email {
                    return Err(MarketError::Forbidden(
                        "owner field does not match the authenticated user".to_owned(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Evaluate `chain` left-to-right; the first denial wins.
pub fn enforce(chain: &[Guard], claims: &Claims, ctx: &GuardContext) -> Result<(), MarketError> {
    for guard in chain {
        guard.check(claims, ctx)?;
    }
    Ok(())
}

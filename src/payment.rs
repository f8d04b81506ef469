//! Payment intent creation seam

use uuid7::uuid7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    USD,
    GBP,
    EUR,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::GBP => "gbp",
            Self::EUR => "eur",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub client_secret: String,
    pub amount_minor: u64,
    pub currency: Currency,
}

/// External gateway contract: one call, minor units in, client secret
/// out. Failures are the caller's upstream error.
pub trait PaymentProvider: Send + Sync {
    fn create_payment_intent(
        &self,
        amount_minor: u64,
        currency: Currency,
    ) -> anyhow::Result<PaymentIntent>;
}

/// Gateway stand-in that mints locally-derived client secrets, for tests
/// and deployments with payment collection disabled.
pub struct OfflinePaymentProvider;

impl PaymentProvider for OfflinePaymentProvider {
    fn create_payment_intent(
        &self,
        amount_minor: u64,
        currency: Currency,
    ) -> anyhow::Result<PaymentIntent> {
        let nonce = uuid7();
        let digest = sha256::digest(&nonce.as_bytes()[..]);

        Ok(PaymentIntent {
            client_secret: format!("pi_{}_secret_{}", &digest[..24], currency.code()),
            amount_minor,
            currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_secrets_are_unique() {
        let provider = OfflinePaymentProvider;

        let first = provider.create_payment_intent(30_000, Currency::USD).unwrap();
        let second = provider.create_payment_intent(30_000, Currency::USD).unwrap();

        assert!(first.client_secret.starts_with("pi_"));
        assert_ne!(first.client_secret, second.client_secret);
        assert_eq!(first.amount_minor, 30_000);
    }
}

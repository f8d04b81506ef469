#[derive(thiserror::Error, Debug)]
pub enum MarketError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("no such {0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("failed to sign identity token")]
    Signing(#[source] anyhow::Error),
    #[error("upstream dependency failure")]
    Upstream(#[source] anyhow::Error),
}

impl From<sled::Error> for MarketError {
    fn from(err: sled::Error) -> Self {
        Self::Upstream(err.into())
    }
}

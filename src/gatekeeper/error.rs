use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatekeeperError {
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("identity error: {0}")]
    Identity(#[from] crate::identity::IdentityError),

    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

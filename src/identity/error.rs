use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("key generation failed: {0}")]
    KeyGen(String),

    #[error("malformed PEM identity: {0}")]
    Pem(String),

    #[error("malformed OpenSSH public key: {0}")]
    PublicKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

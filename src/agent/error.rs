use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("identity error: {0}")]
    Identity(#[from] crate::identity::IdentityError),

    #[error("registration request to {url} failed: {message}")]
    Register { url: String, message: String },

    #[error("control plane returned an error registering {domain}: {message}")]
    RegisterRejected { domain: String, message: String },

    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("{0}")]
    Internal(String),
}

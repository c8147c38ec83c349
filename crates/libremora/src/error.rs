use remora_core::codec::CodecError;
use remora_core::config::ConfigError;
use remora_core::ExecutionFailure;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The command ran and failed on the server.
    #[error(transparent)]
    Remote(ExecutionFailure),
    #[error("command rejected: {0}")]
    Rejected(String),
    #[error("'{class}' has no member '{member}'")]
    UnknownMember { class: String, member: String },
    #[error("unknown class '{0}'")]
    UnknownClass(String),
    #[error("'{0}' object is not iterable")]
    NotIterable(String),
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open local engine: {0}")]
    Local(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

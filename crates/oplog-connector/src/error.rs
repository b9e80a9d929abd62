use thiserror::Error;

use oplog_protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("operation source unavailable: {0}")]
    Source(String),

    #[error("tree rebuilder stopped")]
    RebuilderStopped,
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unknown message kind: {0}")]
    UnknownKind(u8),

    #[error("channel closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

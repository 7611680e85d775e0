use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuestError {
    #[error("mount error: {0}")]
    Mount(#[from] capsule_mount::MountError),

    #[error("failed to configure {iface}: {source}")]
    Network {
        iface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("OCI spec error: {0}")]
    OciSpec(String),

    #[error("control channel error: {0}")]
    Channel(#[from] capsule_channel::ChannelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

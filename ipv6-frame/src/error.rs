/// Errors raised while framing or parsing the `CDTunnel` handshake.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("handshake protocol error: {0}")]
    Protocol(String),

    #[error("handshake exceeded the 30s deadline")]
    HandshakeTimeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for FrameError {
    fn from(e: serde_json::Error) -> Self {
        FrameError::Protocol(e.to_string())
    }
}

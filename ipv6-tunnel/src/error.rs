use std::io;

/// The error taxonomy surfaced to callers of this crate.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("host OS is not supported")]
    PlatformUnsupported,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation on a closed session")]
    AlreadyClosed,

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("handshake exceeded the 30s deadline")]
    HandshakeTimeout,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("required administrative tooling missing: {0}")]
    ToolingMissing(String),

    #[error("I/O error")]
    IoError(#[from] io::Error),

    /// Any failure during `setupInterface`; wraps whichever collaborator
    /// error triggered the teardown.
    #[error("tunnel setup failed: {0}")]
    SetupFailed(String),
}

impl From<tun_device::TunError> for TunnelError {
    fn from(e: tun_device::TunError) -> Self {
        use tun_device::TunError as T;
        match e {
            T::PermissionDenied => TunnelError::PermissionDenied,
            T::DeviceUnavailable(s) => TunnelError::DeviceUnavailable(s),
            T::PlatformUnsupported => TunnelError::PlatformUnsupported,
            T::InvalidArgument(s) => TunnelError::InvalidArgument(s),
            T::AlreadyClosed => TunnelError::AlreadyClosed,
            T::Io(e) => TunnelError::IoError(e),
        }
    }
}

impl From<ipv6_frame::FrameError> for TunnelError {
    fn from(e: ipv6_frame::FrameError) -> Self {
        use ipv6_frame::FrameError as F;
        match e {
            F::Protocol(s) => TunnelError::ProtocolError(s),
            F::HandshakeTimeout => TunnelError::HandshakeTimeout,
            F::Io(e) => TunnelError::IoError(e),
        }
    }
}

impl From<iface_config::ConfigError> for TunnelError {
    fn from(e: iface_config::ConfigError) -> Self {
        use iface_config::ConfigError as C;
        match e {
            C::InvalidArgument(s) => TunnelError::InvalidArgument(s),
            C::PermissionDenied => TunnelError::PermissionDenied,
            C::ToolingMissing(s) => TunnelError::ToolingMissing(s),
            C::ConfigurationFailed(s) => TunnelError::ConfigurationFailed(s),
            C::StatsUnavailable => TunnelError::ConfigurationFailed("statistics unavailable".into()),
            C::Io(e) => TunnelError::IoError(e),
        }
    }
}

use std::io;

/// Errors a [`crate::VirtualInterfaceHandle`] can surface.
///
/// Mirrors the taxonomy every crate in this workspace converts into; see
/// `ipv6_tunnel::TunnelError` for the user-facing union.
#[derive(Debug, thiserror::Error)]
pub enum TunError {
    #[error("permission denied opening virtual interface")]
    PermissionDenied,

    #[error("virtual interface device is unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("this host OS is not supported")]
    PlatformUnsupported,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation attempted on a closed interface handle")]
    AlreadyClosed,

    #[error("virtual interface I/O error")]
    Io(#[from] io::Error),
}

impl TunError {
    pub(crate) fn from_last_os_error() -> Self {
        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::PermissionDenied => TunError::PermissionDenied,
            io::ErrorKind::NotFound => TunError::DeviceUnavailable(err.to_string()),
            _ => TunError::Io(err),
        }
    }
}

//! User-space IPv6 tunnel endpoint: binds the virtual interface driver,
//! interface configurator, and handshake codec into a single
//! [`TunnelSession`] with packet subscription fanout and signal-driven
//! shutdown.

mod error;
mod fanout;
mod session;
mod signals;

pub use error::TunnelError;
pub use fanout::{PacketStream, SubscriptionId};
pub use session::{SessionState, TunnelSession};

pub use iface_config::InterfaceStats;
pub use ipv6_frame::{PacketRecord, Protocol, TunnelParameters};

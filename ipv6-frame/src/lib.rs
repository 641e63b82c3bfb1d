//! Wire-format logic shared by the tunnel core: the `CDTunnel` handshake
//! codec and the IPv6 packet demultiplexer. Pure parsing/framing, no I/O
//! beyond the generic `AsyncRead`/`AsyncWrite` bound on the handshake.

mod demux;
mod error;
mod handshake;
mod packet_record;

pub use demux::Demultiplexer;
pub use error::FrameError;
pub use handshake::{
    encode_frame, read_handshake_response, write_handshake_request, FrameDecoder,
    TunnelParameters, MAGIC, MAX_MTU, MIN_MTU,
};
pub use packet_record::{parse as parse_packet_record, PacketRecord, Protocol};

//! `CDTunnel` handshake frame: `magic[8]="CDTunnel" || length[2] BE u16 ||
//! payload[length]` carrying a single JSON request/response.

use crate::error::FrameError;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAGIC: &[u8; 8] = b"CDTunnel";
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Negotiated tunnel parameters, produced once by the handshake and
/// immutable afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelParameters {
    pub client_address: Ipv6Addr,
    pub mtu: u32,
    pub server_address: Ipv6Addr,
    pub server_rsd_port: Option<u16>,
}

pub const MIN_MTU: u32 = 1280;
pub const MAX_MTU: u32 = 65535;

#[derive(Serialize)]
struct ClientHandshakeRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    mtu: u32,
}

#[derive(Deserialize)]
struct ClientParametersJson {
    address: String,
    mtu: u32,
}

#[derive(Deserialize)]
struct HandshakeResponseJson {
    #[serde(rename = "clientParameters")]
    client_parameters: ClientParametersJson,
    #[serde(rename = "serverAddress")]
    server_address: String,
    #[serde(rename = "serverRSDPort")]
    server_rsd_port: Option<u16>,
}

impl TryFrom<HandshakeResponseJson> for TunnelParameters {
    type Error = FrameError;

    fn try_from(json: HandshakeResponseJson) -> Result<Self, Self::Error> {
        let client_address = Ipv6Addr::from_str(&json.client_parameters.address)
            .map_err(|_| FrameError::Protocol("clientParameters.address is not valid IPv6".into()))?;
        let server_address = Ipv6Addr::from_str(&json.server_address)
            .map_err(|_| FrameError::Protocol("serverAddress is not valid IPv6".into()))?;
        let mtu = json.client_parameters.mtu;
        if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
            return Err(FrameError::Protocol(format!(
                "clientParameters.mtu {mtu} out of range [{MIN_MTU}, {MAX_MTU}]"
            )));
        }

        Ok(TunnelParameters {
            client_address,
            mtu,
            server_address,
            server_rsd_port: json.server_rsd_port,
        })
    }
}

/// Frames an arbitrary JSON payload as a `CDTunnel` wire frame.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, FrameError> {
    if payload.len() > u16::MAX as usize {
        return Err(FrameError::Protocol("payload exceeds 65535 bytes".into()));
    }

    let mut buf = BytesMut::with_capacity(10 + payload.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf.freeze())
}

/// Incrementally decodes `CDTunnel` frames out of a growing byte buffer.
pub struct FrameDecoder {
    buf: BytesMut,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the decoded payload once a full frame has arrived, checking
    /// the magic as soon as 8 bytes are present.
    pub fn try_decode(&mut self) -> Result<Option<Bytes>, FrameError> {
        if self.buf.len() < MAGIC.len() {
            return Ok(None);
        }
        if &self.buf[..MAGIC.len()] != MAGIC {
            return Err(FrameError::Protocol("handshake magic mismatch".into()));
        }
        if self.buf.len() < 10 {
            return Ok(None);
        }

        let length = u16::from_be_bytes([self.buf[8], self.buf[9]]) as usize;
        let total = 10 + length;
        if self.buf.len() < total {
            return Ok(None);
        }

        let mut frame = self.buf.split_to(total);
        Ok(Some(frame.split_off(10).freeze()))
    }
}

/// Writes the client handshake request atomically.
pub async fn write_handshake_request(
    stream: &mut (impl AsyncWrite + Unpin),
    mtu: u32,
) -> Result<(), FrameError> {
    let payload = serde_json::to_vec(&ClientHandshakeRequest {
        kind: "clientHandshakeRequest",
        mtu,
    })?;
    let frame = encode_frame(&payload)?;
    stream.write_all(&frame).await?;
    Ok(())
}

/// Reads and parses the server's handshake response, enforcing the 30s
/// deadline from request send to fully-parsed response.
pub async fn read_handshake_response(
    stream: &mut (impl AsyncRead + Unpin),
) -> Result<TunnelParameters, FrameError> {
    tokio::time::timeout(HANDSHAKE_TIMEOUT, read_handshake_response_inner(stream))
        .await
        .map_err(|_| FrameError::HandshakeTimeout)?
}

async fn read_handshake_response_inner(
    stream: &mut (impl AsyncRead + Unpin),
) -> Result<TunnelParameters, FrameError> {
    let mut decoder = FrameDecoder::new();
    let mut chunk = [0u8; 4096];

    loop {
        if let Some(payload) = decoder.try_decode()? {
            let response: HandshakeResponseJson = serde_json::from_slice(&payload)?;
            return TunnelParameters::try_from(response);
        }

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(FrameError::Protocol(
                "stream closed before handshake response completed".into(),
            ));
        }
        decoder.feed(&chunk[..n]);
    }
}

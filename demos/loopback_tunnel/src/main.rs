//! Demonstrates `TunnelSession` end to end against an in-memory peer.
//!
//! The real remote peer and the cryptographic transport that delivers its
//! byte stream are out-of-scope collaborators for this crate, so this
//! binary plays both roles over a single in-memory duplex pipe: one end
//! runs `TunnelSession::connect`, the other answers the `CDTunnel`
//! handshake and echoes every inbound datagram straight back, so packets
//! written to the virtual interface loop back out of it.
//!
//! Opening a real virtual interface requires elevated privileges, the same
//! requirement the teacher's `gateway`/`headless-client` binaries carry —
//! run this as root (Linux/Darwin) or Administrator (Windows).

use anyhow::Context;
use ipv6_tunnel::TunnelSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const SERVER_ADDRESS: &str = "fd00::1";
const CLIENT_ADDRESS: &str = "fd00::2";
const DUPLEX_BUFFER: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let requested_name = std::env::args().nth(1);

    let (local, peer) = tokio::io::duplex(DUPLEX_BUFFER);
    let peer_task = tokio::spawn(run_peer(peer));

    let session = TunnelSession::connect(local, requested_name.as_deref())
        .await
        .context("failed to establish tunnel session")?;

    tracing::info!(
        interface = session.interface_name(),
        client = %session.client_address(),
        server = %session.server_address(),
        state = ?session.state(),
        "tunnel session established"
    );

    let _subscription = session.subscribe(|record| {
        tracing::info!(
            protocol = ?record.protocol,
            src = %record.src,
            dst = %record.dst,
            source_port = record.source_port,
            dest_port = record.dest_port,
            payload_len = record.payload.len(),
            "observed packet"
        );
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, stopping tunnel");
        }
        result = peer_task => {
            result.context("peer task panicked")??;
            tracing::info!("peer loop ended, stopping tunnel");
        }
    }

    session.stop().await;

    Ok(())
}

/// Plays the remote peer's half of the protocol: answers the `CDTunnel`
/// handshake, then echoes every inbound datagram straight back.
async fn run_peer(mut peer: DuplexStream) -> anyhow::Result<()> {
    let mut magic = [0u8; 8];
    peer.read_exact(&mut magic).await?;
    anyhow::ensure!(&magic == b"CDTunnel", "unexpected handshake magic from client");

    let mut len_buf = [0u8; 2];
    peer.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;

    let mut request = vec![0u8; len];
    peer.read_exact(&mut request).await?;
    let request: serde_json::Value = serde_json::from_slice(&request)?;
    tracing::debug!(?request, "received client handshake request");

    let response = serde_json::json!({
        "clientParameters": {"address": CLIENT_ADDRESS, "mtu": 1500},
        "serverAddress": SERVER_ADDRESS,
    });
    let payload = serde_json::to_vec(&response)?;
    peer.write_all(b"CDTunnel").await?;
    peer.write_all(&(payload.len() as u16).to_be_bytes()).await?;
    peer.write_all(&payload).await?;

    let mut buf = vec![0u8; 65536];
    loop {
        let n = peer.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        peer.write_all(&buf[..n]).await?;
    }
}

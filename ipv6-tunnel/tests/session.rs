//! `TunnelSession`-level properties from spec §8: the successful-handshake
//! scenario, idempotent `stop()`, post-cancellation delivery, and the
//! stream-close-mid-tunnel scenario.
//!
//! These open a real virtual interface, so — like the teacher's own
//! device-owning tests (`bin-shared::tests::tunnel_drop`) — they need
//! `CAP_NET_ADMIN`/Administrator and are `#[ignore]`d by default; run with
//! `cargo test -- --ignored` as root (Linux/Darwin) or Administrator
//! (Windows).

use ipv6_tunnel::{SessionState, TunnelSession};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const DUPLEX_BUFFER: usize = 64 * 1024;

/// Reads the client's `CDTunnel` handshake request and answers it,
/// returning the peer stream so the caller can keep driving it afterward.
async fn answer_handshake(
    mut peer: DuplexStream,
    client_address: &str,
    server_address: &str,
    mtu: u32,
) -> DuplexStream {
    let mut magic = [0u8; 8];
    peer.read_exact(&mut magic).await.unwrap();
    assert_eq!(&magic, b"CDTunnel");

    let mut len_buf = [0u8; 2];
    peer.read_exact(&mut len_buf).await.unwrap();
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut request = vec![0u8; len];
    peer.read_exact(&mut request).await.unwrap();

    let response = serde_json::json!({
        "clientParameters": {"address": client_address, "mtu": mtu},
        "serverAddress": server_address,
    });
    let payload = serde_json::to_vec(&response).unwrap();
    peer.write_all(b"CDTunnel").await.unwrap();
    peer.write_all(&(payload.len() as u16).to_be_bytes()).await.unwrap();
    peer.write_all(&payload).await.unwrap();

    peer
}

fn udp_datagram(source_port: u16, dest_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut d = vec![0u8; 40 + 8 + payload.len()];
    d[0] = 0x60;
    d[4..6].copy_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    d[6] = 17; // UDP
    d[7] = 64;
    d[8..24].copy_from_slice(&[0xfd, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
    d[24..40].copy_from_slice(&[0xfd, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
    d[40..42].copy_from_slice(&source_port.to_be_bytes());
    d[42..44].copy_from_slice(&dest_port.to_be_bytes());
    d[44..46].copy_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    d[48..].copy_from_slice(payload);
    d
}

#[tokio::test]
#[ignore = "needs root/Administrator to open a virtual interface"]
async fn successful_handshake_configures_session_per_scenario_1() {
    let (local, peer) = tokio::io::duplex(DUPLEX_BUFFER);
    let peer_task = tokio::spawn(answer_handshake(peer, "fd00::2", "fd00::1", 1500));

    let session = TunnelSession::connect(local, None).await.unwrap();

    assert_eq!(session.client_address().to_string(), "fd00::2");
    assert_eq!(session.server_address().to_string(), "fd00::1");
    assert_eq!(session.state(), SessionState::Forwarding);

    session.stop().await;
    let _ = peer_task.await;
}

#[tokio::test]
#[ignore = "needs root/Administrator to open a virtual interface"]
async fn stop_is_idempotent() {
    let (local, peer) = tokio::io::duplex(DUPLEX_BUFFER);
    tokio::spawn(answer_handshake(peer, "fd00::2", "fd00::1", 1500));

    let session = TunnelSession::connect(local, None).await.unwrap();

    session.stop().await;
    session.stop().await;
    session.stop().await;

    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
#[ignore = "needs root/Administrator to open a virtual interface"]
async fn no_packets_delivered_after_stop() {
    let (local, peer) = tokio::io::duplex(DUPLEX_BUFFER);
    let peer_task = tokio::spawn(answer_handshake(peer, "fd00::2", "fd00::1", 1500));

    let session = TunnelSession::connect(local, None).await.unwrap();
    let mut peer = peer_task.await.unwrap();

    let delivered = Arc::new(AtomicUsize::new(0));
    let delivered_clone = delivered.clone();
    session.subscribe(move |_| {
        delivered_clone.fetch_add(1, Ordering::SeqCst);
    });

    session.stop().await;

    // By the time `stop()` returns, the ingress loop has already exited, so
    // bytes written here must never reach a subscriber.
    let _ = peer.write_all(&udp_datagram(1234, 5678, &[])).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[ignore = "needs root/Administrator to open a virtual interface"]
async fn stream_close_mid_tunnel_transitions_to_stopped_per_scenario_5() {
    let (local, peer) = tokio::io::duplex(DUPLEX_BUFFER);
    let peer_task = tokio::spawn(answer_handshake(peer, "fd00::2", "fd00::1", 1500));

    let session = TunnelSession::connect(local, None).await.unwrap();
    assert_eq!(session.state(), SessionState::Forwarding);

    let mut peer = peer_task.await.unwrap();
    peer.write_all(&udp_datagram(1, 2, b"hi")).await.unwrap();
    drop(peer); // peer closes the stream

    let deadline = Duration::from_millis(200);
    let start = Instant::now();
    loop {
        if session.state() == SessionState::Stopped {
            break;
        }
        assert!(
            start.elapsed() < deadline,
            "session did not stop within 200ms of the stream closing"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

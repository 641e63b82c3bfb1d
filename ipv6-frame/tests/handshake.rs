use ipv6_frame::{read_handshake_response, write_handshake_request, FrameError};
use tokio::io::duplex;

#[tokio::test]
async fn successful_handshake_scenario() {
    let (mut client, mut server) = duplex(4096);

    let server_task = tokio::spawn(async move {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut magic = [0u8; 8];
        server.read_exact(&mut magic).await.unwrap();
        assert_eq!(&magic, b"CDTunnel");

        let mut len_buf = [0u8; 2];
        server.read_exact(&mut len_buf).await.unwrap();
        let len = u16::from_be_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        server.read_exact(&mut payload).await.unwrap();
        let request: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(request["type"], "clientHandshakeRequest");

        let response = serde_json::json!({
            "clientParameters": {"address": "fd00::2", "mtu": 1500},
            "serverAddress": "fd00::1",
        });
        let response_bytes = serde_json::to_vec(&response).unwrap();
        server.write_all(b"CDTunnel").await.unwrap();
        server
            .write_all(&(response_bytes.len() as u16).to_be_bytes())
            .await
            .unwrap();
        server.write_all(&response_bytes).await.unwrap();
    });

    write_handshake_request(&mut client, 1500).await.unwrap();
    let params = read_handshake_response(&mut client).await.unwrap();

    assert_eq!(params.client_address.to_string(), "fd00::2");
    assert_eq!(params.mtu, 1500);
    assert_eq!(params.server_address.to_string(), "fd00::1");
    assert_eq!(params.server_rsd_port, None);

    server_task.await.unwrap();
}

#[tokio::test]
async fn bad_magic_fails_with_protocol_error() {
    let (mut client, mut server) = duplex(4096);

    tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        server.write_all(b"NOTAMAGIC!").await.unwrap();
    });

    let err = read_handshake_response(&mut client).await.unwrap_err();
    assert!(matches!(err, FrameError::Protocol(_)));
}

#[tokio::test]
async fn stream_closing_early_fails_with_protocol_error() {
    let (mut client, server) = duplex(4096);
    drop(server);

    let err = read_handshake_response(&mut client).await.unwrap_err();
    assert!(matches!(err, FrameError::Protocol(_)));
}

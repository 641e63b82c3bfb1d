//! Windows WinTun backend: dynamically loaded `wintun.dll`, a 4 MiB ring
//! session, and a background thread marshaling `receive_blocking` results
//! onto a channel so reads stay non-blocking like the unix backends.

use crate::error::TunError;
use crate::PlatformTun;
use std::io;
use std::sync::mpsc;
use std::sync::Arc;

const RING_CAPACITY: u32 = 0x0040_0000; // 4 MiB, matches WinTun's `MAX_RING_CAPACITY`.
const WINTUN_DLL: &str = "wintun.dll";

pub(crate) struct WindowsTun {
    _adapter: Arc<wintun::Adapter>,
    session: Arc<wintun::Session>,
    packet_rx: std::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    _recv_thread: std::thread::JoinHandle<()>,
}

impl PlatformTun for WindowsTun {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let rx = self.packet_rx.lock().unwrap_or_else(|e| e.into_inner());
        match rx.try_recv() {
            Ok(bytes) => {
                if bytes.len() > buf.len() {
                    tracing::warn!(len = bytes.len(), "dropping oversized packet from wintun");
                    return Ok(0);
                }
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Err(mpsc::TryRecvError::Empty) => Ok(0),
            Err(mpsc::TryRecvError::Disconnected) => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "wintun receive thread exited"))
            }
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let len: u16 = buf
            .len()
            .try_into()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "packet too large"))?;

        let Ok(mut pkt) = self.session.allocate_send_packet(len) else {
            // Ring buffer is full; drop the packet the way a full kernel queue would.
            return Ok(0);
        };
        pkt.bytes_mut().copy_from_slice(buf);
        self.session.send_packet(pkt);
        Ok(buf.len())
    }
}

/// `name_hint` becomes the WinTun adapter name (non-empty, ≤128 chars).
pub(crate) fn open(name_hint: Option<&str>) -> Result<(WindowsTun, String), TunError> {
    let name = match name_hint {
        Some(n) if !n.is_empty() && n.len() <= 128 => n.to_string(),
        Some(_) => return Err(TunError::InvalidArgument("adapter name must be 1-128 chars".into())),
        None => "ipv6-tunnel".to_string(),
    };

    // Safety: loading a DLL off disk runs arbitrary code; the caller is
    // trusted to ship a genuine WinTun driver alongside the binary.
    let wintun = unsafe { wintun::load_from_path(WINTUN_DLL) }
        .map_err(|e| TunError::DeviceUnavailable(e.to_string()))?;

    let guid = uuid::Uuid::new_v4();
    let adapter = wintun::Adapter::create(&wintun, &name, &name, Some(guid.as_u128()))
        .map_err(|e| TunError::DeviceUnavailable(e.to_string()))?;

    let session = Arc::new(
        adapter
            .start_session(RING_CAPACITY)
            .map_err(|e| TunError::DeviceUnavailable(e.to_string()))?,
    );

    let (packet_tx, packet_rx) = mpsc::channel();
    let recv_thread = start_recv_thread(packet_tx, Arc::clone(&session))?;

    Ok((
        WindowsTun {
            _adapter: adapter,
            session,
            packet_rx: std::sync::Mutex::new(packet_rx),
            _recv_thread: recv_thread,
        },
        name,
    ))
}

fn start_recv_thread(
    packet_tx: mpsc::Sender<Vec<u8>>,
    session: Arc<wintun::Session>,
) -> Result<std::thread::JoinHandle<()>, TunError> {
    std::thread::Builder::new()
        .name("ipv6-tunnel wintun recv".into())
        .spawn(move || loop {
            match session.receive_blocking() {
                Ok(pkt) => {
                    if packet_tx.send(pkt.bytes().to_vec()).is_err() {
                        break;
                    }
                }
                Err(wintun::Error::ShuttingDown) => break,
                Err(e) => {
                    tracing::error!("wintun receive_blocking failed: {e:#?}");
                    break;
                }
            }
        })
        .map_err(TunError::Io)
}

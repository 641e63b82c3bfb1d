//! Platform-abstracted handle for a TUN-style virtual network interface.
//!
//! [`VirtualInterfaceHandle`] is the single capability set every caller
//! drives: `open`, `read`, `write`, `close`, `name`, `handle_id`. Platform
//! quirks (Darwin's 4-byte AF prefix, Linux's `IFF_NO_PI`, Windows' WinTun
//! ring) live entirely behind the per-OS modules below.

use bytes::Bytes;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod error;

pub use error::TunError;

#[cfg(target_os = "macos")]
mod darwin;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(windows)]
mod windows;
#[cfg(not(any(target_os = "macos", target_os = "linux", windows)))]
mod unsupported;

/// Minimum and maximum buffer size accepted by [`VirtualInterfaceHandle::read`].
pub const MIN_READ_BYTES: usize = 1;
pub const MAX_READ_BYTES: usize = 65536;
/// Maximum payload size accepted by [`VirtualInterfaceHandle::write`].
pub const MAX_WRITE_BYTES: usize = 65536;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Per-OS capability set backing a [`VirtualInterfaceHandle`].
pub(crate) trait PlatformTun: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&self, buf: &[u8]) -> io::Result<usize>;
}

enum State {
    Open(Box<dyn PlatformTun>),
    Closed,
}

/// A single open (or closed) virtual interface.
///
/// All public operations serialize on one lock so `open`/`close` are
/// mutually exclusive with concurrent `read`/`write` from other threads.
pub struct VirtualInterfaceHandle {
    state: Mutex<State>,
    name: String,
    handle_id: u64,
}

impl VirtualInterfaceHandle {
    /// Acquires a kernel TUN device.
    ///
    /// `requested_name` is a hint only: on Darwin, `utun<N>` selects unit
    /// `N+1` and anything else (or `None`) scans unit `[1,255)` for the
    /// first free one; on Linux it is suggested to the kernel via
    /// `ifr_name`; on Windows it becomes the WinTun adapter name.
    pub fn open(requested_name: Option<&str>) -> Result<Self, TunError> {
        let (tun, name): (Box<dyn PlatformTun>, String) = platform_open(requested_name)?;

        Ok(Self {
            state: Mutex::new(State::Open(tun)),
            name,
            handle_id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Returns one packet, or empty bytes if none is available right now.
    pub fn read(&self, max_bytes: usize) -> Result<Bytes, TunError> {
        if !(MIN_READ_BYTES..=MAX_READ_BYTES).contains(&max_bytes) {
            return Err(TunError::InvalidArgument(format!(
                "max_bytes must be in [{MIN_READ_BYTES}, {MAX_READ_BYTES}], got {max_bytes}"
            )));
        }

        let guard = self.state.lock();
        let tun = match &*guard {
            State::Open(tun) => tun,
            State::Closed => return Err(TunError::AlreadyClosed),
        };

        let mut buf = vec![0u8; max_bytes];
        match tun.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(Bytes::from(buf))
            }
            Err(e) if would_block(&e) => Ok(Bytes::new()),
            Err(e) => Err(TunError::Io(e)),
        }
    }

    /// Transmits a single packet. An empty payload is a no-op that performs
    /// no syscall.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, TunError> {
        if bytes.len() > MAX_WRITE_BYTES {
            return Err(TunError::InvalidArgument(format!(
                "payload exceeds {MAX_WRITE_BYTES} bytes"
            )));
        }
        if bytes.is_empty() {
            return Ok(0);
        }

        let guard = self.state.lock();
        let tun = match &*guard {
            State::Open(tun) => tun,
            State::Closed => return Err(TunError::AlreadyClosed),
        };

        match tun.write(bytes) {
            Ok(n) => Ok(n),
            Err(e) if would_block(&e) => Ok(0),
            Err(e) => Err(TunError::Io(e)),
        }
    }

    /// Idempotent. Releases OS resources; subsequent I/O fails with
    /// [`TunError::AlreadyClosed`].
    pub fn close(&self) {
        let mut guard = self.state.lock();
        *guard = State::Closed;
    }

    pub fn is_closed(&self) -> bool {
        matches!(&*self.state.lock(), State::Closed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle_id(&self) -> u64 {
        self.handle_id
    }
}

fn would_block(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}

#[cfg(target_os = "macos")]
fn platform_open(name: Option<&str>) -> Result<(Box<dyn PlatformTun>, String), TunError> {
    let (tun, name) = darwin::open(name)?;
    Ok((Box::new(tun), name))
}

#[cfg(target_os = "linux")]
fn platform_open(name: Option<&str>) -> Result<(Box<dyn PlatformTun>, String), TunError> {
    let (tun, name) = linux::open(name)?;
    Ok((Box::new(tun), name))
}

#[cfg(windows)]
fn platform_open(name: Option<&str>) -> Result<(Box<dyn PlatformTun>, String), TunError> {
    let (tun, name) = windows::open(name)?;
    Ok((Box::new(tun), name))
}

#[cfg(not(any(target_os = "macos", target_os = "linux", windows)))]
fn platform_open(name: Option<&str>) -> Result<(Box<dyn PlatformTun>, String), TunError> {
    let (tun, name) = unsupported::open(name)?;
    Ok((Box::new(tun), name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_rejects_out_of_range_buffer_size() {
        // Constructing a handle requires a real kernel device, so this only
        // exercises the validation path via a closed, never-opened state.
        let handle = VirtualInterfaceHandle {
            state: Mutex::new(State::Closed),
            name: "test0".into(),
            handle_id: 0,
        };

        let err = handle.read(0).unwrap_err();
        assert!(matches!(err, TunError::InvalidArgument(_)));

        let err = handle.read(MAX_READ_BYTES + 1).unwrap_err();
        assert!(matches!(err, TunError::InvalidArgument(_)));
    }

    #[test]
    fn write_empty_is_a_noop_even_when_closed() {
        let handle = VirtualInterfaceHandle {
            state: Mutex::new(State::Closed),
            name: "test0".into(),
            handle_id: 0,
        };

        assert_eq!(handle.write(&[]).unwrap(), 0);
    }

    #[test]
    fn write_oversized_payload_is_rejected() {
        let handle = VirtualInterfaceHandle {
            state: Mutex::new(State::Closed),
            name: "test0".into(),
            handle_id: 0,
        };

        let big = vec![0u8; MAX_WRITE_BYTES + 1];
        let err = handle.write(&big).unwrap_err();
        assert!(matches!(err, TunError::InvalidArgument(_)));
    }

    #[test]
    fn operations_after_close_fail_with_already_closed() {
        let handle = VirtualInterfaceHandle {
            state: Mutex::new(State::Closed),
            name: "test0".into(),
            handle_id: 0,
        };

        assert!(handle.is_closed());
        let err = handle.read(1500).unwrap_err();
        assert!(matches!(err, TunError::AlreadyClosed));

        let err = handle.write(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, TunError::AlreadyClosed));
    }

    #[test]
    fn close_is_idempotent() {
        let handle = VirtualInterfaceHandle {
            state: Mutex::new(State::Closed),
            name: "test0".into(),
            handle_id: 0,
        };

        handle.close();
        handle.close();
        assert!(handle.is_closed());
    }
}

//! Linux `/dev/net/tun` backend: `IFF_TUN | IFF_NO_PI`, no framing prefix.

use crate::error::TunError;
use crate::PlatformTun;
use libc::{close, fcntl, open, F_GETFL, F_SETFL, IFF_NO_PI, IFF_TUN, O_NONBLOCK, O_RDWR};
use std::ffi::c_short;
use std::io;
use std::os::fd::RawFd;

const TUN_FILE: &[u8] = b"/dev/net/tun\0";
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;

pub(crate) struct LinuxTun {
    fd: RawFd,
}

impl Drop for LinuxTun {
    fn drop(&mut self) {
        unsafe { close(self.fd) };
    }
}

impl PlatformTun for LinuxTun {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        // Safety: `self.fd` is open for the lifetime of `self`.
        match unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut _, buf.len()) } {
            -1 => Err(io::Error::last_os_error()),
            n => Ok(n as usize),
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        // Safety: `self.fd` is open for the lifetime of `self`.
        match unsafe { libc::write(self.fd, buf.as_ptr() as *const _, buf.len()) } {
            -1 => Err(io::Error::last_os_error()),
            n => Ok(n as usize),
        }
    }
}

/// `name_hint` is suggested to the kernel via `ifr_name`; the kernel may
/// return a different name if the hint is unavailable.
pub(crate) fn open(name_hint: Option<&str>) -> Result<(LinuxTun, String), TunError> {
    // Safety: `TUN_FILE` is a nul-terminated constant.
    let fd = unsafe { open(TUN_FILE.as_ptr() as *const _, O_RDWR) };
    if fd < 0 {
        return Err(TunError::from_last_os_error());
    }

    let mut request = SetIffRequest::new(name_hint);

    // Safety: `fd` was just opened successfully; `request` outlives the call.
    // The kernel writes the assigned interface name back into `request.name`.
    if unsafe { libc::ioctl(fd, TUNSETIFF, &mut request) } < 0 {
        let err = TunError::from_last_os_error();
        unsafe { close(fd) };
        return Err(err);
    }

    if let Err(e) = set_non_blocking(fd) {
        unsafe { close(fd) };
        return Err(e);
    }

    let assigned_name = String::from_utf8_lossy(
        &request.name[..request
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(request.name.len())],
    )
    .to_string();

    Ok((LinuxTun { fd }, assigned_name))
}

fn set_non_blocking(fd: RawFd) -> Result<(), TunError> {
    match unsafe { fcntl(fd, F_GETFL) } {
        -1 => Err(TunError::from_last_os_error()),
        flags => match unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) } {
            -1 => Err(TunError::from_last_os_error()),
            _ => Ok(()),
        },
    }
}

#[repr(C)]
struct SetIffRequest {
    name: [u8; libc::IF_NAMESIZE],
    flags: c_short,
}

impl SetIffRequest {
    fn new(name_hint: Option<&str>) -> Self {
        let mut name = [0u8; libc::IF_NAMESIZE];
        if let Some(hint) = name_hint {
            let bytes = hint.as_bytes();
            let n = bytes.len().min(libc::IF_NAMESIZE - 1);
            name[..n].copy_from_slice(&bytes[..n]);
        }

        Self {
            name,
            flags: (IFF_TUN | IFF_NO_PI) as c_short,
        }
    }
}

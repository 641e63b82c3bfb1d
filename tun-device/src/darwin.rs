//! Darwin `utun` backend: `PF_SYSTEM`/`SYSPROTO_CONTROL` with a 4-byte AF
//! family prefix on every read/write.

use crate::error::TunError;
use crate::PlatformTun;
use libc::{
    c_void, connect, ctl_info, fcntl, getsockopt, ioctl, iovec, msghdr, recvmsg, sendmsg,
    sockaddr, sockaddr_ctl, socket, socklen_t, AF_INET6, AF_SYSTEM, CTLIOCGINFO, F_GETFL, F_SETFL,
    IF_NAMESIZE, O_NONBLOCK, PF_SYSTEM, SOCK_DGRAM, SYSPROTO_CONTROL, UTUN_OPT_IFNAME,
};
use std::io;
use std::mem::size_of;
use std::os::fd::RawFd;

const CTL_NAME: &[u8] = b"com.apple.net.utun_control";
const MAX_UNIT: u32 = 255;
/// `AF_SYS_CONTROL`, not exported by `libc` on this target.
const AF_SYS_CONTROL: u16 = 2;

pub(crate) struct DarwinTun {
    fd: RawFd,
}

impl Drop for DarwinTun {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

impl PlatformTun for DarwinTun {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut hdr = [0u8; 4];
        let mut iov = [
            iovec {
                iov_base: hdr.as_mut_ptr() as *mut c_void,
                iov_len: hdr.len(),
            },
            iovec {
                iov_base: buf.as_mut_ptr() as *mut c_void,
                iov_len: buf.len(),
            },
        ];
        let mut msg = empty_msghdr(&mut iov);

        // Safety: `self.fd` is open for the lifetime of `self`.
        match unsafe { recvmsg(self.fd, &mut msg, 0) } {
            -1 => Err(io::Error::last_os_error()),
            0..=4 => Ok(0),
            n => Ok((n - 4) as usize),
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut hdr = [0u8, 0, 0, AF_INET6 as u8];
        let mut iov = [
            iovec {
                iov_base: hdr.as_mut_ptr() as *mut c_void,
                iov_len: hdr.len(),
            },
            iovec {
                iov_base: buf.as_ptr() as *mut c_void,
                iov_len: buf.len(),
            },
        ];
        let msg = empty_msghdr(&mut iov);

        // Safety: `self.fd` is open for the lifetime of `self`.
        match unsafe { sendmsg(self.fd, &msg, 0) } {
            -1 => Err(io::Error::last_os_error()),
            n => Ok((n as usize).saturating_sub(hdr.len())),
        }
    }
}

fn empty_msghdr(iov: &mut [iovec]) -> msghdr {
    msghdr {
        msg_name: std::ptr::null_mut(),
        msg_namelen: 0,
        msg_iov: iov.as_mut_ptr(),
        msg_iovlen: iov.len() as _,
        msg_control: std::ptr::null_mut(),
        msg_controllen: 0,
        msg_flags: 0,
    }
}

/// `name_hint` of the form `utun<N>` selects unit `N+1`; anything else (or
/// `None`) scans the first free unit in `[1,255)`.
pub(crate) fn open(name_hint: Option<&str>) -> Result<(DarwinTun, String), TunError> {
    let requested = name_hint.and_then(parse_utun_unit);

    let units: Box<dyn Iterator<Item = u32>> = match requested {
        Some(n) => Box::new(std::iter::once(n + 1)),
        None => Box::new(1..MAX_UNIT),
    };

    let mut last_err = TunError::DeviceUnavailable("no free utun unit".into());
    for unit in units {
        match try_open_unit(unit) {
            Ok((fd, name)) => return Ok((DarwinTun { fd }, name)),
            Err(e) => last_err = e,
        }
    }

    Err(last_err)
}

fn parse_utun_unit(name: &str) -> Option<u32> {
    name.strip_prefix("utun")?.parse().ok()
}

fn try_open_unit(unit: u32) -> Result<(RawFd, String), TunError> {
    // Safety: constant, valid arguments.
    let fd = unsafe { socket(PF_SYSTEM, SOCK_DGRAM, SYSPROTO_CONTROL) };
    if fd < 0 {
        return Err(TunError::from_last_os_error());
    }

    let mut info = ctl_info {
        ctl_id: 0,
        ctl_name: [0; 96],
    };
    // Safety: `CTL_NAME` is shorter than `ctl_name` and both are byte arrays.
    info.ctl_name[..CTL_NAME.len()]
        .copy_from_slice(unsafe { &*(CTL_NAME as *const [u8] as *const [i8]) });

    // Safety: `fd` is open, `info` is a valid `ctl_info`.
    if unsafe { ioctl(fd, CTLIOCGINFO, &mut info as *mut ctl_info) } != 0 {
        let err = TunError::from_last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    let addr = sockaddr_ctl {
        sc_len: size_of::<sockaddr_ctl>() as u8,
        sc_family: AF_SYSTEM as u8,
        ss_sysaddr: AF_SYS_CONTROL,
        sc_id: info.ctl_id,
        sc_unit: unit,
        sc_reserved: Default::default(),
    };

    // Safety: `addr` is a valid, fully-initialized `sockaddr_ctl`.
    let ret = unsafe {
        connect(
            fd,
            &addr as *const sockaddr_ctl as *const sockaddr,
            size_of::<sockaddr_ctl>() as socklen_t,
        )
    };
    if ret != 0 {
        let err = TunError::from_last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    if let Err(e) = set_non_blocking(fd) {
        unsafe { libc::close(fd) };
        return Err(e);
    }

    match name(fd) {
        Ok(name) => Ok((fd, name)),
        Err(e) => {
            unsafe { libc::close(fd) };
            Err(e)
        }
    }
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

fn name(fd: RawFd) -> Result<String, TunError> {
    let mut buf = [0u8; IF_NAMESIZE];
    let mut len = buf.len() as socklen_t;

    // Safety: `fd` is open, `buf`/`len` describe a valid output buffer.
    if unsafe {
        getsockopt(
            fd,
            SYSPROTO_CONTROL,
            UTUN_OPT_IFNAME,
            buf.as_mut_ptr() as *mut c_void,
            &mut len,
        )
    } < 0
        || len == 0
    {
        return Err(TunError::from_last_os_error());
    }

    Ok(String::from_utf8_lossy(&buf[..(len - 1) as usize]).to_string())
}

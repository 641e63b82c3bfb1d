//! Stub backend compiled on any host OS that is neither Linux, Darwin, nor
//! Windows; every operation fails with `PlatformUnsupported`.

use crate::error::TunError;
use crate::PlatformTun;
use std::io;

pub(crate) struct UnsupportedTun;

impl PlatformTun for UnsupportedTun {
    fn read(&self, _buf: &mut [u8]) -> io::Result<usize> {
        unreachable!("UnsupportedTun is never constructed")
    }

    fn write(&self, _buf: &[u8]) -> io::Result<usize> {
        unreachable!("UnsupportedTun is never constructed")
    }
}

pub(crate) fn open(_name_hint: Option<&str>) -> Result<(UnsupportedTun, String), TunError> {
    Err(TunError::PlatformUnsupported)
}

//! SO_ORIGINAL_DST
//!
//! Linux netfilter records the pre-NAT destination of a REDIRECTed
//! connection; `getsockopt(SOL_IP, SO_ORIGINAL_DST)` reads it back.

use crate::domain::ports::OriginalDestination;
use std::io;
use tokio::net::TcpStream;

/// `SO_ORIGINAL_DST` from `<linux/netfilter_ipv4.h>`.
pub const SO_ORIGINAL_DST: i32 = 80;

/// Original-destination lookup through netfilter conntrack.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoOriginalDst;

impl SoOriginalDst {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
impl OriginalDestination for SoOriginalDst {
    fn destination_port(&self, stream: &TcpStream) -> io::Result<u16> {
        use std::os::unix::io::AsRawFd;

        let fd = stream.as_raw_fd();
        // SAFETY: sockaddr_in is plain old data; the kernel writes at most
        // `len` bytes into it.
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_IP,
                SO_ORIGINAL_DST,
                &mut addr as *mut libc::sockaddr_in as *mut libc::c_void,
                &mut len,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(u16::from_be(addr.sin_port))
    }
}

#[cfg(not(target_os = "linux"))]
impl OriginalDestination for SoOriginalDst {
    fn destination_port(&self, _stream: &TcpStream) -> io::Result<u16> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "SO_ORIGINAL_DST is only available on Linux",
        ))
    }
}

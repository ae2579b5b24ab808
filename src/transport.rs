use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::error::{Error, Result};

/// The interface the event loop (§4.G) consumes from the network. It is
/// deliberately minimal: a single blocking receive with a deadline, and a
/// single send. Nothing peer- or client-specific leaks through; routing is
/// entirely carried in the JSON envelope's `src`/`dst` fields (§4.A), not in
/// socket addressing, which keeps the core decoupled from how bytes actually
/// move.
pub trait Transport {
    /// Blocks for up to `timeout` waiting for one message. Returns `Ok(None)`
    /// on a timeout, matching §4.G step 3 ("on zero bytes, continue").
    fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Sends `bytes` out over the socket. The destination is implicit in
    /// the connection established at bind time (see `SeqpacketTransport`);
    /// which physical peer or client receives the bytes is resolved outside
    /// this process, by whatever is on the other end of the socket, based on
    /// the envelope's `dst` field.
    fn send(&self, bytes: &[u8]) -> Result<()>;
}

/// A thin wrapper around one `AF_UNIX` `SOCK_SEQPACKET` socket, connected to
/// the path named by this replica's own id (§4.H, §6). `SOCK_SEQPACKET`
/// preserves message boundaries on its own, so no length-prefix framing is
/// layered on top: one `send`/`recv` is exactly one JSON message, up to the
/// 32 KiB cap enforced by the caller.
pub struct SeqpacketTransport {
    fd: RawFd,
}

const MAX_MESSAGE_BYTES: usize = 32 * 1024;

impl SeqpacketTransport {
    /// Connects to the `SOCK_SEQPACKET` socket at `path` (conventionally
    /// this replica's own id). The socket file itself is expected to
    /// already exist, created by whatever harness is multiplexing traffic
    /// among the cluster and its clients.
    pub fn connect(path: &str) -> Result<SeqpacketTransport> {
        let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_SEQPACKET, 0) };
        if fd < 0 {
            return Err(Error::Transport(io::Error::last_os_error()));
        }

        let addr = unix_sockaddr(path)?;
        let ret = unsafe {
            libc::connect(
                fd,
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_un>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(Error::Transport(err));
        }

        Ok(SeqpacketTransport { fd })
    }

    fn set_recv_timeout(&self, timeout: Duration) -> Result<()> {
        let tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };
        let ret = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &tv as *const libc::timeval as *const libc::c_void,
                mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::Transport(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Transport for SeqpacketTransport {
    fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.set_recv_timeout(timeout)?;
        let mut buf = vec![0u8; MAX_MESSAGE_BYTES];
        let n = unsafe {
            libc::recv(
                self.fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ) {
                return Ok(None);
            }
            return Err(Error::Transport(err));
        }
        if n == 0 {
            // Zero-length read: nothing to dispatch this iteration.
            return Ok(None);
        }
        buf.truncate(n as usize);
        Ok(Some(buf))
    }

    fn send(&self, bytes: &[u8]) -> Result<()> {
        let n = unsafe {
            libc::send(
                self.fd,
                bytes.as_ptr() as *const libc::c_void,
                bytes.len(),
                0,
            )
        };
        if n < 0 {
            return Err(Error::Transport(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Drop for SeqpacketTransport {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}


fn unix_sockaddr(path: &str) -> Result<libc::sockaddr_un> {
    let cpath = CString::new(path)
        .map_err(|_| Error::InvalidConfig(format!("socket path has embedded NUL: {}", path)))?;
    let bytes = cpath.as_bytes_with_nul();
    if bytes.len() > 108 {
        return Err(Error::InvalidConfig(format!(
            "socket path too long for sockaddr_un: {}",
            path
        )));
    }

    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes.iter()) {
        *dst = *src as libc::c_char;
    }
    Ok(addr)
}

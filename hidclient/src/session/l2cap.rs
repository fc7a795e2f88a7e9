// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! L2CAP sequenced-packet sockets.

use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use log::debug;

use super::{AcceptError, BdAddr, HidChannel, HidListener, SessionError};

const BTPROTO_L2CAP: libc::c_int = 0;

/// Non-blocking: `accept4` after `poll` yields `EAGAIN` if the pending
/// connection was aborted in between.
const LISTEN_SOCKET_FLAGS: libc::c_int =
    libc::SOCK_SEQPACKET | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC;

/// `struct sockaddr_l2` from `bluetooth/l2cap.h`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
struct SockaddrL2 {
    l2_family: libc::sa_family_t,
    /// Little-endian PSM
    l2_psm: u16,
    l2_bdaddr: [u8; 6],
    l2_cid: u16,
    l2_bdaddr_type: u8,
}

impl SockaddrL2 {
    fn new(addr: BdAddr, psm: u16) -> Self {
        Self {
            l2_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            l2_psm: psm.to_le(),
            l2_bdaddr: addr.0,
            ..Default::default()
        }
    }
}

/// Socket bound and listening on one PSM of every local adapter
#[derive(Debug)]
pub struct L2capListener {
    fd: OwnedFd,
    psm: u16,
    send_timeout: Duration,
}

impl L2capListener {
    /// Create, bind and listen (backlog 1). Accepted channels give up on
    /// a send after `send_timeout`.
    pub fn bind(psm: u16, send_timeout: Duration) -> Result<Self, SessionError> {
        // SAFETY: plain socket(2) call with constant arguments.
        let raw = unsafe { libc::socket(libc::AF_BLUETOOTH, LISTEN_SOCKET_FLAGS, BTPROTO_L2CAP) };
        if raw < 0 {
            return Err(SessionError::Socket(io::Error::last_os_error()));
        }
        // SAFETY: raw is a freshly created descriptor nobody else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let reuse: libc::c_int = 1;
        // SAFETY: the option value points to a live c_int of the given size.
        let ret = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                (&reuse as *const libc::c_int).cast(),
                size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            debug!(
                "SO_REUSEADDR on PSM {psm}: {}",
                io::Error::last_os_error()
            );
        }

        let addr = SockaddrL2::new(BdAddr::ANY, psm);
        // SAFETY: addr is a valid sockaddr_l2 and the length matches it.
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&addr as *const SockaddrL2).cast(),
                size_of::<SockaddrL2>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(SessionError::Bind {
                psm,
                source: io::Error::last_os_error(),
            });
        }

        // SAFETY: fd is a bound socket we own.
        if unsafe { libc::listen(fd.as_raw_fd(), 1) } < 0 {
            return Err(SessionError::Listen {
                psm,
                source: io::Error::last_os_error(),
            });
        }

        debug!("Listening on L2CAP PSM {psm}");
        Ok(Self {
            fd,
            psm,
            send_timeout,
        })
    }

    pub fn psm(&self) -> u16 {
        self.psm
    }
}

impl HidListener for L2capListener {
    type Channel = L2capChannel;

    fn accept_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<(L2capChannel, BdAddr)>, AcceptError> {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
        // SAFETY: pfd is a single valid pollfd for the duration of the call.
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(AcceptError::Wait(err));
        }
        if ret == 0 {
            return Ok(None);
        }
        self.accept_pending()
    }
}

impl L2capListener {
    /// Accept a connection if one is queued right now
    fn accept_pending(&self) -> Result<Option<(L2capChannel, BdAddr)>, AcceptError> {
        let mut addr = SockaddrL2::default();
        let mut len = size_of::<SockaddrL2>() as libc::socklen_t;
        // SAFETY: addr and len describe a writable sockaddr_l2 buffer.
        let raw = unsafe {
            libc::accept4(
                self.fd.as_raw_fd(),
                (&mut addr as *mut SockaddrL2).cast(),
                &mut len,
                libc::SOCK_CLOEXEC,
            )
        };
        if raw < 0 {
            let err = io::Error::last_os_error();
            if matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) {
                return Ok(None);
            }
            return Err(AcceptError::Accept(err));
        }

        // SAFETY: accept4 returned a new descriptor that we now own.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        let channel = L2capChannel::new(fd, self.send_timeout).map_err(AcceptError::Accept)?;
        Ok(Some((channel, BdAddr(addr.l2_bdaddr))))
    }
}

/// One accepted HID channel; closed on drop
#[derive(Debug)]
pub struct L2capChannel {
    fd: OwnedFd,
}

impl L2capChannel {
    /// Wrap a connected socket; a send blocked longer than `send_timeout`
    /// fails with `WouldBlock`
    fn new(fd: OwnedFd, send_timeout: Duration) -> io::Result<Self> {
        let timeout = libc::timeval {
            tv_sec: libc::time_t::try_from(send_timeout.as_secs()).unwrap_or(libc::time_t::MAX),
            tv_usec: libc::suseconds_t::from(send_timeout.subsec_micros() as i32),
        };
        // SAFETY: the option value points to a live timeval of the given size.
        let ret = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_SNDTIMEO,
                (&timeout as *const libc::timeval).cast(),
                size_of::<libc::timeval>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }
}

impl HidChannel for L2capChannel {
    fn send_report(&mut self, report: &[u8]) -> io::Result<usize> {
        // SAFETY: report is valid for report.len() bytes of reads.
        let n = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                report.as_ptr().cast(),
                report.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

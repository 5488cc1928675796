//! File descriptor passing via Unix domain sockets using SCM_RIGHTS
//!
//! The control protocol moves serialized messages between the invoking
//! process and the running instance; some of those messages carry open file
//! descriptors (the `--fd` option) that must arrive out-of-band. This module
//! implements the framing both sides use:
//!
//! 1. A 12-byte header (payload length as u64 LE, descriptor count as u32 LE),
//!    sent via `sendmsg` with the descriptors attached as an SCM_RIGHTS
//!    control message.
//! 2. The payload itself via regular socket writes.
//!
//! The descriptor count in the header lets the receiver detect a truncated
//! SCM_RIGHTS delivery instead of silently mis-indexing descriptors later.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

/// Size of the fixed frame header.
const HEADER_LEN: usize = 12;

/// CMSG_SPACE for `n` descriptors.
fn cmsg_space(n: usize) -> usize {
    unsafe { libc::CMSG_SPACE((n * std::mem::size_of::<RawFd>()) as u32) as usize }
}

fn encode_header(payload_len: usize, fd_count: usize) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..8].copy_from_slice(&(payload_len as u64).to_le_bytes());
    header[8..].copy_from_slice(&(fd_count as u32).to_le_bytes());
    header
}

/// Send one frame: `payload` plus zero or more file descriptors.
pub fn send_frame(socket: &UnixStream, fds: &[RawFd], payload: &[u8]) -> io::Result<()> {
    let header = encode_header(payload.len(), fds.len());

    if fds.is_empty() {
        // No control message needed, plain writes suffice.
        let mut sock = socket;
        sock.write_all(&header)?;
        sock.write_all(payload)?;
        return Ok(());
    }

    let fd_bytes = std::mem::size_of_val(fds);
    let cmsg_buffer_len = cmsg_space(fds.len());
    let mut cmsg_buffer = vec![0u8; cmsg_buffer_len];

    let mut iov = libc::iovec {
        iov_base: header.as_ptr() as *mut libc::c_void,
        iov_len: header.len(),
    };

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buffer.as_mut_ptr() as *mut libc::c_void;
    // Cast needed: msg_controllen is usize on Linux, u32 on macOS
    msg.msg_controllen = cmsg_buffer_len as _;

    let cmsg: *mut libc::cmsghdr = unsafe { libc::CMSG_FIRSTHDR(&msg) };
    if cmsg.is_null() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "CMSG_FIRSTHDR returned null",
        ));
    }

    unsafe {
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(fd_bytes as u32) as _;

        let cmsg_data = libc::CMSG_DATA(cmsg);
        std::ptr::copy_nonoverlapping(fds.as_ptr(), cmsg_data as *mut RawFd, fds.len());
    }

    let ret = unsafe { libc::sendmsg(socket.as_raw_fd(), &msg, 0) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    if ret as usize != header.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            "short sendmsg for frame header",
        ));
    }

    let mut sock = socket;
    sock.write_all(payload)?;
    Ok(())
}

/// Receive one frame sent by [`send_frame`].
///
/// `max_fds` bounds the control-message buffer; `max_payload` bounds the
/// allocation for the payload. Returns the payload bytes and any received
/// descriptors (already owned by this process; close them with [`close_fds`]
/// if unused).
pub fn recv_frame(
    socket: &UnixStream,
    max_fds: usize,
    max_payload: usize,
) -> io::Result<(Vec<u8>, Vec<RawFd>)> {
    let cmsg_buffer_len = cmsg_space(max_fds);
    let mut cmsg_buffer = vec![0u8; cmsg_buffer_len];
    let mut header = [0u8; HEADER_LEN];

    let mut iov = libc::iovec {
        iov_base: header.as_mut_ptr() as *mut libc::c_void,
        iov_len: header.len(),
    };

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buffer.as_mut_ptr() as *mut libc::c_void;
    // Cast needed: msg_controllen is usize on Linux, u32 on macOS
    msg.msg_controllen = cmsg_buffer_len as _;

    let ret = unsafe { libc::recvmsg(socket.as_raw_fd(), &mut msg, 0) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    let received = ret as usize;
    if received == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "socket closed (EOF)",
        ));
    }

    let mut fds = Vec::new();
    let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&msg) };
    while !cmsg.is_null() {
        unsafe {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                // Cast needed: cmsg_len is usize on Linux, u32 on macOS
                let fd_bytes = (*cmsg).cmsg_len as usize - libc::CMSG_LEN(0) as usize;
                let count = fd_bytes / std::mem::size_of::<RawFd>();
                let cmsg_data = libc::CMSG_DATA(cmsg) as *const RawFd;
                for i in 0..count {
                    fds.push(*cmsg_data.add(i));
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    // The header may arrive split only if the peer is not speaking this
    // protocol; finish reading it with plain reads in that case.
    if received < HEADER_LEN {
        let mut sock = socket;
        sock.read_exact(&mut header[received..])?;
    }

    let payload_len = u64::from_le_bytes(header[..8].try_into().unwrap()) as usize;
    let fd_count = u32::from_le_bytes(header[8..].try_into().unwrap()) as usize;

    if fd_count != fds.len() {
        close_fds(&fds);
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "frame announced {} descriptors but {} arrived",
                fd_count,
                fds.len()
            ),
        ));
    }

    if payload_len > max_payload {
        close_fds(&fds);
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame payload {payload_len} exceeds limit {max_payload}"),
        ));
    }

    let mut payload = vec![0u8; payload_len];
    let mut sock = socket;
    sock.read_exact(&mut payload)?;

    Ok((payload, fds))
}

/// Close multiple file descriptors, ignoring errors.
pub fn close_fds(fds: &[RawFd]) {
    for &fd in fds {
        unsafe {
            libc::close(fd);
        }
    }
}

//! Wire protocol for the control socket
//!
//! Requests and responses are bincode-serialized and framed by
//! `nterm_core::fd_passing`, so a request can carry open file descriptors
//! out-of-band (the `--fd` option). One connection carries a sequence of
//! request/response pairs; the server answers them in arrival order.
//!
//! `WaitChildExit` is the one call whose reply is deferred: the server holds
//! the connection until the screen's child has exited.

use std::io;
use std::os::unix::io::RawFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use nterm_core::fd_passing;

/// Upper bound for one serialized message.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Upper bound for descriptors attached to one frame. Matches what one
/// spawned child may receive, so a frame the server accepts can never
/// overflow the spawn path.
pub const MAX_FDS: usize = nterm_core::FD_MAP_MAX;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encoding error: {0}")]
    Encode(bincode::Error),

    #[error("decoding error: {0}")]
    Decode(bincode::Error),

    #[error("too many file descriptors: {0} (max: {1})")]
    TooManyFds(usize, usize),
}

/// Ask the server to create a screen in a new or existing window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    /// Screen this invocation was spawned from; targets its window and
    /// donates profile/zoom when not otherwise specified.
    pub parent_screen: Option<String>,
    /// Reuse the window containing this screen.
    pub window_from_screen: Option<String>,
    /// Reuse a window by numeric id.
    pub window_id: Option<u64>,
    /// Profile UUID. Already resolved by the client; never a name.
    pub profile: Option<String>,
    pub title: Option<String>,
    pub zoom: Option<f64>,
    /// Focus the new screen.
    pub active: bool,

    // Window-only fields, applied when this call creates the window.
    pub startup_token: Option<String>,
    pub role: Option<String>,
    pub show_menubar: Option<bool>,
    pub fullscreen: bool,
    pub maximize: bool,
    pub geometry: Option<String>,
    /// Raise the window. Honored on reused windows only when explicitly set.
    pub present_window: Option<bool>,
}

/// A descriptor to install in the child: the descriptor at `handle_index`
/// in the frame's out-of-band list lands at `target_fd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FdTarget {
    pub target_fd: i32,
    pub handle_index: usize,
}

/// Ask the server to run a command in an existing screen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecRequest {
    /// Screen UUID returned by CreateInstance.
    pub screen: String,
    /// Command to run. Empty means the profile command or the user's shell.
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Run as a login shell.
    pub shell: bool,
    /// `KEY=VALUE` entries forwarded from the invoking process.
    pub environ: Vec<String>,
    /// Present iff the frame carries descriptors.
    pub fd_set: Option<Vec<FdTarget>>,
}

/// Client → server messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    CreateInstance(CreateInstanceRequest),
    Exec(ExecRequest),
    /// Deferred-reply call: answered with `ChildExited` once the screen's
    /// child process terminates.
    WaitChildExit { screen: String },
}

/// Wire-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidArgument,
    ScreenClosed,
    SpawnFailed,
    Internal,
}

/// Server → client messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    ScreenCreated { screen: String },
    ExecStarted,
    ChildExited { exit_code: i32 },
    Error { kind: ErrorKind, message: String },
}

/// Send a request, attaching descriptors to the frame.
pub fn send_request(
    socket: &UnixStream,
    request: &Request,
    fds: &[RawFd],
) -> Result<(), ProtocolError> {
    if fds.len() > MAX_FDS {
        return Err(ProtocolError::TooManyFds(fds.len(), MAX_FDS));
    }
    let payload = bincode::serialize(request).map_err(ProtocolError::Encode)?;
    fd_passing::send_frame(socket, fds, &payload)?;
    Ok(())
}

/// Receive a request plus any attached descriptors.
pub fn recv_request(socket: &UnixStream) -> Result<(Request, Vec<RawFd>), ProtocolError> {
    let (payload, fds) = fd_passing::recv_frame(socket, MAX_FDS, MAX_MESSAGE_SIZE)?;
    match bincode::deserialize(&payload) {
        Ok(request) => Ok((request, fds)),
        Err(err) => {
            fd_passing::close_fds(&fds);
            Err(ProtocolError::Decode(err))
        }
    }
}

/// Send a response. Responses never carry descriptors.
pub fn send_response(socket: &UnixStream, response: &Response) -> Result<(), ProtocolError> {
    let payload = bincode::serialize(response).map_err(ProtocolError::Encode)?;
    fd_passing::send_frame(socket, &[], &payload)?;
    Ok(())
}

/// Receive a response.
pub fn recv_response(socket: &UnixStream) -> Result<Response, ProtocolError> {
    let (payload, fds) = fd_passing::recv_frame(socket, 0, MAX_MESSAGE_SIZE)?;
    // A well-behaved server never attaches descriptors to responses.
    fd_passing::close_fds(&fds);
    bincode::deserialize(&payload).map_err(ProtocolError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let (client, server) = UnixStream::pair().expect("socket pair");

        let request = Request::CreateInstance(CreateInstanceRequest {
            profile: Some("abc".into()),
            title: Some("hello".into()),
            active: true,
            ..Default::default()
        });
        send_request(&client, &request, &[]).expect("send");

        let (received, fds) = recv_request(&server).expect("recv");
        assert!(fds.is_empty());
        match received {
            Request::CreateInstance(req) => {
                assert_eq!(req.profile.as_deref(), Some("abc"));
                assert_eq!(req.title.as_deref(), Some("hello"));
                assert!(req.active);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_exec_request_carries_descriptors() {
        let (client, server) = UnixStream::pair().expect("socket pair");

        let mut pipe = [0i32; 2];
        unsafe {
            assert_eq!(libc::pipe(pipe.as_mut_ptr()), 0);
        }

        let request = Request::Exec(ExecRequest {
            screen: "some-uuid".into(),
            argv: vec!["cat".into()],
            fd_set: Some(vec![FdTarget {
                target_fd: 5,
                handle_index: 0,
            }]),
            ..Default::default()
        });
        send_request(&client, &request, &[pipe[0]]).expect("send");

        let (received, fds) = recv_request(&server).expect("recv");
        assert_eq!(fds.len(), 1);
        match received {
            Request::Exec(req) => {
                assert_eq!(req.screen, "some-uuid");
                assert_eq!(
                    req.fd_set.as_deref(),
                    Some(&[FdTarget { target_fd: 5, handle_index: 0 }][..])
                );
            }
            other => panic!("unexpected request: {other:?}"),
        }

        nterm_core::fd_passing::close_fds(&[pipe[0], pipe[1]]);
        nterm_core::fd_passing::close_fds(&fds);
    }

    #[test]
    fn test_response_roundtrip() {
        let (client, server) = UnixStream::pair().expect("socket pair");

        send_response(&server, &Response::ScreenCreated { screen: "u1".into() }).expect("send");
        match recv_response(&client).expect("recv") {
            Response::ScreenCreated { screen } => assert_eq!(screen, "u1"),
            other => panic!("unexpected response: {other:?}"),
        }

        send_response(
            &server,
            &Response::Error {
                kind: ErrorKind::InvalidArgument,
                message: "bad".into(),
            },
        )
        .expect("send");
        match recv_response(&client).expect("recv") {
            Response::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::InvalidArgument);
                assert_eq!(message, "bad");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_too_many_fds_rejected() {
        let (client, _server) = UnixStream::pair().expect("socket pair");
        let fds = vec![0; MAX_FDS + 1];
        let request = Request::WaitChildExit { screen: "x".into() };
        assert!(matches!(
            send_request(&client, &request, &fds),
            Err(ProtocolError::TooManyFds(..))
        ));
    }
}

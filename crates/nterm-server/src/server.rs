//! Control socket server
//!
//! Owns the Unix listener and dispatches each connection's requests to the
//! factory and receiver services. Connections are handled on plain threads;
//! a `WaitChildExit` parks its connection thread on the screen's exit latch
//! without holding anything other threads need.

use std::fs;
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;

use nterm_app::ProfileStore;
use nterm_core::fd_passing;

use crate::factory::FactoryService;
use crate::protocol::{self, ProtocolError, Request, Response};
use crate::receiver::ReceiverService;
use crate::registry::Registry;

pub struct Server {
    listener: UnixListener,
    socket_path: PathBuf,
    registry: Arc<Registry>,
    factory: Arc<FactoryService>,
    receiver: Arc<ReceiverService>,
}

impl Server {
    /// Bind the control socket. The caller has already established that no
    /// live server owns `path`; a leftover socket file is removed.
    pub fn bind(path: &Path, profiles: ProfileStore) -> io::Result<Arc<Self>> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;
        log::info!("listening on {}", path.display());

        let registry = Arc::new(Registry::new());
        let profiles = Arc::new(RwLock::new(profiles));
        let factory = Arc::new(FactoryService::new(
            Arc::clone(&registry),
            Arc::clone(&profiles),
        ));
        let receiver = Arc::new(ReceiverService::new(
            Arc::clone(&registry),
            profiles,
            path.to_path_buf(),
        ));

        Ok(Arc::new(Self {
            listener,
            socket_path: path.to_path_buf(),
            registry,
            factory,
            receiver,
        }))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn factory(&self) -> &Arc<FactoryService> {
        &self.factory
    }

    pub fn receiver(&self) -> &Arc<ReceiverService> {
        &self.receiver
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until the process exits. Runs on its own thread so
    /// the first instance can go on materializing its own windows.
    pub fn start(self: &Arc<Self>) {
        let server = Arc::clone(self);
        thread::Builder::new()
            .name("accept".into())
            .spawn(move || server.accept_loop())
            .ok();
    }

    fn accept_loop(&self) {
        for connection in self.listener.incoming() {
            match connection {
                Ok(stream) => {
                    let factory = Arc::clone(&self.factory);
                    let receiver = Arc::clone(&self.receiver);
                    thread::Builder::new()
                        .name("client".into())
                        .spawn(move || {
                            if let Err(err) = serve_connection(&stream, &factory, &receiver) {
                                log::debug!("connection ended: {err}");
                            }
                        })
                        .ok();
                }
                Err(err) => {
                    log::warn!("accept failed: {err}");
                }
            }
        }
    }
}

/// Answer one client's requests until it hangs up.
fn serve_connection(
    stream: &UnixStream,
    factory: &FactoryService,
    receiver: &ReceiverService,
) -> Result<(), ProtocolError> {
    loop {
        let (request, fds) = match protocol::recv_request(stream) {
            Ok(message) => message,
            Err(ProtocolError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let response = match request {
            Request::CreateInstance(req) => {
                fd_passing::close_fds(&fds);
                match factory.create_instance(&req) {
                    Ok(screen) => Response::ScreenCreated { screen },
                    Err(err) => error_response(err),
                }
            }
            Request::Exec(req) => match receiver.exec(&req, &fds) {
                Ok(()) => Response::ExecStarted,
                Err(err) => error_response(err),
            },
            Request::WaitChildExit { screen } => {
                fd_passing::close_fds(&fds);
                match receiver.wait(&screen) {
                    Ok(exit_code) => Response::ChildExited { exit_code },
                    Err(err) => error_response(err),
                }
            }
        };

        protocol::send_response(stream, &response)?;
    }
}

fn error_response(err: crate::error::ServiceError) -> Response {
    log::warn!("request failed: {err}");
    Response::Error {
        kind: err.kind(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CreateInstanceRequest, ErrorKind, ExecRequest};
    use tempfile::tempdir;

    fn start_server(dir: &Path) -> (Arc<Server>, PathBuf) {
        let path = dir.join("control.sock");
        let mut profiles = ProfileStore::default();
        profiles.ensure_default();
        let server = Server::bind(&path, profiles).expect("bind");
        server.start();
        (server, path)
    }

    #[test]
    fn test_create_exec_wait_over_the_socket() {
        let dir = tempdir().expect("tempdir");
        let (_server, path) = start_server(dir.path());
        let stream = UnixStream::connect(&path).expect("connect");

        protocol::send_request(
            &stream,
            &Request::CreateInstance(CreateInstanceRequest::default()),
            &[],
        )
        .expect("send create");
        let screen = match protocol::recv_response(&stream).expect("create response") {
            Response::ScreenCreated { screen } => screen,
            other => panic!("unexpected response: {other:?}"),
        };

        protocol::send_request(
            &stream,
            &Request::Exec(ExecRequest {
                screen: screen.clone(),
                argv: vec!["sh".into(), "-c".into(), "exit 5".into()],
                ..Default::default()
            }),
            &[],
        )
        .expect("send exec");
        assert!(matches!(
            protocol::recv_response(&stream).expect("exec response"),
            Response::ExecStarted
        ));

        protocol::send_request(&stream, &Request::WaitChildExit { screen }, &[])
            .expect("send wait");
        match protocol::recv_response(&stream).expect("wait response") {
            Response::ChildExited { exit_code } => assert_eq!(exit_code, 5),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_errors_come_back_as_error_responses() {
        let dir = tempdir().expect("tempdir");
        let (_server, path) = start_server(dir.path());
        let stream = UnixStream::connect(&path).expect("connect");

        protocol::send_request(
            &stream,
            &Request::CreateInstance(CreateInstanceRequest {
                window_id: Some(42),
                ..Default::default()
            }),
            &[],
        )
        .expect("send");
        match protocol::recv_response(&stream).expect("response") {
            Response::Error { kind, .. } => assert_eq!(kind, ErrorKind::InvalidArgument),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_stale_socket_file_is_replaced() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("control.sock");
        fs::write(&path, b"").expect("stale file");
        let mut profiles = ProfileStore::default();
        profiles.ensure_default();
        let server = Server::bind(&path, profiles).expect("bind over stale file");
        server.start();
        assert!(UnixStream::connect(&path).is_ok());
    }
}

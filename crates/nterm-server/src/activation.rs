//! Single-instance activation
//!
//! The first invocation becomes the server; every later one connects to it,
//! forwards its parsed options, and exits (or blocks on `--wait`). Both
//! paths materialize windows through the same [`InstanceSink`], so the
//! option-to-request translation is written once.

use std::env;
use std::os::unix::io::RawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};

use nterm_app::options::{ENV_PARENT_SCREEN, ENV_SERVER_SOCKET};
use nterm_app::{InitialTab, ProfileStore, TerminalOptions};

use crate::protocol::{self, CreateInstanceRequest, ExecRequest, FdTarget, Request, Response};
use crate::server::Server;

/// Default application id, used for the socket name when `--app-id` is not
/// given.
pub const DEFAULT_APP_ID: &str = "org.nterm.Terminal";

/// Environment entries never forwarded to children: they describe this
/// invocation, not the terminal the user ends up in.
const PRIVATE_ENV: &[&str] = &[
    ENV_SERVER_SOCKET,
    ENV_PARENT_SCREEN,
    "DESKTOP_STARTUP_ID",
    "XDG_ACTIVATION_TOKEN",
    "COLUMNS",
    "LINES",
];

/// Control socket path for an application id.
pub fn socket_path(app_id: Option<&str>) -> PathBuf {
    let name = app_id.unwrap_or(DEFAULT_APP_ID);
    nterm_app::config::runtime_dir().join(format!("{name}.sock"))
}

/// Where create/exec/wait requests go: either over the socket to a running
/// server, or straight into this process's own services.
pub trait InstanceSink {
    fn create(&self, request: &CreateInstanceRequest) -> Result<String>;
    fn exec(&self, request: &ExecRequest, fds: &[RawFd]) -> Result<()>;
    fn wait(&self, screen: &str) -> Result<i32>;
}

/// Client side: one connection to the running server.
pub struct RemoteSink {
    stream: UnixStream,
}

impl RemoteSink {
    pub fn connect(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            stream: UnixStream::connect(path)?,
        })
    }

    fn call(&self, request: &Request, fds: &[RawFd]) -> Result<Response> {
        protocol::send_request(&self.stream, request, fds)?;
        let response = protocol::recv_response(&self.stream)?;
        if let Response::Error { message, .. } = &response {
            bail!("{message}");
        }
        Ok(response)
    }
}

impl InstanceSink for RemoteSink {
    fn create(&self, request: &CreateInstanceRequest) -> Result<String> {
        match self.call(&Request::CreateInstance(request.clone()), &[])? {
            Response::ScreenCreated { screen } => Ok(screen),
            other => Err(anyhow!("unexpected response: {other:?}")),
        }
    }

    fn exec(&self, request: &ExecRequest, fds: &[RawFd]) -> Result<()> {
        match self.call(&Request::Exec(request.clone()), fds)? {
            Response::ExecStarted => Ok(()),
            other => Err(anyhow!("unexpected response: {other:?}")),
        }
    }

    fn wait(&self, screen: &str) -> Result<i32> {
        let request = Request::WaitChildExit {
            screen: screen.into(),
        };
        match self.call(&request, &[])? {
            Response::ChildExited { exit_code } => Ok(exit_code),
            other => Err(anyhow!("unexpected response: {other:?}")),
        }
    }
}

/// Server side: this process owns the services, no socket hop.
pub struct LocalSink {
    server: Arc<Server>,
}

impl InstanceSink for LocalSink {
    fn create(&self, request: &CreateInstanceRequest) -> Result<String> {
        Ok(self.server.factory().create_instance(request)?)
    }

    fn exec(&self, request: &ExecRequest, fds: &[RawFd]) -> Result<()> {
        Ok(self.server.receiver().exec(request, fds)?)
    }

    fn wait(&self, screen: &str) -> Result<i32> {
        Ok(self.server.receiver().wait(screen)?)
    }
}

/// Activate: connect to a running server or become one, materialize the
/// requested windows, and return the process exit code.
pub fn run(mut options: TerminalOptions, profiles: ProfileStore) -> Result<i32> {
    options.ensure_default_window();

    let path = options
        .server_socket
        .clone()
        .unwrap_or_else(|| socket_path(options.app_id.as_deref()));

    match RemoteSink::connect(&path) {
        Ok(sink) => {
            log::debug!("forwarding to server at {}", path.display());
            let outcome = materialize(&options, &sink)?;
            finish(&options, &sink, &path, outcome)
        }
        Err(err) => {
            log::debug!("no server at {}: {err}; becoming the server", path.display());
            let server = Server::bind(&path, profiles)
                .with_context(|| format!("cannot bind control socket {}", path.display()))?;
            server.start();
            let sink = LocalSink { server };
            let outcome = materialize(&options, &sink)?;
            match finish(&options, &sink, &path, outcome) {
                // No --wait: the first instance stays alive to serve later
                // invocations.
                Ok(0) => loop {
                    thread::park();
                },
                other => other,
            }
        }
    }
}

fn finish(
    options: &TerminalOptions,
    sink: &dyn InstanceSink,
    path: &Path,
    outcome: Outcome,
) -> Result<i32> {
    if options.print_environment {
        if let Some(screen) = &outcome.first_screen {
            println!("{ENV_SERVER_SOCKET}={}", path.display());
            println!("{ENV_PARENT_SCREEN}={screen}");
        }
    }
    match &outcome.wait_screen {
        Some(screen) => sink.wait(screen),
        None => Ok(0),
    }
}

pub struct Outcome {
    pub first_screen: Option<String>,
    /// Screen whose child exit the invocation must report (`--wait`).
    pub wait_screen: Option<String>,
}

/// Turn the parsed window/tab tree into create and exec requests.
pub fn materialize(options: &TerminalOptions, sink: &dyn InstanceSink) -> Result<Outcome> {
    let environ = forwarded_environ(options);
    let mut outcome = Outcome {
        first_screen: None,
        wait_screen: None,
    };

    for window in &options.windows {
        let mut window_anchor: Option<String> = None;
        for (index, tab) in window.tabs.iter().enumerate() {
            let mut request = CreateInstanceRequest {
                profile: tab.profile.clone().or_else(|| options.default_profile.clone()),
                title: tab.title.clone().or_else(|| options.default_title.clone()),
                zoom: tab.zoom_set.then_some(tab.zoom),
                active: tab.active,
                ..Default::default()
            };

            match &window_anchor {
                Some(anchor) => request.window_from_screen = Some(anchor.clone()),
                None if window.implicit_first_window && options.parent_screen.is_some() => {
                    // A bare invocation from inside a terminal opens its tab
                    // next to the screen it came from.
                    request.parent_screen = options.parent_screen.clone();
                    request.present_window = Some(true);
                }
                None => {
                    request.startup_token = options.startup_token.clone();
                    request.role = window.role.clone().or_else(|| options.default_role.clone());
                    request.show_menubar =
                        window.menubar_state.or(options.default_menubar_state);
                    request.fullscreen = window.start_fullscreen || options.default_fullscreen;
                    request.maximize = window.start_maximized || options.default_maximized;
                    request.geometry = window
                        .geometry
                        .clone()
                        .or_else(|| options.default_geometry.clone());
                }
            }

            let screen = sink
                .create(&request)
                .with_context(|| format!("cannot create terminal (tab {})", index + 1))?;
            outcome.first_screen.get_or_insert_with(|| screen.clone());
            window_anchor.get_or_insert_with(|| screen.clone());

            let (fd_set, fds) = tab_fd_set(tab);
            let exec = ExecRequest {
                screen: screen.clone(),
                argv: tab.exec_argv.clone().unwrap_or_default(),
                cwd: tab
                    .working_directory
                    .clone()
                    .or_else(|| options.default_working_directory.clone())
                    .or_else(|| env::current_dir().ok()),
                shell: false,
                environ: environ.clone(),
                fd_set,
            };
            sink.exec(&exec, &fds)
                .with_context(|| format!("cannot start command (tab {})", index + 1))?;

            if tab.wait {
                outcome.wait_screen = Some(screen);
            }
        }
    }
    Ok(outcome)
}

/// The descriptor targets and the matching out-of-band descriptor list for
/// one tab, ordered by handle index.
fn tab_fd_set(tab: &InitialTab) -> (Option<Vec<FdTarget>>, Vec<RawFd>) {
    if tab.fds.is_empty() {
        return (None, Vec::new());
    }
    let mut entries: Vec<_> = tab.fds.clone();
    entries.sort_by_key(|pass| pass.handle_index);
    let fd_set = entries
        .iter()
        .map(|pass| FdTarget {
            target_fd: pass.fd,
            handle_index: pass.handle_index,
        })
        .collect();
    let fds = entries.iter().map(|pass| pass.fd as RawFd).collect();
    (Some(fd_set), fds)
}

/// Environment to forward into children.
fn forwarded_environ(options: &TerminalOptions) -> Vec<String> {
    if options.no_environment {
        return Vec::new();
    }
    env::vars()
        .filter(|(key, _)| !PRIVATE_ENV.contains(&key.as_str()))
        .map(|(key, value)| format!("{key}={value}"))
        .collect()
}

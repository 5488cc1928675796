//! Receiver service: command execution and child-exit reporting
//!
//! Handles `Exec` and `WaitChildExit` for one screen. Exec validates the
//! descriptor set, resolves the command (explicit argv, then the profile's
//! custom command, then the user's shell), spawns the child with the
//! descriptors installed, and hands the wait to a reaper thread that
//! records the exit code on the screen's latch.

use std::collections::HashSet;
use std::env;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;

use nterm_app::options::{ENV_PARENT_SCREEN, ENV_SERVER_SOCKET};
use nterm_app::{shell, ProfileStore};
use nterm_core::fd_passing;
use nterm_core::{Child, SpawnConfig};

use crate::error::ServiceError;
use crate::protocol::ExecRequest;
use crate::registry::{Registry, Screen};

pub struct ReceiverService {
    registry: Arc<Registry>,
    profiles: Arc<RwLock<ProfileStore>>,
    /// Injected into children so nested invocations find us.
    socket_path: PathBuf,
}

impl ReceiverService {
    pub fn new(
        registry: Arc<Registry>,
        profiles: Arc<RwLock<ProfileStore>>,
        socket_path: PathBuf,
    ) -> Self {
        Self {
            registry,
            profiles,
            socket_path,
        }
    }

    /// Run a command in the screen. `fds` are the descriptors received with
    /// the request frame; ownership passes to this call, which closes them
    /// once the child holds its own copies.
    pub fn exec(&self, req: &ExecRequest, fds: &[RawFd]) -> Result<(), ServiceError> {
        let result = self.exec_inner(req, fds);
        fd_passing::close_fds(fds);
        result
    }

    fn exec_inner(&self, req: &ExecRequest, fds: &[RawFd]) -> Result<(), ServiceError> {
        let fd_map = validate_fd_set(req, fds)?;

        let screen = self
            .registry
            .screen(&req.screen)
            .ok_or_else(|| ServiceError::NotFound {
                kind: "screen",
                id: req.screen.clone(),
            })?;
        if !screen.is_open() {
            return Err(ServiceError::ScreenClosed);
        }
        if !screen.claim_spawn() {
            return Err(ServiceError::InvalidArgument(format!(
                "screen \"{}\" is already executing a command",
                req.screen
            )));
        }

        let config = match self.build_spawn_config(req, &screen, fd_map) {
            Ok(config) => config,
            Err(err) => {
                screen.release_spawn();
                return Err(err);
            }
        };

        let child = match Child::spawn(&config) {
            Ok(child) => child,
            Err(err) => {
                screen.release_spawn();
                return Err(err.into());
            }
        };
        log::info!(
            "screen {}: started \"{}\" (pid {})",
            screen.uuid,
            config.argv.first().map(String::as_str).unwrap_or_default(),
            child.pid()
        );

        spawn_reaper(Arc::clone(&screen), child);
        Ok(())
    }

    /// Block until the screen's child exits and return its exit code.
    pub fn wait(&self, screen_uuid: &str) -> Result<i32, ServiceError> {
        let screen = self
            .registry
            .screen(screen_uuid)
            .ok_or_else(|| ServiceError::NotFound {
                kind: "screen",
                id: screen_uuid.into(),
            })?;
        if let Some(code) = screen.exit.get() {
            return Ok(code);
        }
        if !screen.is_open() {
            return Err(ServiceError::ScreenClosed);
        }
        Ok(screen.exit.wait())
    }

    fn build_spawn_config(
        &self,
        req: &ExecRequest,
        screen: &Screen,
        fd_map: Vec<(RawFd, RawFd)>,
    ) -> Result<SpawnConfig, ServiceError> {
        let profiles = self.profiles.read();
        let profile = profiles.get(&screen.profile);

        let mut login_shell = req.shell;
        let argv = if !req.argv.is_empty() {
            req.argv.clone()
        } else if let Some(command) = profile.and_then(|p| p.custom_command.as_deref()) {
            shell::split(command)
                .map_err(|err| ServiceError::InvalidArgument(format!("profile command: {err}")))?
        } else {
            login_shell |= profile.map(|p| p.login_shell).unwrap_or(false);
            vec![user_shell()]
        };

        let cwd = req
            .cwd
            .clone()
            .or_else(|| profile.and_then(|p| p.working_directory.clone()));

        let mut env: Vec<(String, String)> = req
            .environ
            .iter()
            .filter_map(|entry| {
                entry
                    .split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect();
        env.retain(|(k, _)| k != ENV_SERVER_SOCKET && k != ENV_PARENT_SCREEN);
        env.push((
            ENV_SERVER_SOCKET.into(),
            self.socket_path.to_string_lossy().into_owned(),
        ));
        env.push((ENV_PARENT_SCREEN.into(), screen.uuid.clone()));

        Ok(SpawnConfig {
            argv,
            cwd,
            env,
            login_shell,
            fd_map,
        })
    }
}

/// Cross-check the request's descriptor targets against the descriptors
/// actually received, producing the (source, target) map for the child.
fn validate_fd_set(req: &ExecRequest, fds: &[RawFd]) -> Result<Vec<(RawFd, RawFd)>, ServiceError> {
    let fd_set = match (&req.fd_set, fds.is_empty()) {
        (None, true) => return Ok(Vec::new()),
        (None, false) | (Some(_), true) => {
            return Err(ServiceError::InvalidArgument(
                "descriptor list does not match the request".into(),
            ));
        }
        (Some(fd_set), false) => fd_set,
    };
    if fd_set.len() != fds.len() {
        return Err(ServiceError::InvalidArgument(
            "descriptor list does not match the request".into(),
        ));
    }

    let mut targets = HashSet::new();
    let mut fd_map = Vec::with_capacity(fd_set.len());
    for target in fd_set {
        if (0..=2).contains(&target.target_fd) {
            return Err(ServiceError::InvalidArgument(format!(
                "cannot pass FD {}",
                target.target_fd
            )));
        }
        if !targets.insert(target.target_fd) {
            return Err(ServiceError::InvalidArgument(format!(
                "cannot pass FD {} twice",
                target.target_fd
            )));
        }
        let source = *fds.get(target.handle_index).ok_or_else(|| {
            ServiceError::InvalidArgument(format!(
                "descriptor index {} out of range",
                target.handle_index
            ))
        })?;
        fd_map.push((source, target.target_fd));
    }
    Ok(fd_map)
}

/// Wait for the child off-thread and record its exit code.
fn spawn_reaper(screen: Arc<Screen>, mut child: Child) {
    thread::Builder::new()
        .name(format!("reap-{}", child.pid()))
        .spawn(move || match child.wait() {
            Ok(code) => {
                log::info!("screen {}: child exited with {code}", screen.uuid);
                screen.exit.set(code);
            }
            Err(err) => {
                log::warn!("screen {}: wait failed: {err}", screen.uuid);
                screen.exit.set(127);
            }
        })
        .ok();
}

/// The invoking user's shell.
fn user_shell() -> String {
    env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".into())
}

//! Child process spawning for screens
//!
//! A screen's child process is a plain exec'd command (PTY allocation and
//! terminal emulation live outside this codebase). What this module owns is
//! the part remote exec requests need: working directory, environment
//! overrides, login-shell argv0 dressing, and installing inherited file
//! descriptors at their requested target numbers before exec.

use std::io;
use std::os::unix::io::RawFd;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;

/// Most descriptor mappings one child may receive. The wire protocol caps
/// descriptors per frame at this same bound, and `install_fds` sizes its
/// fixed lift buffer with it.
pub const FD_MAP_MAX: usize = 64;

/// Errors that can occur while launching or reaping a child.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("empty command")]
    EmptyCommand,

    #[error("too many descriptor mappings: {0} (max: {FD_MAP_MAX})")]
    FdMapOverflow(usize),

    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Everything needed to launch one screen's child process.
#[derive(Debug, Clone, Default)]
pub struct SpawnConfig {
    /// Command and arguments. Must be non-empty.
    pub argv: Vec<String>,
    /// Working directory (None = inherit).
    pub cwd: Option<PathBuf>,
    /// Environment entries applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Run as a login shell: argv0 becomes "-basename".
    pub login_shell: bool,
    /// Descriptors to install in the child as (source, target) pairs.
    /// Targets are trusted to exclude 0/1/2; callers validate.
    pub fd_map: Vec<(RawFd, RawFd)>,
}

/// A spawned child process with cached exit status.
pub struct Child {
    inner: std::process::Child,
    exit_status: Option<i32>,
}

impl Child {
    /// Launch a child per `config`.
    pub fn spawn(config: &SpawnConfig) -> Result<Self, SpawnError> {
        let program = config.argv.first().ok_or(SpawnError::EmptyCommand)?;
        if config.fd_map.len() > FD_MAP_MAX {
            return Err(SpawnError::FdMapOverflow(config.fd_map.len()));
        }

        let mut command = Command::new(program);
        command.args(&config.argv[1..]);

        if let Some(cwd) = &config.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &config.env {
            command.env(key, value);
        }

        if config.login_shell {
            let base = program.rsplit('/').next().unwrap_or(program);
            command.arg0(format!("-{base}"));
        }

        let fd_map = config.fd_map.clone();
        if !fd_map.is_empty() {
            unsafe {
                command.pre_exec(move || install_fds(&fd_map));
            }
        }

        let inner = command
            .spawn()
            .map_err(|e| SpawnError::Spawn(format!("{program}: {e}")))?;

        log::debug!("spawned child pid {} ({})", inner.id(), program);

        Ok(Self {
            inner,
            exit_status: None,
        })
    }

    /// Child process ID.
    pub fn pid(&self) -> u32 {
        self.inner.id()
    }

    /// Check for exit without blocking. Returns the exit code if finished.
    pub fn try_wait(&mut self) -> Result<Option<i32>, SpawnError> {
        if let Some(code) = self.exit_status {
            return Ok(Some(code));
        }
        match self.inner.try_wait()? {
            Some(status) => {
                let code = exit_code(status);
                self.exit_status = Some(code);
                Ok(Some(code))
            }
            None => Ok(None),
        }
    }

    /// Block until the child exits and return its exit code.
    pub fn wait(&mut self) -> Result<i32, SpawnError> {
        if let Some(code) = self.exit_status {
            return Ok(code);
        }
        let status = self.inner.wait()?;
        let code = exit_code(status);
        self.exit_status = Some(code);
        Ok(code)
    }

    /// Send a signal to the child, ignoring failures for already-dead pids.
    pub fn send_signal(&self, signal: i32) {
        unsafe {
            libc::kill(self.inner.id() as libc::pid_t, signal);
        }
    }
}

/// Map an exit status to the shell convention: WEXITSTATUS, or 128 + signal.
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

/// Install inherited descriptors at their target numbers.
///
/// Runs between fork and exec, so only async-signal-safe calls are allowed.
/// Sources are first lifted above all targets with F_DUPFD so a dup2 into a
/// target can never clobber a source still waiting to be installed.
fn install_fds(fd_map: &[(RawFd, RawFd)]) -> io::Result<()> {
    let ceiling = fd_map
        .iter()
        .map(|&(s, t)| s.max(t))
        .max()
        .unwrap_or(2)
        + 1;

    let mut lifted = [0 as RawFd; FD_MAP_MAX];
    if fd_map.len() > lifted.len() {
        return Err(io::Error::from_raw_os_error(libc::EINVAL));
    }

    for (i, &(source, _)) in fd_map.iter().enumerate() {
        let dup = unsafe { libc::fcntl(source, libc::F_DUPFD, ceiling) };
        if dup < 0 {
            return Err(io::Error::last_os_error());
        }
        lifted[i] = dup;
    }

    for (i, &(_, target)) in fd_map.iter().enumerate() {
        if unsafe { libc::dup2(lifted[i], target) } < 0 {
            return Err(io::Error::last_os_error());
        }
        // dup2 leaves CLOEXEC clear on the target; the lifted copy goes away.
        unsafe { libc::close(lifted[i]) };
    }

    Ok(())
}

//! Command-line option parsing
//!
//! Translates argv into the initial window/tab tree, order-preservingly:
//! `--window` and `--tab` open scopes, and per-tab options apply to the most
//! recently opened tab, per-window options to the most recently opened
//! window. Per-window options given before any window exists become defaults
//! that the first window picks up when it is created (lazily, via
//! `ensure_top_window`); `--title`, `--working-directory` and a bare
//! `--profile` given that early become invocation-wide defaults instead.
//!
//! The `-x`/`--execute`/`--` remainder is split off before the scan, since a
//! linear option walk cannot express "consume the rest of argv verbatim".

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::profile::{resolve_or_default, ProfileError, ResolveProfile};
use crate::session_config::{SessionConfig, SessionConfigError, COMPAT_VERSION};
use crate::shell;

/// Option parse errors
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("{0}")]
    BadValue(String),

    #[error("unknown option \"{0}\"")]
    UnknownOption(String),

    #[error("option \"{0}\" cannot be used together with \"{1}\"")]
    ExclusiveOptions(&'static str, &'static str),

    #[error("two roles given for one window")]
    TwoRoles,

    #[error("invalid session config file \"{path}\": {message}")]
    InvalidConfigFile { path: String, message: String },

    #[error("incompatible session config file \"{path}\": version {found} (supported: {supported})")]
    IncompatibleConfigFile {
        path: String,
        found: u32,
        supported: u32,
    },

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// A file descriptor to be inherited by a tab's child process.
///
/// `handle_index` is the position of the descriptor in the out-of-band
/// descriptor list that accompanies the create/exec request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassFd {
    pub fd: i32,
    pub handle_index: usize,
}

/// One tab to create, as described on the command line.
#[derive(Debug, Clone, Default)]
pub struct InitialTab {
    /// Profile UUID, already resolved. None means "use the default".
    pub profile: Option<String>,
    /// Command to run instead of the profile's command or the user's shell.
    pub exec_argv: Option<Vec<String>>,
    pub title: Option<String>,
    pub working_directory: Option<PathBuf>,
    pub zoom: f64,
    pub zoom_set: bool,
    /// Make this the focused tab of its window.
    pub active: bool,
    /// Block the invoking process until this tab's child exits.
    pub wait: bool,
    /// Descriptors to pass to the child.
    pub fds: Vec<PassFd>,
}

impl InitialTab {
    fn new(profile: Option<String>) -> Self {
        Self {
            profile,
            zoom: 1.0,
            ..Default::default()
        }
    }
}

/// One window to create, holding at least one tab.
#[derive(Debug, Clone, Default)]
pub struct InitialWindow {
    pub tabs: Vec<InitialTab>,
    pub geometry: Option<String>,
    pub role: Option<String>,
    /// Menubar override: Some(state) forces the menubar on or off.
    pub menubar_state: Option<bool>,
    pub start_fullscreen: bool,
    pub start_maximized: bool,
    /// Created implicitly because a per-tab option appeared before any
    /// `--window`/`--tab` flag.
    pub implicit_first_window: bool,
}

impl InitialWindow {
    fn with_tab(tab: InitialTab) -> Self {
        Self {
            tabs: vec![tab],
            ..Default::default()
        }
    }
}

/// The complete parse result, consumed once by window materialization.
#[derive(Debug, Clone, Default)]
pub struct TerminalOptions {
    pub windows: Vec<InitialWindow>,

    // Invocation-wide defaults applied to windows/tabs lacking their own value.
    pub default_profile: Option<String>,
    pub default_title: Option<String>,
    pub default_working_directory: Option<PathBuf>,
    pub default_geometry: Option<String>,
    pub default_role: Option<String>,
    pub default_menubar_state: Option<bool>,
    pub default_fullscreen: bool,
    pub default_maximized: bool,

    // Process-wide flags.
    pub execute_mode: bool,
    pub print_environment: bool,
    pub no_environment: bool,
    pub show_preferences: bool,
    pub show_version: bool,
    /// Set iff exactly one tab carries `wait`.
    pub wait: bool,
    /// Negative = quiet, zero = normal, positive = verbose.
    pub verbosity: i8,
    pub app_id: Option<String>,

    // Resolved from the environment, not from argv.
    pub startup_token: Option<String>,
    pub server_socket: Option<PathBuf>,
    pub parent_screen: Option<String>,
}

/// Environment variable carrying the running server's control socket path,
/// set on every spawned child for nested invocations.
pub const ENV_SERVER_SOCKET: &str = "NTERM_SERVER_SOCKET";

/// Environment variable carrying the screen UUID a nested invocation was
/// spawned from.
pub const ENV_PARENT_SCREEN: &str = "NTERM_PARENT_SCREEN";

impl TerminalOptions {
    /// Parse argv (including the program name at index 0).
    pub fn parse(argv: &[String], resolver: &dyn ResolveProfile) -> Result<Self, OptionsError> {
        let args = argv.get(1..).unwrap_or_default();

        // Pre-scan: the first of -x/--execute/-- consumes the rest verbatim.
        let mut remainder: Option<&[String]> = None;
        let mut head = args;
        for (i, arg) in args.iter().enumerate() {
            if arg == "--" || arg == "-x" || arg == "--execute" {
                let rest = &args[i + 1..];
                if rest.is_empty() {
                    return Err(OptionsError::BadValue(format!(
                        "option \"{arg}\" requires a command to run"
                    )));
                }
                remainder = Some(rest);
                head = &args[..i];
                break;
            }
        }

        let mut parser = Parser {
            resolver,
            result: TerminalOptions::default(),
            wait_count: 0,
        };

        parser.scan(head)?;

        if let Some(rest) = remainder {
            parser.set_trailing_command(rest.to_vec())?;
        }

        if parser.wait_count > 1 {
            return Err(OptionsError::BadValue("Can only use --wait once".into()));
        }

        let mut result = parser.result;
        result.wait = parser.wait_count == 1;
        Ok(result)
    }

    /// An invocation with no window/tab flags still opens one window; this
    /// inserts the implicit default window before materialization.
    pub fn ensure_default_window(&mut self) {
        if self.windows.is_empty() {
            let mut window = InitialWindow::with_tab(InitialTab::new(None));
            window.implicit_first_window = true;
            window.geometry = self.default_geometry.clone();
            window.role = self.default_role.clone();
            window.menubar_state = self.default_menubar_state;
            window.start_fullscreen = self.default_fullscreen;
            window.start_maximized = self.default_maximized;
            self.windows.push(window);
        }
    }

    /// Pick up startup/activation tokens and nested-terminal forwarding
    /// variables from the process environment.
    pub fn load_environment(&mut self) {
        self.startup_token = non_empty_env("XDG_ACTIVATION_TOKEN")
            .or_else(|| non_empty_env("DESKTOP_STARTUP_ID"));
        self.server_socket = non_empty_env(ENV_SERVER_SOCKET).map(PathBuf::from);
        self.parent_screen = non_empty_env(ENV_PARENT_SCREEN);
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

struct Parser<'a> {
    resolver: &'a dyn ResolveProfile,
    result: TerminalOptions,
    wait_count: u32,
}

impl Parser<'_> {
    fn scan(&mut self, args: &[String]) -> Result<(), OptionsError> {
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            let (name, inline) = split_inline(arg);

            // Closure-free value lookup: inline `--opt=value` wins, else the
            // next argument is consumed.
            macro_rules! value {
                () => {
                    match inline {
                        Some(v) => v.to_string(),
                        None => {
                            i += 1;
                            args.get(i)
                                .cloned()
                                .ok_or_else(|| {
                                    OptionsError::BadValue(format!(
                                        "option \"{name}\" requires a value"
                                    ))
                                })?
                        }
                    }
                };
            }

            match name {
                "--window" => {
                    let profile = self.resolve_soft(inline)?;
                    self.add_window(profile, false)?;
                }
                "--tab" => {
                    let profile = self.resolve_soft(inline)?;
                    self.add_tab(profile)?;
                }
                "--profile" => {
                    let value = value!();
                    self.opt_profile(&value)?;
                }
                "--profile-id" => {
                    let value = value!();
                    // Machine-generated references never fall back.
                    let uuid = self.resolver.resolve_id(&value)?;
                    self.current_tab().profile = Some(uuid);
                }
                "--title" | "-t" => {
                    let value = value!();
                    if self.result.windows.is_empty() {
                        self.result.default_title = Some(value);
                    } else {
                        self.current_tab().title = Some(value);
                    }
                }
                "--working-directory" => {
                    let value = value!();
                    if self.result.windows.is_empty() {
                        self.result.default_working_directory = Some(value.into());
                    } else {
                        self.current_tab().working_directory = Some(value.into());
                    }
                }
                "--zoom" => {
                    let value = value!();
                    self.opt_zoom(&value)?;
                }
                "--fd" => {
                    let value = value!();
                    self.opt_fd(&value)?;
                }
                "--wait" => {
                    self.reject_inline(name, inline)?;
                    self.current_tab().wait = true;
                    self.wait_count += 1;
                }
                "--active" => {
                    self.reject_inline(name, inline)?;
                    self.current_tab().active = true;
                }
                "--command" | "-e" => {
                    let value = value!();
                    self.opt_command(&value)?;
                }
                "--geometry" => {
                    let value = value!();
                    match self.current_window() {
                        Some(window) => window.geometry = Some(value),
                        None => self.result.default_geometry = Some(value),
                    }
                }
                "--role" => {
                    let value = value!();
                    self.opt_role(value)?;
                }
                "--show-menubar" => {
                    self.reject_inline(name, inline)?;
                    self.opt_menubar(true);
                }
                "--hide-menubar" => {
                    self.reject_inline(name, inline)?;
                    self.opt_menubar(false);
                }
                "--maximize" => {
                    self.reject_inline(name, inline)?;
                    match self.current_window() {
                        Some(window) => window.start_maximized = true,
                        None => self.result.default_maximized = true,
                    }
                }
                "--full-screen" => {
                    self.reject_inline(name, inline)?;
                    match self.current_window() {
                        Some(window) => window.start_fullscreen = true,
                        None => self.result.default_fullscreen = true,
                    }
                }
                "--app-id" => {
                    let value = value!();
                    if !valid_app_id(&value) {
                        return Err(OptionsError::BadValue(format!(
                            "\"{value}\" is not a valid application ID"
                        )));
                    }
                    self.result.app_id = Some(value);
                }
                "--load-config" => {
                    let value = value!();
                    self.load_config(Path::new(&value))?;
                }
                "--print-environment" | "-p" => {
                    self.reject_inline(name, inline)?;
                    self.result.print_environment = true;
                }
                "--no-environment" => {
                    self.reject_inline(name, inline)?;
                    self.result.no_environment = true;
                }
                "--preferences" => {
                    self.reject_inline(name, inline)?;
                    self.result.show_preferences = true;
                }
                "--version" => {
                    self.reject_inline(name, inline)?;
                    self.result.show_version = true;
                }
                "--verbose" | "-v" => {
                    self.reject_inline(name, inline)?;
                    self.result.verbosity = self.result.verbosity.saturating_add(1);
                }
                "--quiet" | "-q" => {
                    self.reject_inline(name, inline)?;
                    self.result.verbosity = -1;
                }
                other => return Err(OptionsError::UnknownOption(other.to_string())),
            }

            i += 1;
        }

        Ok(())
    }

    /// Resolve an optional profile reference with the CLI fallback policy.
    fn resolve_soft(&self, reference: Option<&str>) -> Result<Option<String>, OptionsError> {
        match reference {
            None => Ok(None),
            Some(r) => Ok(Some(resolve_or_default(self.resolver, Some(r))?)),
        }
    }

    /// Append a window holding one tab. The first window picks up the
    /// window-level defaults collected so far.
    fn add_window(&mut self, profile: Option<String>, implicit: bool) -> Result<(), OptionsError> {
        let mut window = InitialWindow::with_tab(InitialTab::new(profile));
        window.implicit_first_window = implicit;

        if self.result.windows.is_empty() {
            window.geometry = self.result.default_geometry.clone();
            window.role = self.result.default_role.clone();
            window.menubar_state = self.result.default_menubar_state;
            window.start_fullscreen = self.result.default_fullscreen;
            window.start_maximized = self.result.default_maximized;
        }

        self.result.windows.push(window);
        Ok(())
    }

    /// Append a tab to the current window, creating the first window if
    /// none exists yet.
    fn add_tab(&mut self, profile: Option<String>) -> Result<(), OptionsError> {
        if self.result.windows.is_empty() {
            return self.add_window(profile, true);
        }
        let window = self.result.windows.last_mut().unwrap();
        window.tabs.push(InitialTab::new(profile));
        Ok(())
    }

    /// Make sure a window and tab exist for a per-tab option to land on.
    fn ensure_top_window(&mut self) {
        if self.result.windows.is_empty() {
            // Cannot fail: add_window only errors through profile resolution.
            let _ = self.add_window(None, true);
        }
    }

    fn current_tab(&mut self) -> &mut InitialTab {
        self.ensure_top_window();
        self.result
            .windows
            .last_mut()
            .unwrap()
            .tabs
            .last_mut()
            .unwrap()
    }

    fn current_window(&mut self) -> Option<&mut InitialWindow> {
        self.result.windows.last_mut()
    }

    fn opt_profile(&mut self, value: &str) -> Result<(), OptionsError> {
        let uuid = resolve_or_default(self.resolver, Some(value))?;
        if self.result.windows.is_empty() {
            // Before any window exists this sets the session-wide default.
            self.result.default_profile = Some(uuid);
        } else {
            self.current_tab().profile = Some(uuid);
        }
        Ok(())
    }

    fn opt_zoom(&mut self, value: &str) -> Result<(), OptionsError> {
        let zoom: f64 = value
            .parse()
            .map_err(|_| OptionsError::BadValue(format!("\"{value}\" is not a valid zoom factor")))?;

        let (clamped, was_clamped) = nterm_core::clamp_zoom(zoom);
        if was_clamped {
            log::warn!("zoom factor {zoom} out of range, using {clamped}");
        }

        let tab = self.current_tab();
        tab.zoom = clamped;
        tab.zoom_set = true;
        Ok(())
    }

    fn opt_fd(&mut self, value: &str) -> Result<(), OptionsError> {
        let fd: i32 = value
            .parse()
            .map_err(|_| OptionsError::BadValue(format!("\"{value}\" is not a valid FD number")))?;

        if (0..=2).contains(&fd) {
            return Err(OptionsError::BadValue(format!("Cannot pass FD {fd}")));
        }
        let already_passed = self
            .result
            .windows
            .iter()
            .flat_map(|w| &w.tabs)
            .flat_map(|t| &t.fds)
            .any(|p| p.fd == fd);
        if already_passed {
            return Err(OptionsError::BadValue(format!("Cannot pass FD {fd} twice")));
        }

        let tab = self.current_tab();
        let handle_index = tab.fds.len();
        tab.fds.push(PassFd { fd, handle_index });
        Ok(())
    }

    fn opt_command(&mut self, value: &str) -> Result<(), OptionsError> {
        log::warn!("option -e/--command is deprecated, use -- to terminate the options instead");

        let argv = shell::split(value)
            .map_err(|e| OptionsError::BadValue(format!("cannot parse command \"{value}\": {e}")))?;

        let tab = self.current_tab();
        if tab.exec_argv.is_some() {
            return Err(OptionsError::BadValue(
                "option \"-e\" given twice for the same tab".into(),
            ));
        }
        tab.exec_argv = Some(argv);
        self.result.execute_mode = true;
        Ok(())
    }

    fn opt_role(&mut self, value: String) -> Result<(), OptionsError> {
        match self.current_window() {
            Some(window) => {
                if window.role.is_some() {
                    return Err(OptionsError::TwoRoles);
                }
                window.role = Some(value);
            }
            None => {
                if self.result.default_role.is_some() {
                    return Err(OptionsError::TwoRoles);
                }
                self.result.default_role = Some(value);
            }
        }
        Ok(())
    }

    fn opt_menubar(&mut self, visible: bool) {
        match self.current_window() {
            Some(window) => {
                if window.menubar_state.is_some() {
                    log::warn!("menubar already set for this window, overriding");
                }
                window.menubar_state = Some(visible);
            }
            None => {
                if self.result.default_menubar_state.is_some() {
                    log::warn!("menubar already set, overriding");
                }
                self.result.default_menubar_state = Some(visible);
            }
        }
    }

    /// Attach the `--`/`-x` remainder to the tab current at end of scan.
    fn set_trailing_command(&mut self, argv: Vec<String>) -> Result<(), OptionsError> {
        let tab = self.current_tab();
        if tab.exec_argv.is_some() {
            return Err(OptionsError::ExclusiveOptions("--command", "--"));
        }
        tab.exec_argv = Some(argv);
        self.result.execute_mode = true;
        Ok(())
    }

    /// Merge a saved session config behind any windows already on the
    /// command line.
    fn load_config(&mut self, path: &Path) -> Result<(), OptionsError> {
        let display = path.display().to_string();
        let config = SessionConfig::load(path).map_err(|err| match err {
            SessionConfigError::Incompatible { found, supported } => {
                OptionsError::IncompatibleConfigFile {
                    path: display.clone(),
                    found,
                    supported,
                }
            }
            other => OptionsError::InvalidConfigFile {
                path: display.clone(),
                message: other.to_string(),
            },
        })?;
        debug_assert!(config.compat_version <= COMPAT_VERSION);

        for window_config in config.windows {
            let mut window = InitialWindow {
                geometry: window_config.geometry,
                role: window_config.role,
                menubar_state: window_config.menubar_visible,
                start_fullscreen: window_config.fullscreen,
                start_maximized: window_config.maximized,
                ..Default::default()
            };

            for tab_config in window_config.tabs {
                let profile = match &tab_config.profile_id {
                    // Saved profile ids are expected to be valid; no fallback.
                    Some(id) => Some(self.resolver.resolve_id(id)?),
                    None => None,
                };
                let exec_argv = match &tab_config.command {
                    Some(command) => Some(shell::split(command).map_err(|e| {
                        OptionsError::InvalidConfigFile {
                            path: display.clone(),
                            message: format!("bad command \"{command}\": {e}"),
                        }
                    })?),
                    None => None,
                };

                let mut tab = InitialTab::new(profile);
                tab.exec_argv = exec_argv;
                tab.title = tab_config.title;
                tab.working_directory = tab_config.working_directory;
                tab.active = tab_config.active;
                if let Some(zoom) = tab_config.zoom {
                    let (clamped, was_clamped) = nterm_core::clamp_zoom(zoom);
                    if was_clamped {
                        log::warn!("zoom factor {zoom} in \"{display}\" out of range, using {clamped}");
                    }
                    tab.zoom = clamped;
                    tab.zoom_set = true;
                }
                window.tabs.push(tab);
            }

            self.result.windows.push(window);
        }

        Ok(())
    }

    fn reject_inline(&self, name: &str, inline: Option<&str>) -> Result<(), OptionsError> {
        if inline.is_some() {
            return Err(OptionsError::BadValue(format!(
                "option \"{name}\" does not take a value"
            )));
        }
        Ok(())
    }
}

/// Split `--opt=value` into name and inline value.
fn split_inline(arg: &str) -> (&str, Option<&str>) {
    if arg.starts_with("--") {
        if let Some(eq) = arg.find('=') {
            return (&arg[..eq], Some(&arg[eq + 1..]));
        }
    }
    (arg, None)
}

/// Application id validation: at least two dot-separated segments, each
/// starting with a letter or underscore and containing only
/// alphanumerics, '-' and '_'.
fn valid_app_id(id: &str) -> bool {
    if id.len() > 255 {
        return false;
    }
    let segments: Vec<&str> = id.split('.').collect();
    if segments.len() < 2 {
        return false;
    }
    segments.iter().all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileStore;

    fn store() -> ProfileStore {
        let mut store = ProfileStore::default();
        store.create("Work");
        store.create("Play");
        store.ensure_default();
        store
    }

    fn parse(args: &[&str]) -> Result<TerminalOptions, OptionsError> {
        let argv: Vec<String> = std::iter::once("nterm")
            .chain(args.iter().copied())
            .map(String::from)
            .collect();
        TerminalOptions::parse(&argv, &store())
    }

    #[test]
    fn test_empty_argv_yields_no_windows() {
        let options = parse(&[]).unwrap();
        assert!(options.windows.is_empty());
        assert!(!options.wait);
    }

    #[test]
    fn test_window_and_tab_order_preserved() {
        let options =
            parse(&["--window", "--tab", "--tab", "--window", "--tab"]).unwrap();
        assert_eq!(options.windows.len(), 2);
        assert_eq!(options.windows[0].tabs.len(), 3);
        assert_eq!(options.windows[1].tabs.len(), 2);
    }

    #[test]
    fn test_title_applies_to_most_recent_tab() {
        let options = parse(&["--window", "--tab", "--title", "Foo"]).unwrap();
        assert_eq!(options.windows.len(), 1);
        let tabs = &options.windows[0].tabs;
        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs[0].title, None);
        assert_eq!(tabs[1].title.as_deref(), Some("Foo"));
    }

    #[test]
    fn test_title_before_windows_becomes_default() {
        let options = parse(&["--title", "Foo", "--window"]).unwrap();
        assert_eq!(options.default_title.as_deref(), Some("Foo"));
        assert_eq!(options.windows[0].tabs[0].title, None);
    }

    #[test]
    fn test_dash_e_shell_parses() {
        let options = parse(&["-e", "ls -la"]).unwrap();
        assert_eq!(options.windows.len(), 1);
        assert_eq!(
            options.windows[0].tabs[0].exec_argv.as_deref(),
            Some(&["ls".to_string(), "-la".to_string()][..])
        );
        assert!(options.execute_mode);
    }

    #[test]
    fn test_dashdash_remainder_is_literal() {
        let options = parse(&["--window", "--", "sh", "-c", "echo 'a b'"]).unwrap();
        assert_eq!(
            options.windows[0].tabs[0].exec_argv.as_deref(),
            Some(&["sh".to_string(), "-c".to_string(), "echo 'a b'".to_string()][..])
        );
    }

    #[test]
    fn test_dash_x_consumes_remaining_options() {
        let options = parse(&["-x", "vim", "--window"]).unwrap();
        // "--window" after -x is part of the command, not an option.
        assert_eq!(options.windows.len(), 1);
        assert_eq!(
            options.windows[0].tabs[0].exec_argv.as_deref(),
            Some(&["vim".to_string(), "--window".to_string()][..])
        );
    }

    #[test]
    fn test_execute_without_command_fails() {
        assert!(matches!(parse(&["-x"]), Err(OptionsError::BadValue(_))));
        assert!(matches!(parse(&["--"]), Err(OptionsError::BadValue(_))));
    }

    #[test]
    fn test_command_and_dashdash_conflict() {
        assert!(matches!(
            parse(&["-e", "ls", "--", "vim"]),
            Err(OptionsError::ExclusiveOptions("--command", "--"))
        ));
    }

    #[test]
    fn test_wait_twice_fails() {
        let err = parse(&["--tab", "--wait", "--tab", "--wait"]).unwrap_err();
        match err {
            OptionsError::BadValue(msg) => assert_eq!(msg, "Can only use --wait once"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wait_once_sets_flag() {
        let options = parse(&["--wait"]).unwrap();
        assert!(options.wait);
        assert!(options.windows[0].tabs[0].wait);
        assert!(options.windows[0].implicit_first_window);
    }

    #[test]
    fn test_fd_stdio_rejected() {
        for fd in ["0", "1", "2"] {
            assert!(matches!(
                parse(&["--fd", fd]),
                Err(OptionsError::BadValue(_))
            ));
        }
    }

    #[test]
    fn test_fd_twice_rejected() {
        let err = parse(&["--fd", "3", "--fd", "3"]).unwrap_err();
        match err {
            OptionsError::BadValue(msg) => assert_eq!(msg, "Cannot pass FD 3 twice"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fd_handle_indices_count_per_tab() {
        let options = parse(&["--fd", "3", "--tab", "--fd", "5", "--fd", "7"]).unwrap();
        let tabs = &options.windows[0].tabs;
        assert_eq!(tabs[0].fds, vec![PassFd { fd: 3, handle_index: 0 }]);
        assert_eq!(
            tabs[1].fds,
            vec![
                PassFd { fd: 5, handle_index: 0 },
                PassFd { fd: 7, handle_index: 1 }
            ]
        );
    }

    #[test]
    fn test_zoom_clamped_not_failed() {
        let options = parse(&["--zoom", "0.05"]).unwrap();
        let tab = &options.windows[0].tabs[0];
        assert!(tab.zoom_set);
        assert_eq!(tab.zoom, nterm_core::ZOOM_MIN);

        let options = parse(&["--zoom", "50"]).unwrap();
        assert_eq!(options.windows[0].tabs[0].zoom, nterm_core::ZOOM_MAX);
    }

    #[test]
    fn test_zoom_garbage_rejected() {
        assert!(matches!(
            parse(&["--zoom", "huge"]),
            Err(OptionsError::BadValue(_))
        ));
    }

    #[test]
    fn test_role_twice_same_window_fails() {
        assert!(matches!(
            parse(&["--window", "--role", "a", "--role", "b"]),
            Err(OptionsError::TwoRoles)
        ));
    }

    #[test]
    fn test_role_on_two_windows_is_fine() {
        let options = parse(&["--window", "--role", "a", "--window", "--role", "b"]).unwrap();
        assert_eq!(options.windows[0].role.as_deref(), Some("a"));
        assert_eq!(options.windows[1].role.as_deref(), Some("b"));
    }

    #[test]
    fn test_menubar_flip_overrides_with_warning_only() {
        let options = parse(&["--window", "--show-menubar", "--hide-menubar"]).unwrap();
        assert_eq!(options.windows[0].menubar_state, Some(false));
    }

    #[test]
    fn test_window_defaults_apply_to_first_window_only() {
        let options = parse(&["--geometry", "80x24+0+0", "--maximize", "--window", "--window"])
            .unwrap();
        assert_eq!(options.windows[0].geometry.as_deref(), Some("80x24+0+0"));
        assert!(options.windows[0].start_maximized);
        assert_eq!(options.windows[1].geometry, None);
        assert!(!options.windows[1].start_maximized);
    }

    #[test]
    fn test_bare_profile_sets_session_default() {
        let resolver = store();
        let expected = resolver.resolve(Some("Play")).unwrap();
        let argv: Vec<String> = ["nterm", "--profile", "Play", "--window"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let options = TerminalOptions::parse(&argv, &resolver).unwrap();
        assert_eq!(options.default_profile.as_deref(), Some(expected.as_str()));
        assert_eq!(options.windows[0].tabs[0].profile, None);
    }

    #[test]
    fn test_profile_on_tab_resolves() {
        let resolver = store();
        let expected = resolver.resolve(Some("Work")).unwrap();
        let argv: Vec<String> = ["nterm", "--tab", "--profile", "Work"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let options = TerminalOptions::parse(&argv, &resolver).unwrap();
        assert_eq!(
            options.windows[0].tabs[0].profile.as_deref(),
            Some(expected.as_str())
        );
    }

    #[test]
    fn test_unknown_profile_falls_back_to_default() {
        let resolver = store();
        let argv: Vec<String> = ["nterm", "--tab", "--profile", "Nope"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let options = TerminalOptions::parse(&argv, &resolver).unwrap();
        assert_eq!(
            options.windows[0].tabs[0].profile.as_deref(),
            Some(resolver.default_profile.as_str())
        );
    }

    #[test]
    fn test_profile_id_never_falls_back() {
        assert!(matches!(
            parse(&["--tab", "--profile-id", "0000-does-not-exist"]),
            Err(OptionsError::Profile(ProfileError::NotFound(_)))
        ));
    }

    #[test]
    fn test_window_with_inline_profile() {
        let resolver = store();
        let expected = resolver.resolve(Some("Work")).unwrap();
        let argv: Vec<String> = ["nterm", "--window=Work"].iter().map(|s| s.to_string()).collect();
        let options = TerminalOptions::parse(&argv, &resolver).unwrap();
        assert_eq!(
            options.windows[0].tabs[0].profile.as_deref(),
            Some(expected.as_str())
        );
    }

    #[test]
    fn test_unknown_option_rejected() {
        assert!(matches!(
            parse(&["--frobnicate"]),
            Err(OptionsError::UnknownOption(_))
        ));
    }

    #[test]
    fn test_missing_value_rejected() {
        assert!(matches!(
            parse(&["--title"]),
            Err(OptionsError::BadValue(_))
        ));
    }

    #[test]
    fn test_app_id_validation() {
        assert!(parse(&["--app-id", "org.example.Terminal"]).is_ok());
        assert!(parse(&["--app-id", "org.example.dev-build"]).is_ok());
        for bad in ["plain", "org..double", ".leading", "org.1digit"] {
            assert!(
                matches!(parse(&["--app-id", bad]), Err(OptionsError::BadValue(_))),
                "expected rejection for {bad}"
            );
        }
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(parse(&["-v", "-v"]).unwrap().verbosity, 2);
        assert_eq!(parse(&["-q"]).unwrap().verbosity, -1);
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(matches!(
            parse(&["--load-config", "/nonexistent/session.toml"]),
            Err(OptionsError::InvalidConfigFile { .. })
        ));
    }

    #[test]
    fn test_flag_with_inline_value_rejected() {
        assert!(matches!(
            parse(&["--wait=yes"]),
            Err(OptionsError::BadValue(_))
        ));
    }
}

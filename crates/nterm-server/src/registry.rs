//! Window and screen bookkeeping
//!
//! The registry maps numeric window ids and screen UUIDs to their state. A
//! screen holds everything the receiver needs: whether a command already
//! runs in it, whether the screen is still open, and a latch that waiter
//! threads block on until the child exits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use uuid::Uuid;

/// Set-once exit status, with blocking readers.
pub struct ExitLatch {
    status: Mutex<Option<i32>>,
    cond: Condvar,
}

impl ExitLatch {
    fn new() -> Self {
        Self {
            status: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// Record the exit code and wake all waiters. The first call wins.
    pub fn set(&self, exit_code: i32) {
        let mut status = self.status.lock();
        if status.is_none() {
            *status = Some(exit_code);
        }
        self.cond.notify_all();
    }

    /// Block until a code has been recorded.
    pub fn wait(&self) -> i32 {
        let mut status = self.status.lock();
        while status.is_none() {
            self.cond.wait(&mut status);
        }
        status.unwrap()
    }

    pub fn get(&self) -> Option<i32> {
        *self.status.lock()
    }
}

/// One terminal screen (a tab).
pub struct Screen {
    pub uuid: String,
    pub window_id: u64,
    pub profile: String,
    pub title: Option<String>,
    pub zoom: f64,
    /// Whether a command has been exec'd in this screen.
    spawned: AtomicBool,
    /// Cleared when the screen is torn down.
    open: AtomicBool,
    pub exit: ExitLatch,
}

impl Screen {
    /// Claim this screen for an exec. Returns false if a command already
    /// ran here.
    pub fn claim_spawn(&self) -> bool {
        !self.spawned.swap(true, Ordering::SeqCst)
    }

    /// Give the claim back after a failed spawn so a retry can succeed.
    pub fn release_spawn(&self) {
        self.spawned.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// One top-level window.
pub struct Window {
    pub id: u64,
    pub role: Option<String>,
    pub show_menubar: bool,
    pub fullscreen: bool,
    pub maximized: bool,
    pub geometry: Option<(u32, u32)>,
    /// Screen UUIDs in tab order.
    pub screens: Vec<String>,
    /// UUID of the focused screen, if any tab asked for focus.
    pub active_screen: Option<String>,
}

/// Shared window/screen table.
pub struct Registry {
    next_window_id: AtomicU64,
    windows: RwLock<HashMap<u64, Window>>,
    screens: RwLock<HashMap<String, Arc<Screen>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            next_window_id: AtomicU64::new(1),
            windows: RwLock::new(HashMap::new()),
            screens: RwLock::new(HashMap::new()),
        }
    }

    pub fn create_window(&self) -> u64 {
        let id = self.next_window_id.fetch_add(1, Ordering::SeqCst);
        let window = Window {
            id,
            role: None,
            show_menubar: true,
            fullscreen: false,
            maximized: false,
            geometry: None,
            screens: Vec::new(),
            active_screen: None,
        };
        self.windows.write().insert(id, window);
        id
    }

    pub fn window_exists(&self, id: u64) -> bool {
        self.windows.read().contains_key(&id)
    }

    /// Run `f` against a window's state.
    pub fn with_window<T>(&self, id: u64, f: impl FnOnce(&mut Window) -> T) -> Option<T> {
        self.windows.write().get_mut(&id).map(f)
    }

    /// Create a screen in `window_id` and return it. The caller has already
    /// verified the window exists.
    pub fn create_screen(
        &self,
        window_id: u64,
        profile: String,
        title: Option<String>,
        zoom: f64,
        active: bool,
    ) -> Arc<Screen> {
        let screen = Arc::new(Screen {
            uuid: Uuid::new_v4().to_string(),
            window_id,
            profile,
            title,
            zoom,
            spawned: AtomicBool::new(false),
            open: AtomicBool::new(true),
            exit: ExitLatch::new(),
        });
        self.screens
            .write()
            .insert(screen.uuid.clone(), Arc::clone(&screen));
        if let Some(window) = self.windows.write().get_mut(&window_id) {
            window.screens.push(screen.uuid.clone());
            if active {
                window.active_screen = Some(screen.uuid.clone());
            }
        }
        screen
    }

    pub fn screen(&self, uuid: &str) -> Option<Arc<Screen>> {
        self.screens.read().get(uuid).cloned()
    }

    /// Window containing the given screen.
    pub fn window_of_screen(&self, uuid: &str) -> Option<u64> {
        self.screens.read().get(uuid).map(|s| s.window_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_window_ids_are_sequential() {
        let registry = Registry::new();
        let a = registry.create_window();
        let b = registry.create_window();
        assert_ne!(a, b);
        assert!(registry.window_exists(a));
        assert!(registry.window_exists(b));
        assert!(!registry.window_exists(b + 1));
    }

    #[test]
    fn test_screen_lookup_and_window_membership() {
        let registry = Registry::new();
        let window = registry.create_window();
        let screen = registry.create_screen(window, "p".into(), None, 1.0, true);

        assert_eq!(registry.window_of_screen(&screen.uuid), Some(window));
        let (tabs, active) = registry
            .with_window(window, |w| (w.screens.len(), w.active_screen.clone()))
            .unwrap();
        assert_eq!(tabs, 1);
        assert_eq!(active.as_deref(), Some(screen.uuid.as_str()));
        assert!(registry.screen("no-such-uuid").is_none());
    }

    #[test]
    fn test_claim_spawn_is_single_use() {
        let registry = Registry::new();
        let window = registry.create_window();
        let screen = registry.create_screen(window, "p".into(), None, 1.0, false);
        assert!(screen.claim_spawn());
        assert!(!screen.claim_spawn());
    }

    #[test]
    fn test_exit_latch_wakes_waiter() {
        let registry = Registry::new();
        let window = registry.create_window();
        let screen = registry.create_screen(window, "p".into(), None, 1.0, false);

        let waiter = {
            let screen = Arc::clone(&screen);
            thread::spawn(move || screen.exit.wait())
        };
        thread::sleep(Duration::from_millis(20));
        screen.exit.set(7);
        // A later set does not change the recorded code.
        screen.exit.set(9);
        assert_eq!(waiter.join().unwrap(), 7);
        assert_eq!(screen.exit.get(), Some(7));
    }
}

//! Factory service: screen creation
//!
//! Handles `CreateInstance`: resolves which window the new screen goes
//! into, inherits profile and zoom from the parent screen where the request
//! leaves them unset, and applies window options only when the call creates
//! the window.

use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;

use nterm_app::{ProfileStore, ResolveProfile};
use nterm_core::clamp_zoom;

use crate::error::ServiceError;
use crate::protocol::CreateInstanceRequest;
use crate::registry::Registry;

pub struct FactoryService {
    registry: Arc<Registry>,
    profiles: Arc<RwLock<ProfileStore>>,
}

impl FactoryService {
    pub fn new(registry: Arc<Registry>, profiles: Arc<RwLock<ProfileStore>>) -> Self {
        Self { registry, profiles }
    }

    /// Create a screen per the request. Returns the new screen's UUID.
    pub fn create_instance(&self, req: &CreateInstanceRequest) -> Result<String, ServiceError> {
        let (window_id, window_is_new) = self.resolve_window(req)?;

        let parent = req
            .parent_screen
            .as_deref()
            .and_then(|uuid| self.registry.screen(uuid));

        let profile = self.resolve_profile(req, parent.as_deref().map(|s| s.profile.as_str()))?;

        let zoom = req
            .zoom
            .or_else(|| parent.as_ref().map(|s| s.zoom))
            .unwrap_or_else(|| {
                self.profiles
                    .read()
                    .get(&profile)
                    .map(|p| p.zoom)
                    .unwrap_or(1.0)
            });
        let (zoom, clamped) = clamp_zoom(zoom);
        if clamped {
            log::warn!("zoom factor out of range, using {zoom}");
        }

        if window_is_new {
            self.apply_window_options(window_id, req);
        }

        let screen = self.registry.create_screen(
            window_id,
            profile,
            req.title.clone(),
            zoom,
            req.active,
        );

        // A fresh window is always presented; a reused one only on request.
        if window_is_new || req.present_window == Some(true) {
            log::debug!("presenting window {window_id}");
        }

        log::info!(
            "created screen {} in {} window {window_id}",
            screen.uuid,
            if window_is_new { "new" } else { "existing" }
        );
        Ok(screen.uuid.clone())
    }

    /// Pick the target window: parent screen first, then an explicit screen
    /// or window reference, else a new window. Unknown references are
    /// errors rather than silently opening a new window.
    fn resolve_window(&self, req: &CreateInstanceRequest) -> Result<(u64, bool), ServiceError> {
        if let Some(uuid) = req.parent_screen.as_deref() {
            if let Some(id) = self.registry.window_of_screen(uuid) {
                return Ok((id, false));
            }
            return Err(ServiceError::NotFound {
                kind: "screen",
                id: uuid.into(),
            });
        }
        if let Some(uuid) = req.window_from_screen.as_deref() {
            if let Some(id) = self.registry.window_of_screen(uuid) {
                return Ok((id, false));
            }
            return Err(ServiceError::NotFound {
                kind: "screen",
                id: uuid.into(),
            });
        }
        if let Some(id) = req.window_id {
            if self.registry.window_exists(id) {
                return Ok((id, false));
            }
            return Err(ServiceError::NotFound {
                kind: "window",
                id: id.to_string(),
            });
        }
        Ok((self.registry.create_window(), true))
    }

    fn resolve_profile(
        &self,
        req: &CreateInstanceRequest,
        parent_profile: Option<&str>,
    ) -> Result<String, ServiceError> {
        let profiles = self.profiles.read();
        if let Some(uuid) = req.profile.as_deref() {
            return Ok(profiles.resolve_id(uuid)?);
        }
        if let Some(uuid) = parent_profile {
            if profiles.get(uuid).is_some() {
                return Ok(uuid.to_string());
            }
        }
        Ok(profiles.resolve(None)?)
    }

    fn apply_window_options(&self, window_id: u64, req: &CreateInstanceRequest) {
        let geometry = req.geometry.as_deref().and_then(parse_geometry);
        if req.geometry.is_some() && geometry.is_none() {
            log::warn!(
                "invalid geometry string \"{}\"",
                req.geometry.as_deref().unwrap_or_default()
            );
        }
        self.registry.with_window(window_id, |window| {
            window.role = req.role.clone();
            if let Some(show) = req.show_menubar {
                window.show_menubar = show;
            }
            window.fullscreen = req.fullscreen;
            window.maximized = req.maximize;
            window.geometry = geometry;
        });
        if let Some(token) = req.startup_token.as_deref() {
            log::debug!("window {window_id} startup token {token}");
        }
    }
}

/// Parse an X-style `COLSxROWS[+X+Y]` geometry into (cols, rows).
fn parse_geometry(spec: &str) -> Option<(u32, u32)> {
    let re = Regex::new(r"^=?(\d+)x(\d+)([+-]\d+[+-]\d+)?$").ok()?;
    let captures = re.captures(spec)?;
    let cols = captures[1].parse().ok()?;
    let rows = captures[2].parse().ok()?;
    Some((cols, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorKind;

    fn service() -> (FactoryService, Arc<Registry>, String) {
        let registry = Arc::new(Registry::new());
        let mut store = ProfileStore::default();
        store.ensure_default();
        let default = store.default_profile.clone();
        let profiles = Arc::new(RwLock::new(store));
        (
            FactoryService::new(Arc::clone(&registry), profiles),
            registry,
            default,
        )
    }

    #[test]
    fn test_create_in_new_window_uses_default_profile() {
        let (factory, registry, default) = service();
        let screen = factory
            .create_instance(&CreateInstanceRequest::default())
            .expect("create");
        let screen = registry.screen(&screen).expect("registered");
        assert_eq!(screen.profile, default);
        assert!((screen.zoom - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_window_id_is_invalid_argument() {
        let (factory, _registry, _default) = service();
        let err = factory
            .create_instance(&CreateInstanceRequest {
                window_id: Some(99),
                ..Default::default()
            })
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_unknown_profile_is_invalid_argument() {
        let (factory, _registry, _default) = service();
        let err = factory
            .create_instance(&CreateInstanceRequest {
                profile: Some("no-such-uuid".into()),
                ..Default::default()
            })
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_parent_screen_donates_window_profile_and_zoom() {
        let (factory, registry, _default) = service();
        let first = factory
            .create_instance(&CreateInstanceRequest {
                zoom: Some(2.0),
                ..Default::default()
            })
            .expect("create");
        let sibling = factory
            .create_instance(&CreateInstanceRequest {
                parent_screen: Some(first.clone()),
                ..Default::default()
            })
            .expect("create sibling");

        assert_eq!(
            registry.window_of_screen(&first),
            registry.window_of_screen(&sibling)
        );
        let sibling = registry.screen(&sibling).unwrap();
        assert!((sibling.zoom - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_out_of_range_zoom_is_clamped() {
        let (factory, registry, _default) = service();
        let screen = factory
            .create_instance(&CreateInstanceRequest {
                zoom: Some(100.0),
                ..Default::default()
            })
            .expect("create");
        let screen = registry.screen(&screen).unwrap();
        assert!((screen.zoom - nterm_core::ZOOM_MAX).abs() < f64::EPSILON);
    }

    #[test]
    fn test_window_options_apply_only_to_new_windows() {
        let (factory, registry, _default) = service();
        let first = factory
            .create_instance(&CreateInstanceRequest {
                role: Some("main".into()),
                geometry: Some("80x24+10+10".into()),
                maximize: true,
                ..Default::default()
            })
            .expect("create");
        let second = factory
            .create_instance(&CreateInstanceRequest {
                window_from_screen: Some(first.clone()),
                role: Some("other".into()),
                geometry: Some("132x43".into()),
                ..Default::default()
            })
            .expect("create tab");

        let window_id = registry.window_of_screen(&second).unwrap();
        let (role, geometry, maximized) = registry
            .with_window(window_id, |w| {
                (w.role.clone(), w.geometry, w.maximized)
            })
            .unwrap();
        assert_eq!(role.as_deref(), Some("main"));
        assert_eq!(geometry, Some((80, 24)));
        assert!(maximized);
    }

    #[test]
    fn test_parse_geometry() {
        assert_eq!(parse_geometry("80x24"), Some((80, 24)));
        assert_eq!(parse_geometry("=132x43+0-10"), Some((132, 43)));
        assert_eq!(parse_geometry("80"), None);
        assert_eq!(parse_geometry("80x"), None);
        assert_eq!(parse_geometry("wide"), None);
    }
}

//! nterm-server: the control plane
//!
//! One process per (user, application id) owns all terminal windows; every
//! later invocation forwards its parsed options to it over a Unix domain
//! socket. This crate holds both sides of that conversation:
//! - the wire protocol (bincode frames with out-of-band descriptors)
//! - the factory service (create a screen in a new or existing window)
//! - the receiver service (run a command in a screen, report child exit)
//! - the window/screen registry
//! - single-instance activation (become the server or talk to it)

pub mod activation;
pub mod error;
pub mod factory;
pub mod protocol;
pub mod receiver;
pub mod registry;
pub mod server;

pub use activation::{run, socket_path};
pub use error::ServiceError;
pub use factory::FactoryService;
pub use receiver::ReceiverService;
pub use registry::Registry;
pub use server::Server;

//! Postfix policy delegation front end.

mod request;
mod server;
mod service;

pub use request::{PolicyRequest, MAX_LINE_LENGTH};
pub use server::{serve_listener, PolicyServer};
pub use service::PolicyService;

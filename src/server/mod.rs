//! Transport layer

pub mod api;

pub use api::{run_server, Inbound, Outbound};

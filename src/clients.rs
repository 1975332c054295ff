//! HTTP clients for the collaborators owned by the product backend.

pub mod backend;

pub use backend::{BackendClient, BackendConfig};

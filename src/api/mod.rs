//! HTTP surface — the Turn API consumed by the chat UI.

mod routes;

pub use routes::{ApiState, api_routes};

//! opgate: tool dispatch gateway for OpenProject.
//!
//! Requests arrive over stdio, HTTP or SSE, are resolved against per-user
//! service configuration and forwarded to the OpenProject API. Report tools
//! are rendered through stored templates.

pub mod api;
pub mod cli;
pub mod db;
pub mod dispatch;
pub mod logging;
pub mod paths;
pub mod render;
pub mod settings;
pub mod stdio;
pub mod upstream;

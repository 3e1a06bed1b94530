//! Application state for the API server.

use std::sync::Arc;
use std::time::Instant;

use crate::db::Database;
use crate::dispatch::Dispatcher;
use crate::render::TemplateRenderer;
use crate::upstream::Upstream;

/// Shared application state.
///
/// Generic over the storage backend and the upstream client so tests can
/// run the full router against an in-memory store and a scripted upstream.
pub struct AppState<D: Database, U: Upstream> {
    dispatcher: Dispatcher<D, U>,
    started: Arc<Instant>,
}

// Manual Clone impl - the dispatcher is an Arc handle, D and U need not be Clone
impl<D: Database, U: Upstream> Clone for AppState<D, U> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            started: Arc::clone(&self.started),
        }
    }
}

impl<D: Database, U: Upstream> AppState<D, U> {
    pub fn new(dispatcher: Dispatcher<D, U>) -> Self {
        Self {
            dispatcher,
            started: Arc::new(Instant::now()),
        }
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &D {
        self.dispatcher.db()
    }

    pub fn dispatcher(&self) -> &Dispatcher<D, U> {
        &self.dispatcher
    }

    pub fn renderer(&self) -> &TemplateRenderer {
        self.dispatcher.renderer()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

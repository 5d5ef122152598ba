//! Outward-facing collaborators: user notices and route changes.
//!
//! Both are fire-and-forget. Implementations must not block and nothing they
//! do is reported back to the caller.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

pub const SIGNIN_ROUTE: &str = "signin";
pub const DOCUMENT_PROGRESS_DETAILS_ROUTE: &str = "documents.progress.details";
pub const EXAM_ATTEMPT_DETAILS_ROUTE: &str = "exams.attempt.details";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Info,
    Warning,
    Error,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NoticeKind, message: &str);
}

/// A named destination with path params and query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: String,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
}

impl Route {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
            query: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.insert(key.into(), value.to_string());
        self
    }

    /// Sign-in page flagged as reached through an expired session.
    #[must_use]
    pub fn signin_expired() -> Self {
        Self::named(SIGNIN_ROUTE).query("expired", "1")
    }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Notifier that writes notices to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        match kind {
            NoticeKind::Error => tracing::error!(notice = message),
            NoticeKind::Warning => tracing::warn!(notice = message),
            NoticeKind::Success | NoticeKind::Info => tracing::info!(notice = message),
        }
    }
}

/// Keeps every notice it receives.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(NoticeKind, String)>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<(NoticeKind, String)> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, message.to_string()));
    }
}

/// Keeps every route it is asked to open. Headless front ends use it to
/// find out where the session wanted to go.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<Route> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        tracing::debug!(route = %route.name, "navigate");
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route);
    }
}

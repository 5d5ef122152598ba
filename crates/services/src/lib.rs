#![forbid(unsafe_code)]

pub mod app_services;
pub mod auth_service;
pub mod collab;
pub mod config;
pub mod error;
pub mod http;
pub mod preferences_service;
pub mod progress;
pub mod quiz_timer;
pub mod sync;

pub use quiz_core::Clock;

pub use app_services::AppServices;
pub use auth_service::{AuthService, RegisterOutcome};
pub use collab::{
    Navigator, NoticeKind, Notifier, RecordingNavigator, RecordingNotifier, Route,
    TracingNotifier,
};
pub use config::ClientConfig;
pub use error::{
    ApiError, AppServicesError, ConfigError, PreferencesServiceError, TransportError,
};
pub use http::{ApiClient, ApiRequest, ApiResponse, ReqwestTransport, TokenStore, Transport};
pub use preferences_service::PreferencesService;
pub use progress::{DocumentProgressService, ExamProgressService};
pub use quiz_timer::{QuizTimer, TimerSnapshot};
pub use sync::{
    AutoSaveHandle, CategoryProgressSink, LocalBackup, ProgressSink, ProgressSync, SaveOutcome,
    SyncStatus,
};

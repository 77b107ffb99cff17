// Core infrastructure module
// Configuration, cycle orchestration and progress events

pub mod app;
pub mod app_config;
pub mod project_config;
pub mod events;

pub use app::{CycleReport, Preview, SyncSession};
pub use app_config::AppConfig;
pub use project_config::ProjectConfig;
pub use events::{CycleState, EventSink, SyncEvent};

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{
    AppAdapters, AppState, AuthResponse, CheckpointView, ClearCompletedResponse,
    DeleteReviewResponse, InitializeResponse, LogoutResponse, ReviewItemView,
    ReviewMutationResponse, StatsResponse, SyncNowResponse, SyncStatusResponse,
};
pub use application::sync_coordinator::{
    LoadOutcome, LoadSource, ModeTransition, PersistOutcome, SwitchOutcome, SyncCoordinator,
    SyncMode, SyncStatus,
};
pub use domain::models::{ReviewItem, ReviewStats, ReviewStatus};
pub use infrastructure::error::InfraError;

use std::path::PathBuf;

pub fn open_app_state(root: Option<PathBuf>) -> Result<AppState, String> {
    let workspace_root = match root {
        Some(path) => path,
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };
    AppState::new(workspace_root).map_err(|error| error.to_string())
}

use crate::application::bootstrap::{BootstrapResult, bootstrap_workspace};
use crate::application::periodic_sync::{PeriodicSyncHandle, start_periodic_sync};
use crate::application::session::{RestoreSessionResult, SessionManager};
use crate::application::sync_coordinator::{
    AuthRejectedHook, LoadOutcome, LoadSource, ModeTransition, PersistOutcome, SwitchOutcome,
    SyncCoordinator, SyncMode, SyncStatus,
};
use crate::domain::classifier::{
    DayBoundary, ReviewFilter, classify_checkpoints, filter_items, overall_category,
};
use crate::domain::models::{
    AuthUser, IntervalSpec, ReviewItem, ReviewStatus, interval_label, interval_table,
};
use crate::domain::stats::{completion_rate, summarize};
use crate::infrastructure::auth_client::{AuthHttpClient, ReqwestAuthClient};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::credential_store::{
    CredentialStore, DEFAULT_SESSION_ACCOUNT, KeyringSessionStore,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::local_store::{LocalStore, SqliteLocalStore};
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::remote_client::{
    HealthReport, RemoteReviewClient, ReqwestRemoteReviewClient, UserStats,
};
use crate::infrastructure::review_codec::format_instant;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

pub type ReviewCoordinator = SyncCoordinator<dyn LocalStore, dyn RemoteReviewClient>;
pub type ReviewSessionManager = SessionManager<dyn CredentialStore, dyn AuthHttpClient>;
type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckpointView {
    pub index: usize,
    pub label: &'static str,
    pub due_at: String,
    pub status: &'static str,
    pub category: &'static str,
    pub due_in_minutes: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReviewItemView {
    pub id: i64,
    pub content: String,
    pub created_at: String,
    pub category: &'static str,
    pub completed_count: usize,
    pub progress_percent: u8,
    pub next_pending_index: Option<usize>,
    pub checkpoints: Vec<CheckpointView>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReviewMutationResponse {
    pub item: ReviewItemView,
    pub persisted: PersistOutcome,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeleteReviewResponse {
    pub deleted_id: i64,
    pub persisted: PersistOutcome,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClearCompletedResponse {
    pub removed: usize,
    pub persisted: Option<PersistOutcome>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsResponse {
    pub total: usize,
    pub overdue: usize,
    pub due_today: usize,
    pub completed: usize,
    pub completion_rate: u8,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InitializeResponse {
    pub session: &'static str,
    pub mode: SyncMode,
    pub user: Option<AuthUser>,
    pub item_count: usize,
    pub local_reset: bool,
    pub status: SyncStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuthResponse {
    pub user: AuthUser,
    pub mode: SyncMode,
    pub outcome: SwitchOutcome,
    pub status: SyncStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogoutResponse {
    pub mode: SyncMode,
    pub item_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyncNowResponse {
    pub persisted: PersistOutcome,
    pub status: SyncStatus,
    pub user_stats: Option<UserStats>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyncStatusResponse {
    pub status: SyncStatus,
    pub user: Option<AuthUser>,
    pub periodic_sync_running: bool,
}

pub struct AppAdapters {
    pub local_store: Arc<dyn LocalStore>,
    pub remote_client: Arc<dyn RemoteReviewClient>,
    pub credential_store: Arc<dyn CredentialStore>,
    pub auth_client: Arc<dyn AuthHttpClient>,
}

#[derive(Debug, Default)]
struct RuntimeState {
    initialized: bool,
    current_user: Option<AuthUser>,
}

pub struct AppState {
    config: AppConfig,
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    day_boundary: DayBoundary,
    coordinator: Arc<ReviewCoordinator>,
    session: ReviewSessionManager,
    periodic: tokio::sync::Mutex<Option<PeriodicSyncHandle>>,
    runtime: Arc<Mutex<RuntimeState>>,
    now_provider: NowProvider,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        init_logging(&bootstrap.config.log_level);

        let config = &bootstrap.config;
        let adapters = AppAdapters {
            local_store: Arc::new(SqliteLocalStore::new(&bootstrap.database_path)),
            remote_client: Arc::new(ReqwestRemoteReviewClient::new(
                &config.api_base_url,
                config.request_timeout(),
            )?),
            credential_store: Arc::new(KeyringSessionStore::new(
                config.credential_service.clone(),
                DEFAULT_SESSION_ACCOUNT,
            )),
            auth_client: Arc::new(ReqwestAuthClient::new(
                &config.api_base_url,
                config.request_timeout(),
            )?),
        };
        Self::with_adapters(bootstrap, adapters)
    }

    pub fn with_adapters(bootstrap: BootstrapResult, adapters: AppAdapters) -> Result<Self, InfraError> {
        let day_boundary = bootstrap.config.day_boundary()?;
        let runtime = Arc::new(Mutex::new(RuntimeState::default()));

        let hook_store = Arc::clone(&adapters.credential_store);
        let hook_runtime = Arc::clone(&runtime);
        let on_auth_rejected: AuthRejectedHook = Arc::new(move || {
            if let Err(error) = hook_store.delete_session() {
                warn!(error = %error, "failed to clear rejected session");
            }
            if let Ok(mut runtime) = hook_runtime.lock() {
                runtime.current_user = None;
            }
        });

        let coordinator = SyncCoordinator::new(
            adapters.local_store,
            adapters.remote_client,
            bootstrap.config.storage_key.clone(),
        )
        .with_auth_rejected_hook(on_auth_rejected);

        Ok(Self {
            session: SessionManager::new(adapters.credential_store, adapters.auth_client),
            coordinator: Arc::new(coordinator),
            config: bootstrap.config,
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            day_boundary,
            periodic: tokio::sync::Mutex::new(None),
            runtime,
            now_provider: Arc::new(Utc::now),
            log_guard: Mutex::new(()),
        })
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn coordinator(&self) -> &Arc<ReviewCoordinator> {
        &self.coordinator
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        info!(command, "{message}");
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        error!(command, "{message}");
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

pub async fn initialize_impl(state: &AppState) -> Result<InitializeResponse, InfraError> {
    let restored = match state.session.restore().await {
        Ok(restored) => restored,
        Err(error) => {
            state.log_error("initialize", &format!("session restore failed: {error}"));
            RestoreSessionResult::NoSession
        }
    };

    let (session, user, outcome) = match restored {
        RestoreSessionResult::Verified(stored) => {
            let outcome = state
                .coordinator
                .switch_mode(ModeTransition::Authenticate {
                    token: stored.token,
                    upload_guest_data: false,
                })
                .await?;
            ("verified", Some(stored.user), outcome)
        }
        RestoreSessionResult::Offline(_) => {
            let outcome = state.coordinator.switch_mode(ModeTransition::Guest).await?;
            ("offline", None, outcome)
        }
        RestoreSessionResult::Rejected => {
            let outcome = state.coordinator.switch_mode(ModeTransition::Guest).await?;
            ("rejected", None, outcome)
        }
        RestoreSessionResult::NoSession => {
            let outcome = state.coordinator.switch_mode(ModeTransition::Guest).await?;
            ("none", None, outcome)
        }
    };

    let mode = state.coordinator.mode().await;
    let user = user.filter(|_| mode == SyncMode::Authenticated);
    {
        let mut runtime = lock_runtime(state)?;
        runtime.initialized = true;
        runtime.current_user = user.clone();
    }
    restart_periodic_sync(state).await;

    let loaded = load_outcome_of(outcome);
    state.log_info(
        "initialize",
        &format!("session={session} mode={} items={}", mode.as_str(), loaded.count),
    );
    Ok(InitializeResponse {
        session,
        mode,
        user,
        item_count: loaded.count,
        local_reset: loaded.local_reset,
        status: state.coordinator.status(),
    })
}

pub async fn add_review_impl(
    state: &AppState,
    content: String,
) -> Result<ReviewMutationResponse, InfraError> {
    ensure_initialized(state)?;
    let now = (state.now_provider)();
    let mutation = state.coordinator.add_item(&content, now).await?;
    after_persist(state, mutation.persisted).await;
    state.log_info("add_review", &format!("added review {}", mutation.value.id));
    Ok(ReviewMutationResponse {
        item: to_review_item_view(&state.day_boundary, now, &mutation.value),
        persisted: mutation.persisted,
    })
}

pub async fn mark_review_impl(
    state: &AppState,
    id: i64,
    index: usize,
    status: String,
) -> Result<ReviewMutationResponse, InfraError> {
    ensure_initialized(state)?;
    let status = ReviewStatus::parse(&status).map_err(InfraError::Validation)?;
    let mutation = state.coordinator.set_status(id, index, status).await?;
    after_persist(state, mutation.persisted).await;
    let now = (state.now_provider)();
    Ok(ReviewMutationResponse {
        item: to_review_item_view(&state.day_boundary, now, &mutation.value),
        persisted: mutation.persisted,
    })
}

pub async fn delete_review_impl(state: &AppState, id: i64) -> Result<DeleteReviewResponse, InfraError> {
    ensure_initialized(state)?;
    let mutation = state.coordinator.delete_item(id).await?;
    after_persist(state, mutation.persisted).await;
    state.log_info("delete_review", &format!("deleted review {id}"));
    Ok(DeleteReviewResponse {
        deleted_id: mutation.value.id,
        persisted: mutation.persisted,
    })
}

pub async fn clear_completed_impl(state: &AppState) -> Result<ClearCompletedResponse, InfraError> {
    ensure_initialized(state)?;
    let cleared = state.coordinator.clear_completed().await;
    if let Some(persisted) = cleared.persisted {
        after_persist(state, persisted).await;
    }
    Ok(ClearCompletedResponse {
        removed: cleared.removed,
        persisted: cleared.persisted,
    })
}

pub async fn list_reviews_impl(
    state: &AppState,
    filter: Option<String>,
) -> Result<Vec<ReviewItemView>, InfraError> {
    ensure_initialized(state)?;
    let filter = match filter {
        Some(raw) => ReviewFilter::parse(&raw).map_err(InfraError::Validation)?,
        None => ReviewFilter::All,
    };
    let now = (state.now_provider)();
    let items = state.coordinator.snapshot().await;
    Ok(filter_items(&state.day_boundary, now, &items, filter)
        .into_iter()
        .map(|item| to_review_item_view(&state.day_boundary, now, item))
        .collect())
}

pub async fn get_stats_impl(state: &AppState) -> Result<StatsResponse, InfraError> {
    ensure_initialized(state)?;
    let now = (state.now_provider)();
    let items = state.coordinator.snapshot().await;
    let stats = summarize(&state.day_boundary, &items, now);
    Ok(StatsResponse {
        total: stats.total,
        overdue: stats.overdue,
        due_today: stats.due_today,
        completed: stats.completed,
        completion_rate: completion_rate(&items),
    })
}

pub async fn login_impl(
    state: &AppState,
    username: String,
    password: String,
) -> Result<AuthResponse, InfraError> {
    ensure_initialized(state)?;
    let session = state.session.login(&username, &password).await?;
    state.log_info("login", &format!("logged in as {}", session.user.username));
    enter_authenticated(state, session.token, session.user, false).await
}

pub async fn register_impl(
    state: &AppState,
    username: String,
    email: String,
    password: String,
    upload_local_data: bool,
) -> Result<AuthResponse, InfraError> {
    ensure_initialized(state)?;
    let session = state.session.register(&username, &email, &password).await?;
    state.log_info("register", &format!("registered {}", session.user.username));
    enter_authenticated(state, session.token, session.user, upload_local_data).await
}

pub async fn logout_impl(state: &AppState) -> Result<LogoutResponse, InfraError> {
    ensure_initialized(state)?;
    stop_periodic_sync(state).await;
    let outcome = state.coordinator.switch_mode(ModeTransition::Guest).await?;
    lock_runtime(state)?.current_user = None;
    state.session.logout()?;
    state.log_info("logout", "returned to guest mode");
    Ok(LogoutResponse {
        mode: SyncMode::Guest,
        item_count: load_outcome_of(outcome).count,
    })
}

pub async fn sync_now_impl(state: &AppState) -> Result<SyncNowResponse, InfraError> {
    ensure_initialized(state)?;
    let persisted = state.coordinator.persist().await;
    after_persist(state, persisted).await;

    let user_stats = if persisted == PersistOutcome::Remote {
        match state.coordinator.remote_user_stats().await {
            Ok(stats) => stats,
            Err(error) => {
                state.log_error("sync_now", &format!("user stats unavailable: {error}"));
                None
            }
        }
    } else {
        None
    };

    Ok(SyncNowResponse {
        persisted,
        status: state.coordinator.status(),
        user_stats,
    })
}

pub async fn sync_status_impl(state: &AppState) -> Result<SyncStatusResponse, InfraError> {
    let user = lock_runtime(state)?.current_user.clone();
    let periodic_sync_running = state
        .periodic
        .lock()
        .await
        .as_ref()
        .is_some_and(PeriodicSyncHandle::is_running);
    Ok(SyncStatusResponse {
        status: state.coordinator.status(),
        user,
        periodic_sync_running,
    })
}

pub async fn get_user_stats_impl(state: &AppState) -> Result<Option<UserStats>, InfraError> {
    ensure_initialized(state)?;
    let result = state.coordinator.remote_user_stats().await;
    if matches!(&result, Err(error) if error.is_auth_rejection()) {
        stop_periodic_sync(state).await;
    }
    result
}

pub async fn check_health_impl(state: &AppState) -> Result<HealthReport, InfraError> {
    state.coordinator.check_health().await
}

pub fn interval_table_impl() -> Vec<IntervalSpec> {
    interval_table()
}

pub async fn shutdown_impl(state: &AppState) {
    stop_periodic_sync(state).await;
}

async fn enter_authenticated(
    state: &AppState,
    token: String,
    user: AuthUser,
    upload_guest_data: bool,
) -> Result<AuthResponse, InfraError> {
    let outcome = state
        .coordinator
        .switch_mode(ModeTransition::Authenticate {
            token,
            upload_guest_data,
        })
        .await?;
    let mode = state.coordinator.mode().await;
    if mode == SyncMode::Authenticated {
        lock_runtime(state)?.current_user = Some(user.clone());
    }
    restart_periodic_sync(state).await;
    Ok(AuthResponse {
        user,
        mode,
        outcome,
        status: state.coordinator.status(),
    })
}

async fn after_persist(state: &AppState, persisted: PersistOutcome) {
    match persisted {
        PersistOutcome::AuthRejected => {
            state.log_error("persist", "session rejected by server; now in guest mode");
            stop_periodic_sync(state).await;
        }
        PersistOutcome::InMemoryOnly => {
            state.log_error("persist", "changes could not be saved anywhere durable");
            if state.coordinator.mode().await == SyncMode::Guest {
                stop_periodic_sync(state).await;
            }
        }
        PersistOutcome::LocalOnly | PersistOutcome::Remote | PersistOutcome::FellBackToLocal => {}
    }
}

async fn restart_periodic_sync(state: &AppState) {
    let mut periodic = state.periodic.lock().await;
    if let Some(handle) = periodic.take() {
        handle.shutdown().await;
    }
    if state.coordinator.mode().await == SyncMode::Authenticated {
        *periodic = Some(start_periodic_sync(
            Arc::clone(&state.coordinator),
            state.config.sync_interval(),
        ));
    }
}

async fn stop_periodic_sync(state: &AppState) {
    if let Some(handle) = state.periodic.lock().await.take() {
        handle.shutdown().await;
    }
}

fn load_outcome_of(outcome: SwitchOutcome) -> LoadOutcome {
    match outcome {
        SwitchOutcome::Loaded(loaded) | SwitchOutcome::ReturnedToGuest(loaded) => loaded,
        SwitchOutcome::UploadedGuestData { count } => LoadOutcome {
            source: LoadSource::Remote,
            count,
            local_reset: false,
        },
    }
}

fn ensure_initialized(state: &AppState) -> Result<(), InfraError> {
    if lock_runtime(state)?.initialized {
        return Ok(());
    }
    Err(InfraError::Validation(
        "app state is not initialized; call initialize first".to_string(),
    ))
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::Transient(format!("runtime lock poisoned: {error}")))
}

fn to_review_item_view(
    boundary: &DayBoundary,
    now: DateTime<Utc>,
    item: &ReviewItem,
) -> ReviewItemView {
    let categories = classify_checkpoints(boundary, now, item);
    let checkpoints = item
        .checkpoints
        .iter()
        .zip(item.statuses.iter())
        .zip(categories)
        .enumerate()
        .map(|(index, ((checkpoint, status), category))| CheckpointView {
            index,
            label: interval_label(index).unwrap_or_default(),
            due_at: format_instant(*checkpoint),
            status: status.as_str(),
            category: category.as_str(),
            due_in_minutes: (*checkpoint - now).num_minutes(),
        })
        .collect();

    ReviewItemView {
        id: item.id,
        content: item.content.clone(),
        created_at: format_instant(item.created_at),
        category: overall_category(boundary, now, item).as_str(),
        completed_count: item.completed_count(),
        progress_percent: item.progress_percent(),
        next_pending_index: item.next_pending_index(),
        checkpoints,
    }
}

use crate::domain::models::{CHECKPOINT_COUNT, ReviewItem, ReviewStatus};
use crate::domain::schedule::create_item;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::local_store::LocalStore;
use crate::infrastructure::remote_client::{HealthReport, RemoteReviewClient, UserStats};
use crate::infrastructure::review_codec::{snapshot_from_json, snapshot_to_json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, info, warn};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
pub type AuthRejectedHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Guest,
    Authenticated,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Authenticated => "authenticated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub mode: SyncMode,
    pub last_known_online: bool,
    pub message: String,
    pub last_remote_sync_at: Option<DateTime<Utc>>,
    pub item_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistOutcome {
    LocalOnly,
    Remote,
    FellBackToLocal,
    AuthRejected,
    InMemoryOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    Local,
    Remote,
    FellBackToLocal,
    AuthRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOutcome {
    pub source: LoadSource,
    pub count: usize,
    pub local_reset: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeTransition {
    Authenticate {
        token: String,
        upload_guest_data: bool,
    },
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SwitchOutcome {
    UploadedGuestData { count: usize },
    Loaded(LoadOutcome),
    ReturnedToGuest(LoadOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundPersist {
    Skipped(SyncMode),
    Ran(PersistOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mutation<T> {
    pub value: T,
    pub persisted: PersistOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cleared {
    pub removed: usize,
    pub persisted: Option<PersistOutcome>,
}

#[derive(Debug)]
struct CoordinatorState {
    mode: SyncMode,
    token: Option<String>,
    last_known_online: bool,
    collection: Vec<ReviewItem>,
    last_remote_sync_at: Option<DateTime<Utc>>,
}

/// Owns the review collection and decides where each snapshot goes.
///
/// Every public operation holds the state lock for its full duration,
/// remote calls included, so two snapshot writes never race.
pub struct SyncCoordinator<L, R>
where
    L: LocalStore + ?Sized,
    R: RemoteReviewClient + ?Sized,
{
    local_store: Arc<L>,
    remote_client: Arc<R>,
    storage_key: String,
    state: Mutex<CoordinatorState>,
    status_tx: watch::Sender<SyncStatus>,
    now_provider: NowProvider,
    on_auth_rejected: Option<AuthRejectedHook>,
}

impl<L, R> SyncCoordinator<L, R>
where
    L: LocalStore + ?Sized,
    R: RemoteReviewClient + ?Sized,
{
    pub fn new(local_store: Arc<L>, remote_client: Arc<R>, storage_key: impl Into<String>) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus {
            mode: SyncMode::Guest,
            last_known_online: false,
            message: "guest mode".to_string(),
            last_remote_sync_at: None,
            item_count: 0,
        });
        Self {
            local_store,
            remote_client,
            storage_key: storage_key.into(),
            state: Mutex::new(CoordinatorState {
                mode: SyncMode::Guest,
                token: None,
                last_known_online: false,
                collection: Vec::new(),
                last_remote_sync_at: None,
            }),
            status_tx,
            now_provider: Arc::new(Utc::now),
            on_auth_rejected: None,
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn with_auth_rejected_hook(mut self, hook: AuthRejectedHook) -> Self {
        self.on_auth_rejected = Some(hook);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    pub async fn mode(&self) -> SyncMode {
        self.state.lock().await.mode
    }

    pub async fn snapshot(&self) -> Vec<ReviewItem> {
        self.state.lock().await.collection.clone()
    }

    pub async fn add_item(
        &self,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Mutation<ReviewItem>, InfraError> {
        let mut state = self.state.lock().await;
        let previous_max_id = state.collection.iter().map(|item| item.id).max();
        let item = create_item(content, now, previous_max_id).map_err(InfraError::Validation)?;
        state.collection.insert(0, item.clone());
        debug!(id = item.id, "review item added");

        let persisted = self.persist_locked(&mut state).await;
        Ok(Mutation {
            value: item,
            persisted,
        })
    }

    pub async fn set_status(
        &self,
        id: i64,
        index: usize,
        status: ReviewStatus,
    ) -> Result<Mutation<ReviewItem>, InfraError> {
        let mut state = self.state.lock().await;
        if index >= CHECKPOINT_COUNT {
            return Err(InfraError::NotFound(format!(
                "checkpoint {index} of review {id} (valid range 0..{CHECKPOINT_COUNT})"
            )));
        }
        let item = state
            .collection
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| InfraError::NotFound(format!("review {id}")))?;
        item.statuses[index] = status;
        let updated = item.clone();

        let persisted = self.persist_locked(&mut state).await;
        Ok(Mutation {
            value: updated,
            persisted,
        })
    }

    pub async fn delete_item(&self, id: i64) -> Result<Mutation<ReviewItem>, InfraError> {
        let mut state = self.state.lock().await;
        let position = state
            .collection
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| InfraError::NotFound(format!("review {id}")))?;
        let removed = state.collection.remove(position);

        let persisted = self.persist_locked(&mut state).await;
        Ok(Mutation {
            value: removed,
            persisted,
        })
    }

    pub async fn clear_completed(&self) -> Cleared {
        let mut state = self.state.lock().await;
        let before = state.collection.len();
        state.collection.retain(|item| !item.is_fully_completed());
        let removed = before - state.collection.len();
        if removed == 0 {
            return Cleared {
                removed,
                persisted: None,
            };
        }

        info!(removed, "cleared completed reviews");
        let persisted = self.persist_locked(&mut state).await;
        Cleared {
            removed,
            persisted: Some(persisted),
        }
    }

    pub async fn persist(&self) -> PersistOutcome {
        let mut state = self.state.lock().await;
        self.persist_locked(&mut state).await
    }

    pub async fn load(&self) -> LoadOutcome {
        let mut state = self.state.lock().await;
        self.load_locked(&mut state).await
    }

    pub async fn switch_mode(&self, transition: ModeTransition) -> Result<SwitchOutcome, InfraError> {
        let mut state = self.state.lock().await;
        match transition {
            ModeTransition::Authenticate {
                token,
                upload_guest_data,
            } => {
                let token = token.trim().to_string();
                if token.is_empty() {
                    return Err(InfraError::Validation(
                        "session token must not be empty".to_string(),
                    ));
                }
                state.mode = SyncMode::Authenticated;
                state.token = Some(token);
                info!(upload_guest_data, "switched to authenticated mode");

                if upload_guest_data {
                    if let Some(outcome) = self.upload_guest_data_locked(&mut state).await {
                        return Ok(outcome);
                    }
                }
                let loaded = self.load_locked(&mut state).await;
                if loaded.source == LoadSource::AuthRejected {
                    return Ok(SwitchOutcome::ReturnedToGuest(loaded));
                }
                Ok(SwitchOutcome::Loaded(loaded))
            }
            ModeTransition::Guest => {
                state.mode = SyncMode::Guest;
                state.token = None;
                state.last_known_online = false;
                info!("switched to guest mode");
                let loaded = self.load_locked(&mut state).await;
                Ok(SwitchOutcome::ReturnedToGuest(loaded))
            }
        }
    }

    pub async fn background_persist(&self) -> BackgroundPersist {
        let mut state = self.state.lock().await;
        if state.mode != SyncMode::Authenticated || state.collection.is_empty() {
            return BackgroundPersist::Skipped(state.mode);
        }
        BackgroundPersist::Ran(self.persist_locked(&mut state).await)
    }

    pub async fn remote_user_stats(&self) -> Result<Option<UserStats>, InfraError> {
        let mut state = self.state.lock().await;
        let Some(token) = state.token.clone().filter(|_| state.mode == SyncMode::Authenticated)
        else {
            return Ok(None);
        };
        match self.remote_client.user_stats(&token).await {
            Ok(stats) => {
                state.last_known_online = true;
                Ok(Some(stats))
            }
            Err(error) if error.is_auth_rejection() => {
                self.force_guest_locked(&mut state, &error, true);
                Err(error)
            }
            Err(error) => {
                state.last_known_online = false;
                self.publish(&state, "could not reach the server for stats");
                Err(error)
            }
        }
    }

    pub async fn check_health(&self) -> Result<HealthReport, InfraError> {
        self.remote_client.health().await
    }

    async fn upload_guest_data_locked(
        &self,
        state: &mut MutexGuard<'_, CoordinatorState>,
    ) -> Option<SwitchOutcome> {
        let (guest_items, _) = self.read_local();
        if guest_items.is_empty() {
            return None;
        }
        let token = state.token.clone().unwrap_or_default();
        match self.remote_client.replace_reviews(&token, &guest_items).await {
            Ok(receipt) => {
                if let Err(error) = self.local_store.remove(&self.storage_key) {
                    warn!(error = %error, "failed to clear guest copy after upload");
                }
                let count = guest_items.len();
                state.collection = guest_items;
                state.last_known_online = true;
                state.last_remote_sync_at = Some((self.now_provider)());
                info!(count, server_count = receipt.count, "uploaded guest data");
                self.publish(state, &format!("uploaded {count} local items to the cloud"));
                Some(SwitchOutcome::UploadedGuestData { count })
            }
            Err(error) if error.is_auth_rejection() => {
                self.force_guest_locked(state, &error, true);
                Some(SwitchOutcome::ReturnedToGuest(LoadOutcome {
                    source: LoadSource::AuthRejected,
                    count: state.collection.len(),
                    local_reset: false,
                }))
            }
            Err(error) => {
                warn!(error = %error, "guest data upload failed; local copy kept");
                None
            }
        }
    }

    async fn persist_locked(&self, state: &mut MutexGuard<'_, CoordinatorState>) -> PersistOutcome {
        let snapshot = match snapshot_to_json(&state.collection) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(error = %error, "failed to encode review snapshot");
                self.publish(state, "could not encode data; changes kept in memory");
                return PersistOutcome::InMemoryOnly;
            }
        };

        if state.mode == SyncMode::Guest {
            return match self.write_local(&snapshot) {
                Ok(()) => {
                    self.publish(state, "saved locally");
                    PersistOutcome::LocalOnly
                }
                Err(error) => {
                    warn!(error = %error, "local save failed");
                    self.publish(state, "local save failed; changes kept in memory");
                    PersistOutcome::InMemoryOnly
                }
            };
        }

        let token = state.token.clone().unwrap_or_default();
        match self
            .remote_client
            .replace_reviews(&token, &state.collection)
            .await
        {
            Ok(receipt) => {
                state.last_known_online = true;
                state.last_remote_sync_at = Some((self.now_provider)());
                if let Err(error) = self.write_local(&snapshot) {
                    warn!(error = %error, "local mirror write failed after cloud save");
                }
                debug!(count = receipt.count, "snapshot saved to cloud");
                self.publish(state, "synced to cloud");
                PersistOutcome::Remote
            }
            Err(error) if error.is_auth_rejection() => match self.write_local(&snapshot) {
                Ok(()) => {
                    self.force_guest_locked(state, &error, true);
                    PersistOutcome::AuthRejected
                }
                Err(local_error) => {
                    warn!(error = %local_error, "local save failed after auth rejection");
                    self.force_guest_locked(state, &error, false);
                    self.publish(state, "session expired and local save failed; changes kept in memory");
                    PersistOutcome::InMemoryOnly
                }
            },
            Err(error) => {
                state.last_known_online = false;
                warn!(error = %error, "cloud save failed; falling back to local store");
                match self.write_local(&snapshot) {
                    Ok(()) => {
                        self.publish(state, "offline; saved locally");
                        PersistOutcome::FellBackToLocal
                    }
                    Err(local_error) => {
                        warn!(error = %local_error, "local fallback save failed");
                        self.publish(state, "offline and local save failed; changes kept in memory");
                        PersistOutcome::InMemoryOnly
                    }
                }
            }
        }
    }

    async fn load_locked(&self, state: &mut MutexGuard<'_, CoordinatorState>) -> LoadOutcome {
        if state.mode == SyncMode::Guest {
            let (items, local_reset) = self.read_local();
            state.collection = items;
            let message = if local_reset {
                "local data was unreadable; started empty"
            } else {
                "loaded local data"
            };
            self.publish(state, message);
            return LoadOutcome {
                source: LoadSource::Local,
                count: state.collection.len(),
                local_reset,
            };
        }

        let token = state.token.clone().unwrap_or_default();
        match self.remote_client.fetch_reviews(&token).await {
            Ok(snapshot) => {
                state.collection = snapshot.items;
                state.last_known_online = true;
                state.last_remote_sync_at = Some((self.now_provider)());
                match snapshot_to_json(&state.collection) {
                    Ok(mirror) => {
                        if let Err(error) = self.write_local(&mirror) {
                            warn!(error = %error, "local mirror write failed after cloud load");
                        }
                    }
                    Err(error) => warn!(error = %error, "failed to encode local mirror"),
                }
                info!(count = state.collection.len(), "loaded reviews from cloud");
                self.publish(state, "loaded from cloud");
                LoadOutcome {
                    source: LoadSource::Remote,
                    count: state.collection.len(),
                    local_reset: false,
                }
            }
            Err(error) if error.is_auth_rejection() => {
                let local_reset = self.force_guest_locked(state, &error, true);
                LoadOutcome {
                    source: LoadSource::AuthRejected,
                    count: state.collection.len(),
                    local_reset,
                }
            }
            Err(error) => {
                state.last_known_online = false;
                warn!(error = %error, "cloud load failed; using local copy");
                let (items, local_reset) = self.read_local();
                state.collection = items;
                self.publish(state, "offline; showing local copy");
                LoadOutcome {
                    source: LoadSource::FellBackToLocal,
                    count: state.collection.len(),
                    local_reset,
                }
            }
        }
    }

    /// Hard transition after a rejected credential. With `reload` false the
    /// in-memory collection is kept because it is the only current copy.
    /// Returns whether the local snapshot had to be reset.
    fn force_guest_locked(
        &self,
        state: &mut CoordinatorState,
        error: &InfraError,
        reload: bool,
    ) -> bool {
        warn!(error = %error, "credential rejected; switching to guest mode");
        state.mode = SyncMode::Guest;
        state.token = None;
        state.last_known_online = false;
        let mut local_reset = false;
        if reload {
            let (items, reset) = self.read_local();
            state.collection = items;
            local_reset = reset;
        }
        self.publish(state, "session expired; switched to guest mode");
        if let Some(hook) = &self.on_auth_rejected {
            hook();
        }
        local_reset
    }

    fn read_local(&self) -> (Vec<ReviewItem>, bool) {
        let raw = match self.local_store.get(&self.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return (Vec::new(), false),
            Err(error) => {
                warn!(error = %error, "local store read failed; starting empty");
                return (Vec::new(), true);
            }
        };
        match snapshot_from_json(&raw) {
            Ok(items) => (items, false),
            Err(error) => {
                warn!(error = %error, "local snapshot is corrupt; starting empty");
                (Vec::new(), true)
            }
        }
    }

    fn write_local(&self, snapshot: &str) -> Result<(), InfraError> {
        self.local_store.set(&self.storage_key, snapshot)
    }

    fn publish(&self, state: &CoordinatorState, message: &str) {
        self.status_tx.send_replace(SyncStatus {
            mode: state.mode,
            last_known_online: state.last_known_online,
            message: message.to_string(),
            last_remote_sync_at: state.last_remote_sync_at,
            item_count: state.collection.len(),
        });
    }
}

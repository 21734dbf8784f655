use crate::application::sync_coordinator::{
    BackgroundPersist, PersistOutcome, SyncCoordinator, SyncMode,
};
use crate::infrastructure::local_store::LocalStore;
use crate::infrastructure::remote_client::RemoteReviewClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum PeriodicSyncMessage {
    SyncNow,
    Shutdown,
}

pub struct PeriodicSyncHandle {
    sender: mpsc::Sender<PeriodicSyncMessage>,
    task: JoinHandle<()>,
}

impl PeriodicSyncHandle {
    pub fn trigger(&self) {
        let _ = self.sender.try_send(PeriodicSyncMessage::SyncNow);
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn shutdown(self) {
        let _ = self.sender.send(PeriodicSyncMessage::Shutdown).await;
        if let Err(error) = self.task.await {
            warn!(error = %error, "periodic sync task ended abnormally");
        }
    }
}

pub fn start_periodic_sync<L, R>(
    coordinator: Arc<SyncCoordinator<L, R>>,
    period: Duration,
) -> PeriodicSyncHandle
where
    L: LocalStore + ?Sized + 'static,
    R: RemoteReviewClient + ?Sized + 'static,
{
    let (sender, receiver) = mpsc::channel(8);
    let task = tokio::spawn(periodic_sync_loop(coordinator, period, receiver));
    info!(period_secs = period.as_secs(), "periodic sync started");
    PeriodicSyncHandle { sender, task }
}

async fn periodic_sync_loop<L, R>(
    coordinator: Arc<SyncCoordinator<L, R>>,
    period: Duration,
    mut receiver: mpsc::Receiver<PeriodicSyncMessage>,
) where
    L: LocalStore + ?Sized + 'static,
    R: RemoteReviewClient + ?Sized + 'static,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            message = receiver.recv() => match message {
                Some(PeriodicSyncMessage::SyncNow) => {}
                Some(PeriodicSyncMessage::Shutdown) | None => break,
            },
        }

        if !run_tick(&coordinator).await {
            break;
        }
    }
    info!("periodic sync stopped");
}

async fn run_tick<L, R>(coordinator: &SyncCoordinator<L, R>) -> bool
where
    L: LocalStore + ?Sized,
    R: RemoteReviewClient + ?Sized,
{
    match coordinator.background_persist().await {
        BackgroundPersist::Skipped(SyncMode::Guest) => false,
        BackgroundPersist::Skipped(SyncMode::Authenticated) => {
            debug!("periodic sync skipped: nothing to push");
            true
        }
        BackgroundPersist::Ran(PersistOutcome::AuthRejected) => false,
        BackgroundPersist::Ran(PersistOutcome::Remote) => {
            debug!("periodic sync pushed snapshot");
            true
        }
        BackgroundPersist::Ran(outcome) => {
            warn!(?outcome, "periodic sync failed; retrying next tick");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::sync_coordinator::ModeTransition;
    use crate::application::sync_coordinator::tests::{FailKind, FakeRemoteReviewClient};
    use crate::infrastructure::local_store::InMemoryLocalStore;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::Ordering;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    async fn authenticated_coordinator(
        remote: Arc<FakeRemoteReviewClient>,
    ) -> Arc<SyncCoordinator<InMemoryLocalStore, FakeRemoteReviewClient>> {
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::new(InMemoryLocalStore::default()),
            remote,
            "reviewData",
        ));
        coordinator
            .switch_mode(ModeTransition::Authenticate {
                token: "token".to_string(),
                upload_guest_data: false,
            })
            .await
            .expect("authenticate");
        coordinator
            .add_item("Periodic", fixed_time("2024-01-01T00:00:00Z"))
            .await
            .expect("add");
        coordinator
    }

    #[tokio::test(start_paused = true)]
    async fn pushes_on_every_tick_and_survives_failures() {
        let remote = Arc::new(FakeRemoteReviewClient::default());
        let coordinator = authenticated_coordinator(remote.clone()).await;
        let baseline = remote.replace_calls.load(Ordering::SeqCst);

        let handle = start_periodic_sync(coordinator.clone(), Duration::from_secs(60));
        remote.fail_next(FailKind::Transient);
        tokio::time::sleep(Duration::from_secs(125)).await;

        assert_eq!(remote.replace_calls.load(Ordering::SeqCst), baseline + 2);
        assert!(handle.is_running());
        assert_eq!(coordinator.mode().await, SyncMode::Authenticated);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_pushes_immediately() {
        let remote = Arc::new(FakeRemoteReviewClient::default());
        let coordinator = authenticated_coordinator(remote.clone()).await;
        let baseline = remote.replace_calls.load(Ordering::SeqCst);

        let handle = start_periodic_sync(coordinator, Duration::from_secs(600));
        handle.trigger();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(remote.replace_calls.load(Ordering::SeqCst), baseline + 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn loop_exits_after_auth_rejection() {
        let remote = Arc::new(FakeRemoteReviewClient::default());
        let coordinator = authenticated_coordinator(remote.clone()).await;

        let handle = start_periodic_sync(coordinator.clone(), Duration::from_secs(60));
        remote.fail_next(FailKind::Auth);
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(!handle.is_running());
        assert_eq!(coordinator.mode().await, SyncMode::Guest);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn loop_exits_when_started_in_guest_mode() {
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::new(InMemoryLocalStore::default()),
            Arc::new(FakeRemoteReviewClient::default()),
            "reviewData",
        ));

        let handle = start_periodic_sync(coordinator, Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert!(!handle.is_running());
    }
}

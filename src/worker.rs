//! Event dispatch for the offline worker
//!
//! The host runtime delivers lifecycle, fetch, sync, push and
//! notification-click events; [`ServiceWorker::dispatch`] routes each one to
//! its handler. A small state machine keeps lifecycle ordering intact:
//!
//! ```text
//! Parsed ──install ok──▶ Installed ──activate──▶ Activated
//!    │  │                                             ▲
//!    │  └──resume (shell already on disk)─────────────┘
//!    │
//!    └──install failed──▶ Redundant
//! ```
//!
//! Fetches are only intercepted once the worker is activated; before that
//! every request passes through to the network. A worker reopened over a
//! store that already holds its static generation resumes straight into
//! `Activated` without touching the network.

use crate::cache::usage::mb_to_bytes;
use crate::config::{Config, ConfigManager};
use crate::error::{OfflineError, OfflineResult};
use crate::http::Request;
use crate::interceptor::{Interception, Interceptor};
use crate::lifecycle::{ActivateReport, InstallOutcome, LifecycleManager};
use crate::notify::{ClickOutcome, PushHandler};
use crate::platform::{ClientRegistry, LogNotifier, NoClients, Notification, Notifier};
use crate::store::{CacheStore, DiskStore};
use crate::sync::{BackgroundRefresh, ConfigPlaylistSource, PlaylistSource, SyncOutcome};
use crate::transport::{Transport, UreqTransport};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; this worker never takes control
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed => write!(f, "parsed"),
            Self::Installing => write!(f, "installing"),
            Self::Installed => write!(f, "installed"),
            Self::Activating => write!(f, "activating"),
            Self::Activated => write!(f, "activated"),
            Self::Redundant => write!(f, "redundant"),
        }
    }
}

/// Events delivered by the host runtime
#[derive(Debug, Clone)]
pub enum Event {
    Install,
    Activate,
    Fetch(Request),
    Sync { tag: String },
    Push { payload: Option<String> },
    NotificationClick { action: Option<String> },
}

/// Handler result per event kind
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallOutcome),
    Activated(ActivateReport),
    Fetch(Interception),
    Sync(SyncOutcome),
    Pushed(Notification),
    Clicked(ClickOutcome),
}

/// Collaborators injected into the worker
pub struct Platform {
    pub store: Arc<dyn CacheStore>,
    pub transport: Arc<dyn Transport>,
    pub clients: Arc<dyn ClientRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub playlists: Arc<dyn PlaylistSource>,
}

/// The offline worker: lifecycle, interception, background refresh and push
pub struct ServiceWorker {
    state: RwLock<WorkerState>,
    transition: Mutex<()>,
    lifecycle: LifecycleManager,
    interceptor: Interceptor,
    refresh: BackgroundRefresh,
    push: PushHandler,
}

impl ServiceWorker {
    /// Wire a worker from config and explicit collaborators
    pub fn new(config: &Config, platform: Platform) -> OfflineResult<Self> {
        config.validate()?;
        let origin = config.origin()?;
        let generations = config.generations();
        let manifest = config.manifest()?;

        let lifecycle = LifecycleManager::new(
            Arc::clone(&platform.store),
            Arc::clone(&platform.transport),
            Arc::clone(&platform.clients),
            generations.clone(),
            manifest.clone(),
        )
        .with_quota(config.cache.quota_mb.map(mb_to_bytes));

        let interceptor = Interceptor::new(
            Arc::clone(&platform.store),
            Arc::clone(&platform.transport),
            origin,
            generations.clone(),
            &manifest,
        );

        let refresh = BackgroundRefresh::new(
            config.sync.playlist_tag.clone(),
            Arc::clone(&platform.store),
            Arc::clone(&platform.transport),
            platform.playlists,
            generations,
        );

        let push = PushHandler::new(
            config.app.clone(),
            config.notifications.clone(),
            platform.notifier,
            platform.clients,
        );

        Ok(Self {
            state: RwLock::new(WorkerState::Parsed),
            transition: Mutex::new(()),
            lifecycle,
            interceptor,
            refresh,
            push,
        })
    }

    /// Worker backed by the on-disk store and a real HTTP transport.
    ///
    /// Hosts without client contexts or a notification surface get no-op
    /// collaborators; use [`new`](Self::new) to supply real ones.
    pub async fn open(config: &Config) -> OfflineResult<Self> {
        let store = DiskStore::open_at(ConfigManager::store_dir(config)).await?;
        let platform = Platform {
            store: Arc::new(store),
            transport: Arc::new(UreqTransport::new(config.origin()?, &config.transport)),
            clients: Arc::new(NoClients),
            notifier: Arc::new(LogNotifier),
            playlists: Arc::new(ConfigPlaylistSource::from_strings(&config.sync.playlist_urls)?),
        };
        let worker = Self::new(config, platform)?;
        worker.resume().await?;
        Ok(worker)
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Route one event to its handler
    pub async fn dispatch(&self, event: Event) -> OfflineResult<EventOutcome> {
        match event {
            Event::Install => self.install().await.map(EventOutcome::Installed),
            Event::Activate => self.activate().await.map(EventOutcome::Activated),
            Event::Fetch(request) => Ok(EventOutcome::Fetch(self.fetch(&request).await)),
            Event::Sync { tag } => self.refresh.run(&tag).await.map(EventOutcome::Sync),
            Event::Push { payload } => self
                .push
                .push(payload.as_deref())
                .await
                .map(EventOutcome::Pushed),
            Event::NotificationClick { action } => self
                .push
                .click(action.as_deref())
                .await
                .map(EventOutcome::Clicked),
        }
    }

    /// Take control again after a restart when the current static generation
    /// was installed by a previous run. Returns whether the worker resumed.
    ///
    /// Only valid from `Parsed`; a worker with nothing on disk stays there
    /// and must go through [`install`](Self::install).
    pub async fn resume(&self) -> OfflineResult<bool> {
        let _guard = self.transition.lock().await;
        let state = self.state().await;
        if state != WorkerState::Parsed {
            return Err(OfflineError::InvalidState {
                state: state.to_string(),
                action: "resume".to_string(),
            });
        }

        if !self.lifecycle.is_installed().await? {
            debug!(
                "No installed shell in {}, waiting for install",
                self.lifecycle.generations().static_name()
            );
            return Ok(false);
        }

        info!(
            "Resuming with {} from a previous run",
            self.lifecycle.generations().static_name()
        );
        self.set_state(WorkerState::Activated).await;
        Ok(true)
    }

    /// Precache the application shell. Allowed once, from `Parsed`.
    pub async fn install(&self) -> OfflineResult<InstallOutcome> {
        let _guard = self.transition.lock().await;
        self.enter(WorkerState::Parsed, WorkerState::Installing, "install")
            .await?;

        match self.lifecycle.install().await {
            Ok(outcome) => {
                self.set_state(WorkerState::Installed).await;
                Ok(outcome)
            }
            Err(e) => {
                warn!("Install failed, worker is redundant: {}", e);
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    /// Clean up stale generations and take control. Requires a completed install.
    pub async fn activate(&self) -> OfflineResult<ActivateReport> {
        let _guard = self.transition.lock().await;
        self.enter(WorkerState::Installed, WorkerState::Activating, "activate")
            .await?;

        match self.lifecycle.activate().await {
            Ok(report) => {
                self.set_state(WorkerState::Activated).await;
                Ok(report)
            }
            Err(e) => {
                // Cleanup already ran; the claim can be retried.
                self.set_state(WorkerState::Installed).await;
                Err(e)
            }
        }
    }

    /// Offer a request to the interceptor once activated
    pub async fn fetch(&self, request: &Request) -> Interception {
        if self.state().await != WorkerState::Activated {
            return Interception::PassThrough;
        }
        self.interceptor.handle(request).await
    }

    async fn enter(
        &self,
        expected: WorkerState,
        next: WorkerState,
        action: &str,
    ) -> OfflineResult<()> {
        let mut state = self.state.write().await;
        if *state != expected {
            return Err(OfflineError::InvalidState {
                state: state.to_string(),
                action: action.to_string(),
            });
        }
        *state = next;
        info!("Worker {}", next);
        Ok(())
    }

    async fn set_state(&self, next: WorkerState) {
        *self.state.write().await = next;
        info!("Worker {}", next);
    }
}

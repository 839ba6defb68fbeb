//! Owner of the active generation session for one collection.
//!
//! `UploadControl` validates the selected file, spawns the task that consumes
//! the backend's progress, feeds every input through the session's transition
//! table and runs the resulting effects. Observers follow along through
//! [`ControlEvent`]s.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::{BodyUploadResponse, FittingBackend};
use super::catalog_sync::{CatalogSync, RefreshPolicy};
use super::file_validator;
use super::progress_stream;
use super::viewer_handoff::{self, HandoffReference};
use crate::error::{ErrorKind, FittingResult};
use crate::models::{
    Asset, Collection, GenerationSession, NotificationStore, ProgressEvent, SelectedFile,
    SessionEffect, SessionInput,
};
use crate::settings::ClientSettings;

const EVENT_CAPACITY: usize = 256;

/// Observable changes of an [`UploadControl`].
#[derive(Clone, Debug)]
pub enum ControlEvent {
    /// New session state, published after each applied input
    SessionChanged(GenerationSession),
    /// A finished asset is ready for the adjustment stage
    HandoffReady(HandoffReference),
}

struct ControlState {
    session: GenerationSession,
    /// Stops the whole session: stream, effects and handoff
    cancel: CancellationToken,
    /// Child of `cancel` that only stops the pending handoff
    handoff: CancellationToken,
    /// Completion effects of the session are still running
    settling: bool,
    task: Option<JoinHandle<()>>,
}

struct ControlInner {
    collection: Collection,
    settings: ClientSettings,
    backend: Arc<dyn FittingBackend>,
    catalog: CatalogSync,
    notifications: NotificationStore,
    state: Mutex<ControlState>,
    events: broadcast::Sender<ControlEvent>,
}

/// Runs at most one upload at a time. Cloning hands out another handle to the
/// same control.
#[derive(Clone)]
pub struct UploadControl {
    inner: Arc<ControlInner>,
}

impl UploadControl {
    pub fn new(
        collection: Collection,
        settings: ClientSettings,
        backend: Arc<dyn FittingBackend>,
        catalog: CatalogSync,
        notifications: NotificationStore,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ControlInner {
                collection,
                settings,
                backend,
                catalog,
                notifications,
                state: Mutex::new(ControlState {
                    session: GenerationSession::new(collection, None),
                    cancel: CancellationToken::new(),
                    handoff: CancellationToken::new(),
                    settling: false,
                    task: None,
                }),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.inner.events.subscribe()
    }

    /// Current session state.
    pub fn snapshot(&self) -> GenerationSession {
        self.inner.state.lock().session.clone()
    }

    pub fn notifications(&self) -> &NotificationStore {
        &self.inner.notifications
    }

    pub fn catalog(&self) -> &CatalogSync {
        &self.inner.catalog
    }

    /// Start a new session for `file`.
    ///
    /// Rejected with `SessionBusy` while another session is in flight or
    /// still running its completion effects. A file that fails validation
    /// leaves the new session in `Idle` with the error recorded, and no
    /// request is made. A handoff still pending from the previous session is
    /// dropped. Must be called inside a tokio runtime.
    pub fn start_upload(&self, file: Option<SelectedFile>) -> FittingResult<Uuid> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.session.stage().is_in_flight() || state.settling {
            warn!(session_id = %state.session.id(), "Upload rejected, session busy");
            return Err(ErrorKind::SessionBusy);
        }

        let mut session =
            GenerationSession::new(inner.collection, file.as_ref().map(|f| f.name.clone()));
        session.apply(SessionInput::Begin);

        let checked = file_validator::validate(file.as_ref(), inner.settings.max_upload_size_mb)
            .and_then(|()| file.ok_or(ErrorKind::FileRequired));
        let file = match checked {
            Ok(file) => file,
            Err(kind) => {
                info!(error = %kind, "File rejected before upload");
                let effects = session.apply(SessionInput::ValidationFailed(kind.clone()));
                inner.run_local_effects(&effects);
                state.session = session;
                inner.publish(ControlEvent::SessionChanged(state.session.clone()));
                return Err(kind);
            }
        };

        // The previous task has at most its handoff delay left.
        state.handoff.cancel();

        let id = session.id();
        inner.publish(ControlEvent::SessionChanged(session.clone()));
        let effects = session.apply(SessionInput::ValidationPassed);
        debug!(session_id = %id, ?effects, "Validation passed");

        let cancel = CancellationToken::new();
        let handoff = cancel.child_token();
        state.session = session;
        state.cancel = cancel.clone();
        state.handoff = handoff.clone();
        inner.publish(ControlEvent::SessionChanged(state.session.clone()));

        info!(session_id = %id, collection = %inner.collection, file = %file.name, size = file.size, "Starting upload");
        let tokens = SessionTokens { cancel, handoff };
        state.task = Some(tokio::spawn(inner.clone().drive(id, file, tokens)));
        Ok(id)
    }

    /// Abort the running session. The session moves to `Idle` and nothing
    /// from the aborted request is applied afterwards.
    pub fn cancel(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        state.cancel.cancel();
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.settling = false;
        let effects = state.session.apply(SessionInput::Cancel);
        inner.run_local_effects(&effects);
        inner.publish(ControlEvent::SessionChanged(state.session.clone()));
    }

    /// Wait until the current session's task is done, including its handoff.
    pub async fn join(&self) {
        let task = self.inner.state.lock().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Upload task failed");
                }
            }
        }
    }
}

impl ControlInner {
    fn publish(&self, event: ControlEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Effects that need no I/O.
    fn run_local_effects(&self, effects: &[SessionEffect]) {
        for effect in effects {
            match effect {
                SessionEffect::Notify(level, message) => {
                    self.notifications.push(level.clone(), message.clone());
                }
                SessionEffect::ResetFileInput
                | SessionEffect::OpenStream
                | SessionEffect::CloseStream => {
                    debug!(?effect, "Session effect");
                }
                _ => {}
            }
        }
    }

    async fn drive(self: Arc<Self>, id: Uuid, file: SelectedFile, tokens: SessionTokens) {
        let cancel = &tokens.cancel;
        match self.collection {
            Collection::Clothes => {
                let opened = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    opened = progress_stream::open(self.backend.as_ref(), file, cancel.clone()) => opened,
                };
                let mut events = match opened {
                    Ok(events) => events,
                    Err(e) => {
                        self.apply(id, &tokens, SessionInput::StreamFailed(e)).await;
                        return;
                    }
                };

                while let Some(item) = events.next().await {
                    let input = match item {
                        Ok(event) => SessionInput::Event(event),
                        Err(e) => SessionInput::StreamFailed(e),
                    };
                    if !self.apply(id, &tokens, input).await {
                        return;
                    }
                }
                debug!(session_id = %id, "Progress stream closed");
            }
            Collection::Bodies => {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    result = self.backend.upload_body(file) => result,
                };
                let input = match result {
                    Ok(response) => SessionInput::Event(body_upload_event(response)),
                    Err(e) => SessionInput::StreamFailed(e),
                };
                self.apply(id, &tokens, input).await;
            }
        }
    }

    /// Apply one input to session `id` and run its effects. Returns whether
    /// the session still wants input.
    ///
    /// The session counts as busy from the transition into `Complete` until
    /// the refreshed state is published.
    async fn apply(&self, id: Uuid, tokens: &SessionTokens, input: SessionInput) -> bool {
        let cancel = &tokens.cancel;
        let (effects, snapshot) = {
            let mut state = self.state.lock();
            if cancel.is_cancelled() || state.session.id() != id {
                debug!(session_id = %id, "Dropping input for inactive session");
                return false;
            }
            let effects = state.session.apply(input);
            if effects.iter().any(|e| {
                matches!(
                    e,
                    SessionEffect::InvalidateAsset(_) | SessionEffect::RefreshCatalog(_)
                )
            }) {
                state.settling = true;
            }
            (effects, state.session.clone())
        };

        let mut handoff = None;
        for effect in &effects {
            match effect {
                SessionEffect::InvalidateAsset(url) => {
                    self.catalog.cache().invalidate(url);
                    let thumbnail = snapshot.thumbnail_url().map(str::to_string);
                    if let Some(asset) = Asset::generated(url, thumbnail) {
                        self.catalog
                            .store()
                            .insert_optimistic(snapshot.collection(), asset);
                    }
                }
                SessionEffect::RefreshCatalog(collection) => {
                    // Failures are logged by the catalog and keep the old list.
                    let _ = self
                        .catalog
                        .refresh(*collection, RefreshPolicy::KeepOnError)
                        .await;
                }
                SessionEffect::ScheduleHandoff { asset_url } => handoff = Some(asset_url.clone()),
                _ => {}
            }
        }
        self.run_local_effects(&effects);

        {
            let mut state = self.state.lock();
            if cancel.is_cancelled() || state.session.id() != id {
                return false;
            }
            state.settling = false;
            self.publish(ControlEvent::SessionChanged(state.session.clone()));
        }

        if let Some(asset_url) = handoff {
            tokio::select! {
                biased;
                _ = tokens.handoff.cancelled() => {
                    debug!(session_id = %id, "Handoff dropped");
                    return false;
                }
                _ = tokio::time::sleep(self.settings.handoff_delay()) => {}
            }
            let state = self.state.lock();
            if tokens.handoff.is_cancelled() || state.session.id() != id {
                return false;
            }
            let reference = viewer_handoff::encode_url(&asset_url);
            info!(session_id = %id, reference = %reference, "Handoff ready");
            self.publish(ControlEvent::HandoffReady(reference));
        }

        !snapshot.stage().is_terminal()
    }
}

struct SessionTokens {
    cancel: CancellationToken,
    handoff: CancellationToken,
}

/// Body reconstruction answers in one reply; express it as the terminal
/// event of a stream.
fn body_upload_event(response: BodyUploadResponse) -> ProgressEvent {
    let BodyUploadResponse {
        status,
        models,
        message,
    } = response;

    if status != "success" {
        return ProgressEvent::error(message.unwrap_or_else(|| format!("status '{}'", status)));
    }
    match models.into_iter().next() {
        Some(url) => ProgressEvent::complete(
            url,
            message.unwrap_or_else(|| "Body model generated".to_string()),
        ),
        None => ProgressEvent::error("Backend returned no body model"),
    }
}

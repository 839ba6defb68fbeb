//! Upload-to-result lifecycle of a single generation attempt.
//!
//! `GenerationSession::apply` is the transition table: every input either
//! moves the session to its next stage and returns the side effects the
//! caller must run, or is ignored. Nothing else mutates a session.

use tracing::debug;
use uuid::Uuid;

use super::asset::Collection;
use super::notification_store::NotificationLevel;
use super::progress::{ProgressEvent, ProgressStage};
use crate::error::ErrorKind;

/// Lifecycle stage. Ordered by progression so observers can check that
/// stages never move backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionStage {
    Idle,
    Validating,
    Uploading,
    Generating,
    Complete,
    Error,
}

impl SessionStage {
    /// A session in one of these stages owns a pending or open request.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Validating | Self::Uploading | Self::Generating)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// Inputs that drive the state machine.
#[derive(Clone, Debug)]
pub enum SessionInput {
    /// A file was selected and handed to the validator
    Begin,
    ValidationPassed,
    ValidationFailed(ErrorKind),
    /// The request could not be opened, or the stream broke while reading
    StreamFailed(ErrorKind),
    Event(ProgressEvent),
    /// Explicit cancellation (teardown, user abort)
    Cancel,
}

/// Side effects requested by a transition, in the order they must run.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEffect {
    /// The caller must clear its file input
    ResetFileInput,
    OpenStream,
    CloseStream,
    InvalidateAsset(String),
    RefreshCatalog(Collection),
    ScheduleHandoff { asset_url: String },
    Notify(NotificationLevel, String),
}

#[derive(Clone, Debug)]
pub struct GenerationSession {
    id: Uuid,
    collection: Collection,
    file_name: Option<String>,
    stage: SessionStage,
    progress: f64,
    message: String,
    stage_label: Option<String>,
    thumbnail_url: Option<String>,
    result_asset_url: Option<String>,
    error: Option<ErrorKind>,
}

impl GenerationSession {
    pub fn new(collection: Collection, file_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection,
            file_name,
            stage: SessionStage::Idle,
            progress: 0.0,
            message: String::new(),
            stage_label: None,
            thumbnail_url: None,
            result_asset_url: None,
            error: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    /// Latest reported progress, 0 to 100
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Backend step name of the latest event (`masking`, `inference`, ...)
    pub fn stage_label(&self) -> Option<&str> {
        self.stage_label.as_deref()
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }

    pub fn result_asset_url(&self) -> Option<&str> {
        self.result_asset_url.as_deref()
    }

    pub fn error(&self) -> Option<&ErrorKind> {
        self.error.as_ref()
    }

    /// Apply one input and return the effects the caller has to run.
    pub fn apply(&mut self, input: SessionInput) -> Vec<SessionEffect> {
        use SessionStage::*;

        match (self.stage, input) {
            (_, SessionInput::Cancel) => {
                debug!(session_id = %self.id, from = ?self.stage, "Session cancelled");
                self.stage = Idle;
                self.message = "Cancelled".to_string();
                vec![SessionEffect::CloseStream]
            }
            (Idle, SessionInput::Begin) => {
                self.stage = Validating;
                self.error = None;
                Vec::new()
            }
            // Rejected files never leave Idle: no request was issued for them.
            (Validating, SessionInput::ValidationFailed(kind)) => {
                self.stage = Idle;
                self.message = kind.to_string();
                self.error = Some(kind);
                vec![
                    SessionEffect::ResetFileInput,
                    SessionEffect::Notify(NotificationLevel::Error, self.message.clone()),
                ]
            }
            (Validating, SessionInput::ValidationPassed) => {
                self.stage = Uploading;
                vec![SessionEffect::OpenStream]
            }
            (Uploading, SessionInput::StreamFailed(kind)) => {
                let kind = match kind {
                    ErrorKind::ServerConnection(_) => kind,
                    other => ErrorKind::ServerConnection(other.to_string()),
                };
                self.fail(kind)
            }
            (Uploading, SessionInput::Event(event)) => {
                self.stage = Generating;
                self.apply_event(event)
            }
            (Generating, SessionInput::Event(event)) => self.apply_event(event),
            (Generating, SessionInput::StreamFailed(kind)) => self.fail(kind),
            (stage, input) => {
                debug!(session_id = %self.id, ?stage, ?input, "Ignoring session input");
                Vec::new()
            }
        }
    }

    fn apply_event(&mut self, event: ProgressEvent) -> Vec<SessionEffect> {
        // The latest event wins, even if its progress went down.
        self.progress = event.progress.clamp(0.0, 100.0);
        self.message = event.message.clone();
        self.stage_label = Some(event.stage_label.clone());

        match event.stage {
            ProgressStage::Progress => {
                if event.thumbnail_url.is_some() {
                    self.thumbnail_url = event.thumbnail_url;
                }
                Vec::new()
            }
            ProgressStage::Complete => {
                let Some(url) = event.model_url else {
                    return self.fail(ErrorKind::GenerationFailed(
                        "backend reported completion without a model url".to_string(),
                    ));
                };
                if event.thumbnail_url.is_some() {
                    self.thumbnail_url = event.thumbnail_url;
                }
                self.stage = SessionStage::Complete;
                self.result_asset_url = Some(url.clone());
                vec![
                    SessionEffect::InvalidateAsset(url.clone()),
                    SessionEffect::RefreshCatalog(self.collection),
                    SessionEffect::ScheduleHandoff { asset_url: url },
                    SessionEffect::Notify(NotificationLevel::Success, self.message.clone()),
                ]
            }
            ProgressStage::Error => {
                self.thumbnail_url = None;
                self.fail(ErrorKind::GenerationFailed(event.message))
            }
        }
    }

    fn fail(&mut self, kind: ErrorKind) -> Vec<SessionEffect> {
        self.stage = SessionStage::Error;
        self.message = kind.to_string();
        self.error = Some(kind);
        vec![SessionEffect::Notify(
            NotificationLevel::Error,
            self.message.clone(),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(value: f64, label: &str) -> ProgressEvent {
        ProgressEvent {
            progress: value,
            message: format!("{} {}", label, value),
            stage: ProgressStage::Progress,
            stage_label: label.to_string(),
            thumbnail_url: None,
            model_url: None,
        }
    }

    fn generating_session() -> GenerationSession {
        let mut session = GenerationSession::new(Collection::Clothes, Some("shirt.jpg".into()));
        session.apply(SessionInput::Begin);
        session.apply(SessionInput::ValidationPassed);
        session.apply(SessionInput::Event(progress(0.0, "upload")));
        assert_eq!(session.stage(), SessionStage::Generating);
        session
    }

    #[test]
    fn test_happy_path() {
        let mut session = GenerationSession::new(Collection::Clothes, Some("shirt.jpg".into()));
        assert_eq!(session.stage(), SessionStage::Idle);

        assert!(session.apply(SessionInput::Begin).is_empty());
        assert_eq!(session.stage(), SessionStage::Validating);

        assert_eq!(
            session.apply(SessionInput::ValidationPassed),
            vec![SessionEffect::OpenStream]
        );
        assert_eq!(session.stage(), SessionStage::Uploading);

        let mut first = progress(0.0, "upload");
        first.thumbnail_url = Some("/outputs/clothes/shirt_thumb.jpg".into());
        session.apply(SessionInput::Event(first));
        assert_eq!(session.stage(), SessionStage::Generating);
        assert_eq!(session.thumbnail_url(), Some("/outputs/clothes/shirt_thumb.jpg"));

        session.apply(SessionInput::Event(progress(30.0, "inference")));
        assert_eq!(session.progress(), 30.0);
        assert_eq!(session.stage_label(), Some("inference"));
        // A later event without a thumbnail keeps the earlier one
        assert_eq!(session.thumbnail_url(), Some("/outputs/clothes/shirt_thumb.jpg"));

        let effects = session.apply(SessionInput::Event(ProgressEvent::complete(
            "/outputs/clothes/shirt.glb",
            "Success! 3D model generated.",
        )));
        assert_eq!(session.stage(), SessionStage::Complete);
        assert_eq!(session.result_asset_url(), Some("/outputs/clothes/shirt.glb"));
        assert_eq!(
            effects,
            vec![
                SessionEffect::InvalidateAsset("/outputs/clothes/shirt.glb".into()),
                SessionEffect::RefreshCatalog(Collection::Clothes),
                SessionEffect::ScheduleHandoff {
                    asset_url: "/outputs/clothes/shirt.glb".into()
                },
                SessionEffect::Notify(
                    NotificationLevel::Success,
                    "Success! 3D model generated.".into()
                ),
            ]
        );
    }

    #[test]
    fn test_validation_failure_stays_idle() {
        let mut session = GenerationSession::new(Collection::Clothes, None);
        session.apply(SessionInput::Begin);
        let effects = session.apply(SessionInput::ValidationFailed(ErrorKind::FileRequired));

        assert_eq!(session.stage(), SessionStage::Idle);
        assert_eq!(session.error(), Some(&ErrorKind::FileRequired));
        assert_eq!(effects[0], SessionEffect::ResetFileInput);
        assert!(!effects.contains(&SessionEffect::OpenStream));
    }

    #[test]
    fn test_stream_failure_before_first_event_is_server_connection() {
        let mut session = GenerationSession::new(Collection::Clothes, None);
        session.apply(SessionInput::Begin);
        session.apply(SessionInput::ValidationPassed);
        session.apply(SessionInput::StreamFailed(ErrorKind::Transport(
            "status 502".into(),
        )));

        assert_eq!(session.stage(), SessionStage::Error);
        assert!(matches!(
            session.error(),
            Some(ErrorKind::ServerConnection(detail)) if detail.contains("502")
        ));
    }

    #[test]
    fn test_latest_event_wins_even_when_progress_drops() {
        let mut session = generating_session();
        session.apply(SessionInput::Event(progress(70.0, "inference")));
        session.apply(SessionInput::Event(progress(65.0, "export")));
        assert_eq!(session.progress(), 65.0);
        assert_eq!(session.stage_label(), Some("export"));
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut session = generating_session();
        session.apply(SessionInput::Event(progress(140.0, "export")));
        assert_eq!(session.progress(), 100.0);
        session.apply(SessionInput::Event(progress(-3.0, "export")));
        assert_eq!(session.progress(), 0.0);
    }

    #[test]
    fn test_error_event_clears_thumbnail() {
        let mut session = generating_session();
        let mut with_thumb = progress(10.0, "masking");
        with_thumb.thumbnail_url = Some("/outputs/clothes/a_thumb.jpg".into());
        session.apply(SessionInput::Event(with_thumb));

        session.apply(SessionInput::Event(ProgressEvent::error("CUDA out of memory")));
        assert_eq!(session.stage(), SessionStage::Error);
        assert_eq!(session.thumbnail_url(), None);
        assert_eq!(
            session.error(),
            Some(&ErrorKind::GenerationFailed("CUDA out of memory".into()))
        );
    }

    #[test]
    fn test_complete_without_model_url_fails() {
        let mut session = generating_session();
        let mut event = ProgressEvent::complete("unused", "done");
        event.model_url = None;
        session.apply(SessionInput::Event(event));

        assert_eq!(session.stage(), SessionStage::Error);
        assert_eq!(session.result_asset_url(), None);
    }

    #[test]
    fn test_events_after_terminal_are_ignored() {
        let mut session = generating_session();
        session.apply(SessionInput::Event(ProgressEvent::complete(
            "/outputs/clothes/a.glb",
            "done",
        )));

        let effects = session.apply(SessionInput::Event(progress(5.0, "inference")));
        assert!(effects.is_empty());
        let effects = session.apply(SessionInput::Event(ProgressEvent::error("late")));
        assert!(effects.is_empty());

        assert_eq!(session.stage(), SessionStage::Complete);
        assert_eq!(session.progress(), 100.0);
        assert_eq!(session.result_asset_url(), Some("/outputs/clothes/a.glb"));
    }

    #[test]
    fn test_cancel_from_any_stage() {
        let mut session = generating_session();
        assert_eq!(
            session.apply(SessionInput::Cancel),
            vec![SessionEffect::CloseStream]
        );
        assert_eq!(session.stage(), SessionStage::Idle);

        // Stream events after cancellation do not mutate the session
        assert!(session.apply(SessionInput::Event(progress(90.0, "export"))).is_empty());
        assert_eq!(session.stage(), SessionStage::Idle);
    }

    #[test]
    fn test_begin_ignored_while_in_flight() {
        let mut session = generating_session();
        assert!(session.apply(SessionInput::Begin).is_empty());
        assert_eq!(session.stage(), SessionStage::Generating);
    }

    #[test]
    fn test_stage_ordering() {
        assert!(SessionStage::Idle < SessionStage::Validating);
        assert!(SessionStage::Generating < SessionStage::Complete);
        assert!(SessionStage::Generating.is_in_flight());
        assert!(!SessionStage::Complete.is_in_flight());
        assert!(SessionStage::Error.is_terminal());
    }
}

use std::fmt;

use snafu::{Snafu, ensure};

/// Message shown when a stream fails without saying why.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "An unexpected error occurred while generating a response.";

/// Identifier for one generation session.
///
/// Allocated in increasing order on every accepted submit so events from a
/// superseded stream can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Creates a typed session identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable state of the live submission.
///
/// Only [`GenerationSession::apply`] mutates it. The text grows by append
/// while loading and is cleared only when a new session starts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerationSession {
    session_id: SessionId,
    accumulated_text: String,
    is_loading: bool,
    error: Option<String>,
}

/// Input to the session reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SubmissionStarted(SessionId),
    FragmentReceived {
        session_id: SessionId,
        fragment: String,
    },
    StreamCompleted(SessionId),
    StreamFailed {
        session_id: SessionId,
        message: String,
    },
    /// Submit rejected before any network activity; text and loading stay as they were.
    ValidationFailed { message: String },
    /// Submit rejected for missing configuration; loading is forced off.
    ConfigurationFailed { message: String },
}

/// What one accepted event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionChange {
    pub session_id: SessionId,
    pub text_changed: bool,
    pub loading_changed: bool,
    pub error_changed: bool,
}

impl SessionChange {
    fn unchanged(session_id: SessionId) -> Self {
        Self {
            session_id,
            text_changed: false,
            loading_changed: false,
            error_changed: false,
        }
    }
}

/// Rejection reason for events that must not touch the live session.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum SessionRejection {
    #[snafu(display("event for session {attempted} arrived while session {active} is live"))]
    StaleSession {
        active: SessionId,
        attempted: SessionId,
    },
    #[snafu(display("session {session_id} has already concluded"))]
    SessionConcluded { session_id: SessionId },
    #[snafu(display("session {attempted} does not follow live session {active}"))]
    SessionNotNewer {
        active: SessionId,
        attempted: SessionId,
    },
}

pub type SessionTransitionResult = Result<SessionChange, SessionRejection>;

impl GenerationSession {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns true when stream events tagged with `session_id` would be applied.
    pub fn accepts_stream_event(&self, session_id: SessionId) -> bool {
        self.is_loading && self.session_id == session_id
    }

    /// Applies one event. A rejected event leaves the session untouched.
    ///
    /// Stream events are accepted only for the live session while it is still
    /// loading, so anything a superseded or concluded stream delivers is stale.
    pub fn apply(&mut self, event: SessionEvent) -> SessionTransitionResult {
        match event {
            SessionEvent::SubmissionStarted(session_id) => self.apply_start(session_id),
            SessionEvent::FragmentReceived {
                session_id,
                fragment,
            } => self.apply_fragment(session_id, &fragment),
            SessionEvent::StreamCompleted(session_id) => self.apply_complete(session_id),
            SessionEvent::StreamFailed {
                session_id,
                message,
            } => self.apply_fail(session_id, message),
            SessionEvent::ValidationFailed { message } => Ok(self.apply_rejected_submit(message)),
            SessionEvent::ConfigurationFailed { message } => {
                let loading_changed = self.is_loading;
                self.is_loading = false;
                let mut change = self.apply_rejected_submit(message);
                change.loading_changed = loading_changed;
                Ok(change)
            }
        }
    }

    fn ensure_live(&self, attempted: SessionId) -> Result<(), SessionRejection> {
        ensure!(
            attempted == self.session_id,
            StaleSessionSnafu {
                active: self.session_id,
                attempted,
            }
        );
        ensure!(
            self.is_loading,
            SessionConcludedSnafu {
                session_id: attempted
            }
        );
        Ok(())
    }

    fn apply_start(&mut self, session_id: SessionId) -> SessionTransitionResult {
        ensure!(
            session_id > self.session_id,
            SessionNotNewerSnafu {
                active: self.session_id,
                attempted: session_id,
            }
        );

        let change = SessionChange {
            session_id,
            text_changed: !self.accumulated_text.is_empty(),
            loading_changed: !self.is_loading,
            error_changed: self.error.is_some(),
        };

        self.session_id = session_id;
        self.accumulated_text.clear();
        self.error = None;
        self.is_loading = true;
        Ok(change)
    }

    fn apply_fragment(&mut self, session_id: SessionId, fragment: &str) -> SessionTransitionResult {
        self.ensure_live(session_id)?;

        let mut change = SessionChange::unchanged(session_id);
        if !fragment.is_empty() {
            self.accumulated_text.push_str(fragment);
            change.text_changed = true;
        }
        Ok(change)
    }

    fn apply_complete(&mut self, session_id: SessionId) -> SessionTransitionResult {
        self.ensure_live(session_id)?;

        self.is_loading = false;
        Ok(SessionChange {
            loading_changed: true,
            ..SessionChange::unchanged(session_id)
        })
    }

    fn apply_fail(&mut self, session_id: SessionId, message: String) -> SessionTransitionResult {
        self.ensure_live(session_id)?;

        let message = if message.trim().is_empty() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            message
        };

        self.is_loading = false;
        self.error = Some(message);
        Ok(SessionChange {
            loading_changed: true,
            error_changed: true,
            ..SessionChange::unchanged(session_id)
        })
    }

    fn apply_rejected_submit(&mut self, message: String) -> SessionChange {
        let error_changed = self.error.as_deref() != Some(message.as_str());
        self.error = Some(message);
        SessionChange {
            error_changed,
            ..SessionChange::unchanged(self.session_id)
        }
    }
}

/// Pure form of [`GenerationSession::apply`]: rejected events return the
/// previous session unchanged.
pub fn reduce(mut session: GenerationSession, event: SessionEvent) -> GenerationSession {
    if let Err(rejection) = session.apply(event) {
        tracing::trace!(error = %rejection, "reducer ignored event");
    }
    session
}

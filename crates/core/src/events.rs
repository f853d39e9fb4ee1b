use crate::session::{SessionEvent, SessionId};

/// Provider-agnostic stream payload mapped into session language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventPayload {
    Fragment(String),
    Done,
    Error(String),
}

/// One stream item tagged with the session that opened the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEventMapped {
    pub session_id: SessionId,
    pub payload: StreamEventPayload,
}

impl StreamEventMapped {
    pub fn new(session_id: SessionId, payload: StreamEventPayload) -> Self {
        Self {
            session_id,
            payload,
        }
    }

    /// Maps the tagged payload to the reducer event it drives.
    pub fn into_event(self) -> SessionEvent {
        let session_id = self.session_id;
        match self.payload {
            StreamEventPayload::Fragment(fragment) => SessionEvent::FragmentReceived {
                session_id,
                fragment,
            },
            StreamEventPayload::Done => SessionEvent::StreamCompleted(session_id),
            StreamEventPayload::Error(message) => SessionEvent::StreamFailed {
                session_id,
                message,
            },
        }
    }
}

use std::sync::Arc;

use futures::StreamExt;
use scribe_llm::{ApiKey, FragmentStream, GenerationCapability};
use snafu::{ResultExt, Snafu};
use tokio::sync::mpsc;

use crate::events::{StreamEventMapped, StreamEventPayload};
use crate::session::{
    GenerationSession, SessionChange, SessionEvent, SessionId, SessionRejection,
};

/// Supplies the credential for the generation capability.
///
/// Read on every submit, never cached by the controller.
pub trait CredentialSource: Send + Sync {
    fn api_key(&self) -> Option<ApiKey>;
}

impl<F> CredentialSource for F
where
    F: Fn() -> Option<ApiKey> + Send + Sync,
{
    fn api_key(&self) -> Option<ApiKey> {
        self()
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SubmitError {
    #[snafu(display("Prompt cannot be empty."))]
    EmptyPrompt { stage: &'static str },
    #[snafu(display(
        "API key is not configured. Set the API_KEY environment variable or add `api_key` to the settings file."
    ))]
    MissingCredential { stage: &'static str },
    #[snafu(display("session could not start on `{stage}`: {source}"))]
    SessionRejected {
        stage: &'static str,
        source: SessionRejection,
    },
}

/// Owns the request lifecycle of the live generation session.
///
/// All session writes happen here, on the caller's task. Each submit spawns a
/// pump that forwards its stream's items onto a shared channel tagged with the
/// session they belong to; [`SubmissionController::next_change`] applies them
/// through the reducer, which drops anything from a superseded session.
pub struct SubmissionController {
    generator: Arc<dyn GenerationCapability>,
    credentials: Arc<dyn CredentialSource>,
    session: GenerationSession,
    next_session_id: SessionId,
    event_tx: mpsc::UnboundedSender<StreamEventMapped>,
    event_rx: mpsc::UnboundedReceiver<StreamEventMapped>,
}

impl SubmissionController {
    pub fn new(
        generator: Arc<dyn GenerationCapability>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            generator,
            credentials,
            session: GenerationSession::default(),
            next_session_id: SessionId::new(1),
            event_tx,
            event_rx,
        }
    }

    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_loading()
    }

    /// Starts a new session for `prompt`.
    ///
    /// Must be called inside a tokio runtime. A submit while another session is
    /// loading supersedes it; the old stream keeps running but its events are
    /// discarded. On error the session still records the message so the caller
    /// can render it.
    pub fn submit(&mut self, prompt: &str) -> Result<SessionChange, SubmitError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            let error = EmptyPromptSnafu {
                stage: "submit-validate-prompt",
            }
            .build();
            tracing::debug!("rejected empty prompt");
            self.record_rejected_submit(SessionEvent::ValidationFailed {
                message: error.to_string(),
            });
            return Err(error);
        }

        let Some(api_key) = self.credentials.api_key() else {
            let error = MissingCredentialSnafu {
                stage: "submit-read-credential",
            }
            .build();
            tracing::warn!(
                provider_id = %self.generator.id(),
                "credential missing; generation not attempted"
            );
            self.record_rejected_submit(SessionEvent::ConfigurationFailed {
                message: error.to_string(),
            });
            return Err(error);
        };

        let session_id = self.next_session_id;
        let superseded = self
            .session
            .is_loading()
            .then(|| self.session.session_id());

        let change = self
            .session
            .apply(SessionEvent::SubmissionStarted(session_id))
            .context(SessionRejectedSnafu {
                stage: "submit-start-session",
            })?;

        // Reserve the next id immediately so follow-up submissions never reuse a session.
        self.next_session_id = session_id.next();

        tracing::info!(
            session_id = %session_id,
            superseded = ?superseded,
            provider_id = %self.generator.id(),
            prompt_len = prompt.len(),
            "submission accepted"
        );

        let stream = self.generator.stream_generate(prompt, &api_key);
        tokio::spawn(pump_fragments(session_id, stream, self.event_tx.clone()));

        Ok(change)
    }

    /// Waits for the next stream event that changes the live session.
    ///
    /// Stale events are dropped here and never surface. Pending until an event
    /// for the live session arrives.
    pub async fn next_change(&mut self) -> SessionChange {
        loop {
            // The controller keeps a sender, so the channel never reports closed.
            let Some(event) = self.event_rx.recv().await else {
                return futures::future::pending().await;
            };
            let session_id = event.session_id;

            match self.session.apply(event.into_event()) {
                Ok(change) => {
                    if change.loading_changed {
                        tracing::info!(
                            session_id = %session_id,
                            text_len = self.session.accumulated_text().len(),
                            failed = self.session.error().is_some(),
                            "session concluded"
                        );
                    }
                    return change;
                }
                Err(rejection) => {
                    tracing::debug!(
                        session_id = %session_id,
                        error = %rejection,
                        "dropped stale stream event"
                    );
                }
            }
        }
    }

    /// Applies stream events until the live session stops loading.
    ///
    /// `on_change` runs after every applied change, in order.
    pub async fn run_until_concluded<F>(&mut self, mut on_change: F)
    where
        F: FnMut(&GenerationSession, &SessionChange),
    {
        while self.session.is_loading() {
            let change = self.next_change().await;
            on_change(&self.session, &change);
        }
    }

    fn record_rejected_submit(&mut self, event: SessionEvent) {
        if let Err(rejection) = self.session.apply(event) {
            tracing::error!(error = %rejection, "failed to record submit rejection");
        }
    }
}

/// Forwards one stream's items, tagged with its session, until the stream ends,
/// fails, or the controller is gone.
async fn pump_fragments(
    session_id: SessionId,
    mut stream: FragmentStream,
    event_tx: mpsc::UnboundedSender<StreamEventMapped>,
) {
    while let Some(item) = stream.next().await {
        let payload = match item {
            Ok(fragment) => StreamEventPayload::Fragment(fragment),
            Err(error) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %error,
                    "generation stream failed"
                );
                let _ = event_tx.send(StreamEventMapped::new(
                    session_id,
                    StreamEventPayload::Error(error.to_string()),
                ));
                return;
            }
        };

        if event_tx
            .send(StreamEventMapped::new(session_id, payload))
            .is_err()
        {
            tracing::debug!(session_id = %session_id, "controller dropped; abandoning stream");
            return;
        }
    }

    let _ = event_tx.send(StreamEventMapped::new(session_id, StreamEventPayload::Done));
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::channel::mpsc as fmpsc;
    use futures::stream;
    use scribe_llm::{ProviderError, ProviderResult};

    use super::*;
    use crate::presentation::ScrollFollower;
    use crate::presentation::testing::RecordingRegion;
    use crate::session::GENERIC_FAILURE_MESSAGE;

    /// Hands out prepared streams in submit order and counts calls.
    #[derive(Default)]
    struct ScriptedGenerator {
        streams: Mutex<VecDeque<FragmentStream>>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn with_streams(streams: Vec<FragmentStream>) -> Arc<Self> {
            Arc::new(Self {
                streams: Mutex::new(streams.into()),
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl GenerationCapability for ScriptedGenerator {
        fn id(&self) -> &str {
            "scripted"
        }

        fn stream_generate(&self, prompt: &str, _api_key: &ApiKey) -> FragmentStream {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(prompt.to_string());
            self.streams
                .lock()
                .expect("streams lock")
                .pop_front()
                .unwrap_or_else(|| stream::empty().boxed())
        }
    }

    fn fragments(items: Vec<ProviderResult<String>>) -> FragmentStream {
        stream::iter(items).boxed()
    }

    fn ok(text: &str) -> ProviderResult<String> {
        Ok(text.to_string())
    }

    fn remote(message: &str) -> ProviderResult<String> {
        Err(ProviderError::Remote {
            stage: "test",
            message: message.to_string(),
        })
    }

    fn controllable() -> (fmpsc::UnboundedSender<ProviderResult<String>>, FragmentStream) {
        let (tx, rx) = fmpsc::unbounded();
        (tx, rx.boxed())
    }

    fn with_key() -> Arc<dyn CredentialSource> {
        Arc::new(|| ApiKey::new("sk-test"))
    }

    fn without_key() -> Arc<dyn CredentialSource> {
        Arc::new(|| None::<ApiKey>)
    }

    #[tokio::test]
    async fn blank_prompt_never_reaches_the_generator() {
        let generator = ScriptedGenerator::with_streams(Vec::new());
        let mut controller = SubmissionController::new(generator.clone(), with_key());

        for prompt in ["", "   ", "\n\t "] {
            let error = controller.submit(prompt).expect_err("blank prompt");
            assert!(matches!(error, SubmitError::EmptyPrompt { .. }));
        }

        assert_eq!(generator.calls(), 0);
        assert_eq!(controller.session().error(), Some("Prompt cannot be empty."));
        assert!(!controller.is_loading());
        assert_eq!(controller.session().accumulated_text(), "");
    }

    #[tokio::test]
    async fn blank_prompt_leaves_previous_output_in_place() {
        let generator = ScriptedGenerator::with_streams(vec![fragments(vec![ok("kept")])]);
        let mut controller = SubmissionController::new(generator.clone(), with_key());

        controller.submit("first").expect("accepted");
        controller.run_until_concluded(|_, _| {}).await;

        controller.submit("  ").expect_err("blank prompt");

        assert_eq!(controller.session().accumulated_text(), "kept");
        assert_eq!(controller.session().error(), Some("Prompt cannot be empty."));
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn missing_credential_never_starts_loading() {
        let generator = ScriptedGenerator::with_streams(Vec::new());
        let mut controller = SubmissionController::new(generator.clone(), without_key());

        let error = controller.submit("hello").expect_err("no credential");

        assert!(matches!(error, SubmitError::MissingCredential { .. }));
        assert_eq!(generator.calls(), 0);
        assert!(!controller.is_loading());
        assert_eq!(controller.session().error(), Some(error.to_string().as_str()));
    }

    #[tokio::test]
    async fn credential_is_read_on_every_submit() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let credentials: Arc<dyn CredentialSource> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ApiKey::new("sk-test")
        });
        let generator = ScriptedGenerator::with_streams(Vec::new());
        let mut controller = SubmissionController::new(generator, credentials);

        controller.submit("one").expect("accepted");
        controller.run_until_concluded(|_, _| {}).await;
        controller.submit("two").expect("accepted");
        controller.run_until_concluded(|_, _| {}).await;

        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn prompt_is_trimmed_before_generation() {
        let generator = ScriptedGenerator::with_streams(Vec::new());
        let mut controller = SubmissionController::new(generator.clone(), with_key());

        controller.submit("  tell me a story \n").expect("accepted");

        assert_eq!(
            generator.prompts.lock().expect("prompts lock").as_slice(),
            ["tell me a story".to_string()]
        );
    }

    #[tokio::test]
    async fn fragments_stream_through_each_intermediate_state() {
        let generator = ScriptedGenerator::with_streams(vec![fragments(vec![
            ok("Hel"),
            ok("lo, "),
            ok("world!"),
        ])]);
        let mut controller = SubmissionController::new(generator, with_key());

        controller.submit("greet").expect("accepted");
        assert_eq!(controller.session().accumulated_text(), "");
        assert!(controller.is_loading());

        let mut observed = vec![(controller.session().accumulated_text().to_string(), true)];
        controller
            .run_until_concluded(|session, _| {
                observed.push((session.accumulated_text().to_string(), session.is_loading()));
            })
            .await;

        assert_eq!(
            observed,
            vec![
                ("".to_string(), true),
                ("Hel".to_string(), true),
                ("Hello, ".to_string(), true),
                ("Hello, world!".to_string(), true),
                ("Hello, world!".to_string(), false),
            ]
        );
        assert_eq!(controller.session().error(), None);
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_text() {
        let generator =
            ScriptedGenerator::with_streams(vec![fragments(vec![ok("Par"), remote("rate limited")])]);
        let mut controller = SubmissionController::new(generator, with_key());

        controller.submit("go").expect("accepted");
        controller.run_until_concluded(|_, _| {}).await;

        assert_eq!(controller.session().accumulated_text(), "Par");
        assert_eq!(controller.session().error(), Some("rate limited"));
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn failure_before_any_fragment_uses_fallback_for_blank_message() {
        let generator = ScriptedGenerator::with_streams(vec![fragments(vec![remote("")])]);
        let mut controller = SubmissionController::new(generator, with_key());

        controller.submit("go").expect("accepted");
        controller.run_until_concluded(|_, _| {}).await;

        assert_eq!(controller.session().accumulated_text(), "");
        assert_eq!(controller.session().error(), Some(GENERIC_FAILURE_MESSAGE));
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn stale_stream_cannot_write_into_new_session() {
        let (first_tx, first_stream) = controllable();
        let (second_tx, second_stream) = controllable();
        let generator = ScriptedGenerator::with_streams(vec![first_stream, second_stream]);
        let mut controller = SubmissionController::new(generator, with_key());

        controller.submit("first").expect("accepted");
        first_tx.unbounded_send(ok("old")).expect("first stream open");
        let change = controller.next_change().await;
        assert!(change.text_changed);
        assert_eq!(controller.session().accumulated_text(), "old");

        controller.submit("second").expect("superseding submit");
        assert_eq!(controller.session().accumulated_text(), "");
        assert!(controller.is_loading());

        // The superseded stream keeps delivering and then finishes.
        first_tx.unbounded_send(ok(" stale")).expect("first stream open");
        first_tx
            .unbounded_send(remote("stale failure"))
            .expect("first stream open");
        drop(first_tx);
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        second_tx.unbounded_send(ok("new")).expect("second stream open");
        controller.next_change().await;
        assert_eq!(controller.session().accumulated_text(), "new");
        assert!(controller.is_loading());
        assert_eq!(controller.session().error(), None);

        drop(second_tx);
        controller.run_until_concluded(|_, _| {}).await;

        assert_eq!(controller.session().accumulated_text(), "new");
        assert_eq!(controller.session().error(), None);
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn final_text_is_concatenation_in_delivery_order() {
        let cases: Vec<Vec<&str>> = vec![
            vec!["a"],
            vec!["a", "b", "c", "d", "e"],
            vec!["line one\n", "line two\n", "", "tail"],
            vec!["ü", "ñ", "ï", "c", "ø", "d", "é"],
            vec!["repeat", "repeat", "repeat"],
        ];

        for case in cases {
            let generator = ScriptedGenerator::with_streams(vec![fragments(
                case.iter().map(|text| ok(text)).collect(),
            )]);
            let mut controller = SubmissionController::new(generator, with_key());

            controller.submit("go").expect("accepted");
            let mut lengths = vec![0];
            controller
                .run_until_concluded(|session, _| lengths.push(session.accumulated_text().len()))
                .await;

            assert_eq!(controller.session().accumulated_text(), case.concat());
            assert!(lengths.windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }

    #[tokio::test]
    async fn scroll_follows_text_changes_only() {
        let generator = ScriptedGenerator::with_streams(vec![fragments(vec![
            ok("Hel"),
            ok("lo, "),
            ok("world!"),
        ])]);
        let mut controller = SubmissionController::new(generator, with_key());
        let follower = ScrollFollower::new();
        let mut region = RecordingRegion::default();

        let start = controller.submit("greet").expect("accepted");
        // Starting from an empty session changes nothing visible in the text.
        assert!(!follower.present(controller.session(), &start, &mut region));

        let mut text_changes = 0;
        controller
            .run_until_concluded(|session, change| {
                if change.text_changed {
                    text_changes += 1;
                }
                follower.present(session, change, &mut region);
            })
            .await;

        assert_eq!(text_changes, 3);
        assert_eq!(region.scroll_calls, 3);
        assert_eq!(region.renders.len(), 5);
    }

    #[tokio::test]
    async fn resubmit_after_error_starts_fresh_session() {
        let generator = ScriptedGenerator::with_streams(vec![
            fragments(vec![ok("Par"), remote("rate limited")]),
            fragments(vec![ok("Full answer")]),
        ]);
        let mut controller = SubmissionController::new(generator, with_key());

        controller.submit("go").expect("accepted");
        controller.run_until_concluded(|_, _| {}).await;
        let first = controller.session().session_id();

        controller.submit("go again").expect("accepted");
        assert_eq!(controller.session().error(), None);
        controller.run_until_concluded(|_, _| {}).await;

        assert!(controller.session().session_id() > first);
        assert_eq!(controller.session().accumulated_text(), "Full answer");
        assert_eq!(controller.session().error(), None);
    }
}

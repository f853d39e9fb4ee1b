use std::io::Write;

use scribe_core::{
    DisplayState, OutputRegion, ScrollFollower, SessionChange, SubmissionController, SubmitError,
};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::input::PromptInput;
use crate::terminal::TerminalRegion;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("{source}"))]
    Submit {
        stage: &'static str,
        source: SubmitError,
    },
    #[snafu(display("generation failed: {message}"))]
    Generation {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("failed to create generator on `{stage}`: {source}"))]
    Provider {
        stage: &'static str,
        source: scribe_llm::ProviderError,
    },
    #[snafu(display("failed to save settings on `{stage}`: {source}"))]
    Settings {
        stage: &'static str,
        source: crate::settings::SettingsError,
    },
    #[snafu(display("failed to read prompt input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
}

enum Step {
    Line(std::io::Result<Option<String>>),
    Change(SessionChange),
}

/// Single-screen shell wiring the prompt input, the controller and the output region.
pub struct StreamApp<W: Write> {
    controller: SubmissionController,
    input: PromptInput,
    region: TerminalRegion<W>,
    follower: ScrollFollower,
}

impl<W: Write> StreamApp<W> {
    pub fn new(
        controller: SubmissionController,
        input: PromptInput,
        region: TerminalRegion<W>,
    ) -> Self {
        Self {
            controller,
            input,
            region,
            follower: ScrollFollower::new(),
        }
    }

    pub fn controller(&self) -> &SubmissionController {
        &self.controller
    }

    pub fn into_region(self) -> TerminalRegion<W> {
        self.region
    }

    /// Submits one prompt and streams it to completion.
    pub async fn run_once(&mut self, prompt: &str) -> Result<(), AppError> {
        self.input.set_text(prompt);
        let prompt = self.input.take_submission(false).unwrap_or_default();
        self.submit(&prompt).context(SubmitSnafu {
            stage: "one-shot-submit",
        })?;

        let Self {
            controller,
            region,
            follower,
            ..
        } = self;
        controller
            .run_until_concluded(|session, change| {
                follower.present(session, change, region);
            })
            .await;

        match self.controller.session().error() {
            Some(message) => GenerationSnafu {
                stage: "one-shot-conclude",
                message: message.to_string(),
            }
            .fail(),
            None => Ok(()),
        }
    }

    /// Reads prompts line by line until `lines` is exhausted.
    ///
    /// Stream output keeps rendering while the next line is awaited. Lines are
    /// only read while the input is enabled, so under the supersede policy a new
    /// prompt may replace a session that is still streaming.
    pub async fn run_interactive<R>(&mut self, lines: R) -> Result<(), AppError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = lines.lines();
        let mut input_open = true;

        loop {
            if !input_open && !self.controller.is_loading() {
                return Ok(());
            }

            let loading = self.controller.is_loading();
            let accepting = input_open && self.input.is_enabled(loading);
            let step = tokio::select! {
                line = lines.next_line(), if accepting => Step::Line(line),
                change = self.controller.next_change(), if loading => Step::Change(change),
                else => return Ok(()),
            };

            match step {
                Step::Line(Ok(Some(line))) => {
                    self.input.set_text(line);
                    let Some(prompt) = self.input.take_submission(self.controller.is_loading())
                    else {
                        tracing::debug!("input disabled while a session is loading");
                        continue;
                    };
                    if let Err(error) = self.submit(&prompt) {
                        tracing::debug!(error = %error, "submission rejected");
                    }
                }
                Step::Line(Ok(None)) => {
                    input_open = false;
                }
                Step::Line(Err(source)) => {
                    return Err(source).context(ReadInputSnafu {
                        stage: "interactive-read-line",
                    });
                }
                Step::Change(change) => self.present(&change),
            }
        }
    }

    fn submit(&mut self, prompt: &str) -> Result<(), SubmitError> {
        match self.controller.submit(prompt) {
            Ok(change) => {
                self.present(&change);
                Ok(())
            }
            Err(error) => {
                // The rejection is recorded on the session; only the error panel changes.
                self.region
                    .render(&DisplayState::compose(self.controller.session()));
                Err(error)
            }
        }
    }

    fn present(&mut self, change: &SessionChange) {
        self.follower
            .present(self.controller.session(), change, &mut self.region);
    }
}

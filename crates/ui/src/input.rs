/// Whether the input accepts a new prompt while a session is loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResubmitPolicy {
    /// A new prompt replaces the session that is still streaming.
    #[default]
    Supersede,
    /// Input is disabled until the live session concludes.
    WaitForCompletion,
}

/// Prompt text box state.
///
/// Owns the prompt text and decides when a submission may be handed to the
/// controller. Validation of the prompt itself is left to the controller.
#[derive(Debug, Clone, Default)]
pub struct PromptInput {
    text: String,
    policy: ResubmitPolicy,
}

impl PromptInput {
    pub fn new(policy: ResubmitPolicy) -> Self {
        Self {
            text: String::new(),
            policy,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn is_enabled(&self, is_loading: bool) -> bool {
        match self.policy {
            ResubmitPolicy::Supersede => true,
            ResubmitPolicy::WaitForCompletion => !is_loading,
        }
    }

    /// Takes the trimmed prompt for submission and clears the box.
    ///
    /// Returns `None` and keeps the text when the input is disabled.
    pub fn take_submission(&mut self, is_loading: bool) -> Option<String> {
        if !self.is_enabled(is_loading) {
            return None;
        }

        let content = self.text.trim().to_string();
        self.text.clear();
        Some(content)
    }
}

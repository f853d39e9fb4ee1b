use crate::session::GenerationSession;

/// Response region contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsePanel<'a> {
    pub text: &'a str,
    /// More fragments may still arrive.
    pub streaming: bool,
}

/// What the output area shows for one session snapshot.
///
/// The error panel is independent of the rest, so partial text and an error
/// can be visible together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayState<'a> {
    pub indicator: bool,
    pub response: Option<ResponsePanel<'a>>,
    pub error: Option<&'a str>,
}

impl<'a> DisplayState<'a> {
    pub fn compose(session: &'a GenerationSession) -> Self {
        let text = session.accumulated_text();
        let has_text = !text.is_empty();

        Self {
            indicator: session.is_loading() && !has_text,
            response: has_text.then_some(ResponsePanel {
                text,
                streaming: session.is_loading(),
            }),
            error: session.error(),
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.indicator && self.response.is_none() && self.error.is_none()
    }
}

use crate::display::DisplayState;
use crate::session::{GenerationSession, SessionChange};

/// Scrollable surface the session is rendered into.
pub trait OutputRegion {
    fn render(&mut self, display: &DisplayState<'_>);
    fn scroll_offset(&self) -> usize;
    fn max_scroll_offset(&self) -> usize;
    fn set_scroll_offset(&mut self, offset: usize);
}

/// Keeps the output region pinned to the newest text.
///
/// Invoked by the caller after each applied change, once the content has been
/// re-rendered. It scrolls only when the accumulated text changed, so loading
/// or error toggles never move the view.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollFollower;

impl ScrollFollower {
    pub fn new() -> Self {
        Self
    }

    /// Returns true when the region was scrolled.
    pub fn after_change(&self, change: &SessionChange, region: &mut dyn OutputRegion) -> bool {
        if !change.text_changed {
            return false;
        }

        let target = region.max_scroll_offset();
        region.set_scroll_offset(target);
        true
    }

    /// Renders the session and then follows the tail for this change.
    pub fn present(
        &self,
        session: &GenerationSession,
        change: &SessionChange,
        region: &mut dyn OutputRegion,
    ) -> bool {
        region.render(&DisplayState::compose(session));
        self.after_change(change, region)
    }
}

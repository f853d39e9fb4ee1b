use std::io::{self, Write};

use scribe_core::{DisplayState, OutputRegion};

pub const GENERATING_LABEL: &str = "Generating response...";
pub const ERROR_LABEL: &str = "Error:";

/// Output region backed by an append-only terminal stream.
///
/// Only the newly appended suffix of the response is written, so the terminal
/// scrollback is the scrollable container. The offset models a viewport of
/// `rows` lines over that scrollback.
pub struct TerminalRegion<W: Write> {
    out: W,
    rows: usize,
    printed: usize,
    lines: usize,
    offset: usize,
    streaming: bool,
    indicator_shown: bool,
    error_shown: Option<String>,
}

impl<W: Write> TerminalRegion<W> {
    pub fn new(out: W, rows: usize) -> Self {
        Self {
            out,
            rows: rows.max(1),
            printed: 0,
            lines: 0,
            offset: 0,
            streaming: false,
            indicator_shown: false,
            error_shown: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_display(&mut self, display: &DisplayState<'_>) -> io::Result<()> {
        if display.response.is_none() {
            if self.printed > 0 {
                writeln!(self.out)?;
            }
            self.printed = 0;
            self.lines = 0;
            self.offset = 0;
            self.streaming = false;
        }

        if display.indicator && !self.indicator_shown {
            writeln!(self.out, "{GENERATING_LABEL}")?;
        }
        self.indicator_shown = display.indicator;

        if let Some(panel) = display.response {
            // Shorter text than what is already on screen means a new session.
            if panel.text.len() < self.printed || !panel.text.is_char_boundary(self.printed) {
                writeln!(self.out)?;
                self.printed = 0;
            }

            let fresh = &panel.text[self.printed..];
            if !fresh.is_empty() {
                write!(self.out, "{fresh}")?;
                self.printed = panel.text.len();
            }
            self.lines = panel.text.matches('\n').count() + 1;

            if self.streaming && !panel.streaming {
                writeln!(self.out)?;
            }
            self.streaming = panel.streaming;
        }

        // An error line would split a response that is still being written.
        let holds_error = display.response.is_some_and(|panel| panel.streaming);
        match display.error {
            Some(_) if holds_error => {}
            Some(message) if self.error_shown.as_deref() != Some(message) => {
                writeln!(self.out, "{ERROR_LABEL} {message}")?;
                self.error_shown = Some(message.to_string());
            }
            Some(_) => {}
            None => self.error_shown = None,
        }

        Ok(())
    }
}

impl<W: Write> OutputRegion for TerminalRegion<W> {
    fn render(&mut self, display: &DisplayState<'_>) {
        if let Err(error) = self.write_display(display) {
            tracing::warn!(error = %error, "failed to write output region");
        }
    }

    fn scroll_offset(&self) -> usize {
        self.offset
    }

    fn max_scroll_offset(&self) -> usize {
        self.lines.saturating_sub(self.rows)
    }

    fn set_scroll_offset(&mut self, offset: usize) {
        self.offset = offset.min(self.max_scroll_offset());
        // The tail only becomes visible once buffered output reaches the terminal.
        if let Err(error) = self.out.flush() {
            tracing::warn!(error = %error, "failed to flush output region");
        }
    }
}

// ABOUTME: Terminal emulator for rendering relay output in the TUI
// Processes ANSI escape codes, keeps a raw transcript, and renders the screen as a ratatui widget

//! Terminal screen emulation and rendering.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Widget},
};
use tracing::trace;

const DEFAULT_SCROLLBACK: usize = 10_000;
const DEFAULT_TRANSCRIPT_LIMIT: usize = 1024 * 1024;

/// The screen a terminal session writes into.
pub trait TerminalScreen {
    /// Append raw terminal output, escape sequences included
    fn write(&mut self, data: &str);

    /// Append a session status message on a line of its own
    fn write_status(&mut self, line: &str);

    /// Change the geometry; a no-op once disposed
    fn resize(&mut self, rows: u16, cols: u16);

    /// Current geometry as (rows, cols)
    fn size(&self) -> (u16, u16);

    /// Release the screen. Later writes are ignored.
    fn dispose(&mut self);
}

/// VT100 terminal emulator backing the session view
pub struct TerminalEmulator {
    /// VT100 parser for processing ANSI escape codes
    parser: vt100::Parser,

    /// Everything written, in arrival order, bounded by `transcript_limit` bytes
    transcript: String,
    transcript_limit: usize,

    /// Terminal dimensions
    rows: u16,
    cols: u16,

    disposed: bool,
}

impl TerminalEmulator {
    /// Emulator with the default transcript bound
    pub fn new(rows: u16, cols: u16) -> Self {
        Self::with_transcript_limit(rows, cols, DEFAULT_TRANSCRIPT_LIMIT)
    }

    /// Emulator keeping at most `transcript_limit` bytes of raw output
    pub fn with_transcript_limit(rows: u16, cols: u16, transcript_limit: usize) -> Self {
        Self {
            parser: vt100::Parser::new(rows, cols, DEFAULT_SCROLLBACK),
            transcript: String::new(),
            transcript_limit,
            rows,
            cols,
            disposed: false,
        }
    }

    /// Raw output as received, without escape processing
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Text currently visible on the emulated screen
    pub fn contents(&self) -> String {
        self.parser.screen().contents()
    }

    /// Whether [`TerminalScreen::dispose`] has run
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Scroll up by n lines
    pub fn scroll_up(&mut self, n: usize) {
        let offset = self.scroll_offset().saturating_add(n);
        self.parser.set_scrollback(offset);
    }

    /// Scroll down by n lines
    pub fn scroll_down(&mut self, n: usize) {
        let offset = self.scroll_offset().saturating_sub(n);
        self.parser.set_scrollback(offset);
    }

    /// Return to the live screen
    pub fn scroll_to_bottom(&mut self) {
        self.parser.set_scrollback(0);
    }

    /// Lines scrolled back from the live screen (0 = bottom/latest)
    pub fn scroll_offset(&self) -> usize {
        self.parser.screen().scrollback()
    }

    fn append(&mut self, data: &str) {
        if self.disposed {
            trace!("Dropping {} bytes written to a disposed terminal", data.len());
            return;
        }

        self.parser.process(data.as_bytes());
        self.parser.set_scrollback(0);

        self.transcript.push_str(data);
        if self.transcript.len() > self.transcript_limit {
            let mut cut = self.transcript.len() - self.transcript_limit;
            while !self.transcript.is_char_boundary(cut) {
                cut += 1;
            }
            self.transcript.drain(..cut);
        }
    }
}

impl TerminalScreen for TerminalEmulator {
    fn write(&mut self, data: &str) {
        trace!("Terminal emulator processing {} bytes of output", data.len());
        self.append(data);
    }

    fn write_status(&mut self, line: &str) {
        self.append(&format!("\r\n\x1b[1;33m[{line}]\x1b[0m\r\n"));
    }

    fn resize(&mut self, rows: u16, cols: u16) {
        if self.disposed || (rows == self.rows && cols == self.cols) {
            return;
        }
        self.rows = rows;
        self.cols = cols;
        self.parser.set_size(rows, cols);
    }

    fn size(&self) -> (u16, u16) {
        (self.rows, self.cols)
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }
}

/// Renders a [`TerminalEmulator`] screen into a ratatui buffer
pub struct TerminalView<'a> {
    emulator: &'a TerminalEmulator,
    block: Option<Block<'a>>,
}

impl<'a> TerminalView<'a> {
    /// View of `emulator` without a surrounding block
    pub const fn new(emulator: &'a TerminalEmulator) -> Self {
        Self {
            emulator,
            block: None,
        }
    }

    /// Draw `block` around the screen
    #[must_use]
    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }

    /// Convert VT100 cell attributes to ratatui Style
    fn cell_to_style(cell: &vt100::Cell) -> Style {
        let mut style = Style::default();

        style = match cell.fgcolor() {
            vt100::Color::Default => style,
            vt100::Color::Idx(n) => style.fg(Self::ansi_to_ratatui_color(n)),
            vt100::Color::Rgb(r, g, b) => style.fg(Color::Rgb(r, g, b)),
        };

        style = match cell.bgcolor() {
            vt100::Color::Default => style,
            vt100::Color::Idx(n) => style.bg(Self::ansi_to_ratatui_color(n)),
            vt100::Color::Rgb(r, g, b) => style.bg(Color::Rgb(r, g, b)),
        };

        if cell.bold() {
            style = style.add_modifier(Modifier::BOLD);
        }
        if cell.italic() {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if cell.underline() {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
        if cell.inverse() {
            style = style.add_modifier(Modifier::REVERSED);
        }

        style
    }

    /// Convert ANSI color index to ratatui Color
    const fn ansi_to_ratatui_color(idx: u8) -> Color {
        match idx {
            0 => Color::Black,
            1 => Color::Red,
            2 => Color::Green,
            3 => Color::Yellow,
            4 => Color::Blue,
            5 => Color::Magenta,
            6 => Color::Cyan,
            7 => Color::Gray,
            8 => Color::DarkGray,
            9 => Color::LightRed,
            10 => Color::LightGreen,
            11 => Color::LightYellow,
            12 => Color::LightBlue,
            13 => Color::LightMagenta,
            14 => Color::LightCyan,
            15 => Color::White,
            n => Color::Indexed(n),
        }
    }
}

impl Widget for TerminalView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner = match self.block {
            Some(block) => {
                let inner = block.inner(area);
                block.render(area, buf);
                inner
            }
            None => area,
        };

        let screen = self.emulator.parser.screen();
        let (rows, cols) = screen.size();

        for row in 0..rows.min(inner.height) {
            for col in 0..cols.min(inner.width) {
                let Some(cell) = screen.cell(row, col) else {
                    continue;
                };
                // The wide character to the left already covers this column
                if cell.is_wide_continuation() {
                    continue;
                }
                let contents = cell.contents();
                let symbol = if contents.is_empty() { " " } else { contents.as_str() };
                buf.get_mut(inner.x + col, inner.y + row)
                    .set_symbol(symbol)
                    .set_style(Self::cell_to_style(cell));
            }
        }

        let scroll_offset = self.emulator.scroll_offset();

        // Render cursor if visible and at bottom
        if scroll_offset == 0 && !screen.hide_cursor() && inner.width > 0 && inner.height > 0 {
            let (cursor_y, cursor_x) = screen.cursor_position();
            if cursor_x < inner.width && cursor_y < inner.height {
                buf.get_mut(inner.x + cursor_x, inner.y + cursor_y)
                    .set_style(Style::default().add_modifier(Modifier::REVERSED));
            }
        }

        // Render scroll indicator
        if scroll_offset > 0 && area.width > 4 {
            let indicator = format!(" ▲ {scroll_offset} lines above ");
            buf.set_stringn(
                area.x + 2,
                area.y,
                indicator,
                usize::from(area.width - 4),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            );
        }
    }
}

use spin::Mutex;

use crate::constants::vga::{CELL_COUNT, TTY_HEIGHT, VGA_HEIGHT, VGA_WIDTH};
use crate::keyboard::KeyHandler;

/// The 16-entry VGA text palette.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

impl Color {
    fn from_nibble(value: u8) -> Color {
        // SAFETY: all 16 nibble values are declared palette entries.
        unsafe { core::mem::transmute(value & 0x0f) }
    }
}

/// Foreground/background pair for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryColor {
    pub foreground: Color,
    pub background: Color,
}

impl EntryColor {
    pub const fn new(foreground: Color, background: Color) -> EntryColor {
        EntryColor {
            foreground,
            background,
        }
    }
}

/// A single character cell before packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub character: u8,
    pub color: EntryColor,
}

impl Entry {
    pub const fn new(character: u8, color: EntryColor) -> Entry {
        Entry { character, color }
    }

    /// Packs the entry into the VGA text cell layout:
    /// character byte, foreground nibble, background nibble.
    pub fn pack(self) -> u16 {
        (self.character as u16)
            | (self.color.foreground as u16) << 8
            | (self.color.background as u16) << 12
    }

    pub fn unpack(packed: u16) -> Entry {
        Entry {
            character: (packed & 0xff) as u8,
            color: EntryColor {
                foreground: Color::from_nibble((packed >> 8) as u8),
                background: Color::from_nibble((packed >> 12) as u8),
            },
        }
    }
}

const DEFAULT_COLOR: EntryColor = EntryColor::new(Color::White, Color::Black);

/// Mutable portion of a terminal, kept behind the terminal's lock.
pub(crate) struct TermState {
    pub(crate) cells: [u16; CELL_COUNT],
    pub(crate) cursor_row: usize,
    pub(crate) cursor_col: usize,
    pub(crate) color: EntryColor,
    pub(crate) cursor_visible: bool,
}

impl TermState {
    const fn new() -> TermState {
        TermState {
            cells: [0; CELL_COUNT],
            cursor_row: 0,
            cursor_col: 0,
            color: DEFAULT_COLOR,
            cursor_visible: false,
        }
    }

    fn index(x: usize, y: usize) -> usize {
        y * VGA_WIDTH + x
    }

    fn set_entry_at(&mut self, entry: Entry, x: usize, y: usize) {
        self.cells[Self::index(x, y)] = entry.pack();
    }

    fn entry_at(&self, x: usize, y: usize) -> Entry {
        Entry::unpack(self.cells[Self::index(x, y)])
    }

    fn blank(&self) -> Entry {
        Entry::new(b' ', self.color)
    }

    /// Scrolls the visible region up by one row and blanks the vacated row.
    /// The reserved scratchpad row is left untouched.
    fn move_up(&mut self) {
        for y in 1..TTY_HEIGHT {
            for x in 0..VGA_WIDTH {
                let entry = self.entry_at(x, y);
                self.set_entry_at(entry, x, y - 1);
            }
        }

        let blank = self.blank();
        for x in 0..VGA_WIDTH {
            self.set_entry_at(blank, x, TTY_HEIGHT - 1);
        }
    }

    fn next_line(&mut self) {
        self.cursor_col = 0;
        self.cursor_row += 1;

        if self.cursor_row == TTY_HEIGHT {
            self.cursor_row = TTY_HEIGHT - 1;
            self.move_up();
        }
    }

    fn next_char(&mut self) {
        self.cursor_col += 1;

        if self.cursor_col == VGA_WIDTH {
            self.next_line();
        }
    }

    fn put_entry(&mut self, entry: Entry) {
        if entry.character == b'\n' {
            self.next_line();
            return;
        }

        self.set_entry_at(entry, self.cursor_col, self.cursor_row);
        self.next_char();
    }

    fn put_byte(&mut self, byte: u8) {
        let byte = match byte {
            0x20..=0x7e | b'\n' => byte,
            _ => 0xfe,
        };
        self.put_entry(Entry::new(byte, self.color));
    }

    fn clear(&mut self, background: Color) {
        self.cursor_row = 0;
        self.cursor_col = 0;
        self.color = EntryColor::new(Color::White, background);

        let blank = self.blank();
        for y in 0..VGA_HEIGHT {
            for x in 0..VGA_WIDTH {
                self.set_entry_at(blank, x, y);
            }
        }
    }
}

impl core::fmt::Write for TermState {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            self.put_byte(byte);
        }
        Ok(())
    }
}

/// An off-screen virtual terminal.
///
/// All writes land in the owned cell grid; nothing reaches the physical
/// display until the compositor flushes this terminal while it is active.
pub struct Terminal {
    state: Mutex<TermState>,
    handler: Mutex<Option<&'static dyn KeyHandler>>,
}

impl Terminal {
    pub const fn new() -> Terminal {
        Terminal {
            state: Mutex::new(TermState::new()),
            handler: Mutex::new(None),
        }
    }

    /// Clears to the default black background.
    pub fn initialize(&self) {
        self.clear(Color::Black);
    }

    pub fn clear(&self, background: Color) {
        self.state.lock().clear(background);
    }

    pub fn set_color(&self, color: EntryColor) {
        self.state.lock().color = color;
    }

    /// Direct cell write for out-of-band rendering. The caller is
    /// responsible for keeping `x`/`y` inside the grid.
    pub fn set_entry_at(&self, entry: Entry, x: usize, y: usize) {
        self.state.lock().set_entry_at(entry, x, y);
    }

    /// Like [`Terminal::set_entry_at`], using the current color.
    pub fn set_char_at(&self, c: char, x: usize, y: usize) {
        let mut state = self.state.lock();
        let entry = Entry::new(c as u8, state.color);
        state.set_entry_at(entry, x, y);
    }

    pub fn entry_at(&self, x: usize, y: usize) -> Entry {
        self.state.lock().entry_at(x, y)
    }

    pub fn write_str(&self, s: &str) {
        let mut state = self.state.lock();
        for byte in s.bytes() {
            state.put_byte(byte);
        }
    }

    pub fn write_fmt(&self, args: core::fmt::Arguments) -> core::fmt::Result {
        core::fmt::Write::write_fmt(&mut *self.state.lock(), args)
    }

    pub fn cursor(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.cursor_col, state.cursor_row)
    }

    pub fn set_cursor(&self, col: usize, row: usize) {
        let mut state = self.state.lock();
        state.cursor_col = col;
        state.cursor_row = row;
    }

    pub fn set_cursor_visible(&self, visible: bool) {
        self.state.lock().cursor_visible = visible;
    }

    pub fn set_handler(&self, handler: &'static dyn KeyHandler) {
        *self.handler.lock() = Some(handler);
    }

    pub fn handler(&self) -> Option<&'static dyn KeyHandler> {
        *self.handler.lock()
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut TermState) -> R) -> R {
        f(&mut self.state.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_pack_round_trips_for_all_colors() {
        for fg in 0..16u8 {
            for bg in 0..16u8 {
                let entry = Entry::new(
                    b'x',
                    EntryColor::new(Color::from_nibble(fg), Color::from_nibble(bg)),
                );
                assert_eq!(Entry::unpack(entry.pack()), entry);
            }
        }
    }

    #[test]
    fn entry_pack_round_trips_for_all_characters() {
        let color = EntryColor::new(Color::Pink, Color::Blue);
        for c in 0..=255u8 {
            let entry = Entry::new(c, color);
            assert_eq!(Entry::unpack(entry.pack()), entry);
        }
    }

    #[test]
    fn writing_a_full_row_wraps_to_the_next_row() {
        let term = Terminal::new();
        term.initialize();

        for _ in 0..VGA_WIDTH {
            term.write_str("a");
        }

        assert_eq!(term.cursor(), (0, 1));
    }

    #[test]
    fn cursor_stays_in_bounds_under_sustained_writes() {
        let term = Terminal::new();
        term.initialize();

        for i in 0..10_000 {
            if i % 37 == 0 {
                term.write_str("\n");
            } else {
                term.write_str("y");
            }
            let (col, row) = term.cursor();
            assert!(col < VGA_WIDTH);
            assert!(row < TTY_HEIGHT);
        }
    }

    #[test]
    fn newline_on_last_scrollable_row_scrolls() {
        let term = Terminal::new();
        term.initialize();
        term.set_cursor(0, TTY_HEIGHT - 1);

        term.write_str("bottom\n");

        let (col, row) = term.cursor();
        assert_eq!((col, row), (0, TTY_HEIGHT - 1));
        // the line we just wrote moved up a row
        assert_eq!(term.entry_at(0, TTY_HEIGHT - 2).character, b'b');
    }

    #[test]
    fn move_up_shifts_rows_and_blanks_the_last() {
        let term = Terminal::new();
        term.initialize();
        for y in 0..TTY_HEIGHT {
            term.set_char_at((b'A' + y as u8) as char, 0, y);
        }

        term.with_state(|state| state.move_up());

        for y in 0..TTY_HEIGHT - 1 {
            assert_eq!(term.entry_at(0, y).character, b'A' + y as u8 + 1);
        }
        let last = term.entry_at(0, TTY_HEIGHT - 1);
        assert_eq!(last.character, b' ');
        assert_eq!(last.color, EntryColor::new(Color::White, Color::Black));
    }

    #[test]
    fn scroll_leaves_the_reserved_row_alone() {
        let term = Terminal::new();
        term.initialize();
        term.set_char_at('>', 0, VGA_HEIGHT - 1);

        term.with_state(|state| state.move_up());

        assert_eq!(term.entry_at(0, VGA_HEIGHT - 1).character, b'>');
    }

    #[test]
    fn clear_resets_cursor_and_color() {
        let term = Terminal::new();
        term.write_str("hello");
        term.clear(Color::Blue);

        assert_eq!(term.cursor(), (0, 0));
        let entry = term.entry_at(0, 0);
        assert_eq!(entry.character, b' ');
        assert_eq!(entry.color, EntryColor::new(Color::White, Color::Blue));
    }

    #[test]
    fn unprintable_bytes_render_as_replacement() {
        let term = Terminal::new();
        term.initialize();
        term.write_str("\u{1}");
        assert_eq!(term.entry_at(0, 0).character, 0xfe);
    }
}

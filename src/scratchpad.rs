use spin::Mutex;

use crate::compositor::{Compositor, CONSOLE, KERNEL_TTY};
use crate::constants::scratchpad::{CAPACITY, COMMAND_CAPACITY, VISIBLE_WIDTH};
use crate::constants::vga::{VGA_HEIGHT, VGA_WIDTH};
use crate::keyboard::{Key, KeyEvent, KeyHandler};
use crate::terminal::Terminal;
use crate::{kpanic, println};

/// The command table is a fixed array; registering past its capacity is a
/// configuration error reported explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTableFull;

#[derive(Clone, Copy)]
struct Command {
    name: &'static str,
    run: fn(),
}

struct CommandTable {
    entries: [Option<Command>; COMMAND_CAPACITY],
    len: usize,
}

impl CommandTable {
    const fn new() -> CommandTable {
        CommandTable {
            entries: [None; COMMAND_CAPACITY],
            len: 0,
        }
    }

    fn find(&self, text: &[u8]) -> Option<fn()> {
        self.entries[..self.len]
            .iter()
            .filter_map(|entry| entry.as_ref())
            .find(|command| command.name.as_bytes() == text)
            .map(|command| command.run)
    }
}

/// The editable line. The buffer is one byte longer than the maximum input
/// so the stored text is always null-terminated.
struct Line {
    buf: [u8; CAPACITY],
    len: usize,
}

impl Line {
    const fn new() -> Line {
        Line {
            buf: [0; CAPACITY],
            len: 0,
        }
    }
}

/// The bounded command line on the kernel terminal's reserved bottom row.
///
/// Registered as the kernel terminal's keypress handler; every mutation
/// arrives through the keyboard decoder's callback path.
pub struct Scratchpad {
    line: Mutex<Line>,
    commands: Mutex<CommandTable>,
    terminal: &'static Terminal,
    console: &'static Compositor,
}

impl Scratchpad {
    pub const fn new(terminal: &'static Terminal, console: &'static Compositor) -> Scratchpad {
        Scratchpad {
            line: Mutex::new(Line::new()),
            commands: Mutex::new(CommandTable::new()),
            terminal,
            console,
        }
    }

    /// Registers a command dispatched on Enter by exact name match.
    pub fn add_command(&self, name: &'static str, run: fn()) -> Result<(), CommandTableFull> {
        let mut table = self.commands.lock();

        if table.len == COMMAND_CAPACITY {
            return Err(CommandTableFull);
        }

        let slot = table.len;
        table.entries[slot] = Some(Command { name, run });
        table.len += 1;
        Ok(())
    }

    fn insert(&self, c: char) {
        let mut line = self.line.lock();

        // keep the reserved terminator byte; extra input is dropped
        if line.len == CAPACITY - 1 {
            return;
        }

        let at = line.len;
        line.buf[at] = c as u8;
        line.len += 1;
    }

    fn backspace(&self) {
        let mut line = self.line.lock();

        if line.len > 0 {
            line.len -= 1;
            let at = line.len;
            line.buf[at] = 0;
        }
    }

    fn clear(&self) {
        let mut line = self.line.lock();
        line.buf = [0; CAPACITY];
        line.len = 0;
    }

    /// Dispatches the current content, then unconditionally resets it.
    fn submit(&self) {
        // work from a copy: nothing below may hold the line lock, since
        // printing can let another keystroke re-enter this editor
        let (buf, len) = {
            let line = self.line.lock();
            (line.buf, line.len)
        };

        let matched = self.commands.lock().find(&buf[..len]);

        if matched.is_none() {
            if let Ok(text) = core::str::from_utf8(&buf[..len]) {
                println!("unknown command: {}", text);
            }
        }

        // reset before running: the command may block in its own event
        // loop for as long as the user keeps an application open
        self.clear();

        if let Some(run) = matched {
            run();
        }
    }

    /// Redraws the reserved bottom row: a fixed two-character prompt, then
    /// a window over the content (the tail once the content outgrows the
    /// visible width).
    pub fn render(&self) {
        let row = VGA_HEIGHT - 1;
        // draw from a copy so the line lock is never held across
        // terminal writes or the flush
        let (buf, len) = {
            let line = self.line.lock();
            (line.buf, line.len)
        };
        let start = len.saturating_sub(VISIBLE_WIDTH);

        self.terminal.set_char_at('>', 0, row);
        self.terminal.set_char_at(' ', 1, row);

        for i in 0..VISIBLE_WIDTH {
            let c = if start + i < len { buf[start + i] as char } else { ' ' };
            self.terminal.set_char_at(c, i + 2, row);
        }

        let cursor_col = core::cmp::min(2 + (len - start), VGA_WIDTH - 1);
        self.terminal.set_cursor(cursor_col, row);
        self.console.flush(self.terminal);
    }
}

impl KeyHandler for Scratchpad {
    fn handle_key(&self, event: KeyEvent) {
        if !event.pressed {
            return;
        }

        if let Some(c) = event.ch {
            self.insert(c);
        } else {
            match event.key {
                Key::Backspace => self.backspace(),
                Key::Enter => self.submit(),
                Key::F1
                | Key::F2
                | Key::F3
                | Key::F4
                | Key::F5
                | Key::F6
                | Key::F7
                | Key::F8
                | Key::F9 => {
                    println!("F{} pressed", event.key as u8 - Key::F1 as u8 + 1);
                }
                // manual trigger for the fatal path
                Key::F10 => kpanic!("F10 pressed"),
                // modifier state lives in the decoder
                Key::LShift
                | Key::RShift
                | Key::LCtrl
                | Key::LAlt
                | Key::CapsLock
                | Key::NumLock
                | Key::ScrollLock => {}
                key => println!("key {:#04x}", key as u8),
            }
        }

        self.render();
    }
}

/// The kernel scratchpad, bound to the kernel terminal.
pub static SCRATCHPAD: Scratchpad = Scratchpad::new(&KERNEL_TTY, &CONSOLE);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::tests::TestScreen;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn fixture() -> &'static Scratchpad {
        let screen = Box::leak(Box::new(TestScreen::new()));
        let console = Box::leak(Box::new(Compositor::new(screen)));
        let terminal = Box::leak(Box::new(Terminal::new()));
        terminal.initialize();
        console.set_active(terminal);
        Box::leak(Box::new(Scratchpad::new(terminal, console)))
    }

    fn press_char(c: char) -> KeyEvent {
        KeyEvent {
            key: Key::A,
            pressed: true,
            ch: Some(c),
        }
    }

    fn press(key: Key) -> KeyEvent {
        KeyEvent {
            key,
            pressed: true,
            ch: None,
        }
    }

    fn type_str(pad: &Scratchpad, s: &str) {
        for c in s.chars() {
            pad.handle_key(press_char(c));
        }
    }

    fn content(pad: &Scratchpad) -> Vec<u8> {
        let line = pad.line.lock();
        line.buf[..line.len].to_vec()
    }

    #[test]
    fn inserts_append_until_one_below_capacity() {
        let pad = fixture();

        for _ in 0..CAPACITY - 1 {
            pad.handle_key(press_char('a'));
        }
        assert_eq!(content(pad).len(), CAPACITY - 1);

        // one more is silently dropped
        pad.handle_key(press_char('b'));
        let line = pad.line.lock();
        assert_eq!(line.len, CAPACITY - 1);
        assert!(!line.buf.contains(&b'b'));
        // the reserved terminator byte is still zero
        assert_eq!(line.buf[CAPACITY - 1], 0);
    }

    #[test]
    fn content_stays_null_terminated() {
        let pad = fixture();
        type_str(pad, "abc");
        pad.handle_key(press(Key::Backspace));
        type_str(pad, "xy");

        let line = pad.line.lock();
        assert_eq!(&line.buf[..line.len], b"abxy");
        assert_eq!(line.buf[line.len], 0);
    }

    #[test]
    fn backspace_on_empty_line_is_a_no_op() {
        let pad = fixture();
        pad.handle_key(press(Key::Backspace));
        assert_eq!(content(pad), b"");
    }

    #[test]
    fn matching_command_runs_and_line_clears() {
        static RAN: AtomicBool = AtomicBool::new(false);
        let pad = fixture();
        pad.add_command("quit", || RAN.store(true, Ordering::SeqCst))
            .unwrap();

        type_str(pad, "quit");
        pad.handle_key(press(Key::Enter));

        assert!(RAN.load(Ordering::SeqCst));
        assert_eq!(content(pad), b"");
    }

    #[test]
    fn unknown_command_reports_and_still_clears() {
        static RAN: AtomicBool = AtomicBool::new(false);
        let pad = fixture();
        pad.add_command("quit", || RAN.store(true, Ordering::SeqCst))
            .unwrap();

        type_str(pad, "xyz");
        pad.handle_key(press(Key::Enter));

        assert!(!RAN.load(Ordering::SeqCst));
        assert_eq!(content(pad), b"");
    }

    #[test]
    fn command_match_is_exact_not_prefix() {
        static RAN: AtomicBool = AtomicBool::new(false);
        let pad = fixture();
        pad.add_command("quit", || RAN.store(true, Ordering::SeqCst))
            .unwrap();

        type_str(pad, "quitx");
        pad.handle_key(press(Key::Enter));

        assert!(!RAN.load(Ordering::SeqCst));
    }

    #[test]
    fn command_table_capacity_is_enforced() {
        let pad = fixture();
        for _ in 0..COMMAND_CAPACITY {
            pad.add_command("cmd", || {}).unwrap();
        }
        assert_eq!(pad.add_command("overflow", || {}), Err(CommandTableFull));
    }

    // Uses the global editor: a registered command is a plain `fn()` and
    // cannot capture a fixture.
    #[test]
    fn a_keystroke_arriving_during_dispatch_reaches_the_editor() {
        fn feed_key_back() {
            SCRATCHPAD.handle_key(KeyEvent {
                key: Key::A,
                pressed: true,
                ch: Some('x'),
            });
        }

        SCRATCHPAD.add_command("reenter", feed_key_back).unwrap();
        type_str(&SCRATCHPAD, "reenter");
        SCRATCHPAD.handle_key(press(Key::Enter));

        // the nested insert landed on the freshly cleared line
        assert_eq!(content(&SCRATCHPAD), b"x");

        SCRATCHPAD.handle_key(press(Key::Backspace));
    }

    #[test]
    fn render_shows_prompt_and_short_content_from_the_start() {
        let pad = fixture();
        type_str(pad, "hi");

        let row = VGA_HEIGHT - 1;
        assert_eq!(pad.terminal.entry_at(0, row).character, b'>');
        assert_eq!(pad.terminal.entry_at(1, row).character, b' ');
        assert_eq!(pad.terminal.entry_at(2, row).character, b'h');
        assert_eq!(pad.terminal.entry_at(3, row).character, b'i');
        assert_eq!(pad.terminal.cursor(), (4, row));
    }

    #[test]
    fn render_shows_the_tail_when_content_overflows_the_row() {
        let pad = fixture();
        for i in 0..100usize {
            pad.handle_key(press_char((b'a' + (i % 26) as u8) as char));
        }

        let row = VGA_HEIGHT - 1;
        let line = pad.line.lock();
        let start = line.len - VISIBLE_WIDTH;
        for i in 0..VISIBLE_WIDTH {
            assert_eq!(
                pad.terminal.entry_at(i + 2, row).character,
                line.buf[start + i]
            );
        }
        drop(line);
        assert_eq!(pad.terminal.cursor(), (VGA_WIDTH - 1, row));
    }
}

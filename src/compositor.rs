use core::fmt;
use core::ptr;

use spin::Mutex;

use crate::constants::vga::CELL_COUNT;
use crate::isr;
use crate::terminal::Terminal;

/// A physical display that terminal contents can be flushed to.
///
/// The only implementation that talks to hardware is [`crate::vga::VgaScreen`];
/// hosted builds and tests substitute in-memory screens.
pub trait Screen: Sync {
    fn blit(&self, cells: &[u16; CELL_COUNT]);
    fn set_cursor(&self, col: usize, row: usize);
    fn set_cursor_visible(&self, visible: bool);
}

/// Owns the "active terminal" notion: exactly one terminal is live at a
/// time, and only its flushes reach the screen.
pub struct Compositor {
    screen: &'static dyn Screen,
    active: Mutex<Option<&'static Terminal>>,
}

impl Compositor {
    pub const fn new(screen: &'static dyn Screen) -> Compositor {
        Compositor {
            screen,
            active: Mutex::new(None),
        }
    }

    /// Switches the live terminal and immediately flushes it, so the display
    /// reflects the switch without waiting for the next write.
    pub fn set_active(&self, terminal: &'static Terminal) {
        *self.active.lock() = Some(terminal);
        self.flush(terminal);
    }

    pub fn active(&self) -> Option<&'static Terminal> {
        *self.active.lock()
    }

    pub fn is_active(&self, terminal: &Terminal) -> bool {
        match *self.active.lock() {
            Some(active) => ptr::eq(active, terminal),
            None => false,
        }
    }

    /// Copies the terminal's grid and cursor state to the screen.
    ///
    /// No-op unless `terminal` is the active one. The copy runs under the
    /// interrupt gate so a handler cannot redraw mid-blit and tear the frame.
    pub fn flush(&self, terminal: &Terminal) {
        if !self.is_active(terminal) {
            return;
        }

        isr::pause();

        terminal.with_state(|state| {
            self.screen.blit(&state.cells);
            self.screen.set_cursor(state.cursor_col, state.cursor_row);
            self.screen.set_cursor_visible(state.cursor_visible);
        });

        isr::resume();
    }
}

/// The kernel's own terminal. Applications bring their own; this one hosts
/// the boot banner, diagnostics and the scratchpad.
pub static KERNEL_TTY: Terminal = Terminal::new();

#[cfg(target_os = "none")]
pub static CONSOLE: Compositor = Compositor::new(&crate::vga::VGA);

// Hosted builds have no VGA; flushes go to a discard screen.
#[cfg(not(target_os = "none"))]
pub static CONSOLE: Compositor = Compositor::new(&DISCARD);

#[cfg(not(target_os = "none"))]
static DISCARD: DiscardScreen = DiscardScreen;

#[cfg(not(target_os = "none"))]
struct DiscardScreen;

#[cfg(not(target_os = "none"))]
impl Screen for DiscardScreen {
    fn blit(&self, _cells: &[u16; CELL_COUNT]) {}
    fn set_cursor(&self, _col: usize, _row: usize) {}
    fn set_cursor_visible(&self, _visible: bool) {}
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::compositor::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Formatted output lands on the active terminal (the kernel terminal while
/// nothing else has taken over) and is flushed right away.
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    isr::with_paused(|| {
        let terminal = CONSOLE.active().unwrap_or(&KERNEL_TTY);
        let _ = terminal.write_fmt(args);
        CONSOLE.flush(terminal);
    });
}

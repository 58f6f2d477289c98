use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use spin::Mutex;

use crate::compositor::{CONSOLE, KERNEL_TTY};
use crate::terminal::Color;
use crate::{isr, println};

/// The fatal-fault state machine. `Halted` is terminal for the whole
/// system; nothing runs past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PanicState {
    Normal = 0,
    Panicking = 1,
    Halted = 2,
}

static STATE: AtomicU8 = AtomicU8::new(PanicState::Normal as u8);

pub fn state() -> PanicState {
    match STATE.load(Ordering::SeqCst) {
        0 => PanicState::Normal,
        1 => PanicState::Panicking,
        _ => PanicState::Halted,
    }
}

pub fn is_panicking() -> bool {
    state() != PanicState::Normal
}

/// Replacement for the park action, so the panic path itself can run in a
/// hosted environment without parking a thread forever.
pub type HaltFn = fn() -> !;

static HALT_HOOK: Mutex<Option<HaltFn>> = Mutex::new(None);

pub fn set_halt_hook(hook: HaltFn) {
    *HALT_HOOK.lock() = Some(hook);
}

/// Parks the CPU. Never returns; on bare metal this is a low-power wait
/// loop, on the host it aborts through the hook or a process panic.
pub fn park() -> ! {
    STATE.store(PanicState::Halted as u8, Ordering::SeqCst);

    let hook = *HALT_HOOK.lock();
    if let Some(hook) = hook {
        hook();
    }

    #[cfg(target_os = "none")]
    loop {
        x86_64::instructions::hlt();
    }

    #[cfg(not(target_os = "none"))]
    panic!("system halted");
}

/// Enters the PANICKING state: interrupt delivery off, kernel terminal
/// forced active, screen cleared to the panic background, banner printed.
pub fn begin() {
    isr::pause();

    STATE.store(PanicState::Panicking as u8, Ordering::SeqCst);

    CONSOLE.set_active(&KERNEL_TTY);
    KERNEL_TTY.clear(Color::Blue);

    println!("-------- KERNEL PANIC --------\n");
}

/// Closes the diagnostic dump and halts for good.
pub fn finish() -> ! {
    println!("\n------------------------------");

    park()
}

pub fn kpanic(args: fmt::Arguments) -> ! {
    begin();

    crate::print!("{}", args);

    finish()
}

/// Formatted fatal abort usable from any component.
#[macro_export]
macro_rules! kpanic {
    ($($arg:tt)*) => ($crate::panic::kpanic(format_args!($($arg)*)));
}

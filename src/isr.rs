use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::compositor::{Compositor, CONSOLE};
use crate::keyboard::{self, DECODER};
use crate::pic::PICS;
use crate::{panic, println};

static EXCEPTION_LABELS: [&str; 32] = [
    "[0x00] Divide by Zero Exception",
    "[0x01] Debug Exception",
    "[0x02] Unhandled Non-maskable Interrupt",
    "[0x03] Breakpoint Exception",
    "[0x04] Overflow Exception",
    "[0x05] Bound Range Exceeded Exception",
    "[0x06] Invalid Opcode/Operand Exception",
    "[0x07] Device Unavailable Exception",
    "[0x08] Double Fault",
    "[0x09] Coprocessor Segment Overrun",
    "[0x0A] Invalid TSS Exception",
    "[0x0B] Absent Segment Exception",
    "[0x0C] Stack-segment Fault",
    "[0x0D] General Protection Fault",
    "[0x0E] Page Fault",
    "[0x0F] Inexplicable Error",
    "[0x10] x87 Floating Exception",
    "[0x11] Alignment Check",
    "[0x12] Machine Check",
    "[0x13] SIMD Floating Exception",
    "[0x14] Virtualized Exception",
    "[0x15] Control Protection Exception",
    "[0x16] Inexplicable Error",
    "[0x17] Inexplicable Error",
    "[0x18] Inexplicable Error",
    "[0x19] Inexplicable Error",
    "[0x1A] Inexplicable Error",
    "[0x1B] Inexplicable Error",
    "[0x1C] Hypervisor Intrusion Exception",
    "[0x1D] VMM Communications Exception",
    "[0x1E] Security Exception",
    "[0x1F] Inexplicable Error",
];

/// What the low-level trap stub captured when a trap occurred. Lives only
/// for the duration of handling that one trap.
#[derive(Debug, Clone, Copy)]
pub struct InterruptStateSnapshot {
    pub vector: u8,
    pub error_code: u64,
    pub instruction_pointer: u64,
    pub code_segment: u64,
    pub cpu_flags: u64,
    pub stack_pointer: u64,
    pub stack_segment: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Diagnostic only; the system halts.
    FatalFault,
    /// Logged; execution continues.
    InformationalFault,
    /// Remapped hardware line, vector minus 32.
    Hardware,
}

/// Classifies a vector once, at the top of dispatch. Every exception vector
/// without an explicit informational case is fatal: an unknown fault halts
/// rather than being ignored.
pub fn classify(vector: u8) -> Severity {
    match vector {
        1 | 3 => Severity::InformationalFault,
        v if v < 32 => Severity::FatalFault,
        _ => Severity::Hardware,
    }
}

fn print_state(state: &InterruptStateSnapshot) {
    if state.vector < 32 {
        println!("-> {}", EXCEPTION_LABELS[state.vector as usize]);
    } else {
        println!("-> Unknown interrupt {}", state.vector);
    }

    println!("\nCPU state:");
    println!("err_code: {:#x}", state.error_code);
    println!("ip: {:#x}", state.instruction_pointer);
    println!("cs: {:#x}", state.code_segment);
    println!("flags: {:#x}", state.cpu_flags);
    println!("sp: {:#x}", state.stack_pointer);
    println!("ss: {:#x}", state.stack_segment);
}

fn fatal_fault(state: &InterruptStateSnapshot) -> ! {
    panic::begin();
    println!("Exception interrupt received:\n");
    print_state(state);
    panic::finish()
}

/// Routes a captured trap. Fatal faults never return.
pub fn dispatch(state: &InterruptStateSnapshot) {
    match classify(state.vector) {
        Severity::FatalFault => fatal_fault(state),
        Severity::InformationalFault => {
            println!("------------------------------");
            println!("Interrupt received");
            print_state(state);
            println!("------------------------------");
        }
        Severity::Hardware => handle_hw_interrupt(state.vector - 32),
    }
}

/// Hardware seams of the keyboard fast path, injectable so the
/// acknowledgment ordering is verifiable without hardware.
pub(crate) trait KeyboardBus {
    fn read_scancode(&mut self) -> u8;
    fn end_of_interrupt(&mut self);
}

struct IrqKeyboardBus;

impl KeyboardBus for IrqKeyboardBus {
    fn read_scancode(&mut self) -> u8 {
        keyboard::read_scancode()
    }

    fn end_of_interrupt(&mut self) {
        PICS.lock().end_of_interrupt(1);
    }
}

/// The keyboard fast path: read, decode, hand the event to the active
/// terminal's handler.
pub(crate) fn service_keyboard<B: KeyboardBus>(bus: &mut B, console: &Compositor) {
    let scancode = bus.read_scancode();
    let event = DECODER.lock().decode(scancode);

    match event {
        Some(event) => {
            let handler = console.active().and_then(|terminal| terminal.handler());

            if let Some(handler) = handler {
                // The handler may enter an event loop and not return for a
                // long time (an application taking over input), so
                // acknowledge the controller first and skip the usual
                // acknowledgment below.
                bus.end_of_interrupt();

                handler.handle_key(event);

                return;
            }
        }
        None => println!("keyboard: unrecognized scancode {:#04x}", scancode),
    }

    bus.end_of_interrupt();
}

/// Services one hardware interrupt line.
pub fn handle_hw_interrupt(line: u8) {
    match line {
        // timer: nothing to do beyond the acknowledgment
        0 => {}
        1 => return service_keyboard(&mut IrqKeyboardBus, &CONSOLE),
        _ => println!("Hardware interrupt #{} received", line),
    }

    PICS.lock().end_of_interrupt(line);
}

/// Depth of the pause gate, plus the delivery state the outermost pause
/// found. Unwinding to zero restores that state rather than forcing
/// delivery on: inside an interrupt handler the CPU has already cleared
/// the interrupt flag, and a nested pause/resume there must not turn
/// delivery back on mid-handler.
static PAUSE_DEPTH: AtomicUsize = AtomicUsize::new(0);
static RESUME_ENABLES: AtomicBool = AtomicBool::new(false);
static DELIVERY_ONLINE: AtomicBool = AtomicBool::new(false);

/// Stops the CPU from taking interrupts. Nestable; interrupts arriving
/// while paused are dropped, not queued.
pub fn pause() {
    #[cfg(target_os = "none")]
    {
        let was_enabled = x86_64::instructions::interrupts::are_enabled();
        x86_64::instructions::interrupts::disable();

        if PAUSE_DEPTH.fetch_add(1, Ordering::SeqCst) == 0 {
            RESUME_ENABLES.store(was_enabled, Ordering::SeqCst);
        }
    }

    #[cfg(not(target_os = "none"))]
    PAUSE_DEPTH.fetch_add(1, Ordering::SeqCst);
}

/// Undoes one [`pause`]. When no pause remains, delivery goes back to the
/// state the outermost pause captured, and only while the system is not
/// panicking and interrupts have been brought online.
pub fn resume() {
    let depth = PAUSE_DEPTH.fetch_sub(1, Ordering::SeqCst);

    if depth == 1
        && RESUME_ENABLES.load(Ordering::SeqCst)
        && DELIVERY_ONLINE.load(Ordering::SeqCst)
        && !panic::is_panicking()
    {
        #[cfg(target_os = "none")]
        x86_64::instructions::interrupts::enable();
    }
}

pub fn with_paused<R>(f: impl FnOnce() -> R) -> R {
    pause();
    let result = f();
    resume();
    result
}

/// Turns delivery on for code that becomes the new main flow while still
/// inside an interrupt handler: the keyboard fast path hands control to
/// application event loops with delivery hardware-disabled, and restoring
/// semantics alone would keep it off for the loop's whole lifetime.
pub fn enable_delivery() {
    if PAUSE_DEPTH.load(Ordering::SeqCst) == 0
        && DELIVERY_ONLINE.load(Ordering::SeqCst)
        && !panic::is_panicking()
    {
        #[cfg(target_os = "none")]
        x86_64::instructions::interrupts::enable();
    }
}

/// Marks interrupt delivery live and performs the first enable. Called by
/// `trap::init` after the IDT is loaded and the controllers are remapped.
pub fn bring_delivery_online() {
    DELIVERY_ONLINE.store(true, Ordering::SeqCst);
    enable_delivery();
}

#[cfg(test)]
pub(crate) fn pause_depth() -> usize {
    PAUSE_DEPTH.load(Ordering::SeqCst)
}

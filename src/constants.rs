/// System-wide constants to avoid magic numbers

/// VGA text mode constants
pub mod vga {
    /// VGA text buffer physical address
    pub const BUFFER_ADDR: usize = 0xb8000;

    /// VGA text mode dimensions
    pub const VGA_HEIGHT: usize = 25;
    pub const VGA_WIDTH: usize = 80;
    pub const CELL_COUNT: usize = VGA_WIDTH * VGA_HEIGHT;

    /// Height of the scrollable region. The lowest row is reserved for the
    /// scratchpad and is never part of the scroll path.
    pub const TTY_HEIGHT: usize = VGA_HEIGHT - 1;

    /// VGA control ports
    pub const COMMAND_PORT: u16 = 0x3D4;
    pub const DATA_PORT: u16 = 0x3D5;

    /// Cursor control registers
    pub const CURSOR_START_REG: u8 = 0x0A;
    pub const CURSOR_LOCATION_HIGH: u8 = 0x0E;
    pub const CURSOR_LOCATION_LOW: u8 = 0x0F;

    /// Bit in the cursor-start register that disables the hardware cursor
    pub const CURSOR_DISABLE_BIT: u8 = 0x20;
}

/// PS/2 Keyboard controller constants
pub mod keyboard {
    /// PS/2 keyboard data port
    pub const DATA_PORT: u16 = 0x60;
}

/// Interrupt constants
pub mod interrupts {
    /// We remap PIC interrupts to start at 32 to avoid conflicts with CPU
    /// exception vectors 0-31.
    pub const PIC_1_OFFSET: u8 = 32;
    pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;
}

/// Scratchpad line editor constants
pub mod scratchpad {
    /// Scratchpad buffer size. The last byte is never written so the stored
    /// text is always null-terminated.
    pub const CAPACITY: usize = 257;

    /// Columns of the reserved bottom row visible for scratchpad content
    /// (the first two columns hold the prompt).
    pub const VISIBLE_WIDTH: usize = 78;

    /// Fixed size of the registered-command table.
    pub const COMMAND_CAPACITY: usize = 128;
}

/// Serial port constants
pub mod serial {
    /// COM1 I/O port base
    pub const COM1_PORT: u16 = 0x3F8;
}

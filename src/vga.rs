use volatile::Volatile;
use x86_64::instructions::port::Port;

use crate::compositor::Screen;
use crate::constants::vga::{
    BUFFER_ADDR, CELL_COUNT, COMMAND_PORT, CURSOR_DISABLE_BIT, CURSOR_LOCATION_HIGH,
    CURSOR_LOCATION_LOW, CURSOR_START_REG, DATA_PORT, VGA_WIDTH,
};

/// The physical VGA text display at 0xB8000.
pub struct VgaScreen;

pub static VGA: VgaScreen = VgaScreen;

impl Screen for VgaScreen {
    fn blit(&self, cells: &[u16; CELL_COUNT]) {
        // SAFETY: 0xB8000 is the identity-mapped VGA text buffer; cell
        // writes go through Volatile so the copy is not elided.
        let buffer = unsafe { &mut *(BUFFER_ADDR as *mut [Volatile<u16>; CELL_COUNT]) };
        for (dst, &src) in buffer.iter_mut().zip(cells.iter()) {
            dst.write(src);
        }
    }

    fn set_cursor(&self, col: usize, row: usize) {
        let position = (row * VGA_WIDTH + col) as u16;

        let mut command: Port<u8> = Port::new(COMMAND_PORT);
        let mut data: Port<u8> = Port::new(DATA_PORT);

        // SAFETY: 0x3D4/0x3D5 are the VGA CRT controller ports.
        unsafe {
            command.write(CURSOR_LOCATION_LOW);
            data.write((position & 0xff) as u8);
            command.write(CURSOR_LOCATION_HIGH);
            data.write((position >> 8) as u8);
        }
    }

    fn set_cursor_visible(&self, visible: bool) {
        let mut command: Port<u8> = Port::new(COMMAND_PORT);
        let mut data: Port<u8> = Port::new(DATA_PORT);

        // SAFETY: same CRT controller ports as above.
        unsafe {
            command.write(CURSOR_START_REG);
            let mut cursor_start = data.read();

            if visible {
                cursor_start &= !CURSOR_DISABLE_BIT;
            } else {
                cursor_start |= CURSOR_DISABLE_BIT;
            }

            command.write(CURSOR_START_REG);
            data.write(cursor_start);
        }
    }
}

use spin::Mutex;
use x86_64::instructions::port::Port;

use crate::constants::interrupts::{PIC_1_OFFSET, PIC_2_OFFSET};

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

/// Initialization Command Word 1
const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;

/// Initialization Command Word 4
const ICW4_8086: u8 = 0x01;

/// End-of-interrupt command code
const PIC_EOI: u8 = 0x20;

/// Unused port written to give the controllers time between init bytes.
const IO_WAIT_PORT: u16 = 0x80;

/// Raw byte-wide port access, injectable so controller command sequences
/// can be verified without hardware.
pub trait PortBus {
    fn read_byte(&mut self, port: u16) -> u8;
    fn write_byte(&mut self, port: u16, value: u8);
}

/// The real I/O bus.
pub struct IoBus;

impl PortBus for IoBus {
    fn read_byte(&mut self, port: u16) -> u8 {
        let mut port: Port<u8> = Port::new(port);
        // SAFETY: only the well-known 8259/diagnostic ports above are used.
        unsafe { port.read() }
    }

    fn write_byte(&mut self, port: u16, value: u8) {
        let mut port: Port<u8> = Port::new(port);
        // SAFETY: as above.
        unsafe { port.write(value) }
    }
}

/// Bridge to the chained 8259 interrupt controllers.
pub struct Pic<B: PortBus> {
    bus: B,
}

impl<B: PortBus> Pic<B> {
    pub const fn new(bus: B) -> Pic<B> {
        Pic { bus }
    }

    fn io_wait(&mut self) {
        self.bus.write_byte(IO_WAIT_PORT, 0);
    }

    fn write_and_wait(&mut self, port: u16, value: u8) {
        self.bus.write_byte(port, value);
        self.io_wait();
    }

    /// Moves hardware lines 0-15 from the factory vectors (which collide
    /// with CPU exceptions) to vectors 32-47. The interrupt masks in effect
    /// before reprogramming are restored afterwards.
    pub fn remap(&mut self) {
        let mask1 = self.bus.read_byte(PIC1_DATA);
        let mask2 = self.bus.read_byte(PIC2_DATA);

        // ICW1: start the initialization sequence in cascade mode
        self.write_and_wait(PIC1_COMMAND, ICW1_INIT | ICW1_ICW4);
        self.write_and_wait(PIC2_COMMAND, ICW1_INIT | ICW1_ICW4);

        // ICW2: the new vector offsets
        self.write_and_wait(PIC1_DATA, PIC_1_OFFSET);
        self.write_and_wait(PIC2_DATA, PIC_2_OFFSET);

        // ICW3: tell the primary there is a secondary on line 2, and the
        // secondary its cascade identity
        self.write_and_wait(PIC1_DATA, 4);
        self.write_and_wait(PIC2_DATA, 2);

        // ICW4: 8086 mode
        self.write_and_wait(PIC1_DATA, ICW4_8086);
        self.write_and_wait(PIC2_DATA, ICW4_8086);

        self.bus.write_byte(PIC1_DATA, mask1);
        self.bus.write_byte(PIC2_DATA, mask2);
    }

    /// Acknowledges a serviced interrupt on the given 0-based hardware line.
    /// Lines served by the secondary controller need an EOI on both, the
    /// secondary first.
    pub fn end_of_interrupt(&mut self, irq: u8) {
        if irq >= 8 {
            self.bus.write_byte(PIC2_COMMAND, PIC_EOI);
        }

        self.bus.write_byte(PIC1_COMMAND, PIC_EOI);
    }
}

pub static PICS: Mutex<Pic<IoBus>> = Mutex::new(Pic::new(IoBus));

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeBus {
        mask1: u8,
        mask2: u8,
        writes: Vec<(u16, u8)>,
    }

    impl PortBus for FakeBus {
        fn read_byte(&mut self, port: u16) -> u8 {
            match port {
                PIC1_DATA => self.mask1,
                PIC2_DATA => self.mask2,
                _ => 0,
            }
        }

        fn write_byte(&mut self, port: u16, value: u8) {
            self.writes.push((port, value));
        }
    }

    fn eoi_writes(writes: &[(u16, u8)]) -> Vec<u16> {
        writes
            .iter()
            .filter(|&&(_, value)| value == PIC_EOI)
            .map(|&(port, _)| port)
            .collect()
    }

    #[test]
    fn low_line_acknowledgment_is_primary_only() {
        let mut pic = Pic::new(FakeBus::default());
        pic.end_of_interrupt(3);
        assert_eq!(eoi_writes(&pic.bus.writes), vec![PIC1_COMMAND]);
    }

    #[test]
    fn high_line_acknowledgment_hits_secondary_then_primary() {
        let mut pic = Pic::new(FakeBus::default());
        pic.end_of_interrupt(10);
        assert_eq!(eoi_writes(&pic.bus.writes), vec![PIC2_COMMAND, PIC1_COMMAND]);
    }

    #[test]
    fn line_eight_is_a_secondary_line() {
        let mut pic = Pic::new(FakeBus::default());
        pic.end_of_interrupt(8);
        assert_eq!(eoi_writes(&pic.bus.writes).len(), 2);
    }

    #[test]
    fn remap_restores_the_preexisting_masks() {
        let bus = FakeBus {
            mask1: 0b1010_0101,
            mask2: 0b0101_1010,
            writes: Vec::new(),
        };
        let mut pic = Pic::new(bus);
        pic.remap();

        // the final write to each data port is the saved mask
        let last_mask1 = pic
            .bus
            .writes
            .iter()
            .rev()
            .find(|&&(port, _)| port == PIC1_DATA)
            .map(|&(_, value)| value);
        let last_mask2 = pic
            .bus
            .writes
            .iter()
            .rev()
            .find(|&&(port, _)| port == PIC2_DATA)
            .map(|&(_, value)| value);
        assert_eq!(last_mask1, Some(0b1010_0101));
        assert_eq!(last_mask2, Some(0b0101_1010));
    }

    #[test]
    fn remap_programs_the_expected_offsets() {
        let mut pic = Pic::new(FakeBus::default());
        pic.remap();

        // the second write to each data port is the ICW2 vector offset
        let data1: Vec<u8> = pic
            .bus
            .writes
            .iter()
            .filter(|&&(port, _)| port == PIC1_DATA)
            .map(|&(_, value)| value)
            .collect();
        let data2: Vec<u8> = pic
            .bus
            .writes
            .iter()
            .filter(|&&(port, _)| port == PIC2_DATA)
            .map(|&(_, value)| value)
            .collect();
        assert_eq!(data1[0], PIC_1_OFFSET);
        assert_eq!(data2[0], PIC_2_OFFSET);
    }
}

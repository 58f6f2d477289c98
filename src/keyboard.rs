use spin::Mutex;
use x86_64::instructions::port::Port;

use crate::constants::keyboard::DATA_PORT;

/// Symbolic identifiers for the single-byte "set 1" scancodes.
///
/// Extended (0xE0-prefixed) codes are not supported; the arrow names below
/// are the keypad codes that the non-extended path delivers.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Key {
    Escape = 0x01,
    Num1 = 0x02,
    Num2 = 0x03,
    Num3 = 0x04,
    Num4 = 0x05,
    Num5 = 0x06,
    Num6 = 0x07,
    Num7 = 0x08,
    Num8 = 0x09,
    Num9 = 0x0a,
    Num0 = 0x0b,
    Minus = 0x0c,
    Equals = 0x0d,
    Backspace = 0x0e,
    Tab = 0x0f,
    Q = 0x10,
    W = 0x11,
    E = 0x12,
    R = 0x13,
    T = 0x14,
    Y = 0x15,
    U = 0x16,
    I = 0x17,
    O = 0x18,
    P = 0x19,
    LBracket = 0x1a,
    RBracket = 0x1b,
    Enter = 0x1c,
    LCtrl = 0x1d,
    A = 0x1e,
    S = 0x1f,
    D = 0x20,
    F = 0x21,
    G = 0x22,
    H = 0x23,
    J = 0x24,
    K = 0x25,
    L = 0x26,
    Semicolon = 0x27,
    Quote = 0x28,
    Backtick = 0x29,
    LShift = 0x2a,
    Backslash = 0x2b,
    Z = 0x2c,
    X = 0x2d,
    C = 0x2e,
    V = 0x2f,
    B = 0x30,
    N = 0x31,
    M = 0x32,
    Comma = 0x33,
    Dot = 0x34,
    Slash = 0x35,
    RShift = 0x36,
    KeypadAsterisk = 0x37,
    LAlt = 0x38,
    Space = 0x39,
    CapsLock = 0x3a,
    F1 = 0x3b,
    F2 = 0x3c,
    F3 = 0x3d,
    F4 = 0x3e,
    F5 = 0x3f,
    F6 = 0x40,
    F7 = 0x41,
    F8 = 0x42,
    F9 = 0x43,
    F10 = 0x44,
    NumLock = 0x45,
    ScrollLock = 0x46,
    Keypad7 = 0x47,
    Up = 0x48,
    Keypad9 = 0x49,
    KeypadMinus = 0x4a,
    Left = 0x4b,
    Keypad5 = 0x4c,
    Right = 0x4d,
    KeypadPlus = 0x4e,
    Keypad1 = 0x4f,
    Down = 0x50,
    Keypad3 = 0x51,
    Keypad0 = 0x52,
    KeypadDot = 0x53,
}

impl Key {
    pub fn from_scancode(code: u8) -> Option<Key> {
        if (0x01..=0x53).contains(&code) {
            // SAFETY: every discriminant in 0x01..=0x53 is declared above.
            Some(unsafe { core::mem::transmute(code) })
        } else {
            None
        }
    }
}

/// Held modifier keys plus latched lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers(u16);

impl Modifiers {
    pub const SHIFT_L: u16 = 1 << 0;
    pub const SHIFT_R: u16 = 1 << 1;
    pub const ALT_L: u16 = 1 << 2;
    // Right alt and right ctrl send only 0xE0-extended scancodes, which
    // the single-byte decoder does not deliver; their bits stay clear.
    pub const ALT_R: u16 = 1 << 3;
    pub const CTRL_L: u16 = 1 << 4;
    pub const CTRL_R: u16 = 1 << 5;
    pub const CAPS_LOCK: u16 = 1 << 6;
    pub const NUM_LOCK: u16 = 1 << 7;
    pub const SCROLL_LOCK: u16 = 1 << 8;

    pub const fn new() -> Modifiers {
        Modifiers(0)
    }

    pub fn any_present(self, mask: u16) -> bool {
        self.0 & mask != 0
    }

    fn set(&mut self, mask: u16, present: bool) {
        if present {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    fn toggle(&mut self, mask: u16) {
        self.0 ^= mask;
    }

    pub fn shift(self) -> bool {
        self.any_present(Self::SHIFT_L | Self::SHIFT_R)
    }

    pub fn ctrl(self) -> bool {
        self.any_present(Self::CTRL_L | Self::CTRL_R)
    }

    pub fn alt(self) -> bool {
        self.any_present(Self::ALT_L | Self::ALT_R)
    }

    pub fn caps_lock(self) -> bool {
        self.any_present(Self::CAPS_LOCK)
    }

    pub fn num_lock(self) -> bool {
        self.any_present(Self::NUM_LOCK)
    }

    pub fn scroll_lock(self) -> bool {
        self.any_present(Self::SCROLL_LOCK)
    }
}

/// A decoded key event as delivered to the active terminal's handler.
///
/// `ch` carries the shift-resolved printable character for presses of
/// printable keys, `None` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub pressed: bool,
    pub ch: Option<char>,
}

/// Receiver contract for keyboard events, registered per terminal.
pub trait KeyHandler: Sync {
    fn handle_key(&self, event: KeyEvent);
}

/// Unshifted/shifted character pair for a printable key. A static table,
/// not case folding: it also encodes symbol pairs like `1`/`!`.
fn shifted_pair(key: Key) -> Option<(char, char)> {
    let pair = match key {
        Key::Q => ('q', 'Q'),
        Key::W => ('w', 'W'),
        Key::E => ('e', 'E'),
        Key::R => ('r', 'R'),
        Key::T => ('t', 'T'),
        Key::Y => ('y', 'Y'),
        Key::U => ('u', 'U'),
        Key::I => ('i', 'I'),
        Key::O => ('o', 'O'),
        Key::P => ('p', 'P'),
        Key::A => ('a', 'A'),
        Key::S => ('s', 'S'),
        Key::D => ('d', 'D'),
        Key::F => ('f', 'F'),
        Key::G => ('g', 'G'),
        Key::H => ('h', 'H'),
        Key::J => ('j', 'J'),
        Key::K => ('k', 'K'),
        Key::L => ('l', 'L'),
        Key::Z => ('z', 'Z'),
        Key::X => ('x', 'X'),
        Key::C => ('c', 'C'),
        Key::V => ('v', 'V'),
        Key::B => ('b', 'B'),
        Key::N => ('n', 'N'),
        Key::M => ('m', 'M'),
        Key::Num1 => ('1', '!'),
        Key::Num2 => ('2', '@'),
        Key::Num3 => ('3', '#'),
        Key::Num4 => ('4', '$'),
        Key::Num5 => ('5', '%'),
        Key::Num6 => ('6', '^'),
        Key::Num7 => ('7', '&'),
        Key::Num8 => ('8', '*'),
        Key::Num9 => ('9', '('),
        Key::Num0 => ('0', ')'),
        Key::Minus => ('-', '_'),
        Key::Equals => ('=', '+'),
        Key::LBracket => ('[', '{'),
        Key::RBracket => (']', '}'),
        Key::Semicolon => (';', ':'),
        Key::Quote => ('\'', '"'),
        Key::Backtick => ('`', '~'),
        Key::Backslash => ('\\', '|'),
        Key::Comma => (',', '<'),
        Key::Dot => ('.', '>'),
        Key::Slash => ('/', '?'),
        Key::Space => (' ', ' '),
        _ => return None,
    };
    Some(pair)
}

/// Turns raw scancodes into [`KeyEvent`]s and owns the modifier state.
pub struct Decoder {
    modifiers: Modifiers,
}

impl Decoder {
    pub const fn new() -> Decoder {
        Decoder {
            modifiers: Modifiers::new(),
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Decodes one scancode byte. Bit 7 distinguishes release from press;
    /// the low 7 bits identify the key. Unrecognized codes yield `None`.
    pub fn decode(&mut self, scancode: u8) -> Option<KeyEvent> {
        let pressed = scancode & 0x80 == 0;
        let key = Key::from_scancode(scancode & 0x7f)?;

        self.update_modifiers(key, pressed);

        let ch = if pressed {
            shifted_pair(key).map(|(unshifted, shifted)| {
                if self.modifiers.shift() {
                    shifted
                } else {
                    unshifted
                }
            })
        } else {
            None
        };

        Some(KeyEvent { key, pressed, ch })
    }

    fn update_modifiers(&mut self, key: Key, pressed: bool) {
        match key {
            Key::LShift => self.modifiers.set(Modifiers::SHIFT_L, pressed),
            Key::RShift => self.modifiers.set(Modifiers::SHIFT_R, pressed),
            Key::LCtrl => self.modifiers.set(Modifiers::CTRL_L, pressed),
            Key::LAlt => self.modifiers.set(Modifiers::ALT_L, pressed),
            // lock keys latch on press; release has no effect
            Key::CapsLock if pressed => self.modifiers.toggle(Modifiers::CAPS_LOCK),
            Key::NumLock if pressed => self.modifiers.toggle(Modifiers::NUM_LOCK),
            Key::ScrollLock if pressed => self.modifiers.toggle(Modifiers::SCROLL_LOCK),
            _ => {}
        }
    }
}

pub static DECODER: Mutex<Decoder> = Mutex::new(Decoder::new());

/// Reads one raw scancode byte off the keyboard data port.
pub(crate) fn read_scancode() -> u8 {
    let mut port: Port<u8> = Port::new(DATA_PORT);
    // SAFETY: 0x60 is the PS/2 data port; reading it consumes the pending
    // scancode for the interrupt being serviced.
    unsafe { port.read() }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE: u8 = 0x80;

    #[test]
    fn press_and_release_round_trip() {
        let mut decoder = Decoder::new();

        let press = decoder.decode(Key::K as u8).unwrap();
        assert_eq!(press.key, Key::K);
        assert!(press.pressed);
        assert_eq!(press.ch, Some('k'));

        let release = decoder.decode(Key::K as u8 | RELEASE).unwrap();
        assert_eq!(release.key, Key::K);
        assert!(!release.pressed);
        assert_eq!(release.ch, None);
    }

    #[test]
    fn shift_is_held_not_latched() {
        let mut decoder = Decoder::new();

        decoder.decode(Key::LShift as u8);
        assert!(decoder.modifiers().shift());

        decoder.decode(Key::LShift as u8 | RELEASE);
        assert!(!decoder.modifiers().shift());
    }

    #[test]
    fn either_shift_counts() {
        let mut decoder = Decoder::new();
        decoder.decode(Key::RShift as u8);
        assert!(decoder.modifiers().shift());
    }

    #[test]
    fn caps_lock_latches_on_press_only() {
        let mut decoder = Decoder::new();

        decoder.decode(Key::CapsLock as u8);
        assert!(decoder.modifiers().caps_lock());

        // releasing the key does not clear the latch
        decoder.decode(Key::CapsLock as u8 | RELEASE);
        assert!(decoder.modifiers().caps_lock());

        // a second press toggles it off
        decoder.decode(Key::CapsLock as u8);
        assert!(!decoder.modifiers().caps_lock());
    }

    #[test]
    fn shift_resolves_symbol_pairs_not_just_letters() {
        let mut decoder = Decoder::new();

        let plain = decoder.decode(Key::Num1 as u8).unwrap();
        assert_eq!(plain.ch, Some('1'));
        decoder.decode(Key::Num1 as u8 | RELEASE);

        decoder.decode(Key::LShift as u8);
        let shifted = decoder.decode(Key::Num1 as u8).unwrap();
        assert_eq!(shifted.ch, Some('!'));

        let letter = decoder.decode(Key::G as u8).unwrap();
        assert_eq!(letter.ch, Some('G'));
    }

    #[test]
    fn non_printable_keys_have_no_character() {
        let mut decoder = Decoder::new();
        let event = decoder.decode(Key::F3 as u8).unwrap();
        assert_eq!(event.ch, None);
        let event = decoder.decode(Key::Enter as u8).unwrap();
        assert_eq!(event.ch, None);
    }

    #[test]
    fn unknown_scancodes_are_rejected() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.decode(0x00), None);
        assert_eq!(decoder.decode(0x54), None);
        assert_eq!(decoder.decode(0x7f), None);
    }

    #[test]
    fn every_single_byte_scancode_decodes() {
        let mut decoder = Decoder::new();
        for code in 0x01..=0x53u8 {
            assert!(decoder.decode(code).is_some(), "scancode {code:#x}");
        }
    }

    #[test]
    fn only_left_side_ctrl_and_alt_are_reachable() {
        let mut decoder = Decoder::new();
        for code in 0x01..=0x53u8 {
            decoder.decode(code);
        }

        // with every single-byte key pressed at once, ctrl/alt are held
        // through the left-side bits alone
        assert!(decoder.modifiers().any_present(Modifiers::CTRL_L));
        assert!(decoder.modifiers().any_present(Modifiers::ALT_L));
        assert!(!decoder
            .modifiers()
            .any_present(Modifiers::CTRL_R | Modifiers::ALT_R));
    }
}

//! Key code tables
//!
//! The keyboard reports HID usage codes; upward events carry Linux input key
//! codes.

/// Linux input key and button codes used by this device
pub mod key {
    pub const RESERVED: u16 = 0;
    pub const ESC: u16 = 1;
    pub const KEY_1: u16 = 2;
    pub const KEY_2: u16 = 3;
    pub const KEY_3: u16 = 4;
    pub const KEY_4: u16 = 5;
    pub const KEY_5: u16 = 6;
    pub const KEY_6: u16 = 7;
    pub const KEY_7: u16 = 8;
    pub const KEY_8: u16 = 9;
    pub const KEY_9: u16 = 10;
    pub const KEY_0: u16 = 11;
    pub const MINUS: u16 = 12;
    pub const EQUAL: u16 = 13;
    pub const BACKSPACE: u16 = 14;
    pub const TAB: u16 = 15;
    pub const Q: u16 = 16;
    pub const W: u16 = 17;
    pub const E: u16 = 18;
    pub const R: u16 = 19;
    pub const T: u16 = 20;
    pub const Y: u16 = 21;
    pub const U: u16 = 22;
    pub const I: u16 = 23;
    pub const O: u16 = 24;
    pub const P: u16 = 25;
    pub const LEFTBRACE: u16 = 26;
    pub const RIGHTBRACE: u16 = 27;
    pub const ENTER: u16 = 28;
    pub const LEFTCTRL: u16 = 29;
    pub const A: u16 = 30;
    pub const S: u16 = 31;
    pub const D: u16 = 32;
    pub const F: u16 = 33;
    pub const G: u16 = 34;
    pub const H: u16 = 35;
    pub const J: u16 = 36;
    pub const K: u16 = 37;
    pub const L: u16 = 38;
    pub const SEMICOLON: u16 = 39;
    pub const APOSTROPHE: u16 = 40;
    pub const GRAVE: u16 = 41;
    pub const LEFTSHIFT: u16 = 42;
    pub const BACKSLASH: u16 = 43;
    pub const Z: u16 = 44;
    pub const X: u16 = 45;
    pub const C: u16 = 46;
    pub const V: u16 = 47;
    pub const B: u16 = 48;
    pub const N: u16 = 49;
    pub const M: u16 = 50;
    pub const COMMA: u16 = 51;
    pub const DOT: u16 = 52;
    pub const SLASH: u16 = 53;
    pub const RIGHTSHIFT: u16 = 54;
    pub const LEFTALT: u16 = 56;
    pub const SPACE: u16 = 57;
    pub const CAPSLOCK: u16 = 58;
    pub const F1: u16 = 59;
    pub const F2: u16 = 60;
    pub const F3: u16 = 61;
    pub const F4: u16 = 62;
    pub const F5: u16 = 63;
    pub const F6: u16 = 64;
    pub const F7: u16 = 65;
    pub const F8: u16 = 66;
    pub const F9: u16 = 67;
    pub const F10: u16 = 68;
    pub const KEY_102ND: u16 = 86;
    pub const F11: u16 = 87;
    pub const F12: u16 = 88;
    pub const RO: u16 = 89;
    pub const KATAKANAHIRAGANA: u16 = 93;
    pub const MUHENKAN: u16 = 94;
    pub const RIGHTALT: u16 = 100;
    pub const HOME: u16 = 102;
    pub const UP: u16 = 103;
    pub const PAGEUP: u16 = 104;
    pub const LEFT: u16 = 105;
    pub const RIGHT: u16 = 106;
    pub const END: u16 = 107;
    pub const DOWN: u16 = 108;
    pub const PAGEDOWN: u16 = 109;
    pub const INSERT: u16 = 110;
    pub const DELETE: u16 = 111;
    pub const MUTE: u16 = 113;
    pub const VOLUMEDOWN: u16 = 114;
    pub const VOLUMEUP: u16 = 115;
    pub const SCALE: u16 = 120;
    pub const YEN: u16 = 124;
    pub const LEFTMETA: u16 = 125;
    pub const RIGHTMETA: u16 = 126;
    pub const NEXTSONG: u16 = 163;
    pub const PLAYPAUSE: u16 = 164;
    pub const PREVIOUSSONG: u16 = 165;
    pub const DASHBOARD: u16 = 204;
    pub const BRIGHTNESSDOWN: u16 = 224;
    pub const BRIGHTNESSUP: u16 = 225;
    pub const KBDILLUMDOWN: u16 = 229;
    pub const KBDILLUMUP: u16 = 230;
    pub const BTN_LEFT: u16 = 0x110;
    pub const FN: u16 = 0x1d0;

    /// Get human-readable name for a key code
    pub fn name(code: u16) -> &'static str {
        match code {
            ESC => "ESC",
            KEY_1 => "1",
            KEY_2 => "2",
            KEY_3 => "3",
            KEY_4 => "4",
            KEY_5 => "5",
            KEY_6 => "6",
            KEY_7 => "7",
            KEY_8 => "8",
            KEY_9 => "9",
            KEY_0 => "0",
            MINUS => "MINUS",
            EQUAL => "EQUAL",
            BACKSPACE => "BACKSPACE",
            TAB => "TAB",
            Q => "Q",
            W => "W",
            E => "E",
            R => "R",
            T => "T",
            Y => "Y",
            U => "U",
            I => "I",
            O => "O",
            P => "P",
            LEFTBRACE => "LEFTBRACE",
            RIGHTBRACE => "RIGHTBRACE",
            ENTER => "ENTER",
            LEFTCTRL => "LEFTCTRL",
            A => "A",
            S => "S",
            D => "D",
            F => "F",
            G => "G",
            H => "H",
            J => "J",
            K => "K",
            L => "L",
            SEMICOLON => "SEMICOLON",
            APOSTROPHE => "APOSTROPHE",
            GRAVE => "GRAVE",
            LEFTSHIFT => "LEFTSHIFT",
            BACKSLASH => "BACKSLASH",
            Z => "Z",
            X => "X",
            C => "C",
            V => "V",
            B => "B",
            N => "N",
            M => "M",
            COMMA => "COMMA",
            DOT => "DOT",
            SLASH => "SLASH",
            RIGHTSHIFT => "RIGHTSHIFT",
            LEFTALT => "LEFTALT",
            SPACE => "SPACE",
            CAPSLOCK => "CAPSLOCK",
            F1 => "F1",
            F2 => "F2",
            F3 => "F3",
            F4 => "F4",
            F5 => "F5",
            F6 => "F6",
            F7 => "F7",
            F8 => "F8",
            F9 => "F9",
            F10 => "F10",
            KEY_102ND => "102ND",
            F11 => "F11",
            F12 => "F12",
            RO => "RO",
            KATAKANAHIRAGANA => "KATAKANAHIRAGANA",
            MUHENKAN => "MUHENKAN",
            RIGHTALT => "RIGHTALT",
            HOME => "HOME",
            UP => "UP",
            PAGEUP => "PAGEUP",
            LEFT => "LEFT",
            RIGHT => "RIGHT",
            END => "END",
            DOWN => "DOWN",
            PAGEDOWN => "PAGEDOWN",
            INSERT => "INSERT",
            DELETE => "DELETE",
            MUTE => "MUTE",
            VOLUMEDOWN => "VOLUMEDOWN",
            VOLUMEUP => "VOLUMEUP",
            SCALE => "SCALE",
            YEN => "YEN",
            LEFTMETA => "LEFTMETA",
            RIGHTMETA => "RIGHTMETA",
            NEXTSONG => "NEXTSONG",
            PLAYPAUSE => "PLAYPAUSE",
            PREVIOUSSONG => "PREVIOUSSONG",
            DASHBOARD => "DASHBOARD",
            BRIGHTNESSDOWN => "BRIGHTNESSDOWN",
            BRIGHTNESSUP => "BRIGHTNESSUP",
            KBDILLUMDOWN => "KBDILLUMDOWN",
            KBDILLUMUP => "KBDILLUMUP",
            BTN_LEFT => "BTN_LEFT",
            FN => "FN",
            _ => "UNKNOWN",
        }
    }
}

use key::*;

/// HID usage code to key code; 0 where the keyboard has no such key
#[rustfmt::skip]
pub const SCANCODES: [u16; 146] = [
    0, 0, 0, 0,
    A, B, C, D, E, F, G, H, I, J,
    K, L, M, N, O, P, Q, R, S, T,
    U, V, W, X, Y, Z,
    KEY_1, KEY_2, KEY_3, KEY_4, KEY_5, KEY_6, KEY_7, KEY_8, KEY_9, KEY_0,
    ENTER, ESC, BACKSPACE, TAB, SPACE, MINUS,
    EQUAL, LEFTBRACE, RIGHTBRACE, BACKSLASH, 0,
    SEMICOLON, APOSTROPHE, GRAVE, COMMA, DOT, SLASH,
    CAPSLOCK,
    F1, F2, F3, F4, F5, F6, F7, F8, F9,
    F10, F11, F12, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    RIGHT, LEFT, DOWN, UP,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, KEY_102ND,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, RO, 0, YEN, 0, 0, 0, 0, 0,
    0, KATAKANAHIRAGANA, MUHENKAN,
];

/// Modifier bit to key code; bit 4 is unused
pub const CONTROL_CODES: [u16; 8] = [
    LEFTCTRL, LEFTSHIFT, LEFTALT, LEFTMETA, 0, RIGHTSHIFT, RIGHTALT, RIGHTMETA,
];

/// Translation applies to the function-key row and depends on the fn mode
pub const FLAG_FKEY: u8 = 0x01;

/// One key remapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTranslation {
    pub from: u16,
    pub to: u16,
    pub flags: u8,
}

const fn tr(from: u16, to: u16, flags: u8) -> KeyTranslation {
    KeyTranslation { from, to, flags }
}

/// Keys remapped while fn is held (or, for the F-row, depending on fn mode)
pub const FN_TRANSLATIONS: [KeyTranslation; 18] = [
    tr(BACKSPACE, DELETE, 0),
    tr(ENTER, INSERT, 0),
    tr(F1, BRIGHTNESSDOWN, FLAG_FKEY),
    tr(F2, BRIGHTNESSUP, FLAG_FKEY),
    tr(F3, SCALE, FLAG_FKEY),
    tr(F4, DASHBOARD, FLAG_FKEY),
    tr(F5, KBDILLUMDOWN, FLAG_FKEY),
    tr(F6, KBDILLUMUP, FLAG_FKEY),
    tr(F7, PREVIOUSSONG, FLAG_FKEY),
    tr(F8, PLAYPAUSE, FLAG_FKEY),
    tr(F9, NEXTSONG, FLAG_FKEY),
    tr(F10, MUTE, FLAG_FKEY),
    tr(F11, VOLUMEDOWN, FLAG_FKEY),
    tr(F12, VOLUMEUP, FLAG_FKEY),
    tr(RIGHT, END, 0),
    tr(LEFT, HOME, 0),
    tr(DOWN, PAGEDOWN, 0),
    tr(UP, PAGEUP, 0),
];

/// ISO keyboards have the grave and 102nd keys swapped
pub const ISO_TRANSLATIONS: [KeyTranslation; 2] = [tr(GRAVE, KEY_102ND, 0), tr(KEY_102ND, GRAVE, 0)];

pub fn find_translation(table: &[KeyTranslation], key: u16) -> Option<&KeyTranslation> {
    table.iter().find(|t| t.from == key)
}

/// Key code for a HID usage code, before fn and layout translation
pub fn scancode_to_key(code: u8) -> Option<u16> {
    SCANCODES
        .get(code as usize)
        .copied()
        .filter(|&key| key != RESERVED)
}

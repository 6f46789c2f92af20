//! Keyboard state tracking
//!
//! Each keyboard report carries the complete set of held keys. The tracker
//! diffs it against the previous report and emits only the changes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use applespi_transport::report::{KeyboardReport, MAX_MODIFIERS};

use crate::event::{InputDevice, InputEvent};
use crate::keycodes::{
    find_translation, key, scancode_to_key, CONTROL_CODES, FLAG_FKEY, FN_TRANSLATIONS,
    ISO_TRANSLATIONS, SCANCODES,
};

/// Behaviour of the fn key on the function-key row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FnMode {
    /// No fn translation at all
    Disabled,
    /// F-row sends media/special keys; fn + F-row sends F1..F12
    #[default]
    FkeysLast,
    /// F-row sends F1..F12; fn + F-row sends media/special keys
    FkeysFirst,
}

impl FnMode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Disabled),
            1 => Some(Self::FkeysLast),
            2 => Some(Self::FkeysFirst),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::FkeysLast => 1,
            Self::FkeysFirst => 2,
        }
    }
}

impl fmt::Display for FnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::FkeysLast => "fkeys-last",
            Self::FkeysFirst => "fkeys-first",
        })
    }
}

impl FromStr for FnMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" | "disabled" => Ok(Self::Disabled),
            "1" | "fkeys-last" => Ok(Self::FkeysLast),
            "2" | "fkeys-first" => Ok(Self::FkeysFirst),
            _ => Err(format!(
                "invalid fn mode '{s}' (expected disabled, fkeys-last or fkeys-first)"
            )),
        }
    }
}

/// Layout options affecting key translation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardSettings {
    #[serde(default)]
    pub fn_mode: FnMode,
    #[serde(default)]
    pub iso_layout: bool,
}

/// A key reported as pressed, with the code it was reported as
#[derive(Debug, Clone, Copy)]
struct HeldKey {
    scancode: u8,
    code: u16,
}

/// Diffs consecutive keyboard reports into key events
#[derive(Debug, Default)]
pub struct KeyboardTracker {
    settings: KeyboardSettings,
    held: Vec<HeldKey>,
    modifiers: u8,
    fn_pressed: bool,
}

impl KeyboardTracker {
    pub fn new(settings: KeyboardSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> KeyboardSettings {
        self.settings
    }

    /// Translate a scancode with the given fn state
    pub fn translate(&self, scancode: u8, fn_pressed: bool) -> Option<u16> {
        let mut code = scancode_to_key(scancode)?;

        let mode = self.settings.fn_mode;
        if mode != FnMode::Disabled {
            if let Some(trans) = find_translation(&FN_TRANSLATIONS, code) {
                let translate = if trans.flags & FLAG_FKEY != 0 {
                    (mode == FnMode::FkeysFirst && fn_pressed)
                        || (mode == FnMode::FkeysLast && !fn_pressed)
                } else {
                    fn_pressed
                };
                if translate {
                    code = trans.to;
                }
            }
        }

        if self.settings.iso_layout {
            if let Some(trans) = find_translation(&ISO_TRANSLATIONS, code) {
                code = trans.to;
            }
        }

        Some(code)
    }

    /// Process one report and return the resulting events
    ///
    /// Order: releases, presses, modifier changes, fn, then a sync.
    pub fn update(&mut self, report: &KeyboardReport) -> Vec<InputEvent> {
        let mut events = Vec::new();
        let fn_pressed = report.fn_pressed != 0;
        let current = &report.keys_pressed;

        // Released keys go up under the code they went down with
        self.held.retain(|held| {
            let still_pressed = current.contains(&held.scancode);
            if !still_pressed {
                events.push(InputEvent::key(held.code, false));
            }
            still_pressed
        });

        for &scancode in current.iter() {
            if scancode == 0 || self.held.iter().any(|h| h.scancode == scancode) {
                continue;
            }
            match self.translate(scancode, fn_pressed) {
                Some(code) => {
                    events.push(InputEvent::key(code, true));
                    self.held.push(HeldKey { scancode, code });
                }
                None => debug!("Ignoring unmapped scancode 0x{:02X}", scancode),
            }
        }

        for bit in 0..MAX_MODIFIERS {
            let code = CONTROL_CODES[bit];
            let mask = 1u8 << bit;
            if code == 0 || (report.modifiers ^ self.modifiers) & mask == 0 {
                continue;
            }
            events.push(InputEvent::key(code, report.modifiers & mask != 0));
        }
        self.modifiers = report.modifiers;

        if fn_pressed != self.fn_pressed {
            events.push(InputEvent::key(key::FN, fn_pressed));
            self.fn_pressed = fn_pressed;
        }

        events.push(InputEvent::sync(InputDevice::Keyboard));
        events
    }

    /// Release everything currently held (e.g. before suspend)
    pub fn release_all(&mut self) -> Vec<InputEvent> {
        self.update(&KeyboardReport::default())
    }

    /// Every key code this keyboard can emit
    pub fn capabilities(&self) -> Vec<u16> {
        let mut codes: BTreeSet<u16> = SCANCODES
            .iter()
            .chain(CONTROL_CODES.iter())
            .copied()
            .filter(|&c| c != 0)
            .collect();
        codes.extend(FN_TRANSLATIONS.iter().map(|t| t.to));
        codes.insert(key::FN);
        codes.into_iter().collect()
    }
}

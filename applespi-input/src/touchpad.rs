//! Touchpad contact tracking
//!
//! Reports list the fingers currently seen, in no stable order. The tracker
//! binds each contact to a persistent slot so consumers can follow a finger
//! across reports.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use applespi_transport::report::{Finger, TouchpadReport, MAX_FINGERS};
use applespi_transport::DebugMask;

use crate::event::{Contact, InputDevice, InputEvent};
use crate::keycodes::key;

/// Orientation is reported relative to this value
pub const MAX_FINGER_ORIENTATION: i32 = 16384;
/// Upper bound of the touch and width axes
pub const MAX_CONTACT_SIZE: i32 = 2048;

const DIMENSION_LOG_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// Per-model coordinate bounds
// ============================================================================

/// Coordinate bounds of the touchpad surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchpadInfo {
    pub x_min: i32,
    pub x_max: i32,
    pub y_min: i32,
    pub y_max: i32,
}

impl TouchpadInfo {
    /// MacBookPro13,1 / 13,2 / 14,1 / 14,2
    pub const MACBOOK_PRO_13_1: Self = Self::new(-6243, 6749, -170, 7685);
    /// MacBookPro13,3 / 14,3
    pub const MACBOOK_PRO_13_3: Self = Self::new(-7456, 7976, -163, 9283);
    /// MacBook8 / 9 / 10 and anything unknown
    pub const GENERIC: Self = Self::new(-5087, 5579, -182, 6089);

    pub const fn new(x_min: i32, x_max: i32, y_min: i32, y_max: i32) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Bounds for a DMI product name such as `MacBookPro13,3`
    pub fn for_product(product: Option<&str>) -> Self {
        match product.map(str::trim) {
            Some("MacBookPro13,1" | "MacBookPro13,2" | "MacBookPro14,1" | "MacBookPro14,2") => {
                Self::MACBOOK_PRO_13_1
            }
            Some("MacBookPro13,3" | "MacBookPro14,3") => Self::MACBOOK_PRO_13_3,
            _ => Self::GENERIC,
        }
    }

    /// Replace the bounds with `[x_min, x_max, y_min, y_max]` unless all are 0
    pub fn with_override(self, dimensions: Option<[i32; 4]>) -> Self {
        match dimensions {
            Some(d) if d.iter().any(|&v| v != 0) => Self::new(d[0], d[1], d[2], d[3]),
            _ => self,
        }
    }

    pub fn as_array(&self) -> [i32; 4] {
        [self.x_min, self.x_max, self.y_min, self.y_max]
    }
}

impl Default for TouchpadInfo {
    fn default() -> Self {
        Self::GENERIC
    }
}

/// Range of one reported axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AxisInfo {
    pub name: &'static str,
    pub min: i32,
    pub max: i32,
}

// ============================================================================
// Tracker
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct SlotState {
    tracking_id: u32,
    x: i32,
    y: i32,
}

/// Observed coordinate extremes, for calibrating new models
#[derive(Debug)]
struct DimensionProbe {
    min_x: i32,
    max_x: i32,
    min_y: i32,
    max_y: i32,
    updated: bool,
    last_print: Option<Instant>,
}

impl Default for DimensionProbe {
    fn default() -> Self {
        Self {
            min_x: i32::MAX,
            max_x: i32::MIN,
            min_y: i32::MAX,
            max_y: i32::MIN,
            updated: false,
            last_print: None,
        }
    }
}

impl DimensionProbe {
    fn observe(&mut self, finger: &Finger) {
        let (x, y) = (finger.abs_x as i32, finger.abs_y as i32);
        if x < self.min_x {
            self.min_x = x;
            self.updated = true;
        }
        if x > self.max_x {
            self.max_x = x;
            self.updated = true;
        }
        if y < self.min_y {
            self.min_y = y;
            self.updated = true;
        }
        if y > self.max_y {
            self.max_y = y;
            self.updated = true;
        }
    }

    fn maybe_log(&mut self, now: Instant) {
        let due = self
            .last_print
            .map_or(true, |t| now.duration_since(t) > DIMENSION_LOG_INTERVAL);
        if self.updated && due {
            debug!(
                "New touchpad dimensions: {} {} {} {}",
                self.min_x, self.max_x, self.min_y, self.max_y
            );
            self.updated = false;
            self.last_print = Some(now);
        }
    }

    fn dimensions(&self) -> Option<[i32; 4]> {
        (self.min_x <= self.max_x).then_some([self.min_x, self.max_x, self.min_y, self.max_y])
    }
}

/// Assigns persistent slots to touch contacts
#[derive(Debug)]
pub struct TouchpadTracker {
    info: TouchpadInfo,
    debug: DebugMask,
    slots: [Option<SlotState>; MAX_FINGERS],
    next_tracking_id: u32,
    probe: DimensionProbe,
}

impl TouchpadTracker {
    pub fn new(info: TouchpadInfo, debug: DebugMask) -> Self {
        Self {
            info,
            debug,
            slots: [None; MAX_FINGERS],
            next_tracking_id: 0,
            probe: DimensionProbe::default(),
        }
    }

    pub fn info(&self) -> TouchpadInfo {
        self.info
    }

    /// Number of slots currently bound to a contact
    pub fn active_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Coordinate extremes seen so far (only collected with `TP_DIM`)
    pub fn observed_dimensions(&self) -> Option<[i32; 4]> {
        self.probe.dimensions()
    }

    /// Ranges of every axis this touchpad reports
    pub fn axes(&self) -> Vec<AxisInfo> {
        let axis = |name, min, max| AxisInfo { name, min, max };
        vec![
            axis("ABS_MT_TOUCH_MAJOR", 0, MAX_CONTACT_SIZE),
            axis("ABS_MT_TOUCH_MINOR", 0, MAX_CONTACT_SIZE),
            axis("ABS_MT_WIDTH_MAJOR", 0, MAX_CONTACT_SIZE),
            axis("ABS_MT_WIDTH_MINOR", 0, MAX_CONTACT_SIZE),
            axis(
                "ABS_MT_ORIENTATION",
                -MAX_FINGER_ORIENTATION,
                MAX_FINGER_ORIENTATION,
            ),
            axis("ABS_MT_POSITION_X", self.info.x_min, self.info.x_max),
            axis("ABS_MT_POSITION_Y", self.info.y_min, self.info.y_max),
        ]
    }

    /// Process one report and return the resulting events
    pub fn update(&mut self, report: &TouchpadReport) -> Vec<InputEvent> {
        let probing = self.debug.contains(DebugMask::TP_DIM);

        let live: Vec<(&Finger, i32, i32)> = report
            .fingers
            .iter()
            .take(MAX_FINGERS)
            .filter(|f| f.is_touching())
            .map(|f| {
                let x = f.abs_x as i32;
                let y = self.info.y_min + self.info.y_max - f.abs_y as i32;
                (f, x, y)
            })
            .collect();

        if probing {
            for (finger, _, _) in &live {
                self.probe.observe(finger);
            }
            self.probe.maybe_log(Instant::now());
        }

        let assigned = self.assign_slots(&live);

        let mut events = Vec::with_capacity(live.len() + MAX_FINGERS + 2);
        let mut next = [None; MAX_FINGERS];
        for ((finger, x, y), slot) in live.iter().zip(&assigned) {
            let slot = *slot;
            let tracking_id = match self.slots[slot] {
                Some(prev) => prev.tracking_id,
                None => {
                    let id = self.next_tracking_id;
                    self.next_tracking_id = self.next_tracking_id.wrapping_add(1);
                    id
                }
            };
            next[slot] = Some(SlotState {
                tracking_id,
                x: *x,
                y: *y,
            });
            events.push(InputEvent::Contact(Contact {
                slot: slot as u8,
                tracking_id,
                x: *x,
                y: *y,
                touch_major: (finger.touch_major as i32) << 1,
                touch_minor: (finger.touch_minor as i32) << 1,
                width_major: (finger.tool_major as i32) << 1,
                width_minor: (finger.tool_minor as i32) << 1,
                orientation: MAX_FINGER_ORIENTATION - finger.orientation as i32,
            }));
        }

        for (slot, (prev, now)) in self.slots.iter().zip(&next).enumerate() {
            if prev.is_some() && now.is_none() {
                events.push(InputEvent::ContactLifted { slot: slot as u8 });
            }
        }
        self.slots = next;

        events.push(InputEvent::Button {
            code: key::BTN_LEFT,
            pressed: report.clicked,
        });
        events.push(InputEvent::sync(InputDevice::Touchpad));
        events
    }

    /// Lift every contact and the button (e.g. before suspend)
    pub fn release_all(&mut self) -> Vec<InputEvent> {
        self.update(&TouchpadReport::default())
    }

    /// Greedy nearest-neighbour matching of contacts to occupied slots
    ///
    /// Pairs are taken in order of increasing distance, ties broken by contact
    /// index and then slot index. Contacts left over get the lowest slot that
    /// was empty in the previous report. A report either drops or adds
    /// contacts, so a slot is never released and reused at once.
    fn assign_slots(&self, live: &[(&Finger, i32, i32)]) -> Vec<usize> {
        let mut pairs: Vec<(i64, usize, usize)> = Vec::new();
        for (i, (_, x, y)) in live.iter().enumerate() {
            for (s, slot) in self.slots.iter().enumerate() {
                if let Some(prev) = slot {
                    let dx = (*x - prev.x) as i64;
                    let dy = (*y - prev.y) as i64;
                    pairs.push((dx * dx + dy * dy, i, s));
                }
            }
        }
        pairs.sort_unstable();

        let mut assigned: Vec<Option<usize>> = vec![None; live.len()];
        let mut claimed = [false; MAX_FINGERS];
        for (_, i, s) in pairs {
            if assigned[i].is_none() && !claimed[s] {
                assigned[i] = Some(s);
                claimed[s] = true;
            }
        }

        assigned
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    let free = (0..MAX_FINGERS)
                        .find(|&s| !claimed[s] && self.slots[s].is_none())
                        .unwrap_or(0);
                    claimed[free] = true;
                    free
                })
            })
            .collect()
    }
}

impl Default for TouchpadTracker {
    fn default() -> Self {
        Self::new(TouchpadInfo::default(), DebugMask::NONE)
    }
}

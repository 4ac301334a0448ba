//! Gesture model
//!
//! `RawGesture` is the device event decoded once at the input boundary;
//! `OutboundGestureEvent` is what goes out on the bus. The decoder in
//! [`decoder`] turns one stream into the other.

pub mod decoder;

pub use decoder::GestureDecoder;

use serde::{Deserialize, Serialize};

/// Gesture family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureFamily {
    Swipe,
    Pinch,
}

/// Device-side phase of a gesture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Begin,
    Update,
    End,
}

/// Gesture event as reported by the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawGesture {
    pub family: GestureFamily,
    pub phase: GesturePhase,
    pub finger_count: i32,
    /// Only meaningful on `End`
    pub cancelled: bool,
    pub dx: f64,
    pub dy: f64,
    pub scale: f64,
    pub angle_delta: f64,
}

impl RawGesture {
    pub fn swipe(phase: GesturePhase, finger_count: i32, dx: f64, dy: f64) -> Self {
        Self {
            family: GestureFamily::Swipe,
            phase,
            finger_count,
            cancelled: false,
            dx,
            dy,
            scale: 0.0,
            angle_delta: 0.0,
        }
    }

    pub fn pinch(phase: GesturePhase, finger_count: i32, scale: f64, angle_delta: f64) -> Self {
        Self {
            family: GestureFamily::Pinch,
            phase,
            finger_count,
            cancelled: false,
            dx: 0.0,
            dy: 0.0,
            scale,
            angle_delta,
        }
    }

    pub fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    /// (dx, dy) for swipes, (scale, angle delta) for pinches
    pub fn magnitudes(&self) -> (f64, f64) {
        match self.family {
            GestureFamily::Swipe => (self.dx, self.dy),
            GestureFamily::Pinch => (self.scale, self.angle_delta),
        }
    }
}

/// Outbound event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Start,
    Stop,
    Update,
}

/// One `UpdateGesture` signal worth of data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutboundGestureEvent {
    pub kind: GestureKind,
    pub family: GestureFamily,
    pub finger_count: i16,
    pub primary: f64,
    pub secondary: f64,
}

impl OutboundGestureEvent {
    pub fn from_raw(kind: GestureKind, raw: &RawGesture) -> Self {
        let (primary, secondary) = raw.magnitudes();
        Self {
            kind,
            family: raw.family,
            finger_count: raw.finger_count as i16,
            primary,
            secondary,
        }
    }

    /// Stop manufactured for a cancelled session that was not restarted
    pub fn latent_stop(family: GestureFamily, finger_count: i16) -> Self {
        Self {
            kind: GestureKind::Stop,
            family,
            finger_count,
            primary: 0.0,
            secondary: 0.0,
        }
    }

    pub fn is_pinch(&self) -> bool {
        self.family == GestureFamily::Pinch
    }

    /// Wire encoding: swipe start/stop/update = 0/1/2, pinch adds 3
    pub fn kind_byte(&self) -> u8 {
        let base = match self.kind {
            GestureKind::Start => 0,
            GestureKind::Stop => 1,
            GestureKind::Update => 2,
        };
        if self.is_pinch() {
            base + 3
        } else {
            base
        }
    }
}

/// When the Stop for a cancelled, non-restarted session is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LatentStopPolicy {
    /// Right after the cancelling End
    PerEvent,
    /// After the whole drained batch, only if no restart Begin arrived
    PerBatch,
}

impl Default for LatentStopPolicy {
    fn default() -> Self {
        LatentStopPolicy::PerEvent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_byte_encoding() {
        let swipe = RawGesture::swipe(GesturePhase::Update, 3, 1.0, 2.0);
        let pinch = RawGesture::pinch(GesturePhase::Update, 2, 1.5, 0.25);
        let kinds = [GestureKind::Start, GestureKind::Stop, GestureKind::Update];

        let swipe_bytes: Vec<u8> = kinds
            .iter()
            .map(|&k| OutboundGestureEvent::from_raw(k, &swipe).kind_byte())
            .collect();
        let pinch_bytes: Vec<u8> = kinds
            .iter()
            .map(|&k| OutboundGestureEvent::from_raw(k, &pinch).kind_byte())
            .collect();

        assert_eq!(swipe_bytes, vec![0, 1, 2]);
        assert_eq!(pinch_bytes, vec![3, 4, 5]);
    }

    #[test]
    fn test_magnitudes_follow_family() {
        let swipe = OutboundGestureEvent::from_raw(
            GestureKind::Update,
            &RawGesture::swipe(GesturePhase::Update, 4, -3.5, 7.25),
        );
        assert_eq!((swipe.primary, swipe.secondary), (-3.5, 7.25));

        let pinch = OutboundGestureEvent::from_raw(
            GestureKind::Update,
            &RawGesture::pinch(GesturePhase::Update, 2, 0.8, -12.0),
        );
        assert_eq!((pinch.primary, pinch.secondary), (0.8, -12.0));
        assert_eq!(pinch.finger_count, 2);
    }
}

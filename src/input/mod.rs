//! Input handling
//!
//! Touchpad gestures from libinput. The run loop sees the device only as a
//! pollable descriptor plus a drain step yielding decoded [`RawGesture`]s.

pub mod libinput;

pub use libinput::LibinputSource;

use std::os::unix::io::RawFd;

use crate::gesture::RawGesture;

/// Device side of the run loop
pub trait GestureSource {
    /// Descriptor that becomes readable when events are pending
    fn fd(&self) -> RawFd;

    /// Move every currently available gesture event into `out`, in device
    /// order. Library events are released before this returns.
    fn drain(&mut self, out: &mut Vec<RawGesture>);
}

//! libinput gesture source
//!
//! A udev-backed libinput context assigned to one seat. Gesture events are
//! decoded into [`RawGesture`] as they are pulled off the queue; everything
//! else is dropped (and thereby released) right away.

use anyhow::{anyhow, Result};
use input::event::gesture::{
    GestureEndEvent, GestureEvent, GestureEventCoordinates, GestureEventTrait, GesturePinchEvent,
    GesturePinchEventTrait, GestureSwipeEvent,
};
use input::event::Event;
use input::{Libinput, LibinputInterface};
use log::{debug, info, trace, warn};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;

use super::GestureSource;
use crate::gesture::{GesturePhase, RawGesture};

/// LibinputInterface implementation opening devices directly (we run as root)
struct DeviceInterface;

impl LibinputInterface for DeviceInterface {
    fn open_restricted(&mut self, path: &Path, flags: i32) -> std::result::Result<OwnedFd, i32> {
        let f = OpenOptions::new()
            .read(true)
            .write((flags & libc::O_WRONLY != 0) || (flags & libc::O_RDWR != 0))
            .custom_flags(flags & !libc::O_WRONLY & !libc::O_RDWR & !libc::O_RDONLY)
            .open(path)
            .map_err(|e| {
                warn!("Cannot open device: {:?}: {}", path, e);
                e.raw_os_error().unwrap_or(libc::ENOENT)
            })?;
        debug!("Opened input device {:?}", path);
        Ok(OwnedFd::from(f))
    }

    fn close_restricted(&mut self, fd: OwnedFd) {
        drop(fd);
    }
}

pub struct LibinputSource {
    input: Libinput,
    fd: RawFd,
}

impl LibinputSource {
    /// Create the libinput context and assign it to `seat`
    pub fn open(seat: &str) -> Result<Self> {
        let mut input = Libinput::new_with_udev(DeviceInterface);
        input
            .udev_assign_seat(seat)
            .map_err(|()| anyhow!("Cannot assign libinput to seat {}", seat))?;

        let fd = input.as_raw_fd();

        // Set fd to non-blocking
        let flags = nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_GETFL)
            .map_err(|e| anyhow!("F_GETFL failed: {}", e))?;
        let mut flags = nix::fcntl::OFlag::from_bits_truncate(flags);
        flags.insert(nix::fcntl::OFlag::O_NONBLOCK);
        nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_SETFL(flags))
            .map_err(|e| anyhow!("F_SETFL failed: {}", e))?;

        info!("libinput: assigned to {} (fd={})", seat, fd);
        Ok(Self { input, fd })
    }
}

impl GestureSource for LibinputSource {
    fn fd(&self) -> RawFd {
        self.fd
    }

    fn drain(&mut self, out: &mut Vec<RawGesture>) {
        if let Err(e) = self.input.dispatch() {
            warn!("libinput dispatch error: {}", e);
            return;
        }

        while let Some(event) = self.input.next() {
            if let Event::Gesture(gesture) = event {
                if let Some(raw) = decode(gesture) {
                    trace!("gesture {:?}", raw);
                    out.push(raw);
                }
            }
        }
    }
}

/// Boundary decoding of one libinput gesture event. Quantities a phase does
/// not carry are reported as 0.0.
fn decode(event: GestureEvent) -> Option<RawGesture> {
    match event {
        GestureEvent::Swipe(swipe) => Some(match swipe {
            GestureSwipeEvent::Begin(begin) => {
                RawGesture::swipe(GesturePhase::Begin, begin.finger_count(), 0.0, 0.0)
            }
            GestureSwipeEvent::Update(update) => RawGesture::swipe(
                GesturePhase::Update,
                update.finger_count(),
                update.dx(),
                update.dy(),
            ),
            GestureSwipeEvent::End(end) => {
                let raw = RawGesture::swipe(GesturePhase::End, end.finger_count(), 0.0, 0.0);
                if end.cancelled() {
                    raw.cancelled()
                } else {
                    raw
                }
            }
            _ => return None,
        }),
        GestureEvent::Pinch(pinch) => Some(match pinch {
            GesturePinchEvent::Begin(begin) => {
                RawGesture::pinch(GesturePhase::Begin, begin.finger_count(), begin.scale(), 0.0)
            }
            GesturePinchEvent::Update(update) => RawGesture::pinch(
                GesturePhase::Update,
                update.finger_count(),
                update.scale(),
                update.angle_delta(),
            ),
            GesturePinchEvent::End(end) => {
                let raw =
                    RawGesture::pinch(GesturePhase::End, end.finger_count(), end.scale(), 0.0);
                if end.cancelled() {
                    raw.cancelled()
                } else {
                    raw
                }
            }
            _ => return None,
        }),
        // hold gestures
        _ => None,
    }
}

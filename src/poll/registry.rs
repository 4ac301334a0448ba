//! Pollable Registry
//!
//! Flat `pollfd` array handed to poll(2). Slot 0 is the device descriptor,
//! slots 1.. are the enabled watches in the Watch Set's order at the last
//! rebuild. The array is rebuilt only when the Watch Set changed; otherwise
//! only `revents` is cleared before the next wait.

use std::os::unix::io::RawFd;

use log::trace;
use nix::errno::Errno;

use super::watch::{WatchId, WatchSet};
use crate::error::Fatal;

/// Interest mask of the device slot (the libinput fd is an epoll fd, it never
/// becomes writable)
pub const DEVICE_EVENTS: libc::c_short = libc::POLLIN | libc::POLLERR | libc::POLLHUP;

pub struct PollableRegistry {
    device: libc::pollfd,
    fds: Vec<libc::pollfd>,
    /// Watch owning each slot; index 0 (device) is unused
    owners: Vec<Option<WatchId>>,
}

impl PollableRegistry {
    pub fn new(device_fd: RawFd) -> Self {
        let device = libc::pollfd {
            fd: device_fd,
            events: DEVICE_EVENTS,
            revents: 0,
        };
        Self {
            device,
            fds: vec![device],
            owners: vec![None],
        }
    }

    /// Get the array ready for the next wait
    pub fn prepare(&mut self, watches: &mut WatchSet) -> Result<(), Fatal> {
        if watches.is_dirty() {
            self.rebuild(watches)
        } else {
            self.reset();
            Ok(())
        }
    }

    /// Throw the projection away and derive it again from `watches`
    pub fn rebuild(&mut self, watches: &mut WatchSet) -> Result<(), Fatal> {
        self.fds.clear();
        self.owners.clear();

        let wanted = 1 + watches.len();
        self.fds.try_reserve(wanted)?;
        self.owners.try_reserve(wanted)?;

        self.fds.push(self.device);
        self.owners.push(None);
        for (id, record) in watches.enabled() {
            self.fds.push(libc::pollfd {
                fd: record.fd,
                events: record.events,
                revents: 0,
            });
            self.owners.push(Some(id));
        }

        watches.mark_clean();
        trace!("poll registry rebuilt: {} slots", self.fds.len());
        Ok(())
    }

    /// Per-iteration cheap path: zero `revents` only
    pub fn reset(&mut self) {
        for pfd in &mut self.fds {
            pfd.revents = 0;
        }
    }

    /// Block until something is ready or `timeout_ms` elapses.
    ///
    /// Returns the number of ready slots. EINTR is passed through for the
    /// caller to retry.
    pub fn wait(&mut self, timeout_ms: i32) -> Result<usize, Errno> {
        let rc = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        Errno::result(rc).map(|n| n as usize)
    }

    pub fn device_ready(&self) -> bool {
        self.fds[0].revents != 0
    }

    /// Watch slots with non-zero `revents`, as `(watch, revents)`
    pub fn ready_watches(&self) -> impl Iterator<Item = (WatchId, libc::c_short)> + '_ {
        self.fds
            .iter()
            .zip(&self.owners)
            .skip(1)
            .filter(|(pfd, _)| pfd.revents != 0)
            .filter_map(|(pfd, owner)| owner.map(|id| (id, pfd.revents)))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    /// Descriptors currently in the array, slot order
    #[cfg(test)]
    pub fn descriptors(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.fds.iter().map(|pfd| pfd.fd)
    }

    #[cfg(test)]
    fn snapshot(&self) -> Vec<(RawFd, libc::c_short, libc::c_short)> {
        self.fds.iter().map(|p| (p.fd, p.events, p.revents)).collect()
    }

    #[cfg(test)]
    fn set_revents(&mut self, slot: usize, revents: libc::c_short) {
        self.fds[slot].revents = revents;
    }
}

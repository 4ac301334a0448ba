//! D-Bus transport (libdbus via the `dbus` crate)
//!
//! The connection is driven from our own poll loop: the channel's watch is
//! reported into the Watch Set, readiness is fed back with a zero-timeout
//! `read_write`, and queued messages are popped and routed by `dispatch`.

use std::os::unix::io::RawFd;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dbus::channel::{default_reply, BusType, Channel, Sender};
use dbus::message::MessageType;
use dbus::strings::{Interface, Member, Path};
use dbus::Message;
use log::{debug, error, info, trace, warn};

use super::{BusTransport, HandlerResult, MessageHandler, MethodCall, Reply, WatchFlags};
use crate::config::{BusConfig, BusKind};
use crate::constants::SIGNAL_UPDATE_GESTURE;
use crate::error::Fatal;
use crate::gesture::OutboundGestureEvent;
use crate::poll::{WatchKey, WatchSet};

/// DBUS_NAME_FLAG_REPLACE_EXISTING
const NAME_FLAG_REPLACE_EXISTING: u32 = 0x2;
/// DBUS_REQUEST_NAME_REPLY_PRIMARY_OWNER / _ALREADY_OWNER
const NAME_REPLY_PRIMARY_OWNER: u32 = 1;
const NAME_REPLY_ALREADY_OWNER: u32 = 4;

const REQUEST_NAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Watch as last reported into the Watch Set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReportedWatch {
    key: WatchKey,
    fd: RawFd,
    flags: WatchFlags,
    enabled: bool,
}

/// What the Watch Set has to hear about the connection's current watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchChange {
    Keep,
    /// Same descriptor and interest, only the enabled state moved
    Toggle(WatchKey, bool),
    /// Retire the reported watch (if any), then add the current one if watchable
    Replace { remove: Option<WatchKey>, add: bool },
}

/// Compare the watch libdbus reports now (`fd`, `flags`; empty flags mean
/// disabled) with what was last put into the Watch Set.
fn diff_watch(reported: Option<ReportedWatch>, fd: RawFd, flags: WatchFlags) -> WatchChange {
    let enabled = !flags.is_empty();
    let watchable = fd >= 0 && enabled;

    match reported {
        // switching off keeps the record, interest is restored on re-enable
        Some(r) if r.fd == fd && (r.flags == flags || !enabled) => {
            if r.enabled != enabled {
                WatchChange::Toggle(r.key, enabled)
            } else {
                WatchChange::Keep
            }
        }
        Some(r) => WatchChange::Replace {
            remove: Some(r.key),
            add: watchable,
        },
        None if watchable => WatchChange::Replace {
            remove: None,
            add: true,
        },
        None => WatchChange::Keep,
    }
}

pub struct DbusTransport {
    channel: Channel,
    path: Path<'static>,
    interface: Interface<'static>,
    member: Member<'static>,
    reported: Option<ReportedWatch>,
    next_key: u64,
}

impl DbusTransport {
    /// Connect, claim the well-known name and enable watch tracking
    pub fn connect(cfg: &BusConfig) -> Result<Self> {
        let path = Path::new(cfg.path.clone())
            .map_err(|e| anyhow!("Invalid object path {:?}: {}", cfg.path, e))?;
        let interface = Interface::new(cfg.interface.clone())
            .map_err(|e| anyhow!("Invalid interface name {:?}: {}", cfg.interface, e))?;
        let member =
            Member::new(SIGNAL_UPDATE_GESTURE).map_err(|e| anyhow!("Invalid member: {}", e))?;

        let bus = match cfg.bus {
            BusKind::System => BusType::System,
            BusKind::Session => BusType::Session,
        };
        let mut channel = Channel::get_private(bus)
            .map_err(|e| anyhow!("Failed to connect to the {:?} bus: {}", cfg.bus, e))?;

        let request = Message::new_method_call(
            "org.freedesktop.DBus",
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus",
            "RequestName",
        )
        .map_err(|e| anyhow!("Failed to build RequestName call: {}", e))?
        .append2(cfg.name.as_str(), NAME_FLAG_REPLACE_EXISTING);

        let reply = channel
            .send_with_reply_and_block(request, REQUEST_NAME_TIMEOUT)
            .map_err(|e| anyhow!("Failed to request bus name {}: {}", cfg.name, e))?;
        let code: u32 = reply.read1().context("Malformed RequestName reply")?;
        match code {
            NAME_REPLY_PRIMARY_OWNER | NAME_REPLY_ALREADY_OWNER => {}
            other => warn!("Bus name {} not owned (RequestName reply {})", cfg.name, other),
        }

        channel.set_watch_enabled(true);

        info!(
            "Bus connected as {} ({})",
            cfg.name,
            channel.unique_name().unwrap_or("?")
        );

        Ok(Self {
            channel,
            path,
            interface,
            member,
            reported: None,
            next_key: 1,
        })
    }

    fn is_disconnect(msg: &Message) -> bool {
        msg.msg_type() == MessageType::Signal
            && msg.interface().as_deref() == Some("org.freedesktop.DBus.Local")
            && msg.member().as_deref() == Some("Disconnected")
    }
}

impl BusTransport for DbusTransport {
    fn sync_watches(&mut self, watches: &mut WatchSet) {
        let current = self.channel.watch();
        let mut flags = WatchFlags::empty();
        if current.read {
            flags |= WatchFlags::READABLE;
        }
        if current.write {
            flags |= WatchFlags::WRITABLE;
        }

        match diff_watch(self.reported, current.fd, flags) {
            WatchChange::Keep => {}
            WatchChange::Toggle(key, enabled) => {
                watches.toggle(key, enabled);
                if let Some(reported) = self.reported.as_mut() {
                    reported.enabled = enabled;
                }
            }
            WatchChange::Replace { remove, add } => {
                if let Some(key) = remove {
                    watches.remove(key);
                    self.reported = None;
                }
                if add {
                    let key = WatchKey(self.next_key);
                    self.next_key += 1;
                    watches.add(key, current.fd, flags, true);
                    self.reported = Some(ReportedWatch {
                        key,
                        fd: current.fd,
                        flags,
                        enabled: true,
                    });
                }
            }
        }
    }

    fn handle_watch(&mut self, key: WatchKey, flags: WatchFlags) -> Result<(), Fatal> {
        if self.reported.map(|r| r.key) != Some(key) {
            debug!("Readiness for stale watch {:?} ignored", key);
            return Ok(());
        }
        if flags.intersects(WatchFlags::HANGUP | WatchFlags::ERROR) {
            warn!("Bus socket reported {:?}", flags);
        }
        self.channel
            .read_write(Some(Duration::ZERO))
            .map_err(|()| Fatal::Transport("bus connection closed".into()))
    }

    fn dispatch(&mut self, handler: &mut dyn MessageHandler) -> Result<(), Fatal> {
        let mut failure = None;

        while let Some(msg) = self.channel.pop_message() {
            if Self::is_disconnect(&msg) {
                error!("Disconnected from the bus");
                failure.get_or_insert(Fatal::Transport("disconnected from the bus".into()));
                continue;
            }
            if msg.msg_type() != MessageType::MethodCall {
                trace!("Ignoring {:?} message", msg.msg_type());
                continue;
            }

            let path = msg.path();
            let interface = msg.interface();
            let member = msg.member();
            let call = MethodCall {
                path: path.as_deref(),
                interface: interface.as_deref(),
                member: member.as_deref(),
            };
            let reply = match handler.on_method_call(&call) {
                HandlerResult::Handled(Reply::Empty) => Some(msg.method_return()),
                HandlerResult::Handled(Reply::Text(text)) => {
                    Some(msg.method_return().append1(text))
                }
                HandlerResult::NotYetHandled => default_reply(&msg),
            };

            if let Some(reply) = reply {
                if self.channel.send(reply).is_err() {
                    error!("Out of memory while queueing a reply");
                    failure.get_or_insert(Fatal::Transport("reply could not be queued".into()));
                }
            }
        }

        self.channel.flush();
        failure.map_or(Ok(()), Err)
    }

    fn send_gesture(&mut self, event: &OutboundGestureEvent) -> Result<(), Fatal> {
        let msg = Message::signal(&self.path, &self.interface, &self.member)
            .append3(event.kind_byte(), event.finger_count, event.primary)
            .append1(event.secondary);

        self.channel
            .send(msg)
            .map(|_| ())
            .map_err(|()| Fatal::Send("message send failed".into()))
    }

    fn flush(&mut self) {
        self.channel.flush();
    }
}

impl Drop for DbusTransport {
    fn drop(&mut self) {
        info!("Closing bus connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RW: WatchFlags = WatchFlags::READABLE.union(WatchFlags::WRITABLE);

    fn reported(key: u64, fd: RawFd, flags: WatchFlags, enabled: bool) -> Option<ReportedWatch> {
        Some(ReportedWatch {
            key: WatchKey(key),
            fd,
            flags,
            enabled,
        })
    }

    #[test]
    fn test_first_watch_is_added() {
        assert_eq!(
            diff_watch(None, 7, WatchFlags::READABLE),
            WatchChange::Replace {
                remove: None,
                add: true
            }
        );
    }

    #[test]
    fn test_nothing_to_watch_yet() {
        assert_eq!(diff_watch(None, -1, WatchFlags::empty()), WatchChange::Keep);
        assert_eq!(diff_watch(None, -1, WatchFlags::READABLE), WatchChange::Keep);
        assert_eq!(diff_watch(None, 7, WatchFlags::empty()), WatchChange::Keep);
    }

    #[test]
    fn test_unchanged_watch_is_kept() {
        let r = reported(1, 7, WatchFlags::READABLE, true);
        assert_eq!(diff_watch(r, 7, WatchFlags::READABLE), WatchChange::Keep);

        let off = reported(1, 7, WatchFlags::READABLE, false);
        assert_eq!(diff_watch(off, 7, WatchFlags::empty()), WatchChange::Keep);
    }

    #[test]
    fn test_enable_state_toggles() {
        let r = reported(1, 7, RW, true);
        assert_eq!(
            diff_watch(r, 7, WatchFlags::empty()),
            WatchChange::Toggle(WatchKey(1), false)
        );

        let off = reported(1, 7, RW, false);
        assert_eq!(diff_watch(off, 7, RW), WatchChange::Toggle(WatchKey(1), true));
    }

    #[test]
    fn test_interest_change_replaces() {
        let r = reported(1, 7, WatchFlags::READABLE, true);
        assert_eq!(
            diff_watch(r, 7, RW),
            WatchChange::Replace {
                remove: Some(WatchKey(1)),
                add: true
            }
        );

        // re-enabled with a different interest than before
        let off = reported(1, 7, WatchFlags::READABLE, false);
        assert_eq!(
            diff_watch(off, 7, WatchFlags::WRITABLE),
            WatchChange::Replace {
                remove: Some(WatchKey(1)),
                add: true
            }
        );
    }

    #[test]
    fn test_new_descriptor_replaces() {
        let r = reported(1, 7, WatchFlags::READABLE, true);
        assert_eq!(
            diff_watch(r, 9, WatchFlags::READABLE),
            WatchChange::Replace {
                remove: Some(WatchKey(1)),
                add: true
            }
        );
    }

    #[test]
    fn test_descriptor_gone_removes() {
        let r = reported(1, 7, WatchFlags::READABLE, true);
        assert_eq!(
            diff_watch(r, -1, WatchFlags::empty()),
            WatchChange::Replace {
                remove: Some(WatchKey(1)),
                add: false
            }
        );
        assert_eq!(
            diff_watch(r, 9, WatchFlags::empty()),
            WatchChange::Replace {
                remove: Some(WatchKey(1)),
                add: false
            }
        );
    }
}

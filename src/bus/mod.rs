//! IPC bus
//!
//! The run loop only talks to the bus through [`BusTransport`]: watch
//! lifecycle reporting, readiness delivery, a dispatch step and the gesture
//! signal. Incoming calls are routed to a [`MessageHandler`] which knows the
//! two requests the service answers.

pub mod connection;

pub use connection::DbusTransport;

use bitflags::bitflags;
use log::{debug, trace};

use crate::constants::{
    INTROSPECTABLE_INTERFACE, METHOD_INTROSPECT, METHOD_STAY_ALIVE, SIGNAL_UPDATE_GESTURE,
};
use crate::error::Fatal;
use crate::gesture::OutboundGestureEvent;
use crate::liveness::LivenessMonitor;
use crate::poll::{WatchKey, WatchSet};

bitflags! {
    /// Watch condition vocabulary of the bus library
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WatchFlags: u32 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const ERROR = 1 << 2;
        const HANGUP = 1 << 3;
    }
}

impl WatchFlags {
    /// poll(2) interest for a watch; errors and hangups are always watched
    pub fn to_poll_events(self) -> libc::c_short {
        let mut events = libc::POLLHUP | libc::POLLERR;
        if self.contains(WatchFlags::READABLE) {
            events |= libc::POLLIN;
        }
        if self.contains(WatchFlags::WRITABLE) {
            events |= libc::POLLOUT;
        }
        events
    }

    /// Translate poll(2) `revents` into watch conditions
    pub fn from_revents(revents: libc::c_short) -> Self {
        let mut flags = WatchFlags::empty();
        if revents & libc::POLLIN != 0 {
            flags |= WatchFlags::READABLE;
        }
        if revents & libc::POLLOUT != 0 {
            flags |= WatchFlags::WRITABLE;
        }
        if revents & libc::POLLHUP != 0 {
            flags |= WatchFlags::HANGUP;
        }
        if revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
            flags |= WatchFlags::ERROR;
        }
        flags
    }
}

/// Answer to a recognised request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<'a> {
    /// Empty success reply
    Empty,
    /// Success reply carrying one string
    Text(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResult<'a> {
    Handled(Reply<'a>),
    /// Not ours; the transport applies its default behaviour
    NotYetHandled,
}

/// Incoming method call as the core sees it
#[derive(Debug, Clone, Copy)]
pub struct MethodCall<'a> {
    pub path: Option<&'a str>,
    pub interface: Option<&'a str>,
    pub member: Option<&'a str>,
}

pub trait MessageHandler {
    fn on_method_call(&mut self, call: &MethodCall<'_>) -> HandlerResult<'_>;
}

/// Transport side of the run loop
pub trait BusTransport {
    /// Report watch additions, toggles and removals since the last call
    fn sync_watches(&mut self, watches: &mut WatchSet);

    /// Readiness observed on a watch's descriptor
    fn handle_watch(&mut self, key: WatchKey, flags: WatchFlags) -> Result<(), Fatal>;

    /// Drain queued incoming messages into `handler`.
    ///
    /// Keeps going after a failure; the first failure is returned.
    fn dispatch(&mut self, handler: &mut dyn MessageHandler) -> Result<(), Fatal>;

    /// Queue one `UpdateGesture` signal
    fn send_gesture(&mut self, event: &OutboundGestureEvent) -> Result<(), Fatal>;

    /// Push queued outbound messages to the socket
    fn flush(&mut self);
}

/// Introspection document for the service object
pub fn introspection_xml(interface: &str) -> String {
    format!(
        r#"<!DOCTYPE node PUBLIC "-//freedesktop//DTD D-BUS Object Introspection 1.0//EN"
"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd">
<node>
  <interface name="{introspectable}">
    <method name="{introspect}">
      <arg name="data" direction="out" type="s"/>
    </method>
  </interface>
  <interface name="{interface}">
    <method name="{stay_alive}">
    </method>
    <signal name="{update}">
      <arg direction="out" type="y"/>
      <arg direction="out" type="n"/>
      <arg direction="out" type="d"/>
      <arg direction="out" type="d"/>
    </signal>
  </interface>
</node>
"#,
        introspectable = INTROSPECTABLE_INTERFACE,
        introspect = METHOD_INTROSPECT,
        interface = interface,
        stay_alive = METHOD_STAY_ALIVE,
        update = SIGNAL_UPDATE_GESTURE,
    )
}

/// Handler for the service object: keep-alive and introspection.
/// Only calls addressed to `path` are answered.
pub struct ServiceHandler<'a> {
    pub path: &'a str,
    pub interface: &'a str,
    pub introspection: &'a str,
    pub liveness: &'a mut LivenessMonitor,
}

impl MessageHandler for ServiceHandler<'_> {
    fn on_method_call(&mut self, call: &MethodCall<'_>) -> HandlerResult<'_> {
        if call.path != Some(self.path) {
            debug!("call for object {:?} not handled", call.path);
            return HandlerResult::NotYetHandled;
        }
        match (call.interface, call.member) {
            (Some(iface), Some(METHOD_STAY_ALIVE)) if iface == self.interface => {
                trace!("keep-alive received");
                self.liveness.touch();
                HandlerResult::Handled(Reply::Empty)
            }
            (Some(INTROSPECTABLE_INTERFACE), Some(METHOD_INTROSPECT)) => {
                trace!("introspection request");
                HandlerResult::Handled(Reply::Text(self.introspection))
            }
            (iface, member) => {
                debug!("unknown request: interface {:?} member {:?}", iface, member);
                HandlerResult::NotYetHandled
            }
        }
    }
}

//! Run loop
//!
//! One blocking poll(2) per iteration over the device descriptor and the bus
//! watches. Device events are always drained and sent before bus readiness is
//! handled. Transport failures are recorded and acted upon at the end of the
//! iteration; a poll failure ends the loop at once.

use log::{debug, error, info, trace};
use nix::errno::Errno;

use crate::bus::{introspection_xml, BusTransport, ServiceHandler, WatchFlags};
use crate::config::Config;
use crate::error::{ExitStatus, Fatal};
use crate::gesture::{GestureDecoder, GestureFamily, OutboundGestureEvent, RawGesture};
use crate::input::GestureSource;
use crate::liveness::LivenessMonitor;
use crate::poll::{PollableRegistry, WatchKey, WatchSet};
use crate::signal;

enum LoopState {
    Running,
    ShuttingDown(ExitStatus),
}

/// Owns the device, the bus connection and all loop state. Consumed by
/// [`GestureServer::run`], so both collaborators are released exactly once
/// whichever way the loop ends.
pub struct GestureServer<D: GestureSource, T: BusTransport> {
    device: D,
    transport: T,
    watches: WatchSet,
    registry: PollableRegistry,
    decoder: GestureDecoder,
    liveness: LivenessMonitor,
    poll_timeout_ms: i32,
    forward_pinch: bool,
    path: String,
    interface: String,
    introspection: String,
    /// First deferred failure of the current iteration
    pending_fatal: Option<Fatal>,
    shutdown_requested: fn() -> bool,
    wait: fn(&mut PollableRegistry, i32) -> Result<usize, Errno>,

    // scratch buffers reused across iterations
    raw: Vec<RawGesture>,
    outbound: Vec<OutboundGestureEvent>,
    ready: Vec<(WatchKey, WatchFlags)>,
}

impl<D: GestureSource, T: BusTransport> GestureServer<D, T> {
    pub fn new(device: D, transport: T, config: &Config) -> Self {
        let registry = PollableRegistry::new(device.fd());
        Self {
            device,
            transport,
            watches: WatchSet::new(),
            registry,
            decoder: GestureDecoder::new(config.gestures.latent_stop),
            liveness: LivenessMonitor::new(
                config.service.idle_timeout(),
                config.service.liveness_check_every(),
            ),
            poll_timeout_ms: config.service.poll_timeout_ms(),
            forward_pinch: config.gestures.forward_pinch,
            path: config.bus.path.clone(),
            interface: config.bus.interface.clone(),
            introspection: introspection_xml(&config.bus.interface),
            pending_fatal: None,
            shutdown_requested: signal::shutdown_requested,
            wait: PollableRegistry::wait,
            raw: Vec::new(),
            outbound: Vec::new(),
            ready: Vec::new(),
        }
    }

    #[cfg(test)]
    fn with_shutdown_check(mut self, check: fn() -> bool) -> Self {
        self.shutdown_requested = check;
        self
    }

    #[cfg(test)]
    fn with_wait(mut self, wait: fn(&mut PollableRegistry, i32) -> Result<usize, Errno>) -> Self {
        self.wait = wait;
        self
    }

    /// Run until idle expiry, a shutdown signal or a fatal error
    pub fn run(mut self) -> ExitStatus {
        info!(
            "Service running (idle timeout {:?}, latent stop {:?}, pinch {})",
            self.liveness.timeout(),
            self.decoder.policy(),
            if self.forward_pinch { "on" } else { "off" }
        );

        let status = loop {
            if let LoopState::ShuttingDown(status) = self.iterate() {
                break status;
            }
        };

        match &status {
            ExitStatus::Normal => info!("Service stopping"),
            ExitStatus::Failed(fatal) => error!("Service stopping: {}", fatal),
        }
        status
    }

    fn iterate(&mut self) -> LoopState {
        self.transport.sync_watches(&mut self.watches);
        if let Err(e) = self.registry.prepare(&mut self.watches) {
            return LoopState::ShuttingDown(ExitStatus::Failed(e));
        }

        loop {
            match (self.wait)(&mut self.registry, self.poll_timeout_ms) {
                Ok(_) => break,
                Err(Errno::EINTR) => {
                    if (self.shutdown_requested)() {
                        info!("Shutdown requested by signal");
                        return LoopState::ShuttingDown(ExitStatus::Normal);
                    }
                    self.registry.reset();
                }
                Err(errno) => {
                    return LoopState::ShuttingDown(ExitStatus::Failed(Fatal::Poll(errno)));
                }
            }
        }

        if self.registry.device_ready() {
            self.handle_device();
        }
        self.handle_watches();

        if let Some(fatal) = self.pending_fatal.take() {
            return LoopState::ShuttingDown(ExitStatus::Failed(fatal));
        }
        if (self.shutdown_requested)() {
            info!("Shutdown requested by signal");
            return LoopState::ShuttingDown(ExitStatus::Normal);
        }
        if self.liveness.poll_expired() {
            info!("No keep-alive for {:?}, exiting", self.liveness.timeout());
            return LoopState::ShuttingDown(ExitStatus::Normal);
        }
        LoopState::Running
    }

    /// Drain the device, decode the batch and send the result
    fn handle_device(&mut self) {
        self.raw.clear();
        self.outbound.clear();
        self.device.drain(&mut self.raw);

        self.decoder.begin_batch();
        for raw in &self.raw {
            if raw.family == GestureFamily::Pinch && !self.forward_pinch {
                continue;
            }
            self.decoder.decode(raw, &mut self.outbound);
        }
        self.decoder.end_batch(&mut self.outbound);

        for event in &self.outbound {
            trace!(
                "UpdateGesture({}, {}, {}, {})",
                event.kind_byte(),
                event.finger_count,
                event.primary,
                event.secondary
            );
            if let Err(e) = self.transport.send_gesture(event) {
                error!("{}", e);
                self.pending_fatal.get_or_insert(e);
                break;
            }
        }
        if !self.outbound.is_empty() {
            self.transport.flush();
        }
    }

    /// Route watch readiness into the transport, then let it dispatch once
    fn handle_watches(&mut self) {
        self.ready.clear();
        for (id, revents) in self.registry.ready_watches() {
            match self.watches.get(id) {
                Some(record) if record.enabled => {
                    self.ready.push((record.key, WatchFlags::from_revents(revents)));
                }
                _ => trace!("readiness on retired watch slot ignored"),
            }
        }
        if self.ready.is_empty() {
            return;
        }

        for &(key, flags) in &self.ready {
            // an earlier handler in this pass may have removed it
            if self.watches.id_of(key).is_none() {
                continue;
            }
            if let Err(e) = self.transport.handle_watch(key, flags) {
                error!("{}", e);
                self.pending_fatal.get_or_insert(e);
            }
            self.transport.sync_watches(&mut self.watches);
            if self.watches.has_removals() {
                debug!("watch removed, rebuilding poll registry");
                if let Err(e) = self.registry.rebuild(&mut self.watches) {
                    error!("{}", e);
                    self.pending_fatal.get_or_insert(e);
                }
            }
        }

        let mut handler = ServiceHandler {
            path: &self.path,
            interface: &self.interface,
            introspection: &self.introspection,
            liveness: &mut self.liveness,
        };
        if let Err(e) = self.transport.dispatch(&mut handler) {
            error!("{}", e);
            self.pending_fatal.get_or_insert(e);
        }
    }
}

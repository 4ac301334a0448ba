//! Gesture decoder
//!
//! Turns libinput's begin/update/end stream into start/update/stop events.
//!
//! libinput sometimes ends a gesture as "cancelled" and immediately begins
//! it again for the same physical motion. Clients want one session, so the
//! restart Begin is swallowed. If no restart follows, the session still gets
//! a Stop: a latent one, with the remembered finger count and zero
//! magnitudes. [`LatentStopPolicy`] decides whether that Stop goes out right
//! after the cancelling End or only at the end of the drained batch.

use log::trace;

use super::{
    GestureFamily, GestureKind, GesturePhase, LatentStopPolicy, OutboundGestureEvent, RawGesture,
};

/// Outstanding "cancelled End, maybe a restart follows"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingStop {
    family: GestureFamily,
    finger_count: i16,
    /// Latent Stop already emitted (per-event policy)
    emitted: bool,
}

pub struct GestureDecoder {
    policy: LatentStopPolicy,
    pending: Option<PendingStop>,
}

impl GestureDecoder {
    pub fn new(policy: LatentStopPolicy) -> Self {
        Self {
            policy,
            pending: None,
        }
    }

    pub fn policy(&self) -> LatentStopPolicy {
        self.policy
    }

    /// A suppression is armed (cancelled End seen, no Begin yet)
    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start of a drained batch. Suppression never carries across wake-ups.
    pub fn begin_batch(&mut self) {
        self.pending = None;
    }

    /// Feed one device event; resulting events are appended to `out`.
    pub fn decode(&mut self, raw: &RawGesture, out: &mut Vec<OutboundGestureEvent>) {
        match raw.phase {
            GesturePhase::Begin => {
                if self.pending.take().is_some() {
                    trace!("restart begin after cancelled end suppressed ({:?})", raw.family);
                } else {
                    out.push(OutboundGestureEvent::from_raw(GestureKind::Start, raw));
                }
            }
            GesturePhase::Update => {
                out.push(OutboundGestureEvent::from_raw(GestureKind::Update, raw));
            }
            GesturePhase::End if raw.cancelled => {
                trace!("cancelled end ({:?}, {} fingers)", raw.family, raw.finger_count);
                self.pending = Some(PendingStop {
                    family: raw.family,
                    finger_count: raw.finger_count as i16,
                    emitted: false,
                });
            }
            GesturePhase::End => {
                self.pending = None;
                out.push(OutboundGestureEvent::from_raw(GestureKind::Stop, raw));
            }
        }

        if self.policy == LatentStopPolicy::PerEvent {
            self.emit_latent_stop(out);
        }
    }

    /// End of a drained batch
    pub fn end_batch(&mut self, out: &mut Vec<OutboundGestureEvent>) {
        if self.policy == LatentStopPolicy::PerBatch {
            self.emit_latent_stop(out);
        }
        self.pending = None;
    }

    fn emit_latent_stop(&mut self, out: &mut Vec<OutboundGestureEvent>) {
        if let Some(pending) = self.pending.as_mut() {
            if !pending.emitted {
                pending.emitted = true;
                out.push(OutboundGestureEvent::latent_stop(pending.family, pending.finger_count));
            }
        }
    }

    /// Convenience: decode a whole batch
    #[cfg(test)]
    pub fn decode_batch(&mut self, batch: &[RawGesture], out: &mut Vec<OutboundGestureEvent>) {
        self.begin_batch();
        for raw in batch {
            self.decode(raw, out);
        }
        self.end_batch(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GesturePhase::{Begin, End, Update};

    fn swipe(phase: GesturePhase, fingers: i32) -> RawGesture {
        RawGesture::swipe(phase, fingers, 0.0, 0.0)
    }

    fn run(policy: LatentStopPolicy, batch: &[RawGesture]) -> Vec<OutboundGestureEvent> {
        let mut decoder = GestureDecoder::new(policy);
        let mut out = Vec::new();
        decoder.decode_batch(batch, &mut out);
        out
    }

    fn bytes(events: &[OutboundGestureEvent]) -> Vec<u8> {
        events.iter().map(|e| e.kind_byte()).collect()
    }

    #[test]
    fn test_clean_swipe_session() {
        let out = run(
            LatentStopPolicy::PerEvent,
            &[
                swipe(Begin, 3),
                RawGesture::swipe(Update, 3, 1.0, 2.0),
                swipe(End, 3),
            ],
        );
        assert_eq!(bytes(&out), vec![0, 2, 1]);
        assert!(out.iter().all(|e| e.finger_count == 3));
        assert_eq!((out[1].primary, out[1].secondary), (1.0, 2.0));
    }

    #[test]
    fn test_cancel_then_restart_per_event() {
        let out = run(
            LatentStopPolicy::PerEvent,
            &[
                swipe(Begin, 3),
                swipe(End, 3).cancelled(),
                swipe(Begin, 3),
                swipe(End, 3),
            ],
        );
        assert_eq!(bytes(&out), vec![0, 1, 1]);
        assert_eq!(out[1], OutboundGestureEvent::latent_stop(GestureFamily::Swipe, 3));
        assert_eq!(out.iter().filter(|e| e.kind == GestureKind::Start).count(), 1);
    }

    #[test]
    fn test_cancel_then_restart_per_batch() {
        let out = run(
            LatentStopPolicy::PerBatch,
            &[
                swipe(Begin, 3),
                swipe(End, 3).cancelled(),
                swipe(Begin, 3),
                RawGesture::swipe(Update, 3, 4.0, 0.5),
                swipe(End, 3),
            ],
        );
        assert_eq!(bytes(&out), vec![0, 2, 1]);
    }

    #[test]
    fn test_cancel_without_restart_yields_one_latent_stop() {
        for policy in [LatentStopPolicy::PerEvent, LatentStopPolicy::PerBatch] {
            let out = run(policy, &[swipe(Begin, 4), swipe(End, 4).cancelled()]);
            assert_eq!(bytes(&out), vec![0, 1], "{:?}", policy);
            assert_eq!(out[1].finger_count, 4);
            assert_eq!((out[1].primary, out[1].secondary), (0.0, 0.0));
        }
    }

    #[test]
    fn test_per_event_stop_precedes_following_events() {
        let out = run(
            LatentStopPolicy::PerEvent,
            &[
                swipe(Begin, 3),
                swipe(End, 3).cancelled(),
                RawGesture::swipe(Update, 3, 1.0, 1.0),
            ],
        );
        assert_eq!(bytes(&out), vec![0, 1, 2]);
    }

    #[test]
    fn test_per_batch_stop_after_batch() {
        let out = run(
            LatentStopPolicy::PerBatch,
            &[
                swipe(Begin, 3),
                swipe(End, 3).cancelled(),
                RawGesture::swipe(Update, 3, 1.0, 1.0),
            ],
        );
        assert_eq!(bytes(&out), vec![0, 2, 1]);
        assert_eq!(out[2].finger_count, 3);
    }

    #[test]
    fn test_update_does_not_resolve_pending() {
        let mut decoder = GestureDecoder::new(LatentStopPolicy::PerBatch);
        let mut out = Vec::new();
        decoder.begin_batch();
        decoder.decode(&swipe(End, 3).cancelled(), &mut out);
        decoder.decode(&RawGesture::swipe(Update, 3, 1.0, 1.0), &mut out);
        assert!(decoder.is_pending());
        decoder.decode(&swipe(Begin, 3), &mut out);
        assert!(!decoder.is_pending());
        assert_eq!(bytes(&out), vec![2]);
    }

    #[test]
    fn test_suppression_does_not_leak_into_next_session() {
        let mut decoder = GestureDecoder::new(LatentStopPolicy::PerEvent);
        let mut out = Vec::new();
        decoder.decode_batch(
            &[swipe(Begin, 3), swipe(End, 3).cancelled(), swipe(Begin, 3), swipe(End, 3)],
            &mut out,
        );
        out.clear();

        decoder.decode_batch(&[swipe(Begin, 2), swipe(End, 2)], &mut out);
        assert_eq!(bytes(&out), vec![0, 1]);
        assert!(out.iter().all(|e| e.finger_count == 2));
    }

    #[test]
    fn test_pending_cleared_between_batches() {
        let mut decoder = GestureDecoder::new(LatentStopPolicy::PerEvent);
        let mut out = Vec::new();
        decoder.decode_batch(&[swipe(Begin, 3), swipe(End, 3).cancelled()], &mut out);
        assert!(!decoder.is_pending());

        out.clear();
        decoder.decode_batch(&[swipe(Begin, 3)], &mut out);
        assert_eq!(bytes(&out), vec![0]);
    }

    #[test]
    fn test_second_end_while_pending() {
        let out = run(
            LatentStopPolicy::PerBatch,
            &[swipe(Begin, 3), swipe(End, 3).cancelled(), swipe(End, 3)],
        );
        // real Stop resolves the pending state, no latent Stop on top
        assert_eq!(bytes(&out), vec![0, 1]);

        let out = run(
            LatentStopPolicy::PerEvent,
            &[swipe(Begin, 3), swipe(End, 3).cancelled(), swipe(End, 3).cancelled()],
        );
        assert_eq!(bytes(&out), vec![0, 1, 1]);
    }

    #[test]
    fn test_pinch_session_and_latent_stop() {
        let out = run(
            LatentStopPolicy::PerEvent,
            &[
                RawGesture::pinch(Begin, 2, 1.0, 0.0),
                RawGesture::pinch(Update, 2, 1.25, 3.0),
                RawGesture::pinch(End, 2, 1.3, 0.0).cancelled(),
            ],
        );
        assert_eq!(bytes(&out), vec![3, 5, 4]);
        assert_eq!((out[1].primary, out[1].secondary), (1.25, 3.0));
        assert_eq!((out[2].primary, out[2].secondary), (0.0, 0.0));
    }

    #[test]
    fn test_update_without_begin_passes_through() {
        let out = run(LatentStopPolicy::PerEvent, &[RawGesture::swipe(Update, 3, 5.0, -5.0)]);
        assert_eq!(bytes(&out), vec![2]);
    }

    /// No two Starts without a Stop in between, and never more Starts than
    /// Begins, over a pseudo-random but well-formed device stream cut into
    /// batches at arbitrary points.
    #[test]
    fn test_start_stop_alternation() {
        let mut seed: u32 = 0x9e37_79b9;
        let mut next = move || {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (seed >> 16) % 8
        };

        let mut stream = Vec::new();
        let mut in_session = false;
        for _ in 0..2_000 {
            if !in_session {
                stream.push(swipe(Begin, 3));
                in_session = true;
                continue;
            }
            match next() {
                0..=3 => stream.push(RawGesture::swipe(Update, 3, 1.0, 1.0)),
                4 | 5 => {
                    stream.push(swipe(End, 3));
                    in_session = false;
                }
                _ => {
                    stream.push(swipe(End, 3).cancelled());
                    in_session = false;
                }
            }
        }
        let begins = stream.iter().filter(|r| r.phase == Begin).count();

        for policy in [LatentStopPolicy::PerEvent, LatentStopPolicy::PerBatch] {
            let mut decoder = GestureDecoder::new(policy);
            let mut starts = 0;
            let mut open = false;

            for batch in stream.chunks(5) {
                let cut = (next() as usize).min(batch.len());
                for part in [&batch[..cut], &batch[cut..]] {
                    let mut out = Vec::new();
                    decoder.decode_batch(part, &mut out);
                    for event in out {
                        match event.kind {
                            GestureKind::Start => {
                                assert!(!open, "two starts without a stop ({:?})", policy);
                                open = true;
                                starts += 1;
                            }
                            GestureKind::Stop => open = false,
                            GestureKind::Update => {}
                        }
                    }
                }
            }
            assert!(starts <= begins);
        }
    }
}

//! Correlation of incoming frames with outstanding requests
//!
//! Every request registers one waiter under the key of the frame it expects.
//! An incoming frame completes the oldest live waiter for its key; frames
//! nobody waits for are only seen by event subscribers. Every frame is
//! broadcast to subscribers regardless.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace};

use crate::frame::{CommandType, FrameKey, Subsystem, ZnpFrame};

/// Default capacity of the event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fan-out point between the frame reader and request/event consumers
pub struct ZnpDispatcher {
    pending: Mutex<HashMap<FrameKey, VecDeque<oneshot::Sender<ZnpFrame>>>>,
    events: broadcast::Sender<ZnpFrame>,
}

impl Default for ZnpDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl ZnpDispatcher {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            pending: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Register interest in the next frame with the given key
    ///
    /// Dropping the receiver cancels the registration. Cancelled
    /// registrations are swept here, so a key whose reply never arrives
    /// does not accumulate dead senders.
    pub fn register(
        &self,
        kind: CommandType,
        subsystem: Subsystem,
        command: u8,
    ) -> oneshot::Receiver<ZnpFrame> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();
        pending.retain(|_, queue| {
            queue.retain(|waiter| !waiter.is_closed());
            !queue.is_empty()
        });
        pending
            .entry((kind, subsystem, command))
            .or_default()
            .push_back(tx);
        rx
    }

    /// Receive every frame from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ZnpFrame> {
        self.events.subscribe()
    }

    /// Number of live registrations
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .values()
            .flatten()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Drop every registration; their receivers see the channel closed
    pub fn cancel_all(&self) {
        self.pending.lock().clear();
    }

    /// Route an incoming frame; returns whether a waiter took it
    pub fn dispatch(&self, frame: ZnpFrame) -> bool {
        let key = reply_key(&frame);
        let delivered = self.complete(key, frame.clone());
        if !delivered {
            trace!("No waiter for {}", frame);
        }
        // no subscribers is fine
        let _ = self.events.send(frame);
        delivered
    }

    fn complete(&self, key: FrameKey, frame: ZnpFrame) -> bool {
        let mut pending = self.pending.lock();
        let Some(queue) = pending.get_mut(&key) else {
            return false;
        };

        let mut frame = frame;
        let mut delivered = false;
        while let Some(waiter) = queue.pop_front() {
            match waiter.send(frame) {
                Ok(()) => {
                    delivered = true;
                    break;
                }
                Err(returned) => {
                    debug!("Dropping cancelled waiter for {:?}", key);
                    frame = returned;
                }
            }
        }
        if queue.is_empty() {
            pending.remove(&key);
        }
        delivered
    }
}

/// Key of the request an incoming frame answers
///
/// RPC errors arrive as an SRSP on the RPC_Error subsystem carrying the
/// failed request's Cmd0/Cmd1; they are routed to that request's waiter.
fn reply_key(frame: &ZnpFrame) -> FrameKey {
    if frame.kind == CommandType::Srsp
        && frame.subsystem == Subsystem::RpcError
        && frame.payload.len() >= 3
    {
        if let Some(subsystem) = Subsystem::from_u8(frame.payload[1] & 0x0f) {
            return (CommandType::Srsp, subsystem, frame.payload[2]);
        }
    }
    frame.key()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn srsp(command: u8, payload: &'static [u8]) -> ZnpFrame {
        ZnpFrame::new(CommandType::Srsp, Subsystem::Sys, command, Bytes::from_static(payload))
    }

    #[test]
    fn test_fifo_per_key() {
        let dispatcher = ZnpDispatcher::default();
        let mut first = dispatcher.register(CommandType::Srsp, Subsystem::Sys, 0x01);
        let mut second = dispatcher.register(CommandType::Srsp, Subsystem::Sys, 0x01);

        assert!(dispatcher.dispatch(srsp(0x01, b"a")));
        assert_eq!(first.try_recv().unwrap().payload, Bytes::from_static(b"a"));
        assert!(second.try_recv().is_err());

        assert!(dispatcher.dispatch(srsp(0x01, b"b")));
        assert_eq!(second.try_recv().unwrap().payload, Bytes::from_static(b"b"));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn test_unmatched_frame_still_reaches_subscribers() {
        let dispatcher = ZnpDispatcher::default();
        let mut events = dispatcher.subscribe();
        let _waiter = dispatcher.register(CommandType::Srsp, Subsystem::Sys, 0x02);

        assert!(!dispatcher.dispatch(srsp(0x01, b"x")));
        assert_eq!(events.try_recv().unwrap().command, 0x01);
        assert_eq!(dispatcher.pending_count(), 1);
    }

    #[test]
    fn test_cancelled_waiter_is_skipped() {
        let dispatcher = ZnpDispatcher::default();
        drop(dispatcher.register(CommandType::Srsp, Subsystem::Sys, 0x01));
        let mut live = dispatcher.register(CommandType::Srsp, Subsystem::Sys, 0x01);

        assert!(dispatcher.dispatch(srsp(0x01, b"y")));
        assert!(live.try_recv().is_ok());
    }

    #[test]
    fn test_timed_out_waiters_do_not_accumulate() {
        let dispatcher = ZnpDispatcher::default();
        let queued = |d: &ZnpDispatcher| {
            d.pending.lock().values().map(VecDeque::len).sum::<usize>()
        };

        for _ in 0..1000 {
            drop(dispatcher.register(CommandType::Areq, Subsystem::Zdo, 0xc1));
        }
        assert!(queued(&dispatcher) <= 1);

        let mut live = dispatcher.register(CommandType::Areq, Subsystem::Zdo, 0xc1);
        assert_eq!(queued(&dispatcher), 1);

        // an unrelated key sweeps the last cancelled entry too
        drop(live);
        let _other = dispatcher.register(CommandType::Srsp, Subsystem::Sys, 0x02);
        assert_eq!(queued(&dispatcher), 1);
        assert_eq!(dispatcher.pending_count(), 1);

        live = dispatcher.register(CommandType::Areq, Subsystem::Zdo, 0xc1);
        let frame = ZnpFrame::new(CommandType::Areq, Subsystem::Zdo, 0xc1, Bytes::new());
        assert!(dispatcher.dispatch(frame));
        assert!(live.try_recv().is_ok());
    }

    #[test]
    fn test_rpc_error_routes_to_request() {
        let dispatcher = ZnpDispatcher::default();
        let mut waiter = dispatcher.register(CommandType::Srsp, Subsystem::Af, 0x01);
        let error = ZnpFrame::new(
            CommandType::Srsp,
            Subsystem::RpcError,
            0x00,
            Bytes::from_static(&[0x02, 0x24, 0x01]),
        );

        assert!(dispatcher.dispatch(error));
        assert_eq!(waiter.try_recv().unwrap().subsystem, Subsystem::RpcError);
    }
}

//! Control channel between the control thread and the audio callback
//!
//! Bounded and non-blocking on both ends. When the queue is full the producer
//! coalesces settings: a pending `UpdateSettings` that a later `UpdateSettings`
//! or `Enable` supersedes is dropped. Lifecycle messages are never dropped; if
//! the queue is still full of them the send is refused. The consumer drains
//! the whole queue at the top of every callback.
//!
//! Engines that the callback replaces or destroys travel back to the control
//! side over a second bounded channel so their memory is released off the
//! real-time thread.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::dsp::engine::EngineAdapter;
use crate::dsp::gain::Settings;

/// Messages delivered to the audio callback
#[derive(Debug)]
pub enum ControlMessage {
    /// Start processing with the given settings; resets accumulators and priming
    Enable(Settings),
    /// Bypass the kernel; buffers are kept for a cheap resume
    Disable,
    /// Replace the settings snapshot
    UpdateSettings(Settings),
    /// Install an engine prepared off the real-time thread
    Init(EngineAdapter),
    /// Tear down the engine and return to the initializing phase
    Destroy,
}

impl ControlMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Enable(_) => "enable",
            ControlMessage::Disable => "disable",
            ControlMessage::UpdateSettings(_) => "update-settings",
            ControlMessage::Init(_) => "init",
            ControlMessage::Destroy => "destroy",
        }
    }
}

/// Create the control channel pair with room for `capacity` pending messages
pub fn control_channel(capacity: usize) -> (ControlSender, ControlReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let alive = Arc::new(AtomicBool::new(true));
    (
        ControlSender {
            tx,
            pending: rx.clone(),
            alive: Arc::clone(&alive),
            dropped: Arc::new(AtomicU64::new(0)),
        },
        ControlReceiver { rx, alive },
    )
}

/// Create the engine retirement channel
pub fn retire_channel(capacity: usize) -> (RetireSender, Receiver<EngineAdapter>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (RetireSender { tx }, rx)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queued after dropping superseded settings updates
    QueuedWithCoalescing,
    /// Every pending message is a lifecycle message; nothing was queued
    Full,
    /// The audio side is gone
    Disconnected,
}

/// Producer end (control thread)
pub struct ControlSender {
    tx: Sender<ControlMessage>,
    /// Receiver clone used only to compact the queue when it is full
    pending: Receiver<ControlMessage>,
    /// Cleared when the audio side drops its receiver
    alive: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl ControlSender {
    /// Enqueue without blocking.
    ///
    /// On a full queue the pending messages are taken out, superseded
    /// settings updates are dropped and the rest are re-queued in order ahead
    /// of `message`. Only this sender pushes, so the order the callback sees
    /// is unchanged.
    pub fn send(&self, message: ControlMessage) -> SendOutcome {
        if !self.alive.load(Ordering::Acquire) {
            return SendOutcome::Disconnected;
        }
        let message = match self.tx.try_send(message) {
            Ok(()) => return SendOutcome::Queued,
            Err(TrySendError::Disconnected(_)) => return SendOutcome::Disconnected,
            Err(TrySendError::Full(message)) => message,
        };

        let mut queued: Vec<ControlMessage> = self.pending.try_iter().collect();
        queued.push(message);
        let before = queued.len();
        let compacted = compact(queued);
        let removed = before - compacted.len();
        self.dropped.fetch_add(removed as u64, Ordering::Relaxed);

        let mut outcome = if removed > 0 {
            SendOutcome::QueuedWithCoalescing
        } else {
            SendOutcome::Queued
        };
        for pending in compacted {
            match self.tx.try_send(pending) {
                Ok(()) => {}
                // The incoming message is last, so only it can miss out
                Err(TrySendError::Full(_)) => outcome = SendOutcome::Full,
                Err(TrySendError::Disconnected(_)) => return SendOutcome::Disconnected,
            }
        }
        outcome
    }

    /// Settings updates dropped because a newer one replaced them
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Drop every settings update that a later update or enable replaces,
/// keeping the order of everything else
fn compact(messages: Vec<ControlMessage>) -> Vec<ControlMessage> {
    let mut kept: Vec<ControlMessage> = Vec::with_capacity(messages.len());
    let mut newer_settings = false;
    for message in messages.into_iter().rev() {
        let carries_settings = matches!(
            message,
            ControlMessage::UpdateSettings(_) | ControlMessage::Enable(_)
        );
        let superseded = newer_settings && matches!(message, ControlMessage::UpdateSettings(_));
        newer_settings |= carries_settings;
        if !superseded {
            kept.push(message);
        }
    }
    kept.reverse();
    kept
}

/// Consumer end (audio callback)
pub struct ControlReceiver {
    rx: Receiver<ControlMessage>,
    alive: Arc<AtomicBool>,
}

impl ControlReceiver {
    /// Next pending message, never blocks
    pub fn try_next(&self) -> Option<ControlMessage> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Drop for ControlReceiver {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Sends retired engines back to the control side
pub struct RetireSender {
    tx: Sender<EngineAdapter>,
}

impl RetireSender {
    /// Hand an engine back for off-thread release.
    ///
    /// If the control side is not collecting, the engine is released in place.
    pub fn retire(&self, engine: EngineAdapter) {
        if let Err(TrySendError::Full(engine) | TrySendError::Disconnected(engine)) =
            self.tx.try_send(engine)
        {
            drop(engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_arrive_in_order() {
        let (tx, rx) = control_channel(8);
        tx.send(ControlMessage::Disable);
        tx.send(ControlMessage::Enable(Settings::default()));
        assert_eq!(rx.try_next().map(|m| m.kind()), Some("disable"));
        assert_eq!(rx.try_next().map(|m| m.kind()), Some("enable"));
        assert!(rx.try_next().is_none());
    }

    fn settings(gain: f32) -> Settings {
        Settings {
            output_gain: gain,
            ..Settings::default()
        }
    }

    fn kinds(rx: &ControlReceiver) -> Vec<&'static str> {
        std::iter::from_fn(|| rx.try_next()).map(|m| m.kind()).collect()
    }

    #[test]
    fn test_full_queue_coalesces_settings() {
        let (tx, rx) = control_channel(2);
        assert_eq!(
            tx.send(ControlMessage::UpdateSettings(settings(1.0))),
            SendOutcome::Queued
        );
        tx.send(ControlMessage::UpdateSettings(settings(2.0)));
        assert_eq!(
            tx.send(ControlMessage::UpdateSettings(settings(3.0))),
            SendOutcome::QueuedWithCoalescing
        );
        assert_eq!(tx.dropped_count(), 2);

        let gains: Vec<f32> = std::iter::from_fn(|| rx.try_next())
            .filter_map(|m| match m {
                ControlMessage::UpdateSettings(s) => Some(s.output_gain),
                _ => None,
            })
            .collect();
        assert_eq!(gains, vec![3.0]);
    }

    #[test]
    fn test_lifecycle_messages_survive_settings_flood() {
        let (tx, rx) = control_channel(2);
        tx.send(ControlMessage::Init(EngineAdapter::uninitialized()));
        tx.send(ControlMessage::UpdateSettings(settings(1.0)));
        for gain in [1.5, 2.0, 2.5] {
            assert_ne!(
                tx.send(ControlMessage::UpdateSettings(settings(gain))),
                SendOutcome::Full
            );
        }
        assert_eq!(kinds(&rx), vec!["init", "update-settings"]);
    }

    #[test]
    fn test_enable_supersedes_earlier_settings_only() {
        let (tx, rx) = control_channel(3);
        tx.send(ControlMessage::UpdateSettings(settings(1.0)));
        tx.send(ControlMessage::Disable);
        tx.send(ControlMessage::UpdateSettings(settings(2.0)));
        assert_eq!(
            tx.send(ControlMessage::Enable(settings(2.0))),
            SendOutcome::QueuedWithCoalescing
        );
        assert_eq!(kinds(&rx), vec!["disable", "enable"]);
    }

    #[test]
    fn test_full_of_lifecycle_messages_refuses() {
        let (tx, rx) = control_channel(2);
        tx.send(ControlMessage::Disable);
        tx.send(ControlMessage::Enable(Settings::default()));
        assert_eq!(tx.send(ControlMessage::Destroy), SendOutcome::Full);
        assert_eq!(tx.dropped_count(), 0);
        // Nothing already queued was lost or reordered
        assert_eq!(kinds(&rx), vec!["disable", "enable"]);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = control_channel(2);
        assert_eq!(tx.send(ControlMessage::Disable), SendOutcome::Queued);
        drop(rx);
        assert_eq!(tx.send(ControlMessage::Disable), SendOutcome::Disconnected);
    }

    #[test]
    fn test_retired_engines_reach_control_side() {
        let (retire, collected) = retire_channel(1);
        retire.retire(EngineAdapter::uninitialized());
        // Full: released in place without blocking
        retire.retire(EngineAdapter::uninitialized());
        assert_eq!(collected.try_iter().count(), 1);
    }
}

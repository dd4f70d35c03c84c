//! Lock-free input channel from clients to the host
//!
//! Uses crossbeam-channel for lock-free MPSC communication from
//! client sessions to the host's fixed tick.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use hashbrown::HashMap;

use crate::game::constants::net::INPUT_BUFFER_SIZE;
use crate::game::state::ParticipantId;
use crate::net::transport::InputFrame;

/// Input of one participant for one of its ticks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputMessage {
    pub participant: ParticipantId,
    pub tick: u64,
    pub frame: InputFrame,
}

/// Lock-free input buffer using bounded channel
///
/// Every client holds a sender bound to its own participant id, and the
/// host drains all pending inputs at the start of each tick.
pub struct InputBuffer {
    sender: Sender<InputMessage>,
    receiver: Receiver<InputMessage>,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Sender that submits frames on behalf of `participant` only
    pub fn sender_for(&self, participant: ParticipantId) -> InputSender {
        InputSender {
            participant,
            sender: self.sender.clone(),
        }
    }

    /// Drain and keep only the newest frame per participant
    ///
    /// Frames from the same participant arrive in send order, so the last
    /// one wins unless it carries an older tick.
    pub fn drain_latest(&self) -> HashMap<ParticipantId, InputMessage> {
        let mut latest: HashMap<ParticipantId, InputMessage> = HashMap::new();
        for message in self.receiver.try_iter() {
            match latest.get(&message.participant) {
                Some(held) if held.tick > message.tick => {}
                _ => {
                    latest.insert(message.participant, message);
                }
            }
        }
        latest
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new(INPUT_BUFFER_SIZE)
    }
}

/// Clonable sender handle bound to one participant
#[derive(Clone)]
pub struct InputSender {
    participant: ParticipantId,
    sender: Sender<InputMessage>,
}

impl InputSender {
    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// Submit an input (non-blocking)
    #[inline]
    pub fn try_send(&self, tick: u64, frame: InputFrame) -> Result<(), InputBufferError> {
        self.sender
            .try_send(InputMessage {
                participant: self.participant,
                tick,
                frame,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => InputBufferError::Full,
                TrySendError::Disconnected(_) => InputBufferError::Disconnected,
            })
    }
}

/// Input buffer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputBufferError {
    /// Buffer is full (backpressure)
    #[error("input buffer is full")]
    Full,
    /// Host stopped draining
    #[error("input buffer disconnected")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec3::Vec3;
    use uuid::Uuid;

    fn frame(x: f32) -> InputFrame {
        InputFrame::new(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_input_buffer_submit_and_drain() {
        let buffer = InputBuffer::new(10);
        let participant = Uuid::new_v4();
        let sender = buffer.sender_for(participant);

        assert!(sender.try_send(1, frame(1.0)).is_ok());
        assert!(sender.try_send(2, frame(2.0)).is_ok());
        assert!(sender.try_send(3, frame(3.0)).is_ok());

        assert_eq!(buffer.pending_count(), 3);

        let latest = buffer.drain_latest();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[&participant].tick, 3);
        assert_eq!(latest[&participant].frame, frame(3.0));

        assert!(buffer.is_empty());
    }

    #[test]
    fn test_input_buffer_backpressure() {
        let buffer = InputBuffer::new(2);
        let sender = buffer.sender_for(Uuid::new_v4());

        assert!(sender.try_send(1, frame(1.0)).is_ok());
        assert!(sender.try_send(2, frame(1.0)).is_ok());
        assert_eq!(sender.try_send(3, frame(1.0)), Err(InputBufferError::Full));

        buffer.drain_latest();
        assert!(sender.try_send(3, frame(1.0)).is_ok());
    }

    #[test]
    fn test_input_sender_disconnected() {
        let buffer = InputBuffer::new(4);
        let sender = buffer.sender_for(Uuid::new_v4());
        drop(buffer);

        assert_eq!(sender.try_send(1, frame(0.0)), Err(InputBufferError::Disconnected));
    }

    #[test]
    fn test_sender_is_bound_to_participant() {
        let buffer = InputBuffer::new(8);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let sender_a = buffer.sender_for(a);
        let sender_b = buffer.sender_for(b);
        assert_eq!(sender_a.participant(), a);

        // A clone still speaks for the participant it was issued to
        sender_a.clone().try_send(1, frame(1.0)).unwrap();
        sender_b.try_send(1, frame(2.0)).unwrap();

        let latest = buffer.drain_latest();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&a].participant, a);
        assert_eq!(latest[&a].frame, frame(1.0));
        assert_eq!(latest[&b].frame, frame(2.0));
    }

    #[test]
    fn test_drain_latest_keeps_newest_per_participant() {
        let buffer = InputBuffer::new(16);
        let a = buffer.sender_for(Uuid::new_v4());
        let b = buffer.sender_for(Uuid::new_v4());

        a.try_send(1, frame(1.0)).unwrap();
        b.try_send(1, frame(5.0)).unwrap();
        a.try_send(2, frame(2.0)).unwrap();
        // Late frame from an older tick does not win
        a.try_send(1, frame(9.0)).unwrap();

        let latest = buffer.drain_latest();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&a.participant()].frame, frame(2.0));
        assert_eq!(latest[&b.participant()].frame, frame(5.0));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_input_buffer_default() {
        let buffer = InputBuffer::default();
        assert_eq!(buffer.capacity(), INPUT_BUFFER_SIZE);
    }
}

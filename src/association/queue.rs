use crate::error::Result;

use std::collections::VecDeque;

/// Invoked exactly once with the outcome of a write or an end request.
pub type Completion = Box<dyn FnOnce(Result<()>)>;

/// One SCTP user message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub payload: Vec<u8>,
    pub stream_id: u16,
    /// Payload protocol identifier, in host byte order.
    pub ppid: u32,
}

impl Message {
    /// Creates a message for stream 0 with ppid 0.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            stream_id: 0,
            ppid: 0,
        }
    }

    pub fn with_stream_id(mut self, stream_id: u16) -> Self {
        self.stream_id = stream_id;
        self
    }

    pub fn with_ppid(mut self, ppid: u32) -> Self {
        self.ppid = ppid;
        self
    }
}

pub(crate) struct PendingWrite {
    pub(crate) message: Message,
    pub(crate) completion: Completion,
}

/// FIFO of writes waiting for the socket.
///
/// The head is only removed once its send has succeeded, or when the whole
/// queue is failed.
#[derive(Default)]
pub(crate) struct WriteQueue {
    items: VecDeque<PendingWrite>,
}

impl WriteQueue {
    pub(crate) fn push(&mut self, message: Message, completion: Completion) {
        self.items.push_back(PendingWrite {
            message,
            completion,
        });
    }

    pub(crate) fn front(&self) -> Option<&PendingWrite> {
        self.items.front()
    }

    pub(crate) fn pop_front(&mut self) -> Option<PendingWrite> {
        self.items.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes every pending write, oldest first.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = PendingWrite> + '_ {
        self.items.drain(..)
    }
}

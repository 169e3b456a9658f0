//! FIFO queue of fully-decoded frames, buffered between the Codec (producer) and
//! the FileServer dispatcher (consumer).
//!
//! `pop` keeps the non-blocking, `Option`-returning contract a polling consumer
//! needs. `recv` is an addition for a consumer that would rather await a
//! `Notify` than spin: same queue, no extra lock.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

use crate::codec::MessageFrame;

#[derive(Debug, Default)]
pub struct Channel {
    queue: Mutex<VecDeque<MessageFrame>>,
    notify: Notify,
}

impl Channel {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Appends `frame` to the tail of the queue and wakes one waiting `recv`, if any.
    pub async fn push(&self, frame: MessageFrame) {
        self.queue.lock().await.push_back(frame);
        self.notify.notify_one();
    }

    /// Removes and returns the head of the queue, or `None` if empty. Non-blocking.
    pub async fn pop(&self) -> Option<MessageFrame> {
        self.queue.lock().await.pop_front()
    }

    /// Awaits the next frame, blocking the caller's task (not the thread) until one
    /// is available, instead of polling `pop` in a loop.
    pub async fn recv(&self) -> MessageFrame {
        loop {
            if let Some(frame) = self.pop().await {
                return frame;
            }
            self.notify.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MessageType;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame(source_id: u32) -> MessageFrame {
        MessageFrame {
            iv: [0u8; 16],
            message_type: MessageType::StoreFile,
            source_id,
            filename_length: 0,
            payload: Vec::new(),
        }
    }

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let channel = Channel::new();
        channel.push(frame(1)).await;
        channel.push(frame(2)).await;
        channel.push(frame(3)).await;

        assert_eq!(channel.pop().await.unwrap().source_id, 1);
        assert_eq!(channel.pop().await.unwrap().source_id, 2);
        assert_eq!(channel.pop().await.unwrap().source_id, 3);
        assert!(channel.pop().await.is_none());
    }

    #[tokio::test]
    async fn pop_on_empty_queue_is_none() {
        let channel = Channel::new();
        assert!(channel.pop().await.is_none());
        assert!(channel.is_empty().await);
    }

    #[tokio::test]
    async fn recv_wakes_on_push_from_another_task() {
        let channel = Arc::new(Channel::new());
        let consumer = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.recv().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.push(frame(42)).await;

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.source_id, 42);
    }

    #[tokio::test]
    async fn len_reflects_queue_size() {
        let channel = Channel::new();
        assert_eq!(channel.len().await, 0);
        channel.push(frame(1)).await;
        channel.push(frame(2)).await;
        assert_eq!(channel.len().await, 2);
    }
}

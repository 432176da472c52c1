//! Bounded, drop-oldest-non-terminal subscriber queue used to fan out job
//! progress frames to SSE listeners (spec §4.8). Each subscriber gets its
//! own queue so a slow reader never blocks the job or other subscribers;
//! when a queue is full, the oldest non-terminal frame is dropped to make
//! room. Terminal frames are never dropped and are always followed by a
//! sentinel that tells the reader the stream is closed.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use super::types::{JobStatus, Progress};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct Frame {
    pub status: JobStatus,
    pub progress: Option<Progress>,
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl Frame {
    pub fn terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug)]
enum Item {
    Frame(Frame),
    Closed,
}

struct Inner {
    queue: VecDeque<Item>,
    capacity: usize,
}

pub struct Subscription {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Subscription {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                capacity,
            }),
            notify: Notify::new(),
        }
    }

    /// Push a frame, dropping the oldest non-terminal queued frame first if
    /// the queue is already at capacity. A terminal frame is always
    /// followed by a close sentinel.
    pub fn push(&self, frame: Frame) {
        let terminal = frame.terminal();
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.queue.len() >= inner.capacity {
                let oldest_non_terminal = inner.queue.iter().position(|item| {
                    matches!(item, Item::Frame(f) if !f.terminal())
                });
                if let Some(idx) = oldest_non_terminal {
                    inner.queue.remove(idx);
                }
            }
            inner.queue.push_back(Item::Frame(frame));
            if terminal {
                inner.queue.push_back(Item::Closed);
            }
        }
        self.notify.notify_one();
    }

    /// Await the next frame. Returns `None` once the close sentinel has
    /// been consumed — the subscription is exhausted and should be dropped.
    pub async fn recv(&self) -> Option<Frame> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                match inner.queue.pop_front() {
                    Some(Item::Frame(frame)) => return Some(frame),
                    Some(Item::Closed) => return None,
                    None => {}
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(status: JobStatus) -> Frame {
        Frame {
            status,
            progress: None,
            message: None,
            data: None,
        }
    }

    #[tokio::test]
    async fn delivers_frames_in_order() {
        let sub = Subscription::new(4);
        sub.push(frame(JobStatus::Running));
        sub.push(frame(JobStatus::Running));
        assert_eq!(sub.recv().await.unwrap().status, JobStatus::Running);
        assert_eq!(sub.recv().await.unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn terminal_frame_is_followed_by_close_sentinel() {
        let sub = Subscription::new(4);
        sub.push(frame(JobStatus::Completed));
        assert_eq!(sub.recv().await.unwrap().status, JobStatus::Completed);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn full_queue_drops_oldest_non_terminal_frame() {
        let sub = Subscription::new(2);
        sub.push(frame(JobStatus::Running)); // will be dropped
        sub.push(frame(JobStatus::Running));
        sub.push(frame(JobStatus::Completed));
        // capacity 2: pushing the 3rd frame evicts the oldest running frame,
        // leaving [running#2, completed, closed-sentinel].
        assert_eq!(sub.recv().await.unwrap().status, JobStatus::Running);
        assert_eq!(sub.recv().await.unwrap().status, JobStatus::Completed);
        assert!(sub.recv().await.is_none());
    }
}

//! Event bus - unbounded multi-producer / single-consumer queue
//!
//! Workers publish through cloned [`EventSender`]s; the one consumer owns the
//! [`EventDrain`] and either polls it every [`POLL_INTERVAL`] or awaits
//! [`EventDrain::recv`]. Publishing never blocks and nothing is dropped.

use super::event::Event;
use std::time::Duration;
use tokio::sync::mpsc;

/// How often an interactive consumer should drain the bus
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Producer side
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

/// Consumer side
#[derive(Debug)]
pub struct EventDrain {
    rx: mpsc::UnboundedReceiver<Event>,
}

pub struct EventBus;

impl EventBus {
    pub fn channel() -> (EventSender, EventDrain) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSender { tx }, EventDrain { rx })
    }
}

impl EventSender {
    pub fn publish(&self, event: Event) {
        if self.tx.send(event).is_err() {
            log::debug!("Event dropped: consumer is gone");
        }
    }
}

impl EventDrain {
    /// Everything pending right now, oldest first. Never blocks.
    pub fn drain_all(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event. `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::TaskId;

    #[test]
    fn test_drain_empty() {
        let (_tx, mut rx) = EventBus::channel();
        assert!(rx.drain_all().is_empty());
    }

    #[test]
    fn test_fifo_per_producer() {
        let (tx, mut rx) = EventBus::channel();
        let a = TaskId::new();
        let b = TaskId::new();

        let tx_b = tx.clone();
        for i in 0..5 {
            tx.publish(Event::log(a, format!("a{i}")));
            tx_b.publish(Event::log(b, format!("b{i}")));
        }

        let events = rx.drain_all();
        assert_eq!(events.len(), 10);

        let seq = |id: TaskId| -> Vec<String> {
            events
                .iter()
                .filter(|e| e.task_id == id)
                .filter_map(|e| e.payload.as_text().map(str::to_string))
                .collect()
        };
        assert_eq!(seq(a), vec!["a0", "a1", "a2", "a3", "a4"]);
        assert_eq!(seq(b), vec!["b0", "b1", "b2", "b3", "b4"]);

        assert!(rx.drain_all().is_empty());
    }

    #[test]
    fn test_concurrent_producers() {
        let (tx, mut rx) = EventBus::channel();
        let ids: Vec<TaskId> = (0..8).map(|_| TaskId::new()).collect();

        let threads: Vec<_> = ids
            .iter()
            .map(|&id| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        tx.publish(Event::log(id, i.to_string()));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let events = rx.drain_all();
        assert_eq!(events.len(), 8 * 200);
        for id in ids {
            let seq: Vec<usize> = events
                .iter()
                .filter(|e| e.task_id == id)
                .map(|e| e.payload.as_text().unwrap().parse().unwrap())
                .collect();
            assert_eq!(seq, (0..200).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_publish_after_consumer_dropped() {
        let (tx, rx) = EventBus::channel();
        drop(rx);
        tx.publish(Event::log(TaskId::new(), "nobody listening"));
    }

    #[tokio::test]
    async fn test_recv_ends_when_senders_gone() {
        let (tx, mut rx) = EventBus::channel();
        let id = TaskId::new();
        tx.publish(Event::status(id, "one"));
        drop(tx);

        assert_eq!(rx.recv().await.map(|e| e.task_id), Some(id));
        assert!(rx.recv().await.is_none());
    }
}

//! Event queues between control threads and the audio thread.
//!
//! Both modes are lossless: a full single-producer ring spills into an unbounded
//! overflow list owned by the producer, and the multi-producer queue is unbounded.
//! The consumer side never blocks.

use std::collections::VecDeque;

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Default ring capacity for single-producer queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Producer topology of an [`EventQueue`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// One producing thread; bounded ring buffer with an overflow list.
    SingleProducer,
    /// Any number of producing threads; segmented lock-free queue.
    #[default]
    MultiProducer,
}

struct SpillingProducer {
    producer: HeapProd<Event>,
    spill: VecDeque<Event>,
}

impl SpillingProducer {
    fn push(&mut self, event: Event) {
        while let Some(front) = self.spill.pop_front() {
            if let Err(front) = self.producer.try_push(front) {
                self.spill.push_front(front);
                break;
            }
        }
        if !self.spill.is_empty() {
            self.spill.push_back(event);
        } else if let Err(event) = self.producer.try_push(event) {
            self.spill.push_back(event);
        }
    }
}

enum Inner {
    Single {
        producer: Mutex<SpillingProducer>,
        consumer: Mutex<HeapCons<Event>>,
    },
    Multi(SegQueue<Event>),
}

/// Lossless FIFO of events.
pub struct EventQueue {
    inner: Inner,
}

impl EventQueue {
    pub fn new(mode: QueueMode, capacity: usize) -> Self {
        let inner = match mode {
            QueueMode::SingleProducer => {
                let (producer, consumer) = HeapRb::new(capacity.max(1)).split();
                Inner::Single {
                    producer: Mutex::new(SpillingProducer {
                        producer,
                        spill: VecDeque::new(),
                    }),
                    consumer: Mutex::new(consumer),
                }
            }
            QueueMode::MultiProducer => Inner::Multi(SegQueue::new()),
        };
        Self { inner }
    }

    pub fn mode(&self) -> QueueMode {
        match self.inner {
            Inner::Single { .. } => QueueMode::SingleProducer,
            Inner::Multi(_) => QueueMode::MultiProducer,
        }
    }

    /// Enqueue from a control thread. Never drops.
    pub fn push(&self, event: Event) {
        match &self.inner {
            Inner::Single { producer, .. } => producer.lock().push(event),
            Inner::Multi(queue) => queue.push(event),
        }
    }

    /// Dequeue without blocking. Returns `None` when empty or when another consumer
    /// holds the queue.
    pub fn try_pop(&self) -> Option<Event> {
        match &self.inner {
            Inner::Single { producer, consumer } => {
                let mut consumer = consumer.try_lock()?;
                if let Some(event) = consumer.try_pop() {
                    return Some(event);
                }
                // A push may have moved spilled events into the ring since the check above.
                // With the producer locked the ring can only be refilled by us, so once it is
                // empty again the spill front is the oldest event left.
                let mut producer = producer.try_lock()?;
                consumer.try_pop().or_else(|| producer.spill.pop_front())
            }
            Inner::Multi(queue) => queue.pop(),
        }
    }

    /// Pop everything currently available, oldest first.
    pub fn drain(&self, mut f: impl FnMut(Event)) -> usize {
        let mut count = 0;
        while let Some(event) = self.try_pop() {
            f(event);
            count += 1;
        }
        count
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue").field("mode", &self.mode()).finish()
    }
}

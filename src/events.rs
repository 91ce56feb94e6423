use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;

use crate::models::Tick;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Degrade { element: String, severity: u8 },
    Recover { element: String },
    TrafficSpike { link: String, magnitude: f64 },
    /// Hard failure: the target drops straight to Down.
    Fail { element: String },
    Custom { payload: String },
}

impl EventKind {
    pub fn target(&self) -> Option<&str> {
        match self {
            EventKind::Degrade { element, .. }
            | EventKind::Recover { element }
            | EventKind::Fail { element } => Some(element),
            EventKind::TrafficSpike { link, .. } => Some(link),
            EventKind::Custom { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Degrade { .. } => "degrade",
            EventKind::Recover { .. } => "recover",
            EventKind::TrafficSpike { .. } => "traffic-spike",
            EventKind::Fail { .. } => "fail",
            EventKind::Custom { .. } => "custom",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Degrade { element, severity } => {
                write!(f, "degrade({}, severity={})", element, severity)
            }
            EventKind::Recover { element } => write!(f, "recover({})", element),
            EventKind::TrafficSpike { link, magnitude } => {
                write!(f, "traffic-spike({}, magnitude={})", link, magnitude)
            }
            EventKind::Fail { element } => write!(f, "fail({})", element),
            EventKind::Custom { payload } => write!(f, "custom({})", payload),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScheduledEvent {
    pub tick: Tick,
    pub seq: u64,
    pub event: EventKind,
}

impl ScheduledEvent {
    pub fn new(tick: Tick, seq: u64, event: EventKind) -> Self {
        Self { tick, seq, event }
    }
}

impl Eq for ScheduledEvent {}

// Sequence numbers are unique per queue, so (tick, seq) is a total order.
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tick
            .cmp(&other.tick)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-queue of scheduled events that owns sequence allocation.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<ScheduledEvent>>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, tick: Tick, event: EventKind) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(ScheduledEvent::new(tick, seq, event)));
        seq
    }

    /// Pops the next event due at or before `now`.
    pub fn pop_due(&mut self, now: Tick) -> Option<ScheduledEvent> {
        match self.heap.peek() {
            Some(Reverse(next)) if next.tick <= now => self.heap.pop().map(|Reverse(event)| event),
            _ => None,
        }
    }

    pub fn peek_tick(&self) -> Option<Tick> {
        self.heap.peek().map(|Reverse(event)| event.tick)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recover(element: &str) -> EventKind {
        EventKind::Recover {
            element: element.to_string(),
        }
    }

    #[test]
    fn same_tick_events_pop_in_sequence_order() {
        let mut queue = EventQueue::new();
        queue.schedule(3, recover("b"));
        queue.schedule(3, recover("a"));
        queue.schedule(1, recover("c"));

        let popped: Vec<(Tick, u64)> = std::iter::from_fn(|| queue.pop_due(3))
            .map(|event| (event.tick, event.seq))
            .collect();
        assert_eq!(popped, vec![(1, 2), (3, 0), (3, 1)]);
    }

    #[test]
    fn pop_due_leaves_future_events_queued() {
        let mut queue = EventQueue::new();
        queue.schedule(5, recover("a"));
        assert!(queue.pop_due(4).is_none());
        assert_eq!(queue.peek_tick(), Some(5));
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_due(5).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn event_targets_and_labels() {
        let spike = EventKind::TrafficSpike {
            link: "L1".to_string(),
            magnitude: 40.0,
        };
        assert_eq!(spike.target(), Some("L1"));
        assert_eq!(spike.label(), "traffic-spike");
        let custom = EventKind::Custom {
            payload: "maintenance window".to_string(),
        };
        assert_eq!(custom.target(), None);
        assert_eq!(custom.to_string(), "custom(maintenance window)");
    }
}

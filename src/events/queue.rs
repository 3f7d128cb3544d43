//! Frame-ordered event queue
//!
//! Events are kept sorted by `execute_frame` (stable for equal frames) and
//! are only flagged when processed, never removed implicitly. Processed
//! events stay visible until `clear`, `restore`, or snapshot rotation, and
//! do not count against the capacity.

use ahash::AHashMap;
use std::collections::BTreeMap;

use crate::core::config::{OverflowPolicy, QueueConfig};
use crate::core::error::{Result, SimError};
use crate::core::types::{EventId, Frame};
use crate::events::types::QueueEvent;

pub struct EventQueue {
    events: Vec<QueueEvent>,
    /// id -> execute frame, to find events without a full scan
    index: AHashMap<EventId, Frame>,
    snapshots: BTreeMap<Frame, Vec<QueueEvent>>,
    capacity: usize,
    max_snapshots: usize,
    overflow: OverflowPolicy,
    dropped: u64,
    /// Unprocessed events; the capacity bound applies to these
    pending: usize,
}

impl EventQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            events: Vec::new(),
            index: AHashMap::new(),
            snapshots: BTreeMap::new(),
            capacity: config.capacity,
            max_snapshots: config.max_snapshots,
            overflow: config.overflow,
            dropped: 0,
            pending: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(&QueueConfig {
            capacity,
            ..Default::default()
        })
    }

    /// Insert keeping ascending `execute_frame`; false if rejected
    pub fn insert(&mut self, event: QueueEvent) -> bool {
        match self.try_insert(event) {
            Ok(()) => true,
            Err(SimError::QueueOverflow { capacity }) => {
                match self.overflow {
                    OverflowPolicy::DropNewest => {
                        tracing::warn!("Event queue full ({}), dropping newest event", capacity)
                    }
                    OverflowPolicy::RejectWithError => {
                        tracing::error!("Event queue full ({}), insert rejected", capacity)
                    }
                }
                false
            }
            Err(e) => {
                tracing::warn!("Event rejected: {}", e);
                false
            }
        }
    }

    /// Insert, surfacing the rejection reason
    pub fn try_insert(&mut self, event: QueueEvent) -> Result<()> {
        if event.execute_frame < event.insert_frame {
            return Err(SimError::Validation(format!(
                "event {} executes at {} before its insert frame {}",
                event.id, event.execute_frame, event.insert_frame
            )));
        }
        if self.index.contains_key(&event.id) {
            return Err(SimError::Validation(format!("duplicate event id {}", event.id)));
        }
        if self.pending >= self.capacity {
            self.dropped += 1;
            return Err(SimError::QueueOverflow {
                capacity: self.capacity,
            });
        }

        let pos = self
            .events
            .partition_point(|e| e.execute_frame <= event.execute_frame);
        self.index.insert(event.id, event.execute_frame);
        if !event.processed {
            self.pending += 1;
        }
        self.events.insert(pos, event);
        Ok(())
    }

    /// Overflow policy configured for this queue
    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    fn frame_range(&self, frame: Frame) -> std::ops::Range<usize> {
        let start = self.events.partition_point(|e| e.execute_frame < frame);
        let end = self.events.partition_point(|e| e.execute_frame <= frame);
        start..end
    }

    fn position(&self, id: EventId) -> Option<usize> {
        let frame = *self.index.get(&id)?;
        let range = self.frame_range(frame);
        let start = range.start;
        self.events[range].iter().position(|e| e.id == id).map(|i| start + i)
    }

    /// All events scheduled for `frame`, processed or not
    pub fn get_by_frame(&self, frame: Frame) -> Vec<&QueueEvent> {
        self.events[self.frame_range(frame)].iter().collect()
    }

    /// Ids of unprocessed events at `frame`, in queue order
    pub fn pending_for(&self, frame: Frame) -> Vec<EventId> {
        self.events[self.frame_range(frame)]
            .iter()
            .filter(|e| !e.processed)
            .map(|e| e.id)
            .collect()
    }

    pub fn has_pending(&self, frame: Frame) -> bool {
        self.events[self.frame_range(frame)].iter().any(|e| !e.processed)
    }

    pub fn get(&self, id: EventId) -> Option<&QueueEvent> {
        self.position(id).map(|i| &self.events[i])
    }

    /// Flag an event as processed; true only on the first call
    pub fn mark_as_processed(&mut self, id: EventId) -> bool {
        match self.position(id) {
            Some(i) if !self.events[i].processed => {
                self.events[i].processed = true;
                self.pending -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, id: EventId) -> Option<QueueEvent> {
        let pos = self.position(id)?;
        self.index.remove(&id);
        let event = self.events.remove(pos);
        if !event.processed {
            self.pending -= 1;
        }
        Some(event)
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.index.clear();
        self.snapshots.clear();
        self.pending = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending
    }

    /// Events dropped because the queue was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Store a point-in-time copy keyed by `frame`
    pub fn snapshot(&mut self, frame: Frame) {
        self.snapshots.insert(frame, self.events.clone());
        while self.snapshots.len() > self.max_snapshots.max(1) {
            self.snapshots.pop_first();
        }
        if let Some((&oldest, _)) = self.snapshots.first_key_value() {
            let before = self.events.len();
            self.events
                .retain(|e| !(e.processed && e.execute_frame < oldest));
            if self.events.len() != before {
                self.rebuild_index();
                tracing::debug!(
                    "Pruned {} processed events older than frame {}",
                    before - self.events.len(),
                    oldest
                );
            }
        }
    }

    /// Roll the queue back to the copy taken at `frame`; later copies are discarded
    pub fn restore(&mut self, frame: Frame) -> bool {
        let Some(events) = self.snapshots.get(&frame).cloned() else {
            return false;
        };
        self.events = events;
        self.snapshots.retain(|f, _| *f <= frame);
        self.rebuild_index();
        true
    }

    pub fn snapshot_frames(&self) -> Vec<Frame> {
        self.snapshots.keys().copied().collect()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .events
            .iter()
            .map(|e| (e.id, e.execute_frame))
            .collect();
        self.pending = self.events.iter().filter(|e| !e.processed).count();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(&QueueConfig::default())
    }
}

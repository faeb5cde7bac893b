//! Bounded buffer of accepted records awaiting the next flush.

use thiserror::Error;

use crate::EventRecord;

/// Default upper bound on pending records.
pub const DEFAULT_BATCH_CAPACITY: usize = 1000;

/// [`BatchBuffer::append`] refused a record because the buffer is at
/// capacity.
///
/// The rejected record is handed back so the caller can flush and retry;
/// nothing is dropped.
#[derive(Debug, Error)]
#[error("batch buffer is full ({capacity} records pending)")]
pub struct BufferFull {
    /// The record that did not fit.
    pub record: Box<EventRecord>,
    /// The configured capacity.
    pub capacity: usize,
}

/// Arrival-ordered buffer of records accepted by the interest filter.
///
/// Grows between flush points and is emptied in one step by
/// [`drain`](Self::drain). Single-owner: the listener loop is the only
/// caller, so no locking is involved.
#[derive(Debug)]
pub struct BatchBuffer {
    pending: Vec<EventRecord>,
    capacity: usize,
}

impl BatchBuffer {
    /// Creates an empty buffer holding at most `capacity` records.
    ///
    /// A capacity of zero is raised to one so a single event can always be
    /// buffered.
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends `record` at the tail.
    pub fn append(&mut self, record: EventRecord) -> Result<(), BufferFull> {
        if self.pending.len() >= self.capacity {
            return Err(BufferFull {
                record: Box::new(record),
                capacity: self.capacity,
            });
        }
        self.pending.push(record);
        Ok(())
    }

    /// Removes and returns every pending record in arrival order.
    pub fn drain(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.pending)
    }

    /// The pending records, oldest first.
    pub fn pending(&self) -> &[EventRecord] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BatchBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_event_record, Timestamp};

    fn record(process: &str) -> EventRecord {
        let payload = format!("processname:{process} groupname:g from_state:RUNNING");
        parse_event_record("PROCESS_STATE_EXITED", payload.as_bytes(), Timestamp::now()).unwrap()
    }

    fn names(records: &[EventRecord]) -> Vec<&str> {
        records.iter().map(|r| r.process_name().as_str()).collect()
    }

    #[test]
    fn drain_returns_records_in_arrival_order() {
        let mut buffer = BatchBuffer::default();
        for p in ["a", "b", "c"] {
            buffer.append(record(p)).unwrap();
        }
        assert_eq!(names(&buffer.drain()), ["a", "b", "c"]);
    }

    #[test]
    fn second_drain_is_empty() {
        let mut buffer = BatchBuffer::default();
        buffer.append(record("a")).unwrap();
        assert_eq!(buffer.drain().len(), 1);
        assert!(buffer.drain().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn append_past_capacity_hands_record_back() {
        let mut buffer = BatchBuffer::new(2);
        buffer.append(record("a")).unwrap();
        buffer.append(record("b")).unwrap();

        let err = buffer.append(record("c")).unwrap_err();
        assert_eq!(err.capacity, 2);
        assert_eq!(err.record.process_name().as_str(), "c");
        assert_eq!(names(buffer.pending()), ["a", "b"]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut buffer = BatchBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.append(record("a")).unwrap();
        assert!(buffer.append(record("b")).is_err());
    }
}

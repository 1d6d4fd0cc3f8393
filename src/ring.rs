use crate::errors::{MetricsError, Result};

/// Fixed-capacity history of one quantity, owned by a base metric.
///
/// Written only by the collect phase of a tick; readers must hold at least
/// the engine's shared lock.
#[derive(Debug, Clone)]
pub struct SubMetric {
    name: String,
    description: &'static str,
    slots: Vec<u32>,
    cursor: usize,
    wrapped: bool,
    sequence: u32,
}

impl SubMetric {
    pub fn new(name: impl Into<String>, description: &'static str) -> Self {
        Self {
            name: name.into(),
            description,
            slots: Vec::new(),
            cursor: 0,
            wrapped: false,
            sequence: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Re-provision with `length` slots, dropping any history.
    pub fn init(&mut self, length: usize) {
        self.slots.clear();
        self.slots.resize(length, 0);
        self.cursor = 0;
        self.wrapped = false;
        self.sequence = 0;
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of populated samples, bounded by capacity.
    pub fn length(&self) -> usize {
        if self.wrapped {
            self.slots.len()
        } else {
            self.cursor
        }
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Store one sample. A zero-capacity buffer accepts nothing.
    pub fn put(&mut self, value: u32) {
        if self.slots.is_empty() {
            return;
        }
        self.slots[self.cursor] = value;
        self.cursor += 1;
        if self.cursor == self.slots.len() {
            self.cursor = 0;
            self.wrapped = true;
        }
        self.sequence = self.sequence.wrapping_add(1);
    }

    /// Copy the current samples oldest-first into `out`, returning the count.
    pub fn copy_to(&self, out: &mut [u32]) -> Result<usize> {
        let len = self.length();
        if out.len() < len {
            return Err(MetricsError::PreconditionViolation(format!(
                "{}: output holds {} slots, {} needed",
                self.name,
                out.len(),
                len
            )));
        }
        if self.wrapped {
            let tail = self.slots.len() - self.cursor;
            out[..tail].copy_from_slice(&self.slots[self.cursor..]);
            out[tail..len].copy_from_slice(&self.slots[..self.cursor]);
        } else {
            out[..len].copy_from_slice(&self.slots[..len]);
        }
        Ok(len)
    }

    /// Most recent sample, if any.
    pub fn last(&self) -> Option<u32> {
        match self.length() {
            0 => None,
            _ => {
                let idx = if self.cursor == 0 {
                    self.slots.len() - 1
                } else {
                    self.cursor - 1
                };
                Some(self.slots[idx])
            }
        }
    }
}

/// Clamp a wide platform counter into a sample slot.
pub fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

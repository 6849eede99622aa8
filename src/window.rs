use std::collections::VecDeque;

use tracing::debug;

use crate::column::{Column, ColumnStats};

/// Columns of a session addressed by absolute index. With a capacity, the
/// oldest columns are evicted once it is exceeded; their statistics are kept.
#[derive(Debug, Clone, Default)]
pub struct ColumnWindow {
    columns: VecDeque<Column>,
    capacity: Option<usize>,
    evicted: Vec<ColumnStats>,
}

impl ColumnWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            columns: VecDeque::with_capacity(capacity + 1),
            capacity: Some(capacity.max(1)),
            evicted: Vec::new(),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Total columns ever pushed, evicted included.
    pub fn total_len(&self) -> usize {
        self.evicted.len() + self.columns.len()
    }

    pub fn evicted_count(&self) -> usize {
        self.evicted.len()
    }

    pub fn push(&mut self, column: Column) {
        self.columns.push_back(column);
        if let Some(capacity) = self.capacity {
            while self.columns.len() > capacity {
                if let Some(oldest) = self.columns.pop_front() {
                    debug!(index = self.evicted.len(), "evicting oldest column");
                    self.evicted.push(*oldest.stats());
                }
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&Column> {
        index
            .checked_sub(self.evicted.len())
            .and_then(|i| self.columns.get(i))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Column> {
        let i = index.checked_sub(self.evicted.len())?;
        self.columns.get_mut(i)
    }

    /// Columns still held, oldest first, with their absolute index.
    pub fn visible(&self) -> impl Iterator<Item = (usize, &Column)> + '_ {
        let offset = self.evicted.len();
        self.columns
            .iter()
            .enumerate()
            .map(move |(i, c)| (offset + i, c))
    }

    /// Statistics of every column ever pushed, in presentation order.
    pub fn stats(&self) -> Vec<ColumnStats> {
        self.evicted
            .iter()
            .copied()
            .chain(self.columns.iter().map(|c| *c.stats()))
            .collect()
    }
}

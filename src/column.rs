use rand::Rng;
use serde::{Deserialize, Serialize};

/// A digit position in a column, possibly answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnsweredDigit {
    pub value: u8,
    pub user_answer: Option<u8>,
    pub is_correct: Option<bool>,
}

impl AnsweredDigit {
    pub fn new(value: u8) -> Self {
        Self {
            value,
            user_answer: None,
            is_correct: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.user_answer.is_some()
    }
}

/// Per-column statistics. Frozen once `completed` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub completed: bool,
    pub answers_given: u32,
    pub correct_count: u32,
    pub time_spent_seconds: u32,
}

impl ColumnStats {
    pub fn accuracy(&self) -> f64 {
        if self.answers_given == 0 {
            0.0
        } else {
            self.correct_count as f64 / self.answers_given as f64
        }
    }

    /// Counts toward scoring: sealed, or touched before the session ended.
    pub fn is_scored(&self) -> bool {
        self.completed || self.answers_given > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    digits: Vec<AnsweredDigit>,
    stats: ColumnStats,
}

impl Column {
    pub fn from_values(values: &[u8]) -> Self {
        Self {
            digits: values.iter().copied().map(AnsweredDigit::new).collect(),
            stats: ColumnStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn digits(&self) -> &[AnsweredDigit] {
        &self.digits
    }

    pub fn values(&self) -> Vec<u8> {
        self.digits.iter().map(|d| d.value).collect()
    }

    pub fn stats(&self) -> &ColumnStats {
        &self.stats
    }

    pub fn is_completed(&self) -> bool {
        self.stats.completed
    }

    /// Records an answer at `position`. Returns false, changing nothing, when the
    /// column is sealed, the position is out of range or already answered.
    pub(crate) fn record(&mut self, position: usize, answer: u8, correct: bool) -> bool {
        if self.stats.completed {
            return false;
        }
        match self.digits.get_mut(position) {
            Some(digit) if !digit.is_answered() => {
                digit.user_answer = Some(answer);
                digit.is_correct = Some(correct);
                self.stats.answers_given += 1;
                if correct {
                    self.stats.correct_count += 1;
                }
                true
            }
            _ => false,
        }
    }

    /// Marks the column complete. A second seal is ignored so the time spent
    /// is written exactly once.
    pub(crate) fn seal(&mut self, time_spent_seconds: u32) -> bool {
        if self.stats.completed {
            return false;
        }
        self.stats.completed = true;
        self.stats.time_spent_seconds = time_spent_seconds;
        true
    }
}

/// Produces columns of uniformly random digits in 1..=9 from an injected rng.
#[derive(Debug, Clone)]
pub struct ColumnGenerator<R: Rng> {
    rng: R,
}

impl<R: Rng> ColumnGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn generate_column(&mut self, length: usize) -> Column {
        let values: Vec<u8> = (0..length).map(|_| self.rng.gen_range(1..=9)).collect();
        Column::from_values(&values)
    }

    pub fn generate_columns(&mut self, count: usize, length: usize) -> Vec<Column> {
        (0..count).map(|_| self.generate_column(length)).collect()
    }
}

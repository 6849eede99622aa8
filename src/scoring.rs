use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Rule deciding the expected answer at a position of a column.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringMode {
    /// Last digit of `digit[i] + digit[i + 1]`; the final position answers its own digit.
    #[default]
    AdjacentPairSum,
    /// The whole column is one row; its single answer is the last digit of the row sum.
    IndependentRowSum,
}

impl ScoringMode {
    /// Number of answers a column of `column_len` digits takes.
    pub fn positions(&self, column_len: usize) -> usize {
        match self {
            ScoringMode::AdjacentPairSum => column_len,
            ScoringMode::IndependentRowSum => column_len.min(1),
        }
    }

    /// None when `position` is not answerable under this rule.
    pub fn expected_answer(&self, values: &[u8], position: usize) -> Option<u8> {
        if position >= self.positions(values.len()) {
            return None;
        }
        match self {
            ScoringMode::AdjacentPairSum => {
                let current = values[position];
                Some(match values.get(position + 1) {
                    Some(&next) => ((current as u16 + next as u16) % 10) as u8,
                    None => current % 10,
                })
            }
            ScoringMode::IndependentRowSum => {
                let sum: u32 = values.iter().map(|&v| v as u32).sum();
                Some((sum % 10) as u8)
            }
        }
    }
}

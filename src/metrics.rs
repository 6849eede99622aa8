use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::column::ColumnStats;
use crate::session::{Session, Section, TimeBudget};
use crate::util::{clamp_index, mean, std_dev};

pub const MIN_INDEX: f64 = 1.0;
pub const MAX_INDEX: f64 = 5.0;
pub const DEFAULT_CONSISTENCY: f64 = 5.0;
pub const DEFAULT_ENDURANCE: f64 = 3.0;
/// Answers per minute worth one speed point; 100/min saturates the scale.
pub const ANSWERS_PER_SPEED_POINT: f64 = 20.0;
const MIN_FIRST_HALF_ACCURACY: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub answers: u32,
    pub correct: u32,
    pub accuracy: f64,
}

impl From<&ColumnStats> for ColumnSummary {
    fn from(stats: &ColumnStats) -> Self {
        Self {
            answers: stats.answers_given,
            correct: stats.correct_count,
            accuracy: stats.accuracy(),
        }
    }
}

/// Final scores of a test. Serialises to the stored-result shape
/// `{ totalAnswers, correctAnswers, accuracy, speed, consistency, endurance, columns }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub total_answers: u32,
    pub correct_answers: u32,
    /// Fraction in [0, 1].
    pub accuracy: f64,
    pub speed: f64,
    pub consistency: f64,
    pub endurance: f64,
    pub columns: Vec<ColumnSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<Section>,
}

/// Which blocks consistency and endurance are measured over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsBasis {
    Columns,
    Sections,
}

pub fn compute_result<R: Rng>(session: &Session<R>) -> TestResult {
    let scored = session
        .column_stats()
        .into_iter()
        .filter(ColumnStats::is_scored)
        .collect_vec();
    let basis = match session.config().budget {
        TimeBudget::PerColumn { .. } => MetricsBasis::Columns,
        TimeBudget::Total { .. } => MetricsBasis::Sections,
    };

    score(
        &scored,
        session.sections(),
        session.total_answers(),
        session.total_correct(),
        session.config().duration_minutes,
        basis,
    )
}

pub fn score(
    columns: &[ColumnStats],
    sections: &[Section],
    total_answers: u32,
    total_correct: u32,
    duration_minutes: f64,
    basis: MetricsBasis,
) -> TestResult {
    let accuracy = if total_answers == 0 {
        0.0
    } else {
        total_correct as f64 / total_answers as f64
    };

    let block_accuracies = match basis {
        MetricsBasis::Columns => columns.iter().map(ColumnStats::accuracy).collect_vec(),
        MetricsBasis::Sections => sections.iter().map(section_accuracy).collect_vec(),
    };

    TestResult {
        total_answers,
        correct_answers: total_correct,
        accuracy,
        speed: speed_index(total_answers, duration_minutes),
        consistency: consistency_index(&block_accuracies),
        endurance: endurance_index(&block_accuracies),
        columns: columns.iter().map(ColumnSummary::from).collect(),
        // only the section-scored format reports its sections
        sections: match basis {
            MetricsBasis::Columns => Vec::new(),
            MetricsBasis::Sections => sections.to_vec(),
        },
    }
}

/// 0 without answers, otherwise answers-per-minute / 20 on the 1..=5 scale.
pub fn speed_index(total_answers: u32, duration_minutes: f64) -> f64 {
    if total_answers == 0 {
        return 0.0;
    }
    let minutes = if duration_minutes > 0.0 {
        duration_minutes
    } else {
        1.0
    };
    let per_minute = total_answers as f64 / minutes;
    clamp_index(per_minute / ANSWERS_PER_SPEED_POINT, MIN_INDEX, MAX_INDEX)
}

pub fn consistency_index(accuracies: &[f64]) -> f64 {
    if accuracies.len() < 2 {
        return DEFAULT_CONSISTENCY;
    }
    let spread = std_dev(accuracies).unwrap_or(0.0);
    clamp_index(MAX_INDEX - spread * 10.0, MIN_INDEX, MAX_INDEX)
}

/// Second-half accuracy relative to the first half, scaled so parity lands on 3.
pub fn endurance_index(accuracies: &[f64]) -> f64 {
    if accuracies.len() < 2 {
        return DEFAULT_ENDURANCE;
    }
    let (first, second) = accuracies.split_at(accuracies.len() / 2);
    let first = mean(first).unwrap_or(0.0);
    let second = mean(second).unwrap_or(0.0);
    let ratio = second / first.max(MIN_FIRST_HALF_ACCURACY);
    clamp_index(ratio * 3.0, MIN_INDEX, MAX_INDEX)
}

fn section_accuracy(section: &Section) -> f64 {
    if section.answers == 0 {
        0.0
    } else {
        section.correct as f64 / section.answers as f64
    }
}

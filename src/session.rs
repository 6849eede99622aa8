use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::column::{Column, ColumnGenerator, ColumnStats};
use crate::error::{KrError, KrResult};
use crate::metrics::{self, TestResult};
use crate::scoring::ScoringMode;
use crate::window::ColumnWindow;

pub const AUTHENTIC_COLUMNS: usize = 50;
pub const AUTHENTIC_COLUMN_LENGTH: usize = 60;
pub const AUTHENTIC_SECONDS_PER_COLUMN: u32 = 15;
pub const SIMPLIFIED_ROW_LENGTH: usize = 2;
pub const SIMPLIFIED_WINDOW: usize = 12;
pub const SECTION_INTERVAL_SECS: u32 = 60;

/// How the countdown is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TimeBudget {
    /// Each column gets its own countdown; expiry moves on to the next column.
    PerColumn { seconds: u32 },
    /// One countdown for the whole test; expiry finishes the session.
    Total { seconds: u32 },
}

impl TimeBudget {
    pub fn seconds(&self) -> u32 {
        match self {
            TimeBudget::PerColumn { seconds } | TimeBudget::Total { seconds } => *seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ColumnLayout {
    /// Every column is generated up front.
    Fixed,
    /// Columns are generated on demand; at most `capacity` are held.
    Sliding { capacity: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub duration_minutes: f64,
    pub column_length: usize,
    /// `None` only makes sense for a sliding layout under a total budget.
    pub column_limit: Option<usize>,
    pub budget: TimeBudget,
    pub scoring: ScoringMode,
    pub layout: ColumnLayout,
    pub section_interval_secs: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::authentic()
    }
}

impl SessionConfig {
    /// 50 columns of 60 digits, 15 seconds each, adjacent pair sums.
    pub fn authentic() -> Self {
        Self::authentic_with_columns(AUTHENTIC_COLUMNS)
    }

    /// Authentic sheet sized so the columns fill `minutes`.
    pub fn for_duration(minutes: f64) -> Self {
        let seconds = (minutes.max(0.0) * 60.0).ceil() as usize;
        let per_column = AUTHENTIC_SECONDS_PER_COLUMN as usize;
        let columns = seconds.div_ceil(per_column).max(1);
        Self::authentic_with_columns(columns)
    }

    fn authentic_with_columns(columns: usize) -> Self {
        Self {
            duration_minutes: (columns as f64 * AUTHENTIC_SECONDS_PER_COLUMN as f64) / 60.0,
            column_length: AUTHENTIC_COLUMN_LENGTH,
            column_limit: Some(columns),
            budget: TimeBudget::PerColumn {
                seconds: AUTHENTIC_SECONDS_PER_COLUMN,
            },
            scoring: ScoringMode::AdjacentPairSum,
            layout: ColumnLayout::Fixed,
            section_interval_secs: SECTION_INTERVAL_SECS,
        }
    }

    /// Two-digit rows answered by their sum, twelve rows visible, one shared countdown.
    pub fn simplified(minutes: f64) -> Self {
        Self {
            duration_minutes: minutes,
            column_length: SIMPLIFIED_ROW_LENGTH,
            column_limit: None,
            budget: TimeBudget::Total {
                seconds: (minutes.max(0.0) * 60.0).round() as u32,
            },
            scoring: ScoringMode::IndependentRowSum,
            layout: ColumnLayout::Sliding {
                capacity: SIMPLIFIED_WINDOW,
            },
            section_interval_secs: SECTION_INTERVAL_SECS,
        }
    }

    pub fn validate(&self) -> KrResult<()> {
        if self.column_length == 0 {
            return Err(KrError::InvalidConfig("column length must be positive".into()));
        }
        if self.budget.seconds() == 0 {
            return Err(KrError::InvalidConfig("time budget must be positive".into()));
        }
        if !self.duration_minutes.is_finite() || self.duration_minutes < 0.0 {
            return Err(KrError::InvalidConfig(format!(
                "duration must be a non-negative number of minutes, got {}",
                self.duration_minutes
            )));
        }
        if self.section_interval_secs == 0 {
            return Err(KrError::InvalidConfig("section interval must be positive".into()));
        }
        match (self.layout, self.column_limit) {
            (_, Some(0)) => Err(KrError::InvalidConfig("column count must be positive".into())),
            (ColumnLayout::Fixed, None) => Err(KrError::InvalidConfig(
                "a fixed layout needs a column count".into(),
            )),
            (ColumnLayout::Sliding { capacity: 0 }, _) => Err(KrError::InvalidConfig(
                "window capacity must be positive".into(),
            )),
            (_, None) if matches!(self.budget, TimeBudget::PerColumn { .. }) => {
                Err(KrError::InvalidConfig(
                    "an unlimited column count needs a total time budget".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
pub enum SessionState {
    NotStarted,
    ShowingInstructions,
    Running,
    Paused,
    ConfirmingExit,
    Finished,
}

/// Feedback for one submitted digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Answer {
    pub column_index: usize,
    pub position: usize,
    pub given: u8,
    pub expected: u8,
    pub correct: bool,
}

/// Answers given during one interval of running time. `time` is the elapsed
/// second at which the interval closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub time: u32,
    pub answers: u32,
    pub correct: u32,
}

/// One test attempt. Driven by `tick` once per second and by `submit_*`
/// per keystroke; the host serialises both.
#[derive(Debug)]
pub struct Session<R: Rng = StdRng> {
    config: SessionConfig,
    generator: ColumnGenerator<R>,
    window: ColumnWindow,
    pending: VecDeque<Column>,
    state: SessionState,
    resume_to: SessionState,
    current_column_index: usize,
    current_position: usize,
    total_answers: u32,
    total_correct: u32,
    budget_left: u32,
    column_elapsed: u32,
    elapsed_seconds: u32,
    sections: Vec<Section>,
    section_started_at: u32,
    section_answers: u32,
    section_correct: u32,
    last_answer: Option<Answer>,
    result: Option<TestResult>,
}

impl Session<StdRng> {
    pub fn new(config: SessionConfig) -> KrResult<Self> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn seeded(config: SessionConfig, seed: u64) -> KrResult<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Session<R> {
    pub fn with_rng(config: SessionConfig, rng: R) -> KrResult<Self> {
        config.validate()?;
        let budget_left = config.budget.seconds();
        Ok(Self {
            config,
            generator: ColumnGenerator::new(rng),
            window: ColumnWindow::unbounded(),
            pending: VecDeque::new(),
            state: SessionState::NotStarted,
            resume_to: SessionState::Running,
            current_column_index: 0,
            current_position: 0,
            total_answers: 0,
            total_correct: 0,
            budget_left,
            column_elapsed: 0,
            elapsed_seconds: 0,
            sections: Vec::new(),
            section_started_at: 0,
            section_answers: 0,
            section_correct: 0,
            last_answer: None,
            result: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    pub fn current_column_index(&self) -> usize {
        self.current_column_index
    }

    pub fn current_position(&self) -> usize {
        self.current_position
    }

    pub fn total_answers(&self) -> u32 {
        self.total_answers
    }

    pub fn total_correct(&self) -> u32 {
        self.total_correct
    }

    pub fn last_answer(&self) -> Option<&Answer> {
        self.last_answer.as_ref()
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    /// Seconds left on the running countdown (the column's, or the test's under a total budget).
    pub fn time_left(&self) -> u32 {
        self.budget_left
    }

    /// Seconds spent on the active column so far.
    pub fn column_time_spent(&self) -> u32 {
        self.column_elapsed
    }

    pub fn column_progress_percent(&self) -> f64 {
        let budget = self.config.budget.seconds();
        (budget - self.budget_left.min(budget)) as f64 / budget as f64 * 100.0
    }

    pub fn current_column(&self) -> Option<&Column> {
        self.window.get(self.current_column_index)
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.window.get(index)
    }

    /// Total columns created so far, evicted ones included.
    pub fn column_count(&self) -> usize {
        self.window.total_len()
    }

    pub fn visible_columns(&self) -> impl Iterator<Item = (usize, &Column)> + '_ {
        self.window.visible()
    }

    pub fn column_stats(&self) -> Vec<ColumnStats> {
        self.window.stats()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn result(&self) -> Option<&TestResult> {
        self.result.as_ref()
    }

    pub fn show_instructions(&mut self) -> KrResult<()> {
        match self.state {
            SessionState::NotStarted | SessionState::ShowingInstructions => {
                self.state = SessionState::ShowingInstructions;
                Ok(())
            }
            SessionState::Finished => Err(KrError::AlreadyFinished),
            state => Err(invalid("show the instructions", state)),
        }
    }

    pub fn start(&mut self) -> KrResult<()> {
        self.ensure_startable()?;
        let count = match (self.config.layout, self.config.column_limit) {
            (ColumnLayout::Fixed, Some(limit)) => limit,
            (ColumnLayout::Fixed, None) => 0,
            (ColumnLayout::Sliding { capacity }, limit) => limit.map_or(capacity, |l| l.min(capacity)),
        };
        let columns = self
            .generator
            .generate_columns(count, self.config.column_length);
        self.begin(columns);
        Ok(())
    }

    /// Starts on a prepared sheet instead of generated columns.
    pub fn start_with(&mut self, columns: Vec<Column>) -> KrResult<()> {
        self.ensure_startable()?;
        if columns.is_empty() || columns.iter().any(Column::is_empty) {
            return Err(KrError::InvalidConfig(
                "a prepared sheet needs at least one non-empty column".into(),
            ));
        }
        if let Some(value) = columns
            .iter()
            .flat_map(|c| c.digits())
            .map(|d| d.value)
            .find(|v| !(1..=9).contains(v))
        {
            return Err(KrError::InvalidConfig(format!(
                "prepared digits must be in 1..=9, got {value}"
            )));
        }
        self.begin(columns);
        Ok(())
    }

    pub fn tick(&mut self) -> KrResult<()> {
        self.ensure_running("tick")?;
        self.elapsed_seconds += 1;
        self.column_elapsed += 1;
        self.budget_left = self.budget_left.saturating_sub(1);
        self.roll_section();

        if self.budget_left == 0 {
            match self.config.budget {
                TimeBudget::PerColumn { .. } => {
                    debug!(column = self.current_column_index, "column time elapsed");
                    self.advance();
                }
                TimeBudget::Total { .. } => {
                    debug!("test time elapsed");
                    self.finish_now();
                }
            }
        }
        Ok(())
    }

    pub fn submit_key(&mut self, key: char) -> KrResult<Answer> {
        self.ensure_running("submit a digit")?;
        match key.to_digit(10) {
            Some(digit) if key.is_ascii_digit() => self.submit_digit(digit as u8),
            _ => Err(KrError::InvalidInput(key.to_string())),
        }
    }

    pub fn submit_digit(&mut self, digit: u8) -> KrResult<Answer> {
        self.ensure_running("submit a digit")?;
        if digit > 9 {
            return Err(KrError::InvalidInput(digit.to_string()));
        }

        let column_index = self.current_column_index;
        let position = self.current_position;
        let scoring = self.config.scoring;
        let column = self
            .window
            .get_mut(column_index)
            .ok_or_else(|| invalid("submit a digit", SessionState::Running))?;
        let expected = scoring
            .expected_answer(&column.values(), position)
            .ok_or_else(|| invalid("submit a digit", SessionState::Running))?;
        let correct = digit == expected;
        if !column.record(position, digit, correct) {
            return Err(invalid("submit a digit", SessionState::Running));
        }
        let positions = scoring.positions(column.len());

        self.total_answers += 1;
        self.section_answers += 1;
        if correct {
            self.total_correct += 1;
            self.section_correct += 1;
        }

        let answer = Answer {
            column_index,
            position,
            given: digit,
            expected,
            correct,
        };
        self.last_answer = Some(answer);

        if position + 1 < positions {
            self.current_position += 1;
        } else {
            self.advance();
        }
        Ok(answer)
    }

    pub fn advance_column(&mut self) -> KrResult<()> {
        self.ensure_running("advance the column")?;
        self.advance();
        Ok(())
    }

    pub fn pause(&mut self) -> KrResult<()> {
        match self.state {
            SessionState::Running => {
                self.state = SessionState::Paused;
                debug!(elapsed = self.elapsed_seconds, "paused");
                Ok(())
            }
            SessionState::Finished => Err(KrError::AlreadyFinished),
            state => Err(invalid("pause", state)),
        }
    }

    pub fn resume(&mut self) -> KrResult<()> {
        match self.state {
            SessionState::Paused => {
                self.state = SessionState::Running;
                debug!(elapsed = self.elapsed_seconds, "resumed");
                Ok(())
            }
            SessionState::Finished => Err(KrError::AlreadyFinished),
            state => Err(invalid("resume", state)),
        }
    }

    pub fn toggle_pause(&mut self) -> KrResult<()> {
        if self.state == SessionState::Paused {
            self.resume()
        } else {
            self.pause()
        }
    }

    pub fn request_exit(&mut self) -> KrResult<()> {
        match self.state {
            SessionState::Running | SessionState::Paused => {
                self.resume_to = self.state;
                self.state = SessionState::ConfirmingExit;
                Ok(())
            }
            SessionState::Finished => Err(KrError::AlreadyFinished),
            state => Err(invalid("request exit", state)),
        }
    }

    pub fn cancel_exit(&mut self) -> KrResult<()> {
        match self.state {
            SessionState::ConfirmingExit => {
                self.state = self.resume_to;
                Ok(())
            }
            SessionState::Finished => Err(KrError::AlreadyFinished),
            state => Err(invalid("cancel exit", state)),
        }
    }

    pub fn confirm_exit(&mut self) -> KrResult<&TestResult> {
        match self.state {
            SessionState::ConfirmingExit => self.finish(),
            SessionState::Finished => Err(KrError::AlreadyFinished),
            state => Err(invalid("confirm exit", state)),
        }
    }

    /// Freezes the session and computes its result. Repeated calls return the same result.
    pub fn finish(&mut self) -> KrResult<&TestResult> {
        match self.state {
            SessionState::Running | SessionState::Paused | SessionState::ConfirmingExit => {
                self.finish_now()
            }
            SessionState::Finished => {}
            state => return Err(invalid("finish", state)),
        }
        self.result.as_ref().ok_or(KrError::AlreadyFinished)
    }

    fn ensure_startable(&self) -> KrResult<()> {
        match self.state {
            SessionState::NotStarted | SessionState::ShowingInstructions => Ok(()),
            SessionState::Finished => Err(KrError::AlreadyFinished),
            state => Err(invalid("start", state)),
        }
    }

    fn ensure_running(&self, operation: &'static str) -> KrResult<()> {
        match self.state {
            SessionState::Running => Ok(()),
            SessionState::Finished => Err(KrError::AlreadyFinished),
            state => Err(invalid(operation, state)),
        }
    }

    fn begin(&mut self, columns: Vec<Column>) {
        let mut columns: VecDeque<Column> = columns.into();
        self.window = match self.config.layout {
            ColumnLayout::Fixed => {
                let mut window = ColumnWindow::unbounded();
                columns.drain(..).for_each(|c| window.push(c));
                window
            }
            ColumnLayout::Sliding { capacity } => {
                let mut window = ColumnWindow::bounded(capacity);
                let upfront = capacity.min(columns.len());
                columns.drain(..upfront).for_each(|c| window.push(c));
                window
            }
        };
        self.pending = columns;
        self.current_column_index = 0;
        self.current_position = 0;
        self.total_answers = 0;
        self.total_correct = 0;
        self.budget_left = self.config.budget.seconds();
        self.column_elapsed = 0;
        self.elapsed_seconds = 0;
        self.sections.clear();
        self.section_started_at = 0;
        self.section_answers = 0;
        self.section_correct = 0;
        self.last_answer = None;
        self.result = None;
        self.state = SessionState::Running;
        info!(
            columns = self.window.total_len(),
            column_length = self.config.column_length,
            scoring = %self.config.scoring,
            "test started"
        );
    }

    fn roll_section(&mut self) {
        if self.elapsed_seconds - self.section_started_at >= self.config.section_interval_secs {
            self.close_section();
        }
    }

    fn close_section(&mut self) {
        self.sections.push(Section {
            time: self.elapsed_seconds,
            answers: self.section_answers,
            correct: self.section_correct,
        });
        self.section_started_at = self.elapsed_seconds;
        self.section_answers = 0;
        self.section_correct = 0;
    }

    fn seal_current(&mut self, only_if_touched: bool) {
        let index = self.current_column_index;
        let spent = self.column_elapsed;
        if let Some(column) = self.window.get_mut(index) {
            if only_if_touched && column.stats().answers_given == 0 {
                return;
            }
            if column.seal(spent) {
                let stats = column.stats();
                info!(
                    column = index,
                    answers = stats.answers_given,
                    correct = stats.correct_count,
                    seconds = spent,
                    "column sealed"
                );
            }
        }
    }

    fn advance(&mut self) {
        self.seal_current(false);
        self.current_position = 0;
        self.column_elapsed = 0;
        if let TimeBudget::PerColumn { seconds } = self.config.budget {
            self.budget_left = seconds;
        }

        let next = self.current_column_index + 1;
        if self.ensure_column(next) {
            self.current_column_index = next;
        } else {
            self.finish_now();
        }
    }

    /// Makes column `index` available, drawing from the prepared queue or the
    /// generator in a sliding layout. False when the sheet is exhausted.
    fn ensure_column(&mut self, index: usize) -> bool {
        if index < self.window.total_len() {
            return true;
        }
        if let ColumnLayout::Fixed = self.config.layout {
            return false;
        }
        if let Some(column) = self.pending.pop_front() {
            self.window.push(column);
            return true;
        }
        if self.config.column_limit.is_some_and(|limit| index >= limit) {
            return false;
        }
        let column = self.generator.generate_column(self.config.column_length);
        self.window.push(column);
        true
    }

    fn finish_now(&mut self) {
        if self.state == SessionState::Finished {
            return;
        }
        self.seal_current(true);
        if self.section_answers > 0 {
            self.close_section();
        }
        self.state = SessionState::Finished;
        let result = metrics::compute_result(self);
        info!(
            total_answers = result.total_answers,
            correct_answers = result.correct_answers,
            accuracy = result.accuracy,
            speed = result.speed,
            consistency = result.consistency,
            endurance = result.endurance,
            "test finished"
        );
        self.result = Some(result);
    }
}

fn invalid(operation: &'static str, state: SessionState) -> KrError {
    KrError::InvalidStateTransition { operation, state }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn small_config(columns: usize, length: usize, seconds: u32) -> SessionConfig {
        SessionConfig {
            duration_minutes: 1.0,
            column_length: length,
            column_limit: Some(columns),
            budget: TimeBudget::PerColumn { seconds },
            scoring: ScoringMode::AdjacentPairSum,
            layout: ColumnLayout::Fixed,
            section_interval_secs: SECTION_INTERVAL_SECS,
        }
    }

    fn running(columns: Vec<Column>, seconds: u32) -> Session {
        let mut session = Session::seeded(small_config(columns.len(), 4, seconds), 1).unwrap();
        session.start_with(columns).unwrap();
        session
    }

    #[test]
    fn authentic_defaults() {
        let config = SessionConfig::authentic();
        assert_eq!(config.column_length, 60);
        assert_eq!(config.column_limit, Some(50));
        assert_eq!(config.budget, TimeBudget::PerColumn { seconds: 15 });
        assert_eq!(config.scoring, ScoringMode::AdjacentPairSum);
        assert_eq!(config.duration_minutes, 12.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duration_drives_column_count() {
        assert_eq!(SessionConfig::for_duration(10.0).column_limit, Some(40));
        assert_eq!(SessionConfig::for_duration(0.1).column_limit, Some(1));
        assert_eq!(SessionConfig::for_duration(0.0).column_limit, Some(1));
    }

    #[test]
    fn simplified_config_is_valid() {
        let config = SessionConfig::simplified(5.0);
        assert_eq!(config.budget, TimeBudget::Total { seconds: 300 });
        assert_eq!(config.layout, ColumnLayout::Sliding { capacity: 12 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let mut config = SessionConfig::authentic();
        config.column_length = 0;
        assert_matches!(config.validate(), Err(KrError::InvalidConfig(_)));

        let mut config = SessionConfig::authentic();
        config.column_limit = None;
        assert_matches!(config.validate(), Err(KrError::InvalidConfig(_)));

        let mut config = SessionConfig::authentic();
        config.budget = TimeBudget::PerColumn { seconds: 0 };
        assert_matches!(Session::new(config), Err(KrError::InvalidConfig(_)));

        let mut config = SessionConfig::simplified(1.0);
        config.budget = TimeBudget::PerColumn { seconds: 10 };
        assert_matches!(config.validate(), Err(KrError::InvalidConfig(_)));
    }

    #[test]
    fn start_generates_authentic_sheet() {
        let mut session = Session::seeded(SessionConfig::authentic(), 9).unwrap();
        assert_eq!(session.state(), SessionState::NotStarted);
        session.show_instructions().unwrap();
        assert_eq!(session.state(), SessionState::ShowingInstructions);

        session.start().unwrap();

        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.column_count(), 50);
        assert!(session.visible_columns().all(|(_, c)| c.len() == 60));
        assert_eq!(session.time_left(), 15);
        assert_eq!(session.total_answers(), 0);
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut session = Session::seeded(SessionConfig::authentic(), 9).unwrap();
        session.start().unwrap();
        assert_matches!(
            session.start(),
            Err(KrError::InvalidStateTransition {
                state: SessionState::Running,
                ..
            })
        );
    }

    #[test]
    fn pair_sum_answer_is_scored() {
        let mut session = running(vec![Column::from_values(&[4, 7, 2, 9])], 15);

        let answer = session.submit_key('1').unwrap();
        assert!(answer.correct);
        assert_eq!(answer.expected, 1);

        let answer = session.submit_key('0').unwrap();
        assert!(!answer.correct);
        assert_eq!(answer.expected, 9);

        assert_eq!(session.total_answers(), 2);
        assert_eq!(session.total_correct(), 1);
        assert_eq!(session.current_position(), 2);
        let first = session.column(0).unwrap();
        assert_eq!(first.digits()[0].is_correct, Some(true));
        assert_eq!(first.digits()[1].is_correct, Some(false));
    }

    #[test]
    fn non_digit_input_is_rejected_without_change() {
        let mut session = running(vec![Column::from_values(&[4, 7, 2, 9])], 15);

        assert_matches!(session.submit_key('a'), Err(KrError::InvalidInput(_)));
        assert_matches!(session.submit_key('٣'), Err(KrError::InvalidInput(_)));
        assert_matches!(session.submit_digit(10), Err(KrError::InvalidInput(_)));

        assert_eq!(session.total_answers(), 0);
        assert_eq!(session.current_position(), 0);
    }

    #[test]
    fn exhausting_a_column_moves_to_the_next() {
        let mut session = running(
            vec![Column::from_values(&[1, 1]), Column::from_values(&[2, 2])],
            15,
        );
        session.tick().unwrap();
        session.tick().unwrap();
        session.submit_digit(2).unwrap();
        session.submit_digit(1).unwrap();

        assert_eq!(session.current_column_index(), 1);
        assert_eq!(session.current_position(), 0);
        assert_eq!(session.time_left(), 15);
        let sealed = session.column(0).unwrap().stats();
        assert!(sealed.completed);
        assert_eq!(sealed.time_spent_seconds, 2);
        assert_eq!(sealed.correct_count, 2);
    }

    #[test]
    fn column_budget_expiry_advances() {
        let mut session = running(
            vec![Column::from_values(&[1, 2, 3]), Column::from_values(&[4, 5, 6])],
            3,
        );
        session.submit_digit(3).unwrap();
        for _ in 0..3 {
            session.tick().unwrap();
        }

        assert_eq!(session.current_column_index(), 1);
        let sealed = session.column(0).unwrap().stats();
        assert!(sealed.completed);
        assert_eq!(sealed.time_spent_seconds, 3);
        assert_eq!(sealed.answers_given, 1);
    }

    #[test]
    fn last_column_expiry_finishes() {
        let mut session = running(vec![Column::from_values(&[1, 2, 3])], 2);
        session.tick().unwrap();
        session.tick().unwrap();

        assert!(session.is_finished());
        assert!(session.result().is_some());
        assert_matches!(session.tick(), Err(KrError::AlreadyFinished));
    }

    #[test]
    fn pause_blocks_input_and_time() {
        let mut session = running(vec![Column::from_values(&[4, 7, 2, 9])], 15);
        session.submit_digit(1).unwrap();
        session.tick().unwrap();
        session.pause().unwrap();

        assert_matches!(
            session.submit_digit(9),
            Err(KrError::InvalidStateTransition {
                state: SessionState::Paused,
                ..
            })
        );
        assert_matches!(session.tick(), Err(KrError::InvalidStateTransition { .. }));
        assert_eq!(session.time_left(), 14);
        assert_eq!(session.total_answers(), 1);

        session.resume().unwrap();
        session.submit_digit(9).unwrap();
        assert_eq!(session.total_answers(), 2);
        assert_eq!(session.total_correct(), 2);
    }

    #[test]
    fn exit_can_be_cancelled_back_to_prior_state() {
        let mut session = running(vec![Column::from_values(&[4, 7, 2, 9])], 15);
        session.pause().unwrap();
        session.request_exit().unwrap();
        assert_eq!(session.state(), SessionState::ConfirmingExit);
        assert_matches!(session.tick(), Err(KrError::InvalidStateTransition { .. }));

        session.cancel_exit().unwrap();
        assert_eq!(session.state(), SessionState::Paused);

        session.resume().unwrap();
        session.request_exit().unwrap();
        session.cancel_exit().unwrap();
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn confirmed_exit_seals_partial_column() {
        let mut session = running(
            vec![Column::from_values(&[4, 7, 2, 9]), Column::from_values(&[1, 1, 1, 1])],
            15,
        );
        session.tick().unwrap();
        session.submit_digit(1).unwrap();
        session.request_exit().unwrap();

        let result = session.confirm_exit().unwrap().clone();
        assert_eq!(result.total_answers, 1);
        assert_eq!(result.columns.len(), 1);
        assert!(session.column(0).unwrap().is_completed());
        assert_eq!(session.column(0).unwrap().stats().time_spent_seconds, 1);
        assert!(!session.column(1).unwrap().is_completed());
    }

    #[test]
    fn finish_is_idempotent() {
        let mut session = running(vec![Column::from_values(&[4, 7, 2, 9])], 15);
        session.submit_digit(1).unwrap();
        let first = session.finish().unwrap().clone();
        let second = session.finish().unwrap().clone();
        assert_eq!(first, second);
        assert_matches!(session.submit_digit(1), Err(KrError::AlreadyFinished));
        assert_matches!(session.pause(), Err(KrError::AlreadyFinished));
    }

    #[test]
    fn finish_before_start_is_rejected() {
        let mut session = Session::seeded(SessionConfig::authentic(), 3).unwrap();
        assert_matches!(
            session.finish(),
            Err(KrError::InvalidStateTransition {
                state: SessionState::NotStarted,
                ..
            })
        );
    }

    #[test]
    fn sliding_layout_generates_and_evicts() {
        let mut config = SessionConfig::simplified(1.0);
        config.layout = ColumnLayout::Sliding { capacity: 3 };
        let mut session = Session::seeded(config, 5).unwrap();
        session.start().unwrap();
        assert_eq!(session.visible_columns().count(), 3);

        for _ in 0..5 {
            session.submit_digit(0).unwrap();
        }

        assert_eq!(session.current_column_index(), 5);
        assert_eq!(session.column_count(), 6);
        assert_eq!(session.visible_columns().count(), 3);
        assert!(session.column(0).is_none());
        assert_eq!(session.column_stats().len(), 6);
        let answered: u32 = session.column_stats().iter().map(|s| s.answers_given).sum();
        assert_eq!(answered, session.total_answers());
    }

    #[test]
    fn row_sum_mode_answers_once_per_row() {
        let mut config = SessionConfig::simplified(1.0);
        config.layout = ColumnLayout::Sliding { capacity: 12 };
        let mut session = Session::seeded(config, 5).unwrap();
        session
            .start_with(vec![Column::from_values(&[8, 5]), Column::from_values(&[1, 2])])
            .unwrap();

        assert!(session.submit_digit(3).unwrap().correct);
        assert_eq!(session.current_column_index(), 1);
        assert!(session.submit_digit(3).unwrap().correct);
        assert_eq!(session.current_column_index(), 2);
        assert_eq!(session.total_correct(), 2);
    }

    #[test]
    fn total_budget_finishes_the_test() {
        let mut session = Session::seeded(SessionConfig::simplified(1.0), 5).unwrap();
        session.start().unwrap();
        for _ in 0..59 {
            session.tick().unwrap();
        }
        assert_eq!(session.time_left(), 1);
        session.submit_digit(0).unwrap();
        session.tick().unwrap();

        assert!(session.is_finished());
        assert_eq!(session.sections().len(), 1);
        assert_eq!(session.sections()[0].time, 60);
        assert_eq!(session.sections()[0].answers, 1);
    }

    #[test]
    fn sections_close_every_interval() {
        let mut config = small_config(10, 4, 15);
        config.section_interval_secs = 2;
        let mut session = Session::seeded(config, 2).unwrap();
        session.start().unwrap();

        session.submit_digit(0).unwrap();
        session.tick().unwrap();
        session.tick().unwrap();
        session.submit_digit(0).unwrap();
        session.submit_digit(0).unwrap();
        session.tick().unwrap();
        session.finish().unwrap();

        let sections = session.sections();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0], Section { time: 2, answers: 1, correct: sections[0].correct });
        assert_eq!(sections[1].time, 3);
        assert_eq!(sections[1].answers, 2);
    }

    #[test]
    fn progress_percent_tracks_budget() {
        let mut session = running(vec![Column::from_values(&[4, 7, 2, 9])], 4);
        assert_eq!(session.column_progress_percent(), 0.0);
        session.tick().unwrap();
        assert_eq!(session.column_progress_percent(), 25.0);
    }

    #[test]
    fn start_with_rejects_empty_sheet() {
        let mut session = Session::seeded(SessionConfig::authentic(), 1).unwrap();
        assert_matches!(session.start_with(vec![]), Err(KrError::InvalidConfig(_)));
        assert_matches!(
            session.start_with(vec![Column::from_values(&[])]),
            Err(KrError::InvalidConfig(_))
        );
        assert_eq!(session.state(), SessionState::NotStarted);
    }

    #[test]
    fn start_with_rejects_out_of_range_digits() {
        let mut session = Session::seeded(SessionConfig::authentic(), 1).unwrap();
        assert_matches!(
            session.start_with(vec![Column::from_values(&[200, 100])]),
            Err(KrError::InvalidConfig(_))
        );
        assert_matches!(
            session.start_with(vec![Column::from_values(&[4, 7]), Column::from_values(&[10, 3])]),
            Err(KrError::InvalidConfig(_))
        );
        assert_matches!(
            session.start_with(vec![Column::from_values(&[0, 3])]),
            Err(KrError::InvalidConfig(_))
        );
        assert_eq!(session.state(), SessionState::NotStarted);
        assert_matches!(session.submit_digit(0), Err(KrError::InvalidStateTransition { .. }));
    }

    #[test]
    fn per_column_result_omits_sections() {
        let mut config = small_config(3, 4, 15);
        config.section_interval_secs = 2;
        let mut session = Session::seeded(config, 2).unwrap();
        session.start().unwrap();
        session.submit_digit(0).unwrap();
        session.tick().unwrap();
        session.tick().unwrap();
        session.submit_digit(0).unwrap();

        let result = session.finish().unwrap();
        assert!(result.sections.is_empty());
        let json = serde_json::to_value(result).unwrap();
        assert!(json.get("sections").is_none());
    }
}

// Engine and storage surface shared by the binary and the integration tests.
// Terminal rendering stays in the binary.
pub mod app_dirs;
pub mod column;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod report;
pub mod runtime;
pub mod scoring;
pub mod session;
pub mod store;
pub mod util;
pub mod window;

pub use column::{AnsweredDigit, Column, ColumnGenerator, ColumnStats};
pub use error::{KrError, KrResult};
pub use metrics::{ColumnSummary, TestResult};
pub use scoring::ScoringMode;
pub use session::{Answer, ColumnLayout, Section, Session, SessionConfig, SessionState, TimeBudget};

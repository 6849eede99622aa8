use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info};

use crate::app_dirs::AppDirs;
use crate::error::{KrError, KrResult};
use crate::metrics::{ColumnSummary, TestResult};
use crate::scoring::ScoringMode;
use crate::session::Section;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS test_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        taken_at TEXT NOT NULL,
        scoring TEXT NOT NULL,
        duration_minutes REAL NOT NULL,
        total_answers INTEGER NOT NULL,
        correct_answers INTEGER NOT NULL,
        accuracy REAL NOT NULL,
        speed REAL NOT NULL,
        consistency REAL NOT NULL,
        endurance REAL NOT NULL,
        sections TEXT NOT NULL DEFAULT '[]'
    );
    CREATE TABLE IF NOT EXISTS column_results (
        result_id INTEGER NOT NULL REFERENCES test_results(id) ON DELETE CASCADE,
        idx INTEGER NOT NULL,
        answers INTEGER NOT NULL,
        correct INTEGER NOT NULL,
        accuracy REAL NOT NULL,
        PRIMARY KEY (result_id, idx)
    );
    CREATE INDEX IF NOT EXISTS idx_test_results_taken_at ON test_results(taken_at);
"#;

/// How a stored result was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMeta {
    pub taken_at: DateTime<Local>,
    pub scoring: ScoringMode,
    pub duration_minutes: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredResult {
    pub id: i64,
    pub meta: ResultMeta,
    pub result: TestResult,
}

#[derive(Debug, Serialize)]
struct CsvRow {
    id: i64,
    taken_at: String,
    scoring: String,
    duration_minutes: f64,
    total_answers: u32,
    correct_answers: u32,
    accuracy: f64,
    speed: f64,
    consistency: f64,
    endurance: f64,
    columns: usize,
}

/// SQLite history of finished tests.
#[derive(Debug)]
pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    pub fn open<P: AsRef<Path>>(path: P) -> KrResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened result store");
        Self::init(conn)
    }

    /// The store under the user's state directory.
    pub fn open_default() -> KrResult<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("kraepelin_results.db"));
        Self::open(path)
    }

    pub fn open_in_memory() -> KrResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> KrResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn save(&mut self, result: &TestResult, meta: &ResultMeta) -> KrResult<i64> {
        let sections = serde_json::to_string(&result.sections)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO test_results
            (taken_at, scoring, duration_minutes, total_answers, correct_answers,
             accuracy, speed, consistency, endurance, sections)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                meta.taken_at.to_rfc3339(),
                scoring_name(meta.scoring)?,
                meta.duration_minutes,
                result.total_answers,
                result.correct_answers,
                result.accuracy,
                result.speed,
                result.consistency,
                result.endurance,
                sections,
            ],
        )?;
        let id = tx.last_insert_rowid();

        for (idx, column) in result.columns.iter().enumerate() {
            tx.execute(
                "INSERT INTO column_results (result_id, idx, answers, correct, accuracy) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, idx as i64, column.answers, column.correct, column.accuracy],
            )?;
        }
        tx.commit()?;

        info!(id, total_answers = result.total_answers, "result saved");
        Ok(id)
    }

    pub fn get(&self, id: i64) -> KrResult<Option<StoredResult>> {
        let row = self
            .conn
            .query_row(
                &format!("{SELECT_RESULTS} WHERE id = ?1"),
                [id],
                read_header,
            )
            .optional()?;
        match row {
            Some(header) => Ok(Some(self.attach_columns(header)?)),
            None => Ok(None),
        }
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> KrResult<Vec<StoredResult>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_RESULTS} ORDER BY taken_at DESC, id DESC LIMIT ?1"))?;
        let headers = stmt
            .query_map([limit as i64], read_header)?
            .collect::<Result<Vec<_>, _>>()?;
        headers
            .into_iter()
            .map(|header| self.attach_columns(header))
            .collect()
    }

    pub fn count(&self) -> KrResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM test_results", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn clear_all(&self) -> KrResult<()> {
        self.conn.execute("DELETE FROM column_results", [])?;
        self.conn.execute("DELETE FROM test_results", [])?;
        Ok(())
    }

    /// Writes every stored result as CSV, oldest first. Returns the row count.
    pub fn export_csv<W: Write>(&self, writer: W) -> KrResult<usize> {
        let mut results = self.recent(i64::MAX as usize)?;
        results.reverse();

        let mut csv = csv::Writer::from_writer(writer);
        for stored in &results {
            csv.serialize(CsvRow {
                id: stored.id,
                taken_at: stored.meta.taken_at.to_rfc3339(),
                scoring: stored.meta.scoring.to_string(),
                duration_minutes: stored.meta.duration_minutes,
                total_answers: stored.result.total_answers,
                correct_answers: stored.result.correct_answers,
                accuracy: stored.result.accuracy,
                speed: stored.result.speed,
                consistency: stored.result.consistency,
                endurance: stored.result.endurance,
                columns: stored.result.columns.len(),
            })?;
        }
        csv.flush()?;
        Ok(results.len())
    }

    fn attach_columns(&self, header: Header) -> KrResult<StoredResult> {
        let mut stmt = self.conn.prepare(
            "SELECT answers, correct, accuracy FROM column_results WHERE result_id = ?1 ORDER BY idx",
        )?;
        let columns = stmt
            .query_map([header.id], |row| {
                Ok(ColumnSummary {
                    answers: row.get(0)?,
                    correct: row.get(1)?,
                    accuracy: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let sections: Vec<Section> = serde_json::from_str(&header.sections)?;
        let scoring = parse_scoring(&header.scoring)?;
        let taken_at = DateTime::parse_from_rfc3339(&header.taken_at)
            .map_err(|e| KrError::InvalidConfig(format!("bad timestamp in store: {e}")))?
            .with_timezone(&Local);

        Ok(StoredResult {
            id: header.id,
            meta: ResultMeta {
                taken_at,
                scoring,
                duration_minutes: header.duration_minutes,
            },
            result: TestResult {
                total_answers: header.total_answers,
                correct_answers: header.correct_answers,
                accuracy: header.accuracy,
                speed: header.speed,
                consistency: header.consistency,
                endurance: header.endurance,
                columns,
                sections,
            },
        })
    }
}

const SELECT_RESULTS: &str = "SELECT id, taken_at, scoring, duration_minutes, total_answers, correct_answers, accuracy, speed, consistency, endurance, sections FROM test_results";

struct Header {
    id: i64,
    taken_at: String,
    scoring: String,
    duration_minutes: f64,
    total_answers: u32,
    correct_answers: u32,
    accuracy: f64,
    speed: f64,
    consistency: f64,
    endurance: f64,
    sections: String,
}

fn read_header(row: &Row<'_>) -> rusqlite::Result<Header> {
    Ok(Header {
        id: row.get(0)?,
        taken_at: row.get(1)?,
        scoring: row.get(2)?,
        duration_minutes: row.get(3)?,
        total_answers: row.get(4)?,
        correct_answers: row.get(5)?,
        accuracy: row.get(6)?,
        speed: row.get(7)?,
        consistency: row.get(8)?,
        endurance: row.get(9)?,
        sections: row.get(10)?,
    })
}

fn scoring_name(scoring: ScoringMode) -> KrResult<String> {
    match serde_json::to_value(scoring)? {
        serde_json::Value::String(name) => Ok(name),
        other => Err(KrError::InvalidConfig(format!("unexpected scoring encoding {other}"))),
    }
}

fn parse_scoring(name: &str) -> KrResult<ScoringMode> {
    Ok(serde_json::from_value(serde_json::Value::String(name.to_string()))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{score, MetricsBasis};
    use crate::column::ColumnStats;
    use tempfile::tempdir;

    fn sample_result(answers: u32, correct: u32) -> TestResult {
        let columns = [
            ColumnStats {
                completed: true,
                answers_given: answers,
                correct_count: correct,
                time_spent_seconds: 15,
            },
            ColumnStats {
                completed: true,
                answers_given: answers,
                correct_count: correct / 2,
                time_spent_seconds: 15,
            },
        ];
        let total = answers * 2;
        let right = correct + correct / 2;
        score(&columns, &[], total, right, 0.5, MetricsBasis::Columns)
    }

    fn meta() -> ResultMeta {
        ResultMeta {
            taken_at: Local::now(),
            scoring: ScoringMode::AdjacentPairSum,
            duration_minutes: 0.5,
        }
    }

    #[test]
    fn save_and_get_roundtrip() {
        let mut store = ResultStore::open_in_memory().unwrap();
        let result = sample_result(20, 18);
        let id = store.save(&result, &meta()).unwrap();

        let stored = store.get(id).unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.result, result);
        assert_eq!(stored.meta.scoring, ScoringMode::AdjacentPairSum);
        assert_eq!(stored.meta.duration_minutes, 0.5);
    }

    #[test]
    fn get_missing_is_none() {
        let store = ResultStore::open_in_memory().unwrap();
        assert!(store.get(42).unwrap().is_none());
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let mut store = ResultStore::open_in_memory().unwrap();
        let mut older = meta();
        older.taken_at = Local::now() - chrono::Duration::minutes(10);
        let first = store.save(&sample_result(10, 5), &older).unwrap();
        let second = store.save(&sample_result(12, 6), &meta()).unwrap();

        let recent = store.recent(10).unwrap();
        assert_eq!(recent.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second, first]);
        assert_eq!(store.recent(1).unwrap().len(), 1);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn sections_survive_storage() {
        let mut store = ResultStore::open_in_memory().unwrap();
        let mut result = sample_result(4, 4);
        result.sections = vec![Section {
            time: 60,
            answers: 8,
            correct: 6,
        }];
        let mut meta = meta();
        meta.scoring = ScoringMode::IndependentRowSum;
        let id = store.save(&result, &meta).unwrap();

        let stored = store.get(id).unwrap().unwrap();
        assert_eq!(stored.result.sections, result.sections);
        assert_eq!(stored.meta.scoring, ScoringMode::IndependentRowSum);
    }

    #[test]
    fn clear_all_removes_everything() {
        let mut store = ResultStore::open_in_memory().unwrap();
        store.save(&sample_result(4, 4), &meta()).unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn file_store_persists_between_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("results.db");
        {
            let mut store = ResultStore::open(&path).unwrap();
            store.save(&sample_result(6, 3), &meta()).unwrap();
        }
        let store = ResultStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let mut store = ResultStore::open_in_memory().unwrap();
        store.save(&sample_result(10, 9), &meta()).unwrap();
        store.save(&sample_result(10, 7), &meta()).unwrap();

        let mut out = Vec::new();
        let rows = store.export_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(rows, 2);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,taken_at,scoring,duration_minutes,total_answers"));
        assert!(lines[1].contains("AdjacentPairSum"));
    }
}

use std::fmt::Write as _;

use serde::Serialize;

use crate::metrics::TestResult;

const MAX_PERCENTILE: u32 = 99;
const SHARE_BASE_URL: &str = "https://twitter.com/intent/tweet?text=";

/// Coarse reading of a percentile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Low,
    Medium,
    High,
}

impl Band {
    pub fn from_percentile(percentile: u32) -> Self {
        match percentile {
            p if p < 33 => Band::Low,
            p if p < 66 => Band::Medium,
            _ => Band::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
pub enum Factor {
    Speed,
    Accuracy,
    Consistency,
    Endurance,
}

impl Factor {
    pub const ALL: [Factor; 4] = [
        Factor::Speed,
        Factor::Accuracy,
        Factor::Consistency,
        Factor::Endurance,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            Factor::Speed => "how many sums you answered per minute",
            Factor::Accuracy => "share of answers that were right",
            Factor::Consistency => "how evenly accuracy held from block to block",
            Factor::Endurance => "late accuracy compared with early accuracy",
        }
    }

    pub fn interpretation(&self, band: Band) -> &'static str {
        match (self, band) {
            (Factor::Speed, Band::Low) => "You work deliberately; pace picks up with practice.",
            (Factor::Speed, Band::Medium) => "You keep a steady working pace.",
            (Factor::Speed, Band::High) => "You process simple sums very quickly.",
            (Factor::Accuracy, Band::Low) => "Many answers were wrong; slowing down may help.",
            (Factor::Accuracy, Band::Medium) => "Most answers were right with some slips.",
            (Factor::Accuracy, Band::High) => "Your answers were almost always right.",
            (Factor::Consistency, Band::Low) => "Your accuracy swung a lot between blocks.",
            (Factor::Consistency, Band::Medium) => "Your accuracy varied a little between blocks.",
            (Factor::Consistency, Band::High) => "Your accuracy stayed level throughout.",
            (Factor::Endurance, Band::Low) => "Accuracy dropped noticeably towards the end.",
            (Factor::Endurance, Band::Medium) => "You held your level through the test.",
            (Factor::Endurance, Band::High) => "You finished stronger than you started.",
        }
    }
}

/// One line of the result card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorReport {
    pub factor: Factor,
    pub score: f64,
    pub percentile: u32,
    pub band: Band,
    pub interpretation: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total_answers: u32,
    pub correct_answers: u32,
    pub factors: Vec<FactorReport>,
}

/// Index on the 0..=5 scale to a display percentile.
pub fn percentile(index: f64) -> u32 {
    if !index.is_finite() || index <= 0.0 {
        return 0;
    }
    ((index * 20.0).round() as u32).min(MAX_PERCENTILE)
}

/// Accuracy is a fraction, so it maps straight onto 0..=99.
pub fn accuracy_percentile(accuracy: f64) -> u32 {
    if !accuracy.is_finite() || accuracy <= 0.0 {
        return 0;
    }
    ((accuracy * 100.0).round() as u32).min(MAX_PERCENTILE)
}

impl Report {
    pub fn from_result(result: &TestResult) -> Self {
        let factors = Factor::ALL
            .iter()
            .map(|&factor| {
                let (score, pct) = match factor {
                    Factor::Speed => (result.speed, percentile(result.speed)),
                    Factor::Accuracy => (result.accuracy, accuracy_percentile(result.accuracy)),
                    Factor::Consistency => (result.consistency, percentile(result.consistency)),
                    Factor::Endurance => (result.endurance, percentile(result.endurance)),
                };
                let band = Band::from_percentile(pct);
                FactorReport {
                    factor,
                    score,
                    percentile: pct,
                    band,
                    interpretation: factor.interpretation(band),
                }
            })
            .collect();

        Self {
            total_answers: result.total_answers,
            correct_answers: result.correct_answers,
            factors,
        }
    }

    pub fn factor(&self, factor: Factor) -> Option<&FactorReport> {
        self.factors.iter().find(|f| f.factor == factor)
    }

    /// Single-line summary used for sharing.
    pub fn share_text(&self) -> String {
        let mut text = format!(
            "kraepelin: {}/{} correct",
            self.correct_answers, self.total_answers
        );
        for f in &self.factors {
            let _ = write!(text, " / {} p{}", f.factor.to_string().to_lowercase(), f.percentile);
        }
        text
    }

    pub fn share_url(&self) -> String {
        format!("{SHARE_BASE_URL}{}", percent_encode(&self.share_text()))
    }
}

fn percent_encode(text: &str) -> String {
    text.bytes().fold(String::with_capacity(text.len() * 3), |mut out, b| {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> TestResult {
        TestResult {
            total_answers: 120,
            correct_answers: 108,
            accuracy: 0.9,
            speed: 2.0,
            consistency: 4.6,
            endurance: 3.0,
            columns: Vec::new(),
            sections: Vec::new(),
        }
    }

    #[test]
    fn percentile_scales_and_caps() {
        assert_eq!(percentile(0.0), 0);
        assert_eq!(percentile(1.0), 20);
        assert_eq!(percentile(2.4), 48);
        assert_eq!(percentile(5.0), 99);
        assert_eq!(percentile(f64::NAN), 0);
        assert_eq!(accuracy_percentile(0.5), 50);
        assert_eq!(accuracy_percentile(1.0), 99);
    }

    #[test]
    fn bands_split_at_thirds() {
        assert_eq!(Band::from_percentile(0), Band::Low);
        assert_eq!(Band::from_percentile(32), Band::Low);
        assert_eq!(Band::from_percentile(33), Band::Medium);
        assert_eq!(Band::from_percentile(65), Band::Medium);
        assert_eq!(Band::from_percentile(66), Band::High);
        assert_eq!(Band::from_percentile(99), Band::High);
    }

    #[test]
    fn report_covers_every_factor() {
        let report = Report::from_result(&result());
        assert_eq!(report.factors.len(), 4);

        let speed = report.factor(Factor::Speed).unwrap();
        assert_eq!(speed.percentile, 40);
        assert_eq!(speed.band, Band::Medium);

        let accuracy = report.factor(Factor::Accuracy).unwrap();
        assert_eq!(accuracy.percentile, 90);
        assert_eq!(accuracy.band, Band::High);
        assert_eq!(
            accuracy.interpretation,
            Factor::Accuracy.interpretation(Band::High)
        );

        assert_eq!(report.factor(Factor::Consistency).unwrap().percentile, 92);
        assert_eq!(report.factor(Factor::Endurance).unwrap().band, Band::Medium);
    }

    #[test]
    fn share_text_and_url() {
        let report = Report::from_result(&result());
        assert_eq!(
            report.share_text(),
            "kraepelin: 108/120 correct / speed p40 / accuracy p90 / consistency p92 / endurance p60"
        );
        let url = report.share_url();
        assert!(url.starts_with(SHARE_BASE_URL));
        assert!(url.contains("108%2F120%20correct"));
        assert!(!url[SHARE_BASE_URL.len()..].contains(' '));
    }
}

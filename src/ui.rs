use kraepelin::{
    report::Report,
    util::format_clock,
    Column, ColumnLayout, ScoringMode, SessionState, TimeBudget,
};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, Gauge, GraphType, Paragraph, Row, Table, Widget, Wrap},
    Frame,
};
use webbrowser::Browser;

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;
/// Digit, gap, answer, gap.
const CELL_WIDTH: u16 = 4;

pub fn draw(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.session.state() {
            SessionState::NotStarted | SessionState::ShowingInstructions => {
                render_instructions(self, area, buf)
            }
            SessionState::Paused => render_notice(
                "PAUSED - press p to resume",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD | Modifier::ITALIC),
                area,
                buf,
            ),
            SessionState::ConfirmingExit => render_notice(
                "End the test now? (y)es / (n)o",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                area,
                buf,
            ),
            SessionState::Running => render_running(self, area, buf),
            SessionState::Finished => match &self.report {
                Some(report) => render_results(self, report, area, buf),
                None => render_notice("Test finished", Style::default(), area, buf),
            },
        }
    }
}

fn render_notice(text: &str, style: Style, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(area);

    Paragraph::new(Span::styled(text.to_string(), style))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(chunks[1], buf);
}

fn render_instructions(app: &App, area: Rect, buf: &mut Buffer) {
    let config = app.session.config();
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let italic = Style::default().add_modifier(Modifier::ITALIC);

    let rule = match config.scoring {
        ScoringMode::AdjacentPairSum => {
            "Add each digit to the one below it and type the last digit of the sum."
        }
        ScoringMode::IndependentRowSum => "Add the digits of each row and type the last digit of the sum.",
    };
    let pacing = match config.budget {
        TimeBudget::PerColumn { seconds } => format!(
            "Each column gets {seconds} seconds, then the next one starts automatically."
        ),
        TimeBudget::Total { seconds } => format!(
            "You have {} in total; a new row appears after every answer.",
            format_clock(seconds)
        ),
    };
    let sheet = match config.column_limit {
        Some(columns) => format!("{columns} columns of {} digits", config.column_length),
        None => format!("rows of {} digits", config.column_length),
    };

    let lines = vec![
        Line::from(Span::styled("Kraepelin test", bold.fg(Color::Cyan))),
        Line::from(""),
        Line::from(rule),
        Line::from(pacing),
        Line::from(format!("Sheet: {sheet}, about {:.1} minutes.", config.duration_minutes)),
        Line::from("Work as fast and as accurately as you can until the time runs out."),
        Line::from(""),
        Line::from(Span::styled(
            "(enter) start / (p)ause during the test / (esc)ape",
            italic,
        )),
    ];

    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Instructions"))
        .render(
            Layout::default()
                .direction(Direction::Vertical)
                .horizontal_margin(HORIZONTAL_MARGIN)
                .vertical_margin(VERTICAL_MARGIN)
                .constraints([Constraint::Min(0)])
                .split(area)[0],
            buf,
        );
}

fn render_running(app: &App, area: Rect, buf: &mut Buffer) {
    let session = &app.session;
    let dim_bold = Style::default()
        .add_modifier(Modifier::BOLD)
        .add_modifier(Modifier::DIM);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(1)
        .constraints([
            Constraint::Length(1), // status
            Constraint::Length(1), // progress
            Constraint::Min(3),    // sheet
            Constraint::Length(1), // feedback
            Constraint::Length(1), // legend
        ])
        .split(area);

    let position = match session.config().column_limit {
        Some(limit) => format!("column {}/{}", session.current_column_index() + 1, limit),
        None => format!("row {}", session.current_column_index() + 1),
    };
    let status = format!(
        "{}   {}   {} answered   {} correct",
        format_clock(session.time_left()),
        position,
        session.total_answers(),
        session.total_correct(),
    );
    Paragraph::new(Span::styled(status, Style::default().add_modifier(Modifier::BOLD)))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    Gauge::default()
        .gauge_style(Style::default().fg(Color::Magenta))
        .ratio((session.column_progress_percent() / 100.0).clamp(0.0, 1.0))
        .label("")
        .render(chunks[1], buf);

    match session.config().layout {
        ColumnLayout::Fixed => render_sheet(app, chunks[2], buf),
        ColumnLayout::Sliding { .. } => render_rows(app, chunks[2], buf),
    }

    if let Some(answer) = session.last_answer() {
        let feedback = if answer.correct {
            Span::styled(
                format!("✓ {}", answer.given),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )
        } else {
            Span::styled(
                format!("✗ {} (expected {})", answer.given, answer.expected),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )
        };
        Paragraph::new(feedback)
            .alignment(Alignment::Center)
            .render(chunks[3], buf);
    }

    Paragraph::new(Span::styled("(p)ause / (esc) end test", dim_bold))
        .alignment(Alignment::Center)
        .render(chunks[4], buf);
}

fn answer_span(column: &Column, position: usize, is_cursor: bool) -> Span<'static> {
    let digit = &column.digits()[position];
    match (digit.user_answer, digit.is_correct) {
        (Some(given), Some(true)) => Span::styled(
            given.to_string(),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        (Some(given), _) => Span::styled(
            given.to_string(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        (None, _) if is_cursor => Span::styled(
            "_",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        ),
        (None, _) => Span::raw(" "),
    }
}

/// The authentic sheet: neighbouring columns side by side, scrolled so the
/// active position stays in view.
fn render_sheet(app: &App, area: Rect, buf: &mut Buffer) {
    let session = &app.session;
    let current = session.current_column_index();
    let cursor = session.current_position();

    let fit = (area.width / CELL_WIDTH).max(1) as usize;
    let total = session.column_count();
    let first = current.saturating_sub(fit / 2).min(total.saturating_sub(fit));
    let last = (first + fit).min(total);

    let height = area.height as usize;
    let column_len = session.config().column_length;
    let top = cursor
        .saturating_sub(height / 2)
        .min(column_len.saturating_sub(height));

    let lines = (top..(top + height).min(column_len))
        .map(|row| {
            let spans = (first..last)
                .filter_map(|idx| session.column(idx).map(|column| (idx, column)))
                .flat_map(|(idx, column)| {
                    let digit_style = if idx == current {
                        Style::default().add_modifier(Modifier::BOLD)
                    } else {
                        Style::default().add_modifier(Modifier::DIM)
                    };
                    let value = column
                        .digits()
                        .get(row)
                        .map(|d| d.value.to_string())
                        .unwrap_or_default();
                    let answer = if row < column.len() {
                        answer_span(column, row, idx == current && row == cursor)
                    } else {
                        Span::raw(" ")
                    };
                    [
                        Span::styled(value, digit_style),
                        Span::raw(" "),
                        answer,
                        Span::raw(" "),
                    ]
                })
                .collect::<Vec<_>>();
            Line::from(spans)
        })
        .collect::<Vec<_>>();

    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .render(area, buf);
}

/// Simplified rows, newest at the bottom.
fn render_rows(app: &App, area: Rect, buf: &mut Buffer) {
    let session = &app.session;
    let current = session.current_column_index();
    let visible: Vec<_> = session.visible_columns().collect();
    let skip = visible.len().saturating_sub(area.height as usize);

    let lines = visible
        .into_iter()
        .skip(skip)
        .map(|(idx, column)| {
            let sum = column
                .values()
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" + ");
            let style = if idx == current {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default().add_modifier(Modifier::DIM)
            };
            let mut spans = vec![
                Span::styled(format!("{:>4}. ", idx + 1), style),
                Span::styled(sum, style),
                Span::styled(" = ", style),
            ];
            if !column.is_empty() {
                spans.push(answer_span(column, 0, idx == current));
            }
            Line::from(spans)
        })
        .collect::<Vec<_>>();

    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .render(area, buf);
}

fn render_results(app: &App, report: &Report, area: Rect, buf: &mut Buffer) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let italic = Style::default().add_modifier(Modifier::ITALIC);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1), // totals
            Constraint::Length(6), // factor table
            Constraint::Min(1),    // per-column chart
            Constraint::Length(1), // padding
            Constraint::Length(1), // legend
        ])
        .split(area);

    let accuracy = app
        .last_result
        .as_ref()
        .map(|r| r.accuracy * 100.0)
        .unwrap_or_default();
    Paragraph::new(Span::styled(
        format!(
            "{} answered   {} correct   {:.1}% acc",
            report.total_answers, report.correct_answers, accuracy
        ),
        bold,
    ))
    .alignment(Alignment::Center)
    .render(chunks[0], buf);

    let header = Row::new(vec!["Factor", "Score", "Percentile", "Level", "Reading"])
        .style(bold.fg(Color::Yellow));
    let rows = report.factors.iter().map(|f| {
        let band_color = match f.band {
            kraepelin::report::Band::Low => Color::Red,
            kraepelin::report::Band::Medium => Color::Yellow,
            kraepelin::report::Band::High => Color::Green,
        };
        Row::new(vec![
            Cell::from(f.factor.to_string()),
            Cell::from(format!("{:.2}", f.score)),
            Cell::from(f.percentile.to_string()),
            Cell::from(f.band.to_string()).style(Style::default().fg(band_color)),
            Cell::from(f.interpretation),
        ])
    });
    Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(7),
            Constraint::Length(11),
            Constraint::Length(7),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .render(chunks[1], buf);

    if let Some(result) = &app.last_result {
        let points: Vec<(f64, f64)> = result
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| ((i + 1) as f64, c.accuracy))
            .collect();
        if points.len() > 1 {
            let max_x = points.len() as f64;
            let datasets = vec![Dataset::default()
                .marker(ratatui::symbols::Marker::Braille)
                .style(Style::default().fg(Color::Magenta))
                .graph_type(GraphType::Line)
                .data(&points)];
            Chart::new(datasets)
                .x_axis(
                    Axis::default()
                        .title("column")
                        .bounds([1.0, max_x])
                        .labels(vec![
                            Span::styled("1", bold),
                            Span::styled(format!("{}", points.len()), bold),
                        ]),
                )
                .y_axis(
                    Axis::default()
                        .title("accuracy")
                        .bounds([0.0, 1.0])
                        .labels(vec![Span::styled("0", bold), Span::styled("1", bold)]),
                )
                .render(chunks[2], buf);
        }
    }

    let mut legend = String::from(if Browser::is_available() {
        "(r)etry / (t)weet / (esc)ape"
    } else {
        "(r)etry / (esc)ape"
    });
    if let Some(id) = app.saved_id {
        legend.push_str(&format!("   saved as #{id}"));
    }
    Paragraph::new(Span::styled(legend, italic)).render(chunks[4], buf);
}

use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{
        Bar, BarChart, BarGroup, Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap,
    },
};
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::api::ApiGateway;
use crate::charts::{self, ChartDataset, Projection};
use crate::controller::{Response, UploadController, UploadState};
use crate::models::{self, AnalysisResult, ResumeFile};
use crate::session::AuthSession;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct AppState {
    dir: PathBuf,
    files: Vec<PathBuf>,
    selected: usize,
    controller: UploadController,
    notice: Option<String>,
}

impl AppState {
    fn new(dir: &Path, files: Vec<PathBuf>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            files,
            selected: 0,
            controller: UploadController::new(),
            notice: None,
        }
    }

    fn current_file(&self) -> Option<&PathBuf> {
        self.files.get(self.selected)
    }

    fn next(&mut self) {
        if !self.files.is_empty() && self.selected < self.files.len() - 1 {
            self.selected += 1;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }
}

/// Resume candidates in `dir`, sorted by name.
pub fn list_resumes(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(models::is_accepted)
        })
        .collect();
    files.sort();
    Ok(files)
}

type Term = Terminal<CrosstermBackend<std::io::Stdout>>;

pub async fn run_ui(gateway: Arc<ApiGateway>, session: &mut AuthSession, dir: &Path) -> Result<()> {
    let files = list_resumes(dir)?;
    let mut state = AppState::new(dir, files);
    if !session.is_authenticated() {
        state.notice = Some("Not logged in. Run: resumex login <email>".to_string());
    }

    enable_raw_mode()?;
    let mut terminal = enter_or_restore(setup_terminal, restore_terminal)?;

    let result = run_loop(&mut terminal, &mut state, gateway, session).await;

    restore_terminal()?;
    result
}

fn setup_terminal() -> Result<Term> {
    stdout().execute(EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout()))?)
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

/// Runs `setup`; if it fails, undoes raw mode with `restore` before
/// returning the setup error.
fn enter_or_restore<T>(
    setup: impl FnOnce() -> Result<T>,
    restore: impl FnOnce() -> Result<()>,
) -> Result<T> {
    match setup() {
        Ok(value) => Ok(value),
        Err(e) => {
            if let Err(restore_err) = restore() {
                error!("failed to restore terminal: {:#}", restore_err);
            }
            Err(e)
        }
    }
}

async fn run_loop(
    terminal: &mut Term,
    state: &mut AppState,
    gateway: Arc<ApiGateway>,
    session: &mut AuthSession,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let mut list_state = ListState::default();
    list_state.select(Some(0));

    loop {
        while let Ok(response) = rx.try_recv() {
            let applied = state.controller.complete(response);
            debug!(?applied, "response applied");
            if let UploadState::Failed(error) = state.controller.state() {
                session.forget_if_rejected(error);
            }
        }

        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        state.notice = None;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Down | KeyCode::Char('j') => state.next(),
            KeyCode::Up | KeyCode::Char('k') => state.prev(),
            KeyCode::Enter => {
                if let Some(path) = state.current_file().cloned() {
                    match ResumeFile::load(&path).await {
                        Ok(file) => {
                            if let Err(rejection) = state.controller.select_file(file) {
                                state.notice = Some(rejection.to_string());
                            }
                        }
                        Err(e) => state.notice = Some(format!("{:#}", e)),
                    }
                }
            }
            KeyCode::Char('a') | KeyCode::Char('l') => {
                let pending = if key.code == KeyCode::Char('a') {
                    state.controller.begin_analyze()
                } else {
                    state.controller.begin_load_last()
                };
                match pending {
                    Ok(pending) => {
                        let gateway = Arc::clone(&gateway);
                        let token = session.token();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            let response = pending.dispatch(&gateway, token.as_ref()).await;
                            if tx.send(response).is_err() {
                                error!("UI closed before the response arrived");
                            }
                        });
                    }
                    Err(rejection) => state.notice = Some(rejection.to_string()),
                }
            }
            _ => {}
        }
        list_state.select(Some(state.selected));
    }
    Ok(())
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1), Constraint::Length(1)])
        .split(frame.area());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(rows[0]);

    // Left panel: resume files
    let chosen = state.controller.selected_file().map(|f| f.file_name.as_str());
    let items: Vec<ListItem> = state
        .files
        .iter()
        .map(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("?");
            let marker = if Some(name) == chosen { "*" } else { " " };
            ListItem::new(format!("{} {}", marker, name))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Resumes in {} ({}) ",
            state.dir.display(),
            state.files.len()
        )))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: charts
    match charts::project(state.controller.result()) {
        Some(projection) => {
            draw_projection(frame, chunks[1], &projection, state.controller.result())
        }
        None => {
            let hint = Paragraph::new(placeholder_text(state.controller.state()))
                .block(Block::default().borders(Borders::ALL).title(" Analysis "))
                .wrap(Wrap { trim: false });
            frame.render_widget(hint, chunks[1]);
        }
    }

    // Status line
    let (status, style) = match (&state.notice, state.controller.state()) {
        (Some(notice), _) => (format!(" ! {}", notice), Style::default().fg(Color::Yellow)),
        (None, UploadState::Failed(_)) => (
            format!(" {}", state.controller.status_line()),
            Style::default().fg(Color::Red),
        ),
        (None, _) => (format!(" {}", state.controller.status_line()), Style::default()),
    };
    frame.render_widget(Paragraph::new(status).style(style), rows[1]);

    let help = Paragraph::new(" j/k:navigate  enter:select file  a:analyze  l:load last  q:quit")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, rows[2]);
}

fn placeholder_text(state: &UploadState) -> Text<'static> {
    let line = match state {
        UploadState::Analyzing => "Waiting for the analysis service...",
        UploadState::Failed(_) => "No result. See the status line below.",
        _ => "Select a resume and press 'a' to analyze, or 'l' to load your last result.",
    };
    Text::from(Line::from(Span::styled(line, Style::default().fg(Color::DarkGray))))
}

fn draw_projection(
    frame: &mut Frame,
    area: Rect,
    projection: &Projection,
    result: Option<&AnalysisResult>,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(8),
            Constraint::Min(4),
        ])
        .split(area);

    let score = &projection.score.points[0];
    let impact = result
        .and_then(|r| r.impact_score)
        .map(|s| format!(" (impact {:.0})", s))
        .unwrap_or_default();
    let remaining = &projection.score.points[1];
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(format!(" ATS Score{} ", impact)))
        .gauge_style(Style::default().fg(rgb(score.color)).bg(rgb(remaining.color)))
        .percent(score.value.min(100) as u16)
        .label(format!("{}/100", score.value));
    frame.render_widget(gauge, rows[0]);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    frame.render_widget(keyword_chart(&projection.keywords), middle[0]);

    let subscores: Vec<ListItem> = if projection.subscores.is_empty() {
        vec![ListItem::new(Span::styled("(none)", Style::default().fg(Color::DarkGray)))]
    } else {
        projection
            .subscores
            .iter()
            .map(|(name, pct)| ListItem::new(format!("{:<20} {:>5.1}%", name, pct)))
            .collect()
    };
    frame.render_widget(
        List::new(subscores).block(Block::default().borders(Borders::ALL).title(" Subscores ")),
        middle[1],
    );

    let width = rows[2].width.saturating_sub(4).max(20) as usize;
    let feedback: Vec<Line> = textwrap::fill(&projection.feedback, width)
        .lines()
        .map(|l| Line::from(l.to_string()))
        .collect();
    frame.render_widget(
        Paragraph::new(Text::from(feedback))
            .block(Block::default().borders(Borders::ALL).title(" AI Feedback "))
            .wrap(Wrap { trim: false }),
        rows[2],
    );
}

fn keyword_chart(dataset: &ChartDataset) -> BarChart<'_> {
    let bars: Vec<Bar> = dataset
        .points
        .iter()
        .map(|p| {
            Bar::default()
                .value(u64::from(p.value))
                .label(Line::from(p.label))
                .style(Style::default().fg(rgb(p.color)))
        })
        .collect();

    BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Keywords ({}) ", dataset.total())),
        )
        .bar_width(8)
        .bar_gap(2)
        .data(BarGroup::default().bars(&bars))
}

fn rgb(color: &str) -> Color {
    let (r, g, b) = charts::hex_to_rgb(color);
    Color::Rgb(r, g, b)
}

/// Plain-text rendering of a projection for the one-shot commands.
pub fn text_report(projection: &Projection, result: &AnalysisResult) -> String {
    let mut out = String::new();

    let score = projection.score.points[0].value;
    let filled = (score / 5) as usize;
    out.push_str(&format!(
        "ATS Score   {:>3}/100  [{}{}]\n",
        score,
        "#".repeat(filled),
        "-".repeat(20 - filled)
    ));
    if let Some(impact) = result.impact_score {
        out.push_str(&format!("Impact      {:>3.0}\n", impact));
    }

    let counts = projection.keywords.values();
    out.push_str(&format!("Keywords    found {}, missing {}\n", counts[0], counts[1]));
    if let Some(found) = result.found_keywords.as_ref().filter(|k| !k.is_empty()) {
        out.push_str(&format!("  found:   {}\n", found.join(", ")));
    }
    if let Some(missing) = result.missing_keywords.as_ref().filter(|k| !k.is_empty()) {
        out.push_str(&format!("  missing: {}\n", missing.join(", ")));
    }

    out.push_str("\nSubscores\n");
    if projection.subscores.is_empty() {
        out.push_str("  (none)\n");
    }
    for (name, pct) in &projection.subscores {
        out.push_str(&format!("  {:<20} {:>5.1}%\n", name, pct));
    }

    out.push_str("\nAI Feedback\n");
    for line in textwrap::fill(&projection.feedback, 76).lines() {
        out.push_str(&format!("  {}\n", line));
    }

    if let Some(uploaded) = &result.uploaded_at {
        out.push_str(&format!("\nUploaded: {}\n", format_timestamp(uploaded)));
    }

    out
}

fn format_timestamp(raw: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AnalysisResult {
        serde_json::from_str(
            r#"{
                "manual_score": 73,
                "impact_score": 40,
                "found_keywords": ["python", "sql"],
                "missing_keywords": ["docker"],
                "subscores": {"skills": 80, "experience": 55.5},
                "ai_feedback": "Quantify your impact."
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_text_report_contents() {
        let result = sample();
        let projection = charts::project(Some(&result)).unwrap();
        let report = text_report(&projection, &result);

        assert!(report.contains("ATS Score    73/100  [##############------]"));
        assert!(report.contains("Keywords    found 2, missing 1"));
        assert!(report.contains("  missing: docker"));
        assert!(report.contains("  skills                80.0%"));
        assert!(report.contains("  experience            55.5%"));
        assert!(report.contains("  Quantify your impact."));
    }

    #[test]
    fn test_text_report_for_empty_result() {
        let result = AnalysisResult::default();
        let projection = charts::project(Some(&result)).unwrap();
        let report = text_report(&projection, &result);

        assert!(report.contains("ATS Score     0/100  [--------------------]"));
        assert!(report.contains("found 0, missing 0"));
        assert!(report.contains("  (none)"));
        assert!(report.contains(&format!("  {}", charts::FEEDBACK_PLACEHOLDER)));
        assert!(!report.contains("Uploaded"));
    }

    #[test]
    fn test_format_timestamp_passthrough_on_bad_input() {
        assert_eq!(format_timestamp("yesterday"), "yesterday");
        assert_eq!(format_timestamp("2025-03-01T10:00:00Z").len(), 16);
    }

    #[test]
    fn test_list_resumes_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.docx", "notes.md", "c.TXT"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("old.pdf")).unwrap();

        let files = list_resumes(dir.path()).unwrap();
        let names: Vec<&str> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.docx", "b.pdf", "c.TXT"]);
    }

    #[test]
    fn test_terminal_restored_when_setup_fails() {
        let restored = std::cell::Cell::new(false);
        let result: Result<()> = enter_or_restore(
            || anyhow::bail!("no tty"),
            || {
                restored.set(true);
                Ok(())
            },
        );
        assert!(result.is_err());
        assert!(restored.get());

        restored.set(false);
        let value = enter_or_restore(
            || Ok(7),
            || {
                restored.set(true);
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(value, 7);
        assert!(!restored.get());
    }

    #[test]
    fn test_navigation_stays_in_bounds() {
        let files = vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")];
        let mut state = AppState::new(Path::new("."), files);
        state.prev();
        assert_eq!(state.selected, 0);
        state.next();
        state.next();
        assert_eq!(state.selected, 1);
        assert_eq!(state.current_file(), Some(&PathBuf::from("b.pdf")));
    }
}

mod app;

use std::io;
use std::time::Duration;

use app::{format_ago, format_time, truncate, AppState, ConnectionStatus, StatusResponse};
use chrono::Utc;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);

    // Initial fetch before rendering
    app.refresh(&client).await;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &client).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(2);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);
    match &app.monitor {
        Some(m) => render_body(f, m, chunks[1]),
        None => render_waiting(f, chunks[1]),
    }
    render_footer(f, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (conn_text, conn_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let mut spans = vec![
        Span::styled(
            " Ticket Watch  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(conn_text, Style::default().fg(conn_color)),
        Span::styled(
            format!(" ({}s)", app.last_refresh.elapsed().as_secs()),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if let Some(m) = &app.monitor {
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(
            format!("RCB vs {}", m.team),
            Style::default().fg(Color::White),
        ));
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(
            m.status.clone(),
            Style::default().fg(phase_color(&m.status)),
        ));
    }

    let paragraph = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, m: &StatusResponse, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    render_monitor(f, m, halves[0]);
    render_match(f, m, halves[1]);
}

fn render_monitor(f: &mut Frame, m: &StatusResponse, area: Rect) {
    let now = Utc::now();
    let last_check = m
        .last_check
        .map_or("never".to_string(), |t| format!("{} ({})", format_time(t), format_ago(t, now)));

    let lines = vec![
        field("Checks", m.checks_performed.to_string()),
        field("Interval", format!("every {} min", m.refresh_interval_minutes)),
        field("Last check", last_check),
        field(
            "Running",
            format!(
                "since {} ({})",
                format_time(m.monitoring_since),
                format_ago(m.monitoring_since, now)
            ),
        ),
    ];

    f.render_widget(Paragraph::new(lines).block(titled(" MONITOR ")), area);
}

fn render_match(f: &mut Frame, m: &StatusResponse, area: Rect) {
    let mut lines = Vec::new();

    if m.tickets_available {
        lines.push(Line::from(Span::styled(
            "🔔 TICKETS AVAILABLE 🔔",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::raw(""));
    }

    match &m.match_status {
        None => lines.push(Line::styled(
            "No result yet",
            Style::default().fg(Color::DarkGray),
        )),
        Some(r) if !r.found => lines.push(Line::styled(
            r.message.clone(),
            Style::default().fg(Color::Yellow),
        )),
        Some(r) => {
            let availability = if r.available {
                Span::styled("on sale", Style::default().fg(Color::Green))
            } else {
                Span::styled(
                    r.status.clone().unwrap_or_else(|| "unavailable".to_string()),
                    Style::default().fg(Color::Red),
                )
            };
            lines.push(Line::from(vec![label("Tickets"), availability]));
            lines.push(field("Date", r.match_date.clone().unwrap_or_else(|| "—".to_string())));
            lines.push(field("Price", r.price.clone().unwrap_or_else(|| "—".to_string())));
            lines.push(Line::raw(""));
            lines.push(Line::styled(
                r.message.clone(),
                Style::default().fg(Color::DarkGray),
            ));
        }
    }

    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(titled(" MATCH "));
    f.render_widget(paragraph, area);
}

fn render_waiting(f: &mut Frame, area: Rect) {
    let paragraph = Paragraph::new("Waiting for the monitor's status server…")
        .style(Style::default().fg(Color::DarkGray))
        .block(titled(" MONITOR "));
    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("auto-refresh: 2s", Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(
        Paragraph::new(line).style(Style::default().fg(Color::White)),
        area,
    );
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn titled(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
}

fn label(name: &str) -> Span<'static> {
    Span::styled(
        format!("{name:<11}"),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )
}

fn field(name: &str, value: String) -> Line<'static> {
    Line::from(vec![label(name), Span::raw(value)])
}

fn phase_color(phase: &str) -> Color {
    match phase {
        "checking" => Color::Cyan,
        "scheduled" => Color::Green,
        "recovering" => Color::Yellow,
        "stopped" => Color::Red,
        _ => Color::White,
    }
}

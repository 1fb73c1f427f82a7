mod tui_app;

use std::io;
use std::time::Duration;

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
    widgets::{Block, Borders, Cell, Paragraph, Row, Sparkline, Table},
    Frame, Terminal,
};
use tui_app::{format_share, truncate, AppState, ConnectionStatus};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build HTTP client");

    let mut app = AppState::new(base_url);

    // Initial fetch before rendering
    app.refresh(&client).await;

    // Terminal setup
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
    let refresh_interval = Duration::from_secs(5);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let changed = match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.request_rebuild(client).await;
                            true
                        }
                        KeyCode::Char('p') => {
                            app.filters.cycle_protocol(app.available.protocols.len());
                            true
                        }
                        KeyCode::Char('d') => {
                            app.filters.data_type += 1;
                            true
                        }
                        KeyCode::Char('m') => {
                            app.filters.metric += 1;
                            true
                        }
                        KeyCode::Char(c @ '1'..='9') => {
                            let idx = c as usize - '1' as usize;
                            app.filters.toggle_chain(idx);
                            true
                        }
                        _ => false,
                    };
                    if changed {
                        app.refresh(client).await;
                        last_tick = std::time::Instant::now();
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
    let area = f.area();

    // Outer vertical split: header | cards | chart | tables | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(4), // metric cards
            Constraint::Length(8), // time series
            Constraint::Min(0),    // tables
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_cards(f, app, chunks[1]);
    render_series(f, app, chunks[2]);
    render_tables(f, app, chunks[3]);
    render_footer(f, app, chunks[4]);
}

fn title(text: &str) -> Span<'static> {
    Span::styled(
        format!(" {text} "),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )
}

fn bordered(text: &str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(title(text))
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let refresh_str = if app.health.refresh_pending {
        "rebuilding…".to_string()
    } else {
        format!("gen {}", app.health.generation)
    };

    let title_spans = vec![
        Span::styled(
            " DeFi Dashboard  ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(
            format!("source: {}", app.available.source),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(app.selected_protocol().to_string(), Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(
            format!("{} / {}", app.filters.data_type(), app.filters.metric()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(refresh_str, Style::default().fg(Color::DarkGray)),
    ];

    let paragraph = Paragraph::new(Line::from(title_spans))
        .block(Block::default().borders(Borders::ALL).border_style(
            Style::default().fg(Color::DarkGray),
        ));

    f.render_widget(paragraph, area);
}

fn render_cards(f: &mut Frame, app: &AppState, area: Rect) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 6); 6])
        .split(area);

    let s = &app.summary;
    let cards = [
        ("Total TVL", s.total_tvl_display.clone()),
        ("Total Fees", s.total_fees_display.clone()),
        ("Total Revenue", s.total_revenue_display.clone()),
        ("Total Volume", s.total_volume_display.clone()),
        ("Active Chains", s.active_chains.to_string()),
        ("Active Protocols", s.active_protocols.to_string()),
    ];

    for ((label, value), col) in cards.into_iter().zip(cols.iter()) {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            value,
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )))
        .block(bordered(label));
        f.render_widget(paragraph, *col);
    }
}

fn render_series(f: &mut Frame, app: &AppState, area: Rect) {
    let data = app.sparkline_data();
    let range = match (app.series.points.first(), app.series.points.last()) {
        (Some(a), Some(b)) => format!("{} {} → {}", app.filters.metric(), a.date, b.date),
        _ => format!("{} (no data)", app.filters.metric()),
    };

    let sparkline = Sparkline::default()
        .block(bordered(&range))
        .data(data)
        .style(Style::default().fg(Color::Green));

    f.render_widget(sparkline, area);
}

fn render_tables(f: &mut Frame, app: &AppState, area: Rect) {
    // Transaction view: chain breakdown + chain toggles (35%) | transactions (65%)
    let chain_area = if app.filters.shows_transactions() {
        let halves = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
            .split(area);
        render_transactions_table(f, app, halves[1]);
        halves[0]
    } else {
        area
    };

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(4)])
        .split(chain_area);

    render_chain_table(f, app, left[0]);
    render_chain_toggles(f, app, left[1]);
}

fn render_chain_table(f: &mut Frame, app: &AppState, area: Rect) {
    let header_cells = ["Chain", "Value", "Share"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .chains
        .chains
        .iter()
        .map(|c| {
            Row::new(vec![
                Cell::from(truncate(&c.chain, 14)),
                Cell::from(c.value_display.clone()).style(Style::default().fg(Color::Cyan)),
                Cell::from(format_share(c.share_pct)).style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [Constraint::Min(8), Constraint::Length(12), Constraint::Length(7)],
    )
    .header(header)
    .block(bordered(&format!("{} BY CHAIN", app.filters.metric().to_uppercase())));

    f.render_widget(table, area);
}

fn render_chain_toggles(f: &mut Frame, app: &AppState, area: Rect) {
    let spans: Vec<Span> = app
        .filters
        .chains
        .iter()
        .take(9)
        .enumerate()
        .flat_map(|(i, (chain, on))| {
            let style = if *on {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            [
                Span::styled(format!("[{}] ", i + 1), Style::default().fg(Color::Yellow)),
                Span::styled(format!("{chain}  "), style),
            ]
        })
        .collect();

    let paragraph = Paragraph::new(Line::from(spans))
        .wrap(ratatui::widgets::Wrap { trim: true })
        .block(bordered("CHAINS"));
    f.render_widget(paragraph, area);
}

fn render_transactions_table(f: &mut Frame, app: &AppState, area: Rect) {
    let header_cells = ["Time", "Protocol", "Chain", "Wallet", "Action", "Amount", "Gas"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .transactions
        .iter()
        .map(|t| {
            let action_color = match t.action.as_str() {
                "Swap" => Color::Cyan,
                "Supply" | "Repay" => Color::Green,
                "Withdraw" | "Borrow" => Color::Yellow,
                _ => Color::White,
            };

            Row::new(vec![
                Cell::from(t.timestamp.clone()).style(Style::default().fg(Color::DarkGray)),
                Cell::from(truncate(&t.protocol, 10)),
                Cell::from(truncate(&t.chain, 10)),
                Cell::from(t.wallet_address.clone()),
                Cell::from(t.action.clone()).style(Style::default().fg(action_color)),
                Cell::from(t.amount_usd.clone()),
                Cell::from(t.gas_fee_usd.clone()).style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(19),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(13),
            Constraint::Length(8),
            Constraint::Min(10),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(bordered("RECENT TRANSACTIONS"));

    f.render_widget(table, area);
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let failed = if app.health.failed_series > 0 {
        format!("  {} series failed", app.health.failed_series)
    } else {
        String::new()
    };
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("rebuild  "),
        Span::styled("[p] ", Style::default().fg(Color::Yellow)),
        Span::raw("protocol  "),
        Span::styled("[d] ", Style::default().fg(Color::Yellow)),
        Span::raw("data type  "),
        Span::styled("[m] ", Style::default().fg(Color::Yellow)),
        Span::raw("metric  "),
        Span::styled("[1-9] ", Style::default().fg(Color::Yellow)),
        Span::raw("chains  "),
        Span::styled("auto-refresh: 5s", Style::default().fg(Color::DarkGray)),
        Span::styled(failed, Style::default().fg(Color::Red)),
    ]);
    let paragraph = Paragraph::new(line).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}

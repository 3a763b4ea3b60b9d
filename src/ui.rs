use crate::{
    bet::Direction,
    client::{
        AppSnapshot,
        NoticeKind,
        PendingKind,
    },
    reporter::{
        BetResult,
        OutcomeSource,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use itertools::Itertools;
use ratatui::{
    Frame,
    Terminal,
    backend::Backend,
    layout::{
        Constraint,
        Direction as Axis,
        Layout as Split,
        Rect,
    },
    prelude::CrosstermBackend,
    style::{
        Color,
        Modifier,
        Style,
    },
    text::Line,
    widgets::{
        Block,
        Borders,
        Clear,
        Paragraph,
        Wrap,
    },
};
use std::io::{
    Stdout,
    stdout,
};
use tokio::sync::mpsc;

const COIN_SYMBOL: &str = "APT";
const CONNECT_PROMPT: &str = "Please connect your wallet to play the dice game!";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Roll,
    CancelPending,
    InitializeHouse,
    ToggleDirection,
    SetDirection(Direction),
    StakeDigit(char),
    StakeDecimalPoint,
    StakeBackspace,
    StakeIncrement,
    StakeDecrement,
    DismissErrors,
}

/// Two renderings of the same session: the full dashboard with stats, or a
/// single compact panel.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Layout {
    #[default]
    Dashboard,
    Compact,
}

impl Layout {
    pub fn toggled(self) -> Self {
        match self {
            Layout::Dashboard => Layout::Compact,
            Layout::Compact => Layout::Dashboard,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
}

pub struct UiState {
    mode: Mode,
    layout: Layout,
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
}

impl UiState {
    pub fn new(layout: Layout) -> Self {
        Self {
            mode: Mode::Normal,
            layout,
            terminal: None,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::new(Layout::default())
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        let res = render_frame(&mut term, state, snap);
        state.terminal = Some(term);
        res?;
    }
    Ok(())
}

fn render_frame<B: Backend>(
    term: &mut Terminal<B>,
    state: &UiState,
    snap: &AppSnapshot,
) -> std::io::Result<()> {
    term.draw(|f| ui(f, state, snap)).map(|_| ())
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

/// Reads terminal input on a dedicated thread so the async loop never blocks
/// on `event::read`.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let ev = event::read();
            let failed = ev.is_err();
            if tx.send(ev).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    match input_events.recv().await {
        Some(ev) => ev.wrap_err("failed to read terminal input"),
        None => Err(eyre!("terminal input stream closed")),
    }
}

/// Maps a raw terminal event to a session event. Layout and modal changes are
/// applied to `state` directly and surface as `Redraw`.
pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => key,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };

    if state.mode == Mode::QuitModal {
        return match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        };
    }

    let ev = match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            UserEvent::Redraw
        }
        KeyCode::Char('v') => {
            state.layout = state.layout.toggled();
            UserEvent::Redraw
        }
        KeyCode::Char(c) if c.is_ascii_digit() => UserEvent::StakeDigit(c),
        KeyCode::Char('.') => UserEvent::StakeDecimalPoint,
        KeyCode::Backspace => UserEvent::StakeBackspace,
        KeyCode::Char('+') | KeyCode::Up => UserEvent::StakeIncrement,
        KeyCode::Char('-') | KeyCode::Down => UserEvent::StakeDecrement,
        KeyCode::Char('h') | KeyCode::Left => UserEvent::SetDirection(Direction::Low),
        KeyCode::Char('l') | KeyCode::Right => UserEvent::SetDirection(Direction::High),
        KeyCode::Tab | KeyCode::Char(' ') => UserEvent::ToggleDirection,
        KeyCode::Enter | KeyCode::Char('r') => UserEvent::Roll,
        KeyCode::Char('x') => UserEvent::CancelPending,
        KeyCode::Char('i') => UserEvent::InitializeHouse,
        KeyCode::Char('c') => UserEvent::DismissErrors,
        _ => return None,
    };
    Some(ev)
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Split::default()
        .direction(Axis::Vertical)
        .constraints([
            Constraint::Length(3), // wallet + network
            Constraint::Min(10),   // game
            Constraint::Length(6), // status/errors + help
        ])
        .split(f.area());

    draw_top(f, chunks[0], snap);
    if snap.account.is_none() {
        draw_connect_gate(f, chunks[1]);
    } else {
        match state.layout {
            Layout::Dashboard => draw_dashboard(f, chunks[1], snap),
            Layout::Compact => draw_compact(f, chunks[1], snap),
        }
    }
    draw_bottom(f, chunks[2], snap);
    if state.mode == Mode::QuitModal {
        draw_quit_modal(f);
    }
}

fn draw_top(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let wallet = snap
        .account
        .as_ref()
        .map(|a| a.short())
        .unwrap_or_else(|| String::from("not connected"));
    let node = match snap.chain_id {
        Some(id) => format!("{} (chain {id})", snap.network_url),
        None => snap.network_url.clone(),
    };
    let top = Paragraph::new(format!(
        "Wallet: {} | Node: {} | Module: {}",
        wallet, node, snap.module
    ))
    .block(Block::default().borders(Borders::ALL).title("Dice Game"));
    f.render_widget(top, area);
}

fn draw_connect_gate(f: &mut Frame, area: Rect) {
    let p = Paragraph::new(vec![
        Line::from(CONNECT_PROMPT),
        Line::from(""),
        Line::from("Restart with --wallet <name> to unlock a keystore wallet."),
    ])
    .style(Style::default().fg(Color::Yellow))
    .block(Block::default().borders(Borders::ALL).title("Connect Wallet"));
    f.render_widget(p, area);
}

fn draw_dashboard(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let rows = Split::default()
        .direction(Axis::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(3)])
        .split(area);
    let cols = Split::default()
        .direction(Axis::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[0]);

    f.render_widget(
        Paragraph::new(bet_lines(snap))
            .block(Block::default().borders(Borders::ALL).title("Place Your Bet")),
        cols[0],
    );
    f.render_widget(
        Paragraph::new(stats_lines(snap))
            .block(Block::default().borders(Borders::ALL).title("Game Stats")),
        cols[1],
    );

    let mut lines = result_lines(snap.latest.as_ref());
    if !snap.history.is_empty() {
        let recent = snap
            .history
            .iter()
            .map(|r| {
                let mark = if r.outcome.won { "W" } else { "L" };
                format!("{}{}", r.outcome.rolled.value(), mark)
            })
            .join(" ");
        lines.push(Line::from(format!("Recent: {recent}")));
    }
    f.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Last Roll")),
        rows[1],
    );
}

fn draw_compact(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut lines = Vec::new();
    if !snap.house_initialized {
        lines.push(Line::from(format!(
            "House not initialized this session. Press i to initialize it with a {}% edge.",
            snap.house_edge_percent
        )));
        lines.push(Line::from(""));
    }
    lines.extend(bet_lines(snap));
    if let Some(latest) = snap.latest.as_ref() {
        lines.push(Line::from(""));
        lines.extend(result_lines(Some(latest)));
    }
    f.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Dice Game")),
        area,
    );
}

fn bet_lines(snap: &AppSnapshot) -> Vec<Line<'static>> {
    let choice = |d: Direction| {
        let mark = if snap.direction == d { "(x)" } else { "( )" };
        format!("{mark} {}", d.range_label())
    };
    let action = match snap.pending {
        Some(PendingKind::Bet(_)) => String::from("Rolling... (x to stop waiting)"),
        Some(PendingKind::InitializeHouse) => {
            String::from("Initializing house... (x to stop waiting)")
        }
        None if snap.can_submit => String::from("[ Roll Dice ]  Enter"),
        None => String::from("[ Roll Dice ]  (enter a stake of at least 1)"),
    };
    let action_style = if snap.can_submit {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    vec![
        Line::from(format!("Bet Amount ({COIN_SYMBOL}): {}", snap.stake_input)),
        Line::from(format!(
            "Bet Type: {}   {}",
            choice(Direction::High),
            choice(Direction::Low)
        )),
        Line::from(""),
        Line::styled(action, action_style),
    ]
}

fn stats_lines(snap: &AppSnapshot) -> Vec<Line<'static>> {
    let stats = &snap.stats;
    let mut lines = vec![
        Line::from(format!("Games Played: {}", stats.games_played())),
        Line::styled(
            format!("Wins: {}", stats.wins()),
            Style::default().fg(Color::Green),
        ),
        Line::styled(
            format!("Losses: {}", stats.losses()),
            Style::default().fg(Color::Red),
        ),
    ];
    if let Some(rate) = stats.win_rate_display() {
        lines.push(Line::from(format!("Win Rate: {rate}%")));
    }
    lines
}

fn result_lines(latest: Option<&BetResult>) -> Vec<Line<'static>> {
    let Some(r) = latest else {
        return vec![Line::from("No rolls yet this session.")];
    };
    let source = match r.source {
        OutcomeSource::Simulated => "simulated",
        OutcomeSource::ChainEvent => "on-chain",
    };
    let verdict = if r.outcome.won {
        Line::styled(
            "You Won!",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )
    } else {
        Line::styled("You Lost", Style::default().fg(Color::Red))
    };
    vec![
        Line::from(format!("Rolled: {} ({source})", r.outcome.rolled.value())),
        Line::from(format!(
            "Bet: {} {COIN_SYMBOL} on {}",
            r.stake, r.direction
        )),
        verdict,
        Line::from(format!(
            "Tx: {} at {}",
            r.tx_hash,
            r.settled_at.format("%H:%M:%S UTC")
        )),
    ]
}

fn draw_bottom(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let chunks = Split::default()
        .direction(Axis::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(3)])
        .split(area);

    if snap.errors.is_empty() {
        let (text, color) = match &snap.notice {
            Some(n) if n.kind == NoticeKind::Failure => {
                (format!("{} | {}", n.message, snap.status), Color::Red)
            }
            Some(n) => (format!("{} | {}", n.message, snap.status), Color::Green),
            None => (snap.status.clone(), Color::Green),
        };
        let status = Paragraph::new(text)
            .style(Style::default().fg(color))
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[0]);
    } else {
        let latest = snap.errors.last().cloned().unwrap_or_default();
        let errors = Paragraph::new(format!("({}) {}", snap.errors.len(), latest))
            .style(Style::default().fg(Color::Red))
            .block(Block::default().borders(Borders::ALL).title("Errors"));
        f.render_widget(errors, chunks[0]);
    }

    let help = Paragraph::new(
        "0-9 . stake | +/- adjust | h/l low/high | Enter roll | x stop waiting | i init house | c clear errors | v layout | q quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[1]);
}

fn draw_quit_modal(f: &mut Frame) {
    let area = centered_rect(40, 20, f.area());
    let block = Block::default().borders(Borders::ALL).title("Quit");
    let p = Paragraph::new("Leave the dice game? y/n");
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    f.render_widget(p, block.inner(area));
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Split::default()
        .direction(Axis::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Split::default()
        .direction(Axis::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}

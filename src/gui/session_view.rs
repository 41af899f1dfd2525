use std::{io::stdout, sync::mpsc::Receiver, time::Duration};

use crate::controller::{SessionController, SessionEvent, SessionState, SessionSummary};
use crate::error::SessionError;
use crate::gui::error::RateGuiError;
use crate::persister::PersistOutcome;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

const UI_TICK: Duration = Duration::from_millis(16);

/// Shows the current rating and lets the user start and stop sessions
/// until they quit. `<Enter>` toggles between GO and STOP, `<Esc>` or `<Q>`
/// leaves. The controller is left as it is on exit; cancelling it is up to
/// the caller.
pub fn session_view(controller: &mut SessionController) -> Result<(), RateGuiError> {
    let events = controller.subscribe();

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let res = run_view(&mut terminal, controller, &events);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    res
}

fn describe_stop(result: Result<SessionSummary, SessionError>) -> String {
    match result {
        Ok(SessionSummary {
            outcome: PersistOutcome::Written(n, path),
            ..
        }) => format!("Saved {} ratings to {}.", n, path.display()),
        Ok(SessionSummary {
            outcome: PersistOutcome::Dropped(n),
            ..
        }) => format!("No output file: {} ratings discarded.", n),
        Err(e) => e.to_string(),
    }
}

fn run_view<B: Backend>(
    terminal: &mut Terminal<B>,
    controller: &mut SessionController,
    events: &Receiver<SessionEvent>,
) -> Result<(), RateGuiError> {
    let mut status = String::from("Press <Enter> to start.");

    loop {
        if let Some(result) = controller.poll_playback() {
            status = format!("Stimulus finished. {}", describe_stop(result));
        }
        for event in events.try_iter() {
            if let SessionEvent::Dropped(n) = event {
                status = format!("No output file: {} ratings discarded.", n);
            }
        }

        terminal.draw(|f| ui(f, controller, &status))?;

        if event::poll(UI_TICK)? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Enter => {
                        status = match controller.state() {
                            SessionState::Running => describe_stop(controller.stop()),
                            _ => match controller.start() {
                                Ok(()) => String::from("Recording..."),
                                Err(e) => e.to_string(),
                            },
                        };
                    }
                    KeyCode::Esc | KeyCode::Char('q') => return Ok(()),
                    _ => {}
                }
            }
        }
    }
}

fn ui(f: &mut Frame, controller: &SessionController, status: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(f.size());

    let shown = |p: Option<&std::path::Path>| {
        p.map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_owned())
    };
    let setup = Paragraph::new(vec![
        Line::from(vec![
            "Serial port: ".into(),
            Span::raw(controller.port().unwrap_or("-")).bold(),
        ]),
        Line::from(vec![
            "Save as:     ".into(),
            Span::raw(shown(controller.destination())).bold(),
        ]),
        Line::from(vec![
            "Stimulus:    ".into(),
            Span::raw(shown(controller.audio_resource())).bold(),
        ]),
    ])
    .block(
        Block::default()
            .title(Title::from(" Rate this sound ".magenta().bold()).alignment(Alignment::Center))
            .borders(Borders::ALL),
    );
    f.render_widget(setup, chunks[0]);

    let rating = Paragraph::new(Span::raw(controller.current_rating()).bold().magenta())
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .title(Title::from(" Current rating ").alignment(Alignment::Center))
                .borders(Borders::ALL),
        );
    f.render_widget(rating, chunks[1]);

    let (label, style) = match controller.state() {
        SessionState::Running => ("STOP", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
        SessionState::Armed => ("GO", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
        SessionState::Idle => ("GO", Style::default().fg(Color::DarkGray)),
    };
    let button = Paragraph::new(Span::styled(label, style))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .title(
                    Title::from(Line::from(vec![
                        " Start/Stop ".into(),
                        "<Enter>".magenta().bold(),
                        " Quit ".into(),
                        "<Esc> ".magenta().bold(),
                    ]))
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
                )
                .borders(Borders::ALL),
        );
    f.render_widget(button, chunks[2]);

    let status = Paragraph::new(status).block(Block::default().borders(Borders::ALL));
    f.render_widget(status, chunks[3]);
}

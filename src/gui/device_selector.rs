use std::{io::stdout, path::PathBuf, time::Duration};

use crate::dummy_source::DUMMY_PORT;
use crate::gui::error::RateGuiError;

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

/// Port choices with a wrapping cursor.
struct PortChoices {
    names: Vec<String>,
    cursor: usize,
}

impl PortChoices {
    /// Serial ports first, the simulated slider last, so the list is never
    /// empty.
    fn new(available_ports: &[PathBuf]) -> Self {
        let mut names: Vec<String> = available_ports
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        names.push(DUMMY_PORT.to_owned());
        Self { names, cursor: 0 }
    }

    fn next(&mut self) {
        self.cursor = (self.cursor + 1) % self.names.len();
    }

    fn previous(&mut self) {
        self.cursor = (self.cursor + self.names.len() - 1) % self.names.len();
    }

    fn hint(&self) -> &'static str {
        if self.names[self.cursor] == DUMMY_PORT {
            "Simulated slider, no hardware needed."
        } else {
            "Serial port. The slider should print one rating per line."
        }
    }

    fn take(mut self) -> String {
        self.names.swap_remove(self.cursor)
    }
}

/// Lets the user pick the rating device from `available_ports`. The
/// simulated slider is always offered last. Returns `None` if the user
/// quits without choosing.
pub fn device_selector(available_ports: Vec<PathBuf>) -> Result<Option<String>, RateGuiError> {
    let mut choices = PortChoices::new(&available_ports);

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let res = pick(&mut terminal, &mut choices);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(res?.then(|| choices.take()))
}

fn pick<B: Backend>(
    terminal: &mut Terminal<B>,
    choices: &mut PortChoices,
) -> Result<bool, RateGuiError> {
    let mut list_state = ListState::default();
    loop {
        list_state.select(Some(choices.cursor));
        terminal.draw(|frame| draw(frame, choices, &mut list_state))?;

        if !event::poll(Duration::from_millis(16))? {
            continue;
        }
        let event::Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => choices.next(),
            KeyCode::Up | KeyCode::Char('k') => choices.previous(),
            KeyCode::Enter => return Ok(true),
            KeyCode::Char('q') | KeyCode::Esc => return Ok(false),
            _ => {}
        }
    }
}

fn draw(frame: &mut Frame, choices: &PortChoices, list_state: &mut ListState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(frame.size());

    let keys = Title::from(Line::from(vec![
        " Move ".into(),
        "<Up>/<Down>".cyan().bold(),
        " Use this port ".into(),
        "<Enter>".cyan().bold(),
        " Quit ".into(),
        "<Esc> ".cyan().bold(),
    ]));
    let list = List::new(choices.names.iter().map(String::as_str))
        .highlight_symbol("> ")
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(
            Block::default()
                .title(Title::from(" Where is the rating slider? ").alignment(Alignment::Left))
                .title(keys.alignment(Alignment::Right).position(Position::Bottom))
                .borders(Borders::ALL),
        );
    frame.render_stateful_widget(list, chunks[0], list_state);

    let hint = Paragraph::new(choices.hint()).block(Block::default().borders(Borders::ALL));
    frame.render_widget(hint, chunks[1]);
}

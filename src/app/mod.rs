use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, TryRecvError};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use crate::config::AppConfig;
use crate::notes::{DeleteChoice, Note, NoteRepository, Subscription};
use crate::ui;

pub mod state;

pub use state::{AppState, EditorField};

enum Action {
    Quit,
    Move(isize, isize),
    Open,
    NewNote,
}

pub struct App {
    pub config: Arc<AppConfig>,
    repo: NoteRepository,
    state: AppState,
    subscription: Subscription,
    snapshots: Receiver<Vec<Note>>,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, repo: NoteRepository) -> Result<Self> {
        let (subscription, snapshots) = repo
            .subscribe_channel()
            .context("subscribing to note snapshots")?;
        let state = AppState::new(
            config.cards.columns,
            config.cards.preview_lines,
            config.confirm_delete,
        );
        let mut app = Self {
            config,
            repo,
            state,
            subscription,
            snapshots,
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        };
        app.drain_snapshots();
        Ok(app)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        self.subscription.close();
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| ui::draw_app(frame, &self.state, &self.config))
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.drain_snapshots();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    /// Applies every snapshot that arrived since the last tick. Only the
    /// newest matters since each one carries the whole collection.
    fn drain_snapshots(&mut self) {
        let mut latest = None;
        loop {
            match self.snapshots.try_recv() {
                Ok(notes) => latest = Some(notes),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.subscription.is_open() {
                        tracing::warn!("snapshot feed disconnected");
                        self.state
                            .set_status_message(Some("Lost connection to the note store"));
                        self.subscription.close();
                    }
                    break;
                }
            }
        }
        if let Some(notes) = latest {
            self.state.apply_snapshot(notes);
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.state.pending_delete().is_some() {
            self.handle_confirm_key(key);
            return;
        }

        if self.state.is_editing() {
            self.handle_editor_key(key);
            return;
        }

        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        let action = match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Char('l') | KeyCode::Right => Some(Action::Move(1, 0)),
            KeyCode::Char('h') | KeyCode::Left => Some(Action::Move(-1, 0)),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::Move(0, 1)),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::Move(0, -1)),
            KeyCode::Enter => Some(Action::Open),
            KeyCode::Char('e') if plain => Some(Action::Open),
            KeyCode::Char('a') if plain => Some(Action::NewNote),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::Move(dx, dy) => self.state.move_selection(dx, dy),
            Action::Open => {
                if !self.state.open_selected() {
                    self.state
                        .set_status_message(Some("No note selected; press 'a' to add one"));
                }
            }
            Action::NewNote => self.state.open_new(),
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => {
                self.state.close_editor();
                self.state.set_status_message(Some("Closed without saving"));
            }
            KeyCode::Char('s') if ctrl => {
                if let Err(err) = self.state.save(&self.repo) {
                    tracing::error!(?err, "save from editor failed");
                }
            }
            KeyCode::Char('d') if ctrl => {
                if let Err(err) = self.state.request_delete(&self.repo) {
                    tracing::error!(?err, "delete from editor failed");
                }
            }
            KeyCode::Tab | KeyCode::BackTab => self.state.toggle_field(),
            KeyCode::Enter => {
                self.state.insert_newline();
            }
            KeyCode::Backspace => {
                self.state.backspace();
            }
            KeyCode::Char(ch)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER) =>
            {
                self.state.insert_char(ch);
            }
            _ => {}
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        let choice = match key.code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => DeleteChoice::Confirm,
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => DeleteChoice::Cancel,
            _ => return,
        };
        if let Err(err) = self.state.resolve_delete(choice, &self.repo) {
            tracing::error!(?err, "resolving delete failed");
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("restoring screen state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::repository::DEFAULT_COLLECTION;
    use crate::store::MemoryStore;
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn type_keys(app: &mut App, text: &str) {
        for ch in text.chars() {
            let code = if ch == '\n' {
                KeyCode::Enter
            } else {
                KeyCode::Char(ch)
            };
            app.handle_key(press(code, KeyModifiers::NONE));
        }
    }

    fn test_app(confirm_delete: bool) -> Result<App> {
        let store = Arc::new(MemoryStore::new());
        let repo = NoteRepository::new(store, DEFAULT_COLLECTION);
        let config = AppConfig {
            confirm_delete,
            ..AppConfig::default()
        };
        App::new(Arc::new(config), repo)
    }

    #[test]
    fn keyboard_flow_creates_and_deletes_note() -> Result<()> {
        let mut app = test_app(true)?;
        app.handle_key(press(KeyCode::Char('a'), KeyModifiers::NONE));
        type_keys(&mut app, "Plan\n- ship it");
        app.handle_key(press(KeyCode::Char('s'), KeyModifiers::CONTROL));
        assert!(!app.state().is_editing());
        assert_eq!(app.state().list().len(), 1);

        app.handle_key(press(KeyCode::Enter, KeyModifiers::NONE));
        assert!(app.state().is_editing());
        app.handle_key(press(KeyCode::Char('d'), KeyModifiers::CONTROL));
        assert!(app.state().pending_delete().is_some());
        app.handle_key(press(KeyCode::Char('y'), KeyModifiers::NONE));
        assert!(app.state().list().is_empty());
        assert!(app.repo.fetch_all()?.is_empty());

        app.subscription.close();
        Ok(())
    }

    #[test]
    fn escape_discards_draft() -> Result<()> {
        let mut app = test_app(true)?;
        app.handle_key(press(KeyCode::Char('a'), KeyModifiers::NONE));
        type_keys(&mut app, "scratch");
        app.handle_key(press(KeyCode::Esc, KeyModifiers::NONE));
        assert!(!app.state().is_editing());
        assert!(app.repo.fetch_all()?.is_empty());
        app.subscription.close();
        Ok(())
    }

    #[test]
    fn quit_key_sets_flag_only_outside_editor() -> Result<()> {
        let mut app = test_app(true)?;
        app.handle_key(press(KeyCode::Char('a'), KeyModifiers::NONE));
        app.handle_key(press(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(!app.should_quit);
        app.handle_key(press(KeyCode::Esc, KeyModifiers::NONE));
        app.handle_key(press(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(app.should_quit);
        Ok(())
    }
}

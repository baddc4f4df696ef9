use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};
use readmark_config::Config;
use readmark_engine::{
    DecorationView, DocumentId, FileGateway, Notice, NoticeReceiver, RenderedDocument, Session,
};
use std::{
    env,
    io::{Stdout, stdout},
    path::PathBuf,
    process,
    sync::Arc,
    time::Duration,
};
use tokio::runtime::Runtime;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

struct App {
    session: Session,
    notices: NoticeReceiver,
    preview_chars: usize,
    caret: usize,
    anchor: Option<usize>,
    span_list_state: ListState,
    /// Replacement content being typed for the selected paragraph.
    input: Option<String>,
    status: String,
}

impl App {
    fn new(session: Session, notices: NoticeReceiver, preview_chars: usize) -> Self {
        let mut app = Self {
            session,
            notices,
            preview_chars,
            caret: 0,
            anchor: None,
            span_list_state: ListState::default(),
            input: None,
            status: String::new(),
        };
        app.sync_list_selection();
        app
    }

    fn text(&self) -> Vec<char> {
        self.session.document().text().chars().collect()
    }

    fn move_caret_left(&mut self) {
        self.caret = self.caret.saturating_sub(1);
    }

    fn move_caret_right(&mut self) {
        self.caret = (self.caret + 1).min(self.session.document().len());
    }

    fn move_caret_up(&mut self) {
        self.caret = line_move(&self.text(), self.caret, false);
    }

    fn move_caret_down(&mut self) {
        self.caret = line_move(&self.text(), self.caret, true);
    }

    fn toggle_anchor(&mut self) {
        self.anchor = match self.anchor {
            Some(_) => None,
            None => Some(self.caret),
        };
    }

    /// Selected characters, including the one under the caret.
    fn selection(&self) -> Option<(usize, usize)> {
        let anchor = self.anchor?;
        let len = self.session.document().len();
        let start = anchor.min(self.caret);
        let end = (anchor.max(self.caret) + 1).min(len);
        (start < end).then_some((start, end))
    }

    fn add_selection(&mut self) {
        let Some((start, end)) = self.selection() else {
            self.status = "Press v to start a selection first".to_string();
            return;
        };
        match self.session.add_selection(start, end) {
            Ok(span) => {
                let skipped = self
                    .session
                    .last_report()
                    .skipped
                    .iter()
                    .find(|s| s.number == span.number);
                self.status = match skipped {
                    Some(s) => format!(
                        "Added paragraph {}, but it could not be highlighted: {}",
                        span.number, s.error
                    ),
                    None => format!("Added paragraph {}", span.number),
                };
                self.anchor = None;
                self.span_list_state.select(Some(span.number - 1));
            }
            Err(e) => self.status = format!("Cannot add paragraph: {e}"),
        }
    }

    fn start_edit(&mut self) {
        let Some(span) = self
            .span_list_state
            .selected()
            .and_then(|i| self.session.spans().get(i))
        else {
            self.status = "Select a paragraph to edit first".to_string();
            return;
        };
        self.status = format!("Editing paragraph {} (Enter: save, Esc: cancel)", span.number);
        self.input = Some(span.content.clone());
    }

    fn commit_edit(&mut self) {
        let (Some(input), Some(index)) = (self.input.take(), self.span_list_state.selected())
        else {
            return;
        };
        let number = index + 1;
        self.status = match self.session.edit(number, &input) {
            Ok(true) => format!("Updated paragraph {number}"),
            Ok(false) => format!("Paragraph {number} unchanged"),
            Err(e) => e.to_string(),
        };
    }

    fn handle_input_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Enter => self.commit_edit(),
            KeyCode::Esc => {
                self.input = None;
                self.status = "Edit cancelled".to_string();
            }
            KeyCode::Backspace => {
                if let Some(input) = &mut self.input {
                    input.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(input) = &mut self.input {
                    input.push(c);
                }
            }
            _ => {}
        }
    }

    /// Apply one key press. Returns true when the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        if self.input.is_some() {
            self.handle_input_key(code);
            return false;
        }
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Left | KeyCode::Char('h') => self.move_caret_left(),
            KeyCode::Right | KeyCode::Char('l') => self.move_caret_right(),
            KeyCode::Up => self.move_caret_up(),
            KeyCode::Down => self.move_caret_down(),
            KeyCode::Char('v') => self.toggle_anchor(),
            KeyCode::Char('a') => self.add_selection(),
            KeyCode::Char('j') => self.next_span(),
            KeyCode::Char('k') => self.previous_span(),
            KeyCode::Char('d') => self.delete_selected_span(),
            KeyCode::Char('e') => self.start_edit(),
            _ => {}
        }
        false
    }

    fn delete_selected_span(&mut self) {
        let Some(index) = self.span_list_state.selected() else {
            return;
        };
        match self.session.remove(index + 1) {
            Ok(span) => self.status = format!("Deleted paragraph {}", span.number),
            Err(e) => self.status = e.to_string(),
        }
        self.sync_list_selection();
    }

    fn next_span(&mut self) {
        let count = self.session.spans().len();
        if count == 0 {
            return;
        }
        let i = match self.span_list_state.selected() {
            Some(i) => (i + 1) % count,
            None => 0,
        };
        self.span_list_state.select(Some(i));
    }

    fn previous_span(&mut self) {
        let count = self.session.spans().len();
        if count == 0 {
            return;
        }
        let i = match self.span_list_state.selected() {
            Some(0) | None => count - 1,
            Some(i) => i - 1,
        };
        self.span_list_state.select(Some(i));
    }

    fn sync_list_selection(&mut self) {
        let count = self.session.spans().len();
        let selected = match self.span_list_state.selected() {
            _ if count == 0 => None,
            Some(i) => Some(i.min(count - 1)),
            None => Some(0),
        };
        self.span_list_state.select(selected);
    }

    fn drain_notices(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            self.status = describe_notice(&notice);
        }
    }
}

fn describe_notice(notice: &Notice) -> String {
    match notice {
        Notice::LoadFailed { error } => format!("Could not load saved paragraphs: {error}"),
        Notice::DroppedStoredSpans { count } => {
            format!("Ignored {count} saved paragraphs that overlapped others")
        }
        Notice::SaveFailed { error } => format!("Could not save paragraphs: {error}"),
        Notice::DeleteFailed { number, error } => {
            format!("Could not delete paragraph {number}: {error}")
        }
    }
}

/// Move to the same column on the previous or next line.
fn line_move(text: &[char], caret: usize, down: bool) -> usize {
    let line_start = text[..caret].iter().rposition(|&c| c == '\n').map_or(0, |i| i + 1);
    let column = caret - line_start;
    if down {
        let Some(newline) = text[caret..].iter().position(|&c| c == '\n') else {
            return caret;
        };
        let next_start = caret + newline + 1;
        let next_len = text[next_start..]
            .iter()
            .position(|&c| c == '\n')
            .unwrap_or(text.len() - next_start);
        next_start + column.min(next_len)
    } else {
        if line_start == 0 {
            return caret;
        }
        let prev_start = text[..line_start - 1]
            .iter()
            .rposition(|&c| c == '\n')
            .map_or(0, |i| i + 1);
        prev_start + column.min(line_start - 1 - prev_start)
    }
}

fn tui_color(color: readmark_engine::Color) -> Color {
    Color::Rgb(color.r, color.g, color.b)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    let (document_path, store_override) = match args.as_slice() {
        [_, path] => (PathBuf::from(path), None),
        [_, path, flag, store] if flag == "--store" => {
            (PathBuf::from(path), Some(PathBuf::from(store)))
        }
        _ => {
            eprintln!("Usage: {} <document.md> [--store DIR]", args[0]);
            process::exit(1);
        }
    };

    let config = match Config::load() {
        Ok(Some(config)) => config,
        Ok(None) => {
            let config = Config::default();
            match config.save() {
                Ok(()) => log::info!("wrote default config to {}", Config::config_path().display()),
                Err(e) => log::warn!("could not write default config: {e}"),
            }
            config
        }
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };
    let store_path = store_override
        .map(|p| Config::expand_path(&p).unwrap_or(p))
        .unwrap_or(config.store_path);

    let bytes = std::fs::read(&document_path)
        .with_context(|| format!("Failed to read {}", document_path.display()))?;
    let document = RenderedDocument::from_bytes(&bytes)?;
    let document_id = match document_path.file_stem() {
        Some(stem) => DocumentId::new(stem.to_string_lossy()),
        None => {
            eprintln!("Error: '{}' has no file name", document_path.display());
            process::exit(1);
        }
    };

    log::debug!(
        "opening {} as {document_id}, spans stored in {}",
        document_path.display(),
        store_path.display()
    );
    let runtime = Runtime::new()?;
    let gateway = Arc::new(FileGateway::new(store_path));
    let (session, notices) = runtime.block_on(Session::open(document_id, document, gateway));
    let mut app = App::new(session, notices, config.preview_chars);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if runtime
        .block_on(tokio::time::timeout(FLUSH_TIMEOUT, app.session.flush()))
        .is_err()
    {
        eprintln!("Warning: some changes may not have been saved");
    }
    app.drain_notices();

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    loop {
        app.drain_notices();
        terminal.draw(|f| ui(f, app))?;

        if !event::poll(Duration::from_millis(250))? {
            continue;
        }
        if let Event::Key(key) = event::read()?
            && app.handle_key(key.code)
        {
            return Ok(());
        }
    }
}

fn document_lines(app: &App) -> Vec<Line<'static>> {
    let text = app.text();
    let decorations = app.session.document().decorations();
    let selection = app.selection();
    let caret_style = Style::default().bg(Color::Yellow).fg(Color::Black);

    let mut lines = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    for (i, ch) in text.iter().enumerate() {
        let decoration = decorations.iter().find(|d| d.start <= i && i < d.end);
        let mut style = Style::default();
        if let Some(d) = decoration {
            style = style.fg(tui_color(d.color));
        }
        if selection.is_some_and(|(start, end)| start <= i && i < end) {
            style = style.add_modifier(Modifier::REVERSED);
        }
        if i == app.caret {
            style = caret_style;
        }

        if *ch == '\n' {
            if i == app.caret {
                current.push(Span::styled(" ", style));
            }
            lines.push(Line::from(std::mem::take(&mut current)));
        } else {
            current.push(Span::styled(ch.to_string(), style));
        }
        if let Some(d) = decoration
            && i + 1 == d.end
        {
            current.push(badge(d));
        }
    }
    if app.caret == text.len() {
        current.push(Span::styled(" ", caret_style));
    }
    lines.push(Line::from(current));
    lines
}

fn badge(decoration: &DecorationView) -> Span<'static> {
    Span::styled(
        format!("[{}]", decoration.number),
        Style::default()
            .bg(tui_color(decoration.color))
            .fg(Color::Black),
    )
}

fn ui(f: &mut Frame, app: &mut App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(2)].as_ref())
        .split(f.area());
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .margin(1)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)].as_ref())
        .split(rows[0]);

    // Span list panel
    let span_items: Vec<ListItem> = app
        .session
        .summaries(app.preview_chars)
        .into_iter()
        .map(|row| {
            let style = Style::default().fg(tui_color(row.color));
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:>2}. ", row.number), style),
                Span::raw(row.preview),
            ]))
        })
        .collect();

    let title = format!(
        "{} - next paragraph: {}",
        app.session.document_id(),
        app.session.next_number()
    );
    let span_list = List::new(span_items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::Yellow).fg(Color::Black));

    f.render_stateful_widget(span_list, chunks[0], &mut app.span_list_state);

    // Document panel
    let content = Paragraph::new(document_lines(app))
        .block(Block::default().borders(Borders::ALL).title("Document"))
        .wrap(ratatui::widgets::Wrap { trim: false });

    f.render_widget(content, chunks[1]);

    let help_text = Line::from(vec![
        Span::raw("q: Quit | "),
        Span::raw("←/h →/l ↑ ↓: Move | "),
        Span::raw("v: Mark start | a: Add | "),
        Span::raw("j/k: Select paragraph | e: Edit | d: Delete"),
    ]);
    let status = match &app.input {
        Some(input) => Line::from(vec![
            Span::styled("Edit: ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("{input}_")),
        ]),
        None => Line::from(Span::styled(
            app.status.clone(),
            Style::default().fg(Color::Yellow),
        )),
    };

    f.render_widget(Paragraph::new(vec![status, help_text]), rows[1]);
}

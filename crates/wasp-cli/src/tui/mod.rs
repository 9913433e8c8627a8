//! Interactive TUI (Terminal User Interface) for wasp.
//!
//! Provides a search interface with:
//! - A query line; Enter runs the search
//! - Paging through results with PageUp/PageDown, pages cached per query
//! - A detail pane with the selected page's content

use crate::app::{parse_query, App};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{prelude::*, widgets::*};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wasp_core::{Config, DocumentStore, ResultPages, SearchResult};

/// Snippet highlight markers, as configured for the fetcher
const PRE_TAG: &str = "<em>";
const POST_TAG: &str = "</em>";

/// TUI application state.
struct TuiApp {
    /// The main application
    app: App,

    /// Time window applied to every search
    from: Option<String>,
    to: Option<String>,

    /// Current search terms
    query_string: String,

    /// Pages of the last executed search
    pages: Option<ResultPages>,

    /// 1-based number of the displayed page
    page: usize,

    /// Results of the displayed page
    results: Arc<Vec<SearchResult>>,

    /// Selected result index
    selected: usize,

    /// Whether we should quit
    should_quit: bool,

    /// Last search time
    last_search_time: Duration,

    /// Status message
    status_message: Option<String>,
}

impl TuiApp {
    fn new(app: App, from: Option<String>, to: Option<String>) -> Self {
        TuiApp {
            app,
            from,
            to,
            query_string: String::new(),
            pages: None,
            page: 1,
            results: Arc::new(Vec::new()),
            selected: 0,
            should_quit: false,
            last_search_time: Duration::ZERO,
            status_message: None,
        }
    }

    /// Run a new search with the current terms.
    fn search(&mut self) {
        let terms = self.query_string.trim();
        if terms.is_empty() {
            self.status_message = Some("Type some search terms first".to_string());
            return;
        }

        let pages = parse_query(terms, self.from.as_deref(), self.to.as_deref())
            .and_then(|query| self.app.pages(query));
        match pages {
            Ok(pages) => {
                self.pages = Some(pages);
                self.show_page(1);
            }
            Err(e) => {
                self.status_message = Some(format!("Invalid query: {}", e));
                self.pages = None;
                self.results = Arc::new(Vec::new());
            }
        }
    }

    /// Display page `page` of the current search.
    ///
    /// Returns false if the page could not be shown.
    fn show_page(&mut self, page: usize) -> bool {
        let Some(pages) = &self.pages else {
            return false;
        };

        let start = Instant::now();
        match pages.page(page) {
            Ok(results) => {
                if results.is_empty() && page > 1 {
                    self.status_message = Some("No more results".to_string());
                    return false;
                }
                self.last_search_time = start.elapsed();
                self.results = results;
                self.page = page;
                self.selected = 0;
                self.status_message = None;
                true
            }
            Err(e) => {
                self.status_message = Some(format!("Search failed: {}", e));
                false
            }
        }
    }

    fn next_page(&mut self) {
        self.show_page(self.page + 1);
    }

    fn previous_page(&mut self) {
        if self.page > 1 {
            self.show_page(self.page - 1);
        }
    }

    /// Handle input character.
    fn on_char(&mut self, c: char) {
        self.query_string.push(c);
    }

    /// Handle backspace.
    fn on_backspace(&mut self) {
        self.query_string.pop();
    }

    /// Move selection up.
    fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Move selection down.
    fn select_next(&mut self) {
        if self.selected + 1 < self.results.len() {
            self.selected += 1;
        }
    }

    fn selected_result(&self) -> Option<&SearchResult> {
        self.results.get(self.selected)
    }
}

/// Run the TUI application.
pub fn run(config: Config, from: Option<&str>, to: Option<&str>) -> anyhow::Result<()> {
    // Reject bad bounds before touching the terminal
    parse_query("", from, to)?;
    let app = App::new(config)?;

    if app.index.is_empty() {
        eprintln!("Index is empty. Run 'wasp index' first.");
        return Ok(());
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut tui_app = TuiApp::new(app, from.map(String::from), to.map(String::from));

    let result = run_loop(&mut terminal, &mut tui_app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Main event loop.
fn run_loop<B: Backend>(terminal: &mut Terminal<B>, app: &mut TuiApp) -> anyhow::Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Esc => {
                            app.should_quit = true;
                        }
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            app.should_quit = true;
                        }
                        KeyCode::Char(c) => {
                            app.on_char(c);
                        }
                        KeyCode::Backspace => {
                            app.on_backspace();
                        }
                        KeyCode::Enter => {
                            app.search();
                        }
                        KeyCode::Up => {
                            app.select_previous();
                        }
                        KeyCode::Down => {
                            app.select_next();
                        }
                        KeyCode::PageUp => {
                            app.previous_page();
                        }
                        KeyCode::PageDown => {
                            app.next_page();
                        }
                        _ => {}
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Split a snippet into plain and highlighted parts.
fn snippet_parts(snippet: &str) -> Vec<(bool, &str)> {
    let mut parts = Vec::new();
    let mut rest = snippet;
    while let Some(start) = rest.find(PRE_TAG) {
        let after = &rest[start + PRE_TAG.len()..];
        let Some(end) = after.find(POST_TAG) else {
            break;
        };
        if start > 0 {
            parts.push((false, &rest[..start]));
        }
        parts.push((true, &after[..end]));
        rest = &after[end + POST_TAG.len()..];
    }
    if !rest.is_empty() {
        parts.push((false, rest));
    }
    parts
}

mod ui {
    use super::*;

    /// Draw the UI.
    pub fn draw(f: &mut Frame, app: &mut TuiApp) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3),      // Search box
                Constraint::Percentage(60), // Results
                Constraint::Min(5),         // Selected page
                Constraint::Length(1),      // Status bar
            ])
            .split(f.area());

        draw_search_box(f, app, chunks[0]);
        draw_results(f, app, chunks[1]);
        draw_detail(f, app, chunks[2]);
        draw_status_bar(f, app, chunks[3]);
    }

    /// Draw the search input box.
    fn draw_search_box(f: &mut Frame, app: &TuiApp, area: Rect) {
        let window = match (&app.from, &app.to) {
            (None, None) => String::new(),
            (from, to) => format!(
                " [{} .. {}]",
                from.as_deref().unwrap_or("*"),
                to.as_deref().unwrap_or("*")
            ),
        };
        let input = Paragraph::new(app.query_string.as_str())
            .style(Style::default().fg(Color::Yellow))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" Search (Enter to run){} ", window)),
            );
        f.render_widget(input, area);

        f.set_cursor_position(Position::new(
            area.x + app.query_string.chars().count() as u16 + 1,
            area.y + 1,
        ));
    }

    /// Draw the results list.
    fn draw_results(f: &mut Frame, app: &TuiApp, area: Rect) {
        let items: Vec<ListItem> = app
            .results
            .iter()
            .enumerate()
            .map(|(i, result)| {
                let title = if result.title.is_empty() {
                    "(untitled)"
                } else {
                    result.title.as_str()
                };
                let header = Line::from(vec![
                    Span::styled(title.to_string(), Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(format!("  [{:.2}]", result.score)),
                ]);
                let visit = Line::from(Span::styled(
                    format!(
                        "  {} @ {}",
                        result.matched_request.uri,
                        result.matched_request.date.format("%Y-%m-%d %H:%M:%S")
                    ),
                    Style::default().fg(Color::Green),
                ));
                let mut snippet = vec![Span::raw("  ")];
                for (highlighted, text) in snippet_parts(&result.snippet) {
                    let style = if highlighted {
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
                    } else {
                        Style::default()
                    };
                    snippet.push(Span::styled(text.to_string(), style));
                }

                let style = if i == app.selected {
                    Style::default().bg(Color::Blue).fg(Color::White)
                } else {
                    Style::default()
                };
                ListItem::new(vec![header, visit, Line::from(snippet)]).style(style)
            })
            .collect();

        let title = format!(
            " Results - page {} ({} shown, {:.1}ms) ",
            app.page,
            app.results.len(),
            app.last_search_time.as_secs_f64() * 1000.0
        );
        let results = List::new(items).block(Block::default().borders(Borders::ALL).title(title));

        let mut state = ListState::default();
        state.select((!app.results.is_empty()).then_some(app.selected));
        f.render_stateful_widget(results, area, &mut state);
    }

    /// Draw the content of the selected page.
    fn draw_detail(f: &mut Frame, app: &TuiApp, area: Rect) {
        let content = app
            .selected_result()
            .map(|r| r.content.as_str())
            .unwrap_or("");
        let detail = Paragraph::new(content)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title(" Page "));
        f.render_widget(detail, area);
    }

    /// Draw the status bar.
    fn draw_status_bar(f: &mut Frame, app: &TuiApp, area: Rect) {
        let status = if let Some(ref msg) = app.status_message {
            msg.clone()
        } else {
            let stats = app.app.index.stats();
            format!(
                "Index: {} pages, {} requests | Enter:Search PgUp/PgDn:Page Up/Down:Select Esc:Quit",
                stats.pages, stats.requests
            )
        };

        let status_bar = Paragraph::new(status).style(Style::default().fg(Color::Gray));
        f.render_widget(status_bar, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_parts() {
        assert_eq!(
            snippet_parts("welcome to <em>webis</em> ... <em>webis</em> group"),
            vec![
                (false, "welcome to "),
                (true, "webis"),
                (false, " ... "),
                (true, "webis"),
                (false, " group"),
            ]
        );
        assert_eq!(snippet_parts("plain"), vec![(false, "plain")]);
        assert_eq!(snippet_parts("open <em>tag"), vec![(false, "open <em>tag")]);
        assert!(snippet_parts("").is_empty());
    }
}

use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::feed::{FeedItem, FeedKind, FeedState, ToastLevel};
use crate::navigation::GalleryCursor;
use crate::reel::PlaybackState;

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);
const COLOR_LIKED: Color = Color::Rgb(245, 194, 231);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const ICON_LIKES: &str = "♥";
const ICON_COMMENTS: &str = "✉";
const ICON_SHARES: &str = "↗";
const ICON_MUSIC: &str = "♪";
const MAX_COMMENTS_SHOWN: usize = 20;

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

pub struct Options {
    pub feed: FeedState,
    /// Terminal rows are converted to pixels so drag distances line up with
    /// the swipe threshold.
    pub row_height_px: f64,
    pub status_message: String,
}

pub struct Model {
    feed: FeedState,
    row_height_px: f64,
    status_message: String,
    composer: Option<String>,
    list_state: ListState,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let mut model = Self {
            feed: opts.feed,
            row_height_px: if opts.row_height_px.is_finite() && opts.row_height_px > 0.0 {
                opts.row_height_px
            } else {
                1.0
            },
            status_message: opts.status_message,
            composer: None,
            list_state: ListState::default(),
            spinner: Spinner::new(),
            needs_redraw: true,
        };
        model.feed.refresh();
        model.feed.load_profile();
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {}", err);
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => {
                        if let Err(err) = self.handle_mouse(mouse) {
                            self.status_message = format!("Error: {}", err);
                            self.mark_dirty();
                        }
                    }
                    Event::Resize(..) => self.mark_dirty(),
                    _ => {}
                }
            }

            if self.poll_async() {
                self.mark_dirty();
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                let mut ticked = self.feed.prune_toasts(Instant::now());
                if self.feed.is_loading() && self.spinner.advance() {
                    ticked = true;
                } else if !self.feed.is_loading() {
                    self.spinner.reset();
                }
                if ticked {
                    self.mark_dirty();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn poll_async(&mut self) -> bool {
        let changed = self.feed.poll_async();
        if self.feed.take_feed_installed() {
            self.feed.load_comments();
        }
        changed
    }

    fn selection_changed(&mut self) {
        self.feed.clear_failed_comments();
        self.feed.load_comments();
        self.mark_dirty();
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        if self.composer.is_some() {
            self.handle_composer_key(code);
            return Ok(false);
        }

        let mut dirty = true;
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down => {
                if self.feed.next_item() {
                    self.selection_changed();
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if self.feed.previous_item() {
                    self.selection_changed();
                }
            }
            KeyCode::Char('l') | KeyCode::Right => {
                self.feed.gallery_next();
            }
            KeyCode::Char('h') | KeyCode::Left => {
                self.feed.gallery_previous();
            }
            KeyCode::Char(ch @ '1'..='9') => {
                let index = ch.to_digit(10).map(|d| d as usize - 1).unwrap_or(0);
                match self.feed.kind() {
                    FeedKind::Posts => {
                        if let Err(err) = self.feed.gallery_jump(index) {
                            self.status_message =
                                format!("Can't jump to image {}: {err}", index + 1);
                        }
                    }
                    FeedKind::Reels => match self.feed.reel_jump(index) {
                        Ok(true) => self.selection_changed(),
                        Ok(false) => {}
                        Err(err) => {
                            self.status_message =
                                format!("Can't jump to reel {}: {err}", index + 1)
                        }
                    },
                }
            }
            KeyCode::Char('L') => self.feed.toggle_like(),
            KeyCode::Char('c') => {
                if self.feed.current().is_some() {
                    self.composer = Some(String::new());
                }
            }
            KeyCode::Char('s') => self.share_current(),
            KeyCode::Char('o') => self.open_current(),
            KeyCode::Char('r') | KeyCode::Char('R') => {
                self.status_message = format!("Refreshing {}…", self.feed.kind().label());
                self.feed.refresh();
            }
            KeyCode::Tab | KeyCode::BackTab => {
                let next = match self.feed.kind() {
                    FeedKind::Posts => FeedKind::Reels,
                    FeedKind::Reels => FeedKind::Posts,
                };
                self.feed.switch_to(next);
                self.status_message = format!("Showing {}.", next.label());
                self.selection_changed();
            }
            _ => dirty = false,
        }

        if dirty {
            self.mark_dirty();
        }
        Ok(false)
    }

    fn handle_composer_key(&mut self, code: KeyCode) {
        let Some(buffer) = self.composer.as_mut() else {
            return;
        };
        match code {
            KeyCode::Esc => {
                self.composer = None;
                self.status_message = "Comment discarded.".to_string();
            }
            KeyCode::Enter => {
                let text = std::mem::take(buffer);
                self.composer = None;
                self.feed.comment(&text);
            }
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Char(ch) => buffer.push(ch),
            _ => return,
        }
        self.mark_dirty();
    }

    fn handle_mouse(&mut self, event: MouseEvent) -> Result<()> {
        if self.composer.is_some() {
            return Ok(());
        }

        let y = f64::from(event.row) * self.row_height_px;
        let changed = match event.kind {
            MouseEventKind::ScrollDown => self.feed.wheel(1.0),
            MouseEventKind::ScrollUp => self.feed.wheel(-1.0),
            MouseEventKind::Down(MouseButton::Left) => {
                self.feed.touch_start(y);
                false
            }
            MouseEventKind::Up(MouseButton::Left) => self.feed.touch_end(y),
            _ => false,
        };
        if changed {
            self.selection_changed();
        }

        Ok(())
    }

    fn share_current(&mut self) {
        let Some(link) = self.feed.share() else {
            return;
        };
        match copy_to_clipboard(&link) {
            Ok(()) => self.status_message = "Link copied to clipboard.".to_string(),
            Err(err) => self.status_message = format!("{err:#} (URL: {link})"),
        }
    }

    fn open_current(&mut self) {
        let Some(url) = self
            .feed
            .current()
            .and_then(FeedItem::current_url)
            .map(str::to_string)
        else {
            self.status_message = "Nothing to open.".to_string();
            return;
        };
        match webbrowser::open(&url) {
            Ok(_) => self.status_message = "Opened media in your browser.".to_string(),
            Err(err) => self.status_message = format!("Failed to open media: {err} (URL: {url})"),
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(full);

        frame.render_widget(self.header_line(), layout[0]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
            .split(layout[1]);
        self.draw_items(frame, body[0]);
        self.draw_detail(frame, body[1]);

        frame.render_widget(self.status_line(), layout[2]);

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(footer, layout[3]);
    }

    fn header_line(&self) -> Paragraph<'static> {
        let mut spans = Vec::new();
        for kind in [FeedKind::Posts, FeedKind::Reels] {
            let style = if kind == self.feed.kind() {
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
            } else {
                Style::default().fg(COLOR_TEXT_SECONDARY)
            };
            spans.push(Span::styled(format!(" {} ", kind.label()), style));
        }
        if self.feed.is_loading() {
            spans.push(Span::raw(format!(" {}", self.spinner.frame())));
        }
        let who = match self.feed.profile() {
            Some(profile) => format!("  @{}", profile.display_name()),
            None if self.feed.is_signed_in() => "  signed in".to_string(),
            None => "  browsing anonymously".to_string(),
        };
        spans.push(Span::styled(who, Style::default().fg(COLOR_TEXT_SECONDARY)));
        Paragraph::new(Line::from(spans)).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG),
        )
    }

    fn status_line(&self) -> Paragraph<'static> {
        if let Some(buffer) = &self.composer {
            return Paragraph::new(format!("Comment: {buffer}▏")).style(
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .bg(COLOR_PANEL_SELECTED_BG),
            );
        }
        let (text, color) = match self.feed.latest_toast() {
            Some(toast) => (
                toast.message.clone(),
                match toast.level {
                    ToastLevel::Info => COLOR_SUCCESS,
                    ToastLevel::Error => COLOR_ERROR,
                },
            ),
            None => (self.status_message.clone(), COLOR_TEXT_PRIMARY),
        };
        Paragraph::new(text).style(
            Style::default()
                .fg(color)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        )
    }

    fn pane_block(title: String) -> Block<'static> {
        Block::default()
            .title(Span::styled(
                title,
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER_IDLE))
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::horizontal(1))
    }

    fn draw_items(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = Self::pane_block(self.feed.kind().label().to_string());
        let inner_width = block.inner(area).width as usize;
        let items: Vec<ListItem> = self
            .feed
            .items()
            .iter()
            .map(|item| {
                let counters = self.feed.counters(&item.target);
                let like_style = if counters.liked {
                    Style::default().fg(COLOR_LIKED)
                } else {
                    Style::default().fg(COLOR_TEXT_SECONDARY)
                };
                let author = if item.author.is_empty() {
                    "unknown".to_string()
                } else {
                    format!("@{}", item.author)
                };
                let head = Line::from(vec![
                    Span::styled(
                        author,
                        Style::default()
                            .fg(COLOR_TEXT_PRIMARY)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(" "),
                    Span::styled(
                        format!("{ICON_LIKES} {}", compact_count(counters.like_count)),
                        like_style,
                    ),
                    Span::styled(
                        format!(" {ICON_COMMENTS} {}", compact_count(counters.comment_count)),
                        Style::default().fg(COLOR_TEXT_SECONDARY),
                    ),
                ]);
                let caption = truncate_to_width(
                    item.caption.lines().next().unwrap_or_default(),
                    inner_width,
                );
                ListItem::new(Text::from(vec![
                    head,
                    Line::styled(caption, Style::default().fg(COLOR_TEXT_SECONDARY)),
                ]))
            })
            .collect();

        if items.is_empty() {
            let message = if self.feed.is_loading() {
                "Loading…"
            } else {
                "Nothing here yet. Press r to refresh."
            };
            frame.render_widget(Paragraph::new(message).block(block), area);
            return;
        }

        self.list_state.select(self.feed.selected_index());
        let list = List::new(items).block(block).highlight_style(
            Style::default()
                .bg(COLOR_PANEL_SELECTED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn draw_detail(&self, frame: &mut Frame<'_>, area: Rect) {
        let Some(item) = self.feed.current() else {
            frame.render_widget(Self::pane_block("Detail".to_string()), area);
            return;
        };
        let block = Self::pane_block(format!("{} · {}", item.media.kind.label(), item.target.id));
        let width = block.inner(area).width.max(1) as usize;
        let secondary = Style::default().fg(COLOR_TEXT_SECONDARY);
        let mut lines: Vec<Line<'static>> = Vec::new();

        match item.gallery {
            Some(cursor) if cursor.item_count() > 1 => {
                lines.push(Line::from(vec![
                    Span::styled(
                        indicator_text(&cursor),
                        Style::default().fg(COLOR_ACCENT),
                    ),
                    Span::styled(format!("  {}", cursor.position()), secondary),
                ]));
            }
            _ => {}
        }
        match item.current_url() {
            Some(url) => lines.push(Line::styled(truncate_to_width(url, width), secondary)),
            None => lines.push(Line::styled("No media attached.", secondary)),
        }
        if self.feed.kind() == FeedKind::Reels {
            if let Some(cursor) = self.feed.reel_cursor() {
                let state = cursor.playback(cursor.index());
                lines.push(Line::styled(
                    playback_label(state),
                    Style::default().fg(COLOR_ACCENT),
                ));
            }
        }
        lines.push(Line::default());

        if !item.author.is_empty() {
            lines.push(Line::styled(
                format!("@{}", item.author),
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            ));
        }
        for line in wrap(&item.caption, WrapOptions::new(width)) {
            lines.push(Line::styled(
                line.into_owned(),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            ));
        }
        if let Some(music) = &item.music {
            lines.push(Line::styled(format!("{ICON_MUSIC} {music}"), secondary));
        }
        if let Some(created) = item.created_at {
            lines.push(Line::styled(
                created.format("%Y-%m-%d %H:%M").to_string(),
                secondary,
            ));
        }

        let counters = self.feed.counters(&item.target);
        let like_style = if counters.liked {
            Style::default()
                .fg(COLOR_LIKED)
                .add_modifier(Modifier::BOLD)
        } else {
            secondary
        };
        lines.push(Line::default());
        lines.push(Line::from(vec![
            Span::styled(
                format!("{ICON_LIKES} {}", compact_count(counters.like_count)),
                like_style,
            ),
            Span::styled(
                format!(
                    "   {ICON_COMMENTS} {}   {ICON_SHARES} {}",
                    compact_count(counters.comment_count),
                    compact_count(counters.share_count)
                ),
                secondary,
            ),
        ]));
        lines.push(Line::default());

        match self.feed.comments(&item.target) {
            None => lines.push(Line::styled("Loading comments…", secondary)),
            Some([]) => lines.push(Line::styled("No comments yet.", secondary)),
            Some(comments) => {
                for comment in comments.iter().take(MAX_COMMENTS_SHOWN) {
                    let author = comment
                        .user
                        .as_ref()
                        .map(|user| user.username.clone())
                        .unwrap_or_else(|| comment.user_id.clone());
                    let text = format!("@{author}: {}", comment.content);
                    for line in wrap(&text, WrapOptions::new(width).subsequent_indent("  ")) {
                        lines.push(Line::styled(
                            line.into_owned(),
                            Style::default().fg(COLOR_TEXT_PRIMARY),
                        ));
                    }
                }
                if comments.len() > MAX_COMMENTS_SHOWN {
                    lines.push(Line::styled(
                        format!("… {} more", comments.len() - MAX_COMMENTS_SHOWN),
                        secondary,
                    ));
                }
            }
        }

        frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
    }

    fn footer_text(&self) -> String {
        if self.composer.is_some() {
            return "Enter post comment · Backspace delete · Esc cancel".to_string();
        }

        let mut parts: Vec<String> = Vec::new();
        match self.feed.kind() {
            FeedKind::Posts => {
                parts.push("j/k or wheel move".to_string());
                let has_gallery = self
                    .feed
                    .current()
                    .and_then(|item| item.gallery)
                    .is_some_and(|cursor| cursor.item_count() > 1);
                if has_gallery {
                    parts.push("h/l or 1-9 gallery".to_string());
                }
            }
            FeedKind::Reels => {
                parts.push("j/k, wheel or drag to swipe".to_string());
                parts.push("1-9 jump".to_string());
            }
        }
        parts.push("L like".to_string());
        parts.push("c comment".to_string());
        parts.push("s share".to_string());
        parts.push("o open".to_string());
        parts.push("Tab posts/reels".to_string());
        parts.push("r refresh".to_string());
        parts.push("q quit".to_string());

        parts.join(" · ")
    }
}

fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|err| anyhow!("open clipboard: {}", err))?;
    clipboard
        .set_text(text.to_string())
        .map_err(|err| anyhow!("copy link: {}", err))?;
    Ok(())
}

fn indicator_text(cursor: &GalleryCursor) -> String {
    cursor
        .indicators()
        .map(|active| if active { "●" } else { "○" })
        .collect::<Vec<_>>()
        .join(" ")
}

fn playback_label(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Idle => "▷ idle",
        PlaybackState::Playing { muted: false } => "▶ playing",
        PlaybackState::Playing { muted: true } => "▶ playing (muted)",
        PlaybackState::Stalled => "■ playback blocked",
    }
}

fn compact_count(value: u64) -> String {
    match value {
        0..=9_999 => value.to_string(),
        10_000..=999_999 => format!("{:.1}k", value as f64 / 1_000.0),
        _ => format!("{:.1}M", value as f64 / 1_000_000.0),
    }
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let budget = width.saturating_sub(1);
    let mut used = 0;
    let mut out = String::new();
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}

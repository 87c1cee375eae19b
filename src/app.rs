use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::*,
};

use crate::args::Options;
use crate::convert::{BookMetadata, ConversionSettings, Converter};
use crate::error::ConvertError;
use crate::logging::LogBuffer;
use crate::rewrite::{Markup, PatternRule, PreviewItem, RulePipeline, SpanKind};
use crate::rules_file;
use crate::scan::{AudioFile, FfprobeProbe};

const LOG_LINES: u16 = 8;

/// Display style of a preview span.
pub fn span_style(kind: SpanKind) -> Style {
    match kind {
        SpanKind::Plain => Style::default(),
        SpanKind::Insertion => Style::default()
            .fg(Color::Rgb(0x28, 0xa7, 0x45))
            .bg(Color::Rgb(0xE6, 0xFF, 0xE6)),
        SpanKind::Removal => Style::default()
            .fg(Color::Rgb(0xFF, 0x00, 0x00))
            .bg(Color::Rgb(0xFF, 0xE6, 0xE6))
            .add_modifier(Modifier::CROSSED_OUT),
    }
}

pub fn markup_spans(markup: &Markup) -> Vec<Span<'static>> {
    markup
        .spans
        .iter()
        .map(|s| Span::styled(s.text.clone(), span_style(s.kind)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Focus {
    #[default]
    Chapters,
    Rules,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleField {
    Match,
    Replacement,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum Mode {
    #[default]
    Normal,
    /// The rule is edited in place so the preview follows every keystroke.
    EditRule {
        index: usize,
        field: RuleField,
        saved: PatternRule,
        is_new: bool,
    },
    EditTitle {
        index: usize,
        buffer: String,
    },
}

struct ConversionJob {
    handle: JoinHandle<std::result::Result<(), ConvertError>>,
    stop: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct App {
    running: bool,
    input_dir: PathBuf,
    files: Vec<AudioFile>,
    originals: Vec<String>,
    /// Hand-edited titles by chapter index, applied after the rules.
    overrides: HashMap<usize, String>,
    pipeline: RulePipeline,
    preview: Vec<PreviewItem>,
    resolved: Vec<String>,
    rules_path: Option<PathBuf>,
    output: Option<PathBuf>,
    settings: ConversionSettings,
    metadata: BookMetadata,
    dry_run: bool,
    focus: Focus,
    mode: Mode,
    chapter_state: ListState,
    rule_state: ListState,
    logs: LogBuffer,
    status: String,
    job: Option<ConversionJob>,
}

impl App {
    pub fn new(
        args: &Options,
        files: Vec<AudioFile>,
        pipeline: RulePipeline,
        logs: LogBuffer,
    ) -> Self {
        let originals = files.iter().map(|f| f.title.clone()).collect();
        let mut app = Self {
            running: false,
            input_dir: args.input_dir.clone(),
            files,
            originals,
            pipeline,
            rules_path: args.rules.clone(),
            output: args.output.clone(),
            settings: args.settings(),
            metadata: args.metadata(),
            dry_run: args.dry_run,
            logs,
            ..Default::default()
        };
        app.chapter_state.select(Some(0));
        if !app.pipeline.is_empty() {
            app.rule_state.select(Some(0));
        }
        app.refresh_preview();
        app
    }

    pub fn run(&mut self, mut terminal: DefaultTerminal) -> Result<()> {
        self.running = true;
        while self.running {
            terminal.draw(|f| {
                self.render(f);
            })?;
            self.poll_job();
            self.handle_crossterm_event()?;
        }
        self.stop_conversion();
        if let Some(job) = self.job.take() {
            let _ = job.handle.join();
        }
        Ok(())
    }

    fn refresh_preview(&mut self) {
        self.preview = self.pipeline.preview_all(&self.originals);
        self.resolved = self.pipeline.resolve_all(&self.originals);
    }

    /// Titles handed to the converter: rule output, then hand edits.
    pub fn final_titles(&self) -> Vec<String> {
        self.resolved
            .iter()
            .enumerate()
            .map(|(i, title)| self.overrides.get(&i).unwrap_or(title).clone())
            .collect()
    }

    pub fn pipeline(&self) -> &RulePipeline {
        &self.pipeline
    }

    fn render(&mut self, frame: &mut Frame) {
        let chunks = self.get_layout_chunks(frame.area());
        self.render_title(frame, chunks[0]);
        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        self.render_chapters(frame, panes[0]);
        self.render_rules(frame, panes[1]);
        self.render_logs(frame, chunks[2]);
        self.render_footer(frame, chunks[3]);
    }

    fn get_layout_chunks(&self, area: Rect) -> Vec<Rect> {
        Layout::default()
            .direction(Direction::Vertical)
            .constraints(
                [
                    Constraint::Length(1),
                    Constraint::Min(3),
                    Constraint::Length(LOG_LINES + 2),
                    Constraint::Length(1),
                ]
                .as_ref(),
            )
            .split(area)
            .to_vec()
    }

    fn pane_block(&self, title: &str, focus: Focus) -> Block<'static> {
        let border = if self.focus == focus {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        Block::default()
            .title(title.to_string())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(border)
    }

    fn render_title(&self, frame: &mut Frame, area: Rect) {
        let label = format!(
            "{} ({} chapters)",
            self.input_dir.to_str().unwrap_or("m4btui"),
            self.files.len()
        );
        let title = Paragraph::new(label).style(Style::default().fg(Color::White));
        frame.render_widget(title, area);
    }

    fn render_chapters(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .preview
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let mut spans = vec![Span::styled(
                    format!("{:>3} ", i + 1),
                    Style::default().fg(Color::DarkGray),
                )];
                if let Some(edited) = self.overrides.get(&i) {
                    spans.push(Span::styled(
                        edited.clone(),
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::ITALIC),
                    ));
                } else {
                    match &item.markup {
                        Some(markup) => spans.extend(markup_spans(markup)),
                        None => spans.push(Span::raw(item.text.clone())),
                    }
                }
                ListItem::new(Line::from(spans))
            })
            .collect();
        let list = List::new(items)
            .block(self.pane_block(" Chapters ", Focus::Chapters))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, area, &mut self.chapter_state);
    }

    fn render_rules(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .pipeline
            .rules()
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                let style = if !rule.is_active() {
                    Style::default().fg(Color::DarkGray)
                } else if rule.compile().is_err() {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(vec![
                    Span::raw(format!("{}. ", i + 1)),
                    Span::styled(format!("/{}/", rule.pattern), style),
                    Span::raw(" -> "),
                    Span::raw(format!("\"{}\"", rule.replacement)),
                ]))
            })
            .collect();
        let list = List::new(items)
            .block(self.pane_block(" Rules ", Focus::Rules))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        frame.render_stateful_widget(list, area, &mut self.rule_state);
    }

    fn render_logs(&self, frame: &mut Frame, area: Rect) {
        let lines: Vec<Line> = self
            .logs
            .tail(LOG_LINES as usize)
            .into_iter()
            .map(Line::from)
            .collect();
        let p = Paragraph::new(Text::from(lines)).block(
            Block::default()
                .title(" Log ")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        );
        frame.render_widget(p, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let hint = match &self.mode {
            Mode::Normal if !self.status.is_empty() => format!(" {} ", self.status),
            Mode::Normal => " quit (q) | focus (tab) | add (a) | delete (d) | move (K/J) | edit (enter) | edit title (e) | reset (r) | save (s) | convert (c) | stop (x) ".to_string(),
            Mode::EditRule { field, index, .. } => {
                let rule = self.pipeline.rules().get(*index).cloned().unwrap_or_default();
                match field {
                    RuleField::Match => format!(" match: {}_  (tab: replacement, enter: done, esc: cancel)", rule.pattern),
                    RuleField::Replacement => format!(" replacement: {}_  (tab: match, enter: done, esc: cancel)", rule.replacement),
                }
            }
            Mode::EditTitle { buffer, .. } => format!(" title: {}_  (enter: done, esc: cancel)", buffer),
        };
        let footer = Paragraph::new(hint)
            .alignment(Alignment::Left)
            .wrap(Wrap { trim: true })
            .style(Style::default());
        frame.render_widget(footer, area);
    }

    fn handle_crossterm_event(&mut self) -> Result<()> {
        // poll so the log console keeps up with a running conversion
        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key_event) = event::read()? {
                if key_event.kind == KeyEventKind::Press {
                    self.handle_key(key_event);
                }
            }
        }
        Ok(())
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match self.mode {
            Mode::Normal => self.handle_normal_key(key.code),
            Mode::EditRule { .. } => self.handle_rule_edit_key(key.code),
            Mode::EditTitle { .. } => self.handle_title_edit_key(key.code),
        }
    }

    fn handle_normal_key(&mut self, code: KeyCode) {
        self.status.clear();
        match code {
            KeyCode::Char('q') => self.running = false,
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Chapters => Focus::Rules,
                    Focus::Rules => Focus::Chapters,
                }
            }
            KeyCode::Char('j') | KeyCode::Down => self.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.select_prev(),
            KeyCode::Char('a') => self.add_rule(),
            KeyCode::Char('d') if self.focus == Focus::Rules => self.remove_rule(),
            KeyCode::Char('K') if self.focus == Focus::Rules => self.move_rule_up(),
            KeyCode::Char('J') if self.focus == Focus::Rules => self.move_rule_down(),
            KeyCode::Enter => match self.focus {
                Focus::Rules => self.begin_rule_edit(false),
                Focus::Chapters => self.begin_title_edit(),
            },
            KeyCode::Char('e') if self.focus == Focus::Chapters => self.begin_title_edit(),
            KeyCode::Char('r') if self.focus == Focus::Chapters => self.reset_title(),
            KeyCode::Char('s') => self.save_rules(),
            KeyCode::Char('c') => self.start_conversion(),
            KeyCode::Char('x') => self.stop_conversion(),
            _ => {}
        }
    }

    fn select_next(&mut self) {
        let (state, len) = self.focused_list();
        if len == 0 {
            return;
        }
        let next = state.selected().map_or(0, |i| (i + 1).min(len - 1));
        state.select(Some(next));
    }

    fn select_prev(&mut self) {
        let (state, len) = self.focused_list();
        if len == 0 {
            return;
        }
        let prev = state.selected().map_or(0, |i| i.saturating_sub(1));
        state.select(Some(prev));
    }

    fn focused_list(&mut self) -> (&mut ListState, usize) {
        match self.focus {
            Focus::Chapters => (&mut self.chapter_state, self.files.len()),
            Focus::Rules => (&mut self.rule_state, self.pipeline.len()),
        }
    }

    fn add_rule(&mut self) {
        let index = self.pipeline.push(PatternRule::default());
        self.focus = Focus::Rules;
        self.rule_state.select(Some(index));
        self.begin_rule_edit(true);
    }

    fn remove_rule(&mut self) {
        let Some(index) = self.rule_state.selected() else {
            return;
        };
        if self.pipeline.remove(index).is_some() {
            let len = self.pipeline.len();
            self.rule_state
                .select((len > 0).then(|| index.min(len - 1)));
            self.refresh_preview();
        }
    }

    fn move_rule_up(&mut self) {
        if let Some(index) = self.rule_state.selected() {
            if self.pipeline.move_up(index) {
                self.rule_state.select(Some(index - 1));
                self.refresh_preview();
            }
        }
    }

    fn move_rule_down(&mut self) {
        if let Some(index) = self.rule_state.selected() {
            if self.pipeline.move_down(index) {
                self.rule_state.select(Some(index + 1));
                self.refresh_preview();
            }
        }
    }

    fn begin_rule_edit(&mut self, is_new: bool) {
        let Some(index) = self.rule_state.selected() else {
            return;
        };
        let Some(rule) = self.pipeline.rules().get(index) else {
            return;
        };
        self.mode = Mode::EditRule {
            index,
            field: RuleField::Match,
            saved: rule.clone(),
            is_new,
        };
    }

    fn handle_rule_edit_key(&mut self, code: KeyCode) {
        let Mode::EditRule {
            index,
            field,
            ref saved,
            is_new,
        } = self.mode
        else {
            return;
        };
        match code {
            KeyCode::Tab => {
                let field = match field {
                    RuleField::Match => RuleField::Replacement,
                    RuleField::Replacement => RuleField::Match,
                };
                if let Mode::EditRule { field: current, .. } = &mut self.mode {
                    *current = field;
                }
                return;
            }
            KeyCode::Enter => self.mode = Mode::Normal,
            KeyCode::Esc => {
                let saved = saved.clone();
                if is_new {
                    self.pipeline.remove(index);
                    let len = self.pipeline.len();
                    self.rule_state.select(len.checked_sub(1));
                } else if let Some(rule) = self.pipeline.get_mut(index) {
                    *rule = saved;
                }
                self.mode = Mode::Normal;
            }
            KeyCode::Backspace | KeyCode::Char(_) => {
                if let Some(rule) = self.pipeline.get_mut(index) {
                    let text = match field {
                        RuleField::Match => &mut rule.pattern,
                        RuleField::Replacement => &mut rule.replacement,
                    };
                    match code {
                        KeyCode::Char(c) => text.push(c),
                        _ => {
                            text.pop();
                        }
                    }
                }
            }
            _ => return,
        }
        self.refresh_preview();
    }

    fn begin_title_edit(&mut self) {
        let Some(index) = self.chapter_state.selected() else {
            return;
        };
        let Some(current) = self.final_titles().get(index).cloned() else {
            return;
        };
        self.mode = Mode::EditTitle {
            index,
            buffer: current,
        };
    }

    fn handle_title_edit_key(&mut self, code: KeyCode) {
        let Mode::EditTitle { index, buffer } = &mut self.mode else {
            return;
        };
        match code {
            KeyCode::Char(c) => buffer.push(c),
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Enter => {
                let (index, buffer) = (*index, std::mem::take(buffer));
                if self.resolved.get(index) == Some(&buffer) {
                    self.overrides.remove(&index);
                } else {
                    tracing::info!(
                        "Chapter {} renamed: {} -> {}",
                        index + 1,
                        self.originals[index],
                        buffer
                    );
                    self.overrides.insert(index, buffer);
                }
                self.mode = Mode::Normal;
            }
            KeyCode::Esc => self.mode = Mode::Normal,
            _ => {}
        }
    }

    fn reset_title(&mut self) {
        if let Some(index) = self.chapter_state.selected() {
            if self.overrides.remove(&index).is_some() {
                self.status = format!("chapter {} reset to its rule output", index + 1);
            }
        }
    }

    fn save_rules(&mut self) {
        let Some(path) = &self.rules_path else {
            self.status = "no --rules file given, nothing saved".to_string();
            return;
        };
        self.status = match rules_file::save(path, &self.pipeline) {
            Ok(()) => format!("saved {} rules to {}", self.pipeline.len(), path.display()),
            Err(err) => {
                tracing::error!("{}", err);
                err.to_string()
            }
        };
    }

    fn start_conversion(&mut self) {
        if self.job.is_some() {
            self.status = "a conversion is already running".to_string();
            return;
        }
        let titles = self.final_titles();
        if self.dry_run {
            for (i, title) in titles.iter().enumerate() {
                tracing::info!("Chapter {}: {}", i + 1, title);
            }
            self.status = "dry run, ffmpeg not started".to_string();
            return;
        }
        let Some(output) = self.output.clone() else {
            self.status = "no --output given".to_string();
            return;
        };

        let converter = Converter::new(self.settings.clone(), self.metadata.clone());
        let stop = converter.stop_handle();
        let files = self.files.clone();
        let handle = thread::spawn(move || converter.run(&files, &titles, &output, &FfprobeProbe));
        tracing::info!("Starting conversion");
        self.status = "converting, press x to stop".to_string();
        self.job = Some(ConversionJob { handle, stop });
    }

    fn stop_conversion(&mut self) {
        if let Some(job) = &self.job {
            job.stop.store(true, Ordering::SeqCst);
        }
    }

    fn poll_job(&mut self) {
        if !self.job.as_ref().is_some_and(|job| job.handle.is_finished()) {
            return;
        }
        let Some(job) = self.job.take() else {
            return;
        };
        self.status = match job.handle.join() {
            Ok(Ok(())) => "conversion finished".to_string(),
            Ok(Err(err)) => {
                tracing::error!("Error during conversion: {}", err);
                err.to_string()
            }
            Err(_) => {
                tracing::error!("conversion thread panicked");
                "conversion failed".to_string()
            }
        };
    }
}

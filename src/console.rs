//! # Console Interface Module
//!
//! Interactive terminal view of one running session.
//!
//! ## Features
//! - LED intensity gauges fed by the session's circuit updates
//! - Buttons bound to number keys; a key press toggles `pressed`
//! - Tail of the most recent events and log lines
//! - `q` stops the session and leaves the view

use crossterm::{
    event::{self, Event as TermEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
    Frame, Terminal,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use std::collections::VecDeque;
use std::io;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};

use crate::component::{Circuit, ComponentKind};
use crate::event::{EventBody, IntensityMap, LogRecord, SessionMessage, SessionOutput};
use crate::scheduler::Simulator;
use crate::system_config::CircuitDescription;
use crate::types::SessionKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub refresh_rate_ms: u64,
    /// Number of recent records kept on screen.
    pub event_tail: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            refresh_rate_ms: 100,
            event_tail: 12,
        }
    }
}

/// One line of the record tail.
pub fn describe(record: &LogRecord) -> String {
    match record {
        LogRecord::Log { message } => message.trim_end().to_string(),
        LogRecord::Event(event) => {
            let what = match &event.body {
                EventBody::Loop { phase } => format!("loop {:?}", phase).to_lowercase(),
                EventBody::DigitalWrite { pin, value } => format!("digitalWrite {} = {}", pin, value),
                EventBody::Delay { ms } => format!("delay {} ms", ms),
                EventBody::Led { id, on, brightness } => format!(
                    "led {} {} ({:.2})",
                    id,
                    if *on { "on" } else { "off" },
                    brightness
                ),
                EventBody::Button { id, pressed } => format!(
                    "button {} {}",
                    id,
                    if *pressed { "pressed" } else { "released" }
                ),
            };
            format!("{:>8} ms  {}", event.timestamp_ms, what)
        }
    }
}

/// What the console shows, kept apart from the terminal so it can be driven
/// without one.
#[derive(Debug, Clone)]
pub struct ConsoleView {
    leds: Vec<String>,
    buttons: Vec<(String, bool)>,
    intensities: IntensityMap,
    tail: VecDeque<String>,
    tail_len: usize,
    finished: bool,
}

impl ConsoleView {
    pub fn new(description: &CircuitDescription, tail_len: usize) -> Self {
        let circuit = Circuit::new(description);
        let of_kind = |kind: ComponentKind| {
            circuit
                .components()
                .iter()
                .filter(|c| c.kind == kind)
                .map(|c| (c.id.clone(), c.is_pressed()))
                .collect::<Vec<_>>()
        };
        ConsoleView {
            leds: of_kind(ComponentKind::Led).into_iter().map(|(id, _)| id).collect(),
            buttons: of_kind(ComponentKind::Button),
            intensities: IntensityMap::new(),
            tail: VecDeque::new(),
            tail_len,
            finished: false,
        }
    }

    pub fn apply(&mut self, message: &SessionMessage) {
        match &message.output {
            SessionOutput::Started => self.finished = false,
            SessionOutput::Finished => self.finished = true,
            SessionOutput::Circuit(intensities) => self.intensities = intensities.clone(),
            SessionOutput::Record(record) => {
                self.tail.push_back(describe(record));
                while self.tail.len() > self.tail_len {
                    self.tail.pop_front();
                }
            }
        }
    }

    /// Flip the button bound to `index`; returns its id and new state.
    pub fn toggle_button(&mut self, index: usize) -> Option<(String, bool)> {
        let (id, pressed) = self.buttons.get_mut(index)?;
        *pressed = !*pressed;
        Some((id.clone(), *pressed))
    }

    pub fn intensity(&self, id: &str) -> f64 {
        self.intensities.get(id).copied().unwrap_or(0.0)
    }

    pub fn leds(&self) -> &[String] {
        &self.leds
    }

    pub fn buttons(&self) -> &[(String, bool)] {
        &self.buttons
    }

    pub fn tail(&self) -> impl Iterator<Item = &String> {
        self.tail.iter()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

type ConsoleTerminal = Terminal<CrosstermBackend<io::Stdout>>;

fn open_terminal() -> io::Result<ConsoleTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

fn close_terminal(terminal: &mut ConsoleTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

/// Terminal front end bound to one session.
pub struct ConsoleApp {
    simulator: Simulator,
    key: SessionKey,
    config: ConsoleConfig,
    view: ConsoleView,
    history: Vec<LogRecord>,
    running: bool,
}

impl ConsoleApp {
    pub fn new(
        simulator: Simulator,
        key: SessionKey,
        description: &CircuitDescription,
        config: ConsoleConfig,
    ) -> Self {
        let view = ConsoleView::new(description, config.event_tail);
        Self {
            simulator,
            key,
            config,
            view,
            history: Vec::new(),
            running: false,
        }
    }

    /// Every record seen so far, in arrival order.
    pub fn history(&self) -> &[LogRecord] {
        &self.history
    }

    /// Drive the view until `q`, the end of the session, or `duration`.
    pub async fn run(
        &mut self,
        mut messages: mpsc::UnboundedReceiver<SessionMessage>,
        duration: Option<Duration>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut terminal = open_terminal()?;

        let deadline = duration.map(|d| Instant::now() + d);
        let mut ticker = time::interval(Duration::from_millis(self.config.refresh_rate_ms.max(1)));
        self.running = true;

        let result = loop {
            ticker.tick().await;

            while let Ok(message) = messages.try_recv() {
                self.absorb(message);
            }

            while let Ok(true) = event::poll(Duration::ZERO) {
                if let Ok(TermEvent::Key(key)) = event::read() {
                    self.handle_key_event(key.code);
                }
            }

            if let Err(e) = terminal.draw(|f| self.draw_ui(f)) {
                break Err(e.into());
            }

            if !self.running || self.view.is_finished() {
                break Ok(());
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break Ok(());
            }
        };

        self.simulator.stop(&self.key).await;
        while let Ok(message) = messages.try_recv() {
            self.absorb(message);
        }

        close_terminal(&mut terminal)?;
        result
    }

    fn absorb(&mut self, message: SessionMessage) {
        self.view.apply(&message);
        if let SessionOutput::Record(record) = message.output {
            self.history.push(record);
        }
    }

    fn handle_key_event(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.running = false;
            }
            KeyCode::Char(c @ '1'..='9') => {
                let index = c as usize - '1' as usize;
                if let Some((id, pressed)) = self.view.toggle_button(index) {
                    let mut patch = Map::new();
                    patch.insert("pressed".to_string(), json!(pressed));
                    self.simulator.update_component(&self.key, &id, patch);
                }
            }
            _ => {}
        }
    }

    fn draw_ui(&self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(8)])
            .split(f.size());

        let header = vec![
            Line::from(vec![Span::styled(
                format!("Rusty Circuit: session {}", self.key),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )]),
            Line::from(vec![
                Span::styled("1-9", Style::default().fg(Color::Yellow)),
                Span::raw(" toggle a button   "),
                Span::styled("q", Style::default().fg(Color::Yellow)),
                Span::raw(" stop the session"),
            ]),
        ];
        f.render_widget(
            Paragraph::new(header)
                .block(Block::default().borders(Borders::ALL).title("Session"))
                .wrap(Wrap { trim: true }),
            chunks[0],
        );

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[1]);

        self.draw_components(f, columns[0]);
        self.draw_tail(f, columns[1]);
    }

    fn draw_components(&self, f: &mut Frame, area: Rect) {
        let leds = self.view.leds();
        let mut constraints: Vec<Constraint> = leds.iter().map(|_| Constraint::Length(3)).collect();
        constraints.push(Constraint::Min(3));

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        for (row, id) in rows.iter().zip(leds) {
            let intensity = self.view.intensity(id).clamp(0.0, 1.0);
            let gauge = Gauge::default()
                .block(Block::default().borders(Borders::ALL).title(id.as_str()))
                .gauge_style(Style::default().fg(Color::Red))
                .ratio(intensity);
            f.render_widget(gauge, *row);
        }

        let button_lines: Vec<Line> = self
            .view
            .buttons()
            .iter()
            .enumerate()
            .map(|(i, (id, pressed))| {
                let state = if *pressed { "pressed" } else { "released" };
                Line::from(vec![
                    Span::styled(format!("[{}] ", i + 1), Style::default().fg(Color::Yellow)),
                    Span::raw(format!("{} {}", id, state)),
                ])
            })
            .collect();
        let buttons = Paragraph::new(button_lines)
            .block(Block::default().borders(Borders::ALL).title("Buttons"))
            .wrap(Wrap { trim: true });
        if let Some(area) = rows.last() {
            f.render_widget(buttons, *area);
        }
    }

    fn draw_tail(&self, f: &mut Frame, area: Rect) {
        let lines: Vec<Line> = self.view.tail().map(|l| Line::from(l.as_str())).collect();
        let tail = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Events"))
            .wrap(Wrap { trim: false });
        f.render_widget(tail, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, LoopPhase};
    use crate::system_config::ComponentConfig;

    fn message(output: SessionOutput) -> SessionMessage {
        SessionMessage {
            session: "c".into(),
            output,
        }
    }

    fn record(body: EventBody, ts: u64) -> SessionMessage {
        message(SessionOutput::Record(LogRecord::Event(Event::new(body, ts))))
    }

    fn description() -> CircuitDescription {
        CircuitDescription::default()
            .component(ComponentConfig::new("uno", "arduino"))
            .component(ComponentConfig::new("led1", "led"))
            .component(ComponentConfig::new("b1", "button"))
            .component(ComponentConfig::new("b2", "push button").with_property("pressed", json!(true)))
    }

    #[test]
    fn test_view_lists_leds_and_buttons() {
        let view = ConsoleView::new(&description(), 4);
        assert_eq!(view.leds(), &["led1".to_string()]);
        assert_eq!(
            view.buttons(),
            &[("b1".to_string(), false), ("b2".to_string(), true)]
        );
    }

    #[test]
    fn test_toggle_button() {
        let mut view = ConsoleView::new(&description(), 4);
        assert_eq!(view.toggle_button(0), Some(("b1".to_string(), true)));
        assert_eq!(view.toggle_button(1), Some(("b2".to_string(), false)));
        assert_eq!(view.toggle_button(5), None);
    }

    #[test]
    fn test_tail_is_bounded() {
        let mut view = ConsoleView::new(&description(), 2);
        view.apply(&record(EventBody::Loop { phase: LoopPhase::Start }, 0));
        view.apply(&record(EventBody::Delay { ms: 500 }, 0));
        view.apply(&message(SessionOutput::Record(LogRecord::Log {
            message: "hi\n".into(),
        })));
        let tail: Vec<&String> = view.tail().collect();
        assert_eq!(tail, vec!["       0 ms  delay 500 ms", "hi"]);
    }

    #[test]
    fn test_intensities_and_finish() {
        let mut view = ConsoleView::new(&description(), 2);
        let mut map = IntensityMap::new();
        map.insert("led1".into(), 0.5);
        view.apply(&message(SessionOutput::Circuit(map)));
        assert_eq!(view.intensity("led1"), 0.5);
        assert_eq!(view.intensity("other"), 0.0);

        assert!(!view.is_finished());
        view.apply(&message(SessionOutput::Finished));
        assert!(view.is_finished());
    }

    #[test]
    fn test_describe_led() {
        let line = describe(&LogRecord::Event(Event::new(
            EventBody::Led {
                id: "led1".into(),
                on: true,
                brightness: 0.5,
            },
            1500,
        )));
        assert_eq!(line, "    1500 ms  led led1 on (0.50)");
    }
}

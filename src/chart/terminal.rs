//! Terminal chart backend (ratatui)
//!
//! Every live plot owns one pane of a shared screen. Panes are stacked
//! top to bottom in creation order with a one-line key hint footer; any
//! redraw repaints the whole screen from the latest dataset of each pane.

use std::io::{self, Stdout};
use std::sync::{Arc, Mutex, MutexGuard};

use crossterm::{
    cursor::{Hide, Show},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, LegendPosition, Paragraph},
    Frame, Terminal,
};
use tracing::{debug, warn};

use super::{ChartBackend, ChartConfig, ChartError, Plot, RedrawMode, Series};

/// Line width from which the trace is drawn with half blocks instead of braille.
const THICK_LINE_WIDTH: f32 = 2.0;

// ============================================================================
// Screen
// ============================================================================

struct Pane {
    id: u64,
    config: ChartConfig,
    data: Series,
}

struct Screen<B: Backend> {
    terminal: Terminal<B>,
    panes: Vec<Pane>,
    next_id: u64,
    axis_labels: usize,
    footer: String,
    full_repaints: u64,
}

impl<B: Backend> Screen<B> {
    fn render(&mut self) -> Result<(), ChartError> {
        let Screen {
            terminal,
            panes,
            axis_labels,
            footer,
            ..
        } = self;
        terminal
            .draw(|frame| draw_screen(frame, panes, *axis_labels, footer))
            .map(|_| ())
            .map_err(|e| ChartError::Backend(e.to_string()))
    }

    fn pane_mut(&mut self, id: u64) -> Option<&mut Pane> {
        self.panes.iter_mut().find(|p| p.id == id)
    }
}

fn lock<B: Backend>(screen: &Mutex<Screen<B>>) -> MutexGuard<'_, Screen<B>> {
    screen.lock().unwrap_or_else(|e| {
        warn!("Terminal screen mutex poisoned, recovering");
        e.into_inner()
    })
}

// ============================================================================
// Backend
// ============================================================================

/// Draws every plot as a ratatui line chart on one terminal.
pub struct TerminalBackend<B: Backend> {
    screen: Arc<Mutex<Screen<B>>>,
}

impl<B: Backend> Clone for TerminalBackend<B> {
    fn clone(&self) -> Self {
        Self {
            screen: Arc::clone(&self.screen),
        }
    }
}

impl<B: Backend> TerminalBackend<B> {
    /// Wrap a ratatui backend. `axis_labels` is the number of x-axis labels
    /// sampled from each series.
    pub fn new(backend: B, axis_labels: usize) -> io::Result<Self> {
        Ok(Self {
            screen: Arc::new(Mutex::new(Screen {
                terminal: Terminal::new(backend)?,
                panes: Vec::new(),
                next_id: 0,
                axis_labels: axis_labels.max(2),
                footer: String::new(),
                full_repaints: 0,
            })),
        })
    }

    /// Text shown on the bottom line.
    #[must_use]
    pub fn with_footer(self, footer: impl Into<String>) -> Self {
        lock(&self.screen).footer = footer.into();
        self
    }

    /// Inspect the underlying terminal.
    pub fn with_terminal<R>(&self, f: impl FnOnce(&Terminal<B>) -> R) -> R {
        f(&lock(&self.screen).terminal)
    }

    /// Number of plots currently on screen.
    pub fn pane_count(&self) -> usize {
        lock(&self.screen).panes.len()
    }

    /// Redraws that cleared the terminal first.
    pub fn full_repaints(&self) -> u64 {
        lock(&self.screen).full_repaints
    }
}

impl TerminalBackend<CrosstermBackend<Stdout>> {
    /// Draw on stdout. Pair with a [`TerminalSession`].
    pub fn stdout(axis_labels: usize) -> io::Result<Self> {
        Self::new(CrosstermBackend::new(io::stdout()), axis_labels)
    }
}

impl<B> ChartBackend for TerminalBackend<B>
where
    B: Backend + Send + 'static,
{
    fn create_plot(&self, config: &ChartConfig) -> Result<Box<dyn Plot>, ChartError> {
        let mut screen = lock(&self.screen);
        let id = screen.next_id;
        screen.next_id += 1;
        screen.panes.push(Pane {
            id,
            config: config.clone(),
            data: Series::default(),
        });
        screen.render()?;

        Ok(Box::new(TerminalPlot {
            id,
            title: config.display_title().to_string(),
            screen: Arc::clone(&self.screen),
        }))
    }
}

struct TerminalPlot<B: Backend> {
    id: u64,
    title: String,
    screen: Arc<Mutex<Screen<B>>>,
}

impl<B> Plot for TerminalPlot<B>
where
    B: Backend + Send + 'static,
{
    fn redraw(&mut self, data: &Series, mode: RedrawMode) -> Result<(), ChartError> {
        let mut screen = lock(&self.screen);
        let animated = {
            let pane = screen
                .pane_mut(self.id)
                .ok_or_else(|| ChartError::Backend(format!("pane {} is gone", self.title)))?;
            pane.data.clone_from(data);
            mode == RedrawMode::Animated && pane.config.animation_ms > 0
        };

        if animated {
            screen
                .terminal
                .clear()
                .map_err(|e| ChartError::Backend(e.to_string()))?;
            screen.full_repaints += 1;
        }
        screen.render()
    }

    fn release(&mut self) {
        let mut screen = lock(&self.screen);
        screen.panes.retain(|p| p.id != self.id);
        if let Err(e) = screen.render() {
            warn!(chart = %self.title, error = %e, "Failed to repaint after release");
        }
        debug!(chart = %self.title, "Terminal plot released");
    }
}

// ============================================================================
// Terminal Session
// ============================================================================

/// Raw mode plus alternate screen for as long as the value lives.
///
/// The terminal is also restored if the process panics.
pub struct TerminalSession {
    _private: (),
}

impl TerminalSession {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen, Hide) {
            let _ = disable_raw_mode();
            return Err(e);
        }

        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            restore_terminal();
            original_hook(info);
        }));

        Ok(Self { _private: () })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        restore_terminal();
    }
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let mut stdout = io::stdout();
    let _ = execute!(stdout, LeaveAlternateScreen, Show);
}

// ============================================================================
// Drawing
// ============================================================================

fn draw_screen(frame: &mut Frame, panes: &[Pane], axis_labels: usize, footer: &str) {
    let [body, hint] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).areas(frame.area());

    if !panes.is_empty() {
        let count = u32::try_from(panes.len()).unwrap_or(u32::MAX);
        let rows = Layout::vertical(panes.iter().map(|_| Constraint::Ratio(1, count))).split(body);
        for (pane, area) in panes.iter().zip(rows.iter()) {
            draw_pane(frame, *area, pane, axis_labels);
        }
    }

    frame.render_widget(
        Paragraph::new(footer).style(Style::default().fg(Color::DarkGray)),
        hint,
    );
}

fn draw_pane(frame: &mut Frame, area: Rect, pane: &Pane, axis_labels: usize) {
    let config = &pane.config;
    let data = &pane.data;
    let line_color = parse_color(&config.border_color).unwrap_or(Color::White);
    let tick_color = parse_color(&config.tick_color).unwrap_or(Color::DarkGray);
    let tick_style = Style::default().fg(tick_color);

    #[allow(clippy::cast_precision_loss)]
    let points: Vec<(f64, f64)> = data
        .values
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();

    let marker = if config.border_width >= THICK_LINE_WIDTH {
        Marker::HalfBlock
    } else {
        Marker::Braille
    };
    let line_style = Style::default().fg(line_color);
    let mut datasets = vec![Dataset::default()
        .name(config.series_label.clone())
        .marker(marker)
        .graph_type(GraphType::Line)
        .style(line_style)
        .data(&points)];
    if config.point_radius > 0.0 {
        datasets.push(
            Dataset::default()
                .marker(Marker::Dot)
                .graph_type(GraphType::Scatter)
                .style(line_style)
                .data(&points),
        );
    }

    let (lo, hi) = value_bounds(&data.values);
    #[allow(clippy::cast_precision_loss)]
    let x_max = data.len().saturating_sub(1).max(1) as f64;

    let title = format!(" {}  {}  n={} ", config.display_title(), config.series_label, data.len());
    let mut chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(Span::styled(
                    title,
                    Style::default().fg(line_color).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(tick_style),
        )
        .x_axis(
            Axis::default()
                .bounds([0.0, x_max])
                .labels(axis_ticks(&data.labels, axis_labels))
                .style(tick_style),
        )
        .y_axis(
            Axis::default()
                .bounds([lo, hi])
                .labels(vec![
                    format!("{lo:.2}"),
                    format!("{:.2}", (lo + hi) / 2.0),
                    format!("{hi:.2}"),
                ])
                .style(tick_style),
        )
        .legend_position(config.show_legend.then_some(LegendPosition::TopRight))
        .hidden_legend_constraints((Constraint::Ratio(1, 2), Constraint::Ratio(1, 1)));

    if config.fill {
        if let Some(bg) = parse_color(&config.fill_color) {
            chart = chart.style(Style::default().bg(bg));
        }
    }

    frame.render_widget(chart, area);
}

/// Y range covering every value; flat or empty data gets a unit band.
fn value_bounds(values: &[f64]) -> (f64, f64) {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        (0.0, 1.0)
    } else if hi - lo <= f64::EPSILON {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

/// Up to `count` labels spread evenly from first to last.
pub fn axis_ticks(labels: &[String], count: usize) -> Vec<String> {
    if labels.is_empty() || count == 0 {
        return Vec::new();
    }
    if labels.len() <= count {
        return labels.to_vec();
    }
    let last = labels.len() - 1;
    let steps = count.max(2) - 1;
    (0..=steps)
        .map(|i| labels[i * last / steps].clone())
        .collect()
}

/// Parse `#rrggbb`, `rgb(r, g, b)`, `rgba(r, g, b, a)` or a named colour.
///
/// Alpha is applied against a black background.
pub fn parse_color(text: &str) -> Option<Color> {
    let text = text.trim();

    if let Some(hex) = text.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let rgb = u32::from_str_radix(hex, 16).ok()?;
        let [_, r, g, b] = rgb.to_be_bytes();
        return Some(Color::Rgb(r, g, b));
    }

    let args = text
        .strip_prefix("rgba(")
        .or_else(|| text.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'));
    if let Some(args) = args {
        let parts = args
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        let (r, g, b, alpha) = match parts.as_slice() {
            [r, g, b] => (*r, *g, *b, 1.0),
            [r, g, b, a] => (*r, *g, *b, a.clamp(0.0, 1.0)),
            _ => return None,
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let channel = |c: f64| (c.clamp(0.0, 255.0) * alpha).round() as u8;
        return Some(Color::Rgb(channel(r), channel(g), channel(b)));
    }

    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    fn backend() -> TerminalBackend<TestBackend> {
        TerminalBackend::new(TestBackend::new(80, 24), 3)
            .unwrap()
            .with_footer("q quit")
    }

    fn screen_text(backend: &TerminalBackend<TestBackend>) -> String {
        backend.with_terminal(|terminal| {
            let buffer = terminal.backend().buffer();
            let width = usize::from(buffer.area.width);
            buffer
                .content()
                .chunks(width)
                .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    fn series(labels: &[&str], values: &[f64]) -> Series {
        Series {
            labels: labels.iter().map(|s| (*s).to_string()).collect(),
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_parse_color_forms() {
        assert_eq!(parse_color("#38bdf8"), Some(Color::Rgb(0x38, 0xbd, 0xf8)));
        assert_eq!(parse_color("rgb(10, 20, 30)"), Some(Color::Rgb(10, 20, 30)));
        assert_eq!(
            parse_color("rgba(200, 100, 50, 0.5)"),
            Some(Color::Rgb(100, 50, 25))
        );
        assert_eq!(parse_color("red"), Some(Color::Red));
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("rgba(1, 2)"), None);
        assert_eq!(parse_color("not-a-colour"), None);
    }

    #[test]
    fn test_axis_ticks_spread_first_to_last() {
        let labels: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(axis_ticks(&labels, 3), vec!["0", "4", "9"]);
        assert_eq!(axis_ticks(&labels[..2], 5), vec!["0", "1"]);
        assert!(axis_ticks(&[], 5).is_empty());
    }

    #[test]
    fn test_value_bounds_pad_flat_and_empty() {
        assert_eq!(value_bounds(&[]), (0.0, 1.0));
        assert_eq!(value_bounds(&[2.0, 2.0]), (1.5, 2.5));
        assert_eq!(value_bounds(&[-1.0, f64::NAN, 3.0]), (-1.0, 3.0));
    }

    #[test]
    fn test_panes_stack_with_titles_labels_and_footer() {
        let backend = backend();
        let mut time = backend.create_plot(&ChartConfig::time_domain()).unwrap();
        let _fft = backend.create_plot(&ChartConfig::frequency_domain()).unwrap();

        time.redraw(
            &series(&["0", "1", "2", "3", "4"], &[0.0, 1.0, -1.0, 0.5, 0.25]),
            RedrawMode::Immediate,
        )
        .unwrap();

        let text = screen_text(&backend);
        let time_row = text.lines().position(|l| l.contains("time")).unwrap();
        let fft_row = text.lines().position(|l| l.contains("fft")).unwrap();
        assert!(time_row < fft_row);
        assert!(text.contains("n=5"));
        assert!(text.contains("Acceleration"));
        assert!(text.lines().last().unwrap().starts_with("q quit"));
        // Legend suppressed: the series name only shows in the title row
        assert_eq!(text.matches("Amplitude").count(), 1);
    }

    #[test]
    fn test_legend_shown_when_enabled() {
        let backend = backend();
        let config = ChartConfig {
            show_legend: true,
            ..ChartConfig::frequency_domain()
        };
        let mut plot = backend.create_plot(&config).unwrap();
        plot.redraw(&series(&["1.0", "2.0"], &[0.1, 0.9]), RedrawMode::Immediate)
            .unwrap();

        assert_eq!(screen_text(&backend).matches("Amplitude").count(), 2);
    }

    #[test]
    fn test_tick_colour_applied_to_axes() {
        let backend = backend();
        let mut plot = backend.create_plot(&ChartConfig::time_domain()).unwrap();
        plot.redraw(&series(&["0", "1"], &[0.0, 1.0]), RedrawMode::Immediate)
            .unwrap();

        let tick = parse_color(crate::config::defaults::TICK_COLOR).unwrap();
        backend.with_terminal(|terminal| {
            let buffer = terminal.backend().buffer();
            assert!(buffer.content().iter().any(|cell| cell.fg == tick));
        });
    }

    #[test]
    fn test_animated_redraw_repaints_only_when_animation_enabled() {
        let backend = backend();
        let mut still = backend.create_plot(&ChartConfig::time_domain()).unwrap();
        let mut animated = backend
            .create_plot(&ChartConfig {
                animation_ms: 250,
                ..ChartConfig::frequency_domain()
            })
            .unwrap();

        still.redraw(&Series::default(), RedrawMode::Animated).unwrap();
        animated
            .redraw(&series(&["1.0"], &[1.0]), RedrawMode::Immediate)
            .unwrap();
        assert_eq!(backend.full_repaints(), 0);

        animated.redraw(&Series::default(), RedrawMode::Animated).unwrap();
        assert_eq!(backend.full_repaints(), 1);
    }

    #[test]
    fn test_release_removes_pane() {
        let backend = backend();
        let mut time = backend.create_plot(&ChartConfig::time_domain()).unwrap();
        let _fft = backend.create_plot(&ChartConfig::frequency_domain()).unwrap();
        assert_eq!(backend.pane_count(), 2);

        time.release();
        assert_eq!(backend.pane_count(), 1);
        assert!(!screen_text(&backend).contains(" time "));
        assert!(matches!(
            time.redraw(&Series::default(), RedrawMode::Immediate),
            Err(ChartError::Backend(_))
        ));
    }
}

//! Ratatui-based terminal UI.
//!
//! Shows the fitted series and the regime probabilities as stacked charts, with
//! recession dates shaded in the contraction panel. Model settings can be
//! toggled and the model refitted without reloading the inputs.

use std::io;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph},
    Terminal,
};

use crate::app::pipeline::{run_fit_with_inputs, LoadedInputs, RunOutput};
use crate::domain::{RecessionIndicator, RegimeModel, RunConfig, Trend};
use crate::error::AppError;
use crate::plot::ProbabilityKind;

mod plotters_chart;

use plotters_chart::RegimePlottersChart;

/// Restarts enabled by `r` when the run was started without a search.
const RESEED_REPS: usize = 8;

/// Start the TUI.
pub fn run(inputs: LoadedInputs, config: RunConfig) -> Result<(), AppError> {
    let mut app = App::new(inputs, config)?;

    let _guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;

    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct App {
    config: RunConfig,
    inputs: LoadedInputs,
    kind: ProbabilityKind,
    status: String,
    run: Option<RunOutput>,
}

impl App {
    fn new(inputs: LoadedInputs, config: RunConfig) -> Result<Self, AppError> {
        // The first fit must succeed; later refits report failures in the status line.
        let run = run_fit_with_inputs(inputs.clone(), &config.classifier)?;
        let status = format!("fit {}", run.model.status());
        Ok(Self {
            config,
            inputs,
            kind: ProbabilityKind::Smoothed,
            status,
            run: Some(run),
        })
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(4, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(4, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('s') => {
                self.kind = self.kind.toggled();
                self.status = format!("showing {} probabilities", self.kind.label());
            }
            KeyCode::Char('v') => {
                let c = &mut self.config.classifier;
                c.switching_variance = !c.switching_variance;
                self.refit();
            }
            KeyCode::Char('t') => {
                let c = &mut self.config.classifier;
                c.trend = match c.trend {
                    Trend::Constant => Trend::None,
                    Trend::None => Trend::Constant,
                };
                self.refit();
            }
            KeyCode::Char('r') => {
                let c = &mut self.config.classifier;
                c.seed = c.seed.wrapping_add(1);
                if c.search_reps == 0 {
                    c.search_reps = RESEED_REPS;
                }
                self.refit();
            }
            _ => {}
        }
        false
    }

    fn refit(&mut self) {
        match run_fit_with_inputs(self.inputs.clone(), &self.config.classifier) {
            Ok(run) => {
                self.status = format!("refit {}", run.model.status());
                self.run = Some(run);
            }
            Err(err) => {
                self.status = format!("refit failed: {err}");
            }
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(5), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let c = &self.config.classifier;
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("rr", Style::default().fg(Color::Cyan)),
            Span::raw(" | Markov-switching recession regimes"),
        ]));

        let exog = self
            .inputs
            .exog
            .as_ref()
            .map(|s| s.name().to_string())
            .unwrap_or_else(|| "-".to_string());
        lines.push(Line::from(Span::styled(
            format!(
                "endog: {} | exog: {exog} | k={} | trend={} | switching variance={} | seed={} | restarts={}",
                self.inputs.endog.name(),
                c.k_regimes,
                if c.trend.has_intercept() { "c" } else { "n" },
                if c.switching_variance { "yes" } else { "no" },
                c.seed,
                c.search_reps,
            ),
            Style::default().fg(Color::Gray),
        )));

        if let Some(run) = &self.run {
            let m = &run.model;
            let mut text = format!(
                "n={} | loglik={:.3} | aic={:.3} | bic={:.3} | iterations={}",
                m.n_obs(),
                m.log_likelihood(),
                m.aic(),
                m.bic(),
                m.iterations()
            );
            if let Some(acc) = run.comparison.as_ref().and_then(|c| c.accuracy()) {
                text.push_str(&format!(" | recession accuracy={:.1}%", acc * 100.0));
            }
            lines.push(Line::from(Span::styled(text, Style::default().fg(Color::Gray))));
        }

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let Some(run) = &self.run else {
            let msg = Paragraph::new("No model fitted.")
                .style(Style::default().fg(Color::Yellow))
                .block(Block::default().borders(Borders::ALL));
            frame.render_widget(msg, area);
            return;
        };

        let data = chart_data(&run.model, run.inputs.recession.as_ref(), self.kind);
        let n_panels = data.panels.len() as u32;
        let constraints: Vec<Constraint> = (0..n_panels).map(|_| Constraint::Ratio(1, n_panels)).collect();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        let last = data.panels.len().saturating_sub(1);
        for (i, panel) in data.panels.iter().enumerate() {
            let shade: &[f64] = if i == last && i > 0 { &data.recession_x } else { &[] };
            self.draw_chart(frame, chunks[i], panel, shade, data.x_bounds);
        }
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect, panel: &Panel, shade: &[f64], x_bounds: [f64; 2]) {
        let block = Block::default().title(panel.title.as_str()).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let (chart_rect, insets) = chart_layout(inner);
        let widget = RegimePlottersChart {
            line: &panel.points,
            shade,
            x_bounds,
            y_bounds: panel.y_bounds,
            y_label: panel.y_label.clone(),
            fmt_x: fmt_axis_year,
            fmt_y: fmt_axis_y,
        };

        frame.render_widget(widget, chart_rect);
        if let Some(insets) = insets {
            draw_axis_ticks(frame, inner, chart_rect, insets, x_bounds, panel.y_bounds);
        }
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "s smoothed/filtered  v switching variance  t trend  r reseed  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// One chart: a line plus its bounds and labels.
#[derive(Debug, Clone)]
struct Panel {
    title: String,
    y_label: String,
    points: Vec<(f64, f64)>,
    y_bounds: [f64; 2],
}

/// Everything the body needs to draw, computed outside the render call.
#[derive(Debug, Clone)]
struct ChartData {
    panels: Vec<Panel>,
    /// x positions of recession dates (drawn in the last panel).
    recession_x: Vec<f64>,
    x_bounds: [f64; 2],
}

/// Series panel, then one panel per regime probability on `[0, 1]`.
fn chart_data(model: &RegimeModel, recession: Option<&RecessionIndicator>, kind: ProbabilityKind) -> ChartData {
    let xs: Vec<f64> = model.dates().iter().map(|d| year_fraction(*d)).collect();
    let x_bounds = match (xs.first(), xs.last()) {
        (Some(&a), Some(&b)) if b > a => [a, b],
        (Some(&a), _) => [a - 0.5, a + 0.5],
        _ => [0.0, 1.0],
    };

    let endog = model.endog();
    let points: Vec<(f64, f64)> = xs.iter().copied().zip(endog.values().iter().copied()).collect();
    let (y_min, y_max) = crate::plot::ascii::value_range(endog.values()).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = crate::plot::ascii::pad_range(y_min, y_max, 0.05);

    let mut panels = vec![Panel {
        title: endog.name().to_string(),
        y_label: "value".to_string(),
        points,
        y_bounds: [y_min, y_max],
    }];

    let rows = match kind {
        ProbabilityKind::Smoothed => model.smoothed_rows(),
        ProbabilityKind::Filtered => model.filtered_rows(),
    };
    for j in 0..model.k_regimes() {
        let mut title = format!("{} P(regime {j}: {})", kind.label(), model.regime_label(j));
        if j + 1 == model.k_regimes() {
            if let Some(r) = recession {
                title.push_str(&format!(" | shaded: {}", r.series().name()));
            }
        }
        panels.push(Panel {
            title,
            y_label: "prob".to_string(),
            points: xs.iter().copied().zip(rows.iter().map(|row| row[j])).collect(),
            y_bounds: [0.0, 1.0],
        });
    }

    let recession_x = match recession {
        Some(r) => model
            .dates()
            .iter()
            .zip(&xs)
            .filter(|(d, _)| r.in_recession(**d) == Some(true))
            .map(|(_, x)| *x)
            .collect(),
        None => Vec::new(),
    };

    ChartData {
        panels,
        recession_x,
        x_bounds,
    }
}

/// Date as a fractional year (2020-07-01 -> ~2020.5).
fn year_fraction(date: NaiveDate) -> f64 {
    let days_in_year = if NaiveDate::from_ymd_opt(date.year(), 12, 31).map(|d| d.ordinal()) == Some(366) {
        366.0
    } else {
        365.0
    };
    date.year() as f64 + (date.ordinal0() as f64) / days_in_year
}

fn fmt_axis_year(v: f64) -> String {
    format!("{v:.0}")
}

fn fmt_axis_y(v: f64) -> String {
    format!("{v:.2}")
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 0,
        bottom: 1,
    };

    if inner.width <= insets.left + insets.right + 10 || inner.height <= insets.top + insets.bottom + 5 {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };

    (rect, Some(insets))
}

fn draw_axis_ticks(
    frame: &mut ratatui::Frame<'_>,
    inner: Rect,
    chart: Rect,
    insets: AxisInsets,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
) {
    let ticks = 5usize;
    let style = Style::default().fg(Color::Gray);

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let x_val = x_bounds[0] + u * (x_bounds[1] - x_bounds[0]);
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let label = fmt_axis_year(x_val);
        let label_len = label.len() as u16;
        let start = x.saturating_sub((label.len() / 2) as u16);
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    for i in 0..3usize {
        let u = i as f64 / 2.0;
        let y_val = y_bounds[0] + u * (y_bounds[1] - y_bounds[0]);
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let label = fmt_axis_y(y_val);
        let label_len = label.len() as u16;
        let x = inner.x + insets.left.saturating_sub(1);
        let start = x.saturating_sub(label.len() as u16);
        if start < inner.x {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    let corner = Paragraph::new("date")
        .alignment(Alignment::Right)
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let corner_rect = Rect {
        x: inner.x,
        y: chart.y + chart.height,
        width: insets.left.saturating_sub(1),
        height: 1,
    };
    if corner_rect.y < inner.y + inner.height {
        frame.render_widget(corner, corner_rect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitStatus, RegimeOrder, RegimeParams, TimeSeries};

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn model() -> RegimeModel {
        let dates = vec![d(2020, 1), d(2020, 7), d(2021, 1)];
        let endog = TimeSeries::new("ip", dates, vec![0.5, -2.0, 0.3]).unwrap();
        RegimeModel {
            k_regimes: 2,
            trend: Trend::Constant,
            switching_variance: true,
            order: RegimeOrder::ByMean,
            endog,
            exog: None,
            params: vec![
                RegimeParams { intercept: Some(0.4), exog_coef: None, variance: 0.1 },
                RegimeParams { intercept: Some(-2.0), exog_coef: None, variance: 0.5 },
            ],
            transition: vec![vec![0.9, 0.1], vec![0.3, 0.7]],
            initial_probs: vec![0.75, 0.25],
            log_likelihood: -4.0,
            iterations: 7,
            status: FitStatus::Converged,
            filtered: vec![vec![0.8, 0.2], vec![0.3, 0.7], vec![0.9, 0.1]],
            smoothed: vec![vec![0.9, 0.1], vec![0.05, 0.95], vec![0.85, 0.15]],
        }
    }

    #[test]
    fn year_fraction_is_monotone_and_anchored() {
        assert_eq!(year_fraction(d(2020, 1)), 2020.0);
        let mid = year_fraction(d(2020, 7));
        assert!(mid > 2020.49 && mid < 2020.51);
        assert!(year_fraction(d(2021, 1)) > mid);
    }

    #[test]
    fn chart_data_has_series_and_probability_panels() {
        let rec = RecessionIndicator::new(
            TimeSeries::new("USREC", vec![d(2020, 1), d(2020, 4), d(2020, 10)], vec![0.0, 1.0, 0.0]).unwrap(),
        )
        .unwrap();
        let data = chart_data(&model(), Some(&rec), ProbabilityKind::Smoothed);
        assert_eq!(data.panels.len(), 3);
        assert_eq!(data.x_bounds[0], 2020.0);
        assert_eq!(data.x_bounds[1], 2021.0);
        assert_eq!(data.panels[2].points[1].1, 0.95);
        assert_eq!(data.panels[2].y_bounds, [0.0, 1.0]);
        assert!(data.panels[2].title.contains("contraction"));
        assert!(data.panels[2].title.contains("USREC"));
        assert_eq!(data.recession_x.len(), 1);
        assert!(data.panels[0].y_bounds[0] < -2.0);

        let filtered = chart_data(&model(), None, ProbabilityKind::Filtered);
        assert_eq!(filtered.panels[1].points[1].1, 0.3);
        assert!(filtered.recession_x.is_empty());
    }
}

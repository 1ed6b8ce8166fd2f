//! ASCII plotting for terminal output.
//!
//! A fixed-size grid per panel, stacked vertically and sharing the date axis:
//!
//! 1. the endogenous series
//! 2. `P(regime j)` for every regime, on a fixed `[0, 1]` axis
//!
//! The last panel marks recession dates with `#` on its bottom row. Output is
//! deterministic, which keeps golden tests simple.
//!
//! Plot elements:
//! - series / probability line: `*`
//! - recession: `#`

use crate::domain::{RecessionIndicator, RegimeModel};
use crate::plot::ProbabilityKind;

/// Render all panels for a fitted model.
pub fn render_regime_plot(
    model: &RegimeModel,
    recession: Option<&RecessionIndicator>,
    kind: ProbabilityKind,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);
    let n = model.n_obs();
    let k = model.k_regimes();
    let mut out = String::new();

    let y = model.endog().values();
    let (y_min, y_max) = value_range(y).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);
    out.push_str(&format!("{} | y=[{y_min:.2}, {y_max:.2}]\n", model.endog().name()));
    push_grid(&mut out, render_panel(y, y_min, y_max, width, height, None));

    let rows = match kind {
        ProbabilityKind::Smoothed => model.smoothed_rows(),
        ProbabilityKind::Filtered => model.filtered_rows(),
    };
    let marks = recession.map(|r| recession_columns(model, r, width));

    for j in 0..k {
        let probs: Vec<f64> = rows.iter().map(|row| row[j]).collect();
        let is_last = j + 1 == k;
        let panel_marks = if is_last { marks.as_deref() } else { None };

        let mut title = format!("{} P(regime {j}: {}) | [0, 1]", kind.label(), model.regime_label(j));
        if let (true, Some(r)) = (is_last, recession) {
            title.push_str(&format!(" | # = {}", r.series().name()));
        }
        out.push_str(&title);
        out.push('\n');
        push_grid(&mut out, render_panel(&probs, 0.0, 1.0, width, height, panel_marks));
    }

    if let (Some(first), Some(last)) = (model.dates().first(), model.dates().last()) {
        out.push_str(&format!("{first} .. {last} (n={n})\n"));
    }
    out
}

/// Draw one panel: optional markers on the bottom row, then the value line.
fn render_panel(
    values: &[f64],
    y_min: f64,
    y_max: f64,
    width: usize,
    height: usize,
    marks: Option<&[bool]>,
) -> Vec<Vec<char>> {
    let mut grid = vec![vec![' '; width]; height];

    if let Some(marks) = marks {
        for (x, &m) in marks.iter().enumerate().take(width) {
            if m {
                grid[height - 1][x] = '#';
            }
        }
    }

    let t_max = values.len().saturating_sub(1) as f64;
    let mut prev: Option<(usize, usize)> = None;
    for (t, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            prev = None;
            continue;
        }
        let x = map_x(t as f64, 0.0, t_max, width);
        let y = map_y(v, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(&mut grid, x0, y0, x, y, '*'),
            None => {
                if grid[y][x] == ' ' {
                    grid[y][x] = '*';
                }
            }
        }
        prev = Some((x, y));
    }
    grid
}

/// Columns covering at least one date the indicator flags as recession.
pub(crate) fn recession_columns(model: &RegimeModel, recession: &RecessionIndicator, width: usize) -> Vec<bool> {
    let mut cols = vec![false; width];
    let t_max = model.n_obs().saturating_sub(1) as f64;
    for (t, date) in model.dates().iter().enumerate() {
        if recession.in_recession(*date) == Some(true) {
            cols[map_x(t as f64, 0.0, t_max, width)] = true;
        }
    }
    cols
}

fn push_grid(out: &mut String, grid: Vec<Vec<char>>) {
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
}

pub(crate) fn value_range(values: &[f64]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &v in values.iter().filter(|v| v.is_finite()) {
        min_y = min_y.min(v);
        max_y = max_y.max(v);
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

pub(crate) fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    if t_max <= t_min {
        return 0;
    }
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Integer line drawing (Bresenham-ish). Never overwrites existing marks.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitStatus, RegimeOrder, RegimeParams, TimeSeries, Trend};
    use chrono::NaiveDate;

    fn d(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, m, 1).unwrap()
    }

    fn model() -> RegimeModel {
        let dates: Vec<NaiveDate> = (1..=5).map(d).collect();
        let endog = TimeSeries::new("ip", dates, vec![1.0, 1.0, -1.0, -1.0, 1.0]).unwrap();
        let p1 = [0.0, 0.0, 1.0, 1.0, 0.0];
        let rows: Vec<Vec<f64>> = p1.iter().map(|p| vec![1.0 - p, *p]).collect();
        RegimeModel {
            k_regimes: 2,
            trend: Trend::Constant,
            switching_variance: true,
            order: RegimeOrder::ByMean,
            endog,
            exog: None,
            params: vec![
                RegimeParams { intercept: Some(1.0), exog_coef: None, variance: 0.1 },
                RegimeParams { intercept: Some(-1.0), exog_coef: None, variance: 0.1 },
            ],
            transition: vec![vec![0.9, 0.1], vec![0.1, 0.9]],
            initial_probs: vec![0.5, 0.5],
            log_likelihood: 0.0,
            iterations: 3,
            status: FitStatus::Converged,
            filtered: rows.clone(),
            smoothed: rows,
        }
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let rec = RecessionIndicator::new(
            TimeSeries::new("USREC", vec![d(1), d(3), d(5)], vec![0.0, 1.0, 0.0]).unwrap(),
        )
        .unwrap();
        let txt = render_regime_plot(&model(), Some(&rec), ProbabilityKind::Smoothed, 10, 5);
        let expected = concat!(
            "ip | y=[-1.10, 1.10]\n",
            "***      *\n",
            "   *     *\n",
            "    *   * \n",
            "    *   * \n",
            "     ***  \n",
            "smoothed P(regime 0: expansion) | [0, 1]\n",
            "***      *\n",
            "   *     *\n",
            "    *   * \n",
            "    *   * \n",
            "     ***  \n",
            "smoothed P(regime 1: contraction) | [0, 1] | # = USREC\n",
            "     ***  \n",
            "    *   * \n",
            "    *   * \n",
            "   *     *\n",
            "***  # # *\n",
            "2020-01-01 .. 2020-05-01 (n=5)\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn plot_without_recession_has_no_markers() {
        let txt = render_regime_plot(&model(), None, ProbabilityKind::Filtered, 20, 6);
        assert!(!txt.contains('#'));
        assert!(txt.contains("filtered P(regime 1: contraction) | [0, 1]\n"));
        // 3 titles + 3 panels of 6 rows + footer
        assert_eq!(txt.lines().count(), 3 + 3 * 6 + 1);
    }

    #[test]
    fn recession_columns_follow_as_of_lookup() {
        let rec = RecessionIndicator::new(TimeSeries::new("rec", vec![d(2), d(3)], vec![1.0, 1.0]).unwrap()).unwrap();
        let cols = recession_columns(&model(), &rec, 5);
        // The indicator ends in March; April and May are not marked.
        assert_eq!(cols, vec![false, true, true, false, false]);
    }
}

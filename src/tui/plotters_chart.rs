//! Plotters-powered time-series chart widget for Ratatui.
//!
//! Plotters output is rendered into the Ratatui buffer using
//! `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

/// A render-only chart description.
///
/// All series and bounds are computed outside the render call.
pub struct RegimePlottersChart<'a> {
    /// Line series (x in fractional years).
    pub line: &'a [(f64, f64)],
    /// x positions drawn as full-height recession bars, behind the line.
    pub shade: &'a [f64],
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    pub y_label: String,
    /// Formatting of tick labels.
    pub fmt_x: fn(f64) -> String,
    pub fmt_y: fn(f64) -> String,
}

impl<'a> Widget for RegimePlottersChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Plotters may fail to build a chart in a tiny area.
        if area.width < 20 || area.height < 6 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let [x0, x1] = self.x_bounds;
        let [y0, y1] = self.y_bounds;

        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 2)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            // Mesh lines clutter low-resolution terminal output.
            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .y_desc(&self.y_label)
                .x_labels(5)
                .y_labels(3)
                .x_label_formatter(&|v| (self.fmt_x)(*v))
                .y_label_formatter(&|v| (self.fmt_y)(*v))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            let shade_color = RGBColor(96, 96, 96);
            let line_color = RGBColor(0, 255, 255); // cyan

            chart.draw_series(
                self.shade
                    .iter()
                    .map(|&x| PathElement::new(vec![(x, y0), (x, y1)], &shade_color)),
            )?;
            chart.draw_series(LineSeries::new(self.line.iter().copied(), &line_color))?;

            Ok(())
        });

        widget.render(area, buf);
    }
}

//! SVG chart renderer.

use std::path::Path;

use crate::report::data::mean;
use crate::report::{RenderedReport, ReportData, ReportError, ReportRenderer};
use crate::storage::{RunLayout, RunTables};

const WIDTH: f64 = 1400.0;
const PANEL_HEIGHT: f64 = 350.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 70.0;
const Y_TICKS: usize = 5;

const SENT_COLOR: &str = "#d62728";
const RECV_COLOR: &str = "#1f77b4";

/// Renders a run as a two-panel SVG chart plus a JSON summary.
///
/// The top panel shows data sent/received in MB, the bottom panel
/// download/upload speed in Mbps with the average of each series in the
/// legend. X labels are `HH:MM`, one every `xtick_interval` samples. A kind
/// without rows gets no panel.
#[derive(Debug, Clone)]
pub struct SvgReportRenderer {
    layout: RunLayout,
    xtick_interval: usize,
}

impl SvgReportRenderer {
    /// Create a renderer writing into `layout`'s results directory.
    ///
    /// An `xtick_interval` of zero is treated as one.
    pub fn new(layout: RunLayout, xtick_interval: usize) -> Self {
        Self {
            layout,
            xtick_interval: xtick_interval.max(1),
        }
    }

    /// Draw the chart for already loaded rows.
    pub fn draw(&self, data: &ReportData) -> String {
        let mut panels = Vec::with_capacity(2);

        if !data.usage.is_empty() {
            let sent: Vec<f64> = data.usage.iter().map(|r| r.sample.sent_mb()).collect();
            let recv: Vec<f64> = data.usage.iter().map(|r| r.sample.recv_mb()).collect();
            panels.push(Panel {
                title: "Data Usage Over Time",
                y_label: "Data (MB)",
                times: data
                    .usage
                    .iter()
                    .map(|r| r.timestamp.format("%H:%M").to_string())
                    .collect(),
                series: vec![
                    Series {
                        label: "Sent Data (MB)".to_string(),
                        color: SENT_COLOR,
                        values: sent,
                    },
                    Series {
                        label: "Received Data (MB)".to_string(),
                        color: RECV_COLOR,
                        values: recv,
                    },
                ],
            });
        }

        if !data.speed.is_empty() {
            let download: Vec<f64> = data.speed.iter().map(|r| r.sample.download_mbps()).collect();
            let upload: Vec<f64> = data.speed.iter().map(|r| r.sample.upload_mbps()).collect();
            panels.push(Panel {
                title: "Speed Over Time",
                y_label: "Speed (Mbps)",
                times: data
                    .speed
                    .iter()
                    .map(|r| r.timestamp.format("%H:%M").to_string())
                    .collect(),
                series: vec![
                    Series {
                        label: format!(
                            "Download Speed (Mbps), Avg: {:.2} Mbps",
                            mean(&download)
                        ),
                        color: SENT_COLOR,
                        values: download,
                    },
                    Series {
                        label: format!("Upload Speed (Mbps), Avg: {:.2} Mbps", mean(&upload)),
                        color: RECV_COLOR,
                        values: upload,
                    },
                ],
            });
        }

        let height = PANEL_HEIGHT * panels.len() as f64;
        let mut out = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{WIDTH}\" height=\"{height}\" \
             viewBox=\"0 0 {WIDTH} {height}\" font-family=\"sans-serif\" font-size=\"12\">\n\
             <rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n"
        );
        for (i, panel) in panels.iter().enumerate() {
            panel.draw(&mut out, PANEL_HEIGHT * i as f64, self.xtick_interval);
        }
        out.push_str("</svg>\n");
        out
    }
}

impl ReportRenderer for SvgReportRenderer {
    fn render(&self, tables: &RunTables) -> Result<RenderedReport, ReportError> {
        let data = ReportData::load(tables)?;
        if data.is_empty() {
            return Err(ReportError::NoData);
        }

        let chart = self.layout.report_path();
        let summary = self.layout.summary_path();
        std::fs::create_dir_all(self.layout.results_dir()).map_err(|e| ReportError::Io {
            path: self.layout.results_dir().to_path_buf(),
            source: e,
        })?;

        write_file(&chart, &self.draw(&data))?;
        write_file(&summary, &serde_json::to_string_pretty(&data.summary())?)?;

        tracing::info!(chart = %chart.display(), summary = %summary.display(), "Report rendered");
        Ok(RenderedReport { chart, summary })
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), ReportError> {
    std::fs::write(path, content).map_err(|e| ReportError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

struct Series {
    label: String,
    color: &'static str,
    values: Vec<f64>,
}

struct Panel {
    title: &'static str,
    y_label: &'static str,
    times: Vec<String>,
    series: Vec<Series>,
}

impl Panel {
    fn draw(&self, out: &mut String, top: f64, xtick_interval: usize) {
        let left = MARGIN_LEFT;
        let right = WIDTH - MARGIN_RIGHT;
        let plot_top = top + MARGIN_TOP;
        let plot_bottom = top + PANEL_HEIGHT - MARGIN_BOTTOM;
        let plot_height = plot_bottom - plot_top;

        let max = self
            .series
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .fold(0.0, f64::max);
        let y_max = if max > 0.0 { max * 1.1 } else { 1.0 };

        let points = self.times.len();
        let x_at = |i: usize| {
            if points <= 1 {
                (left + right) / 2.0
            } else {
                left + (right - left) * i as f64 / (points - 1) as f64
            }
        };
        let y_at = |v: f64| plot_bottom - plot_height * (v / y_max);

        out.push_str(&format!(
            "<g class=\"panel\">\n<text x=\"{}\" y=\"{}\" text-anchor=\"middle\" font-size=\"15\">{}</text>\n",
            (left + right) / 2.0,
            top + 24.0,
            self.title
        ));

        // Grid and y labels
        for tick in 0..=Y_TICKS {
            let value = y_max * tick as f64 / Y_TICKS as f64;
            let y = y_at(value);
            out.push_str(&format!(
                "<line x1=\"{left}\" y1=\"{y:.1}\" x2=\"{right}\" y2=\"{y:.1}\" stroke=\"#dddddd\"/>\n\
                 <text x=\"{}\" y=\"{:.1}\" text-anchor=\"end\">{value:.2}</text>\n",
                left - 6.0,
                y + 4.0
            ));
        }
        out.push_str(&format!(
            "<text transform=\"translate({},{:.1}) rotate(-90)\" text-anchor=\"middle\">{}</text>\n",
            left - 60.0,
            (plot_top + plot_bottom) / 2.0,
            self.y_label
        ));

        // X labels
        for (i, time) in self.times.iter().enumerate().step_by(xtick_interval) {
            let x = x_at(i);
            out.push_str(&format!(
                "<line x1=\"{x:.1}\" y1=\"{plot_top}\" x2=\"{x:.1}\" y2=\"{plot_bottom}\" stroke=\"#eeeeee\"/>\n\
                 <text x=\"{x:.1}\" y=\"{}\" text-anchor=\"end\" transform=\"rotate(-45 {x:.1} {})\">{time}</text>\n",
                plot_bottom + 16.0,
                plot_bottom + 16.0
            ));
        }
        out.push_str(&format!(
            "<text x=\"{}\" y=\"{}\" text-anchor=\"middle\">Time (HH:MM)</text>\n",
            (left + right) / 2.0,
            top + PANEL_HEIGHT - 12.0
        ));

        out.push_str(&format!(
            "<rect x=\"{left}\" y=\"{plot_top}\" width=\"{}\" height=\"{plot_height}\" fill=\"none\" stroke=\"#333333\"/>\n",
            right - left
        ));

        for (n, series) in self.series.iter().enumerate() {
            let coords: Vec<String> = series
                .values
                .iter()
                .enumerate()
                .map(|(i, v)| format!("{:.1},{:.1}", x_at(i), y_at(*v)))
                .collect();
            out.push_str(&format!(
                "<polyline fill=\"none\" stroke=\"{}\" stroke-width=\"2\" points=\"{}\"/>\n",
                series.color,
                coords.join(" ")
            ));

            let legend_y = plot_top + 16.0 + 18.0 * n as f64;
            out.push_str(&format!(
                "<line x1=\"{}\" y1=\"{legend_y:.1}\" x2=\"{}\" y2=\"{legend_y:.1}\" stroke=\"{}\" stroke-width=\"2\"/>\n\
                 <text x=\"{}\" y=\"{:.1}\">{}</text>\n",
                left + 12.0,
                left + 36.0,
                series.color,
                left + 42.0,
                legend_y + 4.0,
                series.label
            ));
        }

        out.push_str("</g>\n");
    }
}

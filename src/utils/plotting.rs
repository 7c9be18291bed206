use std::path::Path;
use plotters::coord::Shift;
use plotters::prelude::*;
use crate::config::defs::PipelineError;
use crate::utils::file::split_sample_key;
use crate::utils::report::MergedDataset;

const GRID_COLUMNS: usize = 2;
const PANEL_WIDTH: u32 = 800;
const PANEL_HEIGHT: u32 = 600;
const GROUP_WIDTH: f64 = 0.8;


/// One chart: bars of `value` per sample, one bar per pass within a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct BarPanel {
    pub title: String,
    pub samples: Vec<String>,
    pub passes: Vec<String>,
    /// (sample index, pass index, value)
    pub bars: Vec<(usize, usize, f64)>,
}

impl BarPanel {
    fn y_range(&self) -> (f64, f64) {
        let max = self.bars.iter().map(|b| b.2).fold(0.0f64, f64::max);
        let min = self.bars.iter().map(|b| b.2).fold(0.0f64, f64::min);
        let top = if max > 0.0 { with_headroom(max) } else { 1.0 };
        let bottom = if min < 0.0 { with_headroom(min) } else { 0.0 };
        (bottom, top)
    }
}


/// Pads `value` away from zero by 10%, staying finite near f64::MAX.
fn with_headroom(value: f64) -> f64 {
    let padded = value + value.abs() * 0.1;
    if padded.is_finite() { padded } else { value }
}


fn plot_err<E: std::fmt::Display>(e: E) -> PipelineError {
    PipelineError::Plot(e.to_string())
}


/// Turns the merged dataset into chart panels, one per field.
///
/// Every value must parse as a finite f64; absent or non-numeric values fail
/// the whole figure, naming the field and sample.
pub fn build_panels(dataset: &MergedDataset) -> Result<Vec<BarPanel>, PipelineError> {
    let mut panels = Vec::with_capacity(dataset.len());

    for (field, values) in dataset.iter() {
        let mut samples: Vec<String> = Vec::new();
        let mut passes: Vec<String> = Vec::new();
        let mut bars = Vec::with_capacity(values.len());

        for (key, value) in values {
            let raw = value.as_ref().ok_or_else(|| PipelineError::MissingValue {
                field: field.to_string(),
                sample: key.clone(),
            })?;
            // f64 parsing accepts "inf" and "NaN", which cannot be drawn
            let number = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| PipelineError::NonNumericValue {
                    field: field.to_string(),
                    sample: key.clone(),
                    value: raw.clone(),
                })?;

            let (pass, sample) = split_sample_key(key);
            let sample_idx = index_of_or_push(&mut samples, sample);
            let pass_idx = index_of_or_push(&mut passes, pass);
            bars.push((sample_idx, pass_idx, number));
        }

        panels.push(BarPanel { title: field.to_string(), samples, passes, bars });
    }
    Ok(panels)
}


fn index_of_or_push(items: &mut Vec<String>, item: &str) -> usize {
    match items.iter().position(|existing| existing == item) {
        Some(idx) => idx,
        None => {
            items.push(item.to_string());
            items.len() - 1
        }
    }
}


/// Two columns, as many rows as needed.
pub fn grid_shape(num_panels: usize) -> (usize, usize) {
    (num_panels.div_ceil(GRID_COLUMNS).max(1), GRID_COLUMNS)
}


/// Renders one grouped bar chart per field into a single figure.
///
/// # Arguments
///
/// * `dataset` - Output of merge_reports.
/// * `output_path` - `.svg` writes SVG, any other extension writes PNG.
///
/// # Returns
/// Nothing; the figure is on disk.
pub fn plot_merged_dataset(dataset: &MergedDataset, output_path: &Path) -> Result<(), PipelineError> {
    let panels = build_panels(dataset)?;
    if panels.is_empty() {
        return Err(PipelineError::Plot("no fields to plot".to_string()));
    }
    for panel in &panels {
        let (y_min, y_max) = panel.y_range();
        if !(y_max - y_min).is_finite() {
            return Err(PipelineError::Plot(format!("value range of '{}' is too wide to draw", panel.title)));
        }
    }

    let (rows, cols) = grid_shape(panels.len());
    let size = (PANEL_WIDTH * cols as u32, PANEL_HEIGHT * rows as u32);

    let is_svg = output_path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("svg"))
        .unwrap_or(false);

    if is_svg {
        let root = SVGBackend::new(output_path, size).into_drawing_area();
        draw_panels(&root, &panels, (rows, cols))?;
        root.present().map_err(plot_err)?;
    } else {
        let root = BitMapBackend::new(output_path, size).into_drawing_area();
        draw_panels(&root, &panels, (rows, cols))?;
        root.present().map_err(plot_err)?;
    }
    Ok(())
}


fn draw_panels<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    panels: &[BarPanel],
    grid: (usize, usize),
) -> Result<(), PipelineError> {
    root.fill(&WHITE).map_err(plot_err)?;
    let areas = root.split_evenly(grid);

    for (panel, area) in panels.iter().zip(areas.iter()) {
        draw_panel(area, panel)?;
    }
    Ok(())
}


fn draw_panel<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, panel: &BarPanel) -> Result<(), PipelineError> {
    let n = panel.samples.len().max(1);
    let (y_min, y_max) = panel.y_range();
    let longest_label = panel.samples.iter().map(|s| s.len()).max().unwrap_or(0) as u32;

    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size((longest_label * 7 + 15).min(200))
        .y_label_area_size(70)
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), y_min..y_max)
        .map_err(plot_err)?;

    let samples = &panel.samples;
    let label_formatter = |x: &f64| {
        let idx = x.round();
        if (x - idx).abs() < 1e-6 && idx >= 0.0 && (idx as usize) < samples.len() {
            samples[idx as usize].clone()
        } else {
            String::new()
        }
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&label_formatter)
        .x_label_style(("sans-serif", 12).into_font().transform(FontTransform::Rotate90))
        .y_desc("value")
        .draw()
        .map_err(plot_err)?;

    let bar_width = GROUP_WIDTH / panel.passes.len().max(1) as f64;
    for (pass_idx, pass) in panel.passes.iter().enumerate() {
        let color = Palette99::pick(pass_idx).mix(0.9);
        let bars = panel
            .bars
            .iter()
            .filter(|(_, p, _)| *p == pass_idx)
            .map(|&(sample_idx, _, value)| {
                let left = sample_idx as f64 - GROUP_WIDTH / 2.0 + pass_idx as f64 * bar_width;
                Rectangle::new([(left, 0.0), (left + bar_width, value)], color.filled())
            });

        let label = if pass.is_empty() { "(no pass)" } else { pass.as_str() };
        chart
            .draw_series(bars)
            .map_err(plot_err)?
            .label(label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    Ok(())
}

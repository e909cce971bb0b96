//! Chart rendering for rank and cube tables
//!
//! Charts are drawn as plain shapes (bars, cells, axes) without text, so
//! the renderer needs no font. The table artifact beside each chart carries
//! the labels.

use std::collections::HashMap;
use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::data::rank::{
    LOWEST_PRODUCTS_BY_REGION_YEAR, TOP_PRODUCTS_BY_REGION_MONTH, TOP_PRODUCTS_BY_REGION_YEAR,
    TOP_VOLUME_PRODUCTS_BY_REGION_YEAR_MONTH,
};
use crate::data::{DataFrame, Series};
use crate::error::{PipelineError, PipelineResult};

/// File stem of the cube-wide heatmap
pub const HEATMAP_CHART: &str = "sales_heatmap_region_year";

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([60, 60, 60]);
const MARGIN: u32 = 40;

/// Hue colours, assigned in first-seen order and reused cyclically
const PALETTE: [Rgb<u8>; 8] = [
    Rgb([68, 1, 84]),
    Rgb([59, 82, 139]),
    Rgb([33, 145, 140]),
    Rgb([94, 201, 98]),
    Rgb([253, 231, 37]),
    Rgb([229, 107, 93]),
    Rgb([166, 97, 26]),
    Rgb([128, 128, 128]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartKind {
    /// One cluster per x value, one bar per hue value within it
    GroupedBar,
    /// Rows keyed by x, columns keyed by the tuple of these columns
    Heatmap { columns: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSpec {
    pub title: String,
    pub kind: ChartKind,
    pub x: String,
    pub y: String,
    pub hue: Option<String>,
}

impl ChartSpec {
    #[must_use]
    pub fn bar(title: impl Into<String>, x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: ChartKind::GroupedBar,
            x: x.into(),
            y: y.into(),
            hue: None,
        }
    }

    #[must_use]
    pub fn hue(mut self, column: impl Into<String>) -> Self {
        self.hue = Some(column.into());
        self
    }

    #[must_use]
    pub fn heatmap(
        title: impl Into<String>,
        rows: impl Into<String>,
        columns: &[&str],
        value: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            kind: ChartKind::Heatmap {
                columns: columns.iter().map(|c| (*c).to_string()).collect(),
            },
            x: rows.into(),
            y: value.into(),
            hue: None,
        }
    }
}

/// Chart drawn for a standard policy's output
#[must_use]
pub fn policy_chart(policy: &str) -> Option<ChartSpec> {
    let spec = match policy {
        LOWEST_PRODUCTS_BY_REGION_YEAR => {
            ChartSpec::bar("Lowest Products by Region and Year", "region", "sale_amount_sum")
                .hue("Year")
        }
        TOP_PRODUCTS_BY_REGION_YEAR => {
            ChartSpec::bar("Top Products by Region and Year", "region", "sale_amount_sum")
                .hue("Year")
        }
        TOP_PRODUCTS_BY_REGION_MONTH => {
            ChartSpec::bar("Top Products by Region and Month", "region", "sale_amount_sum")
                .hue("product_name")
        }
        TOP_VOLUME_PRODUCTS_BY_REGION_YEAR_MONTH => {
            ChartSpec::bar("Top Products by Sales Volume", "Month", "sale_id_count")
                .hue("product_name")
        }
        _ => return None,
    };
    Some(spec)
}

/// Sales count per region across (Year, Month)
#[must_use]
pub fn heatmap_chart() -> ChartSpec {
    ChartSpec::heatmap(
        "Sales Volume by Region, Year and Month",
        "region",
        &["Year", "Month"],
        "sale_id_count",
    )
}

/// Draws a chart of a table to a file
pub trait ChartRenderer: Send + Sync {
    /// # Errors
    /// Returns `PipelineError::Render` if the chart cannot be drawn or saved
    fn render(&self, table: &DataFrame, spec: &ChartSpec, path: &Path) -> PipelineResult<()>;
}

/// PNG output via `image`
#[derive(Debug, Clone, Copy)]
pub struct PngRenderer {
    width: u32,
    height: u32,
}

impl Default for PngRenderer {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 600,
        }
    }
}

impl PngRenderer {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(MARGIN * 3),
            height: height.max(MARGIN * 3),
        }
    }

    fn plot_area(&self) -> (u32, u32) {
        (self.width - 2 * MARGIN, self.height - 2 * MARGIN)
    }

    fn draw_axes(&self, img: &mut RgbImage) {
        let left = MARGIN as f32;
        let bottom = (self.height - MARGIN) as f32;
        draw_line_segment_mut(img, (left, MARGIN as f32), (left, bottom), AXIS);
        draw_line_segment_mut(img, (left, bottom), ((self.width - MARGIN) as f32, bottom), AXIS);
    }

    fn draw_bars(&self, img: &mut RgbImage, table: &Table) {
        let (plot_w, plot_h) = self.plot_area();
        let max = table.max().max(f64::MIN_POSITIVE);
        let cluster_w = plot_w as f64 / table.rows.len() as f64;
        let bar_w = (cluster_w * 0.8 / table.cols.len() as f64).max(1.0);

        for (&(row, col), &value) in &table.cells {
            let height = ((value.max(0.0) / max) * f64::from(plot_h)).round() as u32;
            if height == 0 {
                continue;
            }
            let x = f64::from(MARGIN) + cluster_w * row as f64 + cluster_w * 0.1 + bar_w * col as f64;
            let y = self.height - MARGIN - height;
            let rect = Rect::at(x as i32, y as i32).of_size(bar_w as u32, height);
            draw_filled_rect_mut(img, rect, PALETTE[col % PALETTE.len()]);
        }
        self.draw_axes(img);
    }

    fn draw_heatmap(&self, img: &mut RgbImage, table: &Table) {
        let (plot_w, plot_h) = self.plot_area();
        let max = table.max().max(f64::MIN_POSITIVE);
        let cell_w = (plot_w / table.cols.len() as u32).max(1);
        let cell_h = (plot_h / table.rows.len() as u32).max(1);

        for (&(row, col), &value) in &table.cells {
            let t = (value.max(0.0) / max).clamp(0.0, 1.0);
            let shade = |lo: u8, hi: u8| (f64::from(lo) + (f64::from(hi) - f64::from(lo)) * t) as u8;
            let color = Rgb([shade(247, 8), shade(251, 48), shade(255, 107)]);
            let x = MARGIN + cell_w * col as u32;
            let y = MARGIN + cell_h * row as u32;
            draw_filled_rect_mut(img, Rect::at(x as i32, y as i32).of_size(cell_w, cell_h), color);
        }
        self.draw_axes(img);
    }
}

impl ChartRenderer for PngRenderer {
    fn render(&self, table: &DataFrame, spec: &ChartSpec, path: &Path) -> PipelineResult<()> {
        let fail = |reason: String| PipelineError::Render {
            chart: spec.title.clone(),
            reason,
        };

        let pivot = Table::pivot(table, spec).map_err(fail)?;
        let mut img = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        match spec.kind {
            ChartKind::GroupedBar => self.draw_bars(&mut img, &pivot),
            ChartKind::Heatmap { .. } => self.draw_heatmap(&mut img, &pivot),
        }

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| fail(e.to_string()))?;
        }
        img.save(path).map_err(|e| fail(e.to_string()))?;
        tracing::info!(chart = %spec.title, path = %path.display(), "chart saved");
        Ok(())
    }
}

/// Values summed per (row key, column key), keys in first-seen order
struct Table {
    rows: Vec<String>,
    cols: Vec<String>,
    cells: HashMap<(usize, usize), f64>,
}

impl Table {
    fn pivot(df: &DataFrame, spec: &ChartSpec) -> Result<Self, String> {
        if df.is_empty() {
            return Err("table has no rows".to_string());
        }
        let column = |name: &str| df.column(name).map_err(|e| e.to_string());

        let x = column(&spec.x)?;
        let y = column(&spec.y)?;
        if !y.is_numeric() {
            return Err(format!("column '{}' is not numeric", spec.y));
        }
        let col_keys: Vec<Series> = match &spec.kind {
            ChartKind::GroupedBar => spec.hue.iter().map(|h| column(h)).collect::<Result<_, _>>()?,
            ChartKind::Heatmap { columns } => {
                columns.iter().map(|c| column(c)).collect::<Result<_, _>>()?
            }
        };

        let mut table = Table {
            rows: Vec::new(),
            cols: Vec::new(),
            cells: HashMap::new(),
        };
        for i in 0..df.num_rows() {
            let value = y.get(i).map_err(|e| e.to_string())?;
            let Some(value) = value.as_f64() else {
                continue;
            };
            let row_key = x.get(i).map_err(|e| e.to_string())?.to_string();
            let col_key = col_keys
                .iter()
                .map(|s| s.get(i).map(|v| v.to_string()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?
                .join("-");
            let row = position(&mut table.rows, row_key);
            let col = position(&mut table.cols, col_key);
            *table.cells.entry((row, col)).or_insert(0.0) += value;
        }

        if table.cells.is_empty() {
            return Err(format!("column '{}' has no values", spec.y));
        }
        Ok(table)
    }

    fn max(&self) -> f64 {
        self.cells.values().copied().fold(0.0, f64::max)
    }
}

fn position(keys: &mut Vec<String>, key: String) -> usize {
    if let Some(i) = keys.iter().position(|k| *k == key) {
        return i;
    }
    keys.push(key);
    keys.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked() -> DataFrame {
        DataFrame::from_series(vec![
            Series::from_ints("Year", vec![2023, 2024, 2024]),
            Series::from_ints("Month", vec![1, 1, 2]),
            Series::from_strings("region", vec!["North", "North", "South"]),
            Series::from_strings("product_name", vec!["A", "B", "A"]),
            Series::from_floats("sale_amount_sum", vec![10.0, 25.0, 5.0]),
            Series::from_ints("sale_id_count", vec![1, 3, 2]),
        ])
        .unwrap()
    }

    #[test]
    fn test_bar_chart_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("charts/top.png");
        let spec = policy_chart(TOP_PRODUCTS_BY_REGION_YEAR).unwrap();

        PngRenderer::new(320, 200).render(&ranked(), &spec, &path).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (320, 200));
        assert!(img.pixels().any(|p| PALETTE.contains(p)));
    }

    #[test]
    fn test_heatmap_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{HEATMAP_CHART}.png"));
        PngRenderer::default()
            .render(&ranked(), &heatmap_chart(), &path)
            .unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_pivot_keys_in_first_seen_order() {
        let spec = ChartSpec::bar("t", "region", "sale_id_count").hue("Year");
        let table = Table::pivot(&ranked(), &spec).unwrap();
        assert_eq!(table.rows, vec!["North", "South"]);
        assert_eq!(table.cols, vec!["2023", "2024"]);
        assert_eq!(table.cells[&(0, 1)], 3.0);
    }

    #[test]
    fn test_render_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.png");
        let renderer = PngRenderer::default();

        let text_y = ChartSpec::bar("t", "region", "product_name");
        let err = renderer.render(&ranked(), &text_y, &path).unwrap_err();
        assert!(matches!(err, PipelineError::Render { .. }));
        assert!(!err.is_fatal());

        let empty = ranked().head(0).unwrap();
        let spec = policy_chart(TOP_VOLUME_PRODUCTS_BY_REGION_YEAR_MONTH).unwrap();
        assert!(renderer.render(&empty, &spec, &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_unknown_policy_has_no_chart() {
        assert!(policy_chart("custom").is_none());
    }
}

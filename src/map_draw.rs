use geo::{Contains, MultiPolygon, Point, Polygon};
use ratatui::Frame;
use ratatui::layout::{Margin, Rect};
use ratatui::style::Color;
use ratatui::widgets::canvas::{Canvas, Line};
use ratatui::widgets::{Block, Borders};

use crate::classify::{ClassBreaks, VERY_HIGH_CAP};
use crate::service::Feature;

/// Planar shoelace area, used to drop tiny island fragments before drawing.
fn poly_area(poly: &Polygon<f64>) -> f64 {
    let coords = &poly.exterior().0;
    let mut sum = 0.0;
    for window in coords.windows(2) {
        let a = window[0];
        let b = window[1];
        sum += a.x * b.y - b.x * a.y;
    }
    (sum * 0.5).abs()
}

/// One class of the active render rule: an inclusive value range, a fill
/// color, and the legend label.
#[derive(Debug, Clone)]
pub struct RenderClass {
    pub min: f64,
    pub max: f64,
    pub color: Color,
    pub label: String,
}

/// The whole rendering rule for one attribute. Replaced wholesale on every
/// reclassification; values outside every class fall back to the default.
#[derive(Debug, Clone)]
pub struct RenderRule {
    pub field: String,
    pub classes: Vec<RenderClass>,
    pub default_color: Color,
    pub default_label: String,
}

const CLASS_COLORS: [Color; 4] = [Color::Yellow, Color::Green, Color::Cyan, Color::Blue];

impl RenderRule {
    pub fn from_breaks(breaks: &ClassBreaks) -> Self {
        let mut classes: Vec<RenderClass> = breaks
            .buckets()
            .iter()
            .zip(CLASS_COLORS)
            .map(|(bucket, color)| RenderClass {
                min: bucket.min,
                max: bucket.max,
                color,
                label: bucket.label.clone(),
            })
            .collect();
        // The top class is open-ended for rendering even though its label
        // shows the population max.
        if let Some(top) = classes.last_mut() {
            top.max = VERY_HIGH_CAP;
        }
        Self {
            field: breaks.attribute.clone(),
            classes,
            default_color: Color::Red,
            default_label: "No Data".to_string(),
        }
    }

    /// Fill color for a raw attribute value; null and out-of-range values
    /// (the -999 sentinel included) get the default style.
    pub fn color_for(&self, value: Option<f64>) -> Color {
        let Some(v) = value else {
            return self.default_color;
        };
        self.classes
            .iter()
            .find(|c| v >= c.min && v <= c.max)
            .map(|c| c.color)
            .unwrap_or(self.default_color)
    }
}

/// Holds county geometry and draws the choropleth canvas.
pub struct MapView {
    features: Vec<Feature>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

impl MapView {
    pub fn new(mut features: Vec<Feature>) -> Self {
        // Drop fragments far smaller than a county's main polygon; they only
        // smear the braille canvas.
        for feature in &mut features {
            let mp = &mut feature.geometry;
            if mp.0.len() > 1 {
                let areas: Vec<f64> = mp.0.iter().map(poly_area).collect();
                let max_area = areas.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let threshold = max_area * 0.20;
                let filtered: Vec<Polygon<f64>> = mp
                    .0
                    .clone()
                    .into_iter()
                    .zip(areas)
                    .filter(|(_, area)| *area >= threshold)
                    .map(|(poly, _)| poly)
                    .collect();
                if !filtered.is_empty() {
                    *mp = MultiPolygon(filtered);
                }
            }
        }

        let (mut minx, mut miny, mut maxx, mut maxy) =
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for feature in &features {
            for poly in &feature.geometry.0 {
                for coord in poly.exterior().0.iter() {
                    minx = minx.min(coord.x);
                    miny = miny.min(coord.y);
                    maxx = maxx.max(coord.x);
                    maxy = maxy.max(coord.y);
                }
            }
        }
        if !(minx.is_finite() && miny.is_finite() && maxx.is_finite() && maxy.is_finite()) {
            (minx, miny, maxx, maxy) = (-180.0, -90.0, 180.0, 90.0);
        }

        Self { features, x_bounds: [minx, maxx], y_bounds: [miny, maxy] }
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn feature(&self, index: usize) -> Option<&Feature> {
        self.features.get(index)
    }

    /// Index of the first feature containing the point, if any.
    pub fn hit_test(&self, lon: f64, lat: f64) -> Option<usize> {
        let point = Point::new(lon, lat);
        self.features.iter().position(|f| f.geometry.contains(&point))
    }

    /// Maps a terminal cell inside the map block to lon/lat, or `None` when
    /// the click landed on the border or outside the block.
    pub fn cell_to_coords(&self, area: Rect, column: u16, row: u16) -> Option<(f64, f64)> {
        let inner = area.inner(Margin { horizontal: 1, vertical: 1 });
        if inner.width == 0
            || inner.height == 0
            || column < inner.x
            || column >= inner.x + inner.width
            || row < inner.y
            || row >= inner.y + inner.height
        {
            return None;
        }
        let fx = (f64::from(column - inner.x) + 0.5) / f64::from(inner.width);
        let fy = (f64::from(row - inner.y) + 0.5) / f64::from(inner.height);
        let lon = self.x_bounds[0] + fx * (self.x_bounds[1] - self.x_bounds[0]);
        let lat = self.y_bounds[1] - fy * (self.y_bounds[1] - self.y_bounds[0]);
        Some((lon, lat))
    }

    /// Draws every county boundary in its class color, then repaints the
    /// highlighted county on top.
    pub fn render(
        &self,
        f: &mut Frame,
        area: Rect,
        title: &str,
        rule: Option<&RenderRule>,
        highlight: Option<usize>,
    ) {
        let canvas = Canvas::default()
            .block(Block::default().title(title.to_string()).borders(Borders::ALL))
            .x_bounds(self.x_bounds)
            .y_bounds(self.y_bounds)
            .paint(|ctx| {
                for feature in &self.features {
                    let color = match rule {
                        Some(rule) => rule.color_for(feature.value_of(&rule.field)),
                        None => Color::Gray,
                    };
                    draw_boundaries(ctx, &feature.geometry, color);
                }
                if let Some(feature) = highlight.and_then(|i| self.features.get(i)) {
                    draw_boundaries(ctx, &feature.geometry, Color::White);
                }
            });
        f.render_widget(canvas, area);
    }
}

fn draw_boundaries(
    ctx: &mut ratatui::widgets::canvas::Context<'_>,
    mp: &MultiPolygon<f64>,
    color: Color,
) {
    for poly in &mp.0 {
        for window in poly.exterior().0.windows(2) {
            let a = window[0];
            let b = window[1];
            ctx.draw(&Line { x1: a.x, y1: a.y, x2: b.x, y2: b.y, color });
        }
        if let (Some(first), Some(last)) = (poly.exterior().0.first(), poly.exterior().0.last()) {
            ctx.draw(&Line { x1: last.x, y1: last.y, x2: first.x, y2: first.y, color });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Bucket;
    use serde_json::{Map, Value, json};

    fn square(x0: f64, y0: f64, name: &str, value: f64) -> Feature {
        let ring = vec![
            (x0, y0),
            (x0 + 1.0, y0),
            (x0 + 1.0, y0 + 1.0),
            (x0, y0 + 1.0),
            (x0, y0),
        ];
        let poly = Polygon::new(ring.into(), vec![]);
        let mut attributes = Map::new();
        attributes.insert("NAME".to_string(), json!(name));
        attributes.insert("POPULATION".to_string(), Value::from(value));
        Feature { attributes, geometry: MultiPolygon(vec![poly]) }
    }

    fn rule() -> RenderRule {
        let bucket = |label: &str, min: f64, max: f64| Bucket {
            min,
            max,
            label: label.to_string(),
        };
        RenderRule::from_breaks(&ClassBreaks {
            attribute: "POPULATION".to_string(),
            low: bucket("Low", 0.0, 4000.0),
            medium: bucket("Moderate", 4001.0, 8000.0),
            high: bucket("High", 8001.0, 9000.0),
            very_high: bucket("Very High", 9001.0, 50000.0),
        })
    }

    #[test]
    fn hit_test_finds_the_containing_county() {
        let view = MapView::new(vec![
            square(0.0, 0.0, "West", 100.0),
            square(2.0, 0.0, "East", 200.0),
        ]);
        assert_eq!(view.hit_test(0.5, 0.5), Some(0));
        assert_eq!(view.hit_test(2.5, 0.5), Some(1));
        assert_eq!(view.hit_test(1.5, 0.5), None);
    }

    #[test]
    fn class_colors_follow_value_ranges() {
        let rule = rule();
        assert_eq!(rule.color_for(Some(0.0)), Color::Yellow);
        assert_eq!(rule.color_for(Some(5000.0)), Color::Green);
        assert_eq!(rule.color_for(Some(8500.0)), Color::Cyan);
        // Above the labeled max but under the render cap: still very high.
        assert_eq!(rule.color_for(Some(60000.0)), Color::Blue);
    }

    #[test]
    fn sentinel_and_null_get_the_default_style() {
        let rule = rule();
        assert_eq!(rule.color_for(Some(-999.0)), Color::Red);
        assert_eq!(rule.color_for(None), Color::Red);
        assert_eq!(rule.default_label, "No Data");
    }

    #[test]
    fn cell_coords_map_into_geographic_bounds() {
        let view = MapView::new(vec![square(0.0, 0.0, "Only", 1.0)]);
        // 12x12 block leaves a 10x10 canvas inside the border.
        let area = Rect::new(0, 0, 12, 12);
        let (lon, lat) = view.cell_to_coords(area, 6, 6).unwrap();
        assert!((0.0..=1.0).contains(&lon));
        assert!((0.0..=1.0).contains(&lat));
        // Border cells and outside clicks do not map.
        assert_eq!(view.cell_to_coords(area, 0, 0), None);
        assert_eq!(view.cell_to_coords(area, 30, 6), None);
    }
}

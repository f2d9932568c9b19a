//! SVG line chart of one numeric column against row position.

use crate::dashboard::render::escape;
use crate::payload::Payload;

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 240.0;
const MARGIN: f64 = 32.0;

/// Renders `column` as a polyline, or `None` when the column is missing,
/// not numeric, or has no non-null values.
pub fn line_chart(payload: &Payload, column: &str) -> Option<String> {
    if !payload.dtype_of(column)?.is_numeric() {
        return None;
    }
    let points: Vec<(usize, f64)> = payload
        .column_values(column)?
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| v.as_f64().map(|y| (i, y)))
        .filter(|(_, y)| y.is_finite())
        .collect();
    if points.is_empty() {
        return None;
    }

    let min = points.iter().map(|(_, y)| *y).fold(f64::INFINITY, f64::min);
    let max = points.iter().map(|(_, y)| *y).fold(f64::NEG_INFINITY, f64::max);
    let span = if max > min { max - min } else { 1.0 };
    let last_x = payload.row_count().saturating_sub(1).max(1) as f64;

    let coords: Vec<String> = points
        .iter()
        .map(|(i, y)| {
            let px = MARGIN + (*i as f64 / last_x) * (WIDTH - 2.0 * MARGIN);
            let py = HEIGHT - MARGIN - ((y - min) / span) * (HEIGHT - 2.0 * MARGIN);
            format!("{:.1},{:.1}", px, py)
        })
        .collect();

    Some(format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n\
         <text x=\"{m}\" y=\"16\" font-size=\"12\">{title}</text>\n\
         <line x1=\"{m}\" y1=\"{bottom}\" x2=\"{right}\" y2=\"{bottom}\" stroke=\"#999\"/>\n\
         <line x1=\"{m}\" y1=\"{m}\" x2=\"{m}\" y2=\"{bottom}\" stroke=\"#999\"/>\n\
         <text x=\"2\" y=\"{m}\" font-size=\"10\">{max}</text>\n\
         <text x=\"2\" y=\"{bottom}\" font-size=\"10\">{min}</text>\n\
         <polyline fill=\"none\" stroke=\"#1f77b4\" stroke-width=\"2\" points=\"{points}\"/>\n\
         </svg>\n",
        w = WIDTH,
        h = HEIGHT,
        m = MARGIN,
        bottom = HEIGHT - MARGIN,
        right = WIDTH - MARGIN,
        title = escape(column),
        max = max,
        min = min,
        points = coords.join(" "),
    ))
}

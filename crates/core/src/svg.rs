//! SVG renderer: converts a partition layout into a standalone SVG string.

use crate::viz::LayoutRect;

const FRAME_HEIGHT: f64 = 20.0;

/// Render a partition layout as a standalone SVG document.
///
/// `width` is the pixel width of the drawing; the layout's root-time units
/// are scaled to fill it. `dark` selects the color palette.
pub fn render_svg(rects: &[LayoutRect], width: f64, dark: bool) -> String {
    let total: f64 = rects
        .iter()
        .filter(|r| r.depth == 0)
        .map(|r| r.width)
        .sum();
    let max_depth = rects.iter().map(|r| r.depth).max().unwrap_or(0);
    let height = f64::from(max_depth + 1) * FRAME_HEIGHT;
    let x_scale = if total > 0.0 { width / total } else { 0.0 };

    let mut svg = String::with_capacity(rects.len() * 200);
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}" width="{width}" height="{height}" style="font-family:system-ui,-apple-system,sans-serif;font-size:11px">"#,
    ));

    let bg = if dark { "#1a1a2e" } else { "#ffffff" };
    svg.push_str(&format!(
        r#"<rect width="{width}" height="{height}" fill="{bg}"/>"#,
    ));

    for rect in rects {
        let w = rect.width * x_scale;
        if w < 0.5 {
            continue;
        }
        let x = rect.x * x_scale;
        let y = f64::from(rect.depth) * FRAME_HEIGHT;
        let fill = depth_color(rect.depth, dark);

        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}" rx="1">"#,
            h = FRAME_HEIGHT - 1.0,
        ));
        svg.push_str(&format!(
            "<title>{} ({:.6}s)</title>",
            escape_xml(&rect.name),
            rect.width,
        ));
        svg.push_str("</rect>");

        // Text label if the rect is wide enough.
        if w > 30.0 {
            let text_color = if dark { "#e0e0e0" } else { "#1a1a2e" };
            let tx = x + 3.0;
            let ty = y + FRAME_HEIGHT * 0.75;
            let max_chars = (w / 7.0) as usize;
            let label = &rect.short_name;
            let text = if label.chars().count() > max_chars && max_chars > 2 {
                let truncated: String = label.chars().take(max_chars - 1).collect();
                format!("{truncated}…")
            } else {
                label.clone()
            };
            svg.push_str(&format!(
                r#"<text x="{tx}" y="{ty}" fill="{text_color}" style="pointer-events:none">{}</text>"#,
                escape_xml(&text),
            ));
        }
    }

    svg.push_str("</svg>");
    svg
}

fn depth_color(depth: u32, dark: bool) -> &'static str {
    if dark {
        match depth % 4 {
            0 => "#f44336",
            1 => "#ffa726",
            2 => "#42a5f5",
            _ => "#9575cd",
        }
    } else {
        match depth % 4 {
            0 => "#e63946",
            1 => "#f4845f",
            2 => "#457b9d",
            _ => "#adb5bd",
        }
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

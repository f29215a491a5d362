use kw_core::display::DisplayBuffer;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Color;

/// Cellule pleine : la couleur porte toute l'information.
const CELL: char = '█';

/// Séquence « Reds » (blanc rosé → rouge sombre), 9 points d'ancrage.
const REDS: [(u8, u8, u8); 9] = [
    (255, 245, 240),
    (254, 224, 210),
    (252, 187, 161),
    (252, 146, 114),
    (251, 106, 74),
    (239, 59, 44),
    (203, 24, 29),
    (165, 15, 21),
    (103, 0, 13),
];

/// Map a probability in `[0, 1]` onto the sequential red ramp.
///
/// Out-of-range and non-finite values are clamped.
///
/// # Example
/// ```
/// use kw_render::heatmap::probability_color;
/// use ratatui::style::Color;
/// assert_eq!(probability_color(0.0), Color::Rgb(255, 245, 240));
/// assert_eq!(probability_color(1.0), Color::Rgb(103, 0, 13));
/// ```
#[must_use]
pub fn probability_color(p: f32) -> Color {
    let p = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
    let pos = p * (REDS.len() - 1) as f32;
    let idx = (pos.floor() as usize).min(REDS.len() - 2);
    let t = pos - idx as f32;
    let (a, b) = (REDS[idx], REDS[idx + 1]);
    let lerp = |x: u8, y: u8| (f32::from(x) + (f32::from(y) - f32::from(x)) * t).round() as u8;
    Color::Rgb(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

/// Écrit la carte de chaleur directement dans le `Buffer`, sans widget intermédiaire.
///
/// One terminal row per class (in `display` column order), one terminal
/// column per stored probability vector. When the area is narrower than the
/// buffer, the newest rows are kept on the right edge. Never mutates `display`.
pub fn render_heatmap(buf: &mut Buffer, area: Rect, display: &DisplayBuffer) {
    let visible = display.capacity().min(usize::from(area.width));
    let skip = display.capacity() - visible;
    let classes = display.width().min(usize::from(area.height));

    for (cx, row) in display.iter().skip(skip).enumerate() {
        for (cy, &p) in row.iter().take(classes).enumerate() {
            // Bornés par area.width / area.height ci-dessus.
            let x = area.x + cx as u16;
            let y = area.y + cy as u16;
            if let Some(cell) = buf.cell_mut((x, y)) {
                cell.set_char(CELL).set_fg(probability_color(p));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_is_monotonic_in_green() {
        let greens: Vec<u8> = (0..=20)
            .map(|i| match probability_color(i as f32 / 20.0) {
                Color::Rgb(_, g, _) => g,
                _ => unreachable!(),
            })
            .collect();
        assert!(greens.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn nan_renders_as_zero() {
        assert_eq!(probability_color(f32::NAN), probability_color(0.0));
        assert_eq!(probability_color(7.0), probability_color(1.0));
    }

    #[test]
    fn newest_row_lands_on_right_edge() {
        let mut display = DisplayBuffer::new(10, 3);
        display.append(&[0.0, 1.0, 0.0]);
        let area = Rect::new(0, 0, 4, 3);
        let mut buf = Buffer::empty(area);
        render_heatmap(&mut buf, area, &display);

        let fg = |x: u16, y: u16| buf.cell((x, y)).map(|c| c.fg);
        assert_eq!(fg(3, 1), Some(probability_color(1.0)));
        assert_eq!(fg(3, 0), Some(probability_color(0.0)));
        assert_eq!(fg(2, 1), Some(probability_color(0.0)));
        assert_eq!(display.appended(), 1);
    }

    #[test]
    fn clips_to_small_area() {
        let display = DisplayBuffer::new(30, 12);
        let area = Rect::new(2, 1, 5, 4);
        let mut buf = Buffer::empty(Rect::new(0, 0, 10, 6));
        render_heatmap(&mut buf, area, &display);
        assert_eq!(buf.cell((6, 4)).map(ratatui::buffer::Cell::symbol), Some("█"));
        assert_eq!(buf.cell((7, 4)).map(ratatui::buffer::Cell::symbol), Some(" "));
        assert_eq!(buf.cell((6, 5)).map(ratatui::buffer::Cell::symbol), Some(" "));
    }
}

use kw_core::display::DisplayBuffer;
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::heatmap;
use crate::rate::RateMeter;

/// Application state enum (mirrored for rendering decisions).
///
/// # Example
/// ```
/// use kw_render::ui::RenderState;
/// let state = RenderState::Running;
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderState {
    /// Streaming and classifying.
    Running,
    /// Help overlay visible; streaming continues underneath.
    Help,
    /// Source exhausted, last heatmap kept on screen.
    Finished,
}

/// Compteurs du pipeline affichés dans le panneau latéral.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineCounters {
    pub chunks: u64,
    pub frames: u64,
    pub triggers: u64,
}

/// Everything one redraw needs, borrowed from the drive loop.
pub struct DrawContext<'a> {
    /// Row labels, in classifier output order.
    pub labels: &'a [String],
    pub display: &'a DisplayBuffer,
    pub counters: PipelineCounters,
    pub trigger_rate: &'a RateMeter,
    pub draw_rate: &'a RateMeter,
    /// Human-readable audio source ("mic" or a file name).
    pub source: &'a str,
    pub state: RenderState,
}

/// Draw the full UI: labels + heatmap + sidebar.
pub fn draw(frame: &mut Frame, ctx: &DrawContext) {
    let area = frame.area();

    let label_width = ctx
        .labels
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .min(16) as u16
        + 1;

    // Horizontal split: [labels | heatmap | sidebar(24)]
    let h_chunks = Layout::horizontal([
        Constraint::Length(label_width),
        Constraint::Min(10),
        Constraint::Length(24),
    ])
    .split(area);

    let plot = Block::default()
        .borders(Borders::TOP | Borders::BOTTOM)
        .title(" Probabilités ");
    let heat_area = plot.inner(h_chunks[1]);
    frame.render_widget(plot, h_chunks[1]);
    heatmap::render_heatmap(frame.buffer_mut(), heat_area, ctx.display);

    // Labels aligned on the heatmap rows.
    let label_area = Rect::new(h_chunks[0].x, heat_area.y, h_chunks[0].width, heat_area.height);
    draw_labels(frame, label_area, ctx.labels);

    draw_sidebar(frame, h_chunks[2], ctx);

    if ctx.state == RenderState::Help {
        draw_help_overlay(frame, area);
    }
}

fn draw_labels(frame: &mut Frame, area: Rect, labels: &[String]) {
    let lines: Vec<Line> = labels
        .iter()
        .map(|l| Line::from(Span::styled(l.as_str(), Style::default().fg(Color::Gray))))
        .collect();
    frame.render_widget(Paragraph::new(lines), area);
}

/// Index and value of the most probable class in `row`.
///
/// # Example
/// ```
/// use kw_render::ui::top_class;
/// assert_eq!(top_class(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
/// assert_eq!(top_class(&[]), None);
/// ```
#[must_use]
pub fn top_class(row: &[f32]) -> Option<(usize, f32)> {
    row.iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// Draw the status sidebar.
fn draw_sidebar(frame: &mut Frame, area: Rect, ctx: &DrawContext) {
    let state_str = match ctx.state {
        RenderState::Running => "▶ LIVE",
        RenderState::Help => "? HELP",
        RenderState::Finished => "⏹ FIN",
    };

    let top = if ctx.counters.triggers == 0 {
        None
    } else {
        top_class(ctx.display.latest())
    };
    let (top_label, top_p) = match top {
        Some((i, p)) => (ctx.labels.get(i).map_or("?", String::as_str), p),
        None => ("-", 0.0),
    };
    let ft_str = format!("{:.1}ms", ctx.draw_rate.last_interval.as_secs_f64() * 1000.0);

    let lines = vec![
        Line::from(Span::styled(state_str, Style::default().fg(Color::Green))),
        Line::from(format!(" Src: {}", ctx.source)),
        Line::from(""),
        Line::from(Span::styled("─ Détection ─", Style::default().fg(Color::Yellow))),
        Line::from(Span::styled(
            format!(" {top_label}"),
            Style::default().fg(heatmap::probability_color(top_p.max(0.3))),
        )),
        Line::from(format!(" p = {top_p:.2}")),
        Line::from(""),
        Line::from(Span::styled("─ Pipeline ──", Style::default().fg(Color::Yellow))),
        Line::from(format!(" Chunks: {}", ctx.counters.chunks)),
        Line::from(format!(" Frames: {}", ctx.counters.frames)),
        Line::from(format!(" Triggers: {}", ctx.counters.triggers)),
        Line::from(format!(" {:.1} inf/s", ctx.trigger_rate.per_second())),
        Line::from(""),
        Line::from(Span::styled("─ Info ──────", Style::default().fg(Color::Yellow))),
        Line::from(format!(" {:.0} FPS", ctx.draw_rate.per_second())),
        Line::from(format!(" {ft_str}")),
        Line::from(""),
        Line::from(Span::styled(" ? = help", Style::default().fg(Color::DarkGray))),
    ];

    let sidebar =
        Paragraph::new(lines).block(Block::default().borders(Borders::LEFT).title(" État "));
    frame.render_widget(sidebar, area);
}

/// Draw the help overlay with all keybindings.
fn draw_help_overlay(frame: &mut Frame, area: Rect) {
    let help_text = vec![
        Line::from(Span::styled(" kwspot — Contrôles ", Style::default().fg(Color::Yellow))),
        Line::from(""),
        Line::from(" q/Esc    Quit"),
        Line::from(" r        Reset classifier state"),
        Line::from(" ?        Toggle help"),
        Line::from(""),
        Line::from(Span::styled(" Press ? or Esc to close ", Style::default().fg(Color::DarkGray))),
    ];

    let help_width = 36u16;
    let help_height = help_text.len() as u16 + 2;
    let x = area.x + area.width.saturating_sub(help_width) / 2;
    let y = area.y + area.height.saturating_sub(help_height) / 2;
    let help_area = Rect::new(x, y, help_width.min(area.width), help_height.min(area.height));

    let help = Paragraph::new(help_text).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Help ")
            .style(Style::default().bg(Color::Black).fg(Color::White)),
    );

    frame.render_widget(Clear, help_area);
    frame.render_widget(help, help_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn render(state: RenderState, triggers: u64) -> ratatui::buffer::Buffer {
        let labels: Vec<String> = ["(unknown)", "yes", "(null)"].map(String::from).to_vec();
        let mut display = DisplayBuffer::new(20, 3);
        display.append(&[0.1, 0.8, 0.1]);
        let rate = RateMeter::new(4);
        let mut draw_rate = RateMeter::new(4);
        let t0 = std::time::Instant::now();
        draw_rate.tick_at(t0);
        draw_rate.tick_at(t0 + std::time::Duration::from_millis(40));
        let ctx = DrawContext {
            labels: &labels,
            display: &display,
            counters: PipelineCounters {
                chunks: 8,
                frames: 56,
                triggers,
            },
            trigger_rate: &rate,
            draw_rate: &draw_rate,
            source: "mic",
            state,
        };
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).expect("test backend");
        terminal.draw(|f| draw(f, &ctx)).expect("draw");
        terminal.backend().buffer().clone()
    }

    fn contains(buf: &ratatui::buffer::Buffer, needle: &str) -> bool {
        let area = buf.area;
        (0..area.height).any(|y| {
            let line: String = (0..area.width)
                .filter_map(|x| buf.cell((x, y)).map(ratatui::buffer::Cell::symbol))
                .collect();
            line.contains(needle)
        })
    }

    #[test]
    fn sidebar_shows_counters_and_top_class() {
        let buf = render(RenderState::Running, 1);
        assert!(contains(&buf, "Triggers: 1"));
        assert!(contains(&buf, "Frames: 56"));
        assert!(contains(&buf, " yes"));
        assert!(contains(&buf, "(unknown)"));
    }

    #[test]
    fn sidebar_shows_redraw_interval() {
        let buf = render(RenderState::Running, 1);
        assert!(contains(&buf, "25 FPS"));
        assert!(contains(&buf, "40.0ms"));
    }

    #[test]
    fn no_top_class_before_first_trigger() {
        let buf = render(RenderState::Running, 0);
        assert!(contains(&buf, "p = 0.00"));
    }

    #[test]
    fn help_overlay_lists_keys() {
        let buf = render(RenderState::Help, 1);
        assert!(contains(&buf, "Reset classifier state"));
    }
}

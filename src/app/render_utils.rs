use eframe::egui::{Color32, Painter, Pos2, Rect, Stroke, Vec2};

/// Eleven-stop purple-green diverging scheme, purple for negative.
const PURPLE_GREEN: [(u8, u8, u8); 11] = [
    (0x40, 0x00, 0x4b),
    (0x76, 0x2a, 0x83),
    (0x99, 0x70, 0xab),
    (0xc2, 0xa5, 0xcf),
    (0xe7, 0xd4, 0xe8),
    (0xf7, 0xf7, 0xf7),
    (0xd9, 0xf0, 0xd3),
    (0xa6, 0xdb, 0xa0),
    (0x5a, 0xae, 0x61),
    (0x1b, 0x78, 0x37),
    (0x00, 0x44, 0x1b),
];
const WEIGHT_EXTENT: f64 = 0.4;

pub(super) const POSITIVE_ARROW: Color32 = Color32::from_rgb(0x00, 0x80, 0x00);
pub(super) const NEGATIVE_ARROW: Color32 = Color32::from_rgb(0x80, 0x00, 0x00);
pub(super) const EDGE_OPACITY: f32 = 0.8;

/// Maps a signed input share onto the diverging scheme. Shares beyond +-0.4
/// saturate, and values that land exactly on the neutral midpoint are nudged
/// to the green side of it.
pub(super) fn weight_color(pct_input: f64) -> Color32 {
    let t = if pct_input.is_finite() {
        (pct_input + WEIGHT_EXTENT) / (2.0 * WEIGHT_EXTENT)
    } else {
        0.5
    };
    let t = t.clamp(0.0, 1.0);
    let t = if t < 0.5 { t * 0.998 } else { 0.501 + (t - 0.5) * 0.998 };
    purple_green(t)
}

/// Uniform B-spline through the scheme stops, as d3's `interpolateRgbBasis`.
fn purple_green(t: f64) -> Color32 {
    let n = PURPLE_GREEN.len() - 1;
    let t = t.clamp(0.0, 1.0);
    let i = if t >= 1.0 { n - 1 } else { (t * n as f64).floor() as usize };
    let local = (t - i as f64 / n as f64) * n as f64;

    let channel = |pick: fn((u8, u8, u8)) -> u8| {
        let v1 = f64::from(pick(PURPLE_GREEN[i]));
        let v2 = f64::from(pick(PURPLE_GREEN[i + 1]));
        let v0 = if i > 0 { f64::from(pick(PURPLE_GREEN[i - 1])) } else { 2.0 * v1 - v2 };
        let v3 = if i < n - 1 { f64::from(pick(PURPLE_GREEN[i + 2])) } else { 2.0 * v2 - v1 };
        basis(local, v0, v1, v2, v3).round().clamp(0.0, 255.0) as u8
    };
    Color32::from_rgb(
        channel(|(r, _, _)| r),
        channel(|(_, g, _)| g),
        channel(|(_, _, b)| b),
    )
}

fn basis(t: f64, v0: f64, v1: f64, v2: f64, v3: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    ((1.0 - 3.0 * t + 3.0 * t2 - t3) * v0
        + (4.0 - 6.0 * t2 + 3.0 * t3) * v1
        + (1.0 + 3.0 * t + 3.0 * t2 - 3.0 * t3) * v2
        + t3 * v3)
        / 6.0
}

pub(super) fn arrow_color(weight: f64) -> Color32 {
    if weight > 0.0 { POSITIVE_ARROW } else { NEGATIVE_ARROW }
}

pub(super) fn text_color_for(background: Color32) -> Color32 {
    let luminance = 0.299 * f32::from(background.r())
        + 0.587 * f32::from(background.g())
        + 0.114 * f32::from(background.b());
    if luminance > 160.0 {
        Color32::BLACK
    } else {
        Color32::WHITE
    }
}

pub(super) fn blend_color(base: Color32, overlay: Color32, amount: f32) -> Color32 {
    let amount = amount.clamp(0.0, 1.0);
    let inverse = 1.0 - amount;
    let mix = |from: u8, to: u8| ((f32::from(from) * inverse) + (f32::from(to) * amount)).round() as u8;

    Color32::from_rgba_unmultiplied(
        mix(base.r(), overlay.r()),
        mix(base.g(), overlay.g()),
        mix(base.b(), overlay.b()),
        mix(base.a(), overlay.a()),
    )
}

pub(super) fn with_opacity(color: Color32, opacity: f32) -> Color32 {
    Color32::from_rgba_unmultiplied(
        color.r(),
        color.g(),
        color.b(),
        (255.0 * opacity.clamp(0.0, 1.0)).round() as u8,
    )
}

pub(super) fn draw_background(painter: &Painter, rect: Rect, pan: Vec2, zoom: f32) {
    painter.rect_filled(rect, 0.0, Color32::from_rgb(250, 250, 248));

    let step = (50.0 * zoom.clamp(0.5, 2.0)).max(16.0);
    let origin = rect.min + pan;
    let stroke = Stroke::new(1.0, Color32::from_rgba_unmultiplied(0, 0, 0, 14));

    let mut x = rect.left() + (origin.x - rect.left()).rem_euclid(step);
    while x < rect.right() {
        painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke);
        x += step;
    }

    let mut y = rect.top() + (origin.y - rect.top()).rem_euclid(step);
    while y < rect.bottom() {
        painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], stroke);
        y += step;
    }
}

/// Canvas coordinates have their origin at the top-left corner of the plot.
pub(super) fn world_to_screen(rect: Rect, pan: Vec2, zoom: f32, world: Vec2) -> Pos2 {
    rect.min + pan + world * zoom
}

pub(super) fn screen_to_world(rect: Rect, pan: Vec2, zoom: f32, screen: Pos2) -> Vec2 {
    (screen - rect.min - pan) / zoom
}

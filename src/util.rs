pub fn format_weight(weight: f64) -> String {
    if !weight.is_finite() {
        return "n/a".to_owned();
    }
    if weight != 0.0 && weight.abs() < 0.001 {
        format!("{weight:+.1e}")
    } else {
        format!("{weight:+.3}")
    }
}

/// Cuts `label` to at most `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate_label(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_owned();
    }
    let mut truncated = label
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    truncated.push('…');
    truncated
}

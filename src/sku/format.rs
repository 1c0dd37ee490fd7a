//! Rendering of SKU code strings.

use super::models::{FormatKind, SkuSettings};

/// Minimum width of the sequence segment.
pub const SEQUENCE_WIDTH: usize = 4;

/// Zero-pad to at least four digits. Larger values are never truncated.
pub fn pad4(n: u64) -> String {
    format!("{:0width$}", n, width = SEQUENCE_WIDTH)
}

/// Render a code from its parts. Pure: equal inputs give equal output.
pub fn format_code(
    prefix: &str,
    category_code: &str,
    item_code: &str,
    sequence: u64,
    suffix: &str,
    kind: FormatKind,
) -> String {
    let seq = pad4(sequence);
    match kind {
        FormatKind::CategoryNumber => format!("{prefix}{category_code}-{seq}{suffix}"),
        FormatKind::NumberOnly => format!("{prefix}{seq}{suffix}"),
        FormatKind::Custom => format!("{prefix}{item_code}-{category_code}-{seq}{suffix}"),
    }
}

/// Convenience wrapper that takes prefix, suffix and kind from settings.
pub fn format_with(settings: &SkuSettings, category_code: &str, item_code: &str, sequence: u64) -> String {
    format_code(
        &settings.prefix,
        category_code,
        item_code,
        sequence,
        &settings.suffix,
        settings.format,
    )
}

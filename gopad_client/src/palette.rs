use ratatui::style::Color;

/// Foreground color for text authored by `colors[author]`, indexed the same way as
/// `COLORS` in the terminal this protocol descends from (256-color palette indices).
const TEXT_COLORS: [u8; 5] = [16, 10, 11, 15, 0];

/// Background color for the block cursor of `colors[author]`, indexed the same way as
/// `CURSORS` in the terminal this protocol descends from.
const CURSOR_COLORS: [u8; 5] = [253, 211, 121, 124, 0];

/// `author`/`color` is a `ColorEntry.color` value: 0 means "no palette assigned yet" and maps to
/// the default terminal color; 1..=MAXUSERS index into the palette.
pub fn text_color(author: u32) -> Color {
    let idx = TEXT_COLORS[author as usize % TEXT_COLORS.len()];
    Color::Indexed(idx)
}

pub fn cursor_color(color: u32) -> Color {
    let idx = CURSOR_COLORS[color as usize % CURSOR_COLORS.len()];
    Color::Indexed(idx)
}

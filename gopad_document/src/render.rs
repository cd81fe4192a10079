use crate::types::{ClientId, Row};

/// Default tab stop width, matching the original editor's rendering.
pub const TABSTOP: usize = 4;

/// The pure rendering transform: expand `\t` to spaces up to the next multiple of `TABSTOP`.
///
/// Never enters committed state; used only for drawing and for `cx_to_rx`/`rx_to_cx`.
pub fn render_row(row: &Row) -> (String, Vec<bool>, Vec<ClientId>) {
    render_row_with_tabstop(row, TABSTOP)
}

pub fn render_row_with_tabstop(row: &Row, tabstop: usize) -> (String, Vec<bool>, Vec<ClientId>) {
    let chars = row.chars_vec();
    let temp = row.temp();
    let author = row.author();
    let mut text = String::with_capacity(chars.len());
    let mut rtemp = Vec::with_capacity(chars.len());
    let mut rauthor = Vec::with_capacity(chars.len());
    for (i, ch) in chars.iter().enumerate() {
        if *ch == '\t' {
            let spaces = tabstop - (text.chars().count() % tabstop);
            for _ in 0..spaces {
                text.push(' ');
                rtemp.push(temp[i]);
                rauthor.push(author[i]);
            }
        } else {
            text.push(*ch);
            rtemp.push(temp[i]);
            rauthor.push(author[i]);
        }
    }
    (text, rtemp, rauthor)
}

/// Convert a char index (`cx`) into the document row to a rendered column (`rx`), expanding tabs.
pub fn cx_to_rx(row: &Row, cx: usize) -> usize {
    cx_to_rx_with_tabstop(row, cx, TABSTOP)
}

pub fn cx_to_rx_with_tabstop(row: &Row, cx: usize, tabstop: usize) -> usize {
    let chars = row.chars_vec();
    let mut rx = 0;
    for ch in chars.iter().take(cx) {
        if *ch == '\t' {
            rx += tabstop - (rx % tabstop);
        } else {
            rx += 1;
        }
    }
    rx
}

/// The inverse of [cx_to_rx]: find the char index whose rendered column is closest to (but not
/// past) `rx`.
pub fn rx_to_cx(row: &Row, rx: usize) -> usize {
    rx_to_cx_with_tabstop(row, rx, TABSTOP)
}

pub fn rx_to_cx_with_tabstop(row: &Row, rx: usize, tabstop: usize) -> usize {
    let chars = row.chars_vec();
    let mut cur_rx = 0;
    for (cx, ch) in chars.iter().enumerate() {
        let step = if *ch == '\t' {
            tabstop - (cur_rx % tabstop)
        } else {
            1
        };
        if cur_rx + step > rx {
            return cx;
        }
        cur_rx += step;
    }
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_expansion() {
        let row = Row::from_str("a\tb");
        let (text, temp, author) = render_row(&row);
        assert_eq!(text, "a   b");
        assert_eq!(temp.len(), text.chars().count());
        assert_eq!(author.len(), text.chars().count());
    }

    #[test]
    fn cx_rx_roundtrip_no_tabs() {
        let row = Row::from_str("hello");
        for cx in 0..=row.len() {
            let rx = cx_to_rx(&row, cx);
            assert_eq!(rx, cx);
            assert_eq!(rx_to_cx(&row, rx), cx);
        }
    }

    #[test]
    fn cx_rx_roundtrip_with_tabs() {
        let row = Row::from_str("a\tbc\td");
        for cx in 0..=row.len() {
            let rx = cx_to_rx(&row, cx);
            assert_eq!(rx_to_cx(&row, rx), cx);
        }
    }
}

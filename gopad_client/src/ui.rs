use std::io::{stdout, Stdout};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use gopad_document::{ClientId, Direction, Doc, Op};
use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Direction as LayoutDirection, Layout, Rect};
use ratatui::prelude::{CrosstermBackend, Terminal};
use ratatui::style::{Color, Style};

use crate::error::Error;
use crate::palette::{cursor_color, text_color};
use crate::sync::Client;

/// How often `event::poll` is given to return before the render loop spins again, so the UI
/// thread notices push/pull-driven document changes without a real keypress.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Drives the terminal front end: enters raw mode / the alternate screen, runs the render+input
/// loop, and restores the terminal on exit (normal or panicking).
///
/// Grounded on `client.go`'s `StartClient` main loop and its `drawRows`/`editorDrawStatusBar`/
/// `editorScroll` routines, restated atop crossterm/ratatui instead of termbox.
pub fn run(client: Arc<Client>) -> Result<(), Error> {
    stdout().execute(EnterAlternateScreen)?;
    enable_raw_mode()?;
    let result = main_loop(client);
    let _ = disable_raw_mode();
    let _ = stdout().execute(LeaveAlternateScreen);
    result
}

struct Scroll {
    rowoff: usize,
    coloff: usize,
}

fn main_loop(client: Arc<Client>) -> Result<(), Error> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;
    let mut scroll = Scroll { rowoff: 0, coloff: 0 };

    loop {
        let area = terminal.size()?;
        {
            let mut guard = client.state.lock().unwrap();
            scroll_to_cursor(&guard.tentative_doc, guard.me, area, &mut scroll);
            guard.status = status_line(&guard);
        }
        terminal.draw(|frame| draw(frame, &client, &scroll))?;

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if handle_key(&client, &mut terminal, key.code, key.modifiers)? {
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

fn status_line(state: &crate::state::ClientState) -> String {
    let filename = state.filename.as_deref().unwrap_or("[No Name]");
    format!("{} -- {} pending op(s)", filename, state.self_ops.len())
}

/// Mirrors `editorScroll`: keep the local cursor's row and rendered column inside the viewport.
fn scroll_to_cursor(doc: &Doc, me: ClientId, area: Rect, scroll: &mut Scroll) {
    let rows = area.height.saturating_sub(1) as usize;
    let cols = area.width.saturating_sub(1) as usize;
    let pos = doc.user_pos(me);
    let y = pos.y as usize;
    if y < scroll.rowoff {
        scroll.rowoff = y;
    }
    if y >= scroll.rowoff + rows {
        scroll.rowoff = y + 1 - rows.max(1);
    }
    let rx = if y < doc.rows.len() {
        gopad_document::cx_to_rx(&doc.rows[y], pos.x as usize)
    } else {
        0
    };
    if rx < scroll.coloff {
        scroll.coloff = rx;
    }
    if rx >= scroll.coloff + cols {
        scroll.coloff = rx + 1 - cols.max(1);
    }
}

fn draw(frame: &mut ratatui::Frame, client: &Arc<Client>, scroll: &Scroll) {
    let area = frame.size();
    let chunks = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    let guard = client.state.lock().unwrap();
    draw_rows(frame.buffer_mut(), chunks[0], &guard.tentative_doc, guard.me, scroll);
    draw_status_bar(frame.buffer_mut(), chunks[1], &guard);

    let pos = guard.tentative_doc.user_pos(guard.me);
    let rx = if (pos.y as usize) < guard.tentative_doc.rows.len() {
        gopad_document::cx_to_rx(&guard.tentative_doc.rows[pos.y as usize], pos.x as usize)
    } else {
        0
    };
    drop(guard);
    let cursor_x = chunks[0].x + 1 + rx.saturating_sub(scroll.coloff) as u16;
    let cursor_y = chunks[0].y + (pos.y as usize).saturating_sub(scroll.rowoff) as u16;
    if chunks[0].width > 0 && chunks[0].height > 0 {
        frame.set_cursor(cursor_x.min(area.right().saturating_sub(1)), cursor_y.min(area.bottom().saturating_sub(1)));
    }
}

fn draw_rows(buf: &mut Buffer, area: Rect, doc: &Doc, me: ClientId, scroll: &Scroll) {
    for i in 0..area.height {
        let y = area.y + i;
        let filerow = scroll.rowoff + i as usize;
        buf.get_mut(area.x, y).set_char('~');
        if filerow >= doc.rows.len() {
            continue;
        }
        let (text, _temp, author) = gopad_document::render_row(&doc.rows[filerow]);
        let chars: Vec<char> = text.chars().collect();
        for (k, ch) in chars.iter().enumerate() {
            if k < scroll.coloff {
                continue;
            }
            let col = area.x + 1 + (k - scroll.coloff) as u16;
            if col >= area.x + area.width {
                break;
            }
            let cell = buf.get_mut(col, y);
            cell.set_char(*ch);
            cell.set_style(Style::default().fg(text_color(author[k] as u32)));
        }
        overlay_cursors(buf, area, doc, me, filerow, scroll);
    }
}

/// Draw every other client's cursor as a filled block at their rendered position, matching
/// `drawRows`'s loop over `UserPos` for `user != gp.id`. Drawing past the end of the rendered
/// text is deliberate -- a cursor sitting at end-of-line still needs a visible cell.
fn overlay_cursors(buf: &mut Buffer, area: Rect, doc: &Doc, me: ClientId, filerow: usize, scroll: &Scroll) {
    for entry in &doc.user_pos {
        if entry.client == me || entry.pos.y as usize != filerow {
            continue;
        }
        let rx = gopad_document::cx_to_rx(&doc.rows[filerow], entry.pos.x as usize);
        if rx < scroll.coloff {
            continue;
        }
        let col = area.x + 1 + (rx - scroll.coloff) as u16;
        if col >= area.x + area.width {
            continue;
        }
        let color = doc.color(entry.client).unwrap_or(0);
        let cell = buf.get_mut(col, area.y + (filerow - scroll.rowoff) as u16);
        cell.set_bg(cursor_color(color));
    }
}

fn draw_status_bar(buf: &mut Buffer, area: Rect, state: &crate::state::ClientState) {
    let bg = match state.committed_doc.color(state.me) {
        Some(c) if c != 0 => cursor_color(c),
        _ => Color::White,
    };
    for x in area.x..area.x + area.width {
        let cell = buf.get_mut(x, area.y);
        cell.set_char(' ');
        cell.set_style(Style::default().fg(Color::Black).bg(bg));
    }
    for (i, ch) in state.status.chars().enumerate() {
        if area.x + (i as u16) >= area.x + area.width {
            break;
        }
        let cell = buf.get_mut(area.x + i as u16, area.y);
        cell.set_char(ch);
        cell.set_style(Style::default().fg(Color::Black).bg(bg));
    }
}

/// Handle one keypress. Returns `Ok(true)` when the editor should exit.
fn handle_key(
    client: &Arc<Client>,
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    code: KeyCode,
    modifiers: KeyModifiers,
) -> Result<bool, Error> {
    let me = client.state.lock().unwrap().me;
    match code {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return Ok(true),
        KeyCode::Char('s') if modifiers.contains(KeyModifiers::CONTROL) => {
            save(client, terminal)?;
            return Ok(false);
        }
        KeyCode::Char('d') if modifiers.contains(KeyModifiers::CONTROL) => {
            log_ops(client, vec![
                Op::mv(me, 0, 0, 0, Direction::Right),
                Op::delete(me, 0, 0, 0),
            ])?;
            return Ok(false);
        }
        KeyCode::Left => log_ops(client, vec![Op::mv(me, 0, 0, 0, Direction::Left)])?,
        KeyCode::Right => log_ops(client, vec![Op::mv(me, 0, 0, 0, Direction::Right)])?,
        KeyCode::Up => log_ops(client, vec![Op::mv(me, 0, 0, 0, Direction::Up)])?,
        KeyCode::Down => log_ops(client, vec![Op::mv(me, 0, 0, 0, Direction::Down)])?,
        KeyCode::Home => log_ops(client, vec![Op::mv(me, 0, 0, 0, Direction::Home)])?,
        KeyCode::End => log_ops(client, vec![Op::mv(me, 0, 0, 0, Direction::End)])?,
        KeyCode::Backspace => log_ops(client, vec![Op::delete(me, 0, 0, 0)])?,
        KeyCode::Delete => log_ops(client, vec![
            Op::mv(me, 0, 0, 0, Direction::Right),
            Op::delete(me, 0, 0, 0),
        ])?,
        KeyCode::Tab => log_ops(client, vec![Op::insert(me, 0, 0, 0, '\t')])?,
        KeyCode::Enter => log_ops(client, vec![Op::newline(me, 0, 0, 0)])?,
        KeyCode::Char(ch) => log_ops(client, vec![Op::insert(me, 0, 0, 0, ch)])?,
        _ => {}
    }
    Ok(false)
}

fn log_ops(client: &Arc<Client>, ops: Vec<Op>) -> Result<(), Error> {
    let mut guard = client.state.lock().unwrap();
    for op in ops {
        guard.log_op(op)?;
    }
    Ok(())
}

/// `Ctrl-S`: reuse the status bar as a one-line prompt if there is no filename yet, then write
/// `tentative_doc`'s rows out as newline-joined UTF-8 text. Grounded on `editorPrompt`/the
/// `KeyCtrlS` case in `client.go`'s main loop.
fn save(client: &Arc<Client>, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), Error> {
    let has_name = client.state.lock().unwrap().filename.is_some();
    let path = if has_name {
        client.state.lock().unwrap().filename.clone().unwrap()
    } else {
        match prompt(terminal, "Save as (ESC to cancel): ")? {
            Some(path) => path,
            None => return Ok(()),
        }
    };

    let text = {
        let guard = client.state.lock().unwrap();
        guard
            .tentative_doc
            .rows
            .iter()
            .map(|r| r.text().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    };
    std::fs::write(&path, text)?;

    let mut guard = client.state.lock().unwrap();
    guard.filename = Some(path);
    guard.status = "Saved!".to_string();
    Ok(())
}

fn prompt(terminal: &mut Terminal<CrosstermBackend<Stdout>>, msg: &str) -> Result<Option<String>, Error> {
    let mut buf = String::new();
    loop {
        terminal.draw(|frame| {
            let area = frame.size();
            let line = format!("{}{}", msg, buf);
            let bar = Rect::new(area.x, area.bottom().saturating_sub(1), area.width, 1);
            let b = frame.buffer_mut();
            for x in bar.x..bar.x + bar.width {
                b.get_mut(x, bar.y).set_char(' ');
            }
            for (i, ch) in line.chars().enumerate() {
                if bar.x + (i as u16) >= bar.x + bar.width {
                    break;
                }
                b.get_mut(bar.x + i as u16, bar.y).set_char(ch);
            }
        })?;
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Esc => return Ok(None),
                KeyCode::Enter => return Ok(Some(buf)),
                KeyCode::Backspace => {
                    buf.pop();
                }
                KeyCode::Char(ch) => buf.push(ch),
                _ => {}
            }
        }
    }
}

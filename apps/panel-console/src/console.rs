use std::io::{self, Write};
use std::thread;

use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::terminal::{self, Clear, ClearType, disable_raw_mode, enable_raw_mode};
use crossterm::{cursor, execute};
use panel_stream::{Dimensions, Intent, OutputSink, ViewCommand};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

/// Output sink backed by the local terminal.
pub struct TerminalSink<W: Write> {
    out: W,
    convert_eol: bool,
    last_byte: Option<u8>,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout(convert_eol: bool) -> Self {
        Self::new(io::stdout(), convert_eol)
    }
}

impl<W: Write> TerminalSink<W> {
    /// `convert_eol` turns bare `\n` into `\r\n`. Log lines need it in raw
    /// mode; shell output already carries the PTY's line discipline.
    pub fn new(out: W, convert_eol: bool) -> Self {
        Self {
            out,
            convert_eol,
            last_byte: None,
        }
    }

    fn write_converted(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut start = 0;
        for (idx, &byte) in chunk.iter().enumerate() {
            let previous = if idx == 0 {
                self.last_byte
            } else {
                Some(chunk[idx - 1])
            };
            if byte == b'\n' && previous != Some(b'\r') {
                self.out.write_all(&chunk[start..idx])?;
                self.out.write_all(b"\r\n")?;
                start = idx + 1;
            }
        }
        self.out.write_all(&chunk[start..])
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> OutputSink for TerminalSink<W> {
    fn write(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        let result = if self.convert_eol {
            self.write_converted(chunk)
        } else {
            self.out.write_all(chunk)
        };
        self.last_byte = chunk.last().copied();
        if let Err(err) = result.and_then(|_| self.out.flush()) {
            warn!(target: "panel::console", error = %err, "terminal write failed");
        }
    }

    fn clear(&mut self) {
        self.last_byte = None;
        if let Err(err) = execute!(self.out, Clear(ClearType::All), cursor::MoveTo(0, 0)) {
            warn!(target: "panel::console", error = %err, "terminal clear failed");
        }
    }

    fn propose_dimensions(&self) -> Option<Dimensions> {
        match terminal::size() {
            Ok((cols, rows)) => Some(Dimensions::new(cols, rows)),
            Err(err) => {
                trace!(target: "panel::console", error = %err, "terminal size unavailable");
                None
            }
        }
    }
}

/// Raw mode (and bracketed paste, for shells) for as long as it lives.
pub struct RawModeGuard {
    raw: bool,
    paste: bool,
}

impl RawModeGuard {
    pub fn new(enable: bool, bracketed_paste: bool) -> Self {
        if !enable {
            return Self {
                raw: false,
                paste: false,
            };
        }
        let raw = match enable_raw_mode() {
            Ok(()) => true,
            Err(err) => {
                warn!(target: "panel::console", error = %err, "failed to enable raw mode");
                false
            }
        };
        let paste = raw && bracketed_paste && execute!(io::stdout(), EnableBracketedPaste).is_ok();
        Self { raw, paste }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.paste {
            let _ = execute!(io::stdout(), DisableBracketedPaste);
        }
        if self.raw {
            let _ = disable_raw_mode();
        }
    }
}

/// Bytes a PTY expects for a key press, as a string for an `input` frame.
pub fn encode_key_event(key: &KeyEvent) -> Option<String> {
    let mut out = String::new();
    match key.code {
        KeyCode::Char(c) => {
            if key.modifiers.contains(KeyModifiers::ALT) {
                out.push('\x1b');
            }
            if key.modifiers.contains(KeyModifiers::CONTROL) {
                out.push(control_char(c)?);
            } else {
                out.push(c);
            }
        }
        KeyCode::Enter => out.push('\r'),
        KeyCode::Tab => out.push('\t'),
        KeyCode::BackTab => out.push_str("\x1b[Z"),
        KeyCode::Backspace => out.push('\x7f'),
        KeyCode::Esc => out.push('\x1b'),
        KeyCode::Up => out.push_str("\x1b[A"),
        KeyCode::Down => out.push_str("\x1b[B"),
        KeyCode::Right => out.push_str("\x1b[C"),
        KeyCode::Left => out.push_str("\x1b[D"),
        KeyCode::Home => out.push_str("\x1b[H"),
        KeyCode::End => out.push_str("\x1b[F"),
        KeyCode::PageUp => out.push_str("\x1b[5~"),
        KeyCode::PageDown => out.push_str("\x1b[6~"),
        KeyCode::Delete => out.push_str("\x1b[3~"),
        KeyCode::Insert => out.push_str("\x1b[2~"),
        _ => return None,
    }
    Some(out)
}

fn control_char(c: char) -> Option<char> {
    match c.to_ascii_lowercase() {
        lower @ 'a'..='z' => Some(char::from(lower as u8 - b'a' + 1)),
        ' ' | '@' | '2' => Some('\0'),
        '[' | '3' => Some('\x1b'),
        '\\' | '4' => Some('\x1c'),
        '_' | '7' => Some('\x1f'),
        _ => None,
    }
}

fn is_ctrl(key: &KeyEvent, c: char) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char(c)
}

/// What a terminal event means to a mounted view of `intent`.
pub fn map_event(intent: Intent, event: Event) -> Option<ViewCommand> {
    match event {
        Event::Resize(..) => Some(ViewCommand::Resize),
        Event::Paste(text) if intent == Intent::Shell => Some(ViewCommand::Input(text)),
        Event::Key(key) if key.kind != KeyEventKind::Release => match intent {
            Intent::Shell => {
                if is_ctrl(&key, ']') || is_ctrl(&key, '5') {
                    Some(ViewCommand::Unmount)
                } else {
                    encode_key_event(&key).map(ViewCommand::Input)
                }
            }
            Intent::Logs => {
                if is_ctrl(&key, 'c') {
                    return Some(ViewCommand::Unmount);
                }
                match key.code {
                    KeyCode::Char('s') | KeyCode::Char('S') => Some(ViewCommand::ToggleStream),
                    KeyCode::Char('c') | KeyCode::Char('C') => Some(ViewCommand::CycleCategory),
                    KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                        Some(ViewCommand::Unmount)
                    }
                    _ => None,
                }
            }
        },
        _ => None,
    }
}

/// Read terminal events on a dedicated thread until the view goes away.
/// `event::read` cannot be cancelled, so the thread is never joined.
pub fn spawn_input_reader(intent: Intent, commands: UnboundedSender<ViewCommand>) -> io::Result<()> {
    thread::Builder::new()
        .name("panel-input".into())
        .spawn(move || {
            loop {
                let event = match event::read() {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(target: "panel::console", error = %err, "terminal input failed");
                        let _ = commands.send(ViewCommand::Unmount);
                        return;
                    }
                };
                let Some(command) = map_event(intent, event) else {
                    continue;
                };
                let unmount = command == ViewCommand::Unmount;
                if commands.send(command).is_err() || unmount {
                    debug!(target: "panel::console", "input reader finished");
                    return;
                }
            }
        })?;
    Ok(())
}

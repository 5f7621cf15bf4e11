// src/util/io/framer.rs
//! Line Framer - turns a polled byte stream into tagged command lines

pub const COMMAND_TAG: &str = "@CMD";
/// Operator console command carrying a bare JSON payload
pub const CONSOLE_TAG: &str = "json";

/// Payload of a `json <payload>` console line, trimmed. `None` for any
/// other line.
pub fn console_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(CONSOLE_TAG)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// Accumulates bytes until `\n`. Lines that grow past the capacity are
/// dropped whole, and only command or console lines are handed out.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_line: usize,
    discarding: bool,
}

impl LineFramer {
    /// `max_line` includes room for a terminator, so at most
    /// `max_line - 1` content bytes are kept.
    pub fn new(max_line: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_line),
            max_line,
            discarding: false,
        }
    }

    /// Feed one byte. Returns a complete command line when `byte`
    /// terminates one.
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\r' => None,
            b'\n' => {
                let was_discarding = std::mem::replace(&mut self.discarding, false);
                if was_discarding || self.buf.is_empty() {
                    self.buf.clear();
                    return None;
                }
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                self.buf.clear();
                if line.starts_with(COMMAND_TAG) || console_payload(&line).is_some() {
                    Some(line)
                } else {
                    None
                }
            }
            _ => {
                if self.discarding {
                    return None;
                }
                if self.buf.len() + 1 < self.max_line {
                    self.buf.push(byte);
                } else {
                    // overflow, drop the rest of this line
                    self.buf.clear();
                    self.discarding = true;
                }
                None
            }
        }
    }

    /// Feed a chunk, collecting every completed command line
    pub fn extend(&mut self, bytes: &[u8]) -> Vec<String> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

//! In-band control frames.
//!
//! The transport carries a single byte stream, so resize requests travel
//! inline with keystrokes. A chunk is a control frame when its first byte
//! matches the configured [`ControlPrefix`]; everything else is terminal
//! input. Control payloads are JSON-shaped (`{"cols":100,"rows":40}`) but are
//! scanned field by field rather than parsed, because chunks may be truncated
//! or carry several messages.

use hostshell_pty::ResizeRequest;

/// ASCII record separator. Unprintable, so a user cannot type it by accident.
pub const DEFAULT_SENTINEL: u8 = 0x1e;

const COLS_KEY: &[u8] = b"\"cols\"";
const ROWS_KEY: &[u8] = b"\"rows\"";

/// How a chunk is recognised as a control frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControlPrefix {
    /// The chunk starts with `{`. The brace is part of the payload.
    #[default]
    Brace,
    /// The chunk starts with this byte, which is stripped before decoding.
    Sentinel(u8),
}

/// A classified inbound chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Control(&'a [u8]),
    Data(&'a [u8]),
}

impl ControlPrefix {
    pub fn classify<'a>(&self, chunk: &'a [u8]) -> Frame<'a> {
        match (self, chunk.first()) {
            (ControlPrefix::Brace, Some(b'{')) => Frame::Control(chunk),
            (ControlPrefix::Sentinel(sentinel), Some(first)) if first == sentinel => {
                Frame::Control(&chunk[1..])
            }
            _ => Frame::Data(chunk),
        }
    }
}

/// Decode a resize request. Never fails: anything unrecognisable yields an
/// empty request, which callers treat as a no-op.
pub fn decode_resize(payload: &[u8]) -> ResizeRequest {
    ResizeRequest::new(scan_field(payload, COLS_KEY), scan_field(payload, ROWS_KEY))
}

/// Last valid value following `key` anywhere in `payload`.
fn scan_field(payload: &[u8], key: &[u8]) -> Option<u16> {
    let mut found = None;
    let mut from = 0;
    while let Some(offset) = find(&payload[from..], key) {
        let value_start = from + offset + key.len();
        if let Some(value) = parse_value(&payload[value_start..]) {
            found = Some(value);
        }
        from = value_start;
    }
    found
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Skip whitespace and the separating colon, then read a positive `u16`.
fn parse_value(rest: &[u8]) -> Option<u16> {
    let start = rest
        .iter()
        .position(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b':'))?;
    let digits = rest[start..]
        .iter()
        .take_while(|b| b.is_ascii_digit());

    let mut value: u16 = 0;
    let mut any = false;
    for digit in digits {
        any = true;
        value = value
            .checked_mul(10)?
            .checked_add(u16::from(digit - b'0'))?;
    }
    (any && value > 0).then_some(value)
}

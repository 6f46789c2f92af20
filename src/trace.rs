//! Packet traces
//!
//! A trace is a text file with one raw 256-byte packet per line, written as
//! hex. Bytes may be separated by whitespace, anything up to a `:` is a label
//! and `#` starts a comment. The debug hex dumps of a running driver can be
//! pasted in after joining their lines.

use thiserror::Error;
use tracing::debug;

use applespi_input::InputEvent;
use applespi_transport::{PACKET_SIZE, STATUS_OK};

use crate::engine::{BusOp, Engine, EngineStats, Step};

/// Errors while parsing a trace
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("line {line}: invalid hex digit '{digit}'")]
    InvalidHex { line: usize, digit: char },

    #[error("line {line}: odd number of hex digits")]
    OddLength { line: usize },

    #[error("line {line}: expected 256 bytes, got {got}")]
    WrongSize { line: usize, got: usize },
}

/// Parse one packet from hex, reporting errors against `line`
pub fn parse_packet_hex(text: &str, line: usize) -> Result<[u8; PACKET_SIZE], TraceError> {
    let digits: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(TraceError::OddLength { line });
    }

    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks(2) {
        let hi = hex_value(pair[0], line)?;
        let lo = hex_value(pair[1], line)?;
        bytes.push((hi << 4) | lo);
    }

    bytes
        .try_into()
        .map_err(|b: Vec<u8>| TraceError::WrongSize { line, got: b.len() })
}

fn hex_value(c: char, line: usize) -> Result<u8, TraceError> {
    c.to_digit(16)
        .map(|v| v as u8)
        .ok_or(TraceError::InvalidHex { line, digit: c })
}

/// Parse a whole trace
pub fn parse_trace(text: &str) -> Result<Vec<[u8; PACKET_SIZE]>, TraceError> {
    let mut packets = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("");
        let line = match line.split_once(':') {
            Some((_, rest)) => rest,
            None => line,
        };
        if line.trim().is_empty() {
            continue;
        }
        packets.push(parse_packet_hex(line, idx + 1)?);
    }
    Ok(packets)
}

/// Result of replaying a trace
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<InputEvent>,
    /// Packets the engine wanted to write, in order
    pub writes: Vec<[u8; PACKET_SIZE]>,
    pub stats: EngineStats,
}

/// Feed every packet of a trace through `engine` as if read after an interrupt
///
/// Writes the engine starts are accepted with a good status; their responses
/// are expected to appear in the trace.
pub fn replay(engine: &mut Engine, packets: &[[u8; PACKET_SIZE]]) -> Replay {
    let mut out = Replay::default();
    let step = engine.start();
    settle(engine, step, &mut out);

    for packet in packets {
        let mut step = engine.interrupt();
        if step.next == Some(BusOp::Read) {
            out.events.append(&mut step.events);
            step = engine.read_complete(Ok(*packet));
        } else {
            debug!("Engine did not start a read; packet skipped");
        }
        settle(engine, step, &mut out);
    }

    out.stats = engine.stats();
    out
}

fn settle(engine: &mut Engine, mut step: Step, out: &mut Replay) {
    loop {
        out.events.append(&mut step.events);
        match step.next.take() {
            Some(BusOp::Write(buf)) => {
                out.writes.push(buf);
                step = engine.write_complete(Ok(STATUS_OK));
            }
            // Reads only follow interrupts, which come from the trace
            Some(BusOp::Read) | None => break,
        }
    }
}

//! Operator command intake.
//!
//! The protocol is one decimal number per line: the target current in mA,
//! with `0` meaning off. `LineAssembler` turns a byte stream into lines with
//! a fixed buffer; `parse_target_command` validates one line.
//!
//! On a host the byte stream is stdin, which cannot be polled without
//! blocking, so `CommandIntake` runs the assembler on its own thread and
//! hands finished lines to the control thread over a bounded channel.

use std::io::Read;
use std::thread::JoinHandle;

use crossbeam_channel as xch;

use crate::error::CommandError;

/// A validated target update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetCommand {
    /// Zero: drive the output to zero now.
    Off,
    Set(f32),
}

impl TargetCommand {
    pub fn target_ma(self) -> f32 {
        match self {
            Self::Off => 0.0,
            Self::Set(ma) => ma,
        }
    }
}

/// Parse one command line against the absolute maximum.
pub fn parse_target_command(line: &str, max_ma: f32) -> Result<TargetCommand, CommandError> {
    let text = line.trim();
    if text.is_empty() {
        return Err(CommandError::Empty);
    }
    let value: f32 = text
        .parse()
        .map_err(|_| CommandError::NotANumber(text.to_string()))?;
    if !value.is_finite() {
        return Err(CommandError::NonFinite);
    }
    if value < 0.0 {
        return Err(CommandError::Negative(value));
    }
    if value > max_ma {
        return Err(CommandError::AboveMaximum { value, max: max_ma });
    }
    Ok(if value == 0.0 {
        TargetCommand::Off
    } else {
        TargetCommand::Set(value)
    })
}

/// Assembles newline-terminated lines in a fixed `N`-byte buffer.
///
/// `\r` is dropped. Once a line outgrows the buffer the rest of it is
/// discarded up to the next newline, which then yields `LineTooLong`.
#[derive(Debug)]
pub struct LineAssembler<const N: usize> {
    buf: [u8; N],
    len: usize,
    overflowed: bool,
}

impl<const N: usize> Default for LineAssembler<N> {
    fn default() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            overflowed: false,
        }
    }
}

impl<const N: usize> LineAssembler<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns a finished line on `\n`.
    pub fn push(&mut self, byte: u8) -> Option<Result<String, CommandError>> {
        match byte {
            b'\r' => None,
            b'\n' => {
                let out = if self.overflowed {
                    Err(CommandError::LineTooLong { limit: N })
                } else {
                    Ok(String::from_utf8_lossy(&self.buf[..self.len]).into_owned())
                };
                self.len = 0;
                self.overflowed = false;
                Some(out)
            }
            _ if self.overflowed => None,
            b => {
                if self.len == N {
                    self.overflowed = true;
                } else {
                    self.buf[self.len] = b;
                    self.len += 1;
                }
                None
            }
        }
    }

    /// Bytes buffered for the current, unfinished line.
    pub fn pending(&self) -> usize {
        self.len
    }
}

/// Longest accepted command line.
pub const MAX_LINE: usize = 64;

pub type IntakeItem = Result<String, CommandError>;

/// Background reader feeding assembled lines to the control thread.
///
/// The thread ends at end of input, on a read error, or when the receiver is
/// dropped. It is not joined on drop: a blocked stdin read cannot be
/// interrupted, and the process exit reaps it.
pub struct CommandIntake {
    rx: xch::Receiver<IntakeItem>,
    _handle: JoinHandle<()>,
}

impl CommandIntake {
    pub fn spawn<R: Read + Send + 'static>(mut reader: R, capacity: usize) -> Self {
        let (tx, rx) = xch::bounded(capacity.max(1));
        let handle = std::thread::spawn(move || {
            let mut asm = LineAssembler::<MAX_LINE>::new();
            let mut chunk = [0u8; 256];
            loop {
                let n = match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "command input read failed");
                        break;
                    }
                };
                for &b in &chunk[..n] {
                    if let Some(item) = asm.push(b)
                        && tx.send(item).is_err()
                    {
                        tracing::debug!("command consumer disconnected, exiting reader");
                        return;
                    }
                }
            }
            // Flush a final unterminated line.
            if asm.pending() > 0
                && let Some(item) = asm.push(b'\n')
            {
                let _ = tx.send(item);
            }
            tracing::debug!("command input closed");
        });
        Self {
            rx,
            _handle: handle,
        }
    }

    pub fn receiver(&self) -> &xch::Receiver<IntakeItem> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed<const N: usize>(asm: &mut LineAssembler<N>, bytes: &[u8]) -> Vec<IntakeItem> {
        bytes.iter().filter_map(|&b| asm.push(b)).collect()
    }

    #[test]
    fn assembles_lines_and_drops_carriage_returns() {
        let mut asm = LineAssembler::<16>::new();
        let out = feed(&mut asm, b"250\r\n0\n");
        assert_eq!(out, vec![Ok("250".to_string()), Ok("0".to_string())]);
    }

    #[test]
    fn overlong_line_is_reported_once_and_recovers() {
        let mut asm = LineAssembler::<4>::new();
        let out = feed(&mut asm, b"123456789\n12\n");
        assert_eq!(
            out,
            vec![
                Err(CommandError::LineTooLong { limit: 4 }),
                Ok("12".to_string())
            ]
        );
    }

    #[test]
    fn exactly_full_buffer_is_accepted() {
        let mut asm = LineAssembler::<4>::new();
        assert_eq!(feed(&mut asm, b"1234\n"), vec![Ok("1234".to_string())]);
    }

    #[test]
    fn zero_parses_as_off() {
        assert_eq!(parse_target_command(" 0 ", 1400.0), Ok(TargetCommand::Off));
        assert_eq!(parse_target_command("0.0", 1400.0), Ok(TargetCommand::Off));
    }

    #[test]
    fn boundary_maximum_is_accepted() {
        assert_eq!(
            parse_target_command("1400", 1400.0),
            Ok(TargetCommand::Set(1400.0))
        );
    }
}

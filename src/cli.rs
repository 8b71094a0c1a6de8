//! CLI utilities for the currency client.
//!
//! The utilities present in this module read lookups from an interactive user and print what
//! the server sends back.
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::protocol::Response;

pub const PROMPT: &str = "currency> ";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Usage: <search string or *>")]
    Empty,
    #[error("unrecognized command '{0}'")]
    Unrecognized(String),
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
}

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `.exit`, or end of input
    Exit,
    /// Search string (or `*`) to send to the server
    Lookup(String),
}

/// Prompt user for a lookup.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    write!(&mut writer, "{PROMPT}")?;
    writer.flush()?;

    let mut s = String::default();
    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }

    match s.trim() {
        "" => Err(CommandError::Empty),
        ".exit" => Ok(Command::Exit),
        s if s.starts_with('.') => Err(CommandError::Unrecognized(s.to_string())),
        s => Ok(Command::Lookup(s.to_string())),
    }
}

/// Writes a response for a human: one record per line, `no match`, or the error message.
pub fn print_response<W: Write>(mut writer: W, resp: &Response) -> io::Result<()> {
    match resp {
        Response::Records(records) if records.is_empty() => writeln!(writer, "no match"),
        Response::Records(records) => {
            for record in records {
                writeln!(writer, "{record}")?;
            }
            Ok(())
        }
        Response::Error(err) => writeln!(writer, "error: {}", err.message),
    }
}

//! TCP client for the remote emulator's text command protocol.
//!
//! [`RemoteClient`] speaks the blocking call-and-response protocol defined
//! in [`protocol`] over a TCP socket and exposes it to the core as a
//! [`DebugTarget`]. The core never names this crate; frontends box the
//! client and hand it to a `DebugSession`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use zrdb_core::target::{DebugTarget, Registers, TargetError};

pub mod protocol;

use protocol::{
    PROMPT, cmd_disable_breakpoint, cmd_enable_breakpoint, cmd_read_memory, cmd_set_breakpoint,
    find_error, parse_capacity, parse_hex_dump, parse_registers, take_response,
};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RemoteClient {
    addr: String,
    stream: Option<TcpStream>,
    pending: Vec<u8>,
}

impl RemoteClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            stream: None,
            pending: Vec::new(),
        }
    }

    /// Send one command line and collect the prompt-terminated response.
    fn exchange(&mut self, command: &str) -> Result<Vec<String>, TargetError> {
        let stream = self.stream.as_mut().ok_or(TargetError::NotConnected)?;
        log::trace!("-> {command}");
        stream.write_all(command.as_bytes())?;
        stream.write_all(b"\n")?;

        let lines = read_response(stream, &mut self.pending)?;
        if let Some(error) = find_error(&lines) {
            return Err(TargetError::Protocol(error.to_string()));
        }
        Ok(lines)
    }

    fn first_line(lines: Vec<String>, what: &str) -> Result<String, TargetError> {
        lines
            .into_iter()
            .next()
            .ok_or_else(|| TargetError::Protocol(format!("empty {what} response")))
    }
}

fn read_response(
    stream: &mut TcpStream,
    pending: &mut Vec<u8>,
) -> Result<Vec<String>, TargetError> {
    let mut chunk = [0u8; 1024];
    loop {
        if let Some((lines, used)) = take_response(pending) {
            pending.drain(..used);
            return Ok(lines);
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(TargetError::Protocol(format!(
                "connection closed waiting for {PROMPT:?}"
            )));
        }
        pending.extend_from_slice(&chunk[..n]);
    }
}

impl DebugTarget for RemoteClient {
    fn connect(&mut self) -> Result<(), TargetError> {
        let stream = TcpStream::connect(&self.addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        self.stream = Some(stream);
        self.pending.clear();

        // The remote greets with a banner terminated like any response.
        let banner = read_response(
            self.stream.as_mut().ok_or(TargetError::NotConnected)?,
            &mut self.pending,
        )?;
        for line in &banner {
            log::debug!("remote: {line}");
        }
        Ok(())
    }

    fn read_memory(&mut self, address: u16, len: u16) -> Result<Vec<u8>, TargetError> {
        let lines = self.exchange(&cmd_read_memory(address, len))?;
        let dump = lines.join("");
        parse_hex_dump(&dump).map_err(TargetError::Protocol)
    }

    fn read_registers(&mut self) -> Result<Registers, TargetError> {
        let lines = self.exchange("get-registers")?;
        let line = Self::first_line(lines, "register")?;
        parse_registers(&line).map_err(TargetError::Protocol)
    }

    fn page_table_line(&mut self) -> Result<String, TargetError> {
        let lines = self.exchange("get-memory-pages")?;
        // A machine without paging legitimately answers with nothing.
        Ok(lines.into_iter().next().unwrap_or_default())
    }

    fn breakpoint_capacity(&mut self) -> Result<usize, TargetError> {
        let lines = self.exchange("get-breakpoint-count")?;
        let line = Self::first_line(lines, "breakpoint-count")?;
        parse_capacity(&line).map_err(TargetError::Protocol)
    }

    fn set_breakpoint(&mut self, index: i32, address: u16) -> Result<(), TargetError> {
        self.exchange(&cmd_set_breakpoint(index, address))?;
        Ok(())
    }

    fn enable_breakpoint(&mut self, index: i32) -> Result<(), TargetError> {
        self.exchange(&cmd_enable_breakpoint(index))?;
        Ok(())
    }

    fn disable_breakpoint(&mut self, index: i32) -> Result<(), TargetError> {
        self.exchange(&cmd_disable_breakpoint(index))?;
        Ok(())
    }
}

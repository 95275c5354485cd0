//! Operator frontend: connect to a remote emulator, disassemble around an
//! address, write the listing, and show registers, breakpoints, and the
//! reconstructed call stack.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use config::{Config, InstructionSet};
use zrdb_core::labels::SymbolTable;
use zrdb_core::opcodes::OpcodeTableSet;
use zrdb_core::session::DebugSession;
use zrdb_remote::RemoteClient;

#[derive(Debug, Parser)]
#[command(name = "zrdb", about = "Remote Z80 debug adapter")]
struct Args {
    /// Remote emulator host.
    #[arg(long)]
    host: Option<String>,

    /// Remote emulator port.
    #[arg(long)]
    port: Option<u16>,

    /// Config file path.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Symbol file with `BANK:OFFSET name` lines.
    #[arg(long)]
    sym: Option<PathBuf>,

    /// Address to disassemble around (hex); defaults to the current PC.
    #[arg(long)]
    address: Option<String>,

    /// Listing output path.
    #[arg(long)]
    listing: Option<PathBuf>,

    /// Breakpoint addresses (hex) or label names to arm.
    #[arg(long = "break", value_name = "ADDR|LABEL")]
    breakpoints: Vec<String>,
}

fn parse_hex_address(input: &str) -> Option<u16> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix('$'))
        .unwrap_or(trimmed);
    u16::from_str_radix(digits, 16).ok()
}

fn run(args: Args) -> Result<(), String> {
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config: Config = config::load(&config_path);
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(listing) = args.listing {
        config.listing_path = listing;
    }
    if let Some(sym) = args.sym {
        config.symbols_path = Some(sym);
    }

    let tables = match config.instruction_set {
        InstructionSet::Z80 => OpcodeTableSet::z80(),
        InstructionSet::Z80Next => OpcodeTableSet::z80_next(),
    }
    .map_err(|e| format!("opcode tables: {e}"))?;

    let client = RemoteClient::new(&config.host, config.port);
    let mut session = DebugSession::connect(Box::new(client), tables, config.slot_size)
        .map_err(|e| format!("connect to {}:{}: {e}", config.host, config.port))?;

    let symbols = match &config.symbols_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("read {}: {e}", path.display()))?;
            let sym = SymbolTable::parse(&text).map_err(|e| format!("{}: {e}", path.display()))?;
            session.set_symbols(sym.clone());
            Some(sym)
        }
        None => None,
    };

    session.refresh_paging().map_err(|e| e.to_string())?;

    let regs = session.registers().map_err(|e| e.to_string())?;
    let address = match &args.address {
        Some(text) => {
            parse_hex_address(text).ok_or_else(|| format!("bad address {text:?}"))?
        }
        None => regs.pc,
    };

    session.update_around(address).map_err(|e| e.to_string())?;

    for spec in &args.breakpoints {
        let target = parse_hex_address(spec).or_else(|| {
            let (bank, offset) = symbols.as_ref()?.lookup_name(spec)?;
            let bank = session.address_space().bank(bank)?;
            bank.is_paged_in.then(|| bank.paged_address + offset)
        });
        let Some(target) = target else {
            return Err(format!("breakpoint {spec:?} is neither an address nor a known label"));
        };
        session.update_around(target).map_err(|e| e.to_string())?;
        let bp = session
            .add_breakpoint_at_address(target)
            .map_err(|e| format!("breakpoint at ${target:04X}: {e}"))?;
        println!("breakpoint {} armed at ${target:04X}", bp.index);
    }

    session
        .write_listing(&config.listing_path)
        .map_err(|e| format!("write {}: {e}", config.listing_path.display()))?;
    println!("listing written to {}", config.listing_path.display());

    println!();
    println!(
        "PC={:04X} SP={:04X} AF={:04X} BC={:04X} DE={:04X} HL={:04X} IX={:04X} IY={:04X}",
        regs.pc, regs.sp, regs.af, regs.bc, regs.de, regs.hl, regs.ix, regs.iy
    );
    if let Some(line) = session.line_for_address(regs.pc) {
        println!("PC is listing line {line}");
    }

    let frames = session.call_stack().map_err(|e| e.to_string())?;
    println!();
    println!("call stack:");
    for (depth, frame) in frames.iter().enumerate() {
        match session.line_for_address(*frame) {
            Some(line) => println!("  #{depth} ${frame:04X}  (line {line})"),
            None => println!("  #{depth} ${frame:04X}"),
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            eprintln!("zrdb: {message}");
            ExitCode::FAILURE
        }
    }
}

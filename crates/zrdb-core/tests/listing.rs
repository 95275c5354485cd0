//! Disassembly-cache behavior: incremental updates, preloading, rendering.

mod common;

use common::FakeTarget;
use zrdb_core::disasm::Disassembler;
use zrdb_core::labels::SymbolTable;
use zrdb_core::listing::DisassemblyCache;
use zrdb_core::memory::{AddressSpace, BankId};
use zrdb_core::opcodes::OpcodeTableSet;

fn z80() -> Disassembler {
    Disassembler::new(OpcodeTableSet::z80().unwrap())
}

/// ld a,$01 / call $9000 / ret at 0x8000, ld hl,$1234 / ret at 0x9000.
fn small_program(target: &mut FakeTarget) {
    target.load(0x8000, &[0x3E, 0x01, 0xCD, 0x00, 0x90, 0xC9]);
    target.load(0x9000, &[0x21, 0x34, 0x12, 0xC9]);
}

#[test]
fn update_is_idempotent() {
    let mut target = FakeTarget::new();
    small_program(&mut target);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    let first = cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();
    assert!(first);

    let second = cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();
    assert!(!second);

    let bank = cache.bank(BankId::unpaged()).unwrap();
    assert_eq!(bank.lines().count(), 5);
}

#[test]
fn call_targets_are_preloaded() {
    let mut target = FakeTarget::new();
    small_program(&mut target);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();

    let bank = cache.bank(BankId::unpaged()).unwrap();
    assert!(bank.line_at(0x9000).is_some(), "call target not preloaded");
    assert_eq!(bank.line_at(0x9000).unwrap().instruction.text, "ld hl,$1234");
}

#[test]
fn relative_jump_targets_are_preloaded() {
    let mut target = FakeTarget::new();
    // jr -4 at 0x8000 jumps to 0x7FFE.
    target.load(0x7FFE, &[0x00, 0x00, 0x18, 0xFC, 0xC9]);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();

    let bank = cache.bank(BankId::unpaged()).unwrap();
    assert!(bank.line_at(0x7FFE).is_some());
}

#[test]
fn preload_depth_is_bounded() {
    let mut target = FakeTarget::new();
    // Chain of calls: 0x8000 -> 0x9000 -> 0xA000 -> 0xB000.
    target.load(0x8000, &[0xCD, 0x00, 0x90, 0xC9]);
    target.load(0x9000, &[0xCD, 0x00, 0xA0, 0xC9]);
    target.load(0xA000, &[0xCD, 0x00, 0xB0, 0xC9]);
    target.load(0xB000, &[0xC9]);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();

    let bank = cache.bank(BankId::unpaged()).unwrap();
    assert!(bank.line_at(0x9000).is_some());
    assert!(bank.line_at(0xA000).is_some(), "depth 1 target missing");
    assert!(
        bank.line_at(0xB000).is_none(),
        "depth 2 recursion cap exceeded"
    );
}

#[test]
fn decode_stops_at_bare_return() {
    let mut target = FakeTarget::new();
    target.load(0x8000, &[0x3E, 0x01, 0xC9, 0x21, 0x34, 0x12]);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();

    let bank = cache.bank(BankId::unpaged()).unwrap();
    assert!(bank.line_at(0x8002).is_some());
    assert!(
        bank.line_at(0x8003).is_none(),
        "decode continued past the return"
    );
}

#[test]
fn run_length_is_capped() {
    let mut target = FakeTarget::new();
    // 200 nops, no return in sight.
    target.load(0x8000, &[0x00; 200]);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 0)
        .unwrap();

    let bank = cache.bank(BankId::unpaged()).unwrap();
    assert_eq!(bank.lines().count(), 30);
}

#[test]
fn cached_chains_skip_refetching() {
    let mut target = FakeTarget::new();
    small_program(&mut target);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();
    let reads_after_first = target.reads;

    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();
    assert_eq!(
        target.reads, reads_after_first,
        "cached block was re-fetched"
    );
}

#[test]
fn decode_errors_leave_prior_lines_intact() {
    let mut target = FakeTarget::new();
    // Valid opening, then an undefined ed hole.
    target.load(0x8000, &[0x3E, 0x01, 0xED, 0x00, 0xC9]);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    let updated = cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();
    assert!(updated);

    let bank = cache.bank(BankId::unpaged()).unwrap();
    assert!(bank.line_at(0x8000).is_some());
    assert!(bank.line_at(0x8002).is_none());
}

#[test]
fn page_table_change_forces_regeneration() {
    let mut target = FakeTarget::new();
    small_program(&mut target);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("RO0 RA5 RA2 RA7 PEN");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    assert!(
        cache
            .update(&mut target, &mut space, &disasm, 0x8000, 2)
            .unwrap()
    );
    assert!(
        !cache
            .update(&mut target, &mut space, &disasm, 0x8000, 2)
            .unwrap()
    );

    // Same assignment re-applied still bumps the snapshot serial, and that
    // alone must report a change so the listing gets regenerated.
    space.apply_page_table("RO0 RA5 RA2 RA7 PEN");
    assert!(
        cache
            .update(&mut target, &mut space, &disasm, 0x8000, 2)
            .unwrap()
    );
    assert!(
        !cache
            .update(&mut target, &mut space, &disasm, 0x8000, 2)
            .unwrap()
    );
}

#[test]
fn lines_are_stored_bank_relative() {
    let mut target = FakeTarget::new();
    small_program(&mut target);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("RO0 RA5 RA2 RA7 PEN");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();

    // 0x8000 sits in slot 2 (RA2), offset 0.
    let bank = cache.bank(BankId::ram(2)).unwrap();
    assert!(bank.line_at(0x0000).is_some());
    // The call target 0x9000 lands in the same bank at offset 0x1000.
    assert!(bank.line_at(0x1000).is_some());
}

#[test]
fn runs_may_span_two_banks() {
    let mut target = FakeTarget::new();
    // ld a,$01 at 0x7FFC, ld hl,$1234 crossing into the next slot, ret.
    target.load(0x7FFC, &[0x3E, 0x01, 0x21, 0x34, 0x12, 0xC9]);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("RO0 RA5 RA2 RA7 PEN");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    cache
        .update(&mut target, &mut space, &disasm, 0x7FFC, 2)
        .unwrap();

    let ra5 = cache.bank(BankId::ram(5)).unwrap();
    assert!(ra5.line_at(0x3FFC).is_some());
    assert!(ra5.line_at(0x3FFE).is_some(), "boundary line missing");
    let ra2 = cache.bank(BankId::ram(2)).unwrap();
    assert!(ra2.line_at(0x0001).is_some(), "second-bank line missing");
}

#[test]
fn render_assigns_stable_line_numbers() {
    let mut target = FakeTarget::new();
    small_program(&mut target);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();

    let listing = cache.render(&space, None);
    let line_no = cache.line_for_address(&space, 0x8002).unwrap();
    let row = listing.lines().nth(line_no as usize - 1).unwrap();
    assert!(row.starts_with("      8002 CD 00 90"), "row was {row:?}");
    assert!(row.ends_with("call $9000"));

    // Lookups are inverse of each other.
    let line = cache.line_at_file_line(line_no).unwrap();
    assert_eq!(line.offset, 0x8002);
    assert_eq!(line.file_line, line_no);

    // Re-rendering without changes keeps numbers stable.
    let again = cache.render(&space, None);
    assert_eq!(listing, again);
    assert_eq!(cache.line_for_address(&space, 0x8002), Some(line_no));
}

#[test]
fn render_separates_blocks_and_orders_sections() {
    let mut target = FakeTarget::new();
    small_program(&mut target);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();

    let listing = cache.render(&space, None);
    // Two runs (0x8000 block, 0x9000 block) in one bank, separated by a
    // blank line.
    let blanks = listing.lines().filter(|l| l.is_empty()).count();
    assert!(blanks >= 1, "no block separator:\n{listing}");

    // A bank that later pages out still renders, after the paged-in slots.
    space.apply_page_table("RO0 RA5 RA2 RA7 PEN");
    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();
    space.apply_page_table("RO0 RA5 RA0 RA7 PEN");
    let listing = cache.render(&space, None);
    assert!(listing.contains("; RA2  (not paged in)"), "{listing}");
}

#[test]
fn render_emits_labels_from_symbols() {
    let mut target = FakeTarget::new();
    small_program(&mut target);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();
    let sym = SymbolTable::parse("-:8000 entry\n-:9000 helper\n").unwrap();

    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();

    let listing = cache.render(&space, Some(&sym));
    let lines: Vec<&str> = listing.lines().collect();
    let entry_at = lines.iter().position(|l| *l == "entry:").unwrap();
    assert!(lines[entry_at + 1].starts_with("      8000"));
    assert!(listing.contains("helper:"));

    // Label rows shift instruction numbering; the index must agree.
    let line_no = cache.line_for_address(&space, 0x8000).unwrap();
    assert_eq!(line_no as usize, entry_at + 2);
}

#[test]
fn listing_file_is_left_read_only() {
    let mut target = FakeTarget::new();
    small_program(&mut target);
    let mut space = AddressSpace::new(0x4000);
    space.apply_page_table("");
    let mut cache = DisassemblyCache::default();
    let disasm = z80();

    cache
        .update(&mut target, &mut space, &disasm, 0x8000, 2)
        .unwrap();

    let path = std::env::temp_dir().join("zrdb-listing-test.lst");
    cache.write_listing(&space, None, &path).unwrap();
    assert!(std::fs::metadata(&path).unwrap().permissions().readonly());

    // A second write must succeed by clearing the bit first.
    cache.write_listing(&space, None, &path).unwrap();
    assert!(std::fs::metadata(&path).unwrap().permissions().readonly());

    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_readonly(false);
    std::fs::set_permissions(&path, perms).unwrap();
    std::fs::remove_file(&path).unwrap();
}

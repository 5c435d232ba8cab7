// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! §8 scenario: a DBAT block maps a read-only page; reads succeed, writes raise DSI.

use crate::cpu_bus::Msr;
use crate::error::MmuException;
use crate::test_support::{catch_exception, FakeBus, FakeMemoryMap};
use crate::Mmu;

fn dbat_pair(bepi: u32, bl: u32, access: u32, phys_hi: u32, prot: u32) -> (u32, u32) {
    (bepi | (bl << 2) | access, phys_hi | prot)
}

#[test]
fn bat_mapped_read_only_block_faults_on_write() {
    let bus = FakeBus::new();
    let mm = FakeMemoryMap::new(0, 0x1_0000, 0x1000_0000, 0x1000, 0x2000_0000, 0x1000);
    let mut mmu = Mmu::new();

    // DBAT0: 128 KiB block at EA 0x8000_0000 -> PA 0, supervisor-only, read-only.
    let (upper, lower) = dbat_pair(0x8000_0000, 0, 0b10, 0, 1);
    bus.set_spr(536, upper);
    bus.set_spr(537, lower);
    mmu.dbat_update(&bus, 536);
    assert_eq!(bus.sync_actions.borrow().len(), 1, "a valid DBAT update should schedule a flush");

    bus.set_msr(Msr::DR);
    mm.write_ram_byte(0, 0xAB);

    let value = mmu.read_vmem::<_, _, u32>(&bus, &mm, 0x8000_0000);
    assert_eq!(value, 0xAB00_0000);

    let result = catch_exception(|| mmu.write_vmem::<_, _, u32>(&bus, &mm, 0x8000_0000, 0x1234_5678));
    match result {
        Err(MmuException::Dsi { dsisr, dar }) => {
            assert_eq!(dsisr & 0x0800_0000, 0x0800_0000, "protection bit should be set");
            assert_eq!(dsisr & (1 << 25), 1 << 25, "write bit should be set");
            assert_eq!(dar, 0x8000_0000);
        }
        other => panic!("expected a DSI, got {other:?}"),
    }
}

#[test]
fn bat_reserved_prot_encoding_faults_on_write_like_read_only() {
    let bus = FakeBus::new();
    let mm = FakeMemoryMap::new(0, 0x1_0000, 0x1000_0000, 0x1000, 0x2000_0000, 0x1000);
    let mut mmu = Mmu::new();

    // DBAT0: 128 KiB block at EA 0x8000_0000 -> PA 0, supervisor-only, prot = 3 (reserved).
    let (upper, lower) = dbat_pair(0x8000_0000, 0, 0b10, 0, 3);
    bus.set_spr(536, upper);
    bus.set_spr(537, lower);
    mmu.dbat_update(&bus, 536);

    bus.set_msr(Msr::DR);
    mm.write_ram_byte(0, 0xCD);

    let value = mmu.read_vmem::<_, _, u32>(&bus, &mm, 0x8000_0000);
    assert_eq!(value, 0xCD00_0000, "prot == 3 should still permit reads");

    let result = catch_exception(|| mmu.write_vmem::<_, _, u32>(&bus, &mm, 0x8000_0000, 0x1234_5678));
    match result {
        Err(MmuException::Dsi { dsisr, dar }) => {
            assert_eq!(dsisr & 0x0800_0000, 0x0800_0000, "protection bit should be set");
            assert_eq!(dsisr & (1 << 25), 1 << 25, "write bit should be set");
            assert_eq!(dar, 0x8000_0000);
        }
        other => panic!("expected a DSI, got {other:?}"),
    }
}

#[test]
fn bat_miss_outside_block_falls_through_to_page_table_miss() {
    let bus = FakeBus::new();
    let mm = FakeMemoryMap::new(0, 0x1_0000, 0x1000_0000, 0x1000, 0x2000_0000, 0x1000);
    let mut mmu = Mmu::new();

    let (upper, lower) = dbat_pair(0x8000_0000, 0, 0b10, 0, 2);
    bus.set_spr(536, upper);
    bus.set_spr(537, lower);
    mmu.dbat_update(&bus, 536);

    bus.set_msr(Msr::DR);
    // SDR1 = 0, SR = 0: the page table at physical 0 is all zero, so both PTEG probes miss.
    let result = catch_exception(|| mmu.read_vmem::<_, _, u32>(&bus, &mm, 0x9000_0000));
    match result {
        Err(MmuException::Dsi { dsisr, .. }) => {
            assert_eq!(dsisr & 0x4000_0000, 0x4000_0000, "PTE-miss bit should be set");
        }
        other => panic!("expected a DSI, got {other:?}"),
    }
}

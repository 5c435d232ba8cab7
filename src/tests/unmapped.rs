// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! §8 / §9 Open Questions scenario: reads from a physical address with no backing region return
//! all-ones and are logged rather than raising an architectural fault; writes are dropped; and
//! `debug_read` reports the condition distinctly instead of making it indistinguishable from a
//! real all-ones value.

use crate::error::DebugReadError;
use crate::test_support::{FakeBus, FakeMemoryMap};
use crate::Mmu;

#[test]
fn real_mode_read_from_unmapped_physical_address_returns_all_ones() {
    let bus = FakeBus::new(); // Real addressing mode: EA == PA.
    let mm = FakeMemoryMap::new(0, 0x1000, 0x1000_0000, 0x1000, 0x2000_0000, 0x1000);
    let mut mmu = Mmu::new();

    let value = mmu.read_vmem::<_, _, u32>(&bus, &mm, 0x0FFF_F000);
    assert_eq!(value, 0xFFFF_FFFF);

    // A second read of the same unmapped page must still return all-ones, not whatever a prior
    // write might otherwise have left behind.
    mmu.write_vmem::<_, _, u32>(&bus, &mm, 0x0FFF_F000, 0x1234_5678);
    let value = mmu.read_vmem::<_, _, u32>(&bus, &mm, 0x0FFF_F000);
    assert_eq!(value, 0xFFFF_FFFF, "a write to unmapped memory must be dropped, not retained");
}

#[test]
fn debug_read_reports_unmapped_physical_distinctly() {
    let bus = FakeBus::new();
    let mm = FakeMemoryMap::new(0, 0x1000, 0x1000_0000, 0x1000, 0x2000_0000, 0x1000);
    let mut mmu = Mmu::new();

    let result = mmu.debug_read::<_, _, u32>(&bus, &mm, 0x0FFF_F000);
    assert!(matches!(result, Err(DebugReadError::UnmappedPhysical { pa: 0x0FFF_F000 })));
}

#[test]
fn debug_read_of_a_mapped_address_succeeds() {
    let bus = FakeBus::new();
    let mm = FakeMemoryMap::new(0, 0x1000, 0x1000_0000, 0x1000, 0x2000_0000, 0x1000);
    let mut mmu = Mmu::new();

    mm.write_ram_byte(0x10, 0x42);
    let value: u8 = mmu.debug_read(&bus, &mm, 0x10).expect("mapped address should succeed");
    assert_eq!(value, 0x42);
}

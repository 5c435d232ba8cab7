// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! §8 scenario: an unaligned access straddling a page boundary decomposes into independent
//! byte-wise virtual accesses rather than a single host load/store.

use crate::test_support::{FakeBus, FakeMemoryMap};
use crate::Mmu;

#[test]
fn cross_page_write_then_read_round_trips_big_endian() {
    let bus = FakeBus::new(); // Real addressing mode.
    let mm = FakeMemoryMap::new(0, 0x2000, 0x1000_0000, 0x1000, 0x2000_0000, 0x1000);
    let mut mmu = Mmu::new();

    // 0x0FFE..0x1002 straddles the 4 KiB boundary at 0x1000.
    let ea = 0x0000_0FFE;
    mmu.write_vmem::<_, _, u32>(&bus, &mm, ea, 0x0102_0304);

    assert_eq!(mm.read_ram_byte(0x0FFE), 0x01);
    assert_eq!(mm.read_ram_byte(0x0FFF), 0x02);
    assert_eq!(mm.read_ram_byte(0x1000), 0x03);
    assert_eq!(mm.read_ram_byte(0x1001), 0x04);

    let value = mmu.read_vmem::<_, _, u32>(&bus, &mm, ea);
    assert_eq!(value, 0x0102_0304);
}

#[test]
fn same_page_unaligned_access_round_trips() {
    let bus = FakeBus::new();
    let mm = FakeMemoryMap::new(0, 0x2000, 0x1000_0000, 0x1000, 0x2000_0000, 0x1000);
    let mut mmu = Mmu::new();

    let ea = 0x0000_0003; // not 4-byte aligned but stays within one page.
    mmu.write_vmem::<_, _, u32>(&bus, &mm, ea, 0xCAFE_BABE);
    assert_eq!(mmu.read_vmem::<_, _, u32>(&bus, &mm, ea), 0xCAFE_BABE);
}

// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! C3: the hashed inverted page-table walker.
//!
//! Grounded in `original_source/cpu/ppc/ppcmmu.cpp`'s `calc_pteg_addr`, `search_pteg`, and
//! `page_address_translation`.

use super::pte::{
    pte_check_word, PTEG_PTE_COUNT, PTE_C_BIT, PTE_INTEGRITY_MASK, PTE_R_BIT, PTE_RPN_MASK,
    PTE_SIZE,
};
use crate::cpu_bus::{CpuBus, Privilege};
use crate::error::MmuException;
use crate::memory_map::MemoryMap;
use crate::phys::{AccessKind, PhysicalDispatcher};
use log::trace;

/// Bits ORed into SRR1 (instruction fetch) or DSISR (data access) for each kind of fault this
/// walker raises, matching §4.3 steps 2, 6, 7.
mod fault_bits {
    /// No-execute segment, instruction fetch (step 2).
    pub const NO_EXECUTE: u32 = 0x1000_0000;
    /// PTEG miss, both primary and secondary (step 6).
    pub const PTE_MISS: u32 = 0x4000_0000;
    /// Key/PP protection denial (step 7).
    pub const PROTECTION: u32 = 0x0800_0000;
    /// Direct-store segment reference. The source aborts on this (§9 Open Questions); this crate
    /// implements the spec's stricter alternative of raising DSI with this bit instead.
    pub const DIRECT_STORE: u32 = 0x8000_0000;
}

/// Outcome of a successful page-table walk (§4.3 step 9).
#[derive(Clone, Copy, Debug)]
pub struct WalkResult {
    pub pa: u32,
    /// `(key << 2) | pp`.
    pub prot_code: u8,
    pub pte_c_already_set: bool,
}

impl WalkResult {
    /// §4.4: `PAGE_WRITABLE` iff `prot_code` is not one of the key+pp combinations that forbid
    /// writes.
    pub fn is_writable(self) -> bool {
        matches!(self.prot_code, 0..=2 | 6)
    }
}

/// Combines SDR1 with a primary (`H=0`) or secondary (`H=1`, hash complemented by the caller)
/// page-index hash into the physical address of a PTEG (§4.3).
pub fn calc_pteg_addr(sdr1: u32, hash: u32) -> u32 {
    let mut pteg = sdr1 & 0xFE00_0000;
    pteg |= (sdr1 & 0x01FF_0000) | (((sdr1 & 0x1FF) << 16) & ((hash & 0x7FC00) << 6));
    pteg |= (hash & 0x3FF) << 6;
    pteg
}

/// Scan one PTEG for a PTE matching `vsid`/`h`/`api`. Returns the address of the matching PTE's
/// second word, so the caller can update R/C bits and read `RPN`/`PP` without a second walk.
///
/// With the `pteg-integrity-checks` feature, continues scanning the whole PTEG after a first match
/// and asserts that any further match agrees on RPN/WIMG/PP (PowerPC PEM 32-bit 7.6.2 rule 5).
fn search_pteg<M: MemoryMap>(
    phys: &mut PhysicalDispatcher,
    memory_map: &M,
    pteg_addr: u32,
    vsid: u32,
    h: u32,
    api: u32,
) -> Option<u32> {
    let check = pte_check_word(vsid, h, api);
    #[cfg(feature = "pteg-integrity-checks")]
    {
        let mut found: Option<(u32, u32)> = None;
        for i in 0..PTEG_PTE_COUNT as u32 {
            let entry_addr = pteg_addr + i * PTE_SIZE;
            let word0 = phys.read(memory_map, AccessKind::PageTable, entry_addr, 4) as u32;
            if word0 == check {
                let word1 = phys.read(memory_map, AccessKind::PageTable, entry_addr + 4, 4) as u32;
                let integrity = word1 & PTE_INTEGRITY_MASK;
                match found {
                    None => found = Some((entry_addr, integrity)),
                    Some((_, prev_integrity)) => assert_eq!(
                        integrity, prev_integrity,
                        "multiple PTEs with differing RPN/WIMG/PP for the same VSID/API"
                    ),
                }
            }
        }
        found.map(|(addr, _)| addr)
    }
    #[cfg(not(feature = "pteg-integrity-checks"))]
    {
        for i in 0..PTEG_PTE_COUNT as u32 {
            let entry_addr = pteg_addr + i * PTE_SIZE;
            let word0 = phys.read(memory_map, AccessKind::PageTable, entry_addr, 4) as u32;
            if word0 == check {
                return Some(entry_addr);
            }
        }
        None
    }
}

/// Walk the hashed page table for `ea` (§4.3). Diverges via `bus.raise` on any architectural
/// fault; only returns on a successful translation.
#[allow(clippy::too_many_arguments)]
pub fn walk<B: CpuBus, M: MemoryMap>(
    bus: &B,
    phys: &mut PhysicalDispatcher,
    memory_map: &M,
    ea: u32,
    is_fetch: bool,
    privilege: Privilege,
    is_write: bool,
) -> WalkResult {
    let sr = bus.sr(((ea >> 28) & 0x0F) as u8);
    if sr & 0x8000_0000 != 0 {
        raise_fault(bus, is_fetch, is_write, ea, fault_bits::DIRECT_STORE);
    }
    if sr & 0x1000_0000 != 0 && is_fetch {
        bus.raise(MmuException::Isi {
            srr1_bits: fault_bits::NO_EXECUTE,
        });
    }

    let api = (ea >> 22) & 0x3F;
    let page_index = (ea >> 12) & 0xFFFF;
    let vsid = sr & 0x00FF_FFFF;
    let hash1 = (sr & 0x7_FFFF) ^ page_index;

    let primary_addr = calc_pteg_addr(bus.sdr1(), hash1);
    let pte_addr = search_pteg(phys, memory_map, primary_addr, vsid, 0, api).or_else(|| {
        let secondary_addr = calc_pteg_addr(bus.sdr1(), !hash1);
        search_pteg(phys, memory_map, secondary_addr, vsid, 1, api)
    });

    let pte_addr = match pte_addr {
        Some(addr) => addr,
        None => {
            raise_fault(bus, is_fetch, is_write, ea, fault_bits::PTE_MISS);
        }
    };

    let word1 = phys.read(memory_map, AccessKind::PageTable, pte_addr + 4, 4) as u32;
    let pp = word1 & 0x3;
    let msr_pr = u32::from(privilege == Privilege::Problem);
    // Bit 29 and bit 30 of the segment register, matching the original's key derivation exactly;
    // spec.md labels them Ks/Kp with the opposite bit order to real PowerPC SRs, but the formula
    // below reproduces the original's behavior bit-for-bit regardless of naming.
    let key = (((sr >> 29) & 1) & msr_pr) | (((sr >> 30) & 1) & (msr_pr ^ 1));

    let denied = (key != 0 && (pp == 0 || (pp == 1 && is_write))) || (pp == 3 && is_write);
    if denied {
        raise_fault(bus, is_fetch, is_write, ea, fault_bits::PROTECTION);
    }

    let pte_c_already_set = word1 & PTE_C_BIT != 0;
    let new_word1 = word1 | PTE_R_BIT | if is_write { PTE_C_BIT } else { 0 };
    if new_word1 != word1 {
        phys.write(memory_map, AccessKind::PageTable, pte_addr + 4, u64::from(new_word1), 4);
        trace!("page table R/C updated: ea={ea:#010x} pte_addr={pte_addr:#010x}");
    }

    WalkResult {
        pa: (word1 & PTE_RPN_MASK) | (ea & 0xFFF),
        prot_code: ((key << 2) | pp) as u8,
        pte_c_already_set,
    }
}

fn raise_fault<B: CpuBus>(bus: &B, is_fetch: bool, is_write: bool, ea: u32, bits: u32) -> ! {
    if is_fetch {
        bus.raise(MmuException::Isi { srr1_bits: bits });
    } else {
        bus.raise(MmuException::Dsi {
            dsisr: bits | (u32::from(is_write) << 25),
            dar: ea,
        });
    }
}

// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Raw, big-endian hashed page table entry layout.
//!
//! Grounded in `original_source/cpu/ppc/ppcmmu.cpp`'s direct byte manipulation of `pte_addr`
//! (`pte_addr[6] |= 0x01` for R, `pte_addr[7] |= 0x80` for C) and in the teacher's
//! `services/rmmd/manifest.rs` pattern of overlaying a `zerocopy`-derived struct onto raw guest
//! memory bytes rather than hand-rolling bit shifts everywhere.

use zerocopy::big_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Number of 8-byte PTEs in a PTEG.
pub const PTEG_PTE_COUNT: usize = 8;
/// Size in bytes of one PTE.
pub const PTE_SIZE: u32 = 8;

pub const PTE_VALID: u32 = 0x8000_0000;
pub const PTE_RPN_MASK: u32 = 0xFFFF_F000;
pub const PTE_R_BIT: u32 = 0x0000_0100;
pub const PTE_C_BIT: u32 = 0x0000_0080;
pub const PTE_WIMG_MASK: u32 = 0x0000_0078;
pub const PTE_PP_MASK: u32 = 0x0000_0003;
/// Bits `search_pteg`'s integrity check compares across duplicate PTEG matches: RPN, WIMG, PP.
/// R and C are excluded since either PTE may have them set independently.
pub const PTE_INTEGRITY_MASK: u32 = PTE_RPN_MASK | PTE_WIMG_MASK | PTE_PP_MASK;

/// One raw 8-byte PTE, overlaid directly on guest physical memory.
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Debug)]
#[repr(C)]
pub struct RawPte {
    /// `V:1 | VSID:24 | H:1 | API:6`.
    pub word0: U32,
    /// `RPN:20 | _:3 | R:1 | C:1 | WIMG:4 | _:1 | PP:2`.
    pub word1: U32,
}

/// Builds the expected `word0` value (the "PTE check word") for a PTEG probe.
pub fn pte_check_word(vsid: u32, h: u32, api: u32) -> u32 {
    PTE_VALID | (vsid << 7) | (h << 6) | api
}

// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Optional per-core profiling counters (§9 "Profiling counters... must be per-core").
//!
//! A direct port of the original's `MMUProfile`/`TLBProfile` globals (guarded there by
//! `#define MMU_PROFILING`/`#define TLB_PROFILING`), turned into fields owned by [`crate::Mmu`]
//! and gated by the `mmu-profiling`/`tlb-profiling` Cargo features instead of preprocessor
//! defines, so that independent `Mmu` instances in the same process (e.g. multiple tests running
//! in parallel) never share counters.

/// Counters mirroring the original's `MMUProfile` variable set.
#[cfg(feature = "mmu-profiling")]
#[derive(Default, Debug, Clone, Copy)]
pub struct MmuProfile {
    pub dmem_reads_total: u64,
    pub iomem_reads_total: u64,
    pub dmem_writes_total: u64,
    pub iomem_writes_total: u64,
    pub exec_reads_total: u64,
    pub bat_transl_total: u64,
    pub ptab_transl_total: u64,
    pub unaligned_reads: u64,
    pub unaligned_writes: u64,
    pub unaligned_crossp_r: u64,
    pub unaligned_crossp_w: u64,
}

/// Counters mirroring the original's `TLBProfile` variable set.
#[cfg(feature = "tlb-profiling")]
#[derive(Default, Debug, Clone, Copy)]
pub struct TlbProfile {
    pub num_primary_tlb_hits: u64,
    pub num_secondary_tlb_hits: u64,
    pub num_tlb_refills: u64,
    pub num_entry_replacements: u64,
}

// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! C4: the two-level, mode-indexed software TLB.
//!
//! Grounded in `original_source/cpu/ppc/ppcmmu.cpp`'s `mode{1,2,3}_tlb{1,2}` arrays,
//! `tlb2_target_entry` (tree-pseudo-LRU victim selection), `tlb_translate_addr` (primary/secondary
//! probe with promotion), and `tlb_flush_entry`/`tlb_flush_entries` (TLBIE and deferred
//! BAT/PAT-tagged flushes). The original swaps a pair of raw pointers (`pCurTLB1`/`pCurTLB2`) to
//! the active mode's arrays; this crate instead keeps all three pairs alive and indexes by
//! [`MmuMode`], which is the idiomatic-Rust rendering of the same "swap the active TLB" idea
//! without aliased raw pointers (see DESIGN.md).

use crate::memory_map::DeviceId;

/// Primary TLB size, entries per mode. Must be a power of two.
pub const TLB_SIZE: usize = 4096;
const TLB_INDEX_MASK: u32 = (TLB_SIZE - 1) as u32;
/// Set associativity of the secondary TLB.
pub const TLB2_WAYS: usize = 4;

/// Sentinel tag marking an unused TLB slot.
pub const TLB_INVALID_TAG: u32 = 0xFFFF_FFFF;

bitflags::bitflags! {
    /// Per-entry metadata recorded at refill time.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct TlbFlags: u16 {
        /// Host-backed RAM/ROM page; `host_va_offset` is valid.
        const PAGE_MEM = 1 << 0;
        /// Memory-mapped I/O page; `device`/`io_base` are valid.
        const PAGE_IO = 1 << 1;
        /// Stores may retire through this entry.
        const PAGE_WRITABLE = 1 << 2;
        /// The backing PTE's C bit is already 1, or the page is BAT-mapped (no PTE to update).
        const PTE_SET_C = 1 << 3;
        /// Entry was installed from a BAT hit; invalidated by BAT-context-sync flushes.
        const TLBE_FROM_BAT = 1 << 4;
        /// Entry was installed from a page-table walk; invalidated by PAT-context-sync flushes.
        const TLBE_FROM_PAT = 1 << 5;
        /// Sentinel entry standing in for a physical address with no backing region (§4.4
        /// "Unmapped pa installs a sentinel entry"). `debug_read` reports this distinctly instead
        /// of silently returning all-ones.
        const PAGE_UNMAPPED = 1 << 6;
    }
}

/// One TLB entry, primary or secondary.
#[derive(Clone, Copy, Debug)]
pub struct TlbEntry {
    pub tag: u32,
    pub flags: TlbFlags,
    /// Tree-pseudo-LRU recency counter, meaningful only for ways of a secondary set.
    lru: u8,
    /// For `PAGE_MEM`: `guest_va + host_va_offset` is a valid host pointer.
    pub host_va_offset: i64,
    /// For `PAGE_IO`: the device to dispatch to and the base of its region.
    pub device: DeviceId,
    pub io_base: u32,
    /// The physical address this entry translates to. Kept around (rather than derived only from
    /// `host_va_offset`) so `debug_read` can report it for a `PAGE_UNMAPPED` entry.
    pub pa: u32,
}

impl Default for TlbEntry {
    fn default() -> Self {
        Self {
            tag: TLB_INVALID_TAG,
            flags: TlbFlags::empty(),
            lru: 0,
            host_va_offset: 0,
            device: DeviceId(0),
            io_base: 0,
            pa: 0,
        }
    }
}

impl TlbEntry {
    fn is_valid(&self) -> bool {
        self.tag != TLB_INVALID_TAG
    }
}

fn tlb_index(ea: u32) -> usize {
    ((ea >> 12) & TLB_INDEX_MASK) as usize
}

/// Apply the tree-PLRU fix-up for having just touched way `touched` of a 4-way set (§4.4): the
/// touched way's pair gets `0b11`/`0b10`, the other pair's low bit is cleared. Written as an
/// explicit per-way match, mirroring the original's four hand-unrolled branches rather than a
/// cleverer bit formula, since this *is* the architectural table.
fn touch_lru(ways: &mut [TlbEntry; TLB2_WAYS], touched: usize) {
    match touched {
        0 => {
            ways[0].lru = 0b11;
            ways[1].lru = 0b10;
            ways[2].lru &= 0b01;
            ways[3].lru &= 0b01;
        }
        1 => {
            ways[0].lru = 0b10;
            ways[1].lru = 0b11;
            ways[2].lru &= 0b01;
            ways[3].lru &= 0b01;
        }
        2 => {
            ways[0].lru &= 0b01;
            ways[1].lru &= 0b01;
            ways[2].lru = 0b11;
            ways[3].lru = 0b10;
        }
        3 => {
            ways[0].lru &= 0b01;
            ways[1].lru &= 0b01;
            ways[2].lru = 0b10;
            ways[3].lru = 0b11;
        }
        _ => unreachable!("TLB2_WAYS is 4"),
    }
}

/// Select a victim way for installation, preferring an invalid slot, else the first way whose
/// LRU bits are `0b00`, applying the matching tree-PLRU fix-up either way.
fn select_victim(ways: &mut [TlbEntry; TLB2_WAYS]) -> usize {
    if let Some(invalid) = ways.iter().position(|w| !w.is_valid()) {
        touch_lru(ways, invalid);
        return invalid;
    }
    let victim = ways.iter().position(|w| w.lru == 0).unwrap_or(0);
    touch_lru(ways, victim);
    victim
}

/// A primary/secondary TLB pair for one MMU mode.
pub struct TlbPair {
    primary: Box<[TlbEntry]>,
    secondary: Box<[[TlbEntry; TLB2_WAYS]]>,
}

impl TlbPair {
    fn new() -> Self {
        Self {
            primary: vec![TlbEntry::default(); TLB_SIZE].into_boxed_slice(),
            secondary: vec![[TlbEntry::default(); TLB2_WAYS]; TLB_SIZE].into_boxed_slice(),
        }
    }

    /// Primary-TLB probe. No LRU update: the primary TLB is direct-mapped.
    pub fn primary_hit(&self, ea: u32) -> Option<TlbEntry> {
        let entry = &self.primary[tlb_index(ea)];
        (entry.tag == ea & !0xFFF).then_some(*entry)
    }

    /// Copy a secondary hit or refill into the primary slot for `ea` (host-backed pages only;
    /// MMIO entries are never promoted, §4.4).
    pub fn promote(&mut self, ea: u32, entry: &TlbEntry) {
        self.primary[tlb_index(ea)] = *entry;
    }

    /// Secondary-TLB probe, updating tree-PLRU bits on a hit.
    pub fn secondary_hit(&mut self, ea: u32) -> Option<TlbEntry> {
        let tag = ea & !0xFFF;
        let ways = &mut self.secondary[tlb_index(ea)];
        let way = ways.iter().position(|w| w.tag == tag)?;
        touch_lru(ways, way);
        Some(ways[way])
    }

    /// Install a refilled entry into the secondary TLB, replacing the tree-PLRU victim.
    pub fn install(&mut self, ea: u32, entry: TlbEntry) -> TlbEntry {
        let ways = &mut self.secondary[tlb_index(ea)];
        let victim = select_victim(ways);
        ways[victim] = entry;
        entry
    }

    /// Invalidate the single-page entry at `ea` in the primary slot and every secondary way.
    pub fn invalidate_single(&mut self, ea: u32) {
        let tag = ea & !0xFFF;
        let idx = tlb_index(ea);
        if self.primary[idx].tag == tag {
            self.primary[idx].tag = TLB_INVALID_TAG;
        }
        for way in &mut self.secondary[idx] {
            if way.tag == tag {
                way.tag = TLB_INVALID_TAG;
            }
        }
    }

    /// Whether installing an entry for `ea` would have to evict a currently-valid way, used only
    /// to feed the `tlb-profiling` `num_entry_replacements` counter.
    pub fn would_replace(&self, ea: u32) -> bool {
        self.secondary[tlb_index(ea)].iter().all(TlbEntry::is_valid)
    }

    /// OR `flags` into the primary slot and any secondary way currently holding `ea`, without
    /// disturbing tree-PLRU state or installing a new entry. Used to lazily set `PTE_SET_C` on an
    /// entry that was refilled read-only and is now being written for the first time (§4.5).
    pub fn set_entry_flags(&mut self, ea: u32, flags: TlbFlags) {
        let tag = ea & !0xFFF;
        let idx = tlb_index(ea);
        if self.primary[idx].tag == tag {
            self.primary[idx].flags |= flags;
        }
        for way in &mut self.secondary[idx] {
            if way.tag == tag {
                way.flags |= flags;
            }
        }
    }

    /// Invalidate every entry whose flags intersect `flags` (deferred BAT/PAT context-sync
    /// flushes).
    pub fn invalidate_flagged(&mut self, flags: TlbFlags) {
        for entry in self.primary.iter_mut() {
            if entry.flags.intersects(flags) {
                entry.tag = TLB_INVALID_TAG;
            }
        }
        for ways in self.secondary.iter_mut() {
            for entry in ways.iter_mut() {
                if entry.flags.intersects(flags) {
                    entry.tag = TLB_INVALID_TAG;
                }
            }
        }
    }
}

/// The three MMU-mode-indexed TLB pairs (§3 "three independent TLB pairs keyed by MMU mode").
pub struct TlbBank {
    pairs: [TlbPair; 3],
}

impl TlbBank {
    pub fn new() -> Self {
        Self {
            pairs: [TlbPair::new(), TlbPair::new(), TlbPair::new()],
        }
    }

    pub fn pair(&mut self, mode: MmuMode) -> &mut TlbPair {
        &mut self.pairs[mode as usize]
    }

    /// TLBIE: invalidate the single-page entry at `ea` across all three MMU-mode pairs, since the
    /// guest may switch mode between issuing TLBIE and the next access to that page.
    pub fn invalidate_single_all_modes(&mut self, ea: u32) {
        for pair in &mut self.pairs {
            pair.invalidate_single(ea);
        }
    }

    /// Deferred flush of BAT- or PAT-tagged entries, applied to the supervisor and problem pairs
    /// only: real-address mode (`Real`) never installs BAT/PAT-tagged entries (§4.4 "If
    /// translation is off for this access kind" skips both BAT and PAT), so it has none to flush,
    /// matching the original's `tlb_flush_entries` touching `mode2`/`mode3` but not `mode1`.
    pub fn flush_flagged(&mut self, flags: TlbFlags) {
        self.pairs[MmuMode::Supervisor as usize].invalidate_flagged(flags);
        self.pairs[MmuMode::Problem as usize].invalidate_flagged(flags);
    }
}

impl Default for TlbBank {
    fn default() -> Self {
        Self::new()
    }
}

/// The 3-valued MMU mode (§3), derived from `MSR[DR]` and `MSR[PR]` and used to select the active
/// TLB pair. Matches the original's `mmu_change_mode` bit formula
/// (`((msr >> 3) & 2) | ((msr >> 14) & 1)`), which keys off `DR` and `PR` only — instruction
/// fetches still translate against `MSR[IR]` (§4.5), but they probe whichever TLB pair the
/// current `DR`/`PR` combination selected.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MmuMode {
    /// `DR` clear: translation off, identity-mapped real addressing.
    Real = 0,
    /// `DR` set, `PR` clear: supervisor, data translation on.
    Supervisor = 2,
    /// `DR` set, `PR` set: problem (user) state, data translation on.
    Problem = 3,
}

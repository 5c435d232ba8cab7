// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! C1: the physical-memory dispatcher.
//!
//! Grounded in the original's five independent `last_*_area` globals (`last_read_area`,
//! `last_write_area`, `last_exec_area`, `last_ptab_area`, `last_dma_area`): one cached region per
//! access kind, so a page-table walk's region lookups don't evict the data-access cache and vice
//! versa.

use crate::error::MmuInternalError;
use crate::memory_map::{MemoryMap, RegionBacking, RegionDescriptor};
use core::ptr::NonNull;
use log::error;

/// The kind of access a physical address lookup is for, used to pick which cached region to
/// check/update.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AccessKind {
    Read,
    Write,
    Fetch,
    PageTable,
    Dma,
}

const KIND_COUNT: usize = 5;

fn slot(kind: AccessKind) -> usize {
    match kind {
        AccessKind::Read => 0,
        AccessKind::Write => 1,
        AccessKind::Fetch => 2,
        AccessKind::PageTable => 3,
        AccessKind::Dma => 4,
    }
}

/// Per-access-kind cached-region physical dispatcher.
#[derive(Default)]
pub struct PhysicalDispatcher {
    cached: [Option<RegionDescriptor>; KIND_COUNT],
}

impl PhysicalDispatcher {
    pub fn new() -> Self {
        Self {
            cached: [None; KIND_COUNT],
        }
    }

    /// Look up the region containing `pa`, consulting (and maintaining) the per-`kind` cache.
    /// `len` only controls whether the result is cache-eligible: a region is cached only if it
    /// fully contains `[pa, pa+len)`, but this may still return a region that does not — callers
    /// that need the full-containment guarantee (`dma_window`) must check
    /// `region.contains_range(pa, len)` themselves.
    fn resolve<M: MemoryMap>(
        &mut self,
        memory_map: &M,
        kind: AccessKind,
        pa: u32,
        len: u32,
    ) -> Option<RegionDescriptor> {
        let idx = slot(kind);
        if let Some(region) = self.cached[idx] {
            if region.contains_range(pa, len) {
                return Some(region);
            }
        }
        let region = memory_map.find_range(pa)?;
        if region.contains_range(pa, len) {
            self.cached[idx] = Some(region);
        }
        Some(region)
    }

    /// Read `size` bytes (1/2/4/8) from physical address `pa`. Unmapped reads log and return
    /// all-ones of the requested width (§7 "recovered locally").
    pub fn read<M: MemoryMap>(&mut self, memory_map: &M, kind: AccessKind, pa: u32, size: u8) -> u64 {
        match self.resolve(memory_map, kind, pa, u32::from(size)) {
            Some(region) => match region.backing {
                RegionBacking::HostMemory { host_ptr, .. } => {
                    // SAFETY: `find_range` vouches for at least one live byte at `host_ptr +
                    // (pa - region.start)`; a read straddling the end of the region is the same
                    // non-architectural looseness the original tolerates at this call site.
                    unsafe { crate::word::load_from_host_raw(host_ptr, pa - region.start, size) }
                }
                RegionBacking::Mmio { device } => {
                    memory_map.device_read(device, region.start, pa - region.start, size)
                }
            },
            None => {
                error!("read from unmapped physical address {pa:#010x}");
                all_ones(size)
            }
        }
    }

    /// Write the low `size * 8` bits of `value` to physical address `pa`. Unmapped and read-only
    /// writes log and are otherwise dropped.
    pub fn write<M: MemoryMap>(
        &mut self,
        memory_map: &M,
        kind: AccessKind,
        pa: u32,
        value: u64,
        size: u8,
    ) {
        match self.resolve(memory_map, kind, pa, u32::from(size)) {
            Some(region) => match region.backing {
                RegionBacking::HostMemory {
                    host_ptr,
                    writable: true,
                } => {
                    // SAFETY: as in `read`.
                    unsafe {
                        crate::word::store_to_host_raw(host_ptr, pa - region.start, value, size);
                    }
                }
                RegionBacking::HostMemory { writable: false, .. } => {
                    error!("write to read-only region at physical address {pa:#010x}");
                }
                RegionBacking::Mmio { device } => {
                    memory_map.device_write(device, region.start, pa - region.start, value, size);
                }
            },
            None => {
                error!("write to unmapped physical address {pa:#010x}");
            }
        }
    }

    /// Resolve a host pointer usable for `len` bytes of DMA starting at physical address `pa`.
    /// Fails hard (§7 "Internal") rather than recovering, matching the original's
    /// `mmu_get_dma_mem` abort-on-miss behavior: DMA callers have no architectural fault path to
    /// fall back to. Unlike `read`/`write`, a range straddling a region boundary is itself a hard
    /// failure (§4.1 "fails hard if the range is not RAM/ROM or straddles regions") rather than the
    /// original's edge-of-region looseness, since a DMA caller gets back a raw pointer it may read
    /// or write for the full `len` with no further bounds checking.
    pub fn dma_window<M: MemoryMap>(
        &mut self,
        memory_map: &M,
        pa: u32,
        len: u32,
    ) -> Result<NonNull<u8>, MmuInternalError> {
        let region = self
            .resolve(memory_map, AccessKind::Dma, pa, len)
            .ok_or(MmuInternalError("DMA access to unmapped physical memory"))?;
        if !region.contains_range(pa, len) {
            return Err(MmuInternalError("DMA access straddles a region boundary"));
        }
        match region.backing {
            RegionBacking::HostMemory { host_ptr, .. } => {
                // SAFETY: `region.contains_range` was just verified above, so `pa..pa+len` lies
                // within the host allocation `find_range` vouched for with `host_ptr`.
                Ok(unsafe { NonNull::new_unchecked(host_ptr.as_ptr().add((pa - region.start) as usize)) })
            }
            RegionBacking::Mmio { .. } => Err(MmuInternalError("DMA access to an MMIO region")),
        }
    }
}

fn all_ones(size: u8) -> u64 {
    if size >= 8 {
        u64::MAX
    } else {
        (1u64 << (u32::from(size) * 8)) - 1
    }
}

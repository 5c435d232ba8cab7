// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! PowerPC 32-bit address-translation and memory-access core.
//!
//! [`Mmu`] is the hot-path entry point an emulated PowerPC CPU calls to fetch instructions and to
//! load/store operands: it translates a 32-bit effective address through the BAT engine
//! ([`bat`]) or the hashed page-table walker ([`pagetable`]), caches the result in a two-level
//! software TLB ([`tlb`]) indexed by the current MMU mode ([`context`]), and finally reads or
//! writes either host-backed guest RAM/ROM or dispatches to an emulated MMIO device through the
//! physical memory dispatcher ([`phys`]).
//!
//! The core never owns the CPU state or the physical memory map; every entry point borrows its
//! two collaborators, [`CpuBus`] and [`MemoryMap`], for the duration of a single call.

pub mod bat;
pub mod context;
pub mod cpu_bus;
pub mod error;
pub mod memory_map;
pub mod pagetable;
pub mod phys;
#[cfg(any(feature = "mmu-profiling", feature = "tlb-profiling"))]
pub mod profiling;
pub mod tlb;
pub mod word;

#[cfg(test)]
mod test_support;

use bat::BatArray;
use context::ContextController;
use cpu_bus::{access_bits, ContextSyncAction, CpuBus, Msr};
use error::{DebugReadError, MmuException, MmuInternalError};
use log::{error, warn};
use memory_map::{MemoryMap, RegionBacking};
use pagetable::walker;
use phys::PhysicalDispatcher;
use std::ptr::NonNull;
use tlb::{TlbEntry, TlbFlags};
use word::MemWord;

/// A constant all-ones cell that unmapped-physical TLB entries point at, so repeated reads of an
/// unmapped page return all-ones without re-walking BAT/PAT each time (§4.4, §9 Design Notes).
/// Mirrors the original's `UnmappedVal` static.
static UNMAPPED_SENTINEL: [u8; 8] = [0xFF; 8];

fn unmapped_host_va_offset(ea: u32) -> i64 {
    (UNMAPPED_SENTINEL.as_ptr() as i64) - i64::from(ea)
}

/// The PowerPC address-translation and memory-access core, generic over its two collaborators so
/// translation stays monomorphized on the hot path — no trait objects, mirroring the teacher's
/// `Platform`/`Cpu` traits resolved at compile time via a type alias.
pub struct Mmu {
    ibat: BatArray,
    dbat: BatArray,
    phys: PhysicalDispatcher,
    ctx: ContextController,
    #[cfg(feature = "mmu-profiling")]
    pub profile: profiling::MmuProfile,
    #[cfg(feature = "tlb-profiling")]
    pub tlb_profile: profiling::TlbProfile,
}

impl Mmu {
    pub fn new() -> Self {
        Self {
            ibat: BatArray::new(),
            dbat: BatArray::new(),
            phys: PhysicalDispatcher::new(),
            ctx: ContextController::new(),
            #[cfg(feature = "mmu-profiling")]
            profile: profiling::MmuProfile::default(),
            #[cfg(feature = "tlb-profiling")]
            tlb_profile: profiling::TlbProfile::default(),
        }
    }

    /// Fetch one big-endian 32-bit instruction word at `pc` (§4.5, §6 `fetch`). Translates
    /// against IBAT/MSR\[IR\]; execution from an MMIO region is rejected.
    pub fn fetch<B: CpuBus, M: MemoryMap>(&mut self, bus: &B, memory_map: &M, pc: u32) -> u32 {
        let entry = self.translate_ro(bus, memory_map, pc, true);
        if entry.flags.contains(TlbFlags::PAGE_IO) {
            panic!("attempted to execute from an MMIO region at {pc:#010x}");
        }
        #[cfg(feature = "mmu-profiling")]
        {
            self.profile.exec_reads_total += 1;
        }
        // SAFETY: `entry.flags` contains `PAGE_MEM`, established either by a successful host-backed
        // region lookup in `refill` or by the all-ones unmapped sentinel, both of which vouch for
        // `entry.host_va_offset + pc` addressing at least 4 live bytes.
        unsafe { word::load_from_host::<u32>(entry.host_va_offset, pc) }
    }

    /// Read a `T` from effective address `ea` (§4.5, §6 `read_vmem`).
    pub fn read_vmem<B: CpuBus, M: MemoryMap, T: MemWord>(
        &mut self,
        bus: &B,
        memory_map: &M,
        ea: u32,
    ) -> T {
        let width = T::WIDTH;
        if word::crosses_page(ea, width) {
            #[cfg(feature = "mmu-profiling")]
            {
                self.profile.unaligned_crossp_r += 1;
            }
            warn!("cross-page unaligned read of {width} bytes at {ea:#010x}");
            let mut raw = 0u64;
            for i in 0..u32::from(width) {
                raw = (raw << 8) | u64::from(self.read_vmem::<B, M, u8>(bus, memory_map, ea.wrapping_add(i)));
            }
            return T::from_be_u64(raw);
        }

        let entry = self.translate_ro(bus, memory_map, ea, false);
        if entry.flags.contains(TlbFlags::PAGE_IO) {
            #[cfg(feature = "mmu-profiling")]
            {
                self.profile.iomem_reads_total += 1;
            }
            return T::from_be_u64(memory_map.device_read(entry.device, entry.io_base, ea - entry.io_base, width));
        }
        #[cfg(feature = "mmu-profiling")]
        {
            self.profile.dmem_reads_total += 1;
            if width > 1 && ea & u32::from(width - 1) != 0 {
                self.profile.unaligned_reads += 1;
            }
        }
        // SAFETY: see `fetch`.
        unsafe { word::load_from_host::<T>(entry.host_va_offset, ea) }
    }

    /// Write a `T` to effective address `ea` (§4.5, §6 `write_vmem`).
    pub fn write_vmem<B: CpuBus, M: MemoryMap, T: MemWord>(
        &mut self,
        bus: &B,
        memory_map: &M,
        ea: u32,
        value: T,
    ) {
        let width = T::WIDTH;
        if word::crosses_page(ea, width) {
            #[cfg(feature = "mmu-profiling")]
            {
                self.profile.unaligned_crossp_w += 1;
            }
            warn!("cross-page unaligned write of {width} bytes at {ea:#010x}");
            let raw = value.to_be_u64();
            for i in 0..u32::from(width) {
                let shift = (u32::from(width) - 1 - i) * 8;
                let byte = ((raw >> shift) & 0xFF) as u8;
                self.write_vmem::<B, M, u8>(bus, memory_map, ea.wrapping_add(i), byte);
            }
            return;
        }

        let entry = self.translate_rw(bus, memory_map, ea);
        if entry.flags.contains(TlbFlags::PAGE_UNMAPPED) {
            error!("write to unmapped physical address {:#010x}", entry.pa);
            return;
        }
        if entry.flags.contains(TlbFlags::PAGE_IO) {
            #[cfg(feature = "mmu-profiling")]
            {
                self.profile.iomem_writes_total += 1;
            }
            memory_map.device_write(entry.device, entry.io_base, ea - entry.io_base, value.to_be_u64(), width);
            return;
        }
        #[cfg(feature = "mmu-profiling")]
        {
            self.profile.dmem_writes_total += 1;
            if width > 1 && ea & u32::from(width - 1) != 0 {
                self.profile.unaligned_writes += 1;
            }
        }
        // SAFETY: see `fetch`; `ensure_writable_and_c` already raised DSI if the page isn't
        // writable, so reaching here means the store is architecturally permitted.
        unsafe { word::store_to_host::<T>(entry.host_va_offset, ea, value) }
    }

    /// Resolve a host pointer valid for `len` bytes of DMA starting at physical address `pa`
    /// (§6 `dma_window`). Fails hard rather than recovering (§7).
    pub fn dma_window<M: MemoryMap>(&mut self, memory_map: &M, pa: u32, len: u32) -> Result<NonNull<u8>, MmuInternalError> {
        self.phys.dma_window(memory_map, pa, len)
    }

    /// Rebuild `IBATxU`/`IBATxL` (SPR numbers 528..=535) from the CPU's SPR file and, unlike the
    /// original (§9 Open Questions, REDESIGN FLAGS), schedule a deferred flush of
    /// `TLBE_FROM_BAT`-tagged instruction-side TLB entries — the original's `ibat_update` never
    /// did this, which the spec flags as likely a bug.
    pub fn ibat_update<B: CpuBus>(&mut self, bus: &B, bat_reg: u32) {
        let upper_num = bat_reg & !1;
        let index = ((upper_num - bat::IBAT_BASE) / 2) as usize;
        let upper = bus.spr(upper_num);
        let lower = bus.spr(upper_num + 1);
        self.ibat.update(index, upper, lower);
        if upper & 0b11 != 0 {
            self.ctx.schedule_bat_flush(bus);
        }
    }

    /// Rebuild `DBATxU`/`DBATxL` (SPR numbers 536..=543) and schedule a deferred flush of
    /// `TLBE_FROM_BAT`-tagged data-side TLB entries.
    pub fn dbat_update<B: CpuBus>(&mut self, bus: &B, bat_reg: u32) {
        let upper_num = bat_reg & !1;
        let index = ((upper_num - bat::DBAT_BASE) / 2) as usize;
        let upper = bus.spr(upper_num);
        let lower = bus.spr(upper_num + 1);
        self.dbat.update(index, upper, lower);
        if upper & 0b11 != 0 {
            self.ctx.schedule_bat_flush(bus);
        }
    }

    /// Recompute the active MMU mode from `MSR[DR]`/`MSR[PR]` and, implicitly, the active TLB
    /// pair (§4.6 `on_msr_change`).
    pub fn on_msr_change<B: CpuBus>(&mut self, bus: &B) {
        self.ctx.on_msr_change(bus.msr());
    }

    /// Schedule a deferred flush of `TLBE_FROM_PAT`-tagged entries after an SDR1 or segment
    /// register change (§4.6 `on_sdr1_or_sr_change`).
    pub fn on_sdr1_or_sr_change<B: CpuBus>(&mut self, bus: &B) {
        self.ctx.schedule_pat_flush(bus);
    }

    /// TLBIE: invalidate the single-page entry at `ea` across all three MMU-mode pairs, effective
    /// immediately (§4.6, §5).
    pub fn tlb_invalidate(&mut self, ea: u32) {
        self.ctx.tlb_invalidate(ea);
    }

    /// Run a deferred flush the CPU dequeued from its context-synchronization action list
    /// (§4.6, §6 `add_context_sync_action`).
    pub fn run_context_sync_action(&mut self, action: ContextSyncAction) {
        self.ctx.run_context_sync_action(action);
    }

    /// A read-only variant of [`Mmu::read_vmem`] that reports a missing translation or backing
    /// region as [`DebugReadError`] instead of diverting through [`CpuBus::raise`] (§6
    /// `debug_read`, §7). Relies on `bus.raise` being implemented with
    /// [`std::panic::panic_any`] so the architectural-exception path can be caught here; see
    /// [`CpuBus::raise`]'s documentation.
    pub fn debug_read<B: CpuBus, M: MemoryMap, T: MemWord>(
        &mut self,
        bus: &B,
        memory_map: &M,
        ea: u32,
    ) -> Result<T, DebugReadError> {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.debug_read_inner::<B, M, T>(bus, memory_map, ea)
        }));
        match outcome {
            Ok(result) => result,
            Err(payload) => match payload.downcast::<MmuException>() {
                Ok(exception) => Err(DebugReadError::Exception(*exception)),
                Err(payload) => std::panic::resume_unwind(payload),
            },
        }
    }

    fn debug_read_inner<B: CpuBus, M: MemoryMap, T: MemWord>(
        &mut self,
        bus: &B,
        memory_map: &M,
        ea: u32,
    ) -> Result<T, DebugReadError> {
        let width = T::WIDTH;
        if word::crosses_page(ea, width) {
            let mut raw = 0u64;
            for i in 0..u32::from(width) {
                let byte = self.debug_read_inner::<B, M, u8>(bus, memory_map, ea.wrapping_add(i))?;
                raw = (raw << 8) | u64::from(byte);
            }
            return Ok(T::from_be_u64(raw));
        }
        let entry = self.translate_ro(bus, memory_map, ea, false);
        if entry.flags.contains(TlbFlags::PAGE_UNMAPPED) {
            return Err(DebugReadError::UnmappedPhysical { pa: entry.pa });
        }
        if entry.flags.contains(TlbFlags::PAGE_IO) {
            return Ok(T::from_be_u64(memory_map.device_read(entry.device, entry.io_base, ea - entry.io_base, width)));
        }
        // SAFETY: see `fetch`.
        Ok(unsafe { word::load_from_host::<T>(entry.host_va_offset, ea) })
    }

    /// Shared primary/secondary/refill lookup for reads and fetches (§4.4).
    fn translate_ro<B: CpuBus, M: MemoryMap>(&mut self, bus: &B, memory_map: &M, ea: u32, is_fetch: bool) -> TlbEntry {
        let mode = self.ctx.mode();
        if let Some(entry) = self.ctx.bank_mut().pair(mode).primary_hit(ea) {
            #[cfg(feature = "tlb-profiling")]
            {
                self.tlb_profile.num_primary_tlb_hits += 1;
            }
            return entry;
        }
        if let Some(entry) = self.ctx.bank_mut().pair(mode).secondary_hit(ea) {
            #[cfg(feature = "tlb-profiling")]
            {
                self.tlb_profile.num_secondary_tlb_hits += 1;
            }
            if entry.flags.contains(TlbFlags::PAGE_MEM) {
                self.ctx.bank_mut().pair(mode).promote(ea, &entry);
            }
            return entry;
        }
        #[cfg(feature = "tlb-profiling")]
        {
            self.tlb_profile.num_tlb_refills += 1;
            if self.ctx.bank_mut().pair(mode).would_replace(ea) {
                self.tlb_profile.num_entry_replacements += 1;
            }
        }
        let refilled = self.refill(bus, memory_map, ea, is_fetch, false);
        let installed = self.ctx.bank_mut().pair(mode).install(ea, refilled);
        if installed.flags.contains(TlbFlags::PAGE_MEM) {
            self.ctx.bank_mut().pair(mode).promote(ea, &installed);
        }
        installed
    }

    /// Shared primary/secondary/refill lookup for writes, adding the writability check and lazy
    /// PTE.C update (§4.5).
    fn translate_rw<B: CpuBus, M: MemoryMap>(&mut self, bus: &B, memory_map: &M, ea: u32) -> TlbEntry {
        let mode = self.ctx.mode();
        if let Some(mut entry) = self.ctx.bank_mut().pair(mode).primary_hit(ea) {
            #[cfg(feature = "tlb-profiling")]
            {
                self.tlb_profile.num_primary_tlb_hits += 1;
            }
            self.ensure_writable_and_c(bus, memory_map, ea, &mut entry);
            return entry;
        }
        if let Some(mut entry) = self.ctx.bank_mut().pair(mode).secondary_hit(ea) {
            #[cfg(feature = "tlb-profiling")]
            {
                self.tlb_profile.num_secondary_tlb_hits += 1;
            }
            self.ensure_writable_and_c(bus, memory_map, ea, &mut entry);
            if entry.flags.contains(TlbFlags::PAGE_MEM) {
                self.ctx.bank_mut().pair(mode).promote(ea, &entry);
            }
            return entry;
        }
        #[cfg(feature = "tlb-profiling")]
        {
            self.tlb_profile.num_tlb_refills += 1;
            if self.ctx.bank_mut().pair(mode).would_replace(ea) {
                self.tlb_profile.num_entry_replacements += 1;
            }
        }
        let refilled = self.refill(bus, memory_map, ea, false, true);
        let installed = self.ctx.bank_mut().pair(mode).install(ea, refilled);
        if !installed.flags.contains(TlbFlags::PAGE_WRITABLE) {
            bus.raise(MmuException::Dsi {
                dsisr: 0x0800_0000 | (1 << 25),
                dar: ea,
            });
        }
        if installed.flags.contains(TlbFlags::PAGE_MEM) {
            self.ctx.bank_mut().pair(mode).promote(ea, &installed);
        }
        installed
    }

    /// On a write through an already-installed entry, raise DSI if the page isn't writable, and
    /// lazily re-walk the page table to set the PTE's C bit the first time a page that was only
    /// ever read gets written (§4.5).
    fn ensure_writable_and_c<B: CpuBus, M: MemoryMap>(
        &mut self,
        bus: &B,
        memory_map: &M,
        ea: u32,
        entry: &mut TlbEntry,
    ) {
        if !entry.flags.contains(TlbFlags::PAGE_WRITABLE) {
            bus.raise(MmuException::Dsi {
                dsisr: 0x0800_0000 | (1 << 25),
                dar: ea,
            });
        }
        if !entry.flags.contains(TlbFlags::PTE_SET_C) {
            let privilege = bus.msr().privilege();
            walker::walk(bus, &mut self.phys, memory_map, ea, false, privilege, true);
            entry.flags |= TlbFlags::PTE_SET_C;
            let mode = self.ctx.mode();
            self.ctx.bank_mut().pair(mode).set_entry_flags(ea, TlbFlags::PTE_SET_C);
        }
    }

    /// Translate `ea` from scratch via BAT then the page table (if BAT misses), and resolve the
    /// resulting physical address through the memory map (§4.4 `tlb2_refill`). Diverges via
    /// `bus.raise` on an architectural fault; otherwise returns the entry to install.
    fn refill<B: CpuBus, M: MemoryMap>(
        &mut self,
        bus: &B,
        memory_map: &M,
        ea: u32,
        is_fetch: bool,
        is_write: bool,
    ) -> TlbEntry {
        let tag = ea & !0xFFF;
        let msr = bus.msr();
        let translation_enabled = if is_fetch { msr.contains(Msr::IR) } else { msr.contains(Msr::DR) };

        let (pa, mut flags) = if !translation_enabled {
            (ea, TlbFlags::PAGE_WRITABLE | TlbFlags::PTE_SET_C)
        } else {
            let privilege = msr.privilege();
            let access = access_bits(privilege);
            let bat_array = if is_fetch { &self.ibat } else { &self.dbat };
            if let Some(hit) = bat_array.translate(ea, access) {
                #[cfg(feature = "mmu-profiling")]
                {
                    self.profile.bat_transl_total += 1;
                }
                if is_fetch {
                    if !hit.is_readable() {
                        bus.raise(MmuException::Isi { srr1_bits: 0x0800_0000 });
                    }
                } else if !hit.is_readable() || (is_write && !hit.is_writable()) {
                    bus.raise(MmuException::Dsi {
                        dsisr: 0x0800_0000 | (u32::from(is_write) << 25),
                        dar: ea,
                    });
                }
                let mut flags = TlbFlags::TLBE_FROM_BAT | TlbFlags::PTE_SET_C;
                if hit.is_writable() {
                    flags |= TlbFlags::PAGE_WRITABLE;
                }
                (hit.pa, flags)
            } else {
                #[cfg(feature = "mmu-profiling")]
                {
                    self.profile.ptab_transl_total += 1;
                }
                let walked = walker::walk(bus, &mut self.phys, memory_map, ea, is_fetch, privilege, is_write);
                let mut flags = TlbFlags::TLBE_FROM_PAT;
                if walked.is_writable() {
                    flags |= TlbFlags::PAGE_WRITABLE;
                }
                if is_write || walked.pte_c_already_set {
                    flags |= TlbFlags::PTE_SET_C;
                }
                (walked.pa, flags)
            }
        };

        let mut entry = TlbEntry {
            tag,
            pa,
            ..Default::default()
        };
        match memory_map.find_range(pa) {
            Some(region) => match region.backing {
                RegionBacking::HostMemory { host_ptr, .. } => {
                    flags |= TlbFlags::PAGE_MEM;
                    entry.host_va_offset =
                        host_ptr.as_ptr() as i64 - i64::from(ea) + i64::from(pa - region.start);
                }
                RegionBacking::Mmio { device } => {
                    flags |= TlbFlags::PAGE_IO;
                    entry.device = device;
                    entry.io_base = region.start;
                }
            },
            None => {
                error!("no mapping for physical address {pa:#010x} (ea {ea:#010x})");
                flags |= TlbFlags::PAGE_MEM | TlbFlags::PAGE_UNMAPPED;
                entry.host_va_offset = unmapped_host_va_offset(ea);
            }
        }
        entry.flags = flags;
        entry
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Fake [`CpuBus`]/[`MemoryMap`] implementations shared by the unit tests in [`crate::tests`],
//! in the style of the teacher's `platform::test::TestPlatform`: plain structs recording what was
//! asked of them in `RefCell`/`Cell` fields, with no behaviour beyond what a test needs.

use crate::cpu_bus::{ContextSyncAction, CpuBus, Msr};
use crate::error::MmuException;
use crate::memory_map::{DeviceId, MemoryMap, RegionBacking, RegionDescriptor};
use core::cell::{Cell, RefCell};
use core::ptr::NonNull;

/// A fake CPU bus: plain registers in `Cell`s, `raise` implemented as `panic_any` so tests can
/// recover the exception with `catch_unwind` (see [`CpuBus::raise`]'s documented contract).
pub struct FakeBus {
    msr: Cell<Msr>,
    sr: RefCell<[u32; 16]>,
    sdr1: Cell<u32>,
    sprs: RefCell<[u32; 16]>,
    pub sync_actions: RefCell<Vec<ContextSyncAction>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            msr: Cell::new(Msr::empty()),
            sr: RefCell::new([0; 16]),
            sdr1: Cell::new(0),
            sprs: RefCell::new([0; 16]),
            sync_actions: RefCell::new(Vec::new()),
        }
    }

    pub fn set_msr(&self, msr: Msr) {
        self.msr.set(msr);
    }

    pub fn set_sr(&self, segment: u8, value: u32) {
        self.sr.borrow_mut()[segment as usize] = value;
    }

    pub fn set_sdr1(&self, value: u32) {
        self.sdr1.set(value);
    }

    /// `number` is an absolute SPR number in `528..=543` (the IBAT/DBAT upper/lower pairs).
    pub fn set_spr(&self, number: u32, value: u32) {
        self.sprs.borrow_mut()[(number - 528) as usize] = value;
    }
}

impl Default for FakeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBus for FakeBus {
    fn msr(&self) -> Msr {
        self.msr.get()
    }

    fn sr(&self, segment: u8) -> u32 {
        self.sr.borrow()[segment as usize]
    }

    fn sdr1(&self) -> u32 {
        self.sdr1.get()
    }

    fn spr(&self, number: u32) -> u32 {
        self.sprs.borrow()[(number - 528) as usize]
    }

    fn raise(&self, exception: MmuException) -> ! {
        std::panic::panic_any(exception);
    }

    fn add_context_sync_action(&self, action: ContextSyncAction) {
        self.sync_actions.borrow_mut().push(action);
    }
}

/// Catch an [`MmuException`] raised through [`FakeBus::raise`] inside `f`, panicking with any
/// other payload instead of swallowing it.
pub fn catch_exception<T>(f: impl FnOnce() -> T + std::panic::UnwindSafe) -> Result<T, MmuException> {
    match std::panic::catch_unwind(f) {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<MmuException>() {
            Ok(exception) => Err(*exception),
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}

/// A recorded call to [`FakeMemoryMap::device_read`] or [`FakeMemoryMap::device_write`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceAccess {
    Read { offset: u32, size: u8 },
    Write { offset: u32, size: u8, value: u64 },
}

/// A fake physical memory map: one host-backed RAM region, one read-only ROM region, and one MMIO
/// device, all fixed at construction, matching the handful of regions the integration tests need.
pub struct FakeMemoryMap {
    ram: RefCell<Box<[u8]>>,
    ram_base: u32,
    rom: RefCell<Box<[u8]>>,
    rom_base: u32,
    mmio_base: u32,
    mmio_size: u32,
    pub mmio_accesses: RefCell<Vec<DeviceAccess>>,
    mmio_read_value: Cell<u64>,
}

impl FakeMemoryMap {
    pub fn new(ram_base: u32, ram_size: u32, rom_base: u32, rom_size: u32, mmio_base: u32, mmio_size: u32) -> Self {
        Self {
            ram: RefCell::new(vec![0u8; ram_size as usize].into_boxed_slice()),
            ram_base,
            rom: RefCell::new(vec![0u8; rom_size as usize].into_boxed_slice()),
            rom_base,
            mmio_base,
            mmio_size,
            mmio_accesses: RefCell::new(Vec::new()),
            mmio_read_value: Cell::new(0),
        }
    }

    pub fn ram_ptr(&self) -> NonNull<u8> {
        NonNull::new(self.ram.borrow_mut().as_mut_ptr()).unwrap()
    }

    pub fn rom_ptr(&self) -> NonNull<u8> {
        NonNull::new(self.rom.borrow_mut().as_mut_ptr()).unwrap()
    }

    pub fn set_mmio_read_value(&self, value: u64) {
        self.mmio_read_value.set(value);
    }

    pub fn write_ram_byte(&self, pa: u32, value: u8) {
        self.ram.borrow_mut()[(pa - self.ram_base) as usize] = value;
    }

    pub fn read_ram_byte(&self, pa: u32) -> u8 {
        self.ram.borrow()[(pa - self.ram_base) as usize]
    }

    pub fn read_ram_u32(&self, pa: u32) -> u32 {
        u32::from_be_bytes([
            self.read_ram_byte(pa),
            self.read_ram_byte(pa + 1),
            self.read_ram_byte(pa + 2),
            self.read_ram_byte(pa + 3),
        ])
    }

    /// Plant a raw hashed-page-table entry at physical address `pteg_entry_addr`.
    pub fn write_pte(&self, pteg_entry_addr: u32, word0: u32, word1: u32) {
        for (i, byte) in word0.to_be_bytes().into_iter().enumerate() {
            self.write_ram_byte(pteg_entry_addr + i as u32, byte);
        }
        for (i, byte) in word1.to_be_bytes().into_iter().enumerate() {
            self.write_ram_byte(pteg_entry_addr + 4 + i as u32, byte);
        }
    }

    pub fn read_pte_word1(&self, pteg_entry_addr: u32) -> u32 {
        self.read_ram_u32(pteg_entry_addr + 4)
    }
}

impl MemoryMap for FakeMemoryMap {
    fn find_range(&self, pa: u32) -> Option<RegionDescriptor> {
        let ram_len = self.ram.borrow().len() as u32;
        if pa >= self.ram_base && pa < self.ram_base + ram_len {
            return Some(RegionDescriptor {
                start: self.ram_base,
                end: self.ram_base + ram_len - 1,
                backing: RegionBacking::HostMemory {
                    host_ptr: self.ram_ptr(),
                    writable: true,
                },
            });
        }
        let rom_len = self.rom.borrow().len() as u32;
        if pa >= self.rom_base && pa < self.rom_base + rom_len {
            return Some(RegionDescriptor {
                start: self.rom_base,
                end: self.rom_base + rom_len - 1,
                backing: RegionBacking::HostMemory {
                    host_ptr: self.rom_ptr(),
                    writable: false,
                },
            });
        }
        if pa >= self.mmio_base && pa < self.mmio_base + self.mmio_size {
            return Some(RegionDescriptor {
                start: self.mmio_base,
                end: self.mmio_base + self.mmio_size - 1,
                backing: RegionBacking::Mmio { device: DeviceId(0) },
            });
        }
        None
    }

    fn device_read(&self, _device: DeviceId, _base: u32, offset: u32, size: u8) -> u64 {
        self.mmio_accesses.borrow_mut().push(DeviceAccess::Read { offset, size });
        self.mmio_read_value.get()
    }

    fn device_write(&self, _device: DeviceId, _base: u32, offset: u32, value: u64, size: u8) {
        self.mmio_accesses.borrow_mut().push(DeviceAccess::Write { offset, size, value });
    }
}

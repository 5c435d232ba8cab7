// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The fixed set of access widths the virtual access front-end (§4.5, C5) supports.
//!
//! The original instantiates `mmu_read_vmem`/`mmu_write_vmem` as C++ templates over
//! `uint8_t`/`uint16_t`/`uint32_t`/`uint64_t`. A sealed trait plays the same role here, letting
//! `Mmu::read_vmem::<T>`/`write_vmem::<T>` monomorphize per width without a runtime tag.

use core::ptr::NonNull;

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

/// A guest memory access width, big-endian encoded on the wire.
pub trait MemWord: Copy + sealed::Sealed {
    /// Width in bytes: 1, 2, 4, or 8.
    const WIDTH: u8;

    fn from_be_u64(raw: u64) -> Self;
    fn to_be_u64(self) -> u64;
}

impl MemWord for u8 {
    const WIDTH: u8 = 1;
    fn from_be_u64(raw: u64) -> Self {
        raw as u8
    }
    fn to_be_u64(self) -> u64 {
        u64::from(self)
    }
}

impl MemWord for u16 {
    const WIDTH: u8 = 2;
    fn from_be_u64(raw: u64) -> Self {
        raw as u16
    }
    fn to_be_u64(self) -> u64 {
        u64::from(self)
    }
}

impl MemWord for u32 {
    const WIDTH: u8 = 4;
    fn from_be_u64(raw: u64) -> Self {
        raw as u32
    }
    fn to_be_u64(self) -> u64 {
        u64::from(self)
    }
}

impl MemWord for u64 {
    const WIDTH: u8 = 8;
    fn from_be_u64(raw: u64) -> Self {
        raw
    }
    fn to_be_u64(self) -> u64 {
        self
    }
}

/// Whether a `WIDTH`-byte access starting at `ea` crosses a 4 KiB page boundary.
pub fn crosses_page(ea: u32, width: u8) -> bool {
    (ea & 0xFFF) + u32::from(width) > 0x1000
}

/// Read a `T` out of host memory at `host_va_offset + ea`, decoding big-endian.
///
/// # Safety
///
/// `host_va_offset + ea` must address at least `T::WIDTH` live bytes of host memory. Callers
/// obtain `host_va_offset` exclusively from TLB entries installed by `Mmu`'s refill path, which
/// only sets it for regions `MemoryMap::find_range` vouched for as host-backed; the memory-map
/// stability invariant (§3) guarantees any TLB entry referencing a region is invalidated before
/// that region is moved or freed.
pub unsafe fn load_from_host<T: MemWord>(host_va_offset: i64, ea: u32) -> T {
    let addr = (host_va_offset + i64::from(ea)) as usize;
    // SAFETY: forwarded from caller.
    unsafe {
        let ptr = addr as *const u8;
        T::from_be_u64(match T::WIDTH {
            1 => u64::from(ptr.read()),
            2 => u64::from(ptr.cast::<zerocopy::big_endian::U16>().read_unaligned().get()),
            4 => u64::from(ptr.cast::<zerocopy::big_endian::U32>().read_unaligned().get()),
            8 => ptr.cast::<zerocopy::big_endian::U64>().read_unaligned().get(),
            _ => unreachable!("MemWord::WIDTH is always 1, 2, 4, or 8"),
        })
    }
}

/// Write a `T` into host memory at `host_va_offset + ea`, encoding big-endian.
///
/// # Safety
///
/// Same contract as [`load_from_host`], plus the region must be writable.
pub unsafe fn store_to_host<T: MemWord>(host_va_offset: i64, ea: u32, value: T) {
    let addr = (host_va_offset + i64::from(ea)) as usize;
    let raw = value.to_be_u64();
    // SAFETY: forwarded from caller.
    unsafe {
        let ptr = addr as *mut u8;
        match T::WIDTH {
            1 => ptr.write(raw as u8),
            2 => ptr
                .cast::<zerocopy::big_endian::U16>()
                .write_unaligned(zerocopy::big_endian::U16::new(raw as u16)),
            4 => ptr
                .cast::<zerocopy::big_endian::U32>()
                .write_unaligned(zerocopy::big_endian::U32::new(raw as u32)),
            8 => ptr
                .cast::<zerocopy::big_endian::U64>()
                .write_unaligned(zerocopy::big_endian::U64::new(raw)),
            _ => unreachable!("MemWord::WIDTH is always 1, 2, 4, or 8"),
        }
    }
}

/// Runtime-width counterpart of [`load_from_host`], for the physical dispatcher (C1), which deals
/// in region-relative offsets and a `size` known only at call time rather than a compile-time
/// `T`.
///
/// # Safety
///
/// `host_ptr + offset` must address at least `size` live bytes of host memory.
pub unsafe fn load_from_host_raw(host_ptr: NonNull<u8>, offset: u32, size: u8) -> u64 {
    // SAFETY: forwarded from caller.
    unsafe {
        let ptr = host_ptr.as_ptr().add(offset as usize).cast_const();
        match size {
            1 => u64::from(ptr.read()),
            2 => u64::from(ptr.cast::<zerocopy::big_endian::U16>().read_unaligned().get()),
            4 => u64::from(ptr.cast::<zerocopy::big_endian::U32>().read_unaligned().get()),
            8 => ptr.cast::<zerocopy::big_endian::U64>().read_unaligned().get(),
            _ => unreachable!("physical access sizes are always 1, 2, 4, or 8"),
        }
    }
}

/// Runtime-width counterpart of [`store_to_host`].
///
/// # Safety
///
/// Same contract as [`load_from_host_raw`].
pub unsafe fn store_to_host_raw(host_ptr: NonNull<u8>, offset: u32, value: u64, size: u8) {
    // SAFETY: forwarded from caller.
    unsafe {
        let ptr = host_ptr.as_ptr().add(offset as usize);
        match size {
            1 => ptr.write(value as u8),
            2 => ptr
                .cast::<zerocopy::big_endian::U16>()
                .write_unaligned(zerocopy::big_endian::U16::new(value as u16)),
            4 => ptr
                .cast::<zerocopy::big_endian::U32>()
                .write_unaligned(zerocopy::big_endian::U32::new(value as u32)),
            8 => ptr
                .cast::<zerocopy::big_endian::U64>()
                .write_unaligned(zerocopy::big_endian::U64::new(value)),
            _ => unreachable!("physical access sizes are always 1, 2, 4, or 8"),
        }
    }
}

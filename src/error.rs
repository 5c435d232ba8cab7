// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Architectural and non-architectural error taxonomy for address translation.
//!
//! ISI and DSI are architectural faults and are always delivered through [`crate::cpu_bus::CpuBus::raise`];
//! they are never returned as a `Result` from the hot-path entry points. [`DebugReadError`] is the
//! soft-error counterpart used only by [`crate::Mmu::debug_read`], which rebinds the upcall so a
//! missing translation comes back as data instead of diverting execution.

use thiserror::Error;

/// An architectural PowerPC MMU exception, populated with the SRR1/DSISR/DAR bits §4.3 and §4.5
/// specify for each fault site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MmuException {
    /// Instruction Storage Interrupt.
    #[error("ISI, SRR1 bits {srr1_bits:#010x}")]
    Isi {
        /// Bits to be ORed into SRR1 by the CPU's exception delivery path.
        srr1_bits: u32,
    },
    /// Data Storage Interrupt.
    #[error("DSI, DSISR={dsisr:#010x} DAR={dar:#010x}")]
    Dsi {
        /// Value to be written to DSISR.
        dsisr: u32,
        /// Value to be written to DAR.
        dar: u32,
    },
    /// Alignment interrupt. Reserved: only raised for disallowed misalignment kinds in a strict
    /// alignment mode, never by the default lenient byte-decomposition path (see §4.5, §9).
    #[error("alignment interrupt at EA {ea:#010x}")]
    Alignment {
        /// The effective address which triggered the fault.
        ea: u32,
    },
}

/// Error returned by [`crate::Mmu::debug_read`] instead of diverting through the normal exception
/// upcall.
#[derive(Clone, Copy, Debug, Error)]
pub enum DebugReadError {
    /// The access would have raised this architectural exception.
    #[error(transparent)]
    Exception(#[from] MmuException),
    /// The effective address has no backing physical region. Ordinary (non-debug) accesses
    /// recover from this locally (§7); `debug_read` surfaces it instead.
    #[error("no mapping for physical address {pa:#010x}")]
    UnmappedPhysical {
        /// The unmapped physical address.
        pa: u32,
    },
}

/// An invariant violation that leaves the core unable to make progress: a physical-memory range
/// consumed only by internal bookkeeping (DMA windows, page-table-entry groups) that the memory
/// map could not resolve. Matches the original's `exit(-1)` treatment of "SOS" conditions.
#[derive(Clone, Copy, Debug, Error)]
#[error("{0}")]
pub struct MmuInternalError(pub &'static str);

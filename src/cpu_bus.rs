// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The external CPU interface (§6 "Consumed from the CPU").
//!
//! The core never owns a `CpuBus`; every entry point borrows one for the duration of a single
//! call. This mirrors the teacher's `Platform`/`Cpu` traits, resolved per build to a concrete type
//! rather than boxed, so translation stays monomorphized on the hot path.

use crate::error::MmuException;

bitflags::bitflags! {
    /// The subset of MSR bits the translation core reads directly.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct Msr: u32 {
        /// Data address translation enable.
        const DR = 0x0000_0010;
        /// Instruction address translation enable.
        const IR = 0x0000_0020;
        /// Problem state (user mode) when set, supervisor otherwise.
        const PR = 0x0000_4000;
    }
}

impl Msr {
    /// The privilege level implied by `PR`.
    pub fn privilege(self) -> Privilege {
        if self.contains(Msr::PR) {
            Privilege::Problem
        } else {
            Privilege::Supervisor
        }
    }
}

/// Supervisor vs. problem (user) state, derived from `MSR[PR]`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Privilege {
    Supervisor,
    Problem,
}

/// The two-bit `%Vs,Vp`/`%Ks,Kp`-style access mask for the calling privilege: bit 1 set when
/// supervisor, bit 0 set when problem. Matches both BAT `Vs`/`Vp` validity bits and segment
/// register `Ks`/`Kp` key bits, which share this encoding.
pub fn access_bits(privilege: Privilege) -> u8 {
    match privilege {
        Privilege::Supervisor => 0b10,
        Privilege::Problem => 0b01,
    }
}

/// A deferred-flush action the core has scheduled with the CPU's context-synchronization queue.
/// Identified by tag, not by closure or owning reference, so the core and the CPU never hold
/// references to each other (§9 "No cycles").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ContextSyncAction {
    /// Invalidate every TLB entry tagged `TLBE_FROM_BAT`, across the supervisor and problem TLB
    /// pairs.
    FlushBatTlb,
    /// Invalidate every TLB entry tagged `TLBE_FROM_PAT`.
    FlushPatTlb,
}

/// External CPU state and upcalls the translation core consumes.
///
/// Implementors own the architected register file; the core only ever borrows it. `raise` must
/// not return: in production it performs the architectural exception delivery (vector entry,
/// SRR0/SRR1 save); in tests a fake may implement it by panicking with the exception as the panic
/// payload (`std::panic::panic_any`), which `Mmu::debug_read` relies on to rebind the upcall to a
/// recoverable `Result` via `catch_unwind`.
pub trait CpuBus {
    /// Current value of the Machine State Register bits this core cares about.
    fn msr(&self) -> Msr;

    /// Segment register `sr[segment]`, `segment` in `0..16`.
    fn sr(&self, segment: u8) -> u32;

    /// SDR1 (page table base + size mask).
    fn sdr1(&self) -> u32;

    /// Raw value of special-purpose register `number`, used for the BAT upper/lower pairs at SPR
    /// numbers 528..=543.
    fn spr(&self, number: u32) -> u32;

    /// Deliver an architectural exception. Must not return.
    fn raise(&self, exception: MmuException) -> !;

    /// Register a deferred action to run at the CPU's next context-synchronizing instruction.
    /// Idempotent from the caller's perspective: the core only calls this once per pending flush,
    /// but implementations should tolerate duplicate registrations gracefully.
    fn add_context_sync_action(&self, action: ContextSyncAction);
}

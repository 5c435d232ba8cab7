// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! C3: hashed page table layout and walking, split the way the teacher splits its own
//! `pagetable/` subtree into one file per concern.

pub mod pte;
pub mod walker;

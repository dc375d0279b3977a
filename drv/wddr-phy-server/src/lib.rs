// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core logic for the LPDDR4 PHY coordinator.
//!
//! This crate is split from `main.rs` so that every module that does not
//! directly poke memory-mapped registers can be built and tested on the
//! host. Only [`regs`] cares whether it is talking to real hardware or a
//! fake register file.

#![cfg_attr(target_os = "none", no_std)]

pub mod bitmap;
pub mod csr;
pub mod dfi_update;
pub mod dfi;
pub mod fsw;
pub mod notify;
pub mod pll;
pub mod regs;
pub mod table;
pub mod training;

pub use dfi_update::{DfiUpdateFsm, DfiUpdateFsmState};
pub use fsw::{PhyFsmState, PhySwitchFsm};
pub use regs::{Msr, RegisterAccessor};
pub use table::{FrequencyTable, PhyFrequencyId};

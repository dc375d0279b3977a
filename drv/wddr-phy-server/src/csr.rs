// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The handful of named CSR fields the coordinator touches directly. The
//! full register map (§6) is opaque and out of scope; these are the only
//! offsets this crate needs to name.

use crate::regs::Field;

pub const INIT_COMPLETE_OVERRIDE: Field = Field::new(0x00, 0, 0x1);
pub const PHYUPD_REQ: Field = Field::new(0x04, 0, 0x1);
pub const PHYUPD_TYPE: Field = Field::new(0x04, 1, 0x3);
pub const CTRLUPD_ACK: Field = Field::new(0x08, 0, 0x1);

/// PHYMSTR request CSR (§6 "PHYMSTR `req/type/cs_state/state_sel`"): one
/// register holding the request bit plus the two parameters the PHY asks
/// the controller to grant.
pub const PHYMSTR_REQ: Field = Field::new(0x3C, 0, 0x1);
pub const PHYMSTR_CS_STATE: Field = Field::new(0x3C, 1, 0x3);
pub const PHYMSTR_STATE_SEL: Field = Field::new(0x3C, 3, 0x1);
pub const FAULT_SIGNATURE: Field = Field::new(0x0C, 0, 0xFFFF_FFFF);

/// Sticky status bits shared by one interrupt line (§6 "interrupts
/// consumed"); the coordinator reads this once per notification and
/// services whichever of these are set, clearing each as it's handled.
pub const IRQ_INIT_START: Field = Field::new(0x10, 0, 0x1);
pub const IRQ_INIT_COMPLETE: Field = Field::new(0x10, 1, 0x1);
pub const IRQ_CTRLUPD_REQ: Field = Field::new(0x10, 2, 0x1);
pub const IRQ_CTRLUPD_REQ_DEASSERTED: Field = Field::new(0x10, 3, 0x1);
pub const IRQ_PHYUPD_ACK: Field = Field::new(0x10, 4, 0x1);
pub const IRQ_PHYUPD_ACK_DEASSERTED: Field = Field::new(0x10, 5, 0x1);
pub const IRQ_PLL_LOSS_OF_LOCK: Field = Field::new(0x10, 6, 0x1);
pub const IRQ_PLL_CORE_LOCKED: Field = Field::new(0x10, 7, 0x1);
pub const IRQ_PLL_INITIAL_SWITCH_DONE: Field = Field::new(0x10, 8, 0x1);
pub const IRQ_PHYMSTR_ACK: Field = Field::new(0x10, 9, 0x1);
pub const IRQ_PHYMSTR_ABORT: Field = Field::new(0x10, 10, 0x1);

/// IG (ingress, TX) FIFO: software pushes one 32-bit packet word per
/// write as long as `IG_FIFO_FULL` reads clear (§4.3 "Sending").
pub const IG_FIFO_DATA: Field = Field::new(0x20, 0, 0xFFFF_FFFF);
pub const IG_FIFO_FULL: Field = Field::new(0x24, 0, 0x1);
/// Arms the hardware timestamp comparator; once set, queued IG packets
/// stream out as their `ts` matches the free-running counter.
pub const IG_BUFFER_MODE_ENABLE: Field = Field::new(0x24, 1, 0x1);

/// EG (egress, RX) FIFO: software drains one 32-bit word per read as
/// long as `EG_FIFO_EMPTY` reads clear.
pub const EG_FIFO_DATA: Field = Field::new(0x28, 0, 0xFFFF_FFFF);
pub const EG_FIFO_EMPTY: Field = Field::new(0x2C, 0, 0x1);

/// IO-calibration code committed by the DFI update FSM's apply hook
/// (§4.6): whichever update protocol is in flight, `iocal_update_phy`
/// writes the frequency table's stored code here.
pub const IOCAL_CODE: Field = Field::new(0x30, 0, 0xFF);

/// Generic per-training knob pair (§4.7): each training routine maps its
/// own swept axis/axes onto these before issuing its probe burst. Real
/// hardware names these per training; this firmware only ever needs one
/// write/read pair to drive whichever one is live.
pub const TRAINING_KNOB_A: Field = Field::new(0x34, 0, 0xFF);
pub const TRAINING_KNOB_B: Field = Field::new(0x34, 8, 0xFF);

/// Selects the DUT overlay a training's frequency switch applies for its
/// duration (§4.7): HiZ DQ/DQS, BSCAN loopback, or none.
pub const OVERLAY_SELECT: Field = Field::new(0x38, 0, 0x3);

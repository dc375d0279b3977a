// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! C3 (packet engine) and C4 (DRAM command builder): the substrate every
//! DRAM mode-register write and every training routine issues its traffic
//! through.

pub mod command;
pub mod packet;

pub use command::{Chipselect, Command, CommandData, CommandType};
pub use packet::{
    DataMask, DfiRxPacket, DfiTxPacket, PacketAllocator, PacketError, PacketList, RxPacketBuffer,
};

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The stack virtual machine.
//!
//! ## Structure
//!
//! - `interpreter` - `VirtualMachine`: registers, instruction buffer and the
//!   fetch-decode-execute loop
//! - `opcode` - instruction set and the system-call table
//! - `memory` - pool partitioning and the heap allocator
//! - `syscall` - host-level trap implementations
//!
//! ## Memory
//!
//! ```text
//! 0            text          data          heap          stack    pool_size
//! |  opcodes   |  globals,    |  malloc      |  <- grows    |
//! |  operands  |  strings     |  blocks      |     down     |
//! ```

mod interpreter;
mod memory;
mod opcode;
mod syscall;

pub use interpreter::{DEFAULT_POOL_SIZE, Status, TRACE_TARGET, VirtualMachine};
pub use memory::{MemoryLayout, Segment};
pub use opcode::{Instruction, OpCode, SYSTEM_CALLS, SystemCall};

/// The machine word. Every cell, register, opcode and operand is one word.
pub type Word = i64;

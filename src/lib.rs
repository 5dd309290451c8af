//! Core MSP430 types shared by the assembler, emulator, and disassembler
//! crates: addressing-mode operands, instruction-word encoding, the register
//! file, flat memory, and the fetch/decode/execute loop itself.
//!
//! The assembler's source-level concerns (lines, labels, macros, listings)
//! live in `masm`, which depends on this crate for the bit-level encoding.

pub mod constants;
pub mod encoding;
pub mod error;
pub mod memory;
pub mod operand;
pub mod processor;
pub mod register;

pub use error::{CompileError, ExecutionError, LabelNotFound};
pub use memory::Memory;
pub use operand::{LabelMap, LabelRef, Operand};
pub use processor::Cpu;
pub use register::RegisterFile;

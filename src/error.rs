use std::error::Error;
use std::fmt;

/// A label reference that could not be resolved against the label →
/// address map built in the resolver's first pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LabelNotFound(pub String);

impl fmt::Display for LabelNotFound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "label '{}' not found", self.0)
    }
}

impl Error for LabelNotFound {}

/// Errors raised while turning a fully-parsed [`Operand`](crate::operand::Operand)
/// or instruction into its final word encoding. These require the label map
/// and current PC, so they can only surface during the compiler's second pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CompileError {
    LabelNotFound(String),
    /// The jump offset was odd (target not word-aligned).
    OddJumpOffset,
    /// `|offset_words|` exceeded the 10-bit signed jump field's range.
    JumpOutOfRange(i32),
    /// Only register-direct and indexed (incl. symbolic/absolute) addressing
    /// is legal as a destination operand.
    IllegalDestination,
    /// SWPB, SXT, and CALL do not support byte mode.
    ByteModeForbidden(&'static str),
    /// A data-section character did not fit in 8 bits.
    DataCharacterOutOfRange(char),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompileError::LabelNotFound(name) => write!(f, "label '{}' not found", name),
            CompileError::OddJumpOffset => write!(f, "jump target is not word-aligned"),
            CompileError::JumpOutOfRange(words) => {
                write!(f, "jump offset of {} words is out of range", words)
            }
            CompileError::IllegalDestination => {
                write!(f, "addressing mode is not legal as a destination")
            }
            CompileError::ByteModeForbidden(mnemonic) => {
                write!(f, "{} does not support byte mode", mnemonic)
            }
            CompileError::DataCharacterOutOfRange(c) => {
                write!(f, "character '{}' does not fit in 8 bits", c)
            }
        }
    }
}

impl Error for CompileError {}

impl From<LabelNotFound> for CompileError {
    fn from(err: LabelNotFound) -> CompileError {
        CompileError::LabelNotFound(err.0)
    }
}

/// Fatal errors raised mid-`step` by the emulator core. These abort the
/// current `step` invocation; the caller decides whether to reset.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExecutionError {
    /// PC or SP was assigned an odd address.
    Misaligned(&'static str),
    /// A word access targeted an odd memory address.
    OddMemoryAccess(u16),
    /// A memory access fell outside the 64 KiB address space.
    OutOfBounds(u32),
    /// SR was the target of a byte-mode read or write.
    ByteAccessOnSr,
    /// SP underflowed while pushing a value.
    StackOverflow,
    /// An instruction this core deliberately does not execute (DADD, RETI,
    /// the special-interrupt trap).
    Unimplemented(&'static str),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecutionError::Misaligned(which) => write!(f, "{} is not word-aligned", which),
            ExecutionError::OddMemoryAccess(addr) => {
                write!(f, "word access at odd address 0x{:04X}", addr)
            }
            ExecutionError::OutOfBounds(addr) => {
                write!(f, "memory access at 0x{:04X} is out of bounds", addr)
            }
            ExecutionError::ByteAccessOnSr => write!(f, "byte access on SR is not permitted"),
            ExecutionError::StackOverflow => write!(f, "stack overflow"),
            ExecutionError::Unimplemented(what) => write!(f, "{} is not implemented", what),
        }
    }
}

impl Error for ExecutionError {}

//! Operand variants and their MSP430 addressing-mode encoding (§4.5.1).
//!
//! An [`Operand`] is constructed during parsing with an unresolved
//! [`LabelRef`] and only turns into bits once a label → address map and the
//! instruction's PC are known, at compile time (§9, "Cyclic /
//! back-referencing data").

use std::collections::HashMap;

use crate::constants;
use crate::error::CompileError;

/// Maps label names to the address they were assigned during the resolver's
/// first pass.
pub type LabelMap = HashMap<String, u16>;

/// Either a literal integer or a label name, resolved late against a
/// [`LabelMap`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelRef {
    Literal(i32),
    Label(String),
}

impl LabelRef {
    pub fn resolve(&self, labels: &LabelMap) -> Result<i32, CompileError> {
        match self {
            LabelRef::Literal(v) => Ok(*v),
            LabelRef::Label(name) => labels
                .get(name)
                .map(|&addr| addr as i32)
                .ok_or_else(|| CompileError::LabelNotFound(name.clone())),
        }
    }
}

/// A single operand, carrying addressing-mode identity and its (possibly
/// unresolved) value. `reg` is always in 0..16.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    RegDirect(u8),
    Indexed(u8, LabelRef),
    RegIndirect(u8),
    RegIndirectAuto(u8),
    Symbolic(LabelRef),
    Absolute(LabelRef),
    Immediate(LabelRef),
}

/// The bits an operand contributes as a *source*: the 2-bit `As` field, the
/// 4-bit register field, and an optional 16-bit extension word.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SrcEncoding {
    pub as_bits: u8,
    pub reg: u8,
    pub ext: Option<u16>,
}

/// The bits an operand contributes as a *destination*: the 1-bit `Ad` field,
/// the 4-bit register field, and an optional extension word.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DstEncoding {
    pub ad_bit: u8,
    pub reg: u8,
    pub ext: Option<u16>,
}

impl Operand {
    /// Encodes this operand as a source, given the PC of the instruction's
    /// opcode word and whether the instruction is in byte mode.
    pub fn encode_src(
        &self,
        pc: u16,
        labels: &LabelMap,
        byte_mode: bool,
    ) -> Result<SrcEncoding, CompileError> {
        match self {
            Operand::RegDirect(reg) => Ok(SrcEncoding {
                as_bits: 0b00,
                reg: *reg,
                ext: None,
            }),
            Operand::Indexed(reg, offset) => Ok(SrcEncoding {
                as_bits: 0b01,
                reg: *reg,
                ext: Some(offset.resolve(labels)? as u16),
            }),
            Operand::RegIndirect(reg) => Ok(SrcEncoding {
                as_bits: 0b10,
                reg: *reg,
                ext: None,
            }),
            Operand::RegIndirectAuto(reg) => Ok(SrcEncoding {
                as_bits: 0b11,
                reg: *reg,
                ext: None,
            }),
            Operand::Symbolic(target) => {
                let target = target.resolve(labels)?;
                let ext = (target - (pc as i32 + 2)) as u16;
                Ok(SrcEncoding {
                    as_bits: 0b01,
                    reg: constants::PC,
                    ext: Some(ext),
                })
            }
            Operand::Absolute(target) => Ok(SrcEncoding {
                as_bits: 0b01,
                reg: constants::SR,
                ext: Some(target.resolve(labels)? as u16),
            }),
            Operand::Immediate(value) => {
                let v = value.resolve(labels)?;
                if let Some(&(_, as_bits, reg)) =
                    constants::CG_VALUES.iter().find(|(cv, _, _)| *cv == v)
                {
                    Ok(SrcEncoding {
                        as_bits,
                        reg,
                        ext: None,
                    })
                } else {
                    let ext = if byte_mode {
                        ((v as u16 & 0xFF) << 8) as u16
                    } else {
                        v as u16
                    };
                    Ok(SrcEncoding {
                        as_bits: 0b11,
                        reg: constants::PC,
                        ext: Some(ext),
                    })
                }
            }
        }
    }

    /// Encodes this operand as a destination. Only register-direct and
    /// indexed-family modes are legal here.
    pub fn encode_dst(&self, pc: u16, labels: &LabelMap) -> Result<DstEncoding, CompileError> {
        match self {
            Operand::RegDirect(reg) => Ok(DstEncoding {
                ad_bit: 0,
                reg: *reg,
                ext: None,
            }),
            Operand::Indexed(reg, offset) => Ok(DstEncoding {
                ad_bit: 1,
                reg: *reg,
                ext: Some(offset.resolve(labels)? as u16),
            }),
            Operand::Symbolic(target) => {
                let target = target.resolve(labels)?;
                let ext = (target - (pc as i32 + 2)) as u16;
                Ok(DstEncoding {
                    ad_bit: 1,
                    reg: constants::PC,
                    ext: Some(ext),
                })
            }
            Operand::Absolute(target) => Ok(DstEncoding {
                ad_bit: 1,
                reg: constants::SR,
                ext: Some(target.resolve(labels)? as u16),
            }),
            Operand::RegIndirect(_) | Operand::RegIndirectAuto(_) | Operand::Immediate(_) => {
                Err(CompileError::IllegalDestination)
            }
        }
    }

    /// Number of extra 16-bit words this operand contributes (0 or 1),
    /// independent of resolving any label. Used to compute `numWords`
    /// during the resolver's first pass.
    pub fn extra_words(&self) -> u16 {
        match self {
            Operand::RegDirect(_) | Operand::RegIndirect(_) | Operand::RegIndirectAuto(_) => 0,
            Operand::Indexed(..) | Operand::Symbolic(_) | Operand::Absolute(_) => 1,
            Operand::Immediate(value) => match value {
                LabelRef::Literal(v) if constants::CG_VALUES.iter().any(|(cv, _, _)| cv == v) => 0,
                _ => 1,
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn labels() -> LabelMap {
        let mut m = LabelMap::new();
        m.insert("LBL".to_string(), 0x100);
        m
    }

    #[test]
    fn constant_generator_immediates_need_no_extension_word() {
        for &(value, as_bits, reg) in &constants::CG_VALUES {
            let op = Operand::Immediate(LabelRef::Literal(value));
            let enc = op.encode_src(0, &labels(), false).unwrap();
            assert_eq!(enc.as_bits, as_bits);
            assert_eq!(enc.reg, reg);
            assert_eq!(enc.ext, None);
        }
    }

    #[test]
    fn non_special_immediate_uses_pc_source() {
        let op = Operand::Immediate(LabelRef::Literal(0x4400));
        let enc = op.encode_src(0, &labels(), false).unwrap();
        assert_eq!(enc.as_bits, 0b11);
        assert_eq!(enc.reg, constants::PC);
        assert_eq!(enc.ext, Some(0x4400));
    }

    #[test]
    fn byte_mode_immediate_goes_in_high_byte() {
        let op = Operand::Immediate(LabelRef::Literal(0x42));
        let enc = op.encode_src(0, &labels(), true).unwrap();
        assert_eq!(enc.ext, Some(0x4200));
    }

    #[test]
    fn symbolic_is_pc_relative() {
        let op = Operand::Symbolic(LabelRef::Label("LBL".to_string()));
        let enc = op.encode_src(0x10, &labels(), false).unwrap();
        assert_eq!(enc.as_bits, 0b01);
        assert_eq!(enc.reg, constants::PC);
        assert_eq!(enc.ext, Some((0x100i32 - 0x12) as u16));
    }

    #[test]
    fn indirect_destination_is_illegal() {
        let op = Operand::RegIndirect(5);
        assert_eq!(
            op.encode_dst(0, &labels()),
            Err(CompileError::IllegalDestination)
        );
    }

    #[test]
    fn missing_label_is_an_error() {
        let op = Operand::Symbolic(LabelRef::Label("NOPE".to_string()));
        assert_eq!(
            op.encode_src(0, &labels(), false),
            Err(CompileError::LabelNotFound("NOPE".to_string()))
        );
    }
}

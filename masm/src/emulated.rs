//! The emulated (pseudo) mnemonic table (§4.4, §6.2): mnemonics the
//! assembler rewrites into a real instruction rather than encoding directly.
//! The disassembler's reverse table (`mdis`) is generated from the same
//! rewrite rules, kept in sync by hand since the rewrite direction (forward)
//! and its reverse (regex substitution over rendered text) have genuinely
//! different shapes.

use msp430::encoding::{DoubleOp, JumpCond};
use msp430::operand::{LabelRef, Operand};

use crate::diagnostic::DiagnosticKind;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arity {
    Zero,
    One,
}

pub fn arity(mnemonic: &str) -> Option<Arity> {
    use Arity::*;
    Some(match mnemonic {
        "adc" | "br" | "clr" | "dadc" | "dec" | "decd" | "inc" | "incd" | "inv" | "pop"
        | "rla" | "rlc" | "sbc" | "tst" => One,
        "clrc" | "clrn" | "clrz" | "dint" | "eint" | "nop" | "ret" | "setc" | "setn" | "setz"
        | "hcf" => Zero,
        _ => return None,
    })
}

pub enum Rewrite {
    Double(DoubleOp, Operand, Operand),
    Jump(JumpCond, LabelRef),
}

fn sr() -> Operand {
    Operand::RegDirect(msp430::constants::SR)
}

fn pc() -> Operand {
    Operand::RegDirect(msp430::constants::PC)
}

fn imm(v: i32) -> Operand {
    Operand::Immediate(LabelRef::Literal(v))
}

/// Rewrites an emulated mnemonic into its real form. `dst` is the single
/// parsed operand for `Arity::One` mnemonics, `None` for `Arity::Zero` ones.
pub fn rewrite(mnemonic: &str, dst: Option<Operand>) -> Result<Rewrite, DiagnosticKind> {
    use Rewrite::*;

    Ok(match (mnemonic, dst) {
        ("adc", Some(dst)) => Double(DoubleOp::Addc, imm(0), dst),
        ("br", Some(dst)) => Double(DoubleOp::Mov, dst, pc()),
        ("clr", Some(dst)) => Double(DoubleOp::Mov, imm(0), dst),
        ("dadc", Some(dst)) => Double(DoubleOp::Dadd, imm(0), dst),
        ("dec", Some(dst)) => Double(DoubleOp::Sub, imm(1), dst),
        ("decd", Some(dst)) => Double(DoubleOp::Sub, imm(2), dst),
        ("inc", Some(dst)) => Double(DoubleOp::Add, imm(1), dst),
        ("incd", Some(dst)) => Double(DoubleOp::Add, imm(2), dst),
        ("inv", Some(dst)) => Double(DoubleOp::Xor, imm(-1), dst),
        ("pop", Some(dst)) => Double(DoubleOp::Mov, Operand::RegIndirectAuto(msp430::constants::SP), dst),
        ("rla", Some(dst)) => Double(DoubleOp::Add, dst.clone(), dst),
        ("rlc", Some(dst)) => Double(DoubleOp::Addc, dst.clone(), dst),
        ("sbc", Some(dst)) => Double(DoubleOp::Subc, imm(0), dst),
        ("tst", Some(dst)) => Double(DoubleOp::Cmp, imm(0), dst),

        ("clrc", None) => Double(DoubleOp::Bic, imm(1), sr()),
        ("clrz", None) => Double(DoubleOp::Bic, imm(2), sr()),
        ("clrn", None) => Double(DoubleOp::Bic, imm(4), sr()),
        ("dint", None) => Double(DoubleOp::Bic, imm(8), sr()),
        ("eint", None) => Double(DoubleOp::Bis, imm(8), sr()),
        ("setc", None) => Double(DoubleOp::Bis, imm(1), sr()),
        ("setz", None) => Double(DoubleOp::Bis, imm(2), sr()),
        ("setn", None) => Double(DoubleOp::Bis, imm(4), sr()),
        ("nop", None) => Double(DoubleOp::Mov, imm(0), Operand::RegDirect(msp430::constants::CG)),
        ("ret", None) => Double(DoubleOp::Mov, Operand::RegIndirectAuto(msp430::constants::SP), pc()),
        ("hcf", None) => Jump(JumpCond::Jmp, LabelRef::Literal(0)),

        (other, _) => return Err(DiagnosticKind::UnknownMnemonic(other.to_string())),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ret_rewrites_to_mov_sp_indirect_auto_to_pc() {
        match rewrite("ret", None).unwrap() {
            Rewrite::Double(DoubleOp::Mov, Operand::RegIndirectAuto(sp), Operand::RegDirect(pc_reg)) => {
                assert_eq!(sp, msp430::constants::SP);
                assert_eq!(pc_reg, msp430::constants::PC);
            }
            _ => panic!("unexpected rewrite"),
        }
    }

    #[test]
    fn nop_rewrites_to_mov_zero_r3() {
        match rewrite("nop", None).unwrap() {
            Rewrite::Double(DoubleOp::Mov, Operand::Immediate(LabelRef::Literal(0)), Operand::RegDirect(r)) => {
                assert_eq!(r, msp430::constants::CG);
            }
            _ => panic!("unexpected rewrite"),
        }
    }

    #[test]
    fn hcf_rewrites_to_jmp_zero() {
        match rewrite("hcf", None).unwrap() {
            Rewrite::Jump(JumpCond::Jmp, LabelRef::Literal(0)) => {}
            _ => panic!("unexpected rewrite"),
        }
    }
}

//! Renders compiled [`Instruction`]s back to assembly-like text for the
//! `|Code|` section of a listing (§6.3). This is a one-way, display-only
//! rendering; it never feeds back into parsing.

use msp430::constants;
use msp430::encoding::{DoubleOp, JumpCond, SingleOp};
use msp430::operand::{LabelRef, Operand};

use crate::instruction::Instruction;

fn register_name(reg: u8) -> String {
    match reg {
        constants::PC => "pc".to_string(),
        constants::SP => "sp".to_string(),
        constants::SR => "sr".to_string(),
        constants::CG => "cg".to_string(),
        n => format!("r{}", n),
    }
}

fn label_ref(r: &LabelRef) -> String {
    match r {
        LabelRef::Literal(v) => format!("0x{:x}", v),
        LabelRef::Label(name) => name.clone(),
    }
}

fn operand(op: &Operand) -> String {
    match op {
        Operand::RegDirect(reg) => register_name(*reg),
        Operand::Indexed(reg, off) => format!("{}({})", label_ref(off), register_name(*reg)),
        Operand::RegIndirect(reg) => format!("@{}", register_name(*reg)),
        Operand::RegIndirectAuto(reg) => format!("@{}+", register_name(*reg)),
        Operand::Symbolic(target) => label_ref(target),
        Operand::Absolute(target) => format!("&{}", label_ref(target)),
        Operand::Immediate(value) => format!("#{}", label_ref(value)),
    }
}

fn suffix(byte_mode: bool) -> &'static str {
    if byte_mode {
        ".b"
    } else {
        ""
    }
}

/// Renders a single instruction the way it would appear in source, minus any
/// comments or original formatting. Used only for the listing's source
/// column.
pub fn render(instr: &Instruction) -> String {
    match instr {
        Instruction::Jump { cond, target, .. } => {
            format!("{} {}", cond.canonical_mnemonic(), label_ref(target))
        }
        Instruction::SingleOperand { op, byte_mode, src, .. } => {
            format!("{}{} {}", op.mnemonic(), suffix(*byte_mode), operand(src))
        }
        Instruction::DoubleOperand { op, byte_mode, src, dst, .. } => {
            format!(
                "{}{} {} {}",
                op.mnemonic(),
                suffix(*byte_mode),
                operand(src),
                operand(dst)
            )
        }
        Instruction::Reti { .. } => "reti".to_string(),
        Instruction::Padding { .. } => ".dbgbrk".to_string(),
        Instruction::ListingComment { text, .. } => text.clone(),
        Instruction::CString8 { text, .. } => format!(".cstr8 {}", text),
        Instruction::Interrupt { vector, target, .. } => {
            format!(".interrupt 0x{:x} {}", vector, label_ref(target))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::line::Origin;

    #[test]
    fn renders_double_operand_with_byte_suffix() {
        let instr = Instruction::DoubleOperand {
            op: DoubleOp::Mov,
            byte_mode: true,
            src: Operand::Immediate(LabelRef::Literal(0x42)),
            dst: Operand::RegDirect(constants::SP),
            origin: Origin::root(1),
            labels: vec![],
        };
        assert_eq!(render(&instr), "mov.b #0x42 sp");
    }

    #[test]
    fn renders_register_indirect_autoincrement() {
        let instr = Instruction::SingleOperand {
            op: SingleOp::Push,
            byte_mode: false,
            src: Operand::RegIndirectAuto(constants::SP),
            origin: Origin::root(1),
            labels: vec![],
        };
        assert_eq!(render(&instr), "push @sp+");
    }

    #[test]
    fn renders_jump_with_label_target() {
        let instr = Instruction::Jump {
            cond: JumpCond::Jmp,
            target: LabelRef::Label("loop".to_string()),
            origin: Origin::root(1),
            labels: vec![],
        };
        assert_eq!(render(&instr), "jmp loop");
    }
}

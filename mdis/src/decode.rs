//! Word-stream decoding into rendered mnemonic text (§4.7). Unlike the
//! assembler's operand model, this module never needs to resolve a label
//! forward; it only ever turns bits into text, consuming extension words
//! from the stream as each addressing mode requires.

use msp430::constants;
use msp430::encoding::{self, DoubleOp, InstructionClass, JumpCond, SingleOp};

fn register_name(reg: u8) -> String {
    match reg {
        constants::PC => "PC".to_string(),
        constants::SP => "SP".to_string(),
        constants::SR => "SR".to_string(),
        constants::CG => "CG".to_string(),
        n => format!("R{}", n),
    }
}

fn hex_immediate(value: i32, byte_mode: bool) -> String {
    if byte_mode {
        format!("#0x{:02X}", value as u8)
    } else {
        format!("#0x{:04X}", mutil::wrap_u16(value))
    }
}

/// One decoded instruction: the number of 16-bit words (including the
/// opcode word) it consumed from the stream, and its rendered text before
/// any reverse-emulation collapsing.
pub struct Decoded {
    pub words_consumed: u16,
    pub text: String,
    /// Set for jumps: the absolute target address, so the caller can emit a
    /// label reference instead of a raw offset when one is known.
    pub jump_target: Option<u16>,
}

/// Looks up `(as_bits, reg)` in the constant-generator table, returning the
/// literal value it stands for with no extension word consumed.
fn cg_literal(as_bits: u8, reg: u8) -> Option<i32> {
    constants::CG_VALUES
        .iter()
        .find(|(_, a, r)| *a == as_bits && *r == reg)
        .map(|(v, _, _)| *v)
}

/// Decodes one operand in source position, returning its rendered text and
/// how many extension words (0 or 1) it consumed.
fn decode_src(as_bits: u8, reg: u8, byte_mode: bool, words: &[u16], idx: usize, instr_addr: u16) -> (String, u16) {
    if reg == constants::PC {
        match as_bits {
            0b01 => {
                let ext = words.get(idx).copied().unwrap_or(0);
                let target = instr_addr.wrapping_add(2).wrapping_add(ext);
                (format!("0x{:04X}", target), 1)
            }
            0b11 => {
                let ext = words.get(idx).copied().unwrap_or(0);
                let value = if byte_mode { (ext >> 8) as i32 } else { ext as i32 };
                (hex_immediate(value, byte_mode), 1)
            }
            0b00 => ("PC".to_string(), 0),
            _ => ("@PC".to_string(), 0),
        }
    } else if reg == constants::SR && as_bits == 0b01 {
        let ext = words.get(idx).copied().unwrap_or(0);
        (format!("&0x{:04X}", ext), 1)
    } else if let Some(value) = cg_literal(as_bits, reg) {
        (hex_immediate(value, byte_mode), 0)
    } else {
        match as_bits {
            0b00 => (register_name(reg), 0),
            0b01 => {
                let ext = words.get(idx).copied().unwrap_or(0);
                (format!("0x{:04X}({})", ext, register_name(reg)), 1)
            }
            0b10 => (format!("@{}", register_name(reg)), 0),
            _ => (format!("@{}+", register_name(reg)), 0),
        }
    }
}

/// Decodes one operand in destination position: only `Ad=0` (direct) and
/// `Ad=1` (indexed/symbolic/absolute) exist, matching the assembler's
/// encoder (§4.5.1).
fn decode_dst(ad_bit: u8, reg: u8, words: &[u16], idx: usize, instr_addr: u16) -> (String, u16) {
    if ad_bit == 0 {
        return (register_name(reg), 0);
    }
    if reg == constants::PC {
        let ext = words.get(idx).copied().unwrap_or(0);
        let target = instr_addr.wrapping_add(2).wrapping_add(ext);
        (format!("0x{:04X}", target), 1)
    } else if reg == constants::SR {
        let ext = words.get(idx).copied().unwrap_or(0);
        (format!("&0x{:04X}", ext), 1)
    } else {
        let ext = words.get(idx).copied().unwrap_or(0);
        (format!("0x{:04X}({})", ext, register_name(reg)), 1)
    }
}

/// Decodes the single instruction beginning at `words[0]`, `addr` being that
/// word's own address.
pub fn decode_one(words: &[u16], addr: u16) -> Decoded {
    let opcode = words[0];

    match encoding::classify(opcode) {
        InstructionClass::Jump => {
            let cond_bits = (opcode >> 10) & 0b111;
            let cond = JumpCond::from_opcode_bits(cond_bits).expect("classify guarantees a jump cond");
            let offset = mutil::sign_extend((opcode & 0x3FF) as u32, 10);
            let target = addr.wrapping_add(2).wrapping_add(mutil::wrap_u16(offset * 2));
            Decoded {
                words_consumed: 1,
                text: format!("{} 0x{:04X}", cond.canonical_mnemonic().to_uppercase(), target),
                jump_target: Some(target),
            }
        }
        InstructionClass::SingleOperand => {
            let op_bits = (opcode >> 7) & 0b111;
            let op = SingleOp::from_opcode_bits(op_bits).expect("classify guarantees a single-operand op");
            if op == SingleOp::Reti {
                return Decoded {
                    words_consumed: 1,
                    text: "RETI".to_string(),
                    jump_target: None,
                };
            }
            let byte_mode = (opcode >> 6) & 1 != 0;
            let as_bits = ((opcode >> 4) & 0b11) as u8;
            let reg = (opcode & 0xF) as u8;
            let (src_text, src_words) = decode_src(as_bits, reg, byte_mode, words, 1, addr);
            let suffix = if byte_mode { ".B" } else { "" };
            Decoded {
                words_consumed: 1 + src_words,
                text: format!("{}{} {}", op.mnemonic().to_uppercase(), suffix, src_text),
                jump_target: None,
            }
        }
        InstructionClass::DoubleOperand => {
            let op_bits = (opcode >> 12) & 0xF;
            let op = DoubleOp::from_opcode_bits(op_bits).expect("classify guarantees a double-operand op");
            let src_reg = ((opcode >> 8) & 0xF) as u8;
            let ad_bit = ((opcode >> 7) & 1) as u8;
            let byte_mode = (opcode >> 6) & 1 != 0;
            let as_bits = ((opcode >> 4) & 0b11) as u8;
            let dst_reg = (opcode & 0xF) as u8;

            let (src_text, src_words) = decode_src(as_bits, src_reg, byte_mode, words, 1, addr);
            let (dst_text, dst_words) = decode_dst(ad_bit, dst_reg, words, (1 + src_words) as usize, addr);
            let suffix = if byte_mode { ".B" } else { "" };
            Decoded {
                words_consumed: 1 + src_words + dst_words,
                text: format!("{}{} {},{}", op.mnemonic().to_uppercase(), suffix, src_text, dst_text),
                jump_target: None,
            }
        }
    }
}

/// `RETI`'s word has no source operand, unlike every other single-operand
/// opcode; [`decode_one`] special-cases it, but callers that want to
/// recognize it without a full decode can use this instead.
pub fn is_reti(word: u16) -> bool {
    word == encoding::encode_reti()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_scenario_mov_immediate() {
        let words = [0x4031, 0x4400];
        let decoded = decode_one(&words, 0);
        assert_eq!(decoded.words_consumed, 2);
        assert_eq!(decoded.text, "MOV #0x4400,SP");
    }

    #[test]
    fn decodes_swpb_single_operand() {
        let words = [0x1085];
        let decoded = decode_one(&words, 0);
        assert_eq!(decoded.words_consumed, 1);
        assert_eq!(decoded.text, "SWPB R5");
    }

    #[test]
    fn decodes_jump_to_absolute_target() {
        let words = [0x3C07];
        let decoded = decode_one(&words, 0);
        assert_eq!(decoded.jump_target, Some(0x10));
    }

    #[test]
    fn reti_word_is_recognized() {
        assert!(is_reti(0x1300));
    }

    #[test]
    fn reti_decodes_with_no_operand() {
        let decoded = decode_one(&[0x1300], 0);
        assert_eq!(decoded.words_consumed, 1);
        assert_eq!(decoded.text, "RETI");
    }
}

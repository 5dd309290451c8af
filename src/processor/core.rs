use log::trace;

use crate::constants;
use crate::encoding::{classify, DoubleOp, InstructionClass, JumpCond, SingleOp};
use crate::error::ExecutionError;
use crate::memory::Memory;
use crate::register::{sr_bit, RegisterFile};

/// Where an operand's computed value would be written back, abstracted over
/// the difference between operands that can be written and those that
/// can't (§4.6, "Write targets").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteTarget {
    Register(u8),
    Memory(u16),
    Void,
}

struct Decoded {
    value: u16,
    target: WriteTarget,
}

/// Fetches and decodes one source or destination operand, advancing `regs`'
/// PC past any extension word it consumes.
///
/// `base_pc` is the address immediately after the instruction's opcode word,
/// fixed for the whole instruction regardless of how many extension words
/// precede this one. Stands in for "PC" in the symbolic addressing mode,
/// mirroring the assembler's `target - (pc + 2)` encoding (§4.5.1).
fn decode_operand(
    as_bits: u8,
    reg: u8,
    byte_mode: bool,
    base_pc: u16,
    regs: &mut RegisterFile,
    mem: &Memory,
) -> Result<Decoded, ExecutionError> {
    let (addr, target) = match as_bits {
        0b00 => {
            let value = if reg == constants::CG {
                0
            } else {
                let raw = regs.get(reg);
                if byte_mode {
                    raw & 0xFF
                } else {
                    raw
                }
            };
            let target = if reg == constants::CG {
                WriteTarget::Void
            } else {
                WriteTarget::Register(reg)
            };
            return Ok(Decoded {
                value,
                target,
            });
        }
        0b01 => {
            let ext = fetch_extension(regs, mem)?;
            let addr = if reg == constants::PC {
                base_pc.wrapping_add(ext)
            } else if reg == constants::SR {
                ext
            } else {
                regs.get(reg).wrapping_add(ext)
            };
            (addr, WriteTarget::Memory(addr))
        }
        0b10 => {
            let addr = regs.get(reg);
            (addr, WriteTarget::Memory(addr))
        }
        0b11 => {
            if reg == constants::PC {
                let ext = fetch_extension(regs, mem)?;
                let value = if byte_mode { (ext >> 8) & 0xFF } else { ext };
                return Ok(Decoded {
                    value,
                    target: WriteTarget::Void,
                });
            }
            if reg == constants::CG {
                return Ok(Decoded {
                    value: 0xFFFF,
                    target: WriteTarget::Void,
                });
            }
            let addr = regs.get(reg);
            let inc = if byte_mode && reg != constants::SP { 1 } else { 2 };
            regs.set(reg, addr.wrapping_add(inc))?;
            (addr, WriteTarget::Memory(addr))
        }
        _ => unreachable!("As is a 2-bit field"),
    };

    let value = if byte_mode {
        mem.read_byte(addr)? as u16
    } else {
        mem.read_word(addr)?
    };

    Ok(Decoded { value, target })
}

fn fetch_extension(regs: &mut RegisterFile, mem: &Memory) -> Result<u16, ExecutionError> {
    let pc = regs.pc();
    let ext = mem.read_word(pc)?;
    regs.set_pc(pc.wrapping_add(2))?;
    Ok(ext)
}

fn write_back(
    target: WriteTarget,
    value: u16,
    byte_mode: bool,
    regs: &mut RegisterFile,
    mem: &mut Memory,
) -> Result<(), ExecutionError> {
    match target {
        WriteTarget::Void => Ok(()),
        WriteTarget::Register(reg) => {
            let new_value = if byte_mode { value & 0xFF } else { value };
            regs.set(reg, new_value)
        }
        WriteTarget::Memory(addr) => {
            if byte_mode {
                mem.write_byte(addr, (value & 0xFF) as u8)
            } else {
                mem.write_word(addr, value)
            }
        }
    }
}

fn width_bits(byte_mode: bool) -> u32 {
    if byte_mode {
        8
    } else {
        16
    }
}

fn msb(value: u16, width: u32) -> bool {
    (value >> (width - 1)) & 1 != 0
}

fn modulus(width: u32) -> u32 {
    1u32 << width
}

struct ArithResult {
    value: u16,
    carry: bool,
    overflow: bool,
}

fn add_with_carry(a: u16, b: u16, carry_in: bool, width: u32) -> ArithResult {
    let m = modulus(width);
    let full = a as u32 + b as u32 + carry_in as u32;
    let result = (full % m) as u16;
    let carry = full >= m;
    let overflow = msb(a, width) == msb(b, width) && msb(result, width) != msb(a, width);
    ArithResult {
        value: result,
        carry,
        overflow,
    }
}

fn sub_with_borrow(a: u16, b: u16, borrow_in: bool, width: u32) -> ArithResult {
    // MSP430 computes a - b as a + !b + 1 (optionally folding in a borrow),
    // so the carry flag reads as "no borrow occurred" rather than as a
    // conventional subtraction borrow-out.
    let not_b = (!b) & mask(width);
    add_with_carry(a, not_b, borrow_in, width)
}

fn mask(width: u32) -> u16 {
    (modulus(width) - 1) as u16
}

/// The 16-register, 64 KiB-memory MSP430 emulator core: fetch, decode,
/// execute, one instruction per [`step`](Cpu::step).
pub struct Cpu {
    pub regs: RegisterFile,
    pub mem: Memory,
    pub silent: bool,
    pub special_interrupts: bool,
    /// Injected console-input hook (§6.4). No opcode in this core calls it
    /// directly — peripherals are out of scope — but it's exposed so an
    /// embedder can wire it to a memory-mapped address of its own choosing.
    pub input_function: Option<Box<dyn FnMut() -> u16>>,
    /// Injected console-output hook (§6.4); see [`input_function`](Cpu::input_function).
    pub output_function: Option<Box<dyn FnMut(u16)>>,
}

impl Cpu {
    pub fn new() -> Cpu {
        Cpu {
            regs: RegisterFile::new(),
            mem: Memory::new(),
            silent: true,
            special_interrupts: false,
            input_function: None,
            output_function: None,
        }
    }

    /// Calls the injected input hook, or fails with the default §6.4 error
    /// if none was configured.
    pub fn read_input(&mut self) -> Result<u16, ExecutionError> {
        match &mut self.input_function {
            Some(f) => Ok(f()),
            None => Err(ExecutionError::Unimplemented("no input function defined")),
        }
    }

    /// Calls the injected output hook, or fails with the default §6.4 error
    /// if none was configured.
    pub fn write_output(&mut self, value: u16) -> Result<(), ExecutionError> {
        match &mut self.output_function {
            Some(f) => {
                f(value);
                Ok(())
            }
            None => Err(ExecutionError::Unimplemented("no output function defined")),
        }
    }

    /// Executes exactly one instruction, per the fetch/decode/execute
    /// sequence of §4.6.
    pub fn step(&mut self) -> Result<(), ExecutionError> {
        if self.special_interrupts && self.regs.pc() == 0x0010 {
            return Err(ExecutionError::Unimplemented("special interrupt trap"));
        }

        let opcode_addr = self.regs.pc();
        let base_pc = opcode_addr.wrapping_add(2);
        let word = self.mem.read_word(opcode_addr)?;
        self.regs.set_pc(base_pc)?;
        if !self.silent {
            trace!("step: pc=0x{:04X} word=0x{:04X}", opcode_addr, word);
        }

        match classify(word) {
            InstructionClass::Jump => self.execute_jump(word),
            InstructionClass::SingleOperand => self.execute_single(word, base_pc),
            InstructionClass::DoubleOperand => self.execute_double(word, base_pc),
        }
    }

    fn execute_jump(&mut self, word: u16) -> Result<(), ExecutionError> {
        let cond_bits = (word >> 10) & 0b111;
        let cond = JumpCond::from_opcode_bits(cond_bits)
            .expect("classify() guarantees a valid jump word");
        let offset_field = word & 0x3FF;
        let offset_words = mutil::sign_extend(offset_field as u32, 10);

        let taken = match cond {
            JumpCond::Jne => !self.regs.flag(sr_bit::Z),
            JumpCond::Jeq => self.regs.flag(sr_bit::Z),
            JumpCond::Jnc => !self.regs.flag(sr_bit::C),
            JumpCond::Jc => self.regs.flag(sr_bit::C),
            JumpCond::Jn => self.regs.flag(sr_bit::N),
            JumpCond::Jge => self.regs.flag(sr_bit::N) == self.regs.flag(sr_bit::V),
            JumpCond::Jl => self.regs.flag(sr_bit::N) != self.regs.flag(sr_bit::V),
            JumpCond::Jmp => true,
        };

        if taken {
            let pc_after_fetch = self.regs.pc();
            let target = (pc_after_fetch as i32 + offset_words * 2) as u16;
            self.regs.set_pc(target)?;
        }
        Ok(())
    }

    fn execute_single(&mut self, word: u16, base_pc: u16) -> Result<(), ExecutionError> {
        let op_bits = (word >> 7) & 0b111;
        let op = SingleOp::from_opcode_bits(op_bits).expect("classify() validated the prefix");
        let byte_mode = (word >> 6) & 1 != 0;
        let as_bits = ((word >> 4) & 0b11) as u8;
        let src_reg = (word & 0xF) as u8;

        if op == SingleOp::Reti {
            return Err(ExecutionError::Unimplemented("reti"));
        }
        if byte_mode && op.forbids_byte_mode() {
            return Err(ExecutionError::Unimplemented("byte mode on this opcode"));
        }
        if byte_mode && src_reg == constants::SR {
            return Err(ExecutionError::ByteAccessOnSr);
        }

        let decoded = decode_operand(as_bits, src_reg, byte_mode, base_pc, &mut self.regs, &self.mem)?;
        let width = width_bits(byte_mode);

        match op {
            SingleOp::Rrc => {
                let old_lsb = decoded.value & 1 != 0;
                let carry_in = self.regs.flag(sr_bit::C);
                let result = (decoded.value >> 1) | if carry_in { 1 << (width - 1) } else { 0 };
                self.regs.set_flag(sr_bit::C, old_lsb);
                self.regs.set_flag(sr_bit::N, msb(result, width));
                self.regs.set_flag(sr_bit::Z, result == 0);
                self.regs.set_flag(sr_bit::V, false);
                write_back(decoded.target, result, byte_mode, &mut self.regs, &mut self.mem)?;
            }
            SingleOp::Swpb => {
                let result = (decoded.value >> 8) | (decoded.value << 8);
                write_back(decoded.target, result, false, &mut self.regs, &mut self.mem)?;
            }
            SingleOp::Rra => {
                let sign = msb(decoded.value, width);
                let old_lsb = decoded.value & 1 != 0;
                let result = (decoded.value >> 1) | if sign { 1 << (width - 1) } else { 0 };
                self.regs.set_flag(sr_bit::C, old_lsb);
                self.regs.set_flag(sr_bit::N, msb(result, width));
                self.regs.set_flag(sr_bit::Z, result == 0);
                self.regs.set_flag(sr_bit::V, false);
                write_back(decoded.target, result, byte_mode, &mut self.regs, &mut self.mem)?;
            }
            SingleOp::Sxt => {
                let low = decoded.value & 0xFF;
                let result = if low & 0x80 != 0 { low | 0xFF00 } else { low };
                self.regs.set_flag(sr_bit::N, msb(result, 16));
                self.regs.set_flag(sr_bit::Z, result == 0);
                self.regs.set_flag(sr_bit::V, false);
                self.regs.set_flag(sr_bit::C, result != 0);
                write_back(decoded.target, result, false, &mut self.regs, &mut self.mem)?;
            }
            SingleOp::Push => {
                let sp = self.regs.push_sp(2)?;
                self.mem.write_word(sp, decoded.value)?;
            }
            SingleOp::Call => {
                let return_addr = self.regs.pc();
                let sp = self.regs.push_sp(2)?;
                self.mem.write_word(sp, return_addr)?;
                self.regs.set_pc(decoded.value)?;
            }
            SingleOp::Reti => unreachable!("handled above"),
        }

        Ok(())
    }

    fn execute_double(&mut self, word: u16, base_pc: u16) -> Result<(), ExecutionError> {
        let op_bits = (word >> 12) & 0xF;
        let op = DoubleOp::from_opcode_bits(op_bits).ok_or(ExecutionError::Unimplemented("opcode"))?;
        let src_reg = ((word >> 8) & 0xF) as u8;
        let ad_bit = ((word >> 7) & 1) as u8;
        let byte_mode = (word >> 6) & 1 != 0;
        let as_bits = ((word >> 4) & 0b11) as u8;
        let dst_reg = (word & 0xF) as u8;

        if byte_mode && (src_reg == constants::SR || (dst_reg == constants::SR && ad_bit == 0)) {
            return Err(ExecutionError::ByteAccessOnSr);
        }

        let src = decode_operand(as_bits, src_reg, byte_mode, base_pc, &mut self.regs, &self.mem)?;
        let dst_as = if ad_bit == 0 { 0b00 } else { 0b01 };
        let dst = decode_operand(dst_as, dst_reg, byte_mode, base_pc, &mut self.regs, &self.mem)?;

        let width = width_bits(byte_mode);

        if op == DoubleOp::Dadd {
            return Err(ExecutionError::Unimplemented("dadd"));
        }

        match op {
            DoubleOp::Mov => {
                write_back(dst.target, src.value, byte_mode, &mut self.regs, &mut self.mem)?;
            }
            DoubleOp::Add => {
                let r = add_with_carry(dst.value, src.value, false, width);
                self.set_arith_flags(&r, width);
                write_back(dst.target, r.value, byte_mode, &mut self.regs, &mut self.mem)?;
            }
            DoubleOp::Addc => {
                let carry_in = self.regs.flag(sr_bit::C);
                let r = add_with_carry(dst.value, src.value, carry_in, width);
                self.set_arith_flags(&r, width);
                write_back(dst.target, r.value, byte_mode, &mut self.regs, &mut self.mem)?;
            }
            DoubleOp::Sub => {
                let r = sub_with_borrow(dst.value, src.value, true, width);
                self.set_arith_flags(&r, width);
                write_back(dst.target, r.value, byte_mode, &mut self.regs, &mut self.mem)?;
            }
            DoubleOp::Subc => {
                let carry_in = self.regs.flag(sr_bit::C);
                let r = sub_with_borrow(dst.value, src.value, carry_in, width);
                self.set_arith_flags(&r, width);
                write_back(dst.target, r.value, byte_mode, &mut self.regs, &mut self.mem)?;
            }
            DoubleOp::Cmp => {
                let r = sub_with_borrow(dst.value, src.value, true, width);
                self.set_arith_flags(&r, width);
            }
            DoubleOp::Dadd => unreachable!("handled above"),
            DoubleOp::Bit => {
                let result = dst.value & src.value & mask(width);
                self.set_logic_flags(result, width);
            }
            DoubleOp::And => {
                let result = dst.value & src.value & mask(width);
                self.set_logic_flags(result, width);
                write_back(dst.target, result, byte_mode, &mut self.regs, &mut self.mem)?;
            }
            DoubleOp::Xor => {
                let result = (dst.value ^ src.value) & mask(width);
                self.regs.set_flag(sr_bit::N, msb(result, width));
                self.regs.set_flag(sr_bit::Z, result == 0);
                self.regs.set_flag(sr_bit::C, result != 0);
                self.regs
                    .set_flag(sr_bit::V, msb(src.value, width) && msb(dst.value, width));
                write_back(dst.target, result, byte_mode, &mut self.regs, &mut self.mem)?;
            }
            DoubleOp::Bic => {
                let result = dst.value & !src.value & mask(width);
                write_back(dst.target, result, byte_mode, &mut self.regs, &mut self.mem)?;
            }
            DoubleOp::Bis => {
                let result = (dst.value | src.value) & mask(width);
                write_back(dst.target, result, byte_mode, &mut self.regs, &mut self.mem)?;
            }
        }

        Ok(())
    }

    fn set_arith_flags(&mut self, r: &ArithResult, width: u32) {
        self.regs.set_flag(sr_bit::Z, r.value == 0);
        self.regs.set_flag(sr_bit::N, msb(r.value, width));
        self.regs.set_flag(sr_bit::C, r.carry);
        self.regs.set_flag(sr_bit::V, r.overflow);
    }

    fn set_logic_flags(&mut self, result: u16, width: u32) {
        self.regs.set_flag(sr_bit::N, msb(result, width));
        self.regs.set_flag(sr_bit::Z, result == 0);
        self.regs.set_flag(sr_bit::C, result != 0);
        self.regs.set_flag(sr_bit::V, false);
    }
}

impl Default for Cpu {
    fn default() -> Cpu {
        Cpu::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoding::{encode_double_operand, encode_jump, encode_single_operand};
    use crate::operand::{DstEncoding, SrcEncoding};

    fn src_reg(n: u8) -> SrcEncoding {
        SrcEncoding {
            as_bits: 0b00,
            reg: n,
            ext: None,
        }
    }

    fn dst_reg(n: u8) -> DstEncoding {
        DstEncoding {
            ad_bit: 0,
            reg: n,
            ext: None,
        }
    }

    fn cpu_with(words: &[u16]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.mem.load_words(0, words).unwrap();
        cpu
    }

    #[test]
    fn add_sets_carry_and_zero_flags() {
        // mov #0xFFFF, r5 ; add #1, r5 -> r5 = 0, carry set, zero set
        let mov = encode_double_operand(DoubleOp::Mov, false, &SrcEncoding {
            as_bits: 0b11,
            reg: constants::PC,
            ext: Some(0xFFFF),
        }, &dst_reg(5));
        let add = encode_double_operand(DoubleOp::Add, false, &SrcEncoding {
            as_bits: 0b01,
            reg: constants::CG,
            ext: None,
        }, &dst_reg(5));

        let mut words = mov;
        words.extend(add);
        let mut cpu = cpu_with(&words);

        cpu.step().unwrap();
        assert_eq!(cpu.regs.get(5), 0xFFFF);

        cpu.step().unwrap();
        assert_eq!(cpu.regs.get(5), 0);
        assert!(cpu.regs.flag(sr_bit::Z));
        assert!(cpu.regs.flag(sr_bit::C));
    }

    #[test]
    fn swpb_r5_word_matches_spec_scenario() {
        let mut cpu = cpu_with(&[0x1085]);
        cpu.regs.set(5, 0x1234).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs.get(5), 0x3412);
    }

    #[test]
    fn jmp_advances_pc_by_scenario_offset() {
        let word = encode_jump(JumpCond::Jmp, 7);
        let mut cpu = cpu_with(&[word]);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc(), 0x10);
    }

    #[test]
    fn reti_is_unimplemented() {
        let word = crate::encoding::encode_reti();
        let mut cpu = cpu_with(&[word]);
        assert_eq!(
            cpu.step(),
            Err(ExecutionError::Unimplemented("reti"))
        );
    }

    #[test]
    fn push_then_pop_style_autoincrement_restores_value() {
        let push = encode_single_operand(crate::encoding::SingleOp::Push, false, &src_reg(5));
        let mut cpu = cpu_with(&push);
        cpu.regs.set(constants::SP, 0x1000).unwrap();
        cpu.regs.set(5, 0xBEEF).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs.sp(), 0x0FFE);
        assert_eq!(cpu.mem.read_word(0x0FFE).unwrap(), 0xBEEF);
    }

    #[test]
    fn byte_access_on_sr_is_an_error() {
        let word = encode_single_operand(crate::encoding::SingleOp::Rrc, true, &SrcEncoding {
            as_bits: 0b00,
            reg: constants::SR,
            ext: None,
        });
        let mut cpu = cpu_with(&word);
        assert_eq!(cpu.step(), Err(ExecutionError::ByteAccessOnSr));
    }

    #[test]
    fn mov_immediate_writes_destination_register() {
        let mov = encode_double_operand(
            DoubleOp::Mov,
            false,
            &SrcEncoding { as_bits: 0b11, reg: constants::PC, ext: Some(5) },
            &DstEncoding { ad_bit: 0, reg: 6, ext: None },
        );
        let mut cpu = cpu_with(&mov);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.get(6), 5);
    }

    #[test]
    fn unconfigured_io_hooks_return_the_default_error() {
        let mut cpu = Cpu::new();
        assert_eq!(
            cpu.read_input(),
            Err(ExecutionError::Unimplemented("no input function defined"))
        );
        assert_eq!(
            cpu.write_output(42),
            Err(ExecutionError::Unimplemented("no output function defined"))
        );
    }

    #[test]
    fn configured_io_hooks_are_invoked() {
        let mut cpu = Cpu::new();
        cpu.input_function = Some(Box::new(|| 0xBEEF));
        let seen = std::rc::Rc::new(std::cell::RefCell::new(None));
        let seen_clone = seen.clone();
        cpu.output_function = Some(Box::new(move |v| *seen_clone.borrow_mut() = Some(v)));

        assert_eq!(cpu.read_input(), Ok(0xBEEF));
        cpu.write_output(7).unwrap();
        assert_eq!(*seen.borrow(), Some(7));
    }
}

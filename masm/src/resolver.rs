//! Two-pass address resolution and binary emission (§4.5).

use msp430::error::CompileError;
use msp430::operand::LabelMap;
use mimage::{Image, Segment};

use crate::instruction::Instruction;

/// Pass 1: walks the instruction list once, assigning every attached label
/// the PC it was seen at and advancing PC by each instruction's `numWords`.
pub fn resolve_labels(instructions: &[Instruction], base_pc: u16) -> LabelMap {
    let mut labels = LabelMap::new();
    let mut pc = base_pc;
    for instr in instructions {
        for label in instr.labels() {
            labels.insert(label.clone(), pc);
        }
        pc = pc.wrapping_add(2 * instr.num_words());
    }
    labels
}

/// One instruction as it actually landed in the image: the address its
/// opcode word was assigned and the words its own `compile` produced.
/// Padding, listing-comment, and interrupt instructions contribute no words
/// but still appear here, carrying the PC they were seen at. The listing
/// generator (§6.3) needs them to place blank lines and the line map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub pc: u16,
    pub words: Vec<u16>,
    pub instruction: Instruction,
}

/// Pass 2: compiles every instruction against the label map built by
/// [`resolve_labels`], emitting code segments plus the mandatory startup
/// vector and any interrupt-vector fixups. Errors are collected across the
/// whole pass; compilation only aborts (returning the accumulated set) once
/// the pass completes. Also returns the per-instruction trace the listing
/// generator needs and the label map itself.
pub fn compile_with_trace(
    instructions: &[Instruction],
    base_pc: u16,
) -> Result<(Image, Vec<CompiledInstruction>, LabelMap), Vec<CompileError>> {
    let labels = resolve_labels(instructions, base_pc);
    let mut errors = Vec::new();

    let mut segments = Vec::new();
    let mut current_start = base_pc;
    let mut current_words: Vec<u16> = Vec::new();
    let mut pc = base_pc;
    let mut postfix = Vec::new();
    let mut trace = Vec::with_capacity(instructions.len());

    macro_rules! close_segment {
        () => {
            if !current_words.is_empty() {
                segments.push(Segment::new(current_start, std::mem::take(&mut current_words)));
            }
        };
    }

    for instr in instructions {
        let instr_pc = pc;
        let words = match instr {
            Instruction::Padding { .. } => {
                close_segment!();
                current_start = pc;
                Vec::new()
            }
            Instruction::Interrupt { vector, target, .. } => {
                match target.resolve(&labels) {
                    Ok(addr) => postfix.push(Segment::new(*vector as u16, vec![addr as u16])),
                    Err(err) => errors.push(err),
                }
                Vec::new()
            }
            other => match other.compile(pc, &labels) {
                Ok(words) => {
                    if current_words.is_empty() {
                        current_start = pc;
                    }
                    current_words.extend(words.iter().copied());
                    words
                }
                Err(err) => {
                    errors.push(err);
                    Vec::new()
                }
            },
        };
        trace.push(CompiledInstruction {
            pc: instr_pc,
            words,
            instruction: instr.clone(),
        });
        pc = pc.wrapping_add(2 * instr.num_words());
    }
    close_segment!();

    if !errors.is_empty() {
        return Err(errors);
    }

    segments.push(Segment::new(0xFFFE, vec![base_pc]));
    segments.extend(postfix);

    Ok((Image::new(segments).merge_adjacent(), trace, labels))
}

/// Compiles to the final image only, discarding the listing trace.
/// Convenient for callers that don't need a listing.
pub fn compile(
    instructions: &[Instruction],
    base_pc: u16,
) -> Result<Image, Vec<CompileError>> {
    compile_with_trace(instructions, base_pc).map(|(image, _, _)| image)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::line::Origin;
    use msp430::encoding::DoubleOp;
    use msp430::operand::{LabelRef, Operand};

    fn mov_immediate_to_sp() -> Instruction {
        Instruction::DoubleOperand {
            op: DoubleOp::Mov,
            byte_mode: false,
            src: Operand::Immediate(LabelRef::Literal(0x4400)),
            dst: Operand::RegDirect(msp430::constants::SP),
            origin: Origin::root(1),
            labels: vec![],
        }
    }

    fn reti() -> Instruction {
        Instruction::Reti {
            origin: Origin::root(2),
            labels: vec![],
        }
    }

    #[test]
    fn compiles_scenario_program_and_appends_startup_vector() {
        let instrs = vec![mov_immediate_to_sp(), reti()];
        let image = compile(&instrs, 0x0000).unwrap();
        let code = &image.segments[0];
        assert_eq!(code.start_address, 0x0000);
        assert_eq!(code.words, vec![0x4031, 0x4400, 0x1300]);

        let startup = image
            .segments
            .iter()
            .find(|s| s.start_address == 0xFFFE)
            .unwrap();
        assert_eq!(startup.words, vec![0x0000]);
    }

    #[test]
    fn padding_forces_a_segment_boundary() {
        let instrs = vec![
            mov_immediate_to_sp(),
            Instruction::Padding { origin: Origin::root(2) },
            reti(),
        ];
        let image = compile(&instrs, 0x0000).unwrap();
        assert_eq!(image.segments[0].start_address, 0x0000);
        assert_eq!(image.segments[1].start_address, 0x04);
    }

    #[test]
    fn label_not_found_is_reported_without_aborting_other_errors() {
        let instrs = vec![Instruction::Jump {
            cond: msp430::encoding::JumpCond::Jmp,
            target: LabelRef::Label("missing".to_string()),
            origin: Origin::root(1),
            labels: vec![],
        }];
        let err = compile(&instrs, 0x0000).unwrap_err();
        assert_eq!(err.len(), 1);
    }
}

//! Instruction variants and the stream-automaton parser that builds them
//! from the tokenizer's output (§3 "Instruction", §4.4).

use msp430::encoding::{
    encode_double_operand, encode_jump, encode_reti, encode_single_operand, jump_offset_words,
    DoubleOp, JumpCond, SingleOp,
};
use msp430::error::CompileError;
use msp430::operand::{LabelMap, LabelRef, Operand};

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::emulated;
use crate::line::Origin;
use crate::token::Token;

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Jump {
        cond: JumpCond,
        target: LabelRef,
        origin: Origin,
        labels: Vec<String>,
    },
    SingleOperand {
        op: SingleOp,
        byte_mode: bool,
        src: Operand,
        origin: Origin,
        labels: Vec<String>,
    },
    DoubleOperand {
        op: DoubleOp,
        byte_mode: bool,
        src: Operand,
        dst: Operand,
        origin: Origin,
        labels: Vec<String>,
    },
    Reti {
        origin: Origin,
        labels: Vec<String>,
    },
    Padding {
        origin: Origin,
    },
    ListingComment {
        text: String,
        origin: Origin,
    },
    CString8 {
        text: String,
        origin: Origin,
        labels: Vec<String>,
    },
    Interrupt {
        vector: i32,
        target: LabelRef,
        origin: Origin,
    },
}

impl Instruction {
    pub fn origin(&self) -> &Origin {
        match self {
            Instruction::Jump { origin, .. }
            | Instruction::SingleOperand { origin, .. }
            | Instruction::DoubleOperand { origin, .. }
            | Instruction::Reti { origin, .. }
            | Instruction::Padding { origin }
            | Instruction::ListingComment { origin, .. }
            | Instruction::CString8 { origin, .. }
            | Instruction::Interrupt { origin, .. } => origin,
        }
    }

    pub fn labels(&self) -> &[String] {
        match self {
            Instruction::Jump { labels, .. }
            | Instruction::SingleOperand { labels, .. }
            | Instruction::DoubleOperand { labels, .. }
            | Instruction::Reti { labels, .. }
            | Instruction::CString8 { labels, .. } => labels,
            Instruction::Padding { .. }
            | Instruction::ListingComment { .. }
            | Instruction::Interrupt { .. } => &[],
        }
    }

    /// Words this instruction contributes to the main code stream. Interrupt
    /// fixups are buffered into a postfix segment instead (§4.5), so they
    /// contribute zero here.
    pub fn num_words(&self) -> u16 {
        match self {
            Instruction::Jump { .. } | Instruction::Reti { .. } => 1,
            Instruction::SingleOperand { src, .. } => 1 + src.extra_words(),
            Instruction::DoubleOperand { src, dst, .. } => 1 + src.extra_words() + dst.extra_words(),
            Instruction::Padding { .. } | Instruction::ListingComment { .. } | Instruction::Interrupt { .. } => 0,
            Instruction::CString8 { text, .. } => ((text.len() + 1 + 1) / 2) as u16,
        }
    }

    pub fn compile(&self, pc: u16, labels: &LabelMap) -> Result<Vec<u16>, CompileError> {
        match self {
            Instruction::Jump { cond, target, .. } => {
                let target_addr = target.resolve(labels)?;
                let offset = jump_offset_words(pc, target_addr)?;
                Ok(vec![encode_jump(*cond, offset)])
            }
            Instruction::SingleOperand { op, byte_mode, src, .. } => {
                let src_enc = src.encode_src(pc, labels, *byte_mode)?;
                Ok(encode_single_operand(*op, *byte_mode, &src_enc))
            }
            Instruction::DoubleOperand { op, byte_mode, src, dst, .. } => {
                let src_enc = src.encode_src(pc, labels, *byte_mode)?;
                let dst_enc = dst.encode_dst(pc, labels)?;
                Ok(encode_double_operand(*op, *byte_mode, &src_enc, &dst_enc))
            }
            Instruction::Reti { .. } => Ok(vec![encode_reti()]),
            Instruction::Padding { .. } | Instruction::ListingComment { .. } | Instruction::Interrupt { .. } => {
                Ok(vec![])
            }
            Instruction::CString8 { text, .. } => {
                let mut bytes: Vec<u8> = Vec::with_capacity(text.len() + 1);
                for c in text.chars() {
                    if !c.is_ascii() {
                        return Err(CompileError::DataCharacterOutOfRange(c));
                    }
                    bytes.push(c as u8);
                }
                bytes.push(0);
                if bytes.len() % 2 != 0 {
                    bytes.push(0);
                }
                Ok(bytes
                    .chunks(2)
                    .map(|pair| ((pair[0] as u16) << 8) | pair[1] as u16)
                    .collect())
            }
        }
    }
}

fn parse_operand(tokens: &[Token], i: usize) -> Option<(Operand, usize)> {
    match tokens.get(i)? {
        Token::ArgRegDirect => match tokens.get(i + 1)? {
            Token::Value(n) => Some((Operand::RegDirect(*n as u8), 2)),
            _ => None,
        },
        Token::ArgIndexed => match (tokens.get(i + 1)?, tokens.get(i + 2)?) {
            (Token::Value(off), Token::Value(reg)) => {
                Some((Operand::Indexed(*reg as u8, LabelRef::Literal(*off)), 3))
            }
            (Token::LabelVal(name), Token::Value(reg)) => Some((
                Operand::Indexed(*reg as u8, LabelRef::Label(name.clone())),
                3,
            )),
            _ => None,
        },
        Token::ArgRegIndirect => match tokens.get(i + 1)? {
            Token::Value(n) => Some((Operand::RegIndirect(*n as u8), 2)),
            _ => None,
        },
        Token::ArgRegIndirectAuto => match tokens.get(i + 1)? {
            Token::Value(n) => Some((Operand::RegIndirectAuto(*n as u8), 2)),
            _ => None,
        },
        Token::ArgSymbolic => match tokens.get(i + 1)? {
            Token::Value(v) => Some((Operand::Symbolic(LabelRef::Literal(*v)), 2)),
            Token::LabelVal(name) => Some((Operand::Symbolic(LabelRef::Label(name.clone())), 2)),
            _ => None,
        },
        Token::ArgImmediate => match tokens.get(i + 1)? {
            Token::Value(v) => Some((Operand::Immediate(LabelRef::Literal(*v)), 2)),
            Token::LabelVal(name) => Some((Operand::Immediate(LabelRef::Label(name.clone())), 2)),
            _ => None,
        },
        Token::ArgAbsolute => match tokens.get(i + 1)? {
            Token::Value(v) => Some((Operand::Absolute(LabelRef::Literal(*v)), 2)),
            Token::LabelVal(name) => Some((Operand::Absolute(LabelRef::Label(name.clone())), 2)),
            _ => None,
        },
        _ => None,
    }
}

fn skip_to_next_line_start(tokens: &[Token], mut i: usize) -> usize {
    while i < tokens.len() {
        if matches!(tokens[i], Token::LineStart(_)) {
            return i;
        }
        i += 1;
    }
    i
}

/// Consumes the token stream, emitting one [`Instruction`] per construct and
/// resynchronizing (skipping to the next `LineStart`) on any parse failure
/// (§4.4, §7).
pub fn parse_instructions(tokens: &[Token]) -> (Vec<Instruction>, Vec<Diagnostic>) {
    let mut out = Vec::new();
    let mut diagnostics = Vec::new();
    let mut origin = Origin::root(0);
    let mut pending_labels: Vec<String> = Vec::new();
    let mut data_mode = false;
    let mut i = 0;

    macro_rules! fail {
        ($kind:expr) => {{
            diagnostics.push(Diagnostic::new(origin.clone(), $kind));
            i = skip_to_next_line_start(tokens, i);
            continue;
        }};
    }

    while i < tokens.len() {
        match &tokens[i] {
            Token::LineStart(o) => {
                origin = o.clone();
                i += 1;
            }
            Token::Label(name) => {
                pending_labels.push(name.clone());
                i += 1;
            }
            Token::DbgBreak => {
                out.push(Instruction::Padding {
                    origin: origin.clone(),
                });
                i += 1;
            }
            Token::ListingComment(text) => {
                out.push(Instruction::ListingComment {
                    text: text.clone(),
                    origin: origin.clone(),
                });
                i += 1;
            }
            Token::DataMode => {
                data_mode = true;
                i += 1;
            }
            Token::TextMode => {
                data_mode = false;
                i += 1;
            }
            Token::Interrupt(vector) => {
                let vector = *vector;
                i += 1;
                let target = match tokens.get(i) {
                    Some(Token::LabelVal(name)) => LabelRef::Label(name.clone()),
                    Some(Token::Value(v)) => LabelRef::Literal(*v),
                    _ => fail!(DiagnosticKind::MalformedOperand("interrupt".to_string())),
                };
                i += 1;
                out.push(Instruction::Interrupt {
                    vector,
                    target,
                    origin: origin.clone(),
                });
                pending_labels.clear();
            }
            Token::CString8Data(text) if data_mode => {
                out.push(Instruction::CString8 {
                    text: text.clone(),
                    origin: origin.clone(),
                    labels: std::mem::take(&mut pending_labels),
                });
                i += 1;
            }
            Token::Mnemonic(m) => {
                let mnemonic = m.clone();
                i += 1;
                let labels = std::mem::take(&mut pending_labels);

                if mnemonic == "reti" {
                    out.push(Instruction::Reti {
                        origin: origin.clone(),
                        labels,
                    });
                    continue;
                }

                if let Some(cond) = JumpCond::from_mnemonic(&mnemonic) {
                    let target = match tokens.get(i) {
                        Some(Token::Value(v)) => LabelRef::Literal(*v),
                        Some(Token::LabelVal(name)) => LabelRef::Label(name.clone()),
                        _ => fail!(DiagnosticKind::WrongArgumentCount {
                            mnemonic,
                            expected: 1,
                            got: 0,
                        }),
                    };
                    i += 1;
                    out.push(Instruction::Jump {
                        cond,
                        target,
                        origin: origin.clone(),
                        labels,
                    });
                    continue;
                }

                let byte_mode = match tokens.get(i) {
                    Some(Token::ModeIndicator(bw)) => {
                        i += 1;
                        Some(*bw)
                    }
                    _ => None,
                };

                if let Some(op) = DoubleOp::from_mnemonic(&mnemonic) {
                    let (src, consumed) = match parse_operand(tokens, i) {
                        Some(v) => v,
                        None => fail!(DiagnosticKind::MalformedOperand(mnemonic)),
                    };
                    i += consumed;
                    let (dst, consumed) = match parse_operand(tokens, i) {
                        Some(v) => v,
                        None => fail!(DiagnosticKind::MalformedOperand("<destination>".to_string())),
                    };
                    i += consumed;
                    out.push(Instruction::DoubleOperand {
                        op,
                        byte_mode: byte_mode.unwrap_or(false),
                        src,
                        dst,
                        origin: origin.clone(),
                        labels,
                    });
                    continue;
                }

                if let Some(op) = SingleOp::from_mnemonic(&mnemonic) {
                    if byte_mode.unwrap_or(false) && op.forbids_byte_mode() {
                        fail!(DiagnosticKind::Compile(CompileError::ByteModeForbidden(
                            op.mnemonic()
                        )));
                    }
                    let (src, consumed) = match parse_operand(tokens, i) {
                        Some(v) => v,
                        None => fail!(DiagnosticKind::MalformedOperand(mnemonic)),
                    };
                    i += consumed;
                    out.push(Instruction::SingleOperand {
                        op,
                        byte_mode: byte_mode.unwrap_or(false),
                        src,
                        origin: origin.clone(),
                        labels,
                    });
                    continue;
                }

                if let Some(arity) = emulated::arity(&mnemonic) {
                    if matches!(arity, emulated::Arity::Zero) && byte_mode.is_some() {
                        fail!(DiagnosticKind::Compile(CompileError::ByteModeForbidden(
                            "this emulated mnemonic"
                        )));
                    }
                    let dst = match arity {
                        emulated::Arity::One => match parse_operand(tokens, i) {
                            Some((operand, consumed)) => {
                                i += consumed;
                                Some(operand)
                            }
                            None => fail!(DiagnosticKind::MalformedOperand(mnemonic)),
                        },
                        emulated::Arity::Zero => None,
                    };

                    match emulated::rewrite(&mnemonic, dst) {
                        Ok(emulated::Rewrite::Double(op, src, dst)) => {
                            out.push(Instruction::DoubleOperand {
                                op,
                                byte_mode: byte_mode.unwrap_or(false),
                                src,
                                dst,
                                origin: origin.clone(),
                                labels,
                            });
                        }
                        Ok(emulated::Rewrite::Jump(cond, target)) => {
                            out.push(Instruction::Jump {
                                cond,
                                target,
                                origin: origin.clone(),
                                labels,
                            });
                        }
                        Err(kind) => fail!(kind),
                    }
                    continue;
                }

                fail!(DiagnosticKind::UnknownMnemonic(mnemonic));
            }
            _ => {
                i += 1;
            }
        }
    }

    (out, diagnostics)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::token::tokenize;
    use crate::line::Line;

    fn line(text: &str) -> Line {
        Line::new(Origin::root(1), text.to_string())
    }

    #[test]
    fn mov_produces_double_operand_instruction() {
        let (tokens, _) = tokenize(&[line("mov #0x4400 sp")]);
        let (instrs, diags) = parse_instructions(&tokens);
        assert!(diags.is_empty());
        assert!(matches!(
            instrs.iter().find(|i| matches!(i, Instruction::DoubleOperand { .. })),
            Some(Instruction::DoubleOperand { op: DoubleOp::Mov, .. })
        ));
    }

    #[test]
    fn ret_rewrites_to_double_operand_mov() {
        let (tokens, _) = tokenize(&[line("ret")]);
        let (instrs, diags) = parse_instructions(&tokens);
        assert!(diags.is_empty());
        assert!(instrs
            .iter()
            .any(|i| matches!(i, Instruction::DoubleOperand { op: DoubleOp::Mov, .. })));
    }

    #[test]
    fn unknown_mnemonic_is_a_diagnostic() {
        let (tokens, _) = tokenize(&[line("bogus r5")]);
        let (_, diags) = parse_instructions(&tokens);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn label_attaches_to_following_instruction() {
        let (tokens, _) = tokenize(&[line("loop: nop")]);
        let (instrs, _) = parse_instructions(&tokens);
        let nop = instrs
            .iter()
            .find(|i| matches!(i, Instruction::DoubleOperand { .. }))
            .unwrap();
        assert_eq!(nop.labels(), &["loop".to_string()]);
    }
}

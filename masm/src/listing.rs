//! Builds the three-section human-readable listing (§6.3): sorted labels,
//! per-instruction code-with-bytes, and a line-to-address map.

use std::fmt::Write as _;

use msp430::operand::LabelMap;

use crate::render::render;
use crate::resolver::CompiledInstruction;

/// Renders the full listing for one compiled program.
pub fn build(trace: &[CompiledInstruction], labels: &LabelMap) -> String {
    let mut out = String::new();

    out.push_str("|Labels|\n");
    let mut sorted: Vec<(&String, &u16)> = labels.iter().collect();
    sorted.sort_by_key(|(name, _)| name.clone());
    for (name, addr) in sorted {
        let _ = writeln!(out, "0x{:04X}\t{}", addr, name);
    }

    out.push_str("|Code|\n");
    let mut last_pc: Option<u16> = None;
    for instr in trace {
        if let Some(prev) = last_pc {
            if instr.words.is_empty() && prev != instr.pc {
                out.push('\n');
            }
        }
        if instr.words.is_empty() {
            last_pc = Some(instr.pc);
            continue;
        }
        let bytes = instr
            .words
            .iter()
            .map(|w| format!("{:04X}", w))
            .collect::<Vec<_>>()
            .join(" ");
        let label_list = instr.instruction.labels().join(",");
        let _ = writeln!(
            out,
            "0x{:04X}\t{}\t{}\t{}",
            instr.pc,
            bytes,
            render(&instr.instruction),
            label_list
        );
        last_pc = Some(instr.pc);
    }

    out.push_str("|Line Map|\n");
    for instr in trace {
        if instr.words.is_empty() {
            continue;
        }
        let bytes = instr
            .words
            .iter()
            .map(|w| format!("{:04X}", w))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(
            out,
            "{}\t0x{:04X}\t{}",
            instr.instruction.origin().line_number,
            instr.pc,
            bytes
        );
    }

    out
}

//! Assembler library: wires the loader, preprocessor, tokenizer, instruction
//! parser, and resolver/compiler into a single [`assemble`] entry point
//! (§4, §7).

pub mod diagnostic;
pub mod emulated;
pub mod instruction;
pub mod line;
pub mod listing;
pub mod loader;
pub mod preprocessor;
pub mod render;
pub mod resolver;
pub mod token;

use std::path::Path;

use mimage::Image;
use msp430::error::CompileError;
use msp430::operand::LabelMap;

pub use diagnostic::{Diagnostic, DiagnosticKind, RecursionLimitReached};
pub use resolver::CompiledInstruction;

/// Everything a caller needs out of one assembly run: the final image (when
/// assembly succeeded), the listing text (when requested), the per-line
/// trace (when a source map is wanted), and every diagnostic/compile error
/// collected along the way.
#[derive(Debug, Default)]
pub struct AssembleOutput {
    pub image: Option<Image>,
    pub listing: Option<String>,
    pub trace: Option<Vec<CompiledInstruction>>,
    pub labels: Option<LabelMap>,
    pub diagnostics: Vec<Diagnostic>,
    pub compile_errors: Vec<CompileError>,
}

impl AssembleOutput {
    /// An assembly run is successful iff it produced an image and recorded
    /// no diagnostics or compile errors (§7).
    pub fn is_success(&self) -> bool {
        self.image.is_some() && self.diagnostics.is_empty() && self.compile_errors.is_empty()
    }
}

/// Assembles `source` (read from `dir`, used to resolve `.include`) into an
/// image at load address `base_pc`, optionally rendering a listing.
///
/// Diagnostics never abort the pipeline early: every stage runs to
/// completion and contributes what it can, matching the resynchronizing
/// recovery policy of §7. Compilation itself is skipped if any pipeline
/// diagnostic was recorded upstream, since labels and encodings built on a
/// malformed instruction stream are not meaningful.
pub fn assemble(
    source: &str,
    dir: Option<&Path>,
    base_pc: u16,
    want_listing: bool,
    want_trace: bool,
) -> AssembleOutput {
    let mut out = AssembleOutput::default();

    let lines = loader::load_source(source, dir);

    let (lines, define_diags) = preprocessor::apply_defines(lines);
    out.diagnostics.extend(define_diags);

    let (lines, macro_diags) = match preprocessor::expand_macros(lines, false) {
        Ok((lines, diags)) => (lines, diags),
        Err(RecursionLimitReached { origin }) => {
            out.diagnostics.push(Diagnostic::new(origin, DiagnosticKind::MacroRecursionLimit));
            return out;
        }
    };
    out.diagnostics.extend(macro_diags);

    let (tokens, token_diags) = token::tokenize(&lines);
    out.diagnostics.extend(token_diags);

    let (instructions, parse_diags) = instruction::parse_instructions(&tokens);
    out.diagnostics.extend(parse_diags);

    if !out.diagnostics.is_empty() {
        return out;
    }

    match resolver::compile_with_trace(&instructions, base_pc) {
        Ok((image, trace, labels)) => {
            if want_listing {
                out.listing = Some(listing::build(&trace, &labels));
            }
            if want_trace {
                out.trace = Some(trace);
                out.labels = Some(labels);
            }
            out.image = Some(image);
        }
        Err(errors) => out.compile_errors = errors,
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn assembles_scenario_program_to_expected_bytes() {
        let out = assemble("mov #0x4400 sp\nreti\n", None, 0, false, false);
        assert!(out.diagnostics.is_empty());
        assert!(out.compile_errors.is_empty());
        let image = out.image.unwrap();
        let code = image.segments.iter().find(|s| s.start_address == 0).unwrap();
        assert_eq!(code.words, vec![0x4031, 0x4400, 0x1300]);
    }

    #[test]
    fn unknown_mnemonic_skips_compilation_and_reports_a_diagnostic() {
        let out = assemble("bogus r5\n", None, 0, false, false);
        assert!(out.image.is_none());
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn listing_is_only_built_when_requested() {
        let out = assemble("nop\n", None, 0, true, false);
        assert!(out.listing.is_some());
        let without = assemble("nop\n", None, 0, false, false);
        assert!(without.listing.is_none());
    }

    #[test]
    fn trace_is_only_captured_when_requested() {
        let out = assemble("nop\n", None, 0, false, true);
        assert!(out.trace.is_some());
        assert!(out.labels.is_some());
    }

    #[test]
    fn include_resolves_relative_to_the_source_directory() {
        let dir = std::env::temp_dir().join(format!("masm_lib_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("inc.asm"), "nop\n").unwrap();
        let out = assemble(".include inc.asm\nreti\n", Some(&dir), 0, false, false);
        std::fs::remove_dir_all(&dir).ok();
        assert!(out.diagnostics.is_empty());
        assert!(out.image.is_some());
    }
}

//! The disassembler's reverse-emulation table (§4.7): a set of regex
//! substitutions that collapse a long-form rendering into its shorter
//! emulated-mnemonic equivalent, e.g. `MOV #0x0000,R3` → `NOP`. Generated by
//! hand from the same rewrite rules `masm::emulated` encodes in the forward
//! direction. The two directions have different enough shapes (bits to text
//! here, mnemonic to bits there) that sharing one table isn't practical, so
//! this one is kept in sync manually.

use std::sync::OnceLock;

use regex::Regex;

use mutil::SubstTemplate;

struct Rule {
    pattern: Regex,
    template: SubstTemplate,
}

fn rules() -> &'static Vec<Rule> {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let specs: &[(&str, &str)] = &[
            (r"^MOV @SP\+,PC$", "RET"),
            (r"^JMP 0x0000$", "HCF"),
            (r"^MOV #0x0000,CG$", "NOP"),
            (r"^BIC #0x0001,SR$", "CLRC"),
            (r"^BIC #0x0002,SR$", "CLRZ"),
            (r"^BIC #0x0004,SR$", "CLRN"),
            (r"^BIC #0x0008,SR$", "DINT"),
            (r"^BIS #0x0008,SR$", "EINT"),
            (r"^BIS #0x0001,SR$", "SETC"),
            (r"^BIS #0x0002,SR$", "SETZ"),
            (r"^BIS #0x0004,SR$", "SETN"),
            (r"^MOV @SP\+,(?P<dst>.+)$", "POP $dst"),
            (r"^MOV #0x0000,(?P<dst>.+)$", "CLR $dst"),
            (r"^MOV\.B #0x00,(?P<dst>.+)$", "CLR.B $dst"),
            (r"^ADDC #0x0000,(?P<dst>.+)$", "ADC $dst"),
            (r"^ADDC\.B #0x00,(?P<dst>.+)$", "ADC.B $dst"),
            (r"^DADD #0x0000,(?P<dst>.+)$", "DADC $dst"),
            (r"^SUBC #0x0000,(?P<dst>.+)$", "SBC $dst"),
            (r"^CMP #0x0000,(?P<dst>.+)$", "TST $dst"),
            (r"^SUB #0x0001,(?P<dst>.+)$", "DEC $dst"),
            (r"^SUB #0x0002,(?P<dst>.+)$", "DECD $dst"),
            (r"^ADD #0x0001,(?P<dst>.+)$", "INC $dst"),
            (r"^ADD #0x0002,(?P<dst>.+)$", "INCD $dst"),
            (r"^XOR #0xFFFF,(?P<dst>.+)$", "INV $dst"),
            (r"^ADD (?P<a>.+),(?P<b>.+)$", "RLA $a"),
            (r"^ADDC (?P<a>.+),(?P<b>.+)$", "RLC $a"),
        ];

        specs
            .iter()
            .map(|(pattern, template)| Rule {
                pattern: Regex::new(pattern).unwrap(),
                template: SubstTemplate::compile(template),
            })
            .collect()
    })
}

/// Applies every reverse rule whose pattern matches `raw`, including the
/// `src == dst` guard RLA/RLC need, and returns the shortest successful
/// rendering. Ties keep the first rule in table order, and `raw` itself
/// always participates so a line with no emulated form passes through
/// unchanged (§4.7, "the shortest resulting rendering wins").
pub fn collapse(raw: &str) -> String {
    let mut best = raw.to_string();

    for rule in rules() {
        if let Some(caps) = rule.pattern.captures(raw) {
            if let (Some(a), Some(b)) = (caps.name("a"), caps.name("b")) {
                if a.as_str() != b.as_str() {
                    continue;
                }
            }
            let candidate = rule.template.render(&caps);
            if candidate.len() < best.len() {
                best = candidate;
            }
        }
    }

    best
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn collapses_mov_sp_indirect_auto_to_pc_into_ret() {
        assert_eq!(collapse("MOV @SP+,PC"), "RET");
    }

    #[test]
    fn collapses_mov_zero_cg_into_nop() {
        assert_eq!(collapse("MOV #0x0000,CG"), "NOP");
    }

    #[test]
    fn collapses_mov_zero_into_clr_when_destination_is_not_cg() {
        assert_eq!(collapse("MOV #0x0000,R5"), "CLR R5");
    }

    #[test]
    fn leaves_unrecognized_instructions_untouched() {
        assert_eq!(collapse("AND R4,R5"), "AND R4,R5");
    }

    #[test]
    fn rla_requires_matching_source_and_destination() {
        assert_eq!(collapse("ADD R5,R5"), "RLA R5");
        assert_eq!(collapse("ADD R4,R5"), "ADD R4,R5");
    }
}

//! Regex-driven tokenizer (§4.3): one pass over the preprocessed line list,
//! emitting a flat token stream consumed by the
//! [instruction parser](crate::instruction).

use regex::Regex;

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::line::{Line, Origin};

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    LineStart(Line),
    DbgBreak,
    ListingComment(String),
    Label(String),
    LabelVal(String),
    Mnemonic(String),
    ModeIndicator(bool),
    Value(i32),
    ArgRegDirect,
    ArgIndexed,
    ArgRegIndirect,
    ArgRegIndirectAuto,
    ArgSymbolic,
    ArgImmediate,
    ArgAbsolute,
    DataMode,
    TextMode,
    CString8Data(String),
    Interrupt(i32),
}

struct Patterns {
    comment: Regex,
    listing_comment: Regex,
    register: Regex,
    indexed_numeric: Regex,
    indexed_label: Regex,
    indirect: Regex,
    immediate_numeric: Regex,
    immediate_label: Regex,
    absolute_numeric: Regex,
    absolute_label: Regex,
    numeric: Regex,
    identifier: Regex,
    cstr8: Regex,
    interrupt: Regex,
    label_line: Regex,
    include_error: Regex,
}

fn patterns() -> &'static Patterns {
    static P: std::sync::OnceLock<Patterns> = std::sync::OnceLock::new();
    P.get_or_init(|| Patterns {
        comment: Regex::new(r";.*$").unwrap(),
        listing_comment: Regex::new(r"^;!!(?P<msg>.*)$").unwrap(),
        register: Regex::new(r"^(?i)(r(?P<num>[0-9]{1,2})|pc|sp|sr|cg)$").unwrap(),
        indexed_numeric: Regex::new(r"^(?P<off>[+-]?(?:0x[0-9A-Fa-f]+|[0-9]+))\((?P<reg>\w+)\)$").unwrap(),
        indexed_label: Regex::new(r"^(?P<lbl>[A-Za-z_$][A-Za-z0-9_$]*)\((?P<reg>\w+)\)$").unwrap(),
        indirect: Regex::new(r"^@(?P<reg>\w+)(?P<inc>\+)?$").unwrap(),
        immediate_numeric: Regex::new(r"^#(?P<v>[+-]?(?:0x[0-9A-Fa-f]+|[0-9]+))$").unwrap(),
        immediate_label: Regex::new(r"^#(?P<lbl>[A-Za-z_$][A-Za-z0-9_$]*)$").unwrap(),
        absolute_numeric: Regex::new(r"^&(?P<v>0x[0-9A-Fa-f]+|[0-9]+)$").unwrap(),
        absolute_label: Regex::new(r"^&(?P<lbl>[A-Za-z_$][A-Za-z0-9_$]*)$").unwrap(),
        numeric: Regex::new(r"^(?P<v>0x[0-9A-Fa-f]+|[0-9]+)$").unwrap(),
        identifier: Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap(),
        cstr8: Regex::new(r#"^\.cstr8\s+(?P<text>.*)$"#).unwrap(),
        interrupt: Regex::new(r"^\.interrupt\s+(?P<vec>\S+)\s+(?P<target>\S+)$").unwrap(),
        label_line: Regex::new(r"^(?P<label>[^:]*):(?P<rest>.*)$").unwrap(),
        include_error: Regex::new(r"^!!!File '(?P<path>.*)' not found$").unwrap(),
    })
}

pub fn parse_int(s: &str) -> Option<i32> {
    let (neg, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let value = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        rest.parse::<i64>().ok()?
    };
    Some(if neg { -value } else { value } as i32)
}

fn register_number(s: &str) -> Option<i32> {
    let lower = s.to_ascii_lowercase();
    Some(match lower.as_str() {
        "pc" => 0,
        "sp" => 1,
        "sr" => 2,
        "cg" => 3,
        _ => {
            let caps = patterns().register.captures(s)?;
            caps.name("num")?.as_str().parse().ok()?
        }
    })
}

/// Mangles a `$`-prefixed label with the enclosing local-block prefix; other
/// labels pass through unchanged.
pub fn mangle_label(name: &str, prefix: &str) -> String {
    if let Some(rest) = name.strip_prefix('$') {
        format!("{}${}", prefix, rest)
    } else {
        name.to_string()
    }
}

const JUMP_MNEMONICS: &[&str] = &[
    "jmp", "jne", "jnz", "jeq", "jz", "jnc", "jlo", "jc", "jhs", "jn", "jge", "jl",
];

/// Parses one already-split argument string into its token sequence (§4.3,
/// "Argument parser"). Returns `None` if the argument matches no known
/// shape.
fn parse_argument(text: &str, prefix: &str) -> Option<Vec<Token>> {
    let pats = patterns();

    if let Some(reg) = register_number(text) {
        return Some(vec![Token::ArgRegDirect, Token::Value(reg)]);
    }
    if let Some(caps) = pats.indexed_numeric.captures(text) {
        let off = parse_int(&caps["off"])?;
        let reg = register_number(&caps["reg"])?;
        return Some(vec![Token::ArgIndexed, Token::Value(off), Token::Value(reg)]);
    }
    if let Some(caps) = pats.indexed_label.captures(text) {
        let reg = register_number(&caps["reg"])?;
        let label = mangle_label(&caps["lbl"], prefix);
        return Some(vec![Token::ArgIndexed, Token::LabelVal(label), Token::Value(reg)]);
    }
    if let Some(caps) = pats.indirect.captures(text) {
        let reg = register_number(&caps["reg"])?;
        let kind = if caps.name("inc").is_some() {
            Token::ArgRegIndirectAuto
        } else {
            Token::ArgRegIndirect
        };
        return Some(vec![kind, Token::Value(reg)]);
    }
    if let Some(caps) = pats.immediate_numeric.captures(text) {
        let v = parse_int(&caps["v"])?;
        return Some(vec![Token::ArgImmediate, Token::Value(v)]);
    }
    if let Some(caps) = pats.immediate_label.captures(text) {
        let label = mangle_label(&caps["lbl"], prefix);
        return Some(vec![Token::ArgImmediate, Token::LabelVal(label)]);
    }
    if let Some(caps) = pats.absolute_numeric.captures(text) {
        let v = parse_int(&caps["v"])?;
        return Some(vec![Token::ArgAbsolute, Token::Value(v)]);
    }
    if let Some(caps) = pats.absolute_label.captures(text) {
        let label = mangle_label(&caps["lbl"], prefix);
        return Some(vec![Token::ArgAbsolute, Token::LabelVal(label)]);
    }
    if let Some(caps) = pats.numeric.captures(text) {
        let v = parse_int(&caps["v"])?;
        return Some(vec![Token::ArgSymbolic, Token::Value(v)]);
    }
    if pats.identifier.is_match(text) {
        let label = mangle_label(text, prefix);
        return Some(vec![Token::ArgSymbolic, Token::LabelVal(label)]);
    }
    None
}

struct Tokenizer {
    data_mode: bool,
    prefix_stack: Vec<String>,
    next_prefix: u32,
    data_tokens: Vec<Token>,
}

impl Tokenizer {
    fn new() -> Tokenizer {
        Tokenizer {
            data_mode: false,
            prefix_stack: vec!["p0".to_string()],
            next_prefix: 1,
            data_tokens: Vec::new(),
        }
    }

    fn current_prefix(&self) -> String {
        self.prefix_stack.last().cloned().unwrap_or_default()
    }

    fn fresh_prefix(&mut self) -> String {
        let p = format!("p{}", self.next_prefix);
        self.next_prefix += 1;
        p
    }

    fn push_locblk(&mut self) {
        let p = self.fresh_prefix();
        self.prefix_stack.push(p);
    }

    fn pop_locblk(&mut self) {
        self.prefix_stack.pop();
        if self.prefix_stack.is_empty() {
            let p = self.fresh_prefix();
            self.prefix_stack.push(p);
        }
    }

    fn reset_locblk(&mut self) {
        let p = self.fresh_prefix();
        self.prefix_stack = vec![p];
    }
}

/// Tokenizes the preprocessed line list into a flat token stream.
pub fn tokenize(lines: &[Line]) -> (Vec<Token>, Vec<Diagnostic>) {
    let pats = patterns();
    let mut t = Tokenizer::new();
    let mut out = Vec::new();
    let mut diagnostics = Vec::new();

    for line in lines {
        out.push(Token::LineStart(line.clone()));

        let pre_trimmed = line.text.trim();
        let trimmed = if pre_trimmed.starts_with(";!!") {
            pre_trimmed.to_string()
        } else if let Some(m) = pats.comment.find(pre_trimmed) {
            pre_trimmed[..m.start()].trim().to_string()
        } else {
            pre_trimmed.to_string()
        };
        let trimmed = trimmed.as_str();

        if trimmed.is_empty() {
            continue;
        }
        if let Some(caps) = pats.include_error.captures(trimmed) {
            diagnostics.push(Diagnostic::new(
                line.origin.clone(),
                DiagnosticKind::IncludeNotFound(caps["path"].to_string()),
            ));
            continue;
        }
        if let Some(caps) = pats.listing_comment.captures(trimmed) {
            out.push(Token::ListingComment(caps["msg"].to_string()));
            continue;
        }
        if trimmed == ".dbgbrk" {
            out.push(Token::DbgBreak);
            continue;
        }
        if trimmed == ".data" {
            if t.data_mode {
                diagnostics.push(Diagnostic::new(
                    line.origin.clone(),
                    DiagnosticKind::RedundantModeToggle(".data"),
                ));
            }
            t.data_mode = true;
            out.push(Token::DataMode);
            continue;
        }
        if trimmed == ".text" {
            if !t.data_mode {
                diagnostics.push(Diagnostic::new(
                    line.origin.clone(),
                    DiagnosticKind::RedundantModeToggle(".text"),
                ));
            }
            t.data_mode = false;
            out.push(Token::TextMode);
            continue;
        }
        if trimmed == ".locblk" {
            t.reset_locblk();
            continue;
        }
        if trimmed == ".push_locblk" {
            t.push_locblk();
            continue;
        }
        if trimmed == ".pop_locblk" {
            t.pop_locblk();
            continue;
        }

        if let Some(caps) = pats.interrupt.captures(trimmed) {
            let vector = match parse_int(&caps["vec"]) {
                Some(v) => v,
                None => {
                    diagnostics.push(Diagnostic::new(
                        line.origin.clone(),
                        DiagnosticKind::MalformedOperand(trimmed.to_string()),
                    ));
                    continue;
                }
            };
            let target = mangle_label(&caps["target"], &t.current_prefix());
            out.push(Token::Interrupt(vector));
            out.push(Token::LabelVal(target));
            continue;
        }

        let (label, rest) = if let Some(caps) = pats.label_line.captures(trimmed) {
            (Some(caps["label"].trim().to_string()), caps["rest"].trim().to_string())
        } else {
            (None, trimmed.to_string())
        };

        if let Some(label_name) = label {
            let mangled = mangle_label(&label_name, &t.current_prefix());
            if t.data_mode {
                t.data_tokens.push(Token::Label(mangled));
            } else {
                out.push(Token::Label(mangled));
            }
            if rest.is_empty() {
                continue;
            }
        }

        if t.data_mode {
            if let Some(caps) = pats.cstr8.captures(&rest) {
                t.data_tokens.push(Token::LineStart(line.clone()));
                t.data_tokens.push(Token::CString8Data(caps["text"].to_string()));
                continue;
            }
        }

        let parts: Vec<&str> = rest.split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            continue;
        }

        let (mnemonic_raw, mode) = match parts[0].rsplit_once('.') {
            Some((name, suffix)) if suffix.eq_ignore_ascii_case("b") || suffix.eq_ignore_ascii_case("w") => {
                (name, Some(suffix.eq_ignore_ascii_case("b")))
            }
            _ => (parts[0], None),
        };
        let mnemonic_lower = mnemonic_raw.to_ascii_lowercase();
        out.push(Token::Mnemonic(mnemonic_lower.clone()));
        if let Some(byte_mode) = mode {
            out.push(Token::ModeIndicator(byte_mode));
        }

        let args = &parts[1..];
        if JUMP_MNEMONICS.contains(&mnemonic_lower.as_str()) {
            if args.len() != 1 {
                diagnostics.push(Diagnostic::new(
                    line.origin.clone(),
                    DiagnosticKind::WrongArgumentCount {
                        mnemonic: mnemonic_lower,
                        expected: 1,
                        got: args.len(),
                    },
                ));
                continue;
            }
            match parse_int(args[0]) {
                Some(v) => out.push(Token::Value(v)),
                None => out.push(Token::LabelVal(mangle_label(args[0], &t.current_prefix()))),
            }
            continue;
        }

        for arg in args {
            match parse_argument(arg, &t.current_prefix()) {
                Some(tokens) => out.extend(tokens),
                None => diagnostics.push(Diagnostic::new(
                    line.origin.clone(),
                    DiagnosticKind::MalformedOperand((*arg).to_string()),
                )),
            }
        }
    }

    out.push(Token::DbgBreak);
    out.push(Token::DataMode);
    out.extend(t.data_tokens);

    collapse_duplicate_line_starts(out, diagnostics)
}

fn collapse_duplicate_line_starts(tokens: Vec<Token>, diagnostics: Vec<Diagnostic>) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut out = Vec::with_capacity(tokens.len());
    for tok in tokens {
        if let (Some(Token::LineStart(_)), Token::LineStart(_)) = (out.last(), &tok) {
            out.pop();
        }
        out.push(tok);
    }
    (out, diagnostics)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::line::Origin;

    fn line(text: &str) -> Line {
        Line::new(Origin::root(1), text.to_string())
    }

    #[test]
    fn register_direct_operand() {
        let (tokens, diags) = tokenize(&[line("mov r5 r6")]);
        assert!(diags.is_empty());
        assert!(tokens.contains(&Token::Mnemonic("mov".to_string())));
        assert!(tokens.contains(&Token::ArgRegDirect));
        assert!(tokens.contains(&Token::Value(5)));
        assert!(tokens.contains(&Token::Value(6)));
    }

    #[test]
    fn byte_suffix_emits_mode_indicator() {
        let (tokens, _) = tokenize(&[line("mov.b #5 r5")]);
        assert!(tokens.contains(&Token::ModeIndicator(true)));
    }

    #[test]
    fn jump_with_label_argument() {
        let (tokens, diags) = tokenize(&[line("jmp loop")]);
        assert!(diags.is_empty());
        assert!(tokens.contains(&Token::Mnemonic("jmp".to_string())));
        assert!(tokens.iter().any(|t| matches!(t, Token::LabelVal(n) if n == "loop")));
    }

    #[test]
    fn label_line_emits_label_token() {
        let (tokens, _) = tokenize(&[line("loop: nop")]);
        assert!(tokens.iter().any(|t| matches!(t, Token::Label(n) if n == "loop")));
    }

    #[test]
    fn dollar_label_is_mangled_by_local_prefix() {
        let (tokens, _) = tokenize(&[line("$loop: jmp $loop")]);
        let labels: Vec<_> = tokens.iter().filter_map(|t| match t {
            Token::Label(n) => Some(n.clone()),
            _ => None,
        }).collect();
        assert_eq!(labels.len(), 1);
        assert!(labels[0].starts_with("p0$loop"));
    }

    #[test]
    fn malformed_operand_is_a_diagnostic() {
        let (_, diags) = tokenize(&[line("mov %%% r5")]);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn missing_include_marker_becomes_diagnostic() {
        let (tokens, diags) = tokenize(&[line("!!!File 'nope.asm' not found")]);
        assert_eq!(diags.len(), 1);
        assert!(matches!(&diags[0].kind, DiagnosticKind::IncludeNotFound(p) if p == "nope.asm"));
        assert!(!tokens.iter().any(|t| matches!(t, Token::Mnemonic(_))));
    }

    #[test]
    fn listing_comment_line() {
        let (tokens, _) = tokenize(&[line(";!! hello")]);
        assert!(tokens.contains(&Token::ListingComment(" hello".to_string())));
    }

    #[test]
    fn labeled_cstr8_label_lands_immediately_before_its_data_token() {
        let (tokens, diags) = tokenize(&[line(".data"), line(r#"greeting: .cstr8 "hi""#)]);
        assert!(diags.is_empty());
        let label_pos = tokens
            .iter()
            .position(|t| matches!(t, Token::Label(n) if n == "greeting"))
            .expect("label token present");
        let data_pos = tokens
            .iter()
            .position(|t| matches!(t, Token::CString8Data(s) if s == "hi"))
            .expect("data token present");
        assert!(label_pos < data_pos);
        assert!(!tokens[..data_pos]
            .iter()
            .any(|t| matches!(t, Token::Mnemonic(_))));
    }

    #[test]
    fn standalone_data_mode_label_is_not_left_in_the_text_stream() {
        let (tokens, _) = tokenize(&[line(".data"), line("tbl:")]);
        let text_before_data = &tokens[..tokens
            .iter()
            .position(|t| matches!(t, Token::DataMode))
            .unwrap()];
        assert!(!text_before_data
            .iter()
            .any(|t| matches!(t, Token::Label(n) if n == "tbl")));
    }

    #[test]
    fn redundant_data_toggle_is_a_diagnostic() {
        let (_, diags) = tokenize(&[line(".data"), line(".data")]);
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0].kind, DiagnosticKind::RedundantModeToggle(".data")));
    }

    #[test]
    fn redundant_text_toggle_is_a_diagnostic() {
        let (_, diags) = tokenize(&[line(".text"), line("nop")]);
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0].kind, DiagnosticKind::RedundantModeToggle(".text")));
    }
}

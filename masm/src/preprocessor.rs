//! Defines and macros (§4.2): two independent sub-passes over the line list
//! produced by the [loader](crate::loader).

use std::collections::HashMap;

use regex::Regex;

use crate::diagnostic::{Diagnostic, DiagnosticKind, RecursionLimitReached};
use crate::line::Line;

const MAX_MACRO_PASSES: u32 = 128;

fn define_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\.define\s+"([^"]*)"\s*,?\s*(\S+)$"#).unwrap())
}

/// Installs `.define "value" NAME` bindings and replaces every `[NAME]`
/// occurrence in the remaining lines. Malformed `.define` lines are dropped
/// and reported; they never reach the output.
pub fn apply_defines(lines: Vec<Line>) -> (Vec<Line>, Vec<Diagnostic>) {
    let mut defines: HashMap<String, String> = HashMap::new();
    let mut pending = Vec::new();
    let mut diagnostics = Vec::new();

    for line in lines {
        let trimmed = line.text.trim();
        if trimmed.starts_with(".define") {
            match define_pattern().captures(trimmed) {
                Some(caps) => {
                    defines.insert(caps[2].to_string(), caps[1].to_string());
                }
                None => diagnostics.push(Diagnostic::new(
                    line.origin.clone(),
                    DiagnosticKind::MalformedDefine,
                )),
            }
            continue;
        }
        pending.push(line);
    }

    let substituted = pending
        .into_iter()
        .map(|line| {
            let mut text = line.text;
            for (name, value) in &defines {
                let needle = format!("[{}]", name);
                if text.contains(&needle) {
                    text = text.replace(&needle, value);
                }
            }
            Line::new(line.origin, text)
        })
        .collect();

    (substituted, diagnostics)
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Macro {
    params: Vec<String>,
    body: Vec<Line>,
}

fn macro_header_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\.macro\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\((?P<params>[^)]*)\)\s*$").unwrap())
}

fn invocation_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<name>[A-Za-z_][A-Za-z0-9_]*)\((?P<args>[^)]*)\)\s*$").unwrap())
}

fn split_args(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

fn collect_macros(lines: Vec<Line>) -> (Vec<Line>, HashMap<(String, usize), Macro>, Vec<Diagnostic>) {
    let mut table = HashMap::new();
    let mut diagnostics = Vec::new();
    let mut rest = Vec::new();

    let mut current: Option<(String, Vec<String>, Vec<Line>)> = None;

    for line in lines {
        let trimmed = line.text.trim();
        if let Some(caps) = macro_header_pattern().captures(trimmed) {
            if current.is_some() {
                diagnostics.push(Diagnostic::new(
                    line.origin.clone(),
                    DiagnosticKind::NestedMacroDefinition,
                ));
                continue;
            }
            let name = caps["name"].to_string();
            let params = split_args(&caps["params"]);
            current = Some((name, params, Vec::new()));
            continue;
        }

        if trimmed == ".endmacro" {
            if let Some((name, params, body)) = current.take() {
                let arity = params.len();
                table.insert((name, arity), Macro { params, body });
            }
            continue;
        }

        match current.as_mut() {
            Some((_, _, body)) => body.push(line),
            None => rest.push(line),
        }
    }

    if let Some((name, _, _)) = current {
        diagnostics.push(Diagnostic::new(
            crate::line::Origin::root(0),
            DiagnosticKind::UnclosedMacro(name),
        ));
    }

    (rest, table, diagnostics)
}

fn substitute_params(text: &str, params: &[String], args: &[String]) -> String {
    let mut out = text.to_string();
    for (param, arg) in params.iter().zip(args.iter()) {
        let needle = format!("{{{}}}", param);
        out = out.replace(&needle, arg);
    }
    out
}

/// Expands macro invocations to a fixed point, bounded by
/// [`MAX_MACRO_PASSES`]. In `panic_mode` (used by tests), exceeding the
/// bound returns [`RecursionLimitReached`] instead of recording a
/// diagnostic and continuing.
pub fn expand_macros(
    lines: Vec<Line>,
    panic_mode: bool,
) -> Result<(Vec<Line>, Vec<Diagnostic>), RecursionLimitReached> {
    let (mut current, macros, mut diagnostics) = collect_macros(lines);

    for _ in 0..MAX_MACRO_PASSES {
        let mut changed = false;
        let mut next = Vec::with_capacity(current.len());

        for line in current {
            let trimmed = line.text.trim();
            if let Some(caps) = invocation_pattern().captures(trimmed) {
                let name = caps["name"].to_string();
                let args = split_args(&caps["args"]);
                let key = (name.clone(), args.len());

                match macros.get(&key) {
                    Some(m) => {
                        changed = true;
                        next.push(Line::new(line.origin.clone(), ".push_locblk"));
                        next.push(Line::new(line.origin.clone(), ".dbgbrk"));
                        next.push(Line::new(
                            line.origin.clone(),
                            format!(";!! Macro invocation: {}", trimmed),
                        ));
                        for body_line in &m.body {
                            let text = substitute_params(&body_line.text, &m.params, &args);
                            next.push(Line::new(line.origin.clone(), text));
                        }
                        next.push(Line::new(line.origin.clone(), ".dbgbrk"));
                        next.push(Line::new(line.origin, ".pop_locblk"));
                    }
                    None => {
                        diagnostics.push(Diagnostic::new(
                            line.origin.clone(),
                            DiagnosticKind::UnknownMacro(name, args.len()),
                        ));
                        next.push(Line::new(line.origin, "nop".to_string()));
                    }
                }
            } else {
                next.push(line);
            }
        }

        current = next;
        if !changed {
            return Ok((current, diagnostics));
        }
    }

    if panic_mode {
        return Err(RecursionLimitReached {
            origin: current
                .first()
                .map(|l| l.origin.clone())
                .unwrap_or_else(|| crate::line::Origin::root(0)),
        });
    }

    diagnostics.push(Diagnostic::new(
        crate::line::Origin::root(0),
        DiagnosticKind::MacroRecursionLimit,
    ));

    let current = current
        .into_iter()
        .map(|line| {
            if invocation_pattern().is_match(line.text.trim()) {
                Line::new(line.origin, "nop".to_string())
            } else {
                line
            }
        })
        .collect();

    Ok((current, diagnostics))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::line::Origin;

    fn line(text: &str) -> Line {
        Line::new(Origin::root(1), text.to_string())
    }

    #[test]
    fn define_substitutes_bracketed_name() {
        let lines = vec![
            line(r#".define "5", COUNT"#),
            line("mov #[COUNT] r5"),
        ];
        let (out, diags) = apply_defines(lines);
        assert!(diags.is_empty());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "mov #5 r5");
    }

    #[test]
    fn macro_expands_with_substituted_params() {
        let lines = vec![
            line(".macro test(a, b)"),
            line("mov {a} {b}"),
            line(".endmacro"),
            line("test(r5, r6)"),
        ];
        let (out, diags) = expand_macros(lines, false).unwrap();
        assert!(diags.is_empty());
        assert!(out.iter().any(|l| l.text == "mov r5 r6"));
    }

    #[test]
    fn unknown_macro_invocation_becomes_nop_with_diagnostic() {
        let lines = vec![line("missing(r5)")];
        let (out, diags) = expand_macros(lines, false).unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(out[0].text, "nop");
    }

    #[test]
    fn self_referencing_macro_hits_recursion_limit_in_panic_mode() {
        let lines = vec![
            line(".macro test(a, b)"),
            line("test(b, a)"),
            line(".endmacro"),
            line("test(r5, r6)"),
        ];
        let result = expand_macros(lines, true);
        assert!(result.is_err());
    }

    #[test]
    fn self_referencing_macro_reports_diagnostic_outside_panic_mode() {
        let lines = vec![
            line(".macro test(a, b)"),
            line("test(b, a)"),
            line(".endmacro"),
            line("test(r5, r6)"),
        ];
        let (_, diags) = expand_macros(lines, false).unwrap();
        assert!(diags
            .iter()
            .any(|d| d.kind == DiagnosticKind::MacroRecursionLimit));
    }

    #[test]
    fn self_referencing_macro_lines_become_nop_outside_panic_mode() {
        let lines = vec![
            line(".macro test(a, b)"),
            line("test(b, a)"),
            line(".endmacro"),
            line("test(r5, r6)"),
        ];
        let (out, _) = expand_macros(lines, false).unwrap();
        assert!(!out.iter().any(|l| invocation_pattern().is_match(l.text.trim())));
        assert!(out.iter().any(|l| l.text == "nop"));
    }
}

//! Splits input text into [`Line`]s and resolves `.include <path>` with a
//! cycle guard (§4.1).

use std::path::{Path, PathBuf};
use std::rc::Rc;

use regex::Regex;

use crate::line::{Line, Origin};

fn include_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*\.include\s+(?P<path>\S+)\s*$"#).unwrap())
}

/// Loads `text` as the root source, recursively expanding `.include`
/// directives relative to `dir`. A file already on the active include stack
/// is silently skipped (cycle suppression) rather than re-included.
pub fn load_source(text: &str, dir: Option<&Path>) -> Vec<Line> {
    let mut stack = Vec::new();
    load_lines(text, Rc::from(""), dir, &mut stack, None)
}

fn load_lines(
    text: &str,
    file: Rc<str>,
    dir: Option<&Path>,
    stack: &mut Vec<PathBuf>,
    included_by: Option<u32>,
) -> Vec<Line> {
    let mut out = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_number = (idx + 1) as u32;
        let trimmed = raw.trim();
        let origin = match included_by {
            Some(parent) => Origin::included(file.clone(), line_number, parent),
            None => Origin::root(line_number),
        };

        if let Some(caps) = include_pattern().captures(trimmed) {
            let path_str = &caps["path"];
            let resolved = match dir {
                Some(d) => d.join(path_str),
                None => PathBuf::from(path_str),
            };

            if stack.contains(&resolved) {
                // Cycle: include nothing for this occurrence.
                continue;
            }

            match std::fs::read_to_string(&resolved) {
                Ok(included_text) => {
                    stack.push(resolved.clone());
                    out.push(Line::new(origin.clone(), ".push_locblk"));
                    out.push(Line::new(origin.clone(), ".dbgbrk"));
                    let included_dir = resolved.parent().map(Path::to_path_buf);
                    let included_file: Rc<str> = Rc::from(resolved.to_string_lossy().as_ref());
                    out.extend(load_lines(
                        &included_text,
                        included_file,
                        included_dir.as_deref(),
                        stack,
                        Some(line_number),
                    ));
                    out.push(Line::new(origin.clone(), ".dbgbrk"));
                    out.push(Line::new(origin, ".pop_locblk"));
                    stack.pop();
                }
                Err(_) => {
                    out.push(Line::new(
                        origin,
                        format!("!!!File '{}' not found", path_str),
                    ));
                }
            }
            continue;
        }

        out.push(Line::new(origin, trimmed.to_string()));
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_and_trims_lines() {
        let lines = load_source("  mov r5 r6  \n\nnop\n", None);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "mov r5 r6");
        assert_eq!(lines[1].text, "");
        assert_eq!(lines[2].text, "nop");
    }

    #[test]
    fn missing_include_becomes_error_marker_line() {
        let lines = load_source(".include nope.asm", None);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].text.starts_with("!!!File 'nope.asm' not found"));
    }

    #[test]
    fn self_including_file_does_not_loop_forever() {
        let dir = std::env::temp_dir().join(format!("masm_cycle_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file_path = dir.join("a.asm");
        std::fs::write(&file_path, ".include a.asm\nnop\n").unwrap();

        let text = std::fs::read_to_string(&file_path).unwrap();
        let lines = load_source(&text, Some(&dir));
        assert!(lines.iter().any(|l| l.text == "nop"));

        std::fs::remove_dir_all(&dir).ok();
    }
}

//! Whole-pipeline integration tests: source text in, binary image (and
//! listing) out.

#[test]
fn assembles_a_small_program_to_the_expected_image() {
    let source = "\
start:
    mov #0x4400 sp
    mov #5 r4
loop:
    dec r4
    jnz loop
    reti
";
    let out = masm::assemble(source, None, 0, false, false);
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    assert!(out.compile_errors.is_empty(), "{:?}", out.compile_errors);

    let image = out.image.unwrap();
    let code = image.segments.iter().find(|s| s.start_address == 0).unwrap();
    assert!(code.words.len() >= 6);

    let startup = image.segments.iter().find(|s| s.start_address == 0xFFFE).unwrap();
    assert_eq!(startup.words, vec![0]);
}

#[test]
fn listing_contains_all_three_sections_for_a_labeled_program() {
    let source = "start: mov #1 r5\n    reti\n";
    let out = masm::assemble(source, None, 0, true, false);
    let listing = out.listing.unwrap();
    assert!(listing.contains("|Labels|"));
    assert!(listing.contains("|Code|"));
    assert!(listing.contains("|Line Map|"));
    assert!(listing.contains("start"));
}

#[test]
fn macro_invocation_expands_before_compilation() {
    let source = "\
.macro double(dst)
    add {dst} {dst}
.endmacro
mov #3 r5
double(r5)
reti
";
    let out = masm::assemble(source, None, 0, false, false);
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    let image = out.image.unwrap();
    let code = image.segments.iter().find(|s| s.start_address == 0).unwrap();
    // mov #3,r5 (2 words) + add r5,r5 (1 word) + reti (1 word)
    assert_eq!(code.words.len(), 4);
}

#[test]
fn unresolved_label_is_reported_as_a_compile_error_not_a_panic() {
    let source = "jmp nowhere\n";
    let out = masm::assemble(source, None, 0, false, false);
    assert!(out.image.is_none());
    assert!(!out.compile_errors.is_empty());
}

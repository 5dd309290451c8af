#[macro_use]
extern crate clap;

use std::path::{Path, PathBuf};

use clap::{Arg, ArgGroup};
use msp430::constants;
use msp430::processor::{run, Cpu};

const MAX_STEPS: u64 = 10_000_000;

#[derive(Debug)]
enum Error {
    Io(std::io::Error, PathBuf),
    Image(mimage::ImageError, PathBuf),
    Assemble(Vec<String>),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, path) => write!(f, "reading \"{}\" failed: {}", path.display(), err),
            Error::Image(err, path) => write!(f, "reading image \"{}\" failed: {}", path.display(), err),
            Error::Assemble(messages) => {
                writeln!(f, "assembly failed:")?;
                for m in messages {
                    writeln!(f, "{}", m)?;
                }
                Ok(())
            }
        }
    }
}

fn main() {
    env_logger::init();

    let matches = app_from_crate!()
        .arg(Arg::with_name("PROGRAM").help("Binary image to run").index(1))
        .arg(
            Arg::with_name("assembly")
                .short("a")
                .long("assembly")
                .takes_value(true)
                .value_name("ASSEMBLY")
                .help("Assembly source to assemble and run, instead of a binary image"),
        )
        .group(ArgGroup::with_name("input").args(&["PROGRAM", "assembly"]).required(true))
        .arg(
            Arg::with_name("memory")
                .short("m")
                .long("memory")
                .takes_value(true)
                .value_name("BYTES")
                .default_value("65536")
                .help("Memory size in bytes; the core uses a fixed 64 KiB address space, so anything else is rejected with a warning"),
        )
        .arg(Arg::with_name("special_interrupts").long("special-interrupts").help("Enable the 0x0010 trap"))
        .arg(Arg::with_name("silent").long("silent").help("Suppress debug prints from the core"))
        .get_matches();

    let result = run_cli(&matches);
    if let Err(err) = result {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn run_cli(matches: &clap::ArgMatches) -> Result<(), Error> {
    let requested_memory = value_t!(matches.value_of("memory"), u32).unwrap_or(constants::MEMORY_SIZE as u32);
    if requested_memory != constants::MEMORY_SIZE as u32 {
        log::warn!(
            "requested memory size {} ignored; the core always runs with a fixed {}-byte address space",
            requested_memory,
            constants::MEMORY_SIZE
        );
    }

    let image = match matches.value_of("PROGRAM") {
        Some(path) => load_image(Path::new(path))?,
        None => {
            let asm_path = matches.value_of("assembly").unwrap();
            assemble_image(Path::new(asm_path))?
        }
    };

    let mut cpu = Cpu::new();
    cpu.silent = matches.is_present("silent");
    cpu.special_interrupts = matches.is_present("special_interrupts");

    for segment in &image.segments {
        cpu.mem
            .load_words(segment.start_address, &segment.words)
            .expect("image segments were produced by a compliant assembler");
    }

    let startup = cpu.mem.read_word(constants::STARTUP_VECTOR_ADDRESS).unwrap_or(0);
    cpu.regs.set_pc(startup).expect("startup vector must be word-aligned");

    let (executed, error) = run(&mut cpu, MAX_STEPS);

    println!("Executed {} instruction(s)", executed);
    match error {
        Some(err) => println!("Stopped: {}", err),
        None => println!("Stopped: step budget of {} reached without error", MAX_STEPS),
    }
    println!("PC=0x{:04X} SP=0x{:04X} SR=0x{:04X}", cpu.regs.pc(), cpu.regs.sp(), cpu.regs.sr());

    Ok(())
}

fn load_image(path: &Path) -> Result<mimage::Image, Error> {
    mimage::Image::read_file(path).map_err(|err| Error::Image(err, path.to_owned()))
}

fn assemble_image(path: &Path) -> Result<mimage::Image, Error> {
    let source = std::fs::read_to_string(path).map_err(|err| Error::Io(err, path.to_owned()))?;
    let dir = path.parent();
    let out = masm::assemble(&source, dir, 0, false, false);

    if !out.diagnostics.is_empty() || !out.compile_errors.is_empty() {
        let mut messages: Vec<String> = out.diagnostics.iter().map(|d| d.to_string()).collect();
        messages.extend(out.compile_errors.iter().map(|e| e.to_string()));
        return Err(Error::Assemble(messages));
    }

    Ok(out.image.expect("no diagnostics means an image was produced"))
}

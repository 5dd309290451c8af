#[macro_use]
extern crate clap;

use std::fs::File;
use std::io::prelude::*;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use byteorder::WriteBytesExt;
use clap::Arg;
use mutil::Endian;

#[derive(Debug)]
enum IoContext {
    ReadInput,
    WriteOutput,
}

#[derive(Debug)]
enum Error {
    Io(std::io::Error, IoContext, PathBuf),
    Image(mimage::ImageError, PathBuf),
    Diagnostics(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, context, path) => write!(
                f,
                "{} file \"{}\" failed: {}",
                match context {
                    IoContext::ReadInput => "reading",
                    IoContext::WriteOutput => "writing",
                },
                path.display(),
                err
            ),
            Error::Image(err, path) => write!(f, "writing image \"{}\" failed: {}", path.display(), err),
            Error::Diagnostics(n) => write!(f, "assembly produced {} diagnostic(s)", n),
        }
    }
}

fn main() {
    env_logger::init();

    let matches = app_from_crate!()
        .arg(Arg::with_name("INPUT").help("Source file to assemble; reads stdin if omitted").index(1))
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT")
                .help("Path to write the binary image to"),
        )
        .arg(Arg::with_name("list").short("l").long("list").help("Also write a listing"))
        .arg(
            Arg::with_name("source_map")
                .short("m")
                .long("source-map")
                .takes_value(true)
                .value_name("SOURCE_MAP")
                .help("Path to write a binary source map to"),
        )
        .arg(
            Arg::with_name("base64")
                .long("base64")
                .help("Reads stdin, writes base64 of the image (or <FAILURE>) to stdout"),
        )
        .arg(
            Arg::with_name("debug")
                .long("debug")
                .help("With --base64, also print a hex dump of the image"),
        )
        .get_matches();

    let result = if matches.is_present("base64") {
        run_base64(matches.is_present("debug"), matches.is_present("list"))
    } else {
        run_file(
            matches.value_of("INPUT"),
            matches.value_of("output"),
            matches.is_present("list"),
            matches.value_of("source_map"),
        )
    };

    if let Err(err) = result {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn read_source(input: Option<&str>) -> Result<(String, Option<PathBuf>), Error> {
    match input {
        Some(path) => {
            let path = Path::new(path);
            let mut text = String::new();
            File::open(path)
                .and_then(|mut f| f.read_to_string(&mut text))
                .map_err(|err| Error::Io(err, IoContext::ReadInput, path.to_owned()))?;
            Ok((text, Some(path.to_owned())))
        }
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .map_err(|err| Error::Io(err, IoContext::ReadInput, PathBuf::from("<stdin>")))?;
            Ok((text, None))
        }
    }
}

fn run_file(
    input: Option<&str>,
    output: Option<&str>,
    want_list: bool,
    source_map: Option<&str>,
) -> Result<(), Error> {
    let (source, input_path) = read_source(input)?;
    let dir = input_path.as_deref().and_then(Path::parent);

    let out = masm::assemble(&source, dir, 0, want_list, source_map.is_some());

    if !out.diagnostics.is_empty() || !out.compile_errors.is_empty() {
        for d in &out.diagnostics {
            eprintln!("{}", d);
        }
        for e in &out.compile_errors {
            eprintln!("{}", e);
        }
        return Err(Error::Diagnostics(out.diagnostics.len() + out.compile_errors.len()));
    }

    let image = out.image.expect("no diagnostics means an image was produced");

    let output_path: PathBuf = match output {
        Some(path) => PathBuf::from(path),
        None => match &input_path {
            Some(path) => path.with_extension("img"),
            None => PathBuf::from("a.img"),
        },
    };
    image
        .write_file(&output_path)
        .map_err(|err| Error::Image(err, output_path.clone()))?;

    if let Some(listing) = &out.listing {
        let listing_path = output_path.with_extension("lst");
        std::fs::write(&listing_path, listing)
            .map_err(|err| Error::Io(err, IoContext::WriteOutput, listing_path))?;
    }

    if let Some(map_path) = source_map {
        let map_path = PathBuf::from(map_path);
        write_source_map(&out.trace.unwrap_or_default(), &map_path)
            .map_err(|err| Error::Io(err, IoContext::WriteOutput, map_path))?;
    }

    Ok(())
}

/// Binary source map: one `(line_number: u32, address: u32)` record per
/// instruction that produced at least one word.
fn write_source_map(trace: &[masm::CompiledInstruction], path: &Path) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for instr in trace {
        if instr.words.is_empty() {
            continue;
        }
        writer.write_u32::<Endian>(instr.instruction.origin().line_number)?;
        writer.write_u32::<Endian>(instr.pc as u32)?;
    }
    Ok(())
}

/// The legacy glue surface (§6.6): reads stdin, writes base64 of the
/// assembled image (or the literal `<FAILURE>`) to stdout.
fn run_base64(debug: bool, want_list: bool) -> Result<(), Error> {
    let (source, _) = read_source(None)?;
    let out = masm::assemble(&source, None, 0, want_list, false);

    if !out.diagnostics.is_empty() || !out.compile_errors.is_empty() {
        println!("<FAILURE>");
        return Ok(());
    }

    let image = out.image.expect("no diagnostics means an image was produced");
    let mut bytes = Vec::new();
    image
        .write(&mut bytes)
        .expect("writing to an in-memory buffer cannot fail");

    if debug {
        for chunk in bytes.chunks(16) {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
            eprintln!("{}", hex.join(" "));
        }
    }

    println!("{}", base64::encode(&bytes));

    if want_list {
        if let Some(listing) = &out.listing {
            println!("{}", listing);
        }
    }

    Ok(())
}

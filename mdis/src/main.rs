#[macro_use]
extern crate clap;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Arg;

#[derive(Debug)]
enum Error {
    Image(mimage::ImageError, PathBuf),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Image(err, path) => write!(f, "reading image \"{}\" failed: {}", path.display(), err),
        }
    }
}

fn main() {
    env_logger::init();

    let matches = app_from_crate!()
        .arg(Arg::with_name("INPUT").help("Binary image to disassemble").required(true).index(1))
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();

    if let Err(err) = run(input) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn run(input: &str) -> Result<(), Error> {
    let path = Path::new(input);
    let image = mimage::Image::read_file(path).map_err(|err| Error::Image(err, path.to_owned()))?;

    log::debug!("loaded {} segment(s) from {}", image.segments.len(), path.display());

    let labels: HashMap<u16, String> = HashMap::new();

    for segment in &image.segments {
        println!("; segment at 0x{:04X}", segment.start_address);
        print!("{}", mdis::disassemble(&segment.words, segment.start_address, &labels));
        println!();
    }

    Ok(())
}

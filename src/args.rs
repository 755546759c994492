use clap::{Arg, Command};
use clap::{crate_authors, crate_description, crate_name, crate_version};
use hprof_strip::HprofStripError::InputFileNotFound;
use hprof_strip::{Compression, HprofStripError, default_output_path};
use std::path::{Path, PathBuf};

fn command() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .author(crate_authors!("\n"))
        .about(crate_description!())
        .arg(
            Arg::new("inputFile")
                .help("binary hprof input file")
                .long("inputFile")
                .short('i')
                .num_args(1)
                .required(true),
        )
        .arg(
            Arg::new("outputFile")
                .help("stripped output file (defaults to <input>_stripped.hprof.<zstd|gz>)")
                .long("outputFile")
                .short('o')
                .num_args(1)
                .required(false),
        )
        .arg(
            Arg::new("compression")
                .help("output container")
                .long("compression")
                .short('c')
                .num_args(1)
                .default_value("auto")
                .value_parser(["auto", "zstd", "gzip"])
                .required(false),
        )
        .arg(
            Arg::new("debug")
                .help("debug info")
                .long("debug")
                .short('d')
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .help("additional JSON summary in file")
                .long("json")
                .action(clap::ArgAction::SetTrue),
        )
}

pub fn get_args() -> Result<Args, HprofStripError> {
    let matches = command().try_get_matches()?;

    let input_file = matches
        .get_one::<String>("inputFile")
        .expect("impossible")
        .trim();
    if !Path::new(&input_file).is_file() {
        return Err(InputFileNotFound {
            name: input_file.to_string(),
        });
    }

    let compression_name = matches
        .get_one::<String>("compression")
        .expect("impossible");
    let compression = Compression::from_name(compression_name).expect("impossible");

    let output_file = match matches.get_one::<String>("outputFile") {
        Some(output) => PathBuf::from(output.trim()),
        None => default_output_path(Path::new(input_file), compression),
    };

    let debug = matches.get_flag("debug");
    let json_output = matches.get_flag("json");
    let args = Args {
        input_file: PathBuf::from(input_file),
        output_file,
        compression,
        debug,
        json_output,
    };
    Ok(args)
}

pub struct Args {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub compression: Compression,
    pub debug: bool,
    pub json_output: bool,
}

#[cfg(test)]
mod args_tests {
    use crate::args::command;

    #[test]
    fn verify_command() {
        command().debug_assert();
    }

    #[test]
    fn rejects_unknown_compression() {
        let res = command().try_get_matches_from(["hprof-strip", "-i", "dump.hprof", "-c", "lz4"]);
        assert!(res.is_err());
    }

    #[test]
    fn compression_defaults_to_auto() {
        let matches = command()
            .try_get_matches_from(["hprof-strip", "-i", "dump.hprof"])
            .unwrap();
        assert_eq!(
            matches.get_one::<String>("compression").map(String::as_str),
            Some("auto")
        );
    }
}

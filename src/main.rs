mod args;
mod rendered_result;

use std::time::Instant;

use hprof_strip::{HprofStripError, StripOptions, strip_with};

use crate::args::Args;
use crate::args::get_args;
use crate::rendered_result::{render_summary, save_as_file};

fn main() {
    std::process::exit(match main_result() {
        Ok(()) => 0,
        Err(HprofStripError::ClapError { e }) => e.exit(),
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    });
}

fn main_result() -> Result<(), HprofStripError> {
    let now = Instant::now();
    let Args {
        input_file,
        output_file,
        compression,
        debug,
        json_output,
    } = get_args()?;
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let options = StripOptions {
        compression,
        show_progress: true,
    };
    let summary = strip_with(&input_file, &output_file, &options)?;
    if json_output {
        save_as_file(&summary)?;
    }
    print!("{}", render_summary(&summary));
    println!("File successfully stripped in {:?}", now.elapsed());
    Ok(())
}

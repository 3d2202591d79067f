use std::path::PathBuf;
use std::process;

use clap::Parser;

use flowsort::sort::{parse_buffer_size, parse_fields, sort_and_output, SortConfig};

#[derive(Parser)]
#[command(name = "fflowsort", about = "Sort fixed-size network flow records")]
struct Cli {
    /// Field(s) to sort over, in order of precedence (e.g. sip,dport,stime)
    #[arg(long = "fields", value_name = "FIELDS", required = true)]
    fields: String,

    /// Reverse the sort order
    #[arg(long = "reverse")]
    reverse: bool,

    /// Assume input files are already sorted by the same fields; merge only
    #[arg(long = "presorted-input")]
    presorted_input: bool,

    /// Maximum memory for the record buffer (e.g. 512M, 2G)
    #[arg(long = "sort-buffer-size", value_name = "SIZE")]
    sort_buffer_size: Option<String>,

    /// Use DIR for temporary files, not the system temp directory
    #[arg(long = "temp-directory", short = 'T', value_name = "DIR")]
    temp_directory: Option<PathBuf>,

    /// Write result to FILE instead of standard output
    #[arg(long = "output-path", short = 'o', value_name = "FILE")]
    output_path: Option<PathBuf>,

    /// Flow record streams to sort ('-' for standard input)
    files: Vec<String>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let fields = match parse_fields(&cli.fields) {
        Ok(fields) => fields,
        Err(e) => {
            eprintln!("fflowsort: invalid fields '{}': {}", cli.fields, e);
            process::exit(2);
        }
    };

    let mut config = SortConfig {
        fields,
        reverse: cli.reverse,
        presorted_input: cli.presorted_input,
        temp_dir: cli.temp_directory,
        output_path: cli.output_path,
        ..SortConfig::default()
    };

    if let Some(ref size) = cli.sort_buffer_size {
        match parse_buffer_size(size) {
            Ok(bytes) => config.sort_buffer_size = bytes,
            Err(e) => {
                eprintln!("fflowsort: {}", e);
                process::exit(2);
            }
        }
    }

    if let Err(e) = sort_and_output(&cli.files, &config) {
        eprintln!("fflowsort: {}", e);
        process::exit(1);
    }
}

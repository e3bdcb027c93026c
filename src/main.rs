use std::fs;
use std::io::{self, prelude::*};
use std::path;
use std::process;

use bytesize::ByteSize;
use env_logger;
use log;

use csv_ext_sort::{ExternalSorter, ExternalSorterBuilder, Order, SortKey};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: log::LevelFilter = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let order: Order = arg_parser.value_of_t_or_exit("sort");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let memory_limit = arg_parser.value_of("memory_limit").expect("value is required");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));
    let delimiter = arg_parser.value_of("delimiter").expect("value is required");

    let sort_key = match SortKey::parse(arg_parser.value_of("fields_order").unwrap_or_default()) {
        Ok(sort_key) => sort_key.with_order(order),
        Err(err) => {
            log::error!("{}", err);
            process::exit(1);
        }
    };

    let input_stream: Box<dyn Read> = match arg_parser.value_of("input") {
        Some(input) => match fs::File::open(input) {
            Ok(file) => Box::new(io::BufReader::new(file)),
            Err(err) => {
                log::error!("input file opening error: {}", err);
                process::exit(1);
            }
        },
        None => Box::new(io::stdin().lock()),
    };

    let output_stream: Box<dyn Write> = match arg_parser.value_of("output") {
        Some(output) => match fs::File::create(output) {
            Ok(file) => Box::new(io::BufWriter::new(file)),
            Err(err) => {
                log::error!("output file creation error: {}", err);
                process::exit(1);
            }
        },
        None => Box::new(io::stdout().lock()),
    };

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_sort_key(sort_key)
        .with_header(arg_parser.is_present("header"))
        .with_flexible(arg_parser.is_present("flexible"))
        .with_delimiter(delimiter.as_bytes()[0])
        .with_memory_limit(
            memory_limit
                .parse::<ByteSize>()
                .expect("value is pre-validated")
                .as_u64(),
        );

    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let sorter: ExternalSorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    match sorter.sort(input_stream, output_stream) {
        Ok(summary) => log::info!("sorted {} rows using {} runs", summary.rows, summary.runs),
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::Command::new("csv-ext-sort")
        .about("external csv sorter")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted, standard input if not set")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file, standard output if not set")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("fields_order")
                .short('k')
                .long("fields-order")
                .help("comma separated list of 0-based key columns, for example 0,2,3 or 1,0")
                .takes_value(true)
                .default_value("0"),
        )
        .arg(
            clap::Arg::new("header")
                .long("header")
                .help("exclude the first record from sorting"),
        )
        .arg(
            clap::Arg::new("flexible")
                .long("flexible")
                .help("allow records with different number of fields"),
        )
        .arg(
            clap::Arg::new("delimiter")
                .long("delimiter")
                .help("field delimiter")
                .takes_value(true)
                .default_value(",")
                .validator(|v| match v.len() {
                    1 => Ok(()),
                    _ => Err(format!("delimiter must be a single byte: {:?}", v)),
                }),
        )
        .arg(
            clap::Arg::new("sort")
                .short('s')
                .long("sort")
                .help("sorting order")
                .takes_value(true)
                .default_value("asc")
                .possible_values(["asc", "desc"]),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(["off", "error", "warn", "info", "debug", "trace"]),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel sorting")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("memory_limit")
                .short('m')
                .long("mem")
                .help("memory limit")
                .takes_value(true)
                .default_value("256MiB")
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(size) if size.as_u64() > 0 => Ok(()),
                    Ok(_) => Err("Memory limit must be positive".to_string()),
                    Err(err) => Err(format!("Memory limit format incorrect: {}", err)),
                }),
        )
        .get_matches()
}

fn init_logger(log_level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();
}

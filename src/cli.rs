use std::path::PathBuf;

use clap::{App, Arg, ArgMatches};

use bosc::config::Settings;
use bosc::report::Format;
use bosc::sweep::{parse_range, Range};
use bosc::{Encoding, Error, Result};

fn validate_size_range(value: &str) -> Result<()> {
    parse_range::<usize>(value, 1)?.values().map(|_| ())
}

fn validate_threshold_range(value: &str) -> Result<()> {
    parse_range::<f64>(value, 0.1)?.values().map(|_| ())
}

fn validate_positive(value: &str) -> std::result::Result<(), String> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(()),
        _ => Err(format!("{:?} is not a positive integer", value)),
    }
}

pub fn build() -> App<'static> {
    App::new("bosc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Bag-of-system-calls anomaly detection over offline syscall traces")
        .disable_help_flag(true)
        .arg(
            Arg::new("show-help")
                .short('h')
                .long("help")
                .conflicts_with("input-file")
                .help("Print help information"),
        )
        .arg(
            Arg::new("input-file")
                .short('i')
                .long("input-file")
                .value_name("FILE")
                .takes_value(true)
                .required_unless_present("show-help")
                .help("Trace to train and test on"),
        )
        .arg(
            Arg::new("database-file")
                .short('b')
                .long("database-file")
                .value_name("FILE")
                .takes_value(true)
                .help("Normal-profile dump to start training from"),
        )
        .arg(
            Arg::new("syscalls")
                .short('s')
                .long("syscalls")
                .value_name("FILE")
                .takes_value(true)
                .help("Syscall index, one name per line (default ./syscalls)"),
        )
        .arg(
            Arg::new("epoch-size")
                .short('e')
                .long("epoch-size")
                .value_name("RANGE")
                .takes_value(true)
                .validator(validate_size_range)
                .help("Range for epoch size, min:max:step"),
        )
        .arg(
            Arg::new("train-threshold")
                .short('t')
                .long("train-threshold")
                .value_name("RANGE")
                .takes_value(true)
                .validator(validate_threshold_range)
                .help("Range for training threshold"),
        )
        .arg(
            Arg::new("detection-threshold")
                .short('d')
                .long("detection-threshold")
                .value_name("RANGE")
                .takes_value(true)
                .validator(validate_threshold_range)
                .help("Range for detection threshold"),
        )
        .arg(
            Arg::new("train-epochs")
                .short('n')
                .long("train-epochs")
                .value_name("N")
                .takes_value(true)
                .validator(|v| v.parse::<usize>().map(|_| ()))
                .help("Maximum number of epochs used for training"),
        )
        .arg(
            Arg::new("pattern-width")
                .short('w')
                .long("pattern-width")
                .value_name("W")
                .takes_value(true)
                .validator(validate_positive)
                .help("Sliding window width"),
        )
        .arg(
            Arg::new("encoding")
                .long("encoding")
                .takes_value(true)
                .possible_values(["sequence", "bag"])
                .help("Pattern encoding"),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .value_name("N")
                .takes_value(true)
                .validator(validate_positive)
                .help("Grid points evaluated in parallel"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .value_name("LEVEL")
                .takes_value(true)
                .validator(|v| v.parse::<u8>().map(|_| ()))
                .help("Verbose level (default 0)"),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .long("output-file")
                .value_name("FILE")
                .takes_value(true)
                .help("Output file path"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .takes_value(true)
                .possible_values(["text", "json"])
                .help("Report format"),
        )
        .arg(
            Arg::new("dump-dir")
                .long("dump-dir")
                .value_name("DIR")
                .takes_value(true)
                .help("Write each trained normal profile into DIR"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .takes_value(true)
                .help("JSON settings file"),
        )
}

/// `-h/--help` was given. It conflicts with `--input-file`; usage is printed by the caller.
pub fn wants_help(matches: &ArgMatches) -> bool {
    matches.is_present("show-help")
}

/// Command-line values. Everything but the input file is optional so that a config file can
/// supply it.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub input: PathBuf,
    pub database: Option<PathBuf>,
    pub syscalls: Option<PathBuf>,
    pub epoch_size: Option<Range<usize>>,
    pub train_threshold: Option<Range<f64>>,
    pub test_threshold: Option<Range<f64>>,
    pub train_epochs: Option<usize>,
    pub pattern_width: Option<usize>,
    pub encoding: Option<Encoding>,
    pub jobs: Option<usize>,
    pub verbosity: u8,
    pub output: Option<PathBuf>,
    pub format: Option<Format>,
    pub dump_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

fn number<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
    matches
        .value_of(name)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| Error::InvalidConfig(format!("--{}: {:?}", name, v)))
        })
        .transpose()
}

impl Options {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let path = |name: &str| matches.value_of(name).map(PathBuf::from);
        Ok(Options {
            input: path("input-file").unwrap_or_default(),
            database: path("database-file"),
            syscalls: path("syscalls"),
            epoch_size: matches
                .value_of("epoch-size")
                .map(|v| parse_range(v, 1))
                .transpose()?,
            train_threshold: matches
                .value_of("train-threshold")
                .map(|v| parse_range(v, 0.1))
                .transpose()?,
            test_threshold: matches
                .value_of("detection-threshold")
                .map(|v| parse_range(v, 0.1))
                .transpose()?,
            train_epochs: number(matches, "train-epochs")?,
            pattern_width: number(matches, "pattern-width")?,
            encoding: matches.value_of("encoding").map(str::parse).transpose()?,
            jobs: number(matches, "jobs")?,
            verbosity: number(matches, "verbose")?.unwrap_or(0),
            output: path("output-file"),
            format: matches.value_of("format").map(str::parse).transpose()?,
            dump_dir: path("dump-dir"),
            config: path("config"),
        })
    }

    /// Overrides `settings` with every flag that was given.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(syscalls) = &self.syscalls {
            settings.syscalls = syscalls.clone();
        }
        if let Some(range) = self.epoch_size {
            settings.epoch_size = range;
        }
        if let Some(range) = self.train_threshold {
            settings.train_threshold = range;
        }
        if let Some(range) = self.test_threshold {
            settings.test_threshold = range;
        }
        if self.train_epochs.is_some() {
            settings.train_epochs = self.train_epochs;
        }
        if let Some(width) = self.pattern_width {
            settings.pattern_width = width;
        }
        if let Some(encoding) = self.encoding {
            settings.encoding = encoding;
        }
        if let Some(jobs) = self.jobs {
            settings.jobs = jobs;
        }
        if let Some(format) = self.format {
            settings.format = format;
        }
    }
}

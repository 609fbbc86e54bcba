mod cli;

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::process::exit;

use anyhow::{Context, Result};
use tracing::{info, trace, Level};

use bosc::config::Settings;
use bosc::report::{Reporter, Verbosity};
use bosc::{Error, FrequencyDatabase, StopSignal, Summary, Sweep, SweepConfig, SyscallIndex};
use cli::Options;

// clap exits with 2 on its own usage errors
const EXIT_USAGE: i32 = 2;
const EXIT_IO: i32 = 3;
const EXIT_DATA: i32 = 4;
const EXIT_INTERRUPTED: i32 = 130;

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Error>() {
        Some(Error::Io { .. }) => EXIT_IO,
        Some(Error::MalformedRecord { .. })
        | Some(Error::EmptyIndex { .. })
        | Some(Error::InvalidPattern(_))
        | Some(Error::Json(_)) => EXIT_DATA,
        Some(Error::InvalidRange(_)) | Some(Error::InvalidConfig(_)) => EXIT_USAGE,
        _ => 1,
    }
}

fn run(options: &Options) -> Result<Summary> {
    let mut settings = match &options.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("reading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    options.apply(&mut settings);
    settings.validate()?;
    let train_epochs = settings.train_epochs.ok_or_else(|| {
        Error::InvalidConfig("number of training epochs not set".to_string())
    })?;

    let index = SyscallIndex::load(&settings.syscalls).context("loading syscall index")?;
    info!("number of distinct system calls: {}", index.len());
    trace!("syscall index:\n{}", index);

    let seed = options
        .database
        .as_ref()
        .map(|path| FrequencyDatabase::load(path))
        .transpose()
        .context("loading normal profile")?;
    if let Some(seed) = &seed {
        info!("starting from a profile of {} patterns", seed.len());
    }

    if let Some(dir) = &options.dump_dir {
        fs::create_dir_all(dir).map_err(|e| Error::Io {
            path: dir.clone(),
            source: e,
        })?;
    }

    let stop = StopSignal::new();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.request()).context("installing Ctrl-C handler")?;
    }

    let config = SweepConfig {
        trace: options.input.clone(),
        grid: bosc::ParameterGrid {
            epoch_size: settings.epoch_size,
            train_threshold: settings.train_threshold,
            test_threshold: settings.test_threshold,
        },
        pattern_width: settings.pattern_width,
        encoding: settings.encoding,
        train_epochs,
        jobs: settings.jobs,
        dump_dir: options.dump_dir.clone(),
    };
    info!(
        "epoch size {}, train threshold {}, test threshold {}, {} encoding of width {}",
        settings.epoch_size,
        settings.train_threshold,
        settings.test_threshold,
        settings.encoding,
        settings.pattern_width
    );

    let verbosity = Verbosity::from_level(options.verbosity);
    let sweep = Sweep::new(&config, &index, seed.as_ref(), stop);
    let summary = match &options.output {
        Some(path) => {
            let file = File::create(path).map_err(|e| Error::Io {
                path: path.clone(),
                source: e,
            })?;
            let mut reporter =
                Reporter::new(BufWriter::new(file), verbosity, settings.format, path);
            sweep.run(&mut reporter)?
        }
        None => {
            let mut reporter =
                Reporter::new(io::stdout().lock(), verbosity, settings.format, "<stdout>");
            sweep.run(&mut reporter)?
        }
    };
    Ok(summary)
}

fn main() {
    // version and malformed arguments exit inside clap
    let matches = cli::build().get_matches();
    if cli::wants_help(&matches) {
        if let Err(e) = cli::build().print_help() {
            eprintln!("bosc: {}", e);
            exit(EXIT_IO);
        }
        println!();
        return;
    }
    let options = match Options::from_matches(&matches) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("error: {}", e);
            exit(EXIT_USAGE);
        }
    };
    init_logging(options.verbosity);

    match run(&options) {
        Ok(summary) if summary.interrupted => exit(EXIT_INTERRUPTED),
        Ok(_) => {}
        Err(e) => {
            eprintln!("bosc: {:#}", e);
            exit(exit_code(&e));
        }
    }
}

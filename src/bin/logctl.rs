//! logctl - inspect and edit a commit log directory.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use commitlog::{Config, Log, Record, RecordDecoder};

#[derive(Parser, Debug)]
#[command(name = "logctl")]
#[command(about = "Inspect and edit a commit log directory")]
struct Args {
    /// Log directory
    #[arg(short, long, default_value = "./data/log")]
    dir: PathBuf,

    /// Store size before a segment rolls over (0 = default)
    #[arg(long, default_value = "0")]
    max_store_bytes: u64,

    /// Index size before a segment rolls over (0 = default)
    #[arg(long, default_value = "0")]
    max_index_bytes: u64,

    /// First offset of a newly created log
    #[arg(long, default_value = "0")]
    initial_offset: u64,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print offset range and segment layout
    Info,
    /// Append a record and print its offset
    Append { value: String },
    /// Print the record at an offset
    Read { offset: u64 },
    /// Print every record in offset order
    Dump,
    /// Delete segments whose records are all at or below `lowest`
    Truncate { lowest: u64 },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::with_segment_limits(args.max_store_bytes, args.max_index_bytes);
    config.segment.initial_offset = args.initial_offset;

    info!("Opening log at {:?}", args.dir);
    let log = Log::open(&args.dir, config)?;
    let result = run(&log, args.command);
    log.close()?;
    result
}

fn run(log: &Log, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Info => {
            println!("dir:        {}", log.dir().display());
            println!("lowest:     {}", log.lowest_offset()?);
            println!("highest:    {}", log.highest_offset()?);
            println!("disk usage: {}B", log.disk_usage());
            for segment in log.segments() {
                println!(
                    "segment {:>10}: offsets [{}, {}), store {}B",
                    segment.base_offset,
                    segment.base_offset,
                    segment.next_offset,
                    segment.store_size
                );
            }
        }
        Command::Append { value } => {
            let offset = log.append(Record::new(value))?;
            println!("{}", offset);
        }
        Command::Read { offset } => {
            let record = log.read(offset)?;
            println!("{}\t{}", record.offset, String::from_utf8_lossy(&record.value));
        }
        Command::Dump => {
            for record in RecordDecoder::new(log.reader()) {
                let record = record?;
                println!("{}\t{}", record.offset, String::from_utf8_lossy(&record.value));
            }
        }
        Command::Truncate { lowest } => {
            log.truncate(lowest)?;
            println!("lowest offset now {}", log.lowest_offset()?);
        }
    }
    Ok(())
}

//! Command-line tool for indexed tar archives.
//!
//! `itarctl` builds indexes over single or sharded tar archives, checks them
//! against the archives on disk, and lists or extracts members through them.

mod config;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use humansize::{FormatSize, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use itar::{BuildProgress, IndexedTar, Payload, ShardSet};

use crate::config::CliConfig;

/// itarctl
#[derive(Debug, Parser)]
#[clap(name = "itarctl", version)]
pub struct App {
    /// Read shards with pread(2), so member readers can be used from several threads
    #[clap(long, global = true)]
    thread_safe: bool,

    /// Read defaults from a TOML configuration file
    #[clap(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use this archive instead of the layout-derived one (repeat once per shard, in order)
    #[clap(long = "shard", global = true, value_name = "PATH")]
    shards: Vec<PathBuf>,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan archives and write an index for them
    Create {
        /// Where to write the index
        index: PathBuf,
        /// Numbered shard archives, in order; detected next to the index if omitted
        archives: Vec<PathBuf>,
        /// Index one unsuffixed archive
        #[clap(long, conflicts_with = "archives")]
        single: Option<PathBuf>,
        /// Show a progress bar while scanning
        #[clap(long)]
        progress: bool,
    },
    /// Verify every member against the archives, printing each mismatch
    Check { index: PathBuf },
    /// Write the content of a member to standard output
    Cat { index: PathBuf, member: String },
    /// List members
    Ls {
        index: PathBuf,
        /// Show shard, offsets and size
        #[clap(short = 'l', long)]
        long: bool,
        /// Print sizes in powers of 1024
        #[clap(short = 'H', long)]
        human_readable: bool,
    },
    /// Decode and print the header of a member
    Info { index: PathBuf, member: String },
}

/// Advances a progress bar once per scanned shard.
struct ShardProgress(ProgressBar);

impl BuildProgress for ShardProgress {
    fn shard_finished(&self, _shard: usize, label: &str, members: usize) {
        self.0.set_message(format!("{label} ({members} members)"));
        self.0.inc(1);
    }
}

fn load_config(args: &App) -> Result<CliConfig> {
    match &args.config {
        Some(path) => CliConfig::load(path),
        None => Ok(CliConfig::default()),
    }
}

fn open_archive(args: &App, config: &CliConfig, index: &Path) -> Result<IndexedTar> {
    config
        .open_options(args.thread_safe, args.shards.clone())
        .open(index)
        .with_context(|| format!("opening index {}", index.display()))
}

fn create(
    args: &App,
    config: &CliConfig,
    index: &Path,
    archives: &[PathBuf],
    single: Option<&Path>,
    progress: bool,
) -> Result<()> {
    let explicit = if archives.is_empty() {
        &args.shards[..]
    } else {
        archives
    };
    let set = if let Some(single) = single {
        ShardSet::Single(single.to_path_buf())
    } else if !explicit.is_empty() {
        ShardSet::from_paths(index, explicit.to_vec())?
    } else {
        ShardSet::detect(index)?
    };

    let mut options = config.build_options();
    let bar = if progress {
        let bar = ProgressBar::new(set.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "[eta {eta}] {bar:40.cyan/blue} Scanning {pos} / {len} shards {msg}",
            )?
            .progress_chars("##-"),
        );
        options = options.progress(Arc::new(ShardProgress(bar.clone())));
        Some(bar)
    } else {
        None
    };

    let built = itar::create_with(index, &set, &options)
        .with_context(|| format!("creating index {}", index.display()));
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let built = built?;
    println!(
        "indexed {} members from {} shard(s) into {}",
        built.len(),
        set.len(),
        index.display()
    );
    Ok(())
}

fn check(archive: &IndexedTar) -> Result<ExitCode> {
    let failures = archive.verify_all()?;
    for failure in &failures {
        println!("{failure}");
    }
    if failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{} of {} members do not match", failures.len(), archive.len()?);
        Ok(ExitCode::from(1))
    }
}

fn cat(archive: &IndexedTar, member: &str) -> Result<()> {
    let mut reader = archive.open_member(member)?;
    let mut stdout = std::io::stdout().lock();
    std::io::copy(&mut reader, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}

fn ls(archive: &IndexedTar, long: bool, human_readable: bool) -> Result<()> {
    let index = archive.index()?;
    let mut stdout = std::io::stdout().lock();
    if !long {
        for name in index.names() {
            writeln!(stdout, "{name}")?;
        }
        return Ok(());
    }

    writeln!(
        stdout,
        "{:<40} {:>5} {:>12} {:>12} {:>10}",
        "member", "shard", "offset", "data", "size"
    )?;
    for (name, entry) in index.iter() {
        let shard = entry
            .shard_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let record = &entry.record;
        let size = size_column(&record.payload, human_readable);
        writeln!(
            stdout,
            "{name:<40} {shard:>5} {:>12} {:>12} {size:>10}",
            record.header_offset, record.data_offset
        )?;
    }
    Ok(())
}

fn size_column(payload: &Payload, human_readable: bool) -> String {
    match payload {
        Payload::Size(size) if human_readable => size.format_size(BINARY),
        Payload::Size(size) => size.to_string(),
        Payload::Target(target) => format!("-> {target}"),
    }
}

fn info(archive: &IndexedTar, member: &str) -> Result<()> {
    let entry = archive.info(member)?;
    println!("path:          {}", entry.path_lossy());
    println!("type:          {:?}", entry.entry_type);
    if let Some(target) = entry.link_target_lossy() {
        println!("link target:   {target}");
    }
    println!("size:          {}", entry.size);
    println!("stored size:   {}", entry.stored_size);
    println!("header offset: {}", entry.header_offset);
    println!("data offset:   {}", entry.data_offset);
    println!("mode:          {:04o}", entry.mode);
    if let Ok(Some((major, minor))) = entry.header.device() {
        println!("device:        {major},{minor}");
    }
    println!("uid/gid:       {}/{}", entry.uid, entry.gid);
    if let Some(uname) = &entry.uname {
        println!("user:          {}", String::from_utf8_lossy(uname));
    }
    if let Some(gname) = &entry.gname {
        println!("group:         {}", String::from_utf8_lossy(gname));
    }
    println!("mtime:         {}", entry.mtime);
    if let Some(chunks) = &entry.sparse {
        println!("sparse chunks: {}", chunks.len());
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    env_logger::init();

    let args = App::parse();
    let config = load_config(&args)?;

    match &args.cmd {
        Command::Create {
            index,
            archives,
            single,
            progress,
        } => create(&args, &config, index, archives, single.as_deref(), *progress)?,
        Command::Check { index } => return check(&open_archive(&args, &config, index)?),
        Command::Cat { index, member } => cat(&open_archive(&args, &config, index)?, member)?,
        Command::Ls {
            index,
            long,
            human_readable,
        } => ls(&open_archive(&args, &config, index)?, *long, *human_readable)?,
        Command::Info { index, member } => info(&open_archive(&args, &config, index)?, member)?,
    }
    Ok(ExitCode::SUCCESS)
}

//! quire CLI - compare and merge files region by region

mod config;
mod report;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quire_core::{
    Connective, DefaultVariant, ExternalDiff, FileMergeStore, FilterMode, JobKind, MemoryBuffer,
    MergeStore, QuitOptions, RegexpFilter, Session, SessionBuilder, SessionOptions, Step, Variant,
};
use report::Report;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(author, version, about = "Compare and merge files region by region")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare two or three files
    Diff {
        a: PathBuf,
        b: PathBuf,
        /// Third file for a 3-way comparison
        c: Option<PathBuf>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Merge two files, optionally against their common ancestor
    Merge {
        a: PathBuf,
        b: PathBuf,
        /// Common ancestor of A and B
        #[arg(long)]
        ancestor: Option<PathBuf>,
        /// Write the merge result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Content regions take when nothing else decides it
        #[arg(long, value_enum)]
        default: Option<CliDefault>,
        /// Report only regions where both sides changed the ancestor
        #[arg(long)]
        clashes_only: bool,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Use the external diff/diff3 programs
    #[arg(long)]
    external: bool,

    /// Treat lines differing only in whitespace as equal
    #[arg(long)]
    ignore_whitespace: bool,

    /// Treat lines differing only in case as equal
    #[arg(long)]
    ignore_case: bool,

    /// Report only regions whose VARIANT text matches REGEX (VARIANT=REGEX)
    #[arg(long, value_name = "VARIANT=REGEX", conflicts_with = "hide")]
    focus: Vec<String>,

    /// Skip regions whose VARIANT text matches REGEX (VARIANT=REGEX)
    #[arg(long, value_name = "VARIANT=REGEX")]
    hide: Vec<String>,

    /// How per-variant patterns combine
    #[arg(long, value_enum, default_value = "and")]
    connective: CliConnective,

    /// Skip regions that differ only in whitespace
    #[arg(long)]
    skip_similar: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliDefault {
    A,
    B,
    Combined,
}

impl From<CliDefault> for DefaultVariant {
    fn from(default: CliDefault) -> Self {
        match default {
            CliDefault::A => DefaultVariant::A,
            CliDefault::B => DefaultVariant::B,
            CliDefault::Combined => DefaultVariant::Combined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliConnective {
    And,
    Or,
}

impl From<CliConnective> for Connective {
    fn from(connective: CliConnective) -> Self {
        match connective {
            CliConnective::And => Connective::And,
            CliConnective::Or => Connective::Or,
        }
    }
}

/// Writes the merge result to stdout
struct StdoutStore;

impl MergeStore for StdoutStore {
    fn store(&mut self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let config = config::Config::load();

    match args.command {
        Command::Diff { a, b, c, common } => {
            let job = if c.is_some() {
                JobKind::Compare3
            } else {
                JobKind::Compare2
            };
            let options = session_options(&config, &common);
            let mut builder = Session::builder(job)
                .name(display_name(&[&a, &b]))
                .variant(Variant::A, read_variant(&a)?)
                .variant(Variant::B, read_variant(&b)?);
            if let Some(c) = &c {
                builder = builder.variant(Variant::C, read_variant(c)?);
            }
            let mut session = start(builder, &config, &common, options)?;

            let report = walk(&mut session)?;
            print_report(&mut io::stdout().lock(), &report, common.json || config.output.json)?;
            session.quit(QuitOptions::default())?;
        }
        Command::Merge {
            a,
            b,
            ancestor,
            output,
            default,
            clashes_only,
            common,
        } => {
            let job = if ancestor.is_some() {
                JobKind::MergeWithAncestor
            } else {
                JobKind::Merge
            };
            if clashes_only && ancestor.is_none() {
                anyhow::bail!("--clashes-only needs --ancestor");
            }
            let mut options = session_options(&config, &common);
            if let Some(default) = default {
                options.default_variant = default.into();
            }
            options.show_clashes_only = clashes_only;

            let mut builder = Session::builder(job)
                .name(display_name(&[&a, &b]))
                .variant(Variant::A, read_variant(&a)?)
                .variant(Variant::B, read_variant(&b)?);
            if let Some(ancestor) = &ancestor {
                builder = builder.variant(Variant::Ancestor, read_variant(ancestor)?);
            }
            let mut session = start(builder, &config, &common, options)?;

            let report = walk(&mut session)?;
            let json = common.json || config.output.json;
            match output {
                Some(path) => {
                    print_report(&mut io::stdout().lock(), &report, json)?;
                    let mut store = FileMergeStore::new(&path);
                    session
                        .quit(QuitOptions {
                            merge_store: Some(&mut store),
                            ..QuitOptions::default()
                        })
                        .context(format!("Failed to write merge result: {}", path.display()))?;
                }
                None => {
                    // The result owns stdout
                    print_report(&mut io::stderr().lock(), &report, json)?;
                    let mut store = StdoutStore;
                    session.quit(QuitOptions {
                        merge_store: Some(&mut store),
                        ..QuitOptions::default()
                    })?;
                }
            }
        }
    }

    Ok(())
}

fn session_options(config: &config::Config, common: &CommonArgs) -> SessionOptions {
    let mut options = config.session.clone();
    options.diff.ignore_whitespace |= common.ignore_whitespace;
    options.diff.ignore_case |= common.ignore_case;
    options.ignore_similar_regions |= common.skip_similar;
    options
}

fn display_name(paths: &[&PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn read_variant(path: &Path) -> Result<Box<MemoryBuffer>> {
    let text = std::fs::read_to_string(path)
        .context(format!("Failed to read: {}", path.display()))?;
    Ok(Box::new(MemoryBuffer::new(path.display().to_string(), text)))
}

fn start(
    builder: SessionBuilder,
    config: &config::Config,
    common: &CommonArgs,
    options: SessionOptions,
) -> Result<Session> {
    let mut builder = builder.options(options.clone());
    if common.external || config.tools.external {
        builder = builder.backend(Box::new(
            ExternalDiff::new()
                .with_programs(&config.tools.diff, &config.tools.diff3)
                .with_options(options.diff),
        ));
    }
    let mut session = builder.start().context("Failed to compute differences")?;

    if let Some(filter) = build_filter(common)? {
        session.set_regexp_filter(Some(filter))?;
    }
    Ok(session)
}

fn build_filter(common: &CommonArgs) -> Result<Option<RegexpFilter>> {
    let (mode, specs) = if !common.focus.is_empty() {
        (FilterMode::Focus, &common.focus)
    } else if !common.hide.is_empty() {
        (FilterMode::Hide, &common.hide)
    } else {
        return Ok(None);
    };

    let mut filter = RegexpFilter::new(mode).with_connective(common.connective.into());
    for spec in specs {
        let (name, pattern) = spec
            .split_once('=')
            .context(format!("Expected VARIANT=REGEX, got {spec:?}"))?;
        let variant = Variant::parse(name)
            .context(format!("Unknown variant {name:?} (use a, b or c)"))?;
        filter = filter
            .with_pattern(variant, pattern)
            .context(format!("Invalid pattern for {variant}"))?;
    }
    Ok(Some(filter))
}

/// Visit every region navigation stops at
fn walk(session: &mut Session) -> Result<Report> {
    let mut visited = Vec::new();
    if !session.registry().is_empty() {
        while let Step::Moved(n) = session.next(1)? {
            visited.push(n + 1);
        }
    }
    Ok(Report::new(session.status(), visited))
}

fn print_report(out: &mut dyn Write, report: &Report, json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", report.to_json()?)?;
    } else {
        write!(out, "{}", report.to_text())?;
    }
    Ok(())
}

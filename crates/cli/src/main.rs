use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use callprof_core::{process_profiles, raw, report, svg, viz};

#[derive(Parser)]
#[command(name = "callprof", version, about = "Inspect and merge callprof raw trace files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the records of one raw trace file.
    Dump { rawfile: PathBuf },
    /// Function totals table across one or more raw trace files.
    Totals {
        /// Write the table here instead of stdout.
        #[arg(short, long)]
        outfile: Option<PathBuf>,
        rawfiles: Vec<PathBuf>,
    },
    /// JSON call-tree node array for the visualization front end.
    Tree {
        #[arg(short, long)]
        outfile: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
        rawfiles: Vec<PathBuf>,
    },
    /// Standalone SVG icicle rendering of the merged call tree.
    Svg {
        #[arg(short, long)]
        outfile: Option<PathBuf>,
        /// Dark color palette.
        #[arg(long)]
        dark: bool,
        /// Pixel width of the drawing.
        #[arg(long, default_value_t = 1200.0)]
        width: f64,
        rawfiles: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Dump { rawfile } => {
            let mut out = BufWriter::new(io::stdout().lock());
            for record in raw::read_raw_file(&rawfile)? {
                let record = record?;
                writeln!(out, "{} {} {}", record.path, record.count, record.time)?;
            }
            out.flush()?;
        }
        Command::Totals { outfile, rawfiles } => {
            let merged = merge(&rawfiles)?;
            let mut out = out_stream(outfile)?;
            report::write_totals(&mut out, &merged.totals)?;
            out.flush()?;
        }
        Command::Tree {
            outfile,
            pretty,
            rawfiles,
        } => {
            let mut merged = merge(&rawfiles)?;
            viz::inject_self_nodes(&mut merged.nodes);
            let mut out = out_stream(outfile)?;
            report::write_tree_json(&mut out, &merged, pretty)?;
            out.flush()?;
        }
        Command::Svg {
            outfile,
            dark,
            width,
            rawfiles,
        } => {
            let mut merged = merge(&rawfiles)?;
            viz::inject_self_nodes(&mut merged.nodes);
            let rects = viz::layout_partition(&merged.nodes);
            let mut out = out_stream(outfile)?;
            out.write_all(svg::render_svg(&rects, width, dark).as_bytes())?;
            out.flush()?;
        }
    }
    Ok(())
}

fn merge(rawfiles: &[PathBuf]) -> Result<callprof_core::MergedProfile> {
    if rawfiles.is_empty() {
        bail!("no raw trace files to process");
    }
    process_profiles(rawfiles).context("merging raw trace files")
}

fn out_stream(outfile: Option<PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match outfile {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

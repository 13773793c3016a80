use std::path::PathBuf;
use std::process;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lcindex::config::{DEFAULT_PATTERN, DataConfig};
use lcindex::crossmatch::{DEFAULT_RADIUS_ARCSEC, Resolution, locate_sources_in_root, resolve_source};
use lcindex::index::{BuildOptions, FieldCalibration, SeamShift};
use lcindex::lightcurve::{DEFAULT_QUALITY_THRESHOLD, ReadOptions};
use lcindex::orchestrator::{BuildReport, run_local, run_worker};
use lcindex::reader::{LightcurveObject, Reader, locate_objects_in_root};
use lcindex::record::ObjectRecord;

#[derive(Parser)]
#[command(name = "lcindex", about = "Index and cross-match flat-file lightcurve archives")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build indices for every raw file under a data root.
    Build {
        /// Directory holding the raw files.
        root: PathBuf,

        /// Glob for raw file names within the root.
        #[arg(long, default_value = DEFAULT_PATTERN)]
        pattern: String,

        /// This worker's rank when several processes share the work.
        #[arg(long, default_value = "0", requires = "size")]
        rank: usize,

        /// Total number of cooperating worker processes.
        #[arg(long, conflicts_with = "workers")]
        size: Option<usize>,

        /// Number of local worker threads (ignored with --size).
        #[arg(long, default_value = "1")]
        workers: usize,

        /// Rebuild files whose indices already exist.
        #[arg(long)]
        overwrite: bool,

        /// Seam shift for a partition, e.g. "17=subtract" or "3=add". Can be
        /// repeated. Unlisted partitions are inferred.
        #[arg(long, value_parser = parse_seam)]
        seam: Vec<(u8, SeamShift)>,
    },

    /// Print one object and its lightcurve summary.
    Show {
        /// Raw file.
        file: PathBuf,

        /// Byte offset of the object's header (or its id with --id).
        key: u64,

        /// Interpret KEY as an object id.
        #[arg(long)]
        id: bool,

        /// Drop epochs with flags at or above this value.
        #[arg(long, default_value_t = DEFAULT_QUALITY_THRESHOLD)]
        threshold: u32,

        /// Keep every epoch regardless of flags.
        #[arg(long, conflicts_with = "threshold")]
        no_mask: bool,

        /// Source colour for the colour-term correction.
        #[arg(long, default_value = "0.0")]
        color: f64,

        /// Also print every epoch.
        #[arg(long)]
        epochs: bool,
    },

    /// Find objects (or sources) near a sky position across a data root.
    Locate {
        root: PathBuf,

        /// Right ascension, degrees.
        ra: f64,

        /// Declination, degrees.
        #[arg(allow_negative_numbers = true)]
        dec: f64,

        /// Search radius in arcseconds.
        #[arg(long, default_value_t = DEFAULT_RADIUS_ARCSEC)]
        radius: f64,

        #[arg(long, default_value = DEFAULT_PATTERN)]
        pattern: String,

        /// Group the results into multi-band sources.
        #[arg(long)]
        sources: bool,
    },

    /// Cross-match one object against the other bands of its partition.
    Resolve {
        file: PathBuf,

        /// Byte offset of the anchor object's header.
        offset: u64,

        /// Match radius in arcseconds.
        #[arg(long, default_value_t = DEFAULT_RADIUS_ARCSEC)]
        radius: f64,

        /// Append the nearest counterpart to the sibling file.
        #[arg(long)]
        save: bool,
    },

    /// Look up the recorded sibling of an object.
    Siblings {
        file: PathBuf,

        /// Byte offset of the object's header.
        offset: u64,
    },
}

fn parse_seam(s: &str) -> Result<(u8, SeamShift), String> {
    let (partition, shift) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PARTITION=SHIFT, got {s:?}"))?;
    let partition: u8 = partition
        .trim()
        .parse()
        .map_err(|_| format!("invalid partition {partition:?}"))?;
    let shift = match shift.trim() {
        "none" => SeamShift::None,
        "subtract" => SeamShift::SubtractAbove180,
        "add" => SeamShift::AddBelow180,
        other => return Err(format!("unknown shift {other:?} (none, subtract, add)")),
    };
    Ok((partition, shift))
}

fn describe(rec: &ObjectRecord) -> String {
    format!(
        "id {} | {} | field {} partition {} | ra/dec ({:.6}, {:.6}) | offset {}",
        rec.id, rec.band, rec.field_id, rec.partition_id, rec.ra, rec.dec, rec.byte_offset
    )
}

fn print_resolution(res: &Resolution) {
    println!(
        "source at ({:.6}, {:.6}) with {} member(s)",
        res.source.ra,
        res.source.dec,
        res.source.len()
    );
    for m in res.source.members() {
        println!("  {}", describe(m));
    }
    for w in &res.warnings {
        println!(
            "  warning: {} candidates in {}, kept id {}",
            w.candidates, w.band, w.chosen
        );
    }
}

fn print_report(report: &BuildReport) {
    println!(
        "{} built, {} skipped, {} failed",
        report.built.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for f in &report.failed {
        println!("  {}: {}", f.path.display(), f.error);
    }
}

fn show(obj: &LightcurveObject, epochs: bool) -> anyhow::Result<()> {
    println!("{}", describe(&obj.record));
    let lc = obj.lightcurve().context("failed to read lightcurve")?;
    let s = lc.summary();
    println!(
        "{} of {} epochs pass quality cuts | mag median {:.3} std {:.3} | flux median {:.3} std {:.3}",
        lc.len(),
        obj.record.epoch_count,
        s.mag_median,
        s.mag_std,
        s.flux_median,
        s.flux_std
    );
    if epochs {
        for i in 0..lc.len() {
            println!(
                "  {:.5} {:.4} {:.4} {}",
                lc.times()[i],
                lc.mags()[i],
                lc.mag_errs()[i],
                lc.quality_flags()[i]
            );
        }
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Build {
            root,
            pattern,
            rank,
            size,
            workers,
            overwrite,
            seam,
        } => {
            let config = DataConfig::new(root).with_pattern(pattern);
            let calibration = seam
                .into_iter()
                .fold(FieldCalibration::new(), |c, (p, s)| c.with(p, s));
            let options = BuildOptions {
                overwrite,
                calibration,
            };
            let report = match size {
                Some(size) => {
                    if rank >= size {
                        bail!("rank {rank} must be below size {size}");
                    }
                    run_worker(&config, rank, size, &options)?
                }
                None => run_local(&config, workers, &options)?,
            };
            print_report(&report);
            if !report.is_success() {
                process::exit(2);
            }
        }

        Commands::Show {
            file,
            key,
            id,
            threshold,
            no_mask,
            color,
            epochs,
        } => {
            let options = ReadOptions {
                quality_threshold: (!no_mask).then_some(threshold),
                color,
            };
            let obj = if id {
                let reader = Reader::open(&file)?;
                reader.object(key, &options)?
            } else {
                lcindex::reader::read_object(&file, key, &options)
                    .with_context(|| format!("failed to read {}", file.display()))?
            };
            show(&obj, epochs)?;
        }

        Commands::Locate {
            root,
            ra,
            dec,
            radius,
            pattern,
            sources,
        } => {
            let config = DataConfig::new(root).with_pattern(pattern);
            if sources {
                let found = locate_sources_in_root(&config, ra, dec, radius)?;
                if found.is_empty() {
                    println!("no sources within {radius}\"");
                }
                for res in &found {
                    print_resolution(res);
                }
            } else {
                let found = locate_objects_in_root(&config, ra, dec, radius)?;
                if found.is_empty() {
                    println!("no objects within {radius}\"");
                }
                for obj in &found {
                    println!(
                        "{} | {:.3}\" | {}",
                        obj.raw.display(),
                        obj.separation_arcsec,
                        describe(&obj.record)
                    );
                }
            }
        }

        Commands::Resolve {
            file,
            offset,
            radius,
            save,
        } => {
            let reader = Reader::open(&file)?;
            let anchor = reader.header(offset)?;
            let res = resolve_source(&reader, &anchor, radius)?;
            print_resolution(&res);
            if save {
                match reader.locate_sibling(&anchor, radius, false)? {
                    Some(sibling) => println!(
                        "sibling saved to {}: {}",
                        reader.paths().siblings.display(),
                        describe(&sibling)
                    ),
                    None => println!("no sibling to save"),
                }
            }
        }

        Commands::Siblings { file, offset } => {
            let reader = Reader::open(&file)?;
            match reader.sibling_file().lookup(offset)? {
                Some(partner) => println!("{}", describe(&reader.header(partner)?)),
                None => println!("no sibling recorded for offset {offset}"),
            }
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lcindex=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

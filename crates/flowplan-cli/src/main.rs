use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use flowplan_model::{
    Artifact, Config, FeasibilityStatus, Pipeline, StatusRecord, Table, UploadInfo, Workbook,
    input_template,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowplan")]
#[command(about = "Plan supply network flows with mixed-integer programming", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Storage namespace to work in
    #[arg(short, long, global = true, default_value = "default")]
    user: String,
    /// Output format for status objects
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Pretty)]
    format: Format,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workbook and store it as the current input
    Upload {
        /// Workbook archive to upload
        workbook: PathBuf,
        /// Client address recorded in the status trail
        #[arg(long)]
        origin: Option<String>,
    },
    /// Re-run the feasibility checks on the stored input
    Check,
    /// Solve the stored input and write the plot and output reports
    Solve {
        /// Solver backend (cbc, glpk, microlp); defaults to the configured one
        #[arg(short, long)]
        solver: Option<String>,
        /// Solve even when a feasibility check fails
        #[arg(long)]
        force: bool,
    },
    /// Download a stored artifact
    Fetch {
        /// input, error, output, plot or input-template
        artifact: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write an empty upload workbook
    Template {
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Pack a directory of <table>.csv files into an upload workbook
    Pack {
        dir: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flowplan=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Ok(false) when a stage blocks progression
fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => {
            let mut config = Config::default();
            config.apply_env();
            config
        }
    };

    match cli.command {
        Commands::Upload { workbook, origin } => {
            let pipeline = Pipeline::new(&config, &cli.user)?;
            let bytes = fs::read(&workbook)
                .with_context(|| format!("reading {}", workbook.display()))?;
            let info = UploadInfo {
                origin,
                filename: workbook
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned()),
                datetime: None,
            };
            let outcome = pipeline.upload(bytes, info)?;

            if cli.format == Format::Json {
                print_json(&outcome)?;
            } else {
                for (sheet, status) in outcome.validation.iter() {
                    let mark = if status.error { "✗" } else { "✓" };
                    println!(
                        "{} {:22} column={:?} master={:?} duplicate={:?}",
                        mark, sheet, status.column, status.master, status.duplicate
                    );
                }
                if let Some(feasibility) = &outcome.feasibility {
                    println!();
                    print_feasibility(feasibility);
                }
            }
            Ok(outcome.ready())
        }
        Commands::Check => {
            let pipeline = Pipeline::new(&config, &cli.user)?;
            let run = pipeline.import()?;
            let report = pipeline.check_feasibility(&run)?;
            if cli.format == Format::Json {
                print_json(&report.status)?;
            } else {
                print_feasibility(&report.status);
            }
            Ok(report.status.all_pass())
        }
        Commands::Solve { solver, force } => {
            let pipeline = Pipeline::new(&config, &cli.user)?;
            let mut run = pipeline.import()?;
            let feasibility = pipeline.check_feasibility(&run)?.status;
            if !feasibility.all_pass() && !force {
                print_feasibility(&feasibility);
                eprintln!("Feasibility checks failed; pass --force to solve anyway");
                return Ok(false);
            }

            let record = pipeline.optimize(&mut run, solver.as_deref())?;
            pipeline.write_plot_report(&run)?;
            let projection = pipeline.write_output_report(&run)?;

            if cli.format == Format::Json {
                #[derive(Serialize)]
                struct SolveOutput<'a> {
                    record: &'a flowplan_model::SolveRecord,
                    totals: &'a flowplan_model::Totals,
                }
                print_json(&SolveOutput {
                    record: &record,
                    totals: &projection.totals,
                })?;
            } else {
                println!("Solver status: {}", record.solver_status);
                println!("Termination:   {}", record.termination_condition);
                if let Some(message) = &record.message {
                    println!("Message:       {}", message);
                }
                println!("Solve time:    {:.3}s", record.solvetime_sec);
                if let Some(objective) = record.objective {
                    let totals = projection.totals;
                    println!();
                    println!("Objective:        {:14.2}", objective);
                    println!("Revenue:          {:14.2}", totals.revenue);
                    println!("Variable cost:    {:14.2}", totals.variable_cost);
                    println!("Fixed cost:       {:14.2}", totals.fixed_cost);
                    println!("Net contribution: {:14.2}", totals.net_contribution);
                }
            }
            Ok(run.solution().is_some_and(|s| s.is_optimal()))
        }
        Commands::Fetch { artifact, output } => {
            let artifact: Artifact = artifact.parse()?;
            let pipeline = Pipeline::new(&config, &cli.user)?;
            let bytes = pipeline.retrieve(artifact)?;
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.zip", artifact)));
            write(&output, &bytes)?;
            Ok(true)
        }
        Commands::Template { output } => {
            write(&output, &input_template()?)?;
            Ok(true)
        }
        Commands::Pack { dir, output } => {
            write(&output, &pack(&dir)?)?;
            Ok(true)
        }
    }
}

fn print_feasibility(status: &FeasibilityStatus) {
    let checks = [
        ("demand coverage", status.demand_coverage),
        ("product capacity", status.product_capacity),
        ("logistics capacity", status.logistics_capacity),
        ("supply/logistics bounds", status.supply_logistics),
    ];
    for (name, pass) in checks {
        println!("{} {}", if pass { "✓" } else { "✗" }, name);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

/// Every `<name>.csv` in `dir` becomes table `<name>`; `status.csv` seeds the status record
fn pack(dir: &Path) -> Result<Vec<u8>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|x| x.eq_ignore_ascii_case("csv")))
        .collect();
    entries.sort();
    if entries.is_empty() {
        bail!("no .csv files in {}", dir.display());
    }

    let mut workbook = Workbook::new(StatusRecord::new());
    for path in entries {
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let file = fs::File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let table = Table::read_csv(file).with_context(|| format!("parsing {}", path.display()))?;
        if name == flowplan_model::workbook::STATUS_SHEET {
            workbook.status_mut().merge(&StatusRecord::from_table(&table));
        } else {
            workbook.push(name, table);
        }
    }
    Ok(workbook.to_bytes()?)
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use bxh_bids::app::App;
use bxh_bids::config::ProjectLayout;
use bxh_bids::domain::DataId;
use bxh_bids::error::BxhError;
use bxh_bids::output::{HumanOutput, JsonOutput, OutputMode};
use bxh_bids::session::ConvertOptions;
use bxh_bids::templates::Templates;

#[derive(Parser)]
#[command(name = "bxh-bids")]
#[command(about = "Convert BXH-described MRI sessions into a BIDS dataset")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Convert one or more scanner sessions")]
    Convert(ConvertArgs),
    #[command(about = "List scan descriptions missing from the modality rules")]
    Check(CheckArgs),
}

#[derive(Args, Clone)]
struct LayoutArgs {
    /// BIDS project directory (holds sourcedata/, rawdata/ and code/)
    #[arg(short, long, env = "BIDS_DIR")]
    proj_dir: Option<PathBuf>,

    #[arg(long)]
    source_dir: Option<PathBuf>,

    #[arg(long)]
    target_dir: Option<PathBuf>,

    #[arg(long)]
    ses_info_dir: Option<PathBuf>,

    /// Directory with psd_types.json and *_info_fields.json overrides
    #[arg(long)]
    templates: Option<PathBuf>,

    #[arg(long)]
    json: bool,
}

#[derive(Args, Clone)]
struct ConvertArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    /// Read modality, label and entities from the scan description itself
    #[arg(long)]
    automatic: bool,

    /// Write uncompressed images as .nii.gz
    #[arg(long)]
    gzip: bool,

    /// Session directory ids, YYYYMMDD_#####
    #[arg(required = true, num_args = 1..)]
    data_ids: Vec<String>,
}

#[derive(Args, Clone)]
struct CheckArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    data_id: String,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<BxhError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &BxhError) -> u8 {
    match error {
        BxhError::NotFound(_)
        | BxhError::MissingSessionConfig(_)
        | BxhError::MissingTemplate(_)
        | BxhError::MissingTarget(_)
        | BxhError::InvalidSourceLayout(_)
        | BxhError::InvalidDataId(_) => 2,
        BxhError::UnknownDescription(_)
        | BxhError::AmbiguousMatch { .. }
        | BxhError::UnmatchedFunctional(_)
        | BxhError::SessionConfigConflict { .. }
        | BxhError::OutputExists(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Convert(args) => run_convert(args),
        Commands::Check(args) => run_check(args),
    }
}

fn run_convert(args: ConvertArgs) -> miette::Result<ExitCode> {
    let mode = output_mode(&args.layout);
    let layout = resolve_layout(&args.layout)?;
    let templates = Templates::resolve(args.layout.templates.as_deref())?;
    let options = ConvertOptions {
        automatic: args.automatic,
        gzip: args.gzip,
    };
    let app = App::new(layout, templates, options);

    let report = match mode {
        OutputMode::Json => {
            let report = app.convert(&args.data_ids, &JsonOutput);
            JsonOutput::print_batch(&report).into_diagnostic()?;
            report
        }
        OutputMode::Human => {
            let report = app.convert(&args.data_ids, &HumanOutput);
            HumanOutput::print_batch(&report);
            report
        }
    };

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn run_check(args: CheckArgs) -> miette::Result<ExitCode> {
    let mode = output_mode(&args.layout);
    let layout = resolve_source_layout(&args.layout)?;
    let templates = Templates::resolve(args.layout.templates.as_deref())?;
    let data_id: DataId = args.data_id.parse()?;
    let app = App::new(layout, templates, ConvertOptions::default());

    match mode {
        OutputMode::Json => {
            let result = app.check(&data_id, &JsonOutput)?;
            JsonOutput::print_check(&result).into_diagnostic()?;
        }
        OutputMode::Human => {
            let result = app.check(&data_id, &HumanOutput)?;
            HumanOutput::print_check(&result);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn output_mode(args: &LayoutArgs) -> OutputMode {
    if args.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    }
}

fn resolve_layout(args: &LayoutArgs) -> miette::Result<ProjectLayout> {
    let defaults = args.proj_dir.as_deref().map(ProjectLayout::from_project);
    let pick = |explicit: &Option<PathBuf>, default: Option<PathBuf>, flag: &str| {
        explicit.clone().or(default).ok_or_else(|| {
            miette::Report::msg(format!(
                "no project directory: pass --proj-dir, set BIDS_DIR, or pass --{flag}"
            ))
        })
    };
    Ok(ProjectLayout {
        source_dir: pick(
            &args.source_dir,
            defaults.as_ref().map(|layout| layout.source_dir.clone()),
            "source-dir",
        )?,
        target_dir: pick(
            &args.target_dir,
            defaults.as_ref().map(|layout| layout.target_dir.clone()),
            "target-dir",
        )?,
        ses_info_dir: pick(
            &args.ses_info_dir,
            defaults.as_ref().map(|layout| layout.ses_info_dir.clone()),
            "ses-info-dir",
        )?,
    })
}

/// `check` only reads sources; target and session-info paths may stay unset.
fn resolve_source_layout(args: &LayoutArgs) -> miette::Result<ProjectLayout> {
    let defaults = args.proj_dir.as_deref().map(ProjectLayout::from_project);
    let source_dir = args
        .source_dir
        .clone()
        .or_else(|| defaults.as_ref().map(|layout| layout.source_dir.clone()))
        .ok_or_else(|| {
            miette::Report::msg("no source directory: pass --source-dir or --proj-dir")
        })?;
    Ok(ProjectLayout {
        source_dir,
        target_dir: args.target_dir.clone().unwrap_or_default(),
        ses_info_dir: args.ses_info_dir.clone().unwrap_or_default(),
    })
}

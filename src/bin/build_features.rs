use std::path::PathBuf;

use custfeat::{
    init_logging, load_pipeline_config, log_app_start, run_pipeline, save_table, PipelineConfig,
};

const USAGE: &str =
    "usage: build_features <input.csv> [features_out.csv] [--cleaned <path>] [--config <path>]";

#[derive(Debug, Default)]
struct CliArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    cleaned: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(std::env::args().skip(1))?;

    let cfg = match &args.config {
        Some(path) => load_pipeline_config(path)?,
        None => PipelineConfig::default(),
    };

    let logging_cfg = cfg.logging.clone().with_env_overrides();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg, &args.input, &cfg);

    let out = run_pipeline(&args.input, &cfg, args.output.as_deref())?;
    if let Some(path) = &args.cleaned {
        save_table(&out.cleaned.table, path)?;
    }

    println!(
        "{} transactions -> {} customers ({} feature columns)",
        out.cleaned.transactions.len(),
        out.features.len(),
        out.features.column_count()
    );
    if out.cleaned.report.missing_dates + out.cleaned.report.unparseable_dates > 0 {
        println!(
            "filled {} missing and {} unparseable invoice dates",
            out.cleaned.report.missing_dates, out.cleaned.report.unparseable_dates
        );
    }
    if let Some(path) = &args.output {
        println!("features saved to {}", path.display());
    }

    Ok(())
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional = Vec::new();

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--cleaned" => {
                args.cleaned = Some(raw.next().ok_or(USAGE)?.into());
            }
            "--config" => {
                args.config = Some(raw.next().ok_or(USAGE)?.into());
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    args.input = positional.next().ok_or(USAGE)?;
    args.output = positional.next();
    if positional.next().is_some() {
        return Err(USAGE.to_string());
    }

    Ok(args)
}

//! Generate compressed pictures and their label files.

use std::path::PathBuf;

use spread::config::DatasetConfig;
use spread::render::{PictureRenderer, RenderMode, RenderParams, render_recordings};

#[derive(Debug, Default)]
struct Options {
    dataset: PathBuf,
    recordings: Vec<String>,
    compr_avg: Option<usize>,
    compr_proc: Option<usize>,
    pictures_only: bool,
    annotations_only: bool,
    workers: Option<usize>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    if let Err(err) = spread::logging::init("spread-compress") {
        eprintln!("Logging to file disabled: {err}");
    }
    let config = DatasetConfig::load(&options.dataset).map_err(|err| err.to_string())?;
    let renderer = PictureRenderer::new(&config);
    let names = if options.recordings.is_empty() {
        renderer
            .pending_recordings(RenderMode::Compressed)
            .map_err(|err| err.to_string())?
    } else {
        options.recordings.clone()
    };
    if names.is_empty() {
        println!("Every recording already has compressed pictures");
        return Ok(());
    }
    let params = build_params(&config, &options);
    let workers = options.workers.unwrap_or(config.settings.workers);

    let report = render_recordings(&renderer, names, &params, workers);
    let pictures: usize = report.completed.iter().map(|(_, summary)| summary.pictures_written).sum();
    let labels: usize = report.completed.iter().map(|(_, summary)| summary.labels_written).sum();
    for failure in &report.failed {
        eprintln!("Failed {}: {}", failure.item, failure.message);
    }
    println!(
        "Wrote {pictures} compressed pictures and {labels} label files ({} of {} recordings failed)",
        report.failed.len(),
        report.total()
    );
    report.ensure_success("recordings")
}

fn build_params(config: &DatasetConfig, options: &Options) -> RenderParams {
    let mut params = RenderParams::from_settings(&config.settings, RenderMode::Compressed);
    if let Some(avg) = options.compr_avg {
        params.factors.avg = avg;
    }
    if let Some(proc) = options.compr_proc {
        params.factors.proc = proc;
    }
    params.write_labels = !options.pictures_only;
    params.write_pictures = !options.annotations_only;
    params
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut options = Options::default();
    let mut dataset = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--dataset" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--dataset requires a value".to_string())?;
                dataset = Some(PathBuf::from(value));
            }
            "--recordings" => {
                while let Some(value) = args.get(idx + 1).filter(|value| !value.starts_with("--")) {
                    options.recordings.push(value.clone());
                    idx += 1;
                }
                if options.recordings.is_empty() {
                    return Err("--recordings requires at least one value".to_string());
                }
            }
            "--compr-avg" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--compr-avg requires a value".to_string())?;
                options.compr_avg = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --compr-avg value: {value}"))?,
                );
            }
            "--compr-proc" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--compr-proc requires a value".to_string())?;
                options.compr_proc = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --compr-proc value: {value}"))?,
                );
            }
            "--workers" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--workers requires a value".to_string())?;
                options.workers = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --workers value: {value}"))?,
                );
            }
            "--pictures-only" => options.pictures_only = true,
            "--annotations-only" => options.annotations_only = true,
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    options.dataset = dataset.ok_or_else(|| "--dataset is required".to_string())?;
    if options.pictures_only && options.annotations_only {
        return Err("--pictures-only and --annotations-only are mutually exclusive".to_string());
    }
    Ok(Some(options))
}

fn help_text() -> String {
    [
        "spread-compress",
        "",
        "Generates compressed pictures and label files.",
        "",
        "Usage:",
        "  spread-compress --dataset <root> [--recordings <names..>] [options]",
        "",
        "Options:",
        "  --dataset <root>        Dataset root directory (required).",
        "  --recordings <names..>  Recordings to process (default: those without compressed pictures).",
        "  --compr-avg <n>         Rows averaged per compression stage (default: from settings).",
        "  --compr-proc <n>        Averaged rows reduced per output line (default: from settings).",
        "  --pictures-only         Render pictures without label files.",
        "  --annotations-only      Write label files without rendering pictures.",
        "  --workers <n>           Parallel workers (default: from settings).",
        "",
        "Exits with status 1 when any item of the batch fails.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn only_flags_select_outputs() {
        let config = DatasetConfig::with_defaults("/data");
        let options = parse_args(args(&["--dataset", "/data", "--annotations-only", "--compr-proc", "2"]))
            .unwrap()
            .unwrap();
        let params = build_params(&config, &options);
        assert!(!params.write_pictures);
        assert!(params.write_labels);
        assert_eq!(params.factors.proc, 2);
        assert!(
            parse_args(args(&["--dataset", "/data", "--pictures-only", "--annotations-only"])).is_err()
        );
    }
}

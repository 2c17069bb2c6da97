//! Build synthetic recordings by cropping or merging existing ones.

use std::path::PathBuf;

use spread::config::DatasetConfig;
use spread::recording::PropertyFilter;
use spread::synth::{
    Alignment, CombineMode, CombineRequest, LengthRange, SignalCombiner, SourceSpec,
    regenerate_annotations, run_combinations,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeArg {
    Crop,
    Merge,
}

#[derive(Debug, Default)]
struct Options {
    dataset: PathBuf,
    mode: Option<ModeArg>,
    from_files: Vec<String>,
    from_properties: Vec<String>,
    to: Vec<String>,
    count: Option<usize>,
    snr: Vec<f32>,
    length_min: Option<u64>,
    length_max: Option<u64>,
    length_step: Option<u64>,
    align: Alignment,
    seed: Option<u64>,
    combine_annotations: bool,
    synthetics: Vec<String>,
    workers: Option<usize>,
    mock: bool,
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
    if let Err(err) = spread::logging::init("spread-combine") {
        eprintln!("Logging to file disabled: {err}");
    }
    let config = DatasetConfig::load(&options.dataset).map_err(|err| err.to_string())?;
    let combiner = SignalCombiner::new(&config);
    let workers = options.workers.unwrap_or(config.settings.workers);

    if options.mode.is_none() {
        let report = regenerate_annotations(&combiner, options.synthetics.clone(), workers)
            .map_err(|err| err.to_string())?;
        for (name, count) in &report.completed {
            println!("{name}: {count} annotations");
        }
        for failure in &report.failed {
            eprintln!("Failed {}: {}", failure.item, failure.message);
        }
        println!(
            "Regenerated annotations for {} of {} synthetics",
            report.completed.len(),
            report.total()
        );
        return report.ensure_success("regenerations");
    }

    let requests = build_requests(&options)?;
    let report = run_combinations(&combiner, requests, workers).map_err(|err| err.to_string())?;
    for (name, outcome) in &report.completed {
        let verb = if outcome.written { "Created" } else { "Planned" };
        println!(
            "{verb} {name} from {} ({} samples, {} annotations)",
            outcome.sources.join(","),
            outcome.samples,
            outcome.annotations
        );
        if options.mock {
            let text = outcome
                .metadata
                .to_json_pretty()
                .map_err(|err| err.to_string())?;
            println!("{text}");
        }
    }
    for failure in &report.failed {
        eprintln!("Failed {}: {}", failure.item, failure.message);
    }
    report.ensure_success("combinations")
}

fn build_requests(options: &Options) -> Result<Vec<CombineRequest>, String> {
    let length = match (options.length_min, options.length_max, options.length_step) {
        (None, None, None) => None,
        (min, max, step) => Some(
            LengthRange::new(min.unwrap_or(1), max.unwrap_or(u64::MAX), step.unwrap_or(1))
                .map_err(|err| err.to_string())?,
        ),
    };
    let groups = options
        .from_properties
        .iter()
        .map(|group| PropertyFilter::parse(group).map_err(|err| err.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let specs: Vec<SourceSpec> = match options.mode {
        Some(ModeArg::Crop) if !options.from_files.is_empty() => options
            .from_files
            .iter()
            .map(|name| SourceSpec::Named(vec![name.clone()]))
            .collect(),
        Some(ModeArg::Crop) => {
            let count = options.count.unwrap_or(1);
            groups
                .iter()
                .flat_map(|group| std::iter::repeat_n(SourceSpec::Filtered(vec![group.clone()]), count))
                .collect()
        }
        Some(ModeArg::Merge) if !options.from_files.is_empty() => {
            vec![SourceSpec::Named(options.from_files.clone()); options.count.unwrap_or(1)]
        }
        Some(ModeArg::Merge) => vec![SourceSpec::Filtered(groups); options.count.unwrap_or(1)],
        None => Vec::new(),
    };
    if !options.to.is_empty() && options.to.len() != specs.len() {
        return Err(format!(
            "--to names {} outputs but {} would be produced",
            options.to.len(),
            specs.len()
        ));
    }
    let mode = match options.mode {
        Some(ModeArg::Crop) => CombineMode::Crop { length },
        _ => CombineMode::Merge {
            snr_targets: (!options.snr.is_empty()).then(|| options.snr.clone()),
            length,
            alignment: options.align,
        },
    };
    Ok(specs
        .into_iter()
        .enumerate()
        .map(|(idx, sources)| CombineRequest {
            sources,
            output: options.to.get(idx).cloned(),
            mode: mode.clone(),
            seed: options.seed.map(|seed| seed.wrapping_add(idx as u64)),
            with_annotations: options.combine_annotations,
            dry_run: options.mock,
        })
        .collect())
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
            "--mode" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--mode requires a value".to_string())?;
                options.mode = Some(match value.as_str() {
                    "crop" => ModeArg::Crop,
                    "merge" => ModeArg::Merge,
                    _ => return Err(format!("Invalid --mode value: {value}")),
                });
            }
            "--from-files" => options.from_files = take_values(&args, &mut idx, "--from-files")?,
            "--from-properties" => {
                options.from_properties = take_values(&args, &mut idx, "--from-properties")?
            }
            "--to" => options.to = take_values(&args, &mut idx, "--to")?,
            "--synthetics" => options.synthetics = take_values(&args, &mut idx, "--synthetics")?,
            "--snr" => {
                options.snr = take_values(&args, &mut idx, "--snr")?
                    .iter()
                    .map(|value| {
                        value
                            .parse::<f32>()
                            .map_err(|_| format!("Invalid --snr value: {value}"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
            }
            "--count" => options.count = Some(parse_value(&args, &mut idx, "--count")?),
            "--length-min" => options.length_min = Some(parse_value(&args, &mut idx, "--length-min")?),
            "--length-max" => options.length_max = Some(parse_value(&args, &mut idx, "--length-max")?),
            "--length-step" => {
                options.length_step = Some(parse_value(&args, &mut idx, "--length-step")?)
            }
            "--align" => options.align = parse_value(&args, &mut idx, "--align")?,
            "--seed" => options.seed = Some(parse_value(&args, &mut idx, "--seed")?),
            "--workers" => options.workers = Some(parse_value(&args, &mut idx, "--workers")?),
            "--combine-annotations" => options.combine_annotations = true,
            "--mock" => options.mock = true,
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    options.dataset = dataset.ok_or_else(|| "--dataset is required".to_string())?;
    match options.mode {
        None if !options.combine_annotations => {
            return Err("--mode is required unless regenerating with --combine-annotations".to_string());
        }
        None => {}
        Some(_) => {
            let files = !options.from_files.is_empty();
            let properties = !options.from_properties.is_empty();
            if files == properties {
                return Err("Give exactly one of --from-files or --from-properties".to_string());
            }
        }
    }
    if options.count == Some(0) {
        return Err("--count must be positive".to_string());
    }
    Ok(Some(options))
}

/// Values following `flag` up to the next `--` option.
fn take_values(args: &[String], idx: &mut usize, flag: &str) -> Result<Vec<String>, String> {
    let mut values = Vec::new();
    while let Some(value) = args.get(*idx + 1).filter(|value| !value.starts_with("--")) {
        values.push(value.clone());
        *idx += 1;
    }
    if values.is_empty() {
        return Err(format!("{flag} requires at least one value"));
    }
    Ok(values)
}

fn parse_value<T: std::str::FromStr>(args: &[String], idx: &mut usize, flag: &str) -> Result<T, String> {
    *idx += 1;
    let value = args.get(*idx).ok_or_else(|| format!("{flag} requires a value"))?;
    value
        .parse::<T>()
        .map_err(|_| format!("Invalid {flag} value: {value}"))
}

fn help_text() -> String {
    [
        "spread-combine",
        "",
        "Creates synthetic recordings by cropping or merging dataset recordings.",
        "",
        "Usage:",
        "  spread-combine --dataset <root> --mode crop|merge (--from-files <names..> | --from-properties <groups..>) [options]",
        "  spread-combine --dataset <root> --combine-annotations [--synthetics <names..>]",
        "",
        "Options:",
        "  --dataset <root>             Dataset root directory (required).",
        "  --mode crop|merge            Crop one source per output or merge all sources into one.",
        "  --from-files <names..>       Source recordings by name.",
        "  --from-properties <groups..> Filter groups like class=wifi,channel=3; one random pick per group.",
        "  --to <names..>               Output names (default: next free syn_<n>).",
        "  --count <n>                  Outputs per merge or per crop filter group (default: 1).",
        "  --snr <db..>                 Target SNR per merge source, in source order.",
        "  --length-min <n>             Shortest output length in samples.",
        "  --length-max <n>             Longest output length in samples.",
        "  --length-step <n>            Length quantization in samples (default: 1).",
        "  --align <mode>               start, center, random or truncate (default: start).",
        "  --seed <u64>                 Seed of every random decision (default: derived from names).",
        "  --combine-annotations        Also synthesize annotations; alone, regenerate them for synthetics.",
        "  --synthetics <names..>       Synthetics to regenerate annotations for (default: all).",
        "  --workers <n>                Parallel workers (default: from settings).",
        "  --mock                       Plan and print metadata without writing files.",
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
    fn merge_arguments_become_repeated_requests() {
        let options = parse_args(args(&[
            "--dataset", "/data", "--mode", "merge", "--from-files", "rec_1", "rec_2", "--snr", "10",
            "-5", "--count", "2", "--seed", "7",
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(options.snr, vec![10.0, -5.0]);
        let requests = build_requests(&options).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].seed, Some(8));
        assert_eq!(
            requests[0].sources,
            SourceSpec::Named(vec!["rec_1".to_string(), "rec_2".to_string()])
        );
    }

    #[test]
    fn crop_makes_one_request_per_file_and_checks_names() {
        let options = parse_args(args(&[
            "--dataset", "/data", "--mode", "crop", "--from-files", "rec_1", "rec_2", "--to", "a",
        ]))
        .unwrap()
        .unwrap();
        assert!(build_requests(&options).is_err());
    }

    #[test]
    fn regeneration_needs_no_mode() {
        let options = parse_args(args(&["--dataset", "/data", "--combine-annotations"]))
            .unwrap()
            .unwrap();
        assert!(options.mode.is_none());
        assert!(parse_args(args(&["--dataset", "/data"])).is_err());
    }
}

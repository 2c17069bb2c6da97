//! Render spectrogram pictures and YOLO labels for dataset recordings.

use std::path::PathBuf;

use spread::config::DatasetConfig;
use spread::recording::FilterSet;
use spread::render::{PictureRenderer, RenderMode, RenderParams, render_recordings};
use spread::store::SampleStore;

#[derive(Debug, Default)]
struct Options {
    dataset: PathBuf,
    recordings: Vec<String>,
    filters: Vec<String>,
    mode: RenderMode,
    compr_avg: Option<usize>,
    compr_proc: Option<usize>,
    log_noise: Option<f32>,
    img_limit: Option<usize>,
    overwrite: bool,
    fft_size: Option<usize>,
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
    if let Err(err) = spread::logging::init("spread-render") {
        eprintln!("Logging to file disabled: {err}");
    }
    let config = DatasetConfig::load(&options.dataset).map_err(|err| err.to_string())?;
    let names = select_recordings(&config, &options)?;
    let params = build_params(&config, &options);
    let renderer = PictureRenderer::new(&config);
    let workers = options.workers.unwrap_or(config.settings.workers);

    let report = render_recordings(&renderer, names, &params, workers);
    let mut pictures = 0usize;
    let mut skipped = 0usize;
    for (_, summary) in &report.completed {
        pictures += summary.pictures_written;
        skipped += usize::from(summary.skipped);
    }
    for failure in &report.failed {
        eprintln!("Failed {}: {}", failure.item, failure.message);
    }
    println!(
        "Wrote {pictures} pictures for {} recordings ({skipped} skipped, {} failed)",
        report.completed.len() - skipped,
        report.failed.len()
    );
    report.ensure_success("recordings")
}

fn select_recordings(config: &DatasetConfig, options: &Options) -> Result<Vec<String>, String> {
    if !options.recordings.is_empty() {
        return Ok(options.recordings.clone());
    }
    let filters = FilterSet::parse_groups(&options.filters).map_err(|err| err.to_string())?;
    let store = SampleStore::new(config);
    let mut selected = Vec::new();
    for name in store.list_recordings().map_err(|err| err.to_string())? {
        if filters.is_empty() {
            selected.push(name);
            continue;
        }
        let metadata = store.load_metadata_or_empty(&name).map_err(|err| err.to_string())?;
        if filters.matches(&metadata) {
            selected.push(name);
        }
    }
    Ok(selected)
}

fn build_params(config: &DatasetConfig, options: &Options) -> RenderParams {
    let mut params = RenderParams::from_settings(&config.settings, options.mode);
    if let Some(avg) = options.compr_avg {
        params.factors.avg = avg;
    }
    if let Some(proc) = options.compr_proc {
        params.factors.proc = proc;
    }
    if let Some(fft_size) = options.fft_size {
        params.fft_size = fft_size;
    }
    params.log_noise = options.log_noise;
    params.img_limit = options.img_limit;
    params.overwrite = options.overwrite;
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
            "--recordings" => options.recordings = take_values(&args, &mut idx, "--recordings")?,
            "--filter" => options.filters = take_values(&args, &mut idx, "--filter")?,
            "--mode" => options.mode = parse_value(&args, &mut idx, "--mode")?,
            "--compr-avg" => options.compr_avg = Some(parse_value(&args, &mut idx, "--compr-avg")?),
            "--compr-proc" => options.compr_proc = Some(parse_value(&args, &mut idx, "--compr-proc")?),
            "--log-noise" => options.log_noise = Some(parse_value(&args, &mut idx, "--log-noise")?),
            "--img-limit" => options.img_limit = Some(parse_value(&args, &mut idx, "--img-limit")?),
            "--fft-size" => options.fft_size = Some(parse_value(&args, &mut idx, "--fft-size")?),
            "--workers" => options.workers = Some(parse_value(&args, &mut idx, "--workers")?),
            "--overwrite" => options.overwrite = true,
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    options.dataset = dataset.ok_or_else(|| "--dataset is required".to_string())?;
    if !options.recordings.is_empty() && !options.filters.is_empty() {
        return Err("--recordings and --filter are mutually exclusive".to_string());
    }
    Ok(Some(options))
}

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
        "spread-render",
        "",
        "Renders spectrogram pictures and YOLO label files for dataset recordings.",
        "",
        "Usage:",
        "  spread-render --dataset <root> [--recordings <names..> | --filter <groups..>] [options]",
        "",
        "Options:",
        "  --dataset <root>        Dataset root directory (required).",
        "  --recordings <names..>  Recordings to render (default: all).",
        "  --filter <groups..>     Render recordings matching any group like class=wifi,channel=3.",
        "  --mode <mode>           grayscale or compressed (default: grayscale).",
        "  --compr-avg <n>         Rows averaged per compression stage (default: from settings).",
        "  --compr-proc <n>        Averaged rows reduced per output line (default: from settings).",
        "  --log-noise <db>        Noise reference overriding recording metadata.",
        "  --img-limit <n>         Keep only the first n pictures per recording.",
        "  --overwrite             Replace existing pictures instead of skipping the recording.",
        "  --fft-size <n>          FFT size and picture width (default: from settings).",
        "  --workers <n>           Parallel workers (default: from settings).",
        "",
        "Exits with status 1 when any item of the batch fails.",
    ]
    .join("\n")
}

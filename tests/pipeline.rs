mod support;

use spread::compress::CompressionFactors;
use spread::recording::PropertyFilter;
use spread::render::{PictureRenderer, RenderMode, RenderParams, render_recordings};
use spread::synth::{
    Alignment, CombineError, CombineMode, CombineRequest, LengthRange, SignalCombiner, SourceSpec,
    run_combinations,
};
use support::{TestDataset, annotation, recording};

fn merge(sources: &[&str], targets: Option<Vec<f32>>, output: &str) -> CombineRequest {
    CombineRequest {
        sources: SourceSpec::Named(sources.iter().map(|name| name.to_string()).collect()),
        output: Some(output.to_string()),
        mode: CombineMode::Merge {
            snr_targets: targets,
            length: None,
            alignment: Alignment::Start,
        },
        seed: None,
        with_annotations: true,
        dry_run: false,
    }
}

fn small_params(mode: RenderMode) -> RenderParams {
    let mut params = RenderParams::from_settings(&Default::default(), mode);
    params.fft_size = 16;
    params.lines = 4;
    params.factors = CompressionFactors::new(2, 2).unwrap();
    params
}

fn five_window_dataset() -> TestDataset {
    let dataset = TestDataset::new();
    let annotations = [1024, 0, 512, 768, 256]
        .into_iter()
        .map(|start| annotation("wifi", start, start + 100))
        .collect();
    dataset.add(&recording("rec_1", 1280, &[("wifi", Some(12.0))], 1).with_annotations(annotations));
    dataset
}

#[test]
fn merge_with_annotations_is_reproducible() {
    let build = || {
        let dataset = TestDataset::new();
        dataset.add(
            &recording("rec_1", 4096, &[("wifi", Some(15.0))], 1)
                .with_annotations(vec![annotation("wifi", 100, 1500)]),
        );
        dataset.add(
            &recording("rec_2", 3000, &[("wmic", Some(8.0))], 2)
                .with_annotations(vec![annotation("wmic", 500, 2500)]),
        );
        let combiner = SignalCombiner::new(&dataset.config);
        let mut request = merge(&["rec_1", "rec_2"], Some(vec![10.0, 0.0]), "syn_1");
        request.mode = CombineMode::Merge {
            snr_targets: Some(vec![10.0, 0.0]),
            length: Some(LengthRange::new(2000, 4000, 100).unwrap()),
            alignment: Alignment::Random,
        };
        combiner.run(&request).unwrap();
        let store = dataset.store();
        (
            store.load_samples("syn_1").unwrap(),
            store.load_annotations("syn_1").unwrap(),
            store.load_metadata("syn_1").unwrap(),
        )
    };
    let (samples_a, annotations_a, metadata_a) = build();
    let (samples_b, annotations_b, metadata_b) = build();
    assert_eq!(samples_a, samples_b);
    assert_eq!(annotations_a, annotations_b);
    assert_eq!(metadata_a.get("combination"), metadata_b.get("combination"));
    assert_eq!(metadata_a.get("samples_blake3"), metadata_b.get("samples_blake3"));
    assert!(metadata_a.is_synthetic());
    assert_eq!(metadata_a.sources(), vec!["rec_1".to_string(), "rec_2".to_string()]);
}

#[test]
fn merge_without_shift_keeps_annotation_windows() {
    let dataset = TestDataset::new();
    let a = annotation("wifi", 0, 100);
    let b = annotation("bluetooth", 50, 150);
    dataset.add(&recording("rec_1", 200, &[("wifi", None)], 1).with_annotations(vec![a.clone()]));
    dataset.add(&recording("rec_2", 200, &[("bluetooth", None)], 2).with_annotations(vec![b.clone()]));
    let combiner = SignalCombiner::new(&dataset.config);

    combiner.run(&merge(&["rec_1", "rec_2"], None, "syn_1")).unwrap();

    assert_eq!(dataset.store().load_annotations("syn_1").unwrap(), vec![a, b]);
}

#[test]
fn merge_keeps_each_source_paired_with_its_target() {
    let dataset = TestDataset::new();
    dataset.add(&recording("rec_1", 512, &[("wifi", Some(20.0))], 1));
    dataset.add(&recording("rec_2", 512, &[("wmic", Some(5.0))], 2));
    let combiner = SignalCombiner::new(&dataset.config);
    let requests = vec![
        merge(&["rec_1", "rec_2"], Some(vec![10.0, 0.0]), "syn_ab"),
        merge(&["rec_2", "rec_1"], Some(vec![0.0, 10.0]), "syn_ba"),
    ];

    let report = run_combinations(&combiner, requests, 2).unwrap();
    assert!(report.is_success());

    let store = dataset.store();
    let ab = store.load_metadata("syn_ab").unwrap();
    let ba = store.load_metadata("syn_ba").unwrap();
    assert_eq!(ab.field_as_string("classes").as_deref(), Some("wifi,wmic"));
    assert_eq!(ab.field_as_string("snr").as_deref(), Some("wifi_10,wmic_0"));
    assert_eq!(ba.field_as_string("classes").as_deref(), Some("wmic,wifi"));
    assert_eq!(ba.field_as_string("snr").as_deref(), Some("wmic_0,wifi_10"));
}

#[test]
fn crop_lengths_stay_on_the_quantized_range() {
    let dataset = TestDataset::new();
    let source = recording("rec_1", 1000, &[("wifi", Some(9.0))], 1);
    let combiner = SignalCombiner::new(&dataset.config);
    let range = LengthRange::new(100, 700, 50).unwrap();

    for seed in 0..32 {
        let cropped = combiner.crop("syn_1", &source, Some(range), seed).unwrap();
        let len = cropped.recording.samples.len() as u64;
        assert!((100..=700).contains(&len), "length {len}");
        assert_eq!((len - 100) % 50, 0);
        let placement = &cropped.plan.placements[0];
        assert!(placement.crop_start + placement.crop_len <= 1000);
    }

    let too_long = LengthRange::new(1200, 1500, 10).unwrap();
    assert!(matches!(
        combiner.crop("syn_2", &source, Some(too_long), 0),
        Err(CombineError::InvalidRange(_))
    ));
}

#[test]
fn duplicate_output_names_write_nothing() {
    let dataset = TestDataset::new();
    dataset.add(&recording("rec_1", 256, &[("wifi", Some(10.0))], 1));
    dataset.add(&recording("rec_2", 256, &[("wmic", Some(10.0))], 2));
    let combiner = SignalCombiner::new(&dataset.config);
    let requests = vec![
        merge(&["rec_1", "rec_2"], None, "syn_7"),
        merge(&["rec_2", "rec_1"], None, "syn_7"),
    ];

    assert!(matches!(
        run_combinations(&combiner, requests, 2),
        Err(CombineError::ArgumentMismatch(_))
    ));
    assert!(!dataset.store().exists("syn_7"));
}

#[test]
fn img_limit_keeps_the_first_pictures_in_annotation_order() {
    let dataset = five_window_dataset();
    let renderer = PictureRenderer::new(&dataset.config);
    let mut params = small_params(RenderMode::Grayscale);
    params.img_limit = Some(3);

    let recording = dataset.store().load_recording("rec_1").unwrap();
    let pictures = renderer.render(&recording, &params).unwrap();
    let starts: Vec<u64> = pictures.iter().map(|picture| picture.window_start).collect();
    assert_eq!(starts, vec![1024, 0, 512]);

    let summary = renderer.render_to_disk("rec_1", &params).unwrap();
    assert_eq!(summary.pictures_written, 3);
    assert_eq!(summary.labels_written, 3);
    let dir = renderer.output_dir("rec_1", RenderMode::Grayscale);
    let indices: Vec<usize> = dataset
        .store()
        .existing_pictures(&dir, "rec_1")
        .unwrap()
        .into_iter()
        .map(|(index, _)| index)
        .collect();
    assert_eq!(indices, vec![0, 1, 2]);
    let label = std::fs::read_to_string(dir.join("rec_1_pic_0.txt")).unwrap();
    assert!(label.starts_with("0 "));
}

#[test]
fn overwrite_reproduces_identical_pictures_and_plain_runs_skip() {
    let dataset = five_window_dataset();
    let renderer = PictureRenderer::new(&dataset.config);
    let mut params = small_params(RenderMode::Compressed);
    let dir = renderer.output_dir("rec_1", RenderMode::Compressed);
    let read_pictures = || -> Vec<Vec<u8>> {
        dataset
            .store()
            .existing_pictures(&dir, "rec_1")
            .unwrap()
            .into_iter()
            .map(|(_, path)| std::fs::read(path).unwrap())
            .collect()
    };

    assert_eq!(renderer.render_to_disk("rec_1", &params).unwrap().pictures_written, 5);
    let first = read_pictures();

    let skipped = renderer.render_to_disk("rec_1", &params).unwrap();
    assert!(skipped.skipped);
    assert_eq!(skipped.pictures_written, 0);

    params.overwrite = true;
    let again = renderer.render_to_disk("rec_1", &params).unwrap();
    assert!(again.removed > 0);
    assert_eq!(again.pictures_written, 5);
    assert_eq!(read_pictures(), first);
}

#[test]
fn annotations_only_writes_labels_without_pictures() {
    let dataset = five_window_dataset();
    let renderer = PictureRenderer::new(&dataset.config);
    let mut params = small_params(RenderMode::Compressed);
    params.write_pictures = false;

    let summary = renderer.render_to_disk("rec_1", &params).unwrap();
    assert_eq!(summary.pictures_written, 0);
    assert_eq!(summary.labels_written, 5);
    let dir = dataset.config.compressed_pictures_dir("rec_1");
    assert!(dir.join("rec_1_pic_4.txt").is_file());
    assert!(dataset.store().existing_pictures(&dir, "rec_1").unwrap().is_empty());
}

#[test]
fn one_broken_recording_does_not_stop_the_batch() {
    let dataset = five_window_dataset();
    dataset.add(&recording("rec_2", 512, &[("wifi", Some(3.0))], 2));
    std::fs::write(dataset.store().metadata_path("rec_2"), "{ broken").unwrap();
    let renderer = PictureRenderer::new(&dataset.config);
    let names = vec!["rec_1".to_string(), "rec_2".to_string(), "rec_3".to_string()];

    let report = render_recordings(&renderer, names, &small_params(RenderMode::Grayscale), 3);

    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].0, "rec_1");
    let mut failed: Vec<&str> = report.failed.iter().map(|failure| failure.item.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["rec_2", "rec_3"]);
}

#[test]
fn filtered_batches_pick_the_same_sources_with_many_workers() {
    let build = || {
        let dataset = TestDataset::new();
        for (index, class) in ["wifi", "wmic", "wifi", "bluetooth", "wmic", "wifi"].iter().enumerate() {
            dataset.add(&recording(&format!("rec_{}", index + 1), 600, &[(*class, Some(10.0))], index as u64));
        }
        let combiner = SignalCombiner::new(&dataset.config);
        let requests = (0..8)
            .map(|_| CombineRequest {
                sources: SourceSpec::Filtered(vec![
                    PropertyFilter::parse("class=wifi").unwrap(),
                    PropertyFilter::parse("class=wmic").unwrap(),
                ]),
                output: None,
                mode: CombineMode::Merge {
                    snr_targets: Some(vec![5.0, 5.0]),
                    length: None,
                    alignment: Alignment::Start,
                },
                seed: None,
                with_annotations: true,
                dry_run: false,
            })
            .collect();
        let report = run_combinations(&combiner, requests, 4).unwrap();
        assert!(report.is_success());
        let mut picks: Vec<(String, Vec<String>)> = report
            .completed
            .into_iter()
            .map(|(name, outcome)| (name, outcome.sources))
            .collect();
        picks.sort();
        picks
    };
    let first = build();
    let second = build();
    assert_eq!(first.len(), 8);
    assert_eq!(first, second);
    for (_, sources) in &first {
        assert!(sources.iter().all(|source| source.starts_with("rec_")), "{sources:?}");
    }
}

#[test]
fn rerunning_onto_an_existing_output_replaces_its_artifacts() {
    let dataset = TestDataset::new();
    dataset.add(
        &recording("rec_1", 1024, &[("wifi", Some(12.0))], 1)
            .with_annotations(vec![annotation("wifi", 0, 300), annotation("wifi", 512, 900)]),
    );
    dataset.add(&recording("rec_2", 1024, &[("wmic", Some(6.0))], 2));
    let combiner = SignalCombiner::new(&dataset.config);
    combiner.run(&merge(&["rec_1", "rec_2"], None, "syn_1")).unwrap();

    let renderer = PictureRenderer::new(&dataset.config);
    let params = small_params(RenderMode::Grayscale);
    assert!(renderer.render_to_disk("syn_1", &params).unwrap().pictures_written > 0);
    assert!(!renderer.pending_recordings(RenderMode::Grayscale).unwrap().contains(&"syn_1".to_string()));

    let mut plain = merge(&["rec_2", "rec_1"], None, "syn_1");
    plain.with_annotations = false;
    let outcome = combiner.run(&plain).unwrap();
    assert!(outcome.written);

    let store = dataset.store();
    assert!(store.load_annotations("syn_1").unwrap().is_empty());
    assert_eq!(store.load_metadata("syn_1").unwrap().sources(), vec!["rec_2".to_string(), "rec_1".to_string()]);
    let dir = renderer.output_dir("syn_1", RenderMode::Grayscale);
    assert!(store.existing_pictures(&dir, "syn_1").unwrap().is_empty());
    assert!(!dir.join("syn_1_pic_0.txt").exists());
    assert!(renderer.pending_recordings(RenderMode::Grayscale).unwrap().contains(&"syn_1".to_string()));
}

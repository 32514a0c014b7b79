use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::sync::{mpsc, Arc, Mutex};

use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;

use ferrite_llie::data::{DataLoader, InMemoryDataset, Sample};
use ferrite_llie::features::ConvFeatureExtractor;
use ferrite_llie::io::{Checkpoint, CheckpointWriter, JsonCheckpointWriter, SampleWriter};
use ferrite_llie::loss::LossComposer;
use ferrite_llie::metrics::{Metric, Psnr, Ssim};
use ferrite_llie::model::{EnhancerSpec, Model, PatchEnhancer};
use ferrite_llie::optim::OptimizerKind;
use ferrite_llie::train::{EpochRunner, TrainHistory, Trainer};
use ferrite_llie::{train_loop, ImageTensor, Result, RunConfig, TrainConfig};

/// Returns 1.0 on training batches and the next scripted value on validation
/// batches. Works because every fixture below has exactly one batch per phase.
struct ScriptedPsnr {
    script: Vec<f64>,
    calls: Cell<usize>,
}

impl ScriptedPsnr {
    fn boxed(script: &[f64]) -> Box<dyn Metric> {
        Box::new(ScriptedPsnr { script: script.to_vec(), calls: Cell::new(0) })
    }
}

impl Metric for ScriptedPsnr {
    fn compute(&self, _output: &ImageTensor, _target: &ImageTensor) -> Result<f64> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if call % 2 == 0 {
            Ok(1.0)
        } else {
            Ok(self.script[call / 2])
        }
    }
}

#[derive(Clone, Default)]
struct Saved(Arc<Mutex<Vec<Checkpoint>>>);

impl CheckpointWriter for Saved {
    fn persist(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        self.0.lock().unwrap().push(checkpoint.clone());
        Ok(())
    }
}

impl Saved {
    fn epochs(&self) -> Vec<usize> {
        self.0.lock().unwrap().iter().map(|c| c.epoch).collect()
    }
}

#[derive(Clone, Default)]
struct Written(Arc<Mutex<Vec<(usize, bool)>>>);

impl SampleWriter for Written {
    fn persist(&mut self, _images: &ImageTensor, epoch: usize, is_best: bool) -> Result<()> {
        self.0.lock().unwrap().push((epoch, is_best));
        Ok(())
    }
}

impl Written {
    fn all(&self) -> Vec<(usize, bool)> {
        self.0.lock().unwrap().clone()
    }
}

fn loader(name: &str, n: usize, offset: f64) -> DataLoader {
    let samples = (0..n)
        .map(|i| {
            let level = 0.04 + 0.03 * i as f64 + offset;
            Sample {
                input: ImageTensor::full([1, 3, 6, 6], level),
                target: ImageTensor::full([1, 3, 6, 6], (4.0 * level).min(1.0)),
            }
        })
        .collect();
    DataLoader::new(Arc::new(InMemoryDataset::new(name, samples)), n)
        .unwrap()
        .shuffled(42)
}

struct Harness {
    trainer: Trainer<PatchEnhancer, ConvFeatureExtractor>,
    saved: Saved,
    written: Written,
}

fn trainer(
    config: TrainConfig,
    psnr: Box<dyn Metric>,
    checkpoints: Box<dyn CheckpointWriter>,
    samples: Box<dyn SampleWriter>,
) -> Trainer<PatchEnhancer, ConvFeatureExtractor> {
    let model = PatchEnhancer::new(config.enhancer.clone(), &mut StdRng::seed_from_u64(config.seed)).unwrap();
    let runner = EpochRunner::new(
        LossComposer::new(ConvFeatureExtractor::edge_bank(3), config.perceptual_weight),
        psnr,
        Box::new(Ssim::default()),
        config.sample_interval,
    )
    .unwrap();
    let optimizer = config.optimizer.build(config.learning_rate);
    Trainer::new(config, model, optimizer, runner, checkpoints, samples)
}

fn harness(config: TrainConfig, psnr: Box<dyn Metric>) -> Harness {
    let (saved, written) = (Saved::default(), Written::default());
    let trainer = trainer(config, psnr, Box::new(saved.clone()), Box::new(written.clone()));
    Harness { trainer, saved, written }
}

fn run(h: &mut Harness) -> TrainHistory {
    h.trainer.run(&loader("train", 4, 0.0), &loader("test", 3, 0.01)).unwrap()
}

fn config(epochs: usize) -> TrainConfig {
    TrainConfig { learning_rate: 1e-2, ..TrainConfig::new(epochs, 4) }
}

#[test]
fn single_improving_epoch_saves_once() {
    let mut h = harness(config(1), ScriptedPsnr::boxed(&[25.0]));
    let history = run(&mut h);

    assert_eq!(h.saved.epochs(), vec![1]);
    assert_eq!(h.written.all(), vec![(1, true)]);
    assert_eq!(history.best_psnr, 25.0);
    assert_eq!(h.trainer.best().psnr(), 25.0);
    assert!(history.reports[0].improved);
}

#[test]
fn regression_is_not_checkpointed() {
    let mut h = harness(config(2), ScriptedPsnr::boxed(&[20.0, 18.0]));
    let history = run(&mut h);

    assert_eq!(h.saved.epochs(), vec![1]);
    assert_eq!(history.best_psnr, 20.0);
    assert_eq!(
        history.reports.iter().map(|r| r.improved).collect::<Vec<_>>(),
        vec![true, false]
    );
}

#[test]
fn periodic_samples_follow_the_interval() {
    let cfg = TrainConfig { sample_interval: 2, ..config(5) };
    let mut h = harness(cfg, ScriptedPsnr::boxed(&[10.0, 9.0, 9.0, 12.0, 1.0]));
    run(&mut h);

    assert_eq!(h.saved.epochs(), vec![1, 4]);
    assert_eq!(
        h.written.all(),
        vec![(1, true), (2, false), (4, false), (4, true)]
    );
}

#[test]
fn history_has_one_slot_per_epoch() {
    let mut h = harness(config(3), Box::new(Psnr::default()));
    let history = run(&mut h);

    assert_eq!(history.train_losses.len(), 3);
    assert_eq!(history.val_losses.len(), 3);
    assert!(history.train_losses.iter().all(|l| *l > 0.0));
    assert_eq!(
        history.reports.iter().map(|r| r.epoch).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(history.reports.iter().all(|r| r.total_epochs == 3));
}

#[test]
fn runs_with_the_same_seed_are_identical() {
    let mut a = harness(config(3), Box::new(Psnr::default()));
    let mut b = harness(config(3), Box::new(Psnr::default()));
    let (ha, hb) = (run(&mut a), run(&mut b));

    assert_eq!(ha.train_losses, hb.train_losses);
    assert_eq!(ha.val_losses, hb.val_losses);
    assert_eq!(ha.best_psnr, hb.best_psnr);
    assert_eq!(a.trainer.model().state(), b.trainer.model().state());
}

#[test]
fn resuming_from_disk_matches_an_uninterrupted_run() {
    let script = [1.0, 2.0, 3.0, 4.0];

    let mut full = harness(config(4), ScriptedPsnr::boxed(&script));
    let full_history = run(&mut full);

    let dir = tempfile::tempdir().unwrap();
    let mut first_half = trainer(
        config(2),
        ScriptedPsnr::boxed(&script[..2]),
        Box::new(JsonCheckpointWriter::new(dir.path()).unwrap()),
        Box::new(Written::default()),
    );
    let first_history = first_half.run(&loader("train", 4, 0.0), &loader("test", 3, 0.01)).unwrap();
    let first_history: TrainHistory =
        serde_json::from_str(&serde_json::to_string(&first_history).unwrap()).unwrap();

    let checkpoint = JsonCheckpointWriter::load_best(dir.path()).unwrap().unwrap();
    assert_eq!(checkpoint.epoch, 2);

    let mut resumed = harness(config(4), ScriptedPsnr::boxed(&script[2..]));
    resumed.trainer.resume_from(checkpoint).unwrap();
    resumed.trainer = resumed.trainer.with_history(first_history);
    assert_eq!(resumed.trainer.start_epoch(), 3);
    let resumed_history = run(&mut resumed);

    assert_eq!(resumed_history.train_losses, full_history.train_losses);
    assert_eq!(resumed_history.val_losses, full_history.val_losses);
    assert_eq!(resumed_history.best_psnr, full_history.best_psnr);
    assert_eq!(
        resumed_history.reports.iter().map(|r| r.epoch).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(resumed.trainer.model().state(), full.trainer.model().state());
    assert_eq!(resumed.saved.epochs(), vec![3, 4]);
}

#[test]
fn progress_reports_are_streamed() {
    let (tx, rx) = mpsc::channel();
    let mut h = harness(config(2), Box::new(Psnr::default()));
    h.trainer = h.trainer.with_progress(tx);
    run(&mut h);
    drop(h);

    let epochs: Vec<usize> = rx.iter().map(|r| r.epoch).collect();
    assert_eq!(epochs, vec![1, 2]);
}

#[test]
fn sgd_runs_too() {
    let cfg = TrainConfig { optimizer: OptimizerKind::Sgd, learning_rate: 0.5, ..config(2) };
    let mut h = harness(cfg, Box::new(Psnr::default()));
    let history = run(&mut h);
    assert!(history.val_losses.iter().all(|l| l.is_finite()));
}

fn write_split(root: &Path, split: &str, count: usize) {
    for (side, scale) in [("low", 1u8), ("high", 4u8)] {
        let dir = root.join(split).join(side);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            let base = 10 + 8 * i as u8;
            let img = RgbImage::from_fn(8, 8, |x, y| {
                let v = base.saturating_add((x + y) as u8).saturating_mul(scale);
                Rgb([v, v / 2 + 10, v / 3 + 20])
            });
            img.save(dir.join(format!("{i:03}.png"))).unwrap();
        }
    }
}

#[test]
fn end_to_end_on_disk() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_split(data.path(), "train", 3);
    write_split(data.path(), "test", 2);

    let train = TrainConfig {
        model_name: "tiny".into(),
        input_size: 8,
        sample_interval: 1,
        enhancer: EnhancerSpec::default(),
        ..TrainConfig::new(2, 2)
    };
    let mut run = RunConfig::new(data.path(), out.path(), train);
    let history = train_loop(&run).unwrap();
    assert_eq!(history.reports.len(), 2);

    let run_dir = out.path().join("tiny");
    assert!(run_dir.join("history.json").is_file());
    assert!(run_dir.join("samples/epoch_001/tiny_00.png").is_file());
    assert!(run_dir.join("samples/epoch_002/tiny_00.png").is_file());
    assert!(run_dir.join("samples/best/tiny_00.png").is_file());

    let saved = JsonCheckpointWriter::load_best(run_dir.join("checkpoints")).unwrap().unwrap();
    assert_eq!(saved.psnr, history.best_psnr);
    assert_eq!(saved.model_name, "tiny");

    run.train.epochs = 3;
    run.resume = true;
    let resumed = train_loop(&run).unwrap();
    assert_eq!(
        resumed.reports.iter().map(|r| r.epoch).collect::<Vec<_>>(),
        (1..=saved.epoch).chain(saved.epoch + 1..=3).collect::<Vec<_>>()
    );
    assert_eq!(resumed.train_losses.len(), 3);
    assert_eq!(resumed.train_losses[..saved.epoch], history.train_losses[..saved.epoch]);
    assert_eq!(resumed.val_losses[..saved.epoch], history.val_losses[..saved.epoch]);

    let on_disk: TrainHistory =
        serde_json::from_reader(fs::File::open(run_dir.join("history.json")).unwrap()).unwrap();
    assert_eq!(on_disk.train_losses, resumed.train_losses);
}

#[test]
fn missing_split_fails_before_training() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_split(data.path(), "train", 1);
    let run = RunConfig::new(data.path(), out.path(), TrainConfig::new(1, 1));
    assert!(train_loop(&run).is_err());
    assert!(!out.path().join("PatchEnhancer/history.json").exists());
}

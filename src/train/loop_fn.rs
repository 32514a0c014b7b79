use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::RunConfig;
use crate::data::{DataLoader, Dataset, LowLightDataset};
use crate::error::{Error, Result};
use crate::features::{ConvFeatureExtractor, FeatureExtractor};
use crate::io::{Checkpoint, CheckpointWriter, JsonCheckpointWriter, PngSampleWriter, SampleWriter};
use crate::loss::LossComposer;
use crate::metrics::{Psnr, Ssim};
use crate::model::{Model, PatchEnhancer};
use crate::optim::Optimizer;
use crate::train::epoch_stats::{EpochReport, TrainHistory};
use crate::train::policy::{BestRecord, CheckpointPolicy, Decision};
use crate::train::runner::EpochRunner;
use crate::train::train_config::TrainConfig;

/// Mixed into the seed so validation batches are shuffled independently of
/// training batches.
const VALIDATION_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;

/// Where the orchestrator is within a run; logged at trace level on every
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    EpochTrain,
    EpochValidate,
    CheckpointCheck,
    Logged,
    Done,
}

fn enter(phase: Phase, epoch: usize) {
    tracing::trace!(?phase, epoch, "phase");
}

/// Formats a duration the way the end-of-run summary prints it: `3m 7s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

/// Epoch loop: train, validate, checkpoint on improvement, log.
pub struct Trainer<M, F> {
    config: TrainConfig,
    model: M,
    optimizer: Box<dyn Optimizer>,
    runner: EpochRunner<F>,
    checkpoints: Box<dyn CheckpointWriter>,
    samples: Box<dyn SampleWriter>,
    best: BestRecord,
    start_epoch: usize,
    history: Option<TrainHistory>,
    progress_tx: Option<mpsc::Sender<EpochReport>>,
}

impl<M: Model, F: FeatureExtractor> Trainer<M, F> {
    pub fn new(
        config: TrainConfig,
        model: M,
        optimizer: Box<dyn Optimizer>,
        runner: EpochRunner<F>,
        checkpoints: Box<dyn CheckpointWriter>,
        samples: Box<dyn SampleWriter>,
    ) -> Self {
        Trainer {
            config,
            model,
            optimizer,
            runner,
            checkpoints,
            samples,
            best: BestRecord::new(),
            start_epoch: 1,
            history: None,
            progress_tx: None,
        }
    }

    /// Sends one `EpochReport` per completed epoch. A dropped receiver only
    /// stops the reports, never the run.
    pub fn with_progress(mut self, tx: mpsc::Sender<EpochReport>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Continues recording into a history saved by an earlier run. Entries
    /// after the epoch training restarts from are dropped.
    pub fn with_history(mut self, history: TrainHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Restores weights, optimizer state and the best record, and continues
    /// with the epoch after the checkpoint's.
    pub fn resume_from(&mut self, checkpoint: Checkpoint) -> Result<()> {
        self.model.load_state(checkpoint.model)?;
        self.optimizer.load_state(checkpoint.optimizer)?;
        self.best = BestRecord::from_psnr(checkpoint.psnr);
        self.start_epoch = checkpoint.epoch + 1;
        tracing::info!(
            epoch = checkpoint.epoch,
            best_psnr = checkpoint.psnr,
            "resumed from checkpoint"
        );
        Ok(())
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn best(&self) -> BestRecord {
        self.best
    }

    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    fn snapshot(&self, epoch: usize, pass_loss: f64, pass_psnr: f64, pass_ssim: f64) -> Checkpoint {
        Checkpoint {
            model_name: self.config.model_name.clone(),
            epoch,
            loss: pass_loss,
            psnr: pass_psnr,
            ssim: pass_ssim,
            model: self.model.state(),
            optimizer: self.optimizer.state(),
            config: self.config.clone(),
        }
    }

    /// Runs every remaining epoch. Any collaborator error ends the run; the
    /// stats of the interrupted epoch are lost.
    pub fn run(&mut self, train: &DataLoader, val: &DataLoader) -> Result<TrainHistory> {
        let since = Instant::now();
        let total = self.config.epochs;
        let mut history = match self.history.take() {
            Some(saved) => saved.continue_after(self.start_epoch - 1, total),
            None => TrainHistory::new(total),
        };
        history.best_psnr = self.best.psnr();

        for epoch in self.start_epoch..=total {
            let epoch_start = Instant::now();

            enter(Phase::EpochTrain, epoch);
            let train_stats =
                self.runner
                    .train(&mut self.model, self.optimizer.as_mut(), train.iter(epoch), epoch)?;

            enter(Phase::EpochValidate, epoch);
            let pass = self.runner.validate(&self.model, val.iter(epoch), epoch, self.samples.as_mut())?;

            enter(Phase::CheckpointCheck, epoch);
            let val_stats = pass.stats;
            let decision = match CheckpointPolicy::decide(&self.best, &val_stats) {
                Decision::Skip => Decision::Skip,
                Decision::Save => {
                    let checkpoint =
                        self.snapshot(epoch, val_stats.loss(), val_stats.psnr(), val_stats.ssim());
                    CheckpointPolicy::apply(
                        &mut self.best,
                        &val_stats,
                        epoch,
                        &pass.last_outputs,
                        move || checkpoint,
                        self.checkpoints.as_mut(),
                        self.samples.as_mut(),
                    )?
                }
            };

            enter(Phase::Logged, epoch);
            let report = EpochReport {
                epoch,
                total_epochs: total,
                train: train_stats,
                val: val_stats,
                improved: decision == Decision::Save,
                elapsed_ms: epoch_start.elapsed().as_millis() as u64,
            };
            tracing::info!(
                "Epoch [{epoch}/{total}] train loss {:.4}, psnr {:.4}, ssim {:.4} | validation loss {:.4}, psnr {:.4}, ssim {:.4}",
                train_stats.loss(),
                train_stats.psnr(),
                train_stats.ssim(),
                val_stats.loss(),
                val_stats.psnr(),
                val_stats.ssim(),
            );
            history.record(report.clone());
            history.best_psnr = self.best.psnr();

            let disconnected = match &self.progress_tx {
                Some(tx) => tx.send(report).is_err(),
                None => false,
            };
            if disconnected {
                tracing::debug!("progress receiver dropped");
                self.progress_tx = None;
            }
        }

        enter(Phase::Done, total);
        history.best_psnr = self.best.psnr();
        tracing::info!("Training completed in {}", format_elapsed(since.elapsed()));
        Ok(history)
    }
}

/// Builds every collaborator from `run`, trains for the configured number of
/// epochs and writes `history.json` into the run directory. A resumed run
/// extends the `history.json` it finds there.
pub fn train_loop(run: &RunConfig) -> Result<TrainHistory> {
    enter(Phase::Init, 0);
    let cfg = &run.train;
    cfg.validate()?;

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let model = PatchEnhancer::new(cfg.enhancer.clone(), &mut rng)?;
    let optimizer = cfg.optimizer.build(cfg.learning_rate);

    let extractor = match &run.feature_weights {
        Some(path) => ConvFeatureExtractor::load_json(path)?,
        None => ConvFeatureExtractor::edge_bank(cfg.enhancer.channels),
    };
    let runner = EpochRunner::new(
        LossComposer::new(extractor, cfg.perceptual_weight),
        Box::new(Psnr::default()),
        Box::new(Ssim::default()),
        cfg.sample_interval,
    )?;

    let train_set = LowLightDataset::open_split(&run.dataset_root, "train", cfg.input_size)?;
    let val_set = LowLightDataset::open_split(&run.dataset_root, "test", cfg.input_size)?;
    for set in [&train_set, &val_set] {
        if set.is_empty() {
            return Err(Error::EmptyDataSource(set.name().to_string()));
        }
    }
    let train_loader = DataLoader::new(Arc::new(train_set), cfg.batch_size)?
        .shuffled(cfg.seed)
        .with_workers(cfg.num_workers);
    let val_loader = DataLoader::new(Arc::new(val_set), cfg.batch_size)?
        .shuffled(cfg.seed ^ VALIDATION_STREAM)
        .with_workers(cfg.num_workers);

    let run_dir = run.run_dir();
    let checkpoint_dir = run_dir.join("checkpoints");
    let history_path = run_dir.join("history.json");
    let checkpoints = JsonCheckpointWriter::new(&checkpoint_dir)?;
    let samples = PngSampleWriter::new(run_dir.join("samples"), &cfg.model_name)?;

    tracing::info!(
        device = "cpu",
        model = %cfg.model_name,
        parameters = model.network().parameter_count(),
        optimizer = %cfg.optimizer,
        learning_rate = cfg.learning_rate,
        train_batches = train_loader.len(),
        val_batches = val_loader.len(),
        "initialized"
    );

    let mut trainer = Trainer::new(
        cfg.clone(),
        model,
        optimizer,
        runner,
        Box::new(checkpoints),
        Box::new(samples),
    );

    if run.resume {
        match JsonCheckpointWriter::load_best(&checkpoint_dir)? {
            Some(checkpoint) if checkpoint.config.enhancer != cfg.enhancer => {
                return Err(Error::Config(
                    "checkpoint architecture does not match the configured enhancer".into(),
                ));
            }
            Some(checkpoint) => {
                trainer.resume_from(checkpoint)?;
                if history_path.is_file() {
                    let saved: TrainHistory =
                        serde_json::from_reader(BufReader::new(File::open(&history_path)?))?;
                    trainer = trainer.with_history(saved);
                }
            }
            None => tracing::warn!(dir = %checkpoint_dir.display(), "no checkpoint to resume from; starting fresh"),
        }
    }

    let history = trainer.run(&train_loader, &val_loader)?;

    serde_json::to_writer_pretty(BufWriter::new(File::create(&history_path)?), &history)?;
    tracing::debug!(path = %history_path.display(), "wrote history");

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_minutes_and_seconds() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0m 0s");
        assert_eq!(format_elapsed(Duration::from_millis(187_900)), "3m 7s");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "60m 0s");
    }
}

use std::fmt;

use crate::data::Batch;
use crate::error::{Error, Result};
use crate::features::FeatureExtractor;
use crate::io::SampleWriter;
use crate::loss::LossComposer;
use crate::math::ImageTensor;
use crate::metrics::{BatchStats, Metric, MetricAccumulator};
use crate::model::Model;
use crate::optim::Optimizer;
use crate::train::epoch_stats::EpochStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Validate,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Validate => write!(f, "validation"),
        }
    }
}

/// Result of a validation pass.
#[derive(Debug, Clone)]
pub struct ValidationPass {
    pub stats: EpochStats,
    /// Model outputs for the last batch served.
    pub last_outputs: ImageTensor,
}

/// Drives one pass over a batch source, in either mode.
///
/// Holds the pieces that stay fixed for the whole run: the loss, the two
/// quality metrics and the sampling interval.
pub struct EpochRunner<F> {
    loss: LossComposer<F>,
    psnr: Box<dyn Metric>,
    ssim: Box<dyn Metric>,
    sample_interval: usize,
}

impl<F: FeatureExtractor> EpochRunner<F> {
    /// Fails when `sample_interval` is zero.
    pub fn new(
        loss: LossComposer<F>,
        psnr: Box<dyn Metric>,
        ssim: Box<dyn Metric>,
        sample_interval: usize,
    ) -> Result<Self> {
        if sample_interval == 0 {
            return Err(Error::Config("sample interval must be positive".into()));
        }
        Ok(EpochRunner { loss, psnr, ssim, sample_interval })
    }

    /// Whether validation outputs of `epoch` (1-based) go to the sample store.
    pub fn is_sample_epoch(&self, epoch: usize) -> bool {
        epoch % self.sample_interval == 0
    }

    pub fn loss(&self) -> &LossComposer<F> {
        &self.loss
    }

    fn quality(&self, outputs: &ImageTensor, targets: &ImageTensor) -> Result<(f64, f64)> {
        Ok((self.psnr.compute(outputs, targets)?, self.ssim.compute(outputs, targets)?))
    }

    /// One optimizer step per batch, in the order the batches arrive.
    pub fn train<M, I>(
        &self,
        model: &mut M,
        optimizer: &mut dyn Optimizer,
        batches: I,
        epoch: usize,
    ) -> Result<EpochStats>
    where
        M: Model,
        I: IntoIterator<Item = Result<Batch>>,
    {
        let mut acc = MetricAccumulator::new();
        for batch in batches {
            let batch = batch?;

            optimizer.zero_grad(model);
            let outputs = model.forward(&batch.inputs)?;
            let (terms, grad) = self.loss.evaluate_with_grad(&outputs, &batch.targets)?;
            let (psnr, ssim) = self.quality(&outputs, &batch.targets)?;
            model.backward(&grad)?;
            optimizer.step(model);

            tracing::trace!(
                epoch,
                batch = acc.batches() + 1,
                loss = terms.total,
                reconstruction = terms.reconstruction,
                perceptual = terms.perceptual,
                "train step"
            );
            acc.add(BatchStats { loss: terms.total, psnr, ssim });
        }
        acc.finalize(&Mode::Train.to_string())
    }

    /// Scores every batch without touching the model's weights.
    ///
    /// On sampling epochs the last batch's outputs go to `samples`.
    pub fn validate<M, I>(
        &self,
        model: &M,
        batches: I,
        epoch: usize,
        samples: &mut dyn SampleWriter,
    ) -> Result<ValidationPass>
    where
        M: Model,
        I: IntoIterator<Item = Result<Batch>>,
    {
        let mut acc = MetricAccumulator::new();
        let mut last_outputs = None;
        for batch in batches {
            let batch = batch?;

            let outputs = model.infer(&batch.inputs)?;
            let terms = self.loss.evaluate(&outputs, &batch.targets)?;
            let (psnr, ssim) = self.quality(&outputs, &batch.targets)?;

            acc.add(BatchStats { loss: terms.total, psnr, ssim });
            last_outputs = Some(outputs);
        }

        let stats = acc.finalize(&Mode::Validate.to_string())?;
        let last_outputs = last_outputs.ok_or_else(|| Error::EmptyDataSource(Mode::Validate.to_string()))?;

        if self.is_sample_epoch(epoch) {
            samples.persist(&last_outputs, epoch, false)?;
        }
        Ok(ValidationPass { stats, last_outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataLoader, InMemoryDataset, Sample};
    use crate::features::ConvFeatureExtractor;
    use crate::metrics::{Psnr, Ssim};
    use crate::model::{EnhancerSpec, PatchEnhancer};
    use crate::optim::OptimizerKind;
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        writes: Vec<(usize, bool, usize)>,
    }

    impl SampleWriter for Recorder {
        fn persist(&mut self, images: &ImageTensor, epoch: usize, is_best: bool) -> Result<()> {
            self.writes.push((epoch, is_best, images.batch));
            Ok(())
        }
    }

    fn loader(n: usize, batch_size: usize) -> DataLoader {
        let samples = (0..n)
            .map(|i| {
                let level = 0.05 + 0.02 * i as f64;
                Sample {
                    input: ImageTensor::full([1, 3, 6, 6], level),
                    target: ImageTensor::full([1, 3, 6, 6], 4.0 * level),
                }
            })
            .collect();
        DataLoader::new(Arc::new(InMemoryDataset::new("toy", samples)), batch_size).unwrap()
    }

    fn runner() -> EpochRunner<ConvFeatureExtractor> {
        EpochRunner::new(
            LossComposer::new(ConvFeatureExtractor::edge_bank(3), 0.5),
            Box::new(Psnr::default()),
            Box::new(Ssim::default()),
            20,
        )
        .unwrap()
    }

    fn model() -> PatchEnhancer {
        PatchEnhancer::new(EnhancerSpec::default(), &mut StdRng::seed_from_u64(42)).unwrap()
    }

    #[test]
    fn training_reduces_the_loss() {
        let runner = runner();
        let mut model = model();
        let mut optimizer = OptimizerKind::Adam.build(1e-2);
        let data = loader(6, 2);

        let first = runner.train(&mut model, optimizer.as_mut(), data.iter(1), 1).unwrap();
        let mut last = first;
        for epoch in 2..=15 {
            last = runner.train(&mut model, optimizer.as_mut(), data.iter(epoch), epoch).unwrap();
        }
        assert!(last.loss() < first.loss(), "{} !< {}", last.loss(), first.loss());
    }

    #[test]
    fn validation_leaves_weights_alone() {
        let runner = runner();
        let model = model();
        let before = model.state();
        let mut recorder = Recorder::default();
        let pass = runner.validate(&model, loader(5, 2).iter(1), 1, &mut recorder).unwrap();
        assert_eq!(model.state(), before);
        // Last batch of 5 samples in batches of 2 holds a single image.
        assert_eq!(pass.last_outputs.batch, 1);
        assert!(recorder.writes.is_empty());
    }

    #[test]
    fn validation_samples_only_on_interval_epochs() {
        let runner = runner();
        let model = model();
        let mut recorder = Recorder::default();
        for epoch in [19, 20, 21, 40] {
            runner.validate(&model, loader(3, 2).iter(epoch), epoch, &mut recorder).unwrap();
        }
        assert_eq!(recorder.writes, vec![(20, false, 1), (40, false, 1)]);
    }

    #[test]
    fn samples_every_twentieth_epoch() {
        let runner = runner();
        let sampled: Vec<usize> = (1..=60).filter(|&e| runner.is_sample_epoch(e)).collect();
        assert_eq!(sampled, vec![20, 40, 60]);
    }

    #[test]
    fn zero_sample_interval_is_rejected() {
        let runner = EpochRunner::new(
            LossComposer::new(ConvFeatureExtractor::edge_bank(3), 0.5),
            Box::new(Psnr::default()),
            Box::new(Ssim::default()),
            0,
        );
        assert!(matches!(runner, Err(Error::Config(_))));
    }

    #[test]
    fn stats_are_means_over_batches() {
        let runner = runner();
        let model = model();
        let data = loader(4, 1);
        let mut recorder = Recorder::default();
        let pass = runner.validate(&model, data.iter(1), 1, &mut recorder).unwrap();

        let mut total = 0.0;
        for batch in data.iter(1) {
            let batch = batch.unwrap();
            let out = model.infer(&batch.inputs).unwrap();
            total += runner.loss().evaluate(&out, &batch.targets).unwrap().total;
        }
        approx::assert_relative_eq!(pass.stats.loss(), total / 4.0, max_relative = 1e-12);
    }

    #[test]
    fn empty_source_is_an_error() {
        let runner = runner();
        let mut model = model();
        let mut optimizer = OptimizerKind::Sgd.build(0.1);
        let err = runner
            .train(&mut model, optimizer.as_mut(), std::iter::empty(), 1)
            .unwrap_err();
        assert!(matches!(err, Error::EmptyDataSource(_)));
    }
}

use crate::error::{Error, Result};
use crate::train::epoch_stats::EpochStats;

/// Loss and quality scores of a single batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchStats {
    pub loss: f64,
    pub psnr: f64,
    pub ssim: f64,
}

/// Running sums over the batches of one epoch phase.
#[derive(Debug, Default)]
pub struct MetricAccumulator {
    sums: BatchStats,
    batches: usize,
}

impl MetricAccumulator {
    pub fn new() -> MetricAccumulator {
        MetricAccumulator::default()
    }

    pub fn add(&mut self, stats: BatchStats) {
        self.sums.loss += stats.loss;
        self.sums.psnr += stats.psnr;
        self.sums.ssim += stats.ssim;
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Divides every sum by the number of batches added. `source` names the
    /// data source in the error when nothing was added.
    pub fn finalize(self, source: &str) -> Result<EpochStats> {
        if self.batches == 0 {
            return Err(Error::EmptyDataSource(source.to_string()));
        }
        let n = self.batches as f64;
        Ok(EpochStats::new(self.sums.loss / n, self.sums.psnr / n, self.sums.ssim / n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_yields_arithmetic_means() {
        let mut acc = MetricAccumulator::new();
        acc.add(BatchStats { loss: 1.0, psnr: 20.0, ssim: 0.5 });
        acc.add(BatchStats { loss: 3.0, psnr: 30.0, ssim: 0.7 });
        acc.add(BatchStats { loss: 2.0, psnr: 25.0, ssim: 0.9 });
        assert_eq!(acc.batches(), 3);
        let stats = acc.finalize("train").unwrap();
        assert!((stats.loss() - 2.0).abs() < 1e-12);
        assert!((stats.psnr() - 25.0).abs() < 1e-12);
        assert!((stats.ssim() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn order_of_batches_does_not_change_the_mean() {
        let batches = [
            BatchStats { loss: 0.1, psnr: 12.0, ssim: 0.2 },
            BatchStats { loss: 0.4, psnr: 18.0, ssim: 0.6 },
        ];
        let mut forward = MetricAccumulator::new();
        let mut reverse = MetricAccumulator::new();
        batches.iter().for_each(|b| forward.add(*b));
        batches.iter().rev().for_each(|b| reverse.add(*b));
        assert_eq!(forward.finalize("a").unwrap(), reverse.finalize("b").unwrap());
    }

    #[test]
    fn empty_phase_is_an_error() {
        let err = MetricAccumulator::new().finalize("validation").unwrap_err();
        assert!(matches!(err, Error::EmptyDataSource(ref s) if s == "validation"));
    }
}

use serde::{Serialize, Deserialize};

/// Mean loss / PSNR / SSIM of one phase (train or validation) of one epoch.
///
/// Produced by `MetricAccumulator::finalize`; there are no setters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    #[serde(with = "crate::io::float")]
    loss: f64,
    #[serde(with = "crate::io::float")]
    psnr: f64,
    #[serde(with = "crate::io::float")]
    ssim: f64,
}

impl EpochStats {
    pub fn new(loss: f64, psnr: f64, ssim: f64) -> EpochStats {
        EpochStats { loss, psnr, ssim }
    }

    pub fn loss(&self) -> f64 {
        self.loss
    }

    pub fn psnr(&self) -> f64 {
        self.psnr
    }

    pub fn ssim(&self) -> f64 {
        self.ssim
    }
}

/// Everything logged for a completed epoch.
///
/// When a progress channel is attached to the trainer, one `EpochReport` is
/// sent at the end of every epoch; the full list is also kept in the run
/// history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// 1-based epoch number.
    pub epoch: usize,
    pub total_epochs: usize,
    pub train: EpochStats,
    pub val: EpochStats,
    /// Whether this epoch's validation PSNR set a new best (and was checkpointed).
    pub improved: bool,
    /// Wall-clock duration of this epoch in milliseconds.
    pub elapsed_ms: u64,
}

/// Per-epoch loss curves plus the reports they came from.
///
/// Both loss vectors are sized to the configured epoch count up front and
/// filled at index `epoch - 1`; slots for epochs that never ran stay 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainHistory {
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    #[serde(with = "crate::io::float")]
    pub best_psnr: f64,
    pub reports: Vec<EpochReport>,
}

impl TrainHistory {
    pub fn new(epochs: usize) -> TrainHistory {
        TrainHistory {
            train_losses: vec![0.0; epochs],
            val_losses: vec![0.0; epochs],
            best_psnr: 0.0,
            reports: Vec::with_capacity(epochs),
        }
    }

    /// Prepares a saved history for a run resumed after `last_epoch`.
    ///
    /// Entries up to and including `last_epoch` are kept. Later ones belong to
    /// epochs that will be trained again and are cleared. The loss vectors are
    /// resized to `epochs`.
    pub fn continue_after(mut self, last_epoch: usize, epochs: usize) -> TrainHistory {
        let keep = last_epoch.min(epochs);
        for losses in [&mut self.train_losses, &mut self.val_losses] {
            losses.resize(epochs, 0.0);
            losses[keep..].iter_mut().for_each(|l| *l = 0.0);
        }
        self.reports.retain(|r| r.epoch <= keep);
        self
    }

    pub fn record(&mut self, report: EpochReport) {
        let slot = report.epoch - 1;
        self.train_losses[slot] = report.train.loss();
        self.val_losses[slot] = report.val.loss();
        self.reports.push(report);
    }
}

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::dataset::Dataset;
use crate::error::{Error, Result};
use crate::math::ImageTensor;

/// Inputs and targets of one mini-batch, stacked along the batch axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub inputs: ImageTensor,
    pub targets: ImageTensor,
}

/// Groups a dataset into ordered mini-batches.
///
/// The order for an epoch is a pure function of `(seed, epoch)`, so two runs
/// with the same seed, and a run resumed from a checkpoint, see identical
/// batches. With `num_workers > 0` batches are decoded on a background thread
/// up to `num_workers` batches ahead; they are still delivered in order.
#[derive(Clone)]
pub struct DataLoader {
    dataset: Arc<dyn Dataset>,
    batch_size: usize,
    shuffle: Option<u64>,
    num_workers: usize,
}

impl DataLoader {
    pub fn new(dataset: Arc<dyn Dataset>, batch_size: usize) -> Result<DataLoader> {
        if batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".into()));
        }
        Ok(DataLoader { dataset, batch_size, shuffle: None, num_workers: 0 })
    }

    /// Reshuffles every epoch from `seed`.
    pub fn shuffled(mut self, seed: u64) -> DataLoader {
        self.shuffle = Some(seed);
        self
    }

    pub fn with_workers(mut self, num_workers: usize) -> DataLoader {
        self.num_workers = num_workers;
        self
    }

    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample indices in the order they will be served during `epoch`.
    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(seed) = self.shuffle {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        order
    }

    /// Batches for `epoch`, in order.
    pub fn iter(&self, epoch: usize) -> Batches {
        let chunks: Vec<Vec<usize>> = self
            .epoch_order(epoch)
            .chunks(self.batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        if self.num_workers == 0 {
            return Batches::Inline {
                dataset: Arc::clone(&self.dataset),
                chunks: chunks.into_iter(),
            };
        }

        let expected = chunks.len();
        let (tx, rx) = mpsc::sync_channel(self.num_workers);
        let dataset = Arc::clone(&self.dataset);
        let handle = thread::spawn(move || {
            for chunk in chunks {
                let batch = load_batch(&*dataset, &chunk);
                let failed = batch.is_err();
                // Receiver gone: the consumer stopped early.
                if tx.send(batch).is_err() || failed {
                    break;
                }
            }
        });

        Batches::Prefetch {
            rx: Some(rx),
            handle: Some(handle),
            expected,
            delivered: 0,
        }
    }
}

fn load_batch(dataset: &dyn Dataset, indices: &[usize]) -> Result<Batch> {
    let samples = indices
        .iter()
        .map(|&i| dataset.get(i))
        .collect::<Result<Vec<_>>>()?;
    let (inputs, targets): (Vec<_>, Vec<_>) = samples.into_iter().map(|s| (s.input, s.target)).unzip();
    Ok(Batch {
        inputs: ImageTensor::stack(&inputs)?,
        targets: ImageTensor::stack(&targets)?,
    })
}

/// Iterator over one epoch's batches.
pub enum Batches {
    Inline {
        dataset: Arc<dyn Dataset>,
        chunks: std::vec::IntoIter<Vec<usize>>,
    },
    Prefetch {
        rx: Option<Receiver<Result<Batch>>>,
        handle: Option<JoinHandle<()>>,
        expected: usize,
        delivered: usize,
    },
}

impl Iterator for Batches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Batches::Inline { dataset, chunks } => {
                chunks.next().map(|chunk| load_batch(&**dataset, &chunk))
            }
            Batches::Prefetch { rx, expected, delivered, .. } => {
                if *delivered == *expected {
                    return None;
                }
                let rx = rx.as_ref()?;
                let item = rx.recv().unwrap_or(Err(Error::WorkerDisconnected(*delivered)));
                *delivered += 1;
                Some(item)
            }
        }
    }
}

impl Drop for Batches {
    fn drop(&mut self) {
        if let Batches::Prefetch { rx, handle, .. } = self {
            // Close the channel first so a worker blocked on `send` wakes up.
            drop(rx.take());
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    tracing::warn!("prefetch worker panicked");
                }
            }
        }
    }
}

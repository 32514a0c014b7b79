pub mod accumulator;
pub mod metric;
pub mod psnr;
pub mod ssim;

pub use accumulator::{BatchStats, MetricAccumulator};
pub use metric::Metric;
pub use psnr::Psnr;
pub use ssim::Ssim;

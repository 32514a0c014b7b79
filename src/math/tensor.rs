use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A batch of images stored as a flat NCHW buffer of `f64` in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageTensor {
    pub batch: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f64>,
}

impl ImageTensor {
    pub fn zeros(shape: [usize; 4]) -> ImageTensor {
        let [batch, channels, height, width] = shape;
        ImageTensor {
            batch,
            channels,
            height,
            width,
            data: vec![0.0; batch * channels * height * width],
        }
    }

    pub fn from_vec(shape: [usize; 4], data: Vec<f64>) -> Result<ImageTensor> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::shape("ImageTensor::from_vec", &[expected], &[data.len()]));
        }
        let [batch, channels, height, width] = shape;
        Ok(ImageTensor { batch, channels, height, width, data })
    }

    /// A tensor of the given shape with every element set to `value`.
    pub fn full(shape: [usize; 4], value: f64) -> ImageTensor {
        let mut t = ImageTensor::zeros(shape);
        t.data.iter_mut().for_each(|x| *x = value);
        t
    }

    pub fn shape(&self) -> [usize; 4] {
        [self.batch, self.channels, self.height, self.width]
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Elements in a single image (`C * H * W`).
    pub fn image_len(&self) -> usize {
        self.channels * self.height * self.width
    }

    #[inline]
    pub fn index(&self, n: usize, c: usize, y: usize, x: usize) -> usize {
        ((n * self.channels + c) * self.height + y) * self.width + x
    }

    #[inline]
    pub fn at(&self, n: usize, c: usize, y: usize, x: usize) -> f64 {
        self.data[self.index(n, c, y, x)]
    }

    /// One `H x W` plane.
    pub fn plane(&self, n: usize, c: usize) -> &[f64] {
        let len = self.height * self.width;
        let start = (n * self.channels + c) * len;
        &self.data[start..start + len]
    }

    /// The `n`-th image as its own single-item tensor.
    pub fn item(&self, n: usize) -> ImageTensor {
        let len = self.image_len();
        ImageTensor {
            batch: 1,
            channels: self.channels,
            height: self.height,
            width: self.width,
            data: self.data[n * len..(n + 1) * len].to_vec(),
        }
    }

    /// Concatenates single- or multi-item tensors along the batch axis.
    pub fn stack(items: &[ImageTensor]) -> Result<ImageTensor> {
        let first = items
            .first()
            .ok_or_else(|| Error::EmptyDataSource("ImageTensor::stack".into()))?;
        let mut data = Vec::with_capacity(items.iter().map(ImageTensor::numel).sum());
        let mut batch = 0;
        for item in items {
            if item.shape()[1..] != first.shape()[1..] {
                return Err(Error::shape("ImageTensor::stack", &first.shape(), &item.shape()));
            }
            batch += item.batch;
            data.extend_from_slice(&item.data);
        }
        Ok(ImageTensor {
            batch,
            channels: first.channels,
            height: first.height,
            width: first.width,
            data,
        })
    }

    /// Fails with `ShapeMismatch` unless both tensors have identical shapes.
    pub fn ensure_same_shape(&self, other: &ImageTensor, context: &'static str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::shape(context, &self.shape(), &other.shape()));
        }
        Ok(())
    }
}

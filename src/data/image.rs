//! Conversions between image files and `ImageTensor`s.
//!
//! Pixels are normalized to [0, 1] on the way in and clamped and quantized to
//! 8 bits on the way out.

use std::path::Path;

use image::imageops::FilterType;
use image::{Rgb, RgbImage};

use crate::error::{Error, Result};
use crate::math::ImageTensor;

/// Decodes an image file, resizes it to `size x size` (bilinear) and returns
/// it as a `1 x 3 x size x size` tensor.
pub fn load_rgb(path: &Path, size: u32) -> Result<ImageTensor> {
    let img = image::open(path).map_err(|source| Error::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let rgb = img.resize_exact(size, size, FilterType::Triangle).to_rgb8();
    Ok(rgb_to_tensor(&rgb))
}

pub fn rgb_to_tensor(img: &RgbImage) -> ImageTensor {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut t = ImageTensor::zeros([1, 3, h, w]);
    for (x, y, pixel) in img.enumerate_pixels() {
        for c in 0..3 {
            let idx = t.index(0, c, y as usize, x as usize);
            t.data[idx] = pixel.0[c] as f64 / 255.0;
        }
    }
    t
}

/// The `n`-th image of a 3-channel tensor as an 8-bit RGB image.
pub fn tensor_to_rgb(t: &ImageTensor, n: usize) -> Result<RgbImage> {
    if t.channels != 3 {
        return Err(Error::shape("tensor_to_rgb channels", &[3], &[t.channels]));
    }
    let mut img = RgbImage::new(t.width as u32, t.height as u32);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let (x, y) = (x as usize, y as usize);
        let channel = |c| (t.at(n, c, y, x).clamp(0.0, 1.0) * 255.0).round() as u8;
        *pixel = Rgb([channel(0), channel(1), channel(2)]);
    }
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixels_survive_a_tensor_round_trip() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(2, 1, Rgb([10, 128, 250]));
        let t = rgb_to_tensor(&img);
        assert_eq!(t.shape(), [1, 3, 2, 3]);
        assert_eq!(t.at(0, 0, 0, 0), 1.0);
        assert_eq!(tensor_to_rgb(&t, 0).unwrap(), img);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let t = ImageTensor::from_vec([1, 3, 1, 1], vec![1.7, -0.2, 0.5]).unwrap();
        let img = tensor_to_rgb(&t, 0).unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 0, 128]));
    }

    #[test]
    fn load_resizes_to_square() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        RgbImage::from_pixel(8, 4, Rgb([51, 102, 204])).save(&path).unwrap();
        let t = load_rgb(&path, 6).unwrap();
        assert_eq!(t.shape(), [1, 3, 6, 6]);
        assert!((t.at(0, 2, 3, 3) - 0.8).abs() < 0.005);
    }
}

use std::path::Path;

use image::{imageops::FilterType, DynamicImage};
use tch::{Kind, Tensor};

use crate::error::{PetalsError, Result};

/// Decoding and preprocessing shared by the loader and the predictor: RGB, exact nearest-neighbour resize to `width x height`, `[3, H, W]` float scaled into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePreprocess {
    pub width: u32,
    pub height: u32,
}

impl ImagePreprocess {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn apply(&self, image: &DynamicImage) -> Tensor {
        let resized = image
            .resize_exact(self.width, self.height, FilterType::Nearest)
            .to_rgb8();
        let data = resized.into_raw();
        Tensor::from_slice(&data)
            .view([self.height as i64, self.width as i64, 3])
            .permute([2, 0, 1])
            .to_kind(Kind::Float)
            / 255.0
    }

    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Tensor> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| PetalsError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.apply(&image))
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    #[test]
    fn channels_first_and_scaled() {
        let mut image = RgbImage::new(4, 2);
        image.put_pixel(3, 1, Rgb([255, 51, 0]));
        let tensor = ImagePreprocess::new(4, 2).apply(&DynamicImage::ImageRgb8(image));
        assert_eq!(tensor.size(), [3, 2, 4]);
        assert_eq!(tensor.kind(), Kind::Float);
        let pixel = tensor.select(2, 3).select(1, 1);
        assert!((f64::try_from(pixel.get(0)).unwrap() - 1.0).abs() < 1e-6);
        assert!((f64::try_from(pixel.get(1)).unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(f64::try_from(pixel.get(2)).unwrap(), 0.0);
    }

    #[test]
    fn resizes_to_target() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(37, 11, Rgb([10, 20, 30])));
        let tensor = ImagePreprocess::new(16, 24).apply(&image);
        assert_eq!(tensor.size(), [3, 24, 16]);
        assert!(f64::try_from(tensor.max()).unwrap() <= 1.0);
    }

    #[test]
    fn grayscale_is_expanded_to_rgb() {
        let gray = image::GrayImage::from_pixel(5, 5, image::Luma([128]));
        let image = DynamicImage::ImageLuma8(gray);
        let tensor = ImagePreprocess::new(5, 5).apply(&image);
        assert_eq!(tensor.size(), [3, 5, 5]);
    }
}

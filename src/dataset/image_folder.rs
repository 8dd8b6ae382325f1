use std::path::{Path, PathBuf};

use pariter::IteratorExt as _;
use tch::Tensor;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{ClassLabels, Dataset, ImagePreprocess};
use crate::error::{PetalsError, Result};

/// File extensions picked up when scanning class folders, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// The result of scanning `root/<class>/**` for every class, in label order.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    labels: ClassLabels,
    /// Image paths per class, sorted by directory then file name.
    files: Vec<Vec<PathBuf>>,
}

impl ImageFolder {
    pub fn scan<P: AsRef<Path>>(root: P, labels: &ClassLabels) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(PetalsError::MissingDataset(root.to_path_buf()));
        }
        let mut files = Vec::with_capacity(labels.len());
        for class in labels.names() {
            let dir = root.join(class);
            if !dir.is_dir() {
                return Err(PetalsError::MissingClass {
                    class: class.clone(),
                    path: dir,
                });
            }
            let mut images = Vec::new();
            for entry in WalkDir::new(&dir) {
                let entry = entry.map_err(|e| PetalsError::Io {
                    path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.clone()),
                    source: e.into(),
                })?;
                if entry.file_type().is_file() && is_image(entry.path()) {
                    images.push(entry.into_path());
                }
            }
            if images.is_empty() {
                return Err(PetalsError::EmptyClass {
                    class: class.clone(),
                    path: dir,
                });
            }
            images.sort_by(|a, b| (a.parent(), a.file_name()).cmp(&(b.parent(), b.file_name())));
            debug!(class = %class, images = images.len(), "scanned class folder");
            files.push(images);
        }
        Ok(Self {
            root: root.to_path_buf(),
            labels: labels.clone(),
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.files.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of images found for each class, in label order.
    pub fn class_counts(&self) -> Vec<usize> {
        self.files.iter().map(Vec::len).collect()
    }

    /// Splits every class independently: its first `floor(validation_split * n)` images go to validation, the rest to training.
    ///
    /// Returns `(training, validation)`.
    pub fn split(
        &self,
        validation_split: f64,
        preprocess: ImagePreprocess,
    ) -> Result<(ImageFolderDataset, ImageFolderDataset)> {
        if !(0.0..1.0).contains(&validation_split) {
            return Err(PetalsError::Config(format!(
                "validation_split must be in [0, 1), got {}",
                validation_split
            )));
        }
        let num_classes = self.labels.len();
        let mut training = Vec::new();
        let mut validation = Vec::new();
        for (label, images) in self.files.iter().enumerate() {
            let cut = (validation_split * images.len() as f64).floor() as usize;
            validation.extend(images[..cut].iter().map(|path| (path.clone(), label)));
            training.extend(images[cut..].iter().map(|path| (path.clone(), label)));
        }
        let training = ImageFolderDataset::new(training, preprocess, num_classes)?;
        let validation = ImageFolderDataset::new(validation, preprocess, num_classes)?;
        self.report("training", &training);
        self.report("validation", &validation);
        Ok((training, validation))
    }

    fn report(&self, subset: &str, dataset: &ImageFolderDataset) {
        info!(
            "Found {} {} images belonging to {} classes.",
            dataset.size(),
            subset,
            self.labels.len()
        );
        for (name, count) in self.labels.names().iter().zip(dataset.class_counts()) {
            debug!(subset, class = %name, images = count);
        }
    }
}

/// Labelled image paths, decoded and preprocessed only when a batch is collated.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    samples: Vec<(PathBuf, usize)>,
    preprocess: ImagePreprocess,
    num_classes: usize,
}

impl ImageFolderDataset {
    /// Fails when a sample's label is not below `num_classes`.
    pub fn new(
        samples: Vec<(PathBuf, usize)>,
        preprocess: ImagePreprocess,
        num_classes: usize,
    ) -> Result<Self> {
        if let Some((path, label)) = samples.iter().find(|(_, label)| *label >= num_classes) {
            return Err(PetalsError::Config(format!(
                "{} is labelled {} but there are only {} classes",
                path.display(),
                label,
                num_classes
            )));
        }
        Ok(Self {
            samples,
            preprocess,
            num_classes,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn preprocess(&self) -> ImagePreprocess {
        self.preprocess
    }

    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes];
        for (_, label) in &self.samples {
            counts[*label] += 1;
        }
        counts
    }
}

impl Dataset for ImageFolderDataset {
    type DataType = (PathBuf, usize);
    type BatchType = (Tensor, Tensor);

    fn data(&self) -> &[Self::DataType] {
        &self.samples
    }

    /// Decodes the images on a worker pool, keeping their order, and stacks them into `[B, 3, H, W]` with `[B, C]` one-hot labels.
    fn collate(&self, data: Vec<Self::DataType>) -> Result<Self::BatchType> {
        let preprocess = self.preprocess;
        let (paths, labels): (Vec<_>, Vec<_>) = data.into_iter().unzip();
        let images = paths
            .into_iter()
            .parallel_map(move |path| preprocess.load(path))
            .collect::<Result<Vec<_>>>()?;
        let labels = labels.iter().map(|&l| l as i64).collect::<Vec<_>>();
        let labels = Tensor::from_slice(&labels)
            .one_hot(self.num_classes as i64)
            .to_kind(tch::Kind::Float);
        Ok((Tensor::f_stack(&images, 0)?, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(is_image(Path::new("a/b/photo.JPG")));
        assert!(is_image(Path::new("scan.tiff")));
        assert!(!is_image(Path::new("notes.txt")));
        assert!(!is_image(Path::new("LICENSE")));
    }

    #[test]
    fn class_counts_follow_labels() {
        let dataset = ImageFolderDataset::new(
            vec![
                (PathBuf::from("a.png"), 1),
                (PathBuf::from("b.png"), 1),
                (PathBuf::from("c.png"), 0),
            ],
            ImagePreprocess::new(8, 8),
            3,
        )
        .unwrap();
        assert_eq!(dataset.class_counts(), vec![1, 2, 0]);
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let samples = vec![(PathBuf::from("a.png"), 0), (PathBuf::from("b.png"), 3)];
        let error = ImageFolderDataset::new(samples, ImagePreprocess::new(8, 8), 3).unwrap_err();
        assert!(error.is_configuration_error());
        assert!(error.to_string().contains("b.png"));
    }
}

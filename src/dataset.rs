//! Class-folder image dataset loading.
//!
//! A dataset root contains one subdirectory per class; every image file
//! inside a subdirectory is a sample of that class. Class indices are
//! assigned by sorting the subdirectory names alphabetically, so train and
//! test splits with the same folder names agree on the label mapping.
//!
//! Pixels are decoded as RGB, scaled to `[0, 1]`, then normalized with mean
//! 0.5 and standard deviation 0.5 per channel, giving values in `[-1, 1]`.
//! Samples are stored as flat CHW buffers (all red values, then green, then
//! blue).

use std::error::Error;
use std::fs;
use std::path::Path;

/// In-memory image dataset with one label per sample.
pub struct ClassFolderDataset {
    classes: Vec<String>,
    images: Vec<f32>,
    labels: Vec<u8>,
    height: usize,
    width: usize,
}

/// Channels per sample (RGB).
pub const CHANNELS: usize = 3;

impl ClassFolderDataset {
    /// Load every image under `root`, one subdirectory per class.
    ///
    /// Fails if `root` is missing, contains no class subdirectories, an
    /// image cannot be decoded, or images disagree on resolution. Error
    /// messages name the offending path.
    pub fn load(root: &Path) -> Result<Self, Box<dyn Error>> {
        let entries = fs::read_dir(root)
            .map_err(|e| format!("cannot read dataset directory {}: {}", root.display(), e))?;

        let mut class_dirs: Vec<_> = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                class_dirs.push(entry.path());
            }
        }
        if class_dirs.is_empty() {
            return Err(format!("no class subdirectories in {}", root.display()).into());
        }
        class_dirs.sort();

        let classes: Vec<String> = class_dirs
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| format!("invalid class directory name under {}", root.display()))
            })
            .collect::<Result<_, _>>()?;

        if classes.len() > u8::MAX as usize {
            return Err(format!(
                "too many classes in {}: {} (max {})",
                root.display(),
                classes.len(),
                u8::MAX
            )
            .into());
        }

        let mut images = Vec::new();
        let mut labels = Vec::new();
        let mut height = 0usize;
        let mut width = 0usize;

        for (class_idx, dir) in class_dirs.iter().enumerate() {
            let mut files: Vec<_> = fs::read_dir(dir)
                .map_err(|e| format!("cannot read class directory {}: {}", dir.display(), e))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            files.sort();

            for file in &files {
                let img = image::open(file)
                    .map_err(|e| format!("cannot decode image {}: {}", file.display(), e))?
                    .to_rgb8();

                let (w, h) = (img.width() as usize, img.height() as usize);
                if images.is_empty() {
                    height = h;
                    width = w;
                } else if h != height || w != width {
                    return Err(format!(
                        "image {} is {}x{}, expected {}x{}",
                        file.display(),
                        w,
                        h,
                        width,
                        height
                    )
                    .into());
                }

                // RGB interleaved to planar CHW, normalized to [-1, 1].
                let spatial = height * width;
                let base = images.len();
                images.resize(base + CHANNELS * spatial, 0.0);
                for (i, pixel) in img.pixels().enumerate() {
                    for c in 0..CHANNELS {
                        let scaled = pixel.0[c] as f32 / 255.0;
                        images[base + c * spatial + i] = (scaled - 0.5) / 0.5;
                    }
                }
                labels.push(class_idx as u8);
            }
        }

        if labels.is_empty() {
            return Err(format!("no images found under {}", root.display()).into());
        }

        Ok(Self {
            classes,
            images,
            labels,
            height,
            width,
        })
    }

    /// Build a dataset from pre-normalized buffers. Intended for tests and
    /// synthetic data.
    pub fn from_parts(
        classes: Vec<String>,
        images: Vec<f32>,
        labels: Vec<u8>,
        height: usize,
        width: usize,
    ) -> Self {
        let sample_size = CHANNELS * height * width;
        assert_eq!(
            images.len(),
            labels.len() * sample_size,
            "image buffer does not match label count"
        );
        assert!(
            labels.iter().all(|&l| (l as usize) < classes.len()),
            "label out of range"
        );
        Self {
            classes,
            images,
            labels,
            height,
            width,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Class names in label order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Flat values per sample (`CHANNELS * height * width`).
    pub fn sample_size(&self) -> usize {
        CHANNELS * self.height * self.width
    }

    pub fn images(&self) -> &[f32] {
        &self.images
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Copy `count` samples selected by `indices[start..start + count]` into
    /// contiguous batch buffers.
    pub fn gather_batch(
        &self,
        indices: &[usize],
        start: usize,
        count: usize,
        out_inputs: &mut [f32],
        out_labels: &mut [u8],
    ) {
        let sample_size = self.sample_size();
        assert!(start + count <= indices.len());
        assert!(out_inputs.len() >= count * sample_size);
        assert!(out_labels.len() >= count);

        for (slot, &sample_idx) in indices[start..start + count].iter().enumerate() {
            let src = &self.images[sample_idx * sample_size..(sample_idx + 1) * sample_size];
            out_inputs[slot * sample_size..(slot + 1) * sample_size].copy_from_slice(src);
            out_labels[slot] = self.labels[sample_idx];
        }
    }
}

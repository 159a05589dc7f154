use crate::classifier::{
    pixel_buffer, QualityNetConfig, ALLOWED_EXTENSIONS, CHANNELS, IMAGE_SIZE,
};
use anyhow::{bail, Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, Autodiff, NdArray},
    module::{AutodiffModule, Module},
    nn::loss::BinaryCrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{BinFileRecorder, FullPrecisionSettings},
    tensor::{activation, backend::Backend, Int, Tensor, TensorData},
};
use rand::{seq::SliceRandom, thread_rng};
use std::{
    fs,
    path::{Path, PathBuf},
};

type TrainBackend = Autodiff<NdArray>;

const BATCH_SIZE: usize = 16;
const LEARNING_RATE: f64 = 1e-3;
const VALIDATION_SPLIT: f64 = 0.2;

struct Sample {
    path: PathBuf,
    label: i64,
}

/// One subdirectory per class; sorted directory order defines the
/// labels, so the second class is the sigmoid-positive one.
fn collect_samples(data_dir: &Path) -> Result<Vec<Sample>> {
    let mut classes = Vec::new();
    for entry in fs::read_dir(data_dir)
        .with_context(|| format!("Failed to read dataset directory {}", data_dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            classes.push(path);
        }
    }
    classes.sort();
    if classes.len() != 2 {
        bail!(
            "expected exactly two class directories under {}, found {}",
            data_dir.display(),
            classes.len()
        );
    }
    let mut samples = Vec::new();
    for (label, class_dir) in classes.iter().enumerate() {
        for entry in fs::read_dir(class_dir)? {
            let path = entry?.path();
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            if matches!(extension.as_deref(), Some(e) if ALLOWED_EXTENSIONS.contains(&e)) {
                samples.push(Sample {
                    path,
                    label: label as i64,
                });
            }
        }
    }
    if samples.is_empty() {
        bail!("no images found under {}", data_dir.display());
    }
    Ok(samples)
}

fn load_batch<B: Backend>(
    samples: &[Sample],
    device: &B::Device,
) -> Result<(Tensor<B, 4>, Tensor<B, 1, Int>)> {
    let mut pixels = Vec::with_capacity(samples.len() * CHANNELS * IMAGE_SIZE * IMAGE_SIZE);
    let mut labels = Vec::with_capacity(samples.len());
    for sample in samples {
        let image = image::open(&sample.path)
            .with_context(|| format!("Failed to read {}", sample.path.display()))?;
        pixels.extend(pixel_buffer(&image));
        labels.push(sample.label);
    }
    let images = Tensor::<B, 4>::from_data(
        TensorData::new(pixels, [samples.len(), CHANNELS, IMAGE_SIZE, IMAGE_SIZE]),
        device,
    );
    let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [samples.len()]), device);
    Ok((images, targets))
}

fn validation_accuracy(
    model: &crate::classifier::QualityNet<NdArray>,
    samples: &[Sample],
    device: &NdArrayDevice,
) -> Result<f64> {
    if samples.is_empty() {
        return Ok(0.0);
    }
    let mut correct = 0i64;
    for batch in samples.chunks(BATCH_SIZE) {
        let (images, targets) = load_batch::<NdArray>(batch, device)?;
        let probabilities = activation::sigmoid(model.forward(images).reshape([-1]));
        let predicted = probabilities.greater_equal_elem(0.5).int();
        correct += predicted.equal(targets).int().sum().into_scalar();
    }
    Ok(correct as f64 / samples.len() as f64)
}

/// Offline one-shot training; writes the weights the server loads.
pub fn execute(data_dir: &Path, model_path: &Path, epochs: usize) -> Result<()> {
    let device = NdArrayDevice::default();
    let mut samples = collect_samples(data_dir)?;
    samples.shuffle(&mut thread_rng());
    let validation_len = (samples.len() as f64 * VALIDATION_SPLIT) as usize;
    let (validation, training) = samples.split_at(validation_len);
    println!(
        "training on {} images, validating on {}",
        training.len(),
        validation.len()
    );

    let mut model = QualityNetConfig::new().init::<TrainBackend>(&device);
    let mut optim = AdamConfig::new().init();
    let loss_fn = BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init::<TrainBackend>(&device);

    for epoch in 1..=epochs {
        let mut epoch_loss = 0.0f32;
        let mut batches = 0usize;
        for batch in training.chunks(BATCH_SIZE) {
            let (images, targets) = load_batch::<TrainBackend>(batch, &device)?;
            let logits = model.forward(images).reshape([-1]);
            let loss = loss_fn.forward(logits, targets);
            epoch_loss += loss.clone().into_scalar();
            batches += 1;
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(LEARNING_RATE, model, grads);
        }
        let accuracy = validation_accuracy(&model.valid(), validation, &device)?;
        println!(
            "epoch {epoch}/{epochs}: loss {:.4}, val accuracy {:.3}",
            epoch_loss / batches.max(1) as f32,
            accuracy
        );
    }

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent)?;
    }
    model
        .save_file(model_path, &BinFileRecorder::<FullPrecisionSettings>::new())
        .context("Failed to save classifier weights")?;
    println!("saved classifier weights to {}", model_path.display());
    Ok(())
}

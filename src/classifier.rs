use anyhow::{Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, NdArray},
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    record::{BinFileRecorder, FullPrecisionSettings},
    tensor::{activation, backend::Backend, Tensor, TensorData},
};
use image::{imageops::FilterType, DynamicImage};
use std::path::Path;

pub const IMAGE_SIZE: usize = 128;
pub const CHANNELS: usize = 3;
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Seam between the HTTP layer and the network: an image in, the
/// probability that the pictured product passes inspection out.
pub trait QualityModel: Send + Sync {
    fn pass_probability(&self, image: &DynamicImage) -> Result<f32>;
}

#[derive(Config, Debug)]
pub struct QualityNetConfig {
    #[config(default = 0.5)]
    pub dropout: f64,
    #[config(default = 64)]
    pub hidden_size: usize,
}

/// Two convolution/pooling blocks, dropout, a dense layer and a single
/// logit output. Sized for 128x128 RGB input.
#[derive(Module, Debug)]
pub struct QualityNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    dropout: Dropout,
    fc1: Linear<B>,
    fc2: Linear<B>,
    activation: Relu,
}

impl QualityNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> QualityNet<B> {
        // 128 -> 126 -> 63 -> 61 -> 30 across the two conv/pool blocks
        let flat_features = 64 * 30 * 30;
        QualityNet {
            conv1: Conv2dConfig::new([CHANNELS, 32], [3, 3]).init(device),
            conv2: Conv2dConfig::new([32, 64], [3, 3]).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc1: LinearConfig::new(flat_features, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, 1).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> QualityNet<B> {
    /// Raw logits shaped `[batch, 1]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self
            .pool
            .forward(self.activation.forward(self.conv1.forward(images)));
        let x = self
            .pool
            .forward(self.activation.forward(self.conv2.forward(x)));
        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = self.dropout.forward(x);
        let x = self.activation.forward(self.fc1.forward(x));
        self.fc2.forward(x)
    }
}

/// Resizes to the network input dimension and rescales pixels into
/// [0, 1], channel-major.
pub fn pixel_buffer(image: &DynamicImage) -> Vec<f32> {
    let resized = image
        .resize_exact(IMAGE_SIZE as u32, IMAGE_SIZE as u32, FilterType::Triangle)
        .to_rgb8();
    let mut pixels = vec![0.0f32; CHANNELS * IMAGE_SIZE * IMAGE_SIZE];
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..CHANNELS {
            pixels[channel * IMAGE_SIZE * IMAGE_SIZE + y as usize * IMAGE_SIZE + x as usize] =
                f32::from(pixel[channel]) / 255.0;
        }
    }
    pixels
}

pub fn image_to_tensor<B: Backend>(image: &DynamicImage, device: &B::Device) -> Tensor<B, 4> {
    Tensor::<B, 4>::from_data(
        TensorData::new(pixel_buffer(image), [1, CHANNELS, IMAGE_SIZE, IMAGE_SIZE]),
        device,
    )
}

/// The trained network, loaded once at startup and shared read-only
/// across requests.
pub struct CnnClassifier {
    model: QualityNet<NdArray>,
    device: NdArrayDevice,
}

impl CnnClassifier {
    pub fn load(path: &Path) -> Result<Self> {
        let device = NdArrayDevice::default();
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let model = QualityNetConfig::new()
            .init::<NdArray>(&device)
            .load_file(path, &recorder, &device)
            .with_context(|| {
                format!("Failed to load classifier weights from {}", path.display())
            })?;
        Ok(Self { model, device })
    }
}

impl QualityModel for CnnClassifier {
    fn pass_probability(&self, image: &DynamicImage) -> Result<f32> {
        let input = image_to_tensor::<NdArray>(image, &self.device);
        let output = activation::sigmoid(self.model.forward(input));
        Ok(output.into_scalar())
    }
}

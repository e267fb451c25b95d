use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    module::{Module, Param},
    nn::{
        conv::{Conv2d, Conv2dConfig, Conv2dRecord},
        pool::{AvgPool2d, AvgPool2dConfig},
        Linear, LinearConfig, LinearRecord, PaddingConfig2d, Relu,
    },
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::{backend::Backend, Tensor},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

use crate::error::LoadError;

/// Side of the square grayscale input the network was built for.
pub const INPUT_SIZE: usize = 28;

const CONV1_CHANNELS: usize = 6;
const CONV2_CHANNELS: usize = 16;
const KERNEL_SIZE: usize = 5;
const FLATTENED: usize = CONV2_CHANNELS * 5 * 5;
const FC1_OUTPUT: usize = 120;
const FC2_OUTPUT: usize = 84;

/// LeNet digit classifier.
///
/// Two convolution blocks (convolution, 2x2 average pooling, ReLU) followed by three
/// fully connected layers. There is no activation between the fully connected layers,
/// the trained parameters expect exactly this topology.
///
/// Field names match the keys of the persisted state dict (`conv1.weight`, `fc3.bias`, ...).
#[derive(Module, Debug)]
pub struct LeNetClassifier<B: Backend> {
    conv1: Conv2d<B>,
    avgpool1: AvgPool2d,
    conv2: Conv2d<B>,
    avgpool2: AvgPool2d,
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    activation: Relu,
}

/// Configuration to create a [LeNet classifier](LeNetClassifier).
#[derive(Config, Debug)]
pub struct LeNetClassifierConfig {
    /// Number of output classes.
    #[config(default = 10)]
    pub num_classes: usize,
}

/// On-disk formats the classifier parameters can be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// PyTorch state dict saved with `torch.save` (`.pt`, `.pth`).
    PyTorch,
    /// Named MessagePack record (`.mpk`).
    NamedMpk,
}

impl RecordFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "pt" | "pth" => Ok(Self::PyTorch),
            "mpk" => Ok(Self::NamedMpk),
            _ => Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }
}

impl LeNetClassifierConfig {
    /// Returns the initialized classifier with random parameters.
    pub fn init<B: Backend>(&self, device: &B::Device) -> LeNetClassifier<B> {
        let conv1 = Conv2dConfig::new([1, CONV1_CHANNELS], [KERNEL_SIZE, KERNEL_SIZE])
            .with_padding(PaddingConfig2d::Explicit(2, 2))
            .init(device);
        let conv2 = Conv2dConfig::new([CONV1_CHANNELS, CONV2_CHANNELS], [KERNEL_SIZE, KERNEL_SIZE])
            .init(device);

        LeNetClassifier {
            conv1,
            avgpool1: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv2,
            avgpool2: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1: LinearConfig::new(FLATTENED, FC1_OUTPUT).init(device),
            fc2: LinearConfig::new(FC1_OUTPUT, FC2_OUTPUT).init(device),
            fc3: LinearConfig::new(FC2_OUTPUT, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }

    /// Load the classifier parameters from `path`.
    ///
    /// The format is picked from the extension, see [RecordFormat]. Every parameter is checked
    /// against the topology before it is loaded, so a state dict saved for another number of
    /// classes is reported as [LoadError::ShapeMismatch].
    pub fn load<B: Backend>(
        &self,
        path: impl AsRef<Path>,
        device: &B::Device,
    ) -> Result<LeNetClassifier<B>, LoadError> {
        let path = path.as_ref();

        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let format = RecordFormat::from_path(path)?;
        log::info!(
            "Loading classifier parameters from '{}' ({format:?})",
            path.display()
        );

        let record = match format {
            RecordFormat::PyTorch => PyTorchFileRecorder::<FullPrecisionSettings>::default()
                .load::<LeNetClassifierRecord<B>>(LoadArgs::new(path.to_path_buf()), device),
            RecordFormat::NamedMpk => NamedMpkFileRecorder::<FullPrecisionSettings>::default()
                .load::<LeNetClassifierRecord<B>>(PathBuf::from(path), device),
        }?;

        self.check_record(&record)?;
        log::debug!("Parameter shapes match a {}-class LeNet", self.num_classes);

        Ok(self.init(device).load_record(record))
    }

    fn check_record<B: Backend>(&self, record: &LeNetClassifierRecord<B>) -> Result<(), LoadError> {
        check_conv(
            "conv1",
            &record.conv1,
            [CONV1_CHANNELS, 1, KERNEL_SIZE, KERNEL_SIZE],
        )?;
        check_conv(
            "conv2",
            &record.conv2,
            [CONV2_CHANNELS, CONV1_CHANNELS, KERNEL_SIZE, KERNEL_SIZE],
        )?;
        check_linear("fc1", &record.fc1, [FLATTENED, FC1_OUTPUT])?;
        check_linear("fc2", &record.fc2, [FC1_OUTPUT, FC2_OUTPUT])?;
        check_linear("fc3", &record.fc3, [FC2_OUTPUT, self.num_classes])
    }
}

fn check_conv<B: Backend>(
    name: &str,
    record: &Conv2dRecord<B>,
    weight: [usize; 4],
) -> Result<(), LoadError> {
    check_param(format!("{name}.weight"), &record.weight, weight)?;
    check_bias(name, record.bias.as_ref(), weight[0])
}

// Linear weights are stored as `[d_input, d_output]`, the PyTorch recorder transposes them.
fn check_linear<B: Backend>(
    name: &str,
    record: &LinearRecord<B>,
    weight: [usize; 2],
) -> Result<(), LoadError> {
    check_param(format!("{name}.weight"), &record.weight, weight)?;
    check_bias(name, record.bias.as_ref(), weight[1])
}

fn check_bias<B: Backend>(
    name: &str,
    bias: Option<&Param<Tensor<B, 1>>>,
    size: usize,
) -> Result<(), LoadError> {
    let parameter = format!("{name}.bias");

    match bias {
        Some(bias) => check_param(parameter, bias, [size]),
        None => Err(LoadError::MissingParameter(parameter)),
    }
}

fn check_param<B: Backend, const D: usize>(
    parameter: String,
    param: &Param<Tensor<B, D>>,
    expected: [usize; D],
) -> Result<(), LoadError> {
    let actual = param.val().dims();

    if actual == expected {
        Ok(())
    } else {
        Err(LoadError::ShapeMismatch {
            parameter,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

impl<B: Backend> LeNetClassifier<B> {
    /// Applies the forward pass on the input tensor.
    ///
    /// # Shapes
    ///
    /// - input: `[batch_size, 1, 28, 28]`
    /// - output: `[batch_size, num_classes]`, raw logits
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(input); // [batch_size, 6, 28, 28]
        let x = self.avgpool1.forward(x); // [batch_size, 6, 14, 14]
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x); // [batch_size, 16, 10, 10]
        let x = self.avgpool2.forward(x); // [batch_size, 16, 5, 5]
        let x = self.activation.forward(x);

        let x: Tensor<B, 2> = x.flatten(1, 3); // [batch_size, 400]
        let x = self.fc1.forward(x);
        let x = self.fc2.forward(x);

        self.fc3.forward(x)
    }

    /// Number of classes the last layer scores.
    pub fn num_classes(&self) -> usize {
        self.fc3.weight.val().dims()[1]
    }

    /// Device holding the parameters.
    pub fn device(&self) -> B::Device {
        self.fc3.weight.val().device()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::{Distribution, TensorData, Tolerance};
    use tempfile::TempDir;

    // State dicts written by `tests/fixtures/lenet.py`.
    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn random_input(batch_size: usize) -> Tensor<TestBackend, 4> {
        Tensor::random(
            [batch_size, 1, INPUT_SIZE, INPUT_SIZE],
            Distribution::Normal(0.0, 1.0),
            &Default::default(),
        )
    }

    fn save_mpk(model: &LeNetClassifier<TestBackend>, dir: &TempDir) -> PathBuf {
        let path = dir.path().join("lenet");
        model
            .clone()
            .save_file(
                path.clone(),
                &NamedMpkFileRecorder::<FullPrecisionSettings>::default(),
            )
            .expect("Should save the record");

        path.with_extension("mpk")
    }

    #[test]
    fn forward_outputs_one_logit_per_class() {
        let device = Default::default();
        let model = LeNetClassifierConfig::new().init::<TestBackend>(&device);

        let output = model.forward(random_input(1));

        assert_eq!(output.dims(), [1, 10]);
        assert_eq!(model.num_classes(), 10);
    }

    #[test]
    fn forward_supports_custom_num_classes_and_batches() {
        let device = Default::default();
        let model = LeNetClassifierConfig::new()
            .with_num_classes(3)
            .init::<TestBackend>(&device);

        let output = model.forward(random_input(2));

        assert_eq!(output.dims(), [2, 3]);
        assert_eq!(model.num_classes(), 3);
    }

    #[test]
    fn forward_is_deterministic() {
        let device = Default::default();
        let model = LeNetClassifierConfig::new().init::<TestBackend>(&device);
        let input = random_input(1);

        let first = model.forward(input.clone());
        let second = model.forward(input);

        first.into_data().assert_eq(&second.into_data(), true);
    }

    #[test]
    fn should_load_saved_parameters() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let model = LeNetClassifierConfig::new().init::<TestBackend>(&device);
        let path = save_mpk(&model, &dir);
        let input = random_input(1);

        let loaded = LeNetClassifierConfig::new()
            .load::<TestBackend>(&path, &device)
            .expect("Should load the record");

        loaded
            .forward(input.clone())
            .into_data()
            .assert_approx_eq::<f32>(&model.forward(input).into_data(), Tolerance::default());
    }

    #[test]
    fn should_reject_wrong_num_classes() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let model = LeNetClassifierConfig::new()
            .with_num_classes(5)
            .init::<TestBackend>(&device);
        let path = save_mpk(&model, &dir);

        let result = LeNetClassifierConfig::new().load::<TestBackend>(&path, &device);

        match result {
            Err(LoadError::ShapeMismatch {
                parameter,
                expected,
                actual,
            }) => {
                assert_eq!(parameter, "fc3.weight");
                assert_eq!(expected, vec![84, 10]);
                assert_eq!(actual, vec![84, 5]);
            }
            other => panic!("Expected a shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn should_load_pytorch_state_dict() {
        let device = Default::default();
        let model = LeNetClassifierConfig::new()
            .load::<TestBackend>(fixture("lenet.pt"), &device)
            .expect("Should decode state successfully");
        let pixels = (0..INPUT_SIZE * INPUT_SIZE)
            .map(|i| ((i % 17) as f32 - 8.0) / 8.0)
            .collect::<Vec<_>>();
        let input = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(pixels, [1, 1, INPUT_SIZE, INPUT_SIZE]),
            &device,
        );

        let output = model.forward(input);

        let expected = Tensor::<TestBackend, 2>::from_data(
            [[
                0.0122874, -0.0386738, -0.066687, -0.1013026, -0.0569298, 0.0510285, 0.1104077,
                0.2407957, 0.1538869, 0.0157238,
            ]],
            &device,
        );
        output
            .to_data()
            .assert_approx_eq::<f32>(&expected.to_data(), Tolerance::absolute(1e-5));
    }

    #[test]
    fn should_load_pytorch_state_dict_with_custom_num_classes() {
        let device = Default::default();

        let model = LeNetClassifierConfig::new()
            .with_num_classes(7)
            .load::<TestBackend>(fixture("lenet_7_classes.pt"), &device)
            .expect("Should decode state successfully");

        assert_eq!(model.num_classes(), 7);
        assert_eq!(model.forward(random_input(1)).dims(), [1, 7]);
    }

    #[test]
    fn should_reject_pytorch_state_dict_with_wrong_num_classes() {
        let device = Default::default();

        let result = LeNetClassifierConfig::new()
            .load::<TestBackend>(fixture("lenet_7_classes.pt"), &device);

        match result {
            Err(LoadError::ShapeMismatch {
                parameter,
                expected,
                actual,
            }) => {
                assert_eq!(parameter, "fc3.weight");
                assert_eq!(expected, vec![84, 10]);
                assert_eq!(actual, vec![84, 7]);
            }
            other => panic!("Expected a shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn should_reject_missing_bias() {
        let device = Default::default();

        let result = LeNetClassifierConfig::new()
            .load::<TestBackend>(fixture("lenet_no_fc2_bias.pt"), &device);

        assert!(matches!(
            result,
            Err(LoadError::MissingParameter(parameter)) if parameter == "fc2.bias"
        ));
    }

    #[test]
    fn should_fail_if_not_found() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.pt");

        let result = LeNetClassifierConfig::new().load::<TestBackend>(path, &device);

        assert!(matches!(result, Err(LoadError::NotFound(_))));
    }

    #[test]
    fn should_reject_unknown_extension() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weights.onnx");
        std::fs::write(&path, b"not a state dict").unwrap();

        let result = LeNetClassifierConfig::new().load::<TestBackend>(&path, &device);

        assert!(matches!(
            result,
            Err(LoadError::UnsupportedFormat { extension, .. }) if extension == "onnx"
        ));
    }

    #[test]
    fn record_format_from_extension() {
        assert_eq!(
            RecordFormat::from_path(Path::new("lenet_model.pt")).unwrap(),
            RecordFormat::PyTorch
        );
        assert_eq!(
            RecordFormat::from_path(Path::new("lenet.PTH")).unwrap(),
            RecordFormat::PyTorch
        );
        assert_eq!(
            RecordFormat::from_path(Path::new("lenet.mpk")).unwrap(),
            RecordFormat::NamedMpk
        );
        assert!(RecordFormat::from_path(Path::new("lenet")).is_err());
    }
}

use tch::{
    nn::{self, BatchNorm, Conv2D, ConvConfig, Linear, ModuleT},
    Tensor,
};

use super::{total_l2, Architecture, L2Norm, BOARD_SIZE, MOVE_COUNT, PLANES};

pub trait PolicyValueNet {
    /// `xs` is `[N, PLANES, 8, 8]`; returns policy log-probabilities `[N, 64]`
    /// and values `[N]` in (-1, 1).
    fn forward_t(&self, xs: &Tensor, is_training: bool) -> (Tensor, Tensor);

    /// Squared norm of all weight matrices and kernels.
    fn l2(&self) -> Tensor;
}

pub fn build_net(architecture: Architecture, path: &nn::Path) -> Box<dyn PolicyValueNet> {
    match architecture {
        Architecture::Simple => Box::new(SimpleNet::new(path)),
        Architecture::Residual => Box::new(ResidualNet::new(path, 32, 3)),
    }
}

fn padded(padding: i64) -> ConvConfig {
    ConvConfig {
        padding,
        ..Default::default()
    }
}

pub struct SimpleNet {
    convs: Vec<(Conv2D, BatchNorm)>,
    fc1: Linear,
    bn_fc1: BatchNorm,
    fc2: Linear,
    bn_fc2: BatchNorm,
    policy: Linear,
    value: Linear,
}

const SIMPLE_CHANNELS: i64 = 16;
// two unpadded 3x3 convolutions shrink 8x8 to 4x4
const SIMPLE_FC_INPUT: i64 = SIMPLE_CHANNELS * (BOARD_SIZE as i64 - 4) * (BOARD_SIZE as i64 - 4);
const DROPOUT: f64 = 0.5;

impl SimpleNet {
    pub fn new(path: &nn::Path) -> Self {
        let layers = [(PLANES as i64, 1), (SIMPLE_CHANNELS, 1), (SIMPLE_CHANNELS, 0), (SIMPLE_CHANNELS, 0)];
        let convs = layers
            .iter()
            .enumerate()
            .map(|(i, &(input, padding))| {
                (
                    nn::conv2d(path / format!("conv{i}"), input, SIMPLE_CHANNELS, 3, padded(padding)),
                    nn::batch_norm2d(path / format!("bn_conv{i}"), SIMPLE_CHANNELS, Default::default()),
                )
            })
            .collect();

        Self {
            convs,
            fc1: nn::linear(path / "fc1", SIMPLE_FC_INPUT, 512, Default::default()),
            bn_fc1: nn::batch_norm1d(path / "bn_fc1", 512, Default::default()),
            fc2: nn::linear(path / "fc2", 512, 256, Default::default()),
            bn_fc2: nn::batch_norm1d(path / "bn_fc2", 256, Default::default()),
            policy: nn::linear(path / "policy", 256, MOVE_COUNT as i64, Default::default()),
            value: nn::linear(path / "value", 256, 1, Default::default()),
        }
    }
}

impl PolicyValueNet for SimpleNet {
    fn forward_t(&self, xs: &Tensor, is_training: bool) -> (Tensor, Tensor) {
        let mut x = xs.shallow_clone();
        for (conv, bn) in &self.convs {
            x = bn.forward_t(&conv.forward_t(&x, is_training), is_training).relu();
        }
        debug_assert_eq!(x.size()[1..], [SIMPLE_CHANNELS, 4, 4]);

        let x = x.view([-1, SIMPLE_FC_INPUT]);
        let x = self
            .bn_fc1
            .forward_t(&self.fc1.forward_t(&x, is_training), is_training)
            .relu()
            .dropout(DROPOUT, is_training);
        let x = self
            .bn_fc2
            .forward_t(&self.fc2.forward_t(&x, is_training), is_training)
            .relu()
            .dropout(DROPOUT, is_training);

        let policy = self.policy.forward_t(&x, is_training).log_softmax(1, None);
        let value = self.value.forward_t(&x, is_training).tanh().view([-1]);
        (policy, value)
    }

    fn l2(&self) -> Tensor {
        let convs = self.convs.iter().map(|(conv, _)| conv as &dyn L2Norm);
        let dense = [&self.fc1, &self.fc2, &self.policy, &self.value]
            .into_iter()
            .map(|l| l as &dyn L2Norm);
        total_l2(convs.chain(dense))
    }
}

struct ResidualBlock {
    conv1: Conv2D,
    bn1: BatchNorm,
    conv2: Conv2D,
    bn2: BatchNorm,
}

impl ResidualBlock {
    fn new(path: &nn::Path, channels: i64) -> Self {
        Self {
            conv1: nn::conv2d(path / "conv1", channels, channels, 3, padded(1)),
            bn1: nn::batch_norm2d(path / "bn1", channels, Default::default()),
            conv2: nn::conv2d(path / "conv2", channels, channels, 3, padded(1)),
            bn2: nn::batch_norm2d(path / "bn2", channels, Default::default()),
        }
    }

    fn forward_t(&self, xs: &Tensor, is_training: bool) -> Tensor {
        let x = self
            .bn1
            .forward_t(&self.conv1.forward_t(xs, is_training), is_training)
            .relu();
        let x = self.bn2.forward_t(&self.conv2.forward_t(&x, is_training), is_training);
        (x + xs).relu()
    }
}

pub struct ResidualNet {
    stem: Conv2D,
    bn_stem: BatchNorm,
    blocks: Vec<ResidualBlock>,
    policy_conv: Conv2D,
    bn_policy: BatchNorm,
    policy_fc: Linear,
    value_conv: Conv2D,
    bn_value: BatchNorm,
    value_fc1: Linear,
    value_fc2: Linear,
}

impl ResidualNet {
    pub fn new(path: &nn::Path, channels: i64, depth: usize) -> Self {
        let cells = MOVE_COUNT as i64;
        Self {
            stem: nn::conv2d(path / "stem", PLANES as i64, channels, 3, padded(1)),
            bn_stem: nn::batch_norm2d(path / "bn_stem", channels, Default::default()),
            blocks: (0..depth)
                .map(|i| ResidualBlock::new(&(path / format!("block{i}")), channels))
                .collect(),
            policy_conv: nn::conv2d(path / "policy_conv", channels, 2, 1, Default::default()),
            bn_policy: nn::batch_norm2d(path / "bn_policy", 2, Default::default()),
            policy_fc: nn::linear(path / "policy_fc", 2 * cells, cells, Default::default()),
            value_conv: nn::conv2d(path / "value_conv", channels, 1, 1, Default::default()),
            bn_value: nn::batch_norm2d(path / "bn_value", 1, Default::default()),
            value_fc1: nn::linear(path / "value_fc1", cells, 64, Default::default()),
            value_fc2: nn::linear(path / "value_fc2", 64, 1, Default::default()),
        }
    }
}

impl PolicyValueNet for ResidualNet {
    fn forward_t(&self, xs: &Tensor, is_training: bool) -> (Tensor, Tensor) {
        let mut x = self
            .bn_stem
            .forward_t(&self.stem.forward_t(xs, is_training), is_training)
            .relu();
        for block in &self.blocks {
            x = block.forward_t(&x, is_training);
        }

        let policy = self
            .bn_policy
            .forward_t(&self.policy_conv.forward_t(&x, is_training), is_training)
            .relu()
            .flatten(1, -1);
        let policy = self.policy_fc.forward_t(&policy, is_training).log_softmax(1, None);

        let value = self
            .bn_value
            .forward_t(&self.value_conv.forward_t(&x, is_training), is_training)
            .relu()
            .flatten(1, -1);
        let value = self.value_fc1.forward_t(&value, is_training).relu();
        let value = self.value_fc2.forward_t(&value, is_training).tanh().view([-1]);
        (policy, value)
    }

    fn l2(&self) -> Tensor {
        let convs = [&self.stem, &self.policy_conv, &self.value_conv]
            .into_iter()
            .chain(self.blocks.iter().flat_map(|b| [&b.conv1, &b.conv2]))
            .map(|c| c as &dyn L2Norm);
        let dense = [&self.policy_fc, &self.value_fc1, &self.value_fc2]
            .into_iter()
            .map(|l| l as &dyn L2Norm);
        total_l2(convs.chain(dense))
    }
}

#[cfg(test)]
mod tests {
    use tch::{Device, Kind};

    use super::*;

    #[test]
    fn both_architectures_produce_board_shaped_heads() {
        for architecture in [Architecture::Simple, Architecture::Residual] {
            let vs = nn::VarStore::new(Device::Cpu);
            let net = build_net(architecture, &vs.root());
            let xs = Tensor::zeros([4, PLANES as i64, 8, 8], (Kind::Float, Device::Cpu));

            let (policy, value) = net.forward_t(&xs, false);
            assert_eq!(policy.size(), [4, MOVE_COUNT as i64]);
            assert_eq!(value.size(), [4]);

            let total = policy.exp().sum_dim_intlist([1i64].as_slice(), false, Kind::Float);
            for i in 0..4 {
                assert!((total.double_value(&[i]) - 1.0).abs() < 1e-4);
            }
            assert!(net.l2().double_value(&[]) > 0.0);
        }
    }
}

use std::{collections::BTreeMap, path::Path};

use anyhow::{bail, Context};
use log::{debug, info};
use ndarray::{Array1, ArrayView3};
use serde::{Deserialize, Serialize};
use tch::{
    nn::{self, Adam, Optimizer, OptimizerConfig},
    CModule, Device, Kind, Reduction, Tensor,
};

use super::{build_net, Architecture, PolicyValueNet, BOARD_SIZE, MOVE_COUNT, PLANES};
use crate::training::{Batch, Predictor};

const META_KEY: &str = "__meta__";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorMeta {
    pub format_version: u32,
    pub architecture: Architecture,
    pub learning_rate: f64,
    pub weight_decay: f64,
}

impl PredictorMeta {
    fn new(architecture: Architecture) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            architecture,
            learning_rate: 1e-3,
            weight_decay: 1e-4,
        }
    }
}

/// A policy/value network trained with Adam on libtorch.
pub struct TchPredictor {
    vs: nn::VarStore,
    net: Box<dyn PolicyValueNet>,
    opt: Optimizer,
    meta: PredictorMeta,
}

impl TchPredictor {
    pub fn new(architecture: Architecture, device: Device) -> anyhow::Result<Self> {
        Self::with_meta(PredictorMeta::new(architecture), device)
    }

    fn with_meta(meta: PredictorMeta, device: Device) -> anyhow::Result<Self> {
        let vs = nn::VarStore::new(device);
        let net = build_net(meta.architecture, &vs.root());
        let opt = Adam::default().build(&vs, meta.learning_rate)?;
        Ok(Self { vs, net, opt, meta })
    }

    /// Restores a predictor written by [`Predictor::save_checkpoint`].
    pub fn load(path: &Path, device: Device) -> anyhow::Result<Self> {
        let mut named: BTreeMap<String, Tensor> = Tensor::load_multi(path)
            .with_context(|| format!("reading checkpoint {}", path.display()))?
            .into_iter()
            .collect();

        let meta = named
            .remove(META_KEY)
            .with_context(|| format!("{} carries no metadata", path.display()))?;
        let meta: PredictorMeta = serde_json::from_slice(&Vec::<u8>::try_from(&meta)?)?;
        if meta.format_version != FORMAT_VERSION {
            bail!(
                "checkpoint format {} is not supported (expected {FORMAT_VERSION})",
                meta.format_version
            );
        }

        let predictor = Self::with_meta(meta, device)?;
        let mut variables = predictor.vs.variables();
        if variables.len() != named.len() {
            bail!(
                "checkpoint holds {} tensors, {} network expects {}",
                named.len(),
                predictor.meta.architecture,
                variables.len()
            );
        }
        tch::no_grad(|| -> anyhow::Result<()> {
            for (name, var) in variables.iter_mut() {
                let src = named
                    .get(name)
                    .with_context(|| format!("checkpoint is missing {name}"))?;
                var.f_copy_(src)
                    .with_context(|| format!("restoring {name}"))?;
            }
            Ok(())
        })?;

        info!(
            "Loaded {} predictor from {}",
            predictor.meta.architecture,
            path.display()
        );
        Ok(predictor)
    }

    pub fn meta(&self) -> &PredictorMeta {
        &self.meta
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    fn to_tensors(&self, batch: &Batch) -> anyhow::Result<(Tensor, Tensor, Tensor)> {
        let n = batch.len() as i64;
        let side = BOARD_SIZE as i64;
        let states = batch.states().as_standard_layout();
        let policies = batch.policies().as_standard_layout();
        let values = batch.values().as_standard_layout();

        let device = self.vs.device();
        let states = Tensor::from_slice(states.as_slice().context("states are not contiguous")?)
            .view([n, PLANES as i64, side, side])
            .to_device(device);
        let policies = Tensor::from_slice(policies.as_slice().context("policies are not contiguous")?)
            .view([n, MOVE_COUNT as i64])
            .to_device(device);
        let values = Tensor::from_slice(values.as_slice().context("values are not contiguous")?)
            .to_device(device);
        Ok((states, policies, values))
    }

    fn loss(&self, batch: &Batch, is_training: bool) -> anyhow::Result<Tensor> {
        if batch.is_empty() {
            bail!("empty batch");
        }
        let (states, policies, values) = self.to_tensors(batch)?;
        let (log_policy, value) = self.net.forward_t(&states, is_training);

        let policy_loss = -(&policies * &log_policy).sum(Kind::Float) / batch.len() as f64;
        let value_loss = value.mse_loss(&values, Reduction::Mean);
        Ok(policy_loss + value_loss + self.net.l2() * self.meta.weight_decay)
    }
}

impl Predictor for TchPredictor {
    fn train_step(&mut self, batch: &Batch) -> anyhow::Result<f32> {
        let loss = self.loss(batch, true)?;
        self.opt.backward_step(&loss);
        Ok(loss.double_value(&[]) as f32)
    }

    fn eval_step(&mut self, batch: &Batch) -> anyhow::Result<f32> {
        let loss = tch::no_grad(|| self.loss(batch, false))?;
        Ok(loss.double_value(&[]) as f32)
    }

    fn predict(&self, state: ArrayView3<f32>) -> anyhow::Result<(Array1<f32>, f32)> {
        let side = BOARD_SIZE as i64;
        if state.shape() != [PLANES, BOARD_SIZE, BOARD_SIZE] {
            bail!("expected a {PLANES}x{BOARD_SIZE}x{BOARD_SIZE} position, got {:?}", state.shape());
        }
        let state = state.as_standard_layout();
        let xs = Tensor::from_slice(state.as_slice().context("position is not contiguous")?)
            .view([1, PLANES as i64, side, side])
            .to_device(self.vs.device());

        let (log_policy, value) = tch::no_grad(|| self.net.forward_t(&xs, false));
        let policy = Vec::<f32>::try_from(log_policy.exp().view([-1]).to_device(Device::Cpu))?;
        Ok((Array1::from(policy), value.double_value(&[0]) as f32))
    }

    fn save_checkpoint(&self, path: &Path) -> anyhow::Result<()> {
        let variables: BTreeMap<String, Tensor> = self.vs.variables().into_iter().collect();
        let meta = Tensor::from_slice(&serde_json::to_vec(&self.meta)?);

        let mut named: Vec<(&str, &Tensor)> = variables.iter().map(|(k, v)| (k.as_str(), v)).collect();
        named.push((META_KEY, &meta));
        Tensor::save_multi(&named, path)?;
        debug!("Saved {} tensors to {}", named.len(), path.display());
        Ok(())
    }

    fn export(&self, path: &Path) -> anyhow::Result<()> {
        let side = BOARD_SIZE as i64;
        let example = Tensor::zeros([1, PLANES as i64, side, side], (Kind::Float, self.vs.device()));
        let mut forward = |inputs: &[Tensor]| {
            let (log_policy, value) = self.net.forward_t(&inputs[0], false);
            vec![log_policy.exp(), value]
        };
        let module = CModule::create_by_tracing("PolicyValue", "forward", &[example], &mut forward)?;
        module.save(path)?;
        Ok(())
    }
}

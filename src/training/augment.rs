use ndarray::{Array1, Array2, Array3, Array4, ArrayView, ArrayView1, ArrayView3, Axis, Dimension};

use crate::othello::{BOARD_SIZE, MOVE_COUNT};

use super::{Result, SampleSet, TrainError};

/// Order of the dihedral group of the square.
pub const SYMMETRY_COUNT: usize = 8;

/// A board transform: counter-clockwise quarter turns, then an optional
/// left-right mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symmetry {
    pub quarter_turns: u8,
    pub mirrored: bool,
}

impl Symmetry {
    pub const IDENTITY: Symmetry = Symmetry::new(0, false);

    /// Rotations first, then the mirrored rotations; identity leads.
    pub const ALL: [Symmetry; SYMMETRY_COUNT] = [
        Symmetry::new(0, false),
        Symmetry::new(1, false),
        Symmetry::new(2, false),
        Symmetry::new(3, false),
        Symmetry::new(0, true),
        Symmetry::new(1, true),
        Symmetry::new(2, true),
        Symmetry::new(3, true),
    ];

    pub const fn new(quarter_turns: u8, mirrored: bool) -> Self {
        Self {
            quarter_turns: quarter_turns % 4,
            mirrored,
        }
    }

    /// Re-strides the last two (square) axes of `view`; no data is copied.
    fn orient<'a, A, D: Dimension>(self, mut view: ArrayView<'a, A, D>) -> ArrayView<'a, A, D> {
        let rows = view.ndim() - 2;
        let cols = view.ndim() - 1;
        for _ in 0..self.quarter_turns {
            view.invert_axis(Axis(cols));
            view.swap_axes(rows, cols);
        }
        if self.mirrored {
            view.invert_axis(Axis(cols));
        }
        view
    }

    pub fn apply_to_planes(self, planes: ArrayView3<f32>) -> Result<Array3<f32>> {
        check_board_dims(planes.shape())?;
        Ok(self.orient(planes).to_owned())
    }

    /// Moves each probability to the cell the transform sends its move to.
    pub fn apply_to_policy(self, policy: ArrayView1<f32>) -> Result<Array1<f32>> {
        if policy.len() != MOVE_COUNT {
            return Err(policy_mismatch(policy.shape()));
        }
        let policy = policy.as_standard_layout();
        let grid = policy
            .view()
            .into_shape_with_order((BOARD_SIZE, BOARD_SIZE))
            .map_err(|_| policy_mismatch(policy.shape()))?;
        Ok(self.orient(grid).iter().copied().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Augmentation {
    Enabled,
    Disabled,
}

impl Augmentation {
    /// How many output samples each input sample becomes.
    pub const fn multiplier(self) -> usize {
        match self {
            Augmentation::Enabled => SYMMETRY_COUNT,
            Augmentation::Disabled => 1,
        }
    }

    pub fn symmetries(self) -> &'static [Symmetry] {
        &Symmetry::ALL[..self.multiplier()]
    }
}

impl From<bool> for Augmentation {
    fn from(enabled: bool) -> Self {
        if enabled {
            Augmentation::Enabled
        } else {
            Augmentation::Disabled
        }
    }
}

/// Expands `samples` by every symmetry `mode` allows.
///
/// The output is symmetry-major: block `k` holds all inputs transformed by
/// `mode.symmetries()[k]`. Values are copied unchanged.
pub fn augment(samples: &SampleSet, mode: Augmentation) -> Result<SampleSet> {
    let states = samples.states();
    let policies = samples.policies();
    check_board_dims(states.shape())?;
    if policies.ncols() != MOVE_COUNT {
        return Err(policy_mismatch(policies.shape()));
    }

    let n = samples.len();
    let planes = states.len_of(Axis(1));
    let policies = policies.as_standard_layout();
    let policy_grid = policies
        .view()
        .into_shape_with_order((n, BOARD_SIZE, BOARD_SIZE))
        .map_err(|_| policy_mismatch(policies.shape()))?;

    let copies = mode.multiplier();
    let mut out_states = Vec::with_capacity(states.len() * copies);
    let mut out_policies = Vec::with_capacity(n * MOVE_COUNT * copies);
    let mut out_values = Vec::with_capacity(n * copies);
    for &sym in mode.symmetries() {
        out_states.extend(sym.orient(states.view()).iter().copied());
        out_policies.extend(sym.orient(policy_grid.view()).iter().copied());
        out_values.extend(samples.values().iter().copied());
    }

    let total = n * copies;
    let states = Array4::from_shape_vec((total, planes, BOARD_SIZE, BOARD_SIZE), out_states)
        .map_err(|_| TrainError::ShapeMismatch {
            expected: "N x C x 8 x 8 states",
            actual: vec![total, planes, BOARD_SIZE, BOARD_SIZE],
        })?;
    let policies = Array2::from_shape_vec((total, MOVE_COUNT), out_policies)
        .map_err(|_| policy_mismatch(&[total, MOVE_COUNT]))?;
    SampleSet::new(states, policies, Array1::from(out_values))
}

fn check_board_dims(shape: &[usize]) -> Result<()> {
    match shape {
        [.., rows, cols] if *rows == BOARD_SIZE && *cols == BOARD_SIZE => Ok(()),
        _ => Err(TrainError::ShapeMismatch {
            expected: "trailing 8 x 8 board axes",
            actual: shape.to_vec(),
        }),
    }
}

fn policy_mismatch(shape: &[usize]) -> TrainError {
    TrainError::ShapeMismatch {
        expected: "64 move probabilities per sample",
        actual: shape.to_vec(),
    }
}

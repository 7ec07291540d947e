use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use ndarray::{Array, Array1, Array2, Array4, Axis, Dimension};
use ndarray_npy::{read_npy, write_npy, ReadNpyError};

use super::{Result, TrainError};

pub const STATES_FILE: &str = "states.npy";
pub const POLICY_FILE: &str = "policy.npy";
pub const VALUES_FILE: &str = "values.npy";

/// Three parallel arrays: row `i` of each describes the same position.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    states: Array4<f32>,
    policies: Array2<f32>,
    values: Array1<f32>,
}

impl SampleSet {
    pub fn new(states: Array4<f32>, policies: Array2<f32>, values: Array1<f32>) -> Result<Self> {
        let lens = [
            states.len_of(Axis(0)),
            policies.len_of(Axis(0)),
            values.len(),
        ];
        if lens[0] != lens[1] || lens[0] != lens[2] {
            return Err(TrainError::ShapeMismatch {
                expected: "equal sample counts for states, policies and values",
                actual: lens.to_vec(),
            });
        }
        Ok(Self {
            states,
            policies,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn states(&self) -> &Array4<f32> {
        &self.states
    }

    pub fn policies(&self) -> &Array2<f32> {
        &self.policies
    }

    pub fn values(&self) -> &Array1<f32> {
        &self.values
    }

    /// Gathers the given rows, in order, into a new set.
    pub fn select(&self, indices: &[usize]) -> SampleSet {
        SampleSet {
            states: self.states.select(Axis(0), indices),
            policies: self.policies.select(Axis(0), indices),
            values: self.values.select(Axis(0), indices),
        }
    }

    pub fn into_parts(self) -> (Array4<f32>, Array2<f32>, Array1<f32>) {
        (self.states, self.policies, self.values)
    }
}

/// Reads one round written by the self-play engine.
pub fn load_round(dir: &Path) -> Result<SampleSet> {
    let states: Array4<f32> = read_array(dir, STATES_FILE)?;
    let policies: Array2<f32> = read_array(dir, POLICY_FILE)?;
    let values: Array1<f32> = read_array(dir, VALUES_FILE)?;

    let (n_states, n_policies, n_values) = (
        states.len_of(Axis(0)),
        policies.len_of(Axis(0)),
        values.len(),
    );
    if n_states != n_policies || n_states != n_values {
        return Err(TrainError::corrupt(
            dir,
            format!(
                "array lengths differ: {n_states} states, {n_policies} policies, {n_values} values"
            ),
        ));
    }
    if n_values == 0 {
        return Err(TrainError::corrupt(dir, "round contains no samples"));
    }
    if let Some((idx, v)) = values
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || v.abs() > 1.0)
    {
        return Err(TrainError::corrupt(
            dir.join(VALUES_FILE),
            format!("value {v} at index {idx} is outside [-1, 1]"),
        ));
    }

    debug!(
        "Loaded {n_values} samples from {} (states {:?}, policies {:?})",
        dir.display(),
        states.shape(),
        policies.shape()
    );
    SampleSet::new(states, policies, values)
}

/// Writes a round in the same layout the self-play engine produces.
pub fn write_round(dir: &Path, samples: &SampleSet) -> Result<()> {
    write_array(&dir.join(STATES_FILE), &samples.states)?;
    write_array(&dir.join(POLICY_FILE), &samples.policies)?;
    write_array(&dir.join(VALUES_FILE), &samples.values)
}

fn write_array<D: Dimension>(path: &Path, array: &Array<f32, D>) -> Result<()> {
    write_npy(path, array).map_err(|e| TrainError::io(path, io::Error::other(e)))
}

fn read_array<D: Dimension>(dir: &Path, name: &str) -> Result<Array<f32, D>> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(TrainError::corrupt(&path, "file is missing"));
    }
    read_npy_as_f32(&path).map_err(|e| TrainError::corrupt(&path, e.to_string()))
}

/// The engine writes states as `u8` and outcomes as `i32`; anything numeric is widened to `f32`.
fn read_npy_as_f32<D: Dimension>(path: &Path) -> Result<Array<f32, D>, ReadNpyError> {
    match read_npy::<_, Array<f32, D>>(path) {
        Err(ReadNpyError::WrongDescriptor(_)) => {}
        other => return other,
    }

    macro_rules! try_as {
        ($t:ty) => {
            match read_npy::<_, Array<$t, D>>(path) {
                Ok(array) => return Ok(array.mapv(|v| v as f32)),
                Err(ReadNpyError::WrongDescriptor(_)) => {}
                Err(e) => return Err(e),
            }
        };
    }
    try_as!(u8);
    try_as!(i32);
    try_as!(f64);
    try_as!(i64);
    try_as!(i8);
    try_as!(i16);
    try_as!(u16);
    try_as!(u32);

    read_npy::<_, Array<u64, D>>(path).map(|array| array.mapv(|v| v as f32))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirState {
    /// Deleted and not yet recreated.
    Absent,
    Empty,
    Populated,
}

/// The directory the self-play engine writes a round into.
///
/// The engine expects an empty directory, so it is reset before every round.
/// Reset is `clear()` followed by `materialize()`; a crash in between leaves the
/// directory `Absent`, which `prepare()` recovers from.
#[derive(Debug, Clone)]
pub struct SampleDir {
    path: PathBuf,
}

impl SampleDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> Result<DirState> {
        match fs::read_dir(&self.path) {
            Ok(mut entries) => Ok(if entries.next().is_some() {
                DirState::Populated
            } else {
                DirState::Empty
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DirState::Absent),
            Err(e) => Err(TrainError::io(&self.path, e)),
        }
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TrainError::io(&self.path, e)),
        }
    }

    pub fn materialize(&self) -> Result<()> {
        fs::create_dir_all(&self.path).map_err(|e| TrainError::io(&self.path, e))
    }

    pub fn reset(&self) -> Result<()> {
        self.clear()?;
        self.materialize()
    }

    /// Leaves an empty directory behind, whatever state the previous run left.
    pub fn prepare(&self) -> Result<()> {
        match self.state()? {
            DirState::Absent => {
                warn!(
                    "Sample directory {} is missing, recreating it",
                    self.path.display()
                );
                self.materialize()
            }
            DirState::Empty => Ok(()),
            DirState::Populated => {
                debug!("Clearing previous round from {}", self.path.display());
                self.reset()
            }
        }
    }

    pub fn load(&self) -> Result<SampleSet> {
        load_round(&self.path)
    }
}

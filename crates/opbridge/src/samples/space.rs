use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

/// Value taken by one axis of a parameter space.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
    Str(&'static str),
    None,
}

impl ParamValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(value) => Some(*value),
            ParamValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            ParamValue::Ints(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            ParamValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ParamValue::None)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(value) => write!(f, "{value}"),
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value:?}"),
            ParamValue::Ints(values) => write!(f, "{values:?}"),
            ParamValue::Str(value) => write!(f, "{value}"),
            ParamValue::None => f.write_str("None"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<Vec<i64>> for ParamValue {
    fn from(values: Vec<i64>) -> Self {
        ParamValue::Ints(values)
    }
}

impl From<&'static str> for ParamValue {
    fn from(value: &'static str) -> Self {
        ParamValue::Str(value)
    }
}

/// Independent axis of a parameter space.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub name: &'static str,
    pub values: Vec<ParamValue>,
}

/// One point of a parameter space: a value for every axis, in axis order.
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    entries: Vec<(&'static str, ParamValue)>,
}

impl Combination {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(axis, _)| *axis == name)
            .map(|(_, value)| value)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParamValue::as_bool)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_float)
    }

    pub fn ints(&self, name: &str) -> Option<&[i64]> {
        self.get(name).and_then(ParamValue::as_ints)
    }

    pub fn str(&self, name: &str) -> Option<&'static str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// Reads an int-list axis as tensor extents; absent or non-list values read as rank 0.
    pub fn dims(&self, name: &str) -> Vec<usize> {
        self.ints(name)
            .map(|values| values.iter().map(|&dim| dim as usize).collect())
            .unwrap_or_default()
    }

    pub fn entries(&self) -> &[(&'static str, ParamValue)] {
        &self.entries
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (name, value)) in self.entries.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str("}")
    }
}

/// Named predicate pruning combinations the reference operator does not support.
#[derive(Clone)]
pub struct Exclusion {
    pub name: &'static str,
    pub reason: &'static str,
    /// Returns `true` when the combination must be excluded.
    pub predicate: fn(&Combination) -> bool,
}

impl fmt::Debug for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exclusion")
            .field("name", &self.name)
            .field("reason", &self.reason)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("combination {combination} rejected by '{exclusion}': {reason}")]
pub struct InvalidParameterCombination {
    pub exclusion: &'static str,
    pub reason: &'static str,
    pub combination: String,
}

/// Cartesian product of named axes, filtered by named exclusions.
///
/// Iteration order is lexicographic with the first axis varying slowest.
#[derive(Debug, Clone, Default)]
pub struct ParameterSpace {
    axes: Vec<Axis>,
    exclusions: Vec<Exclusion>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new axis after the existing ones.
    pub fn axis<V: Into<ParamValue>>(
        mut self,
        name: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.axes.push(Axis {
            name,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Appends values to the named axis, creating it after the existing axes when absent.
    pub fn extend_axis<V: Into<ParamValue>>(
        mut self,
        name: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into);
        match self.axes.iter_mut().find(|axis| axis.name == name) {
            Some(axis) => axis.values.extend(values),
            None => self.axes.push(Axis {
                name,
                values: values.collect(),
            }),
        }
        self
    }

    pub fn exclude(
        mut self,
        name: &'static str,
        reason: &'static str,
        predicate: fn(&Combination) -> bool,
    ) -> Self {
        self.exclusions.push(Exclusion {
            name,
            reason,
            predicate,
        });
        self
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn axis_values(&self, name: &str) -> Option<&[ParamValue]> {
        self.axes
            .iter()
            .find(|axis| axis.name == name)
            .map(|axis| axis.values.as_slice())
    }

    pub fn exclusions(&self) -> &[Exclusion] {
        &self.exclusions
    }

    /// Size of the product before exclusions.
    pub fn unfiltered_len(&self) -> usize {
        self.axes.iter().map(|axis| axis.values.len()).product()
    }

    /// Validates a combination against every exclusion, reporting the first that rejects it.
    pub fn check(&self, combination: &Combination) -> Result<(), InvalidParameterCombination> {
        for exclusion in &self.exclusions {
            if (exclusion.predicate)(combination) {
                return Err(InvalidParameterCombination {
                    exclusion: exclusion.name,
                    reason: exclusion.reason,
                    combination: combination.to_string(),
                });
            }
        }
        Ok(())
    }

    fn combination_at(&self, mut index: usize) -> Combination {
        let mut entries = Vec::with_capacity(self.axes.len());
        for axis in self.axes.iter().rev() {
            let radix = axis.values.len();
            entries.push((axis.name, axis.values[index % radix].clone()));
            index /= radix;
        }
        entries.reverse();
        Combination { entries }
    }

    /// Every combination of the product, including excluded ones.
    pub fn iter_unfiltered(&self) -> impl Iterator<Item = Combination> + '_ {
        (0..self.unfiltered_len()).map(move |index| self.combination_at(index))
    }

    /// Lazily yields the combinations that pass every exclusion.
    pub fn iter(&self) -> SpaceIter {
        SpaceIter {
            space: Arc::new(self.clone()),
            next: 0,
            total: self.unfiltered_len(),
        }
    }
}

impl IntoIterator for ParameterSpace {
    type Item = Combination;
    type IntoIter = SpaceIter;

    fn into_iter(self) -> SpaceIter {
        let total = self.unfiltered_len();
        SpaceIter {
            space: Arc::new(self),
            next: 0,
            total,
        }
    }
}

/// Owning iterator over the filtered product; holds no resources beyond the space itself.
#[derive(Debug, Clone)]
pub struct SpaceIter {
    space: Arc<ParameterSpace>,
    next: usize,
    total: usize,
}

impl Iterator for SpaceIter {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        while self.next < self.total {
            let combination = self.space.combination_at(self.next);
            self.next += 1;
            match self.space.check(&combination) {
                Ok(()) => return Some(combination),
                Err(rejected) => trace!(%rejected, "pruned parameter combination"),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.total - self.next))
    }
}

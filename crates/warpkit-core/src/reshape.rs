//! Shape-change metadata of transforms.
//!
//! A transform that resizes or transposes an image (rescaling with
//! `resize_image`, 90 degree rotations, axis permutations) announces the
//! effect through a [`ReshapeDescriptor`]. The resampler uses the composed
//! descriptor of a whole chain to size its output when no explicit target
//! is given.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransformError};

/// Per-axis scale factors followed by positional axis swaps.
///
/// Applied to a shape `s`, axis `j` first becomes `floor(s[j] * factor(j))`
/// where `factor(j)` is `scale[j]`, or `trailing_scale` past the end of
/// `scale`; then every pair of `swaps` transposes two positions of the
/// running shape, in order.
///
/// Swaps are stored canonically: the net permutation decomposed into the
/// transpositions a selection sort would perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReshapeDescriptor {
    /// Factors of the leading axes.
    pub scale: Vec<f64>,
    /// Factor of every axis past the end of `scale`.
    pub trailing_scale: f64,
    /// Positional transpositions applied after scaling.
    pub swaps: Vec<(usize, usize)>,
}

const SIZE_EPSILON: f64 = 1e-9;

impl Default for ReshapeDescriptor {
    fn default() -> Self {
        Self::identity()
    }
}

impl ReshapeDescriptor {
    /// Leaves every shape unchanged.
    pub fn identity() -> Self {
        Self {
            scale: Vec::new(),
            trailing_scale: 1.0,
            swaps: Vec::new(),
        }
    }

    /// Scales every axis by `factor`.
    pub fn uniform(factor: f64) -> Self {
        Self {
            scale: Vec::new(),
            trailing_scale: factor,
            swaps: Vec::new(),
        }
    }

    /// Scales axis `j` by `factors[j]`; axes past the end are unchanged.
    pub fn per_axis(factors: Vec<f64>) -> Self {
        Self::new(factors, 1.0, Vec::new())
    }

    /// Transposes positions `p` and `q`.
    pub fn swap(p: usize, q: usize) -> Self {
        Self::new(Vec::new(), 1.0, vec![(p, q)])
    }

    /// Rearranges positions so that output position `i` holds input axis
    /// `arrangement[i]`.
    pub fn from_permutation(arrangement: &[usize]) -> Self {
        Self {
            scale: Vec::new(),
            trailing_scale: 1.0,
            swaps: canonical_swaps(arrangement),
        }
    }

    /// Build a descriptor, canonicalising the swap list.
    pub fn new(scale: Vec<f64>, trailing_scale: f64, swaps: Vec<(usize, usize)>) -> Self {
        let len = swaps.iter().map(|&(p, q)| p.max(q) + 1).max().unwrap_or(0);
        let mut arrangement: Vec<usize> = (0..len).collect();
        for &(p, q) in &swaps {
            arrangement.swap(p, q);
        }
        let mut descriptor = Self {
            scale,
            trailing_scale,
            swaps: canonical_swaps(&arrangement),
        };
        descriptor.trim();
        descriptor
    }

    /// True when no shape is ever changed.
    pub fn is_identity(&self) -> bool {
        self.trailing_scale == 1.0 && self.scale.is_empty() && self.swaps.is_empty()
    }

    /// Scale factor of input axis `axis`.
    pub fn factor(&self, axis: usize) -> f64 {
        self.scale.get(axis).copied().unwrap_or(self.trailing_scale)
    }

    /// Net permutation over `len` positions: output position `i` holds input
    /// axis `permutation[i]`.
    pub fn permutation(&self, len: usize) -> Vec<usize> {
        let len = len.max(self.permutation_len());
        let mut arrangement: Vec<usize> = (0..len).collect();
        for &(p, q) in &self.swaps {
            arrangement.swap(p, q);
        }
        arrangement
    }

    fn permutation_len(&self) -> usize {
        self.swaps.iter().map(|&(p, q)| p.max(q) + 1).max().unwrap_or(0)
    }

    /// The descriptor of applying `self` first and `next` second.
    ///
    /// `next`'s factors refer to the positions produced by `self`; they are
    /// mapped back to `self`'s input axes before multiplying. `next`'s swaps
    /// act on the running shape, so the net permutation is the composition
    /// of both.
    pub fn then(&self, next: &Self) -> Self {
        let len = self
            .permutation_len()
            .max(next.permutation_len())
            .max(self.scale.len())
            .max(next.scale.len());
        let first = self.permutation(len);
        let second = next.permutation(len);

        let mut position_of = vec![0; len];
        for (position, &axis) in first.iter().enumerate() {
            position_of[axis] = position;
        }
        let scale: Vec<f64> = (0..len)
            .map(|axis| self.factor(axis) * next.factor(position_of[axis]))
            .collect();
        let net: Vec<usize> = second.iter().map(|&position| first[position]).collect();

        let mut descriptor = Self {
            scale,
            trailing_scale: self.trailing_scale * next.trailing_scale,
            swaps: canonical_swaps(&net),
        };
        descriptor.trim();
        descriptor
    }

    /// Fold a chain of descriptors, first element applied first.
    pub fn compose_all<'a>(descriptors: impl IntoIterator<Item = &'a ReshapeDescriptor>) -> Self {
        descriptors
            .into_iter()
            .fold(Self::identity(), |acc, next| acc.then(next))
    }

    /// Resulting shape for a concrete input shape.
    pub fn apply(&self, shape: &[usize]) -> Result<Vec<usize>> {
        if self.scale.len() > shape.len() || self.permutation_len() > shape.len() {
            return Err(TransformError::shape(
                format!(
                    "at least {} axes",
                    self.scale.len().max(self.permutation_len())
                ),
                shape,
            ));
        }
        let scaled: Vec<usize> = shape
            .iter()
            .enumerate()
            .map(|(axis, &size)| (size as f64 * self.factor(axis) + SIZE_EPSILON).floor() as usize)
            .collect();
        Ok(self
            .permutation(shape.len())
            .into_iter()
            .map(|axis| scaled[axis])
            .collect())
    }

    fn trim(&mut self) {
        while self.scale.last() == Some(&self.trailing_scale) {
            self.scale.pop();
        }
    }
}

/// Transpositions that turn the identity arrangement into `arrangement`.
fn canonical_swaps(arrangement: &[usize]) -> Vec<(usize, usize)> {
    let mut current: Vec<usize> = (0..arrangement.len()).collect();
    let mut swaps = Vec::new();
    for position in 0..arrangement.len() {
        if current[position] == arrangement[position] {
            continue;
        }
        if let Some(offset) = current[position..].iter().position(|&a| a == arrangement[position]) {
            current.swap(position, position + offset);
            swaps.push((position, position + offset));
        }
    }
    swaps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let d = ReshapeDescriptor::identity();
        assert!(d.is_identity());
        assert_eq!(d.apply(&[4, 5, 6]).unwrap(), vec![4, 5, 6]);
    }

    #[test]
    fn test_scale_then_swap() {
        let d = ReshapeDescriptor::per_axis(vec![2.0, 0.5]).then(&ReshapeDescriptor::swap(0, 1));
        assert_eq!(d.apply(&[4, 8]).unwrap(), vec![4, 8]);
        assert_eq!(d.apply(&[3, 10]).unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_scale_after_swap_maps_back() {
        // Swap first, then scale what is now position 0 (input axis 1).
        let d = ReshapeDescriptor::swap(0, 1).then(&ReshapeDescriptor::per_axis(vec![3.0]));
        assert_eq!(d.scale, vec![1.0, 3.0]);
        assert_eq!(d.apply(&[2, 5]).unwrap(), vec![15, 2]);
    }

    #[test]
    fn test_swaps_cancel() {
        let d = ReshapeDescriptor::swap(1, 2).then(&ReshapeDescriptor::swap(1, 2));
        assert!(d.is_identity());
    }

    #[test]
    fn test_swap_cycle_is_canonical() {
        let d = ReshapeDescriptor::swap(0, 1)
            .then(&ReshapeDescriptor::swap(1, 2));
        assert_eq!(d.permutation(3), vec![1, 2, 0]);
        assert_eq!(d.apply(&[2, 3, 4]).unwrap(), vec![3, 4, 2]);
        assert_eq!(d, ReshapeDescriptor::new(Vec::new(), 1.0, vec![(0, 1), (1, 2)]));
    }

    #[test]
    fn test_from_permutation() {
        let d = ReshapeDescriptor::from_permutation(&[2, 0, 1]);
        assert_eq!(d.permutation(3), vec![2, 0, 1]);
        assert_eq!(d.apply(&[2, 3, 4]).unwrap(), vec![4, 2, 3]);
        assert!(ReshapeDescriptor::from_permutation(&[0, 1, 2]).is_identity());
    }

    #[test]
    fn test_uniform_composes_with_per_axis() {
        let d = ReshapeDescriptor::uniform(2.0).then(&ReshapeDescriptor::per_axis(vec![0.5]));
        assert_eq!(d.apply(&[4, 4, 4]).unwrap(), vec![4, 8, 8]);
    }

    #[test]
    fn test_non_integer_factor_floors() {
        let d = ReshapeDescriptor::uniform(1.0 / 3.0);
        assert_eq!(d.apply(&[9, 10]).unwrap(), vec![3, 3]);
    }

    #[test]
    fn test_apply_rejects_short_shape() {
        let d = ReshapeDescriptor::swap(0, 3);
        assert!(d.apply(&[2, 2]).is_err());
    }
}

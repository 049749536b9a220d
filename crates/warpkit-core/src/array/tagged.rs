//! Tensors with role-tagged axes.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::layout::{infer_roles, AxisLayout, AxisPlan};
use crate::error::{Result, TransformError};

/// An N-dimensional array whose leading axes may be tagged as batch and
/// channel axes.
///
/// The values are stored as a `[batch, channel, voxels]` tensor; an axis that
/// is not tagged has size one in storage. `spatial` keeps the spatial shape
/// so that `voxels` can be unfolded again, in row-major order.
#[derive(Debug, Clone)]
pub struct TaggedTensor<B: Backend> {
    data: Tensor<B, 3>,
    spatial: Vec<usize>,
    layout: AxisLayout,
}

impl<B: Backend> TaggedTensor<B> {
    /// Wrap a `[batch, channel, voxels]` tensor.
    ///
    /// Fails when the voxel count does not match `spatial` or when an
    /// untagged role axis is not a singleton.
    pub fn new(data: Tensor<B, 3>, spatial: Vec<usize>, layout: AxisLayout) -> Result<Self> {
        let [batch, channel, voxels] = data.dims();
        let expected: usize = spatial.iter().product();
        if voxels != expected || (!layout.batch && batch != 1) || (!layout.channel && channel != 1) {
            return Err(TransformError::shape(
                format!("[{}, {}, {}] for layout {:?}", batch, channel, expected, layout),
                &[batch, channel, voxels],
            ));
        }
        Ok(Self { data, spatial, layout })
    }

    /// Assemble without validation; callers guarantee the invariants.
    pub(crate) fn from_parts(data: Tensor<B, 3>, spatial: Vec<usize>, layout: AxisLayout) -> Self {
        Self { data, spatial, layout }
    }

    /// Wrap a `[batch, channel, voxels]` tensor with both role axes tagged.
    pub fn from_tensor(data: Tensor<B, 3>, spatial: Vec<usize>) -> Result<Self> {
        Self::new(data, spatial, AxisLayout::FULL)
    }

    /// Build from row-major values. `shape` is the full shape, role axes
    /// first as described by `layout`.
    pub fn from_floats(values: Vec<f32>, shape: &[usize], layout: AxisLayout, device: &B::Device) -> Result<Self> {
        if shape.len() < layout.role_axes() {
            return Err(TransformError::shape(format!("at least {} axes", layout.role_axes()), shape));
        }
        let total: usize = shape.iter().product();
        if total != values.len() {
            return Err(TransformError::shape(format!("{} values", values.len()), shape));
        }
        let mut axes = shape.iter().copied();
        let batch = if layout.batch { axes.next().unwrap_or(1) } else { 1 };
        let channel = if layout.channel { axes.next().unwrap_or(1) } else { 1 };
        let spatial: Vec<usize> = axes.collect();
        let voxels: usize = spatial.iter().product();
        let data = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new([batch, channel, voxels])), device);
        Self::new(data, spatial, layout)
    }

    /// Build an array whose axes are all spatial.
    pub fn spatial_only(values: Vec<f32>, shape: &[usize], device: &B::Device) -> Result<Self> {
        Self::from_floats(values, shape, AxisLayout::SPATIAL, device)
    }

    /// Which role axes are present.
    pub fn layout(&self) -> AxisLayout {
        self.layout
    }

    pub fn has_batch(&self) -> bool {
        self.layout.batch
    }

    pub fn has_channel(&self) -> bool {
        self.layout.channel
    }

    /// Batch size; 1 when there is no batch axis.
    pub fn batch_size(&self) -> usize {
        self.data.dims()[0]
    }

    /// Channel count; 1 when there is no channel axis.
    pub fn channels(&self) -> usize {
        self.data.dims()[1]
    }

    pub fn spatial_shape(&self) -> &[usize] {
        &self.spatial
    }

    /// Number of spatial axes.
    pub fn n_space(&self) -> usize {
        self.spatial.len()
    }

    pub fn n_voxels(&self) -> usize {
        self.data.dims()[2]
    }

    /// Full rank including the role axes that are present.
    pub fn rank(&self) -> usize {
        self.layout.role_axes() + self.spatial.len()
    }

    /// Full shape including the role axes that are present.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(self.rank());
        if self.layout.batch {
            shape.push(self.batch_size());
        }
        if self.layout.channel {
            shape.push(self.channels());
        }
        shape.extend_from_slice(&self.spatial);
        shape
    }

    /// The `[batch, channel, voxels]` storage.
    pub fn tensor(&self) -> Tensor<B, 3> {
        self.data.clone()
    }

    pub fn into_tensor(self) -> Tensor<B, 3> {
        self.data
    }

    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// Move the values to another device.
    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            data: self.data.to_device(device),
            ..self
        }
    }

    /// Replace the values, keeping the spatial shape. A batch or channel
    /// axis becomes tagged when the new tensor is not a singleton along it.
    pub fn with_data(&self, data: Tensor<B, 3>) -> Result<Self> {
        let [batch, channel, _] = data.dims();
        let layout = AxisLayout {
            batch: self.layout.batch || batch > 1,
            channel: self.layout.channel || channel > 1,
        };
        Self::new(data, self.spatial.clone(), layout)
    }

    /// Tag a singleton batch axis if none is present.
    pub fn insert_batch(mut self) -> Self {
        self.layout.batch = true;
        self
    }

    /// Tag a singleton channel axis if none is present.
    pub fn insert_channel(mut self) -> Self {
        self.layout.channel = true;
        self
    }

    /// Repeat a singleton batch to `n` instances. A batch of size `n` is
    /// returned unchanged; any other size is a mismatch.
    pub fn repeat_batch(self, n: usize) -> Result<Self> {
        let batch = self.batch_size();
        if batch == n {
            return Ok(self.insert_batch());
        }
        if batch != 1 {
            return Err(TransformError::batch_mismatch(n, batch));
        }
        let data = self.data.repeat_dim(0, n);
        Ok(Self {
            data,
            spatial: self.spatial,
            layout: AxisLayout { batch: true, ..self.layout },
        })
    }

    /// Reinterpret the axes according to `plan`. Afterwards both role axes
    /// are present.
    pub fn apply_plan(self, plan: AxisPlan) -> Result<Self> {
        let Self { data, spatial, layout } = self;
        let [batch, channel, voxels] = data.dims();
        let leading = |spatial: &[usize], count: usize| -> Result<Vec<usize>> {
            if spatial.len() < count {
                return Err(TransformError::shape(format!("at least {} spatial axes", count), spatial));
            }
            Ok(spatial[..count].to_vec())
        };
        let promoted = match plan {
            AxisPlan::Ready | AxisPlan::InsertBatch | AxisPlan::InsertChannel | AxisPlan::InsertBoth => {
                return Ok(Self { data, spatial, layout: AxisLayout::FULL });
            }
            AxisPlan::PromoteBatch { .. } if layout.channel => {
                let lead = leading(&spatial, 1)?;
                let rest = voxels / lead[0].max(1);
                let data = data.reshape([channel, lead[0], rest]).swap_dims(0, 1);
                return Ok(Self { data, spatial: spatial[1..].to_vec(), layout: AxisLayout::FULL });
            }
            AxisPlan::PromoteBatch { .. } => {
                let lead = leading(&spatial, 1)?;
                (lead[0], 1, 1)
            }
            AxisPlan::PromoteChannel => {
                let lead = leading(&spatial, 1)?;
                (batch, lead[0], 1)
            }
            AxisPlan::PromoteBoth => {
                let lead = leading(&spatial, 2)?;
                (lead[0], lead[1], 2)
            }
        };
        let (new_batch, new_channel, consumed) = promoted;
        let spatial = spatial[consumed..].to_vec();
        let rest: usize = spatial.iter().product();
        let data = data.reshape([new_batch, new_channel, rest]);
        Ok(Self { data, spatial, layout: AxisLayout::FULL })
    }

    /// Give the array both role axes, inferring their positions from the
    /// rank when `ndim` is known. The resulting spatial rank must be `ndim`.
    pub fn with_roles(self, ndim: Option<usize>) -> Result<Self> {
        let plan = infer_roles(self.rank(), self.layout, ndim)?;
        let normalized = self.apply_plan(plan)?;
        if let Some(n) = ndim {
            if normalized.n_space() != n {
                return Err(TransformError::shape(
                    format!("{} spatial axes", n),
                    normalized.spatial_shape(),
                ));
            }
        }
        Ok(normalized)
    }

    /// Drop singleton role axes that `original` did not carry.
    pub fn restore_layout(mut self, original: AxisLayout) -> Self {
        if !original.batch && self.batch_size() == 1 {
            self.layout.batch = false;
        }
        if !original.channel && self.channels() == 1 {
            self.layout.channel = false;
        }
        self
    }

    /// Copy the values to the host, row-major in [`Self::shape`] order.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        self.data
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| TransformError::data(format!("{:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn ramp(shape: &[usize], layout: AxisLayout) -> TaggedTensor<TestBackend> {
        let device = Default::default();
        let total: usize = shape.iter().product();
        let values: Vec<f32> = (0..total).map(|v| v as f32).collect();
        TaggedTensor::from_floats(values, shape, layout, &device).unwrap()
    }

    #[test]
    fn test_from_floats_layout() {
        let t = ramp(&[2, 3, 4, 5], AxisLayout::FULL);
        assert_eq!(t.batch_size(), 2);
        assert_eq!(t.channels(), 3);
        assert_eq!(t.spatial_shape(), &[4, 5]);
        assert_eq!(t.shape(), vec![2, 3, 4, 5]);

        let t = ramp(&[4, 5], AxisLayout::SPATIAL);
        assert_eq!(t.rank(), 2);
        assert_eq!(t.tensor().dims(), [1, 1, 20]);
    }

    #[test]
    fn test_untagged_axis_must_be_singleton() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 3>::zeros([2, 1, 4], &device);
        assert!(TaggedTensor::new(data, vec![2, 2], AxisLayout::SPATIAL).is_err());
    }

    #[test]
    fn test_with_roles_promotes_leading_batch() {
        let t = ramp(&[3, 4, 5], AxisLayout::SPATIAL).with_roles(Some(2)).unwrap();
        assert_eq!(t.shape(), vec![3, 1, 4, 5]);
    }

    #[test]
    fn test_with_roles_channel_then_batch() {
        // [channel = 2, batch = 3, 4] with only the channel tagged.
        let t = ramp(&[2, 3, 4], AxisLayout::CHANNEL).with_roles(Some(1)).unwrap();
        assert_eq!(t.shape(), vec![3, 2, 4]);
        let values = t.to_vec().unwrap();
        // batch 0, channel 1, voxel 0 was at [1, 0, 0] = 12 in the input.
        assert_eq!(values[4], 12.0);
    }

    #[test]
    fn test_with_roles_rejects_wrong_spatial_rank() {
        let t = ramp(&[4, 5], AxisLayout::FULL);
        assert!(t.with_roles(Some(3)).is_err());
    }

    #[test]
    fn test_repeat_and_restore() {
        let t = ramp(&[4, 4], AxisLayout::SPATIAL).with_roles(Some(2)).unwrap();
        let repeated = t.clone().repeat_batch(3).unwrap();
        assert_eq!(repeated.batch_size(), 3);
        assert!(repeated.clone().repeat_batch(2).is_err());

        let restored = t.restore_layout(AxisLayout::SPATIAL);
        assert_eq!(restored.shape(), vec![4, 4]);
        let kept = repeated.restore_layout(AxisLayout::SPATIAL);
        assert_eq!(kept.shape(), vec![3, 4, 4]);
    }
}

use std::sync::Arc;

use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use warpkit_core::array::{coordinate_grid, AxisLayout, TaggedTensor};
use warpkit_core::transform::{
    compose, Affine, AxisPermutation, AxisReflection, DenseDisplacementField, EvaluationMode, FreeFormDeformation,
    Identity, LocallyAffine, Normalize, PolyAffine, Rescale, Rigid, Rotation180, Rotation270, Rotation90,
    SharedTransform, Transform, TransformExt, TransformKind, TransformRecord, Translation,
};

type B = NdArray<f32>;

fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() < tolerance, "index {}: got {}, expected {}", i, a, e);
    }
}

fn closed_form_transforms() -> Vec<SharedTransform<B>> {
    let device = Default::default();
    let region = Tensor::<B, 3>::from_floats([[[1.0, 0.0, 0.5], [0.0, 1.0, -0.5], [0.0, 0.0, 1.0]]], &device);
    vec![
        Arc::new(Identity::new()),
        Arc::new(Translation::from_offsets(&[1.5, -2.0], &device)),
        Arc::new(Rescale::per_axis(&[2.0, 0.5], &device).unwrap()),
        Arc::new(AxisReflection::new(vec![1], Some(vec![6, 6])).unwrap()),
        Arc::new(AxisPermutation::new(vec![1, 0]).unwrap()),
        Arc::new(Rotation90::new(0, 1, Some(vec![6, 6])).unwrap()),
        Arc::new(Rotation180::new(0, 1, Some(vec![6, 6])).unwrap()),
        Arc::new(Rotation270::new(0, 1, Some(vec![6, 6])).unwrap()),
        Arc::new(
            Rigid::from_angle(
                Tensor::from_floats([0.3], &device),
                Tensor::from_floats([[1.0, 2.0]], &device),
                Some(Tensor::from_floats([[2.5, 2.5]], &device)),
            )
            .unwrap(),
        ),
        Arc::new(
            Affine::new(Tensor::from_floats(
                [[[1.1, 0.2, -1.0], [0.1, 0.9, 2.0], [0.0, 0.0, 1.0]]],
                &device,
            ))
            .unwrap(),
        ),
        Arc::new(PolyAffine::new(region, Tensor::zeros([1, 36], &device), vec![6, 6]).unwrap()),
    ]
}

#[test]
fn test_inverse_round_trip_for_every_closed_form() {
    let device = Default::default();
    let grid = coordinate_grid::<B>(&[6, 6], &device);
    let expected = grid.to_vec().unwrap();
    for transform in closed_form_transforms() {
        let inverse = transform
            .inverse()
            .unwrap()
            .unwrap_or_else(|| panic!("{} should have a closed-form inverse", transform.kind()));
        assert_eq!(inverse.orientation(), transform.orientation());
        let back = inverse.apply(&transform.apply(&grid).unwrap()).unwrap();
        assert_close(&back.to_vec().unwrap(), &expected, 1e-3);
    }
}

#[test]
fn test_composed_inverse_round_trip() {
    let device = Default::default();
    let chain = compose(closed_form_transforms()).unwrap();
    let grid = coordinate_grid::<B>(&[6, 6], &device);
    let inverse = chain.inverse().unwrap().unwrap();
    let back = inverse.apply(&chain.apply(&grid).unwrap()).unwrap();
    assert_close(&back.to_vec().unwrap(), &grid.to_vec().unwrap(), 1e-3);
}

#[test]
fn test_non_invertible_kinds() {
    let device = Default::default();
    let field: SharedTransform<B> = Arc::new(DenseDisplacementField::zeros(&[4, 4], &device));
    let ffd: SharedTransform<B> = Arc::new(
        FreeFormDeformation::covering(Tensor::zeros([1, 2, 9], &device), vec![3, 3], &[4, 4]).unwrap(),
    );
    let percentiles: SharedTransform<B> = Arc::new(Normalize::from_percentiles());
    for transform in [field, ffd, percentiles] {
        assert!(transform.inverse().unwrap().is_none(), "{}", transform.kind());
    }
}

#[test]
fn test_locally_affine_inverse_is_poly_affine() {
    let device = Default::default();
    let matrices = Tensor::<B, 3>::from_floats([[[1.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]], &device);
    let local = LocallyAffine::new(
        matrices,
        Tensor::ones([1, 16], &device),
        Tensor::zeros([1, 16], &device),
        vec![4, 4],
    )
    .unwrap();
    let inverse = local.inverse().unwrap().unwrap();
    assert_eq!(inverse.kind(), TransformKind::PolyAffine);
}

#[test]
fn test_linear_matrices_are_built_on_the_requested_device() {
    let device = <B as burn::tensor::backend::Backend>::Device::default();
    for transform in closed_form_transforms() {
        if let Some(matrix) = transform.affine_matrix(Some(2), &device).unwrap() {
            assert_eq!(matrix.device(), device, "{}", transform.kind());
        }
    }
    let chain = compose(vec![
        Arc::new(AxisReflection::new(vec![0], Some(vec![4, 4])).unwrap()) as SharedTransform<B>,
        Arc::new(Rotation90::new(0, 1, Some(vec![4, 4])).unwrap()),
        Arc::new(AxisPermutation::new(vec![1, 0]).unwrap()),
    ])
    .unwrap();
    let matrix = chain.affine_matrix(None, &device).unwrap().unwrap();
    assert_eq!(matrix.device(), device);
    assert_eq!(chain.fold_affine(&device).unwrap().len(), 1);
}

#[test]
fn test_nested_compositions_flatten() {
    let device = Default::default();
    let a: SharedTransform<B> = Arc::new(Translation::from_offsets(&[1.0, 0.0, 0.0], &device));
    let b: SharedTransform<B> = Arc::new(Rescale::uniform(2.0, &device).unwrap());
    let inner: SharedTransform<B> = Arc::new(a.compose_with(b.clone()).unwrap());
    let outer = compose(vec![inner.clone(), b, inner]).unwrap();
    assert_eq!(outer.len(), 5);
    assert!(outer.elements().iter().all(|e| e.kind() != TransformKind::Composed));
    assert_eq!(outer.ndim(), Some(3));
}

#[test]
fn test_affine_folding_with_interleaved_field() {
    let device = Default::default();
    let field: SharedTransform<B> = Arc::new(
        DenseDisplacementField::from_tensor(Tensor::ones([1, 2, 25], &device).mul_scalar(0.5), vec![5, 5]).unwrap(),
    );
    let chain = compose(vec![
        Arc::new(Translation::from_offsets(&[1.0, -1.0], &device)) as SharedTransform<B>,
        Arc::new(Rotation90::new(0, 1, Some(vec![5, 5])).unwrap()),
        field,
        Arc::new(Rescale::per_axis(&[0.5, 1.5], &device).unwrap()),
        Arc::new(Translation::from_offsets(&[0.25, 0.25], &device)),
    ])
    .unwrap();
    let folded = chain.fold_affine(&device).unwrap();
    assert_eq!(folded.len(), 3);
    assert_eq!(folded.elements()[1].kind(), TransformKind::DenseDisplacementField);

    let grid = coordinate_grid::<B>(&[5, 5], &device);
    assert_close(
        &folded.apply(&grid).unwrap().to_vec().unwrap(),
        &chain.apply(&grid).unwrap().to_vec().unwrap(),
        1e-4,
    );
}

#[test]
fn test_three_dimensional_affine_resolves_to_coordinates() {
    let device = Default::default();
    let affine: SharedTransform<B> = Arc::new(
        Affine::new(Tensor::from_floats(
            [[
                [1.0, 0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0, 2.0],
                [0.0, 0.0, 1.0, 3.0],
                [0.0, 0.0, 0.0, 1.0],
            ]],
            &device,
        ))
        .unwrap(),
    );
    let chain = compose(vec![affine]).unwrap();
    let x = TaggedTensor::<B>::from_floats(vec![0.0; 3000], &[3, 10, 10, 10], AxisLayout::CHANNEL, &device).unwrap();
    assert_eq!(chain.resolve_mode(&x, None), EvaluationMode::Coordinate);

    let out = chain.apply(&x).unwrap();
    assert_eq!(out.shape(), vec![3, 10, 10, 10]);
    let values = out.to_vec().unwrap();
    assert!(values[..1000].iter().all(|&v| v == 1.0));
    assert!(values[2000..].iter().all(|&v| v == 3.0));
}

#[test]
fn test_records_survive_json() {
    let device = Default::default();
    let grid = coordinate_grid::<B>(&[6, 6], &device);
    let mut transforms = closed_form_transforms();
    transforms.push(Arc::new(
        FreeFormDeformation::covering(Tensor::ones([1, 2, 9], &device).mul_scalar(0.3), vec![3, 3], &[6, 6])
            .unwrap(),
    ));
    transforms.push(Arc::new(compose(closed_form_transforms()).unwrap()));
    let shift: SharedTransform<B> = Arc::new(Translation::from_offsets(&[1.0, 1.0], &device));
    transforms.push(shift.fake_inverse());

    for transform in transforms {
        let json = serde_json::to_string(&transform.record().unwrap()).unwrap();
        let record: TransformRecord = serde_json::from_str(&json).unwrap();
        let restored = record.restore::<B>(&device).unwrap();
        assert_eq!(restored.kind(), transform.kind());
        assert_eq!(restored.orientation(), transform.orientation());
        assert_close(
            &restored.apply(&grid).unwrap().to_vec().unwrap(),
            &transform.apply(&grid).unwrap().to_vec().unwrap(),
            1e-4,
        );
    }
}

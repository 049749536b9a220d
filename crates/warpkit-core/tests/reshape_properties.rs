use proptest::prelude::*;
use warpkit_core::ReshapeDescriptor;

const FACTORS: [f64; 4] = [0.5, 1.0, 2.0, 3.0];

fn descriptor() -> impl Strategy<Value = ReshapeDescriptor> {
    (
        prop::collection::vec(prop::sample::select(FACTORS.to_vec()), 0..4),
        prop::sample::select(FACTORS.to_vec()),
        prop::collection::vec((0usize..5, 0usize..5), 0..4),
    )
        .prop_map(|(scale, trailing, swaps)| ReshapeDescriptor::new(scale, trailing, swaps))
}

fn shape() -> impl Strategy<Value = Vec<usize>> {
    // Multiples of 8 stay integral under up to three halvings.
    prop::collection::vec((1usize..6).prop_map(|k| 8 * k), 5)
}

proptest! {
    #[test]
    fn test_composition_is_associative(a in descriptor(), b in descriptor(), c in descriptor(), s in shape()) {
        let left = a.then(&b).then(&c);
        let right = a.then(&b.then(&c));
        prop_assert_eq!(left.apply(&s).unwrap(), right.apply(&s).unwrap());
        prop_assert_eq!(left.permutation(5), right.permutation(5));
    }

    #[test]
    fn test_composition_matches_sequential_application(a in descriptor(), b in descriptor(), s in shape()) {
        let sequential = b.apply(&a.apply(&s).unwrap()).unwrap();
        prop_assert_eq!(a.then(&b).apply(&s).unwrap(), sequential);
    }

    #[test]
    fn test_compose_all_folds_left(a in descriptor(), b in descriptor(), c in descriptor(), s in shape()) {
        let folded = ReshapeDescriptor::compose_all([&a, &b, &c]);
        prop_assert_eq!(folded.apply(&s).unwrap(), a.then(&b).then(&c).apply(&s).unwrap());
    }
}

#[test]
fn test_identity_is_neutral() {
    let d = ReshapeDescriptor::new(vec![2.0, 0.5], 1.0, vec![(0, 2)]);
    let identity = ReshapeDescriptor::identity();
    assert_eq!(identity.then(&d), d);
    assert_eq!(d.then(&identity), d);
}

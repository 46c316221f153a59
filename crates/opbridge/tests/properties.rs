//! Property tests for shape helpers, parameter spaces and host value conversion.

use opbridge::graph::{broadcast_shapes, normalize_axis};
use opbridge::ir::DType;
use opbridge::samples::{convert_value, HostTensor, ParameterSpace};
use proptest::prelude::*;

fn arb_dims(max_rank: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..5, 0..=max_rank)
}

fn arb_real_dtype() -> impl Strategy<Value = DType> {
    prop::sample::select(vec![
        DType::I1,
        DType::Ui8,
        DType::Si8,
        DType::Si16,
        DType::Si32,
        DType::Si64,
        DType::F16,
        DType::Bf16,
        DType::F32,
        DType::F64,
    ])
}

proptest! {
    #[test]
    fn broadcast_is_symmetric(lhs in arb_dims(4), rhs in arb_dims(4)) {
        let forward = broadcast_shapes(&lhs, &rhs).ok();
        let backward = broadcast_shapes(&rhs, &lhs).ok();
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn broadcast_against_ones_is_identity(dims in arb_dims(4), extra in 0usize..3) {
        let ones = vec![1; dims.len() + extra];
        let mut expected = vec![1; extra];
        expected.extend_from_slice(&dims);
        prop_assert_eq!(broadcast_shapes(&dims, &ones).unwrap(), expected);
        prop_assert_eq!(broadcast_shapes(&dims, &dims).unwrap(), dims);
    }

    #[test]
    fn normalize_axis_accepts_exactly_the_valid_range(rank in 0usize..6, axis in -8i64..8) {
        let result = normalize_axis(axis, rank);
        let valid = axis >= -(rank as i64) && axis < rank as i64;
        prop_assert_eq!(result.is_ok(), valid);
        if let Ok(index) = result {
            prop_assert!(index < rank);
            prop_assert_eq!(index as i64 - axis, if axis < 0 { rank as i64 } else { 0 });
        }
    }

    #[test]
    fn space_size_is_the_axis_product(sizes in prop::collection::vec(0i64..4, 1..4)) {
        const NAMES: [&str; 3] = ["a", "b", "c"];
        let space = sizes
            .iter()
            .zip(NAMES)
            .fold(ParameterSpace::new(), |space, (&size, name)| space.axis(name, 0..size));
        let expected = sizes.iter().product::<i64>() as usize;
        prop_assert_eq!(space.unfiltered_len(), expected);
        prop_assert_eq!(space.iter().count(), expected);

        let filtered = space.exclude("even_a", "drop even a", |combo| {
            combo.int("a").map_or(false, |a| a % 2 == 0)
        });
        let kept = filtered.iter().collect::<Vec<_>>();
        prop_assert!(kept.len() <= expected);
        prop_assert!(kept.iter().all(|combo| combo.int("a").map_or(false, |a| a % 2 == 1)));
    }

    #[test]
    fn conversion_is_idempotent(dtype in arb_real_dtype(), value in -1.0e6f64..1.0e6) {
        let once = convert_value(dtype, value);
        prop_assert_eq!(convert_value(dtype, once).to_bits(), once.to_bits());
    }

    #[test]
    fn scalars_store_the_converted_value(dtype in arb_real_dtype(), value in -300.0f64..300.0) {
        let tensor = HostTensor::scalar(dtype, value).unwrap();
        prop_assert_eq!(tensor.dims().len(), 0);
        prop_assert_eq!(tensor.to_f64_vec(), vec![convert_value(dtype, value)]);
    }
}

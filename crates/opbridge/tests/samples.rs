use opbridge::ir::DType;
use opbridge::samples::{
    embedding_bag_space, max_pool_space, sample_inputs_embedding_bag,
    sample_inputs_embedding_bag_padding_idx, sample_inputs_max_pool_empty_strides,
    sample_inputs_special_unary, sample_inputs_xlogy, ParamValue, ParameterSpace, PoolRank,
    SampleArg, SampleContext, SampleInput, StrideStyle,
};
use opbridge::SampleGenerator;

fn collect(generator: SampleGenerator, ctx: &SampleContext) -> Vec<SampleInput> {
    generator(ctx).collect()
}

#[test]
fn space_iterates_the_product_with_the_first_axis_slowest() {
    let space = ParameterSpace::new()
        .axis("a", [1i64, 2])
        .axis("b", [true, false]);
    let combos = space
        .iter()
        .map(|combo| (combo.int("a").unwrap(), combo.bool("b").unwrap()))
        .collect::<Vec<_>>();
    assert_eq!(combos, vec![(1, true), (1, false), (2, true), (2, false)]);
}

#[test]
fn exclusions_prune_and_name_themselves() {
    let space = ParameterSpace::new()
        .axis("mode", [0i64, 1, 2])
        .axis("weighted", [true, false])
        .exclude("weights_need_sum", "weights only with sum", |combo| {
            combo.bool("weighted") == Some(true) && combo.int("mode") != Some(0)
        });
    assert_eq!(space.unfiltered_len(), 6);
    let kept = space.iter().collect::<Vec<_>>();
    assert_eq!(kept.len(), 4);
    assert!(kept.iter().all(|combo| space.check(combo).is_ok()));

    let rejected = space
        .iter_unfiltered()
        .find(|combo| combo.int("mode") == Some(2) && combo.bool("weighted") == Some(true))
        .unwrap();
    let err = space.check(&rejected).unwrap_err();
    assert_eq!(err.exclusion, "weights_need_sum");
    assert_eq!(err.reason, "weights only with sum");
}

#[test]
fn empty_axis_yields_nothing() {
    let space = ParameterSpace::new()
        .axis("a", [1i64, 2])
        .axis("b", Vec::<ParamValue>::new());
    assert_eq!(space.iter().count(), 0);
}

#[test]
fn embedding_bag_never_yields_excluded_combinations() {
    let space = embedding_bag_space(&[&[0, 2, 3], &[0, 0, 2], &[0, 2, 2, 4]])
        .axis("index_rank", [1i64, 2])
        .axis("noncontiguous", [false, true]);
    assert_eq!(space.unfiltered_len(), 144);
    for combo in space.iter() {
        assert!(space.check(&combo).is_ok(), "{combo}");
        if combo.bool("per_sample_weights") == Some(true) {
            assert_eq!(combo.int("mode"), Some(0));
        }
        assert!(!(combo.int("mode") == Some(2) && combo.int("index_rank") == Some(2)));
    }

    let ctx = SampleContext::new("ops.aten.embedding_bag", DType::F32);
    let samples = collect(sample_inputs_embedding_bag, &ctx);
    assert_eq!(samples.len(), 85);
    let last = samples.last().unwrap();
    assert_eq!(last.shape().dims(), &[10, 0]);
    assert!(last.has_boundary_shape());
    for sample in &samples {
        let weighted = !matches!(sample.kwargs["per_sample_weights"], SampleArg::None);
        if weighted {
            assert_eq!(sample.kwargs["mode"], SampleArg::Int(0));
        }
    }
}

#[test]
fn embedding_bag_padding_idx_shares_the_base_space() {
    let ctx = SampleContext::new("ops.aten.embedding_bag.padding_idx", DType::F32);
    let samples = collect(sample_inputs_embedding_bag_padding_idx, &ctx);
    assert_eq!(samples.len(), 81);
    assert!(samples
        .iter()
        .all(|sample| sample.kwargs.contains_key("padding_idx")));
}

#[test]
fn max_pool_variants_extend_one_base_space() {
    let one = max_pool_space(PoolRank::One, StrideStyle::Empty);
    let three = max_pool_space(PoolRank::Three, StrideStyle::Empty);
    assert_eq!(one.axis_values("ceil_mode"), three.axis_values("ceil_mode"));
    assert_eq!(
        one.axis_values("kernel_size").unwrap()[1],
        ParamValue::Ints(vec![3])
    );
    assert_eq!(
        three.axis_values("kernel_size").unwrap()[1],
        ParamValue::Ints(vec![3, 2, 3])
    );
    assert!(one.axis_values("spatial_1").is_none());
    assert_eq!(three.axis_values("spatial_2"), Some(&[ParamValue::Int(5)][..]));

    let with_indices = max_pool_space(PoolRank::Two, StrideStyle::WithIndices);
    assert_eq!(
        with_indices.axis_values("stride").unwrap(),
        &[
            ParamValue::Int(2),
            ParamValue::None,
            ParamValue::Ints(vec![2, 1])
        ]
    );
}

#[test]
fn max_pool_shape_axes_vary_slowest() {
    let space = max_pool_space(PoolRank::Three, StrideStyle::WithIndices);
    let combos = space.iter().collect::<Vec<_>>();
    let names = combos[0]
        .entries()
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>();
    assert_eq!(
        &names[..6],
        &["batch", "channels", "spatial_0", "spatial_1", "spatial_2", "kernel_size"]
    );

    let per_batch = combos.len() / 4;
    let batches = combos
        .iter()
        .map(|combo| combo.get("batch").cloned())
        .collect::<Vec<_>>();
    assert!(batches[..per_batch]
        .iter()
        .all(|batch| *batch == Some(ParamValue::Int(1))));
    assert!(batches[2 * per_batch..3 * per_batch]
        .iter()
        .all(|batch| *batch == Some(ParamValue::Int(0))));
}

#[test]
fn max_pool_rank_comes_from_the_operator_name() {
    let ctx = SampleContext::new("ops.aten.max_pool2d", DType::F32);
    let samples = collect(sample_inputs_max_pool_empty_strides, &ctx);
    assert!(!samples.is_empty());
    assert!(samples.iter().all(|sample| matches!(sample.shape().rank(), 3 | 4)));

    let unknown = SampleContext::new("ops.aten.avg_pool2d", DType::F32);
    assert_eq!(sample_inputs_max_pool_empty_strides(&unknown).count(), 0);
}

#[test]
fn generators_replay_the_same_sequence() {
    let ctx = SampleContext::new("xlogy", DType::F32).with_seed(7);
    let first = collect(sample_inputs_xlogy, &ctx);
    let second = collect(sample_inputs_xlogy, &ctx);
    assert_eq!(first, second);

    let other_seed = collect(sample_inputs_xlogy, &ctx.clone().with_seed(8));
    assert_ne!(first, other_seed);
}

#[test]
fn special_unary_covers_every_boundary_shape() {
    let ctx = SampleContext::new("erf", DType::F64);
    let shapes = sample_inputs_special_unary(&ctx)
        .map(|sample| sample.shape().dims().to_vec())
        .collect::<Vec<_>>();
    assert_eq!(
        shapes,
        vec![vec![], vec![0], vec![5], vec![5, 5], vec![2, 0, 3]]
    );
}

#[test]
fn xlogy_keeps_the_truth_table_samples() {
    let ctx = SampleContext::new("xlogy", DType::F32);
    let samples = collect(sample_inputs_xlogy, &ctx);
    let zero_nan = samples
        .iter()
        .filter(|sample| sample.shape().rank() == 0)
        .filter_map(|sample| {
            let other = sample.args[0].as_tensor()?;
            let input = sample.input.as_tensor()?;
            Some((input.to_f64_vec()[0], other.to_f64_vec()[0]))
        })
        .any(|(a, b)| a == 0.0 && b.is_nan());
    assert!(zero_nan);
}

#[test]
fn stopping_early_needs_no_cleanup() {
    let ctx = SampleContext::new("ops.aten.embedding_bag", DType::F16);
    let mut samples = sample_inputs_embedding_bag(&ctx);
    assert!(samples.next().is_some());
    drop(samples);
}

#[test]
fn gradient_flag_does_not_change_payloads() {
    let ctx = SampleContext::new("erf", DType::F32).with_seed(3);
    let grad = ctx.clone().with_requires_grad(true);
    assert!(grad.requires_grad);
    assert_eq!(
        collect(sample_inputs_special_unary, &ctx),
        collect(sample_inputs_special_unary, &grad)
    );
}

use super::{SampleArg, SampleContext, SampleInput, SampleIter};

/// `(input, output_size, kernel_size, dilation, padding, stride)`.
type Col2ImCase = (&'static [usize], [i64; 2], [i64; 2], [i64; 2], [i64; 2], [i64; 2]);

const COL2IM_CASES: &[Col2ImCase] = &[
    (&[1, 12, 12], [4, 5], [2, 2], [1, 1], [0, 0], [1, 1]),
    (&[1, 8, 30], [4, 5], [2, 2], [1, 1], [1, 1], [1, 1]),
    (&[1, 8, 9], [4, 4], [2, 2], [1, 1], [0, 0], [1, 1]),
    (&[1, 8, 25], [4, 4], [2, 2], [1, 1], [1, 1], [1, 1]),
    (&[1, 8, 9], [4, 4], [2, 2], [1, 1], [1, 1], [2, 2]),
    (&[1, 9, 4], [4, 4], [3, 3], [1, 1], [1, 1], [2, 2]),
    (&[1, 18, 16], [2, 2], [1, 1], [2, 2], [3, 3], [2, 2]),
    (&[0, 12, 12], [4, 5], [2, 2], [1, 1], [0, 0], [1, 1]),
];

pub fn sample_inputs_col2im(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    Box::new(COL2IM_CASES.iter().map(
        move |&(input, output_size, kernel_size, dilation, padding, stride)| {
            SampleInput::new(maker.make(input), dtype)
                .arg(output_size.to_vec())
                .arg(kernel_size.to_vec())
                .kwarg("dilation", dilation.to_vec())
                .kwarg("padding", padding.to_vec())
                .kwarg("stride", stride.to_vec())
        },
    ))
}

/// Either a per-dimension list or one value shared by every spatial dimension.
#[derive(Clone, Copy)]
enum Padding {
    Each(&'static [i64]),
    Uniform(i64),
}

impl From<Padding> for SampleArg {
    fn from(padding: Padding) -> Self {
        match padding {
            Padding::Each(values) => SampleArg::Ints(values.to_vec()),
            Padding::Uniform(value) => SampleArg::Int(value),
        }
    }
}

struct ConvCase {
    input: &'static [usize],
    weight: &'static [usize],
    bias: Option<&'static [usize]>,
    stride: &'static [i64],
    padding: Padding,
    dilation: &'static [i64],
    groups: i64,
}

const CONV3D_CASES: &[ConvCase] = &[
    ConvCase {
        input: &[1, 3, 3, 224, 224],
        weight: &[32, 3, 3, 3, 3],
        bias: None,
        stride: &[2, 2, 2],
        padding: Padding::Each(&[1, 1, 1]),
        dilation: &[1, 1, 1],
        groups: 1,
    },
    ConvCase {
        input: &[2, 4, 3, 56, 56],
        weight: &[32, 4, 3, 3, 3],
        bias: Some(&[32]),
        stride: &[3, 3, 3],
        padding: Padding::Uniform(2),
        dilation: &[1, 1, 1],
        groups: 1,
    },
    ConvCase {
        input: &[0, 4, 3, 8, 8],
        weight: &[8, 4, 3, 3, 3],
        bias: Some(&[8]),
        stride: &[1, 1, 1],
        padding: Padding::Uniform(1),
        dilation: &[1, 1, 1],
        groups: 1,
    },
];

/// Each case twice: batched, then with the batch axis dropped.
pub fn sample_inputs_conv3d(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    Box::new(
        CONV3D_CASES
            .iter()
            .flat_map(|case| [(case, false), (case, true)])
            .map(move |(case, unbatched)| {
                let input = if unbatched { &case.input[1..] } else { case.input };
                let bias = case.bias.map(|dims| maker.make(dims));
                SampleInput::new(maker.make(input), dtype)
                    .arg(maker.make(case.weight))
                    .arg(bias)
                    .kwarg("stride", case.stride.to_vec())
                    .kwarg("padding", case.padding)
                    .kwarg("dilation", case.dilation.to_vec())
                    .kwarg("groups", case.groups)
            }),
    )
}

struct ConvolutionCase {
    conv: ConvCase,
    transposed: bool,
    output_padding: &'static [i64],
}

const CONVOLUTION_CASES: &[ConvolutionCase] = &[
    ConvolutionCase {
        conv: ConvCase {
            input: &[1, 3, 4],
            weight: &[3, 3, 3],
            bias: Some(&[3]),
            stride: &[2],
            padding: Padding::Each(&[2]),
            dilation: &[1],
            groups: 1,
        },
        transposed: false,
        output_padding: &[0],
    },
    ConvolutionCase {
        conv: ConvCase {
            input: &[1, 3, 4],
            weight: &[3, 3, 3],
            bias: None,
            stride: &[2],
            padding: Padding::Each(&[2]),
            dilation: &[1],
            groups: 1,
        },
        transposed: true,
        output_padding: &[0],
    },
    ConvolutionCase {
        conv: ConvCase {
            input: &[1, 3, 224, 224],
            weight: &[32, 3, 3, 3],
            bias: None,
            stride: &[2, 2],
            padding: Padding::Each(&[1, 1]),
            dilation: &[1, 1],
            groups: 1,
        },
        transposed: false,
        output_padding: &[0, 0],
    },
    ConvolutionCase {
        conv: ConvCase {
            input: &[1, 3, 3, 224, 224],
            weight: &[32, 3, 3, 3, 3],
            bias: Some(&[32]),
            stride: &[2, 2, 2],
            padding: Padding::Each(&[1, 1, 1]),
            dilation: &[1, 1, 1],
            groups: 1,
        },
        transposed: false,
        output_padding: &[0, 0, 0],
    },
    ConvolutionCase {
        conv: ConvCase {
            input: &[2, 4, 6, 6],
            weight: &[4, 1, 3, 3],
            bias: Some(&[4]),
            stride: &[3, 2],
            padding: Padding::Each(&[1, 1]),
            dilation: &[1, 1],
            groups: 4,
        },
        transposed: true,
        output_padding: &[0, 0],
    },
    ConvolutionCase {
        conv: ConvCase {
            input: &[0, 3, 4],
            weight: &[3, 3, 3],
            bias: Some(&[3]),
            stride: &[1],
            padding: Padding::Each(&[1]),
            dilation: &[1],
            groups: 1,
        },
        transposed: false,
        output_padding: &[0],
    },
];

pub fn sample_inputs_convolution(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    Box::new(CONVOLUTION_CASES.iter().map(move |case| {
        let conv = &case.conv;
        let input = maker.make(conv.input);
        let weight = maker.make(conv.weight);
        let bias = conv.bias.map(|dims| maker.make(dims));
        SampleInput::new(input, dtype)
            .arg(weight)
            .arg(bias)
            .kwarg("stride", conv.stride.to_vec())
            .kwarg("padding", conv.padding)
            .kwarg("dilation", conv.dilation.to_vec())
            .kwarg("transposed", case.transposed)
            .kwarg("output_padding", case.output_padding.to_vec())
            .kwarg("groups", conv.groups)
    }))
}

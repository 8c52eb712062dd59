use std::sync::Arc;

use approx::assert_relative_eq;
use rf_dsp::{Convolver, FadeKind, Filter, FilterStorage, InputBuffer, Stage, StageFilterSizes};

fn push_and_process(
    input: &mut InputBuffer,
    conv: &mut Convolver,
    block: &[f32],
) -> (Vec<f32>, Vec<f32>) {
    let spectrum = input.push_block(block).to_vec();
    let (left, right) = conv.process(&spectrum);
    (left.to_vec(), right.to_vec())
}

/// An impulse fed through a single-partition identity filter should reappear
/// unchanged exactly one block later — the overlap-save latency.
#[test]
fn impulse_through_identity_filter_reappears_one_block_later() {
    let b = 16;
    let mut input = InputBuffer::new(b);
    let mut conv = Convolver::new(b, 1, 1);

    let ir = {
        let mut v = vec![0.0f32; b];
        v[0] = 1.0;
        v
    };
    let filter = Arc::new(Filter::from_time_domain(&ir, &ir, b, FadeKind::None));
    conv.set_all_filters(vec![filter]).unwrap();

    let mut block_a = vec![0.0f32; b];
    block_a[3] = 0.5;
    block_a[9] = -0.25;

    let (first_left, _) = push_and_process(&mut input, &mut conv, &block_a);
    assert!(first_left.iter().all(|&v| v.abs() < 1e-5));

    let silence = vec![0.0f32; b];
    let (second_left, second_right) = push_and_process(&mut input, &mut conv, &silence);
    for (got, expected) in second_left.iter().zip(block_a.iter()) {
        assert_relative_eq!(got, expected, epsilon = 1e-4);
    }
    for (got, expected) in second_right.iter().zip(block_a.iter()) {
        assert_relative_eq!(got, expected, epsilon = 1e-4);
    }
}

/// A pose with no installed filter falls back to silence rather than
/// panicking or propagating an error.
#[test]
fn unmapped_pose_key_yields_silent_filter() {
    let storage = FilterStorage::new(32);
    let key = [7i32; 15];
    let filter = storage.get(Stage::Ds, &key);
    assert!(filter.is_silent());
}

/// Swapping to a new filter mid-stream blends over exactly one block rather
/// than producing a discontinuous jump.
#[test]
fn filter_swap_blends_without_a_discontinuity() {
    let b = 32;
    let mut input = InputBuffer::new(b);
    let mut conv = Convolver::new(b, 1, 1);

    let loud_ir = vec![1.0f32; b];
    let loud = Arc::new(Filter::from_time_domain(&loud_ir, &loud_ir, b, FadeKind::None));
    conv.set_all_filters(vec![loud]).unwrap();

    let steady = vec![0.1f32; b];
    let _ = push_and_process(&mut input, &mut conv, &steady);
    let (before_swap, _) = push_and_process(&mut input, &mut conv, &steady);

    conv.set_all_filters(vec![Arc::new(Filter::silent(b))]).unwrap();
    let (during_swap, _) = push_and_process(&mut input, &mut conv, &steady);
    let (after_swap, _) = push_and_process(&mut input, &mut conv, &steady);

    // The crossfade window's first sample is fade_out=1, fade_in=0, so the
    // very first sample of the swap block must still match the outgoing
    // filter's steady-state output exactly — no click at the seam.
    assert_relative_eq!(during_swap[0], before_swap[0], epsilon = 1e-4);
    // By the last sample of the swap block the incoming (silent) filter
    // fully dominates.
    assert_relative_eq!(during_swap[b - 1], 0.0, epsilon = 1e-3);
    assert_relative_eq!(after_swap[0], 0.0, epsilon = 1e-3);
}

/// Each channel's filter contributes independently; silencing one channel
/// must not change another's contribution.
#[test]
fn channels_are_summed_independently() {
    let b = 8;
    let mut input_a = InputBuffer::new(b);
    let mut input_b = InputBuffer::new(b);
    let mut conv_two_channel = Convolver::new(b, 2, 1);
    let mut conv_one_channel = Convolver::new(b, 1, 1);

    let ir_a: Vec<f32> = (0..b).map(|i| 1.0 / (i as f32 + 1.0)).collect();
    let filter_a = Arc::new(Filter::from_time_domain(&ir_a, &ir_a, b, FadeKind::None));
    let silent = Arc::new(Filter::silent(b));

    conv_two_channel
        .set_all_filters(vec![filter_a.clone(), silent])
        .unwrap();
    conv_one_channel.set_all_filters(vec![filter_a]).unwrap();

    let block = vec![0.3f32; b];
    let silence = vec![0.0f32; b];
    let _ = push_and_process(&mut input_a, &mut conv_two_channel, &block);
    let _ = push_and_process(&mut input_b, &mut conv_one_channel, &block);
    let (two_channel_out, _) = push_and_process(&mut input_a, &mut conv_two_channel, &silence);
    let (one_channel_out, _) = push_and_process(&mut input_b, &mut conv_one_channel, &silence);

    for (a, b) in two_channel_out.iter().zip(one_channel_out.iter()) {
        assert_relative_eq!(a, b, epsilon = 1e-4);
    }
}

#[test]
fn missing_filter_list_is_a_startup_error_not_a_silent_empty_storage() {
    let sizes = StageFilterSizes {
        ds: 100,
        er: 64,
        lr: 200,
        sd: 1,
        hp: 0,
    };
    let mut storage = FilterStorage::new(64);
    storage
        .load_from_file_list(std::path::Path::new("/nonexistent"), &sizes)
        .expect_err("missing file list must fail, not silently produce an empty storage");
}

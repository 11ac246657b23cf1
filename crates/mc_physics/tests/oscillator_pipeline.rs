// crates/mc_physics/tests/oscillator_pipeline.rs

//! 振荡器与块通道联合测试
//!
//! 生产者写入进动磁化，消费端按区域求平均并更新振荡器电阻。
use mc_physics::{
    lookup, precession_mx, region_averages, BlockProducer, Command, OscillatorState,
};
use mc_runtime::{channel, HostMemory};

#[test]
fn test_channel_samples_drive_resistance() {
    let total = 64;
    let (tx, mut rx) = channel(HostMemory::<f64>::zeroed([1, 4, 16]));
    let mut producer = BlockProducer::new(tx, 16).unwrap();
    producer
        .produce_pass(|i| precession_mx(i, total, 0.0, 5e9))
        .unwrap();

    let block = rx.acquire_readable(total).unwrap();
    let averages = region_averages(block.as_slice());
    block.release();

    let mut state = OscillatorState::new();
    for line in ["SetOutputResistance(100, 300)", "SetJread(1e9)", "SetCoupling(1, 0, 0, 0, 0, 0)"] {
        line.parse::<Command>().unwrap().apply(&mut state);
    }
    let excitation = state.update_output_resistance(averages);

    // 区域相位 0, π/2, π, 3π/2 -> m_x = 1, 0, -1, 0
    assert!((lookup("Rout1").unwrap().eval(&state) - 100.0).abs() < 1e-9);
    assert!((lookup("Rout2").unwrap().eval(&state) - 200.0).abs() < 1e-9);
    assert!((lookup("Rout3").unwrap().eval(&state) - 300.0).abs() < 1e-9);
    assert!((lookup("Rout4").unwrap().eval(&state) - 200.0).abs() < 1e-9);

    // J2 = 1e9 * (100 * r1 * 1), r1 = -1
    assert!((excitation[1][2] - (-1e11)).abs() < 1e-9 * 1e11);
    assert!(excitation[0][2].abs() < 1e-3);
}

#[test]
fn test_f32_channel_averages() {
    let (tx, mut rx) = channel(HostMemory::<f32>::zeroed([2, 2, 8]));
    let mut producer = BlockProducer::new(tx, 8).unwrap();
    producer.produce_pass(|i| if i < 16 { 0.5 } else { -0.25 }).unwrap();

    let block = rx.acquire_readable(32).unwrap();
    let averages = region_averages(block.as_slice());
    block.release();

    assert_eq!(averages, [Some(0.5), Some(0.5), Some(-0.25), Some(-0.25)]);
}

#[test]
fn test_uneven_buffer_regions_match_producer() {
    // 10 个元素不能被 4 整除，区域为 [0,0,0,1,1,2,2,2,3,3]
    let total = 10;
    let (tx, mut rx) = channel(HostMemory::<f64>::zeroed([1, 1, 10]));
    let mut producer = BlockProducer::new(tx, 10).unwrap();
    producer
        .produce_pass(|i| precession_mx(i, total, 0.0, 5e9))
        .unwrap();

    let block = rx.acquire_readable(total).unwrap();
    let averages = region_averages(block.as_slice());
    block.release();

    let expected = [1.0, 0.0, -1.0, 0.0];
    for (avg, want) in averages.iter().zip(expected) {
        let avg = avg.unwrap();
        assert!((avg - want).abs() < 1e-12, "average {} vs {}", avg, want);
    }

    let mut state = OscillatorState::new();
    state.set_output_resistance(100.0, 300.0);
    state.update_output_resistance(averages);
    assert!((lookup("Rout4").unwrap().eval(&state) - 200.0).abs() < 1e-9);
}

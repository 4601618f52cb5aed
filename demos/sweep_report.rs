//! Sweep Report
//!
//! Renders a short logarithmic sweep offline, the way an AudioWorklet would
//! pull it, and prints the frequency, note and spectrum peak every tenth of
//! the way through. Then runs the hearing test against a simulated timer.
//!
//! Run with: cargo run --example sweep_report

use freqgen::prelude::*;

const SAMPLE_RATE: f64 = 48_000.0;
const BLOCK: usize = 128;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let mut engine = Engine::new(EngineConfig {
        sample_rate: SAMPLE_RATE,
        noise_seed: Some(42),
        ..Default::default()
    });
    let view = Viewport::new(1024.0, 256.0);

    println!("=== Sweep: 20 Hz -> 20 kHz, 2 s, logarithmic ===\n");
    engine.start_sweep(SweepParams::new(20.0, 20_000.0, 2.0, SweepCurve::Logarithmic));

    let mut left = vec![0.0f32; BLOCK];
    let mut right = vec![0.0f32; BLOCK];
    let mut next_report = 0.0;

    while engine.status() == EngineStatus::Sweeping {
        engine.render(&mut left, &mut right);
        let Some(step) = engine.on_frame() else {
            break;
        };

        if step.progress >= next_report || step.completed {
            let peak_bar = engine
                .spectrum(view)
                .and_then(|bars| {
                    bars.iter()
                        .enumerate()
                        .max_by(|a, b| a.1.height.total_cmp(&b.1.height))
                        .map(|(i, _)| i)
                })
                .unwrap_or(0);
            let marker = engine.peak_marker(view);

            println!(
                "{:>5.1}%  {:>9.1} Hz  {:<10} peak bar {:>3}  marker x {:>6.1}",
                step.progress * 100.0,
                step.frequency,
                engine.note_name(),
                peak_bar,
                marker.x
            );
            next_report += 0.1;
        }
    }

    println!("\nSweep finished, status: {:?}", engine.status());

    println!("\n=== Hearing test (listener hears up to 15 kHz) ===\n");
    let mut now_ms = 0.0;
    engine.start_hearing_test(now_ms);

    while engine.is_test_running() {
        now_ms += 250.0;
        engine.tick(now_ms);
        // Simulated listener stops the test once the tone becomes inaudible
        if engine.display_frequency() > 15_000.0 {
            engine.stop_test();
        }
    }

    if let Some(result) = engine.hearing_result() {
        println!("Highest frequency heard: {}", result);
    }
}

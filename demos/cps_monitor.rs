//! Counts-per-second monitor: prints the event rate once per second, plus
//! cumulative totals and any inferred producer-side drops.
//!
//! Runs against the loopback channel with a bursty producer so the display
//! has something to show; point it at the device listener for real hardware.
//!
//! Run with: cargo run --example cps_monitor

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use fastirq::{IrqResult, ListenerConfig, LoopbackChannel, OverflowPolicy, PulseStats};

const RUN_FOR: Duration = Duration::from_secs(10);

fn main() -> IrqResult<()> {
    fastirq::init_tracing();

    let channel = LoopbackChannel::new()?;
    let mut producer = channel.producer(OverflowPolicy::DropNew)?;
    let listener = channel.listener(ListenerConfig::default());

    let stats = Arc::new(PulseStats::new());
    let handler_stats = Arc::clone(&stats);
    listener.start(move |event| handler_stats.record(event))?;

    let running = Arc::new(AtomicBool::new(true));
    let producer_running = Arc::clone(&running);
    let producer_thread = std::thread::spawn(move || {
        // Alternate between a fast and a slow second to make the rate move.
        let mut fast = true;
        while producer_running.load(Ordering::Relaxed) {
            let period = if fast {
                Duration::from_micros(500)
            } else {
                Duration::from_millis(5)
            };
            let burst_end = Instant::now() + Duration::from_secs(1);
            while Instant::now() < burst_end && producer_running.load(Ordering::Relaxed) {
                producer.pulse(0);
                std::thread::sleep(period);
            }
            fast = !fast;
        }
    });

    let deadline = Instant::now() + RUN_FOR;
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_secs(1));
        let cps = stats.take_window();
        let snapshot = stats.snapshot();
        println!(
            "{cps:>6} cps | total={} hardware_drops={}",
            snapshot.dispatched, snapshot.hardware_drops
        );
    }

    running.store(false, Ordering::Relaxed);
    producer_thread.join().expect("producer thread panicked");
    listener.stop();
    Ok(())
}

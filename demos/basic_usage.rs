//! Minimal end-to-end pipeline: a loopback producer pulses at 1 kHz, the
//! listener pushes into the decoupling queue, and the main thread pops and
//! prints. Swap `LoopbackChannel` for `FastIrq::open("/dev/rp1_gpio_irq")`
//! on a machine with the device present.
//!
//! Run with: cargo run --example basic_usage

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fastirq::{
    IrqEvent, IrqResult, ListenerConfig, LoopbackChannel, OverflowPolicy, PulseStats, spsc,
};

const RUN_FOR: Duration = Duration::from_secs(3);
const PULSE_PERIOD: Duration = Duration::from_millis(1);

fn main() -> IrqResult<()> {
    fastirq::init_tracing();

    let channel = LoopbackChannel::new()?;
    let mut producer = channel.producer(OverflowPolicy::DropNew)?;
    let listener = channel.listener(ListenerConfig::default());

    let (mut tx, mut rx) = spsc::channel::<IrqEvent>(1024);
    let stats = Arc::new(PulseStats::new());

    let handler_stats = Arc::clone(&stats);
    listener.start(move |event| {
        handler_stats.record(event);
        if tx.push(*event).is_err() {
            handler_stats.note_queue_drop();
        }
    })?;

    let running = Arc::new(AtomicBool::new(true));
    let producer_running = Arc::clone(&running);
    let producer_thread = std::thread::spawn(move || {
        let mut level = 0u32;
        while producer_running.load(Ordering::Relaxed) {
            level ^= 1;
            producer.pulse(level);
            std::thread::sleep(PULSE_PERIOD);
        }
        producer.dropped()
    });

    let deadline = std::time::Instant::now() + RUN_FOR;
    let mut last_ns = 0u64;
    while std::time::Instant::now() < deadline {
        match rx.pop() {
            Some(event) => {
                let delta_us = if last_ns == 0 {
                    0
                } else {
                    (event.timestamp_ns - last_ns) / 1_000
                };
                last_ns = event.timestamp_ns;
                println!(
                    "#{:<8} aux={} delta={delta_us} us",
                    event.event_counter, event.aux_state
                );
            }
            None => std::thread::sleep(Duration::from_micros(200)),
        }
    }

    running.store(false, Ordering::Relaxed);
    let producer_drops = producer_thread.join().expect("producer thread panicked");
    listener.stop();

    let snapshot = stats.snapshot();
    println!(
        "dispatched={} hardware_drops={} queue_drops={} producer_drops={producer_drops}",
        snapshot.dispatched, snapshot.hardware_drops, snapshot.queue_drops
    );
    Ok(())
}

#![allow(dead_code)]

use std::thread::{self, JoinHandle};
use std::time::Duration;

use vcan_broker::{Broker, BrokerConfig, Handle, Interrupter, OpenMode};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Broker with a short drain timeout, so tests closing undeliverable
/// writers stay fast.
pub fn quick_broker(endpoints: usize, queue_capacity: usize) -> Broker {
    init_logging();
    Broker::new(
        BrokerConfig::default()
            .with_endpoint_count(endpoints)
            .with_queue_capacity(queue_capacity)
            .with_drain_interval(Duration::from_millis(2))
            .with_drain_attempts(5),
    )
    .expect("valid config")
}

/// Reader on `id` accepting exactly `address`.
pub fn exact_reader(broker: &Broker, id: usize, address: u16) -> Handle {
    let reader = broker.open(id, OpenMode::READ).expect("open reader");
    reader.set_filter_address(address);
    reader.set_filter_mask(0xffff);
    reader
}

/// Drain everything readable without blocking.
pub fn read_all(handle: &Handle) -> Vec<Vec<u8>> {
    let mut messages = Vec::new();
    while let Ok(payload) = handle.read_message(false) {
        messages.push(payload.to_vec());
    }
    messages
}

/// Keep interrupting until `thread` finishes; a reader that has not reached
/// its wait yet would miss a single interrupt.
pub fn interrupt_until_done<T>(interrupter: &Interrupter, thread: &JoinHandle<T>) {
    while !thread.is_finished() {
        interrupter.interrupt();
        thread::sleep(Duration::from_millis(5));
    }
}

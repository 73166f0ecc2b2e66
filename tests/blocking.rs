mod common;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::thread;
use std::time::Duration;

use common::{interrupt_until_done, quick_broker};
use vcan_broker::{Error, Handle, OpenMode};

#[test]
fn non_blocking_read_on_empty_queue() {
    let broker = quick_broker(2, 4);
    let reader = broker.open(1, OpenMode::READ).unwrap();
    assert_eq!(reader.read(false), Err(Error::WouldBlock));
    assert!(!reader.poll());
}

#[test]
fn blocking_read_waits_for_writer() {
    let broker = quick_broker(2, 4);
    let reader = broker.open(1, OpenMode::READ).unwrap();
    let written = AtomicBool::new(false);

    thread::scope(|s| {
        let bus = broker.clone();
        let written = &written;
        s.spawn(move || {
            let writer = bus.open(0, OpenMode::WRITE).unwrap();
            thread::sleep(Duration::from_millis(50));
            written.store(true, SeqCst);
            writer.write(0x10, &[7, 7, 7]).unwrap();
            writer.close().unwrap();
        });

        let frame = reader.read(true).unwrap();
        assert!(written.load(SeqCst));
        assert_eq!(&frame[..3], &[7, 7, 7]);
    });
}

#[test]
fn interrupted_read_returns_promptly() {
    let broker = quick_broker(2, 4);
    let reader = broker.open(1, OpenMode::READ).unwrap();
    let interrupter = reader.interrupter();

    let blocked = thread::spawn(move || reader.read(true));
    interrupt_until_done(&interrupter, &blocked);
    assert_eq!(blocked.join().unwrap(), Err(Error::Interrupted));
}

#[test]
fn interrupt_without_reader_has_no_effect() {
    let broker = quick_broker(2, 4);
    let reader = broker.open(1, OpenMode::READ).unwrap();
    reader.interrupter().interrupt();

    let writer = broker.open(0, OpenMode::WRITE).unwrap();
    writer.write(0x10, &[1]).unwrap();
    assert_eq!(reader.read(true).unwrap()[0], 1);
}

#[test]
fn stale_interrupter_does_not_reach_new_reader() {
    let broker = quick_broker(2, 4);
    let first = broker.open(1, OpenMode::READ).unwrap();
    let stale = first.interrupter();
    first.close().unwrap();

    let reader = broker.open(1, OpenMode::READ).unwrap();
    let writer = broker.open(0, OpenMode::WRITE).unwrap();
    thread::scope(|s| {
        let blocked = s.spawn(|| reader.read(true));
        for _ in 0..10 {
            stale.interrupt();
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!blocked.is_finished());
        writer.write(0x10, &[5]).unwrap();
        assert_eq!(blocked.join().unwrap().unwrap()[0], 5);
    });
}

#[test]
fn write_only_interrupter_does_nothing() {
    let broker = quick_broker(2, 4);
    let reader = broker.open(1, OpenMode::READ).unwrap();
    let writer = broker.open(1, OpenMode::WRITE).unwrap();
    let sender = broker.open(0, OpenMode::WRITE).unwrap();
    thread::scope(|s| {
        let blocked = s.spawn(|| reader.read(true));
        for _ in 0..10 {
            writer.interrupter().interrupt();
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!blocked.is_finished());
        sender.write(0x10, &[6]).unwrap();
        assert_eq!(blocked.join().unwrap().unwrap()[0], 6);
    });
}

fn node_main_loop(node: Handle, replies: u16) -> Result<usize, Error> {
    let mut echoed = 0;
    loop {
        let payload = match node.read_message(true) {
            Ok(payload) => payload,
            Err(Error::Interrupted) => return Ok(echoed),
            Err(err) => return Err(err),
        };
        node.write(replies, &payload)?;
        echoed += 1;
    }
}

#[test]
fn chat() {
    let broker = quick_broker(3, 8);

    let node = broker.open(1, OpenMode::READ_WRITE).unwrap();
    node.set_filter_address(0x10);
    node.set_filter_mask(0xfff0);
    let stop = node.interrupter();
    let node_thread = thread::spawn(move || node_main_loop(node, 0x20));

    let master = broker.open(0, OpenMode::READ_WRITE).unwrap();
    master.set_filter_address(0x20);
    master.set_filter_mask(0xffff);

    for n in 0..50u8 {
        let address = 0x10 + u16::from(n % 16);
        master.write(address, &[n, n, n]).unwrap();
        let reply = master.read_message(true).unwrap();
        assert_eq!(reply.as_slice(), &[n, n, n]);
    }

    interrupt_until_done(&stop, &node_thread);
    assert_eq!(node_thread.join().expect("node panicked"), Ok(50));
    assert_eq!(master.stats().rx_packets, 50);
}

#[test]
fn concurrent_writers_keep_per_writer_order() {
    const PER_WRITER: u8 = 100;
    let broker = quick_broker(4, 1500);
    let reader = broker.open(3, OpenMode::READ).unwrap();

    thread::scope(|s| {
        for id in 0..3 {
            let bus = broker.clone();
            s.spawn(move || {
                let writer = bus.open(id, OpenMode::WRITE).unwrap();
                for seq in 0..PER_WRITER {
                    writer.write(id as u16, &[id as u8, seq]).unwrap();
                }
                writer.close().unwrap();
            });
        }
    });

    let mut next = [0u8; 3];
    let mut count = 0;
    while let Ok(payload) = reader.read_message(false) {
        let writer = usize::from(payload[0]);
        assert_eq!(payload[1], next[writer]);
        next[writer] += 1;
        count += 1;
    }
    assert_eq!(count, 3 * usize::from(PER_WRITER));
}

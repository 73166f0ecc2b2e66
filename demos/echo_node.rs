use std::error::Error;
use std::thread;

use vcan_broker::{Broker, BrokerConfig, Error as BusError, Handle, OpenMode};

const NODE_ADDRESS: u16 = 0x0010;
const MASTER_ADDRESS: u16 = 0x0020;

/// Answer every message addressed to the node with the same payload, sent
/// back to the master. Stops when interrupted.
fn node_main_loop(node: Handle) -> Result<usize, BusError> {
    let mut echoed = 0;
    loop {
        let payload = match node.read_message(true) {
            Ok(payload) => payload,
            Err(BusError::Interrupted) => break,
            Err(err) => return Err(err),
        };
        println!("node received {:02x?}", payload.as_slice());
        node.write(MASTER_ADDRESS, &payload)?;
        echoed += 1;
    }
    node.close()?;
    Ok(echoed)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let broker = Broker::new(BrokerConfig::default())?;

    let node = broker.open(1, OpenMode::READ_WRITE)?;
    node.set_filter_address(NODE_ADDRESS);
    node.set_filter_mask(0xffff);
    let stop = node.interrupter();
    let node_thread = thread::spawn(move || node_main_loop(node));

    let master = broker.open(0, OpenMode::READ_WRITE)?;
    master.set_filter_address(MASTER_ADDRESS);
    master.set_filter_mask(0xffff);

    for n in 1..=4u8 {
        let payload: Vec<u8> = (0..n).collect();
        master.write(NODE_ADDRESS, &payload)?;
        let reply = master.read_message(true)?;
        println!("master got echo {:02x?}", reply.as_slice());
        assert_eq!(reply.as_slice(), payload.as_slice());
    }
    println!("master stats: {:?}", master.stats());
    master.close()?;

    // A reader may not be blocked yet when the first interrupt fires.
    while !node_thread.is_finished() {
        stop.interrupt();
        thread::sleep(std::time::Duration::from_millis(10));
    }
    let echoed = node_thread.join().expect("node thread panicked")?;
    println!("node echoed {} messages", echoed);
    Ok(())
}

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use vcan_broker::command::{parse_command, Command, FilterSetting};
use vcan_broker::{Broker, BrokerConfig, Error, Handle, Payload};

const HELP: &str = "\
open <id> r|w|rw          open an endpoint
close <id>                close it again
write <id> <addr> <hex>.. send 1 to 8 hex bytes to an address
read <id> [wait]          read one message (wait: until enter is pressed)
poll <id>                 check for a readable message
filter <id> addr <addr>   set the acceptance address
filter <id> mask <mask>   set the acceptance mask
filter <id> on|off        enable or disable filtering
stats <id>                show counters
quit";

const WAIT_TICK: Duration = Duration::from_millis(20);

struct Shell {
    broker: Broker,
    handles: HashMap<usize, Handle>,
    // every stdin line, read by a single thread
    lines: mpsc::Receiver<String>,
}

impl Shell {
    fn handle(&self, id: usize) -> Result<&Handle> {
        self.handles
            .get(&id)
            .with_context(|| format!("endpoint {} is not open in this shell", id))
    }

    fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Open { id, mode } => {
                if self.handles.contains_key(&id) {
                    anyhow::bail!("endpoint {} is already open in this shell", id);
                }
                let handle = self.broker.open(id, mode)?;
                self.handles.insert(id, handle);
            }
            Command::Close { id } => {
                let handle = self
                    .handles
                    .remove(&id)
                    .with_context(|| format!("endpoint {} is not open in this shell", id))?;
                handle.close()?;
            }
            Command::Write {
                id,
                address,
                payload,
            } => {
                let handle = self.handle(id)?;
                let accepted = handle.write(address, &payload)?;
                println!("{} bytes accepted, {} pending", accepted, handle.pending_tx());
            }
            Command::Read { id, blocking } => cmd_read(self.handle(id)?, blocking, &self.lines)?,
            Command::Poll { id } => println!("{}", self.handle(id)?.poll()),
            Command::Filter { id, setting } => {
                let handle = self.handle(id)?;
                match setting {
                    FilterSetting::Address(address) => handle.set_filter_address(address),
                    FilterSetting::Mask(mask) => handle.set_filter_mask(mask),
                    FilterSetting::Enabled(enabled) => handle.set_filter_enabled(enabled),
                }
                println!("{:?}", handle.filter());
            }
            Command::Stats { id } => println!("{:#?}", self.handle(id)?.stats()),
            Command::Help => println!("{}", HELP),
            Command::Quit => unreachable!(),
        }
        Ok(())
    }
}

/// Blocking read that gives up once a line arrives on `lines`. Input is only
/// taken while the read is actually waiting.
fn wait_message(handle: &Handle, lines: &mpsc::Receiver<String>) -> Result<Payload, Error> {
    match handle.read_message(false) {
        Err(Error::WouldBlock) => {}
        done => return done,
    }
    let interrupter = handle.interrupter();
    thread::scope(|s| {
        let reader = s.spawn(|| handle.read_message(true));
        let mut give_up = false;
        while !reader.is_finished() {
            if give_up {
                // the reader may not be waiting yet, keep at it
                interrupter.interrupt();
                thread::sleep(WAIT_TICK);
            } else if !matches!(
                lines.recv_timeout(WAIT_TICK),
                Err(mpsc::RecvTimeoutError::Timeout)
            ) {
                give_up = true;
            }
        }
        reader.join().expect("reader thread panicked")
    })
}

fn cmd_read(handle: &Handle, blocking: bool, lines: &mpsc::Receiver<String>) -> Result<()> {
    let result = if blocking {
        println!("Waiting, press enter to give up.");
        wait_message(handle, lines)
    } else {
        handle.read_message(false)
    };
    match result {
        Ok(payload) => println!("{:02x?}", payload.as_slice()),
        Err(Error::WouldBlock) => println!("nothing to read"),
        Err(Error::Interrupted) => println!("gave up waiting"),
        Err(err) => return Err(err).context("read failed"),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let endpoints = match std::env::args().nth(1) {
        Some(arg) => arg.parse().context("endpoint count must be a number")?,
        None => vcan_broker::DEFAULT_ENDPOINT_COUNT,
    };
    let (line_tx, lines) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(|line| line.ok()) {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });
    let mut shell = Shell {
        broker: Broker::new(BrokerConfig::default().with_endpoint_count(endpoints))?,
        handles: HashMap::new(),
        lines,
    };
    println!("{} endpoints, type \"help\" for commands.", endpoints);

    let mut stdout = std::io::stdout();
    loop {
        print!(">> ");
        stdout.flush()?;
        let line = match shell.lines.recv() {
            Ok(line) => line,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => command,
            Err(err) => {
                println!("{}", err);
                continue;
            }
        };
        if let Err(err) = shell.run(command) {
            println!("{:#}", err);
        }
    }
    for (_, handle) in shell.handles.drain() {
        if let Err(err) = handle.close() {
            println!("{}", err);
        }
    }
    Ok(())
}

//! Text commands for driving a broker interactively.
//!
//! ```text
//! open <id> r|w|rw          open an endpoint
//! close <id>                close it again
//! write <id> <addr> <hex>.. send 1 to 8 hex bytes to an address
//! read <id> [wait]          read one message, optionally blocking
//! poll <id>                 check for a readable message
//! filter <id> addr <addr>   set the acceptance address
//! filter <id> mask <mask>   set the acceptance mask
//! filter <id> on|off        enable or disable filtering
//! stats <id>                show counters
//! help | quit
//! ```
//!
//! Numbers are decimal or `0x`-prefixed hex; payload bytes are always hex.

use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while_m_n};
use nom::character::complete::{digit1, hex_digit1, space1};
use nom::combinator::{all_consuming, map, map_res, opt, value};
use nom::multi::many_m_n;
use nom::sequence::{preceded, tuple};
use nom::IResult;
use snafu::Snafu;

use crate::types::{OpenMode, Payload, MAX_PAYLOAD};

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Command {
    Open { id: usize, mode: OpenMode },
    Close { id: usize },
    Write { id: usize, address: u16, payload: Payload },
    Read { id: usize, blocking: bool },
    Poll { id: usize },
    Filter { id: usize, setting: FilterSetting },
    Stats { id: usize },
    Help,
    Quit,
}

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum FilterSetting {
    Address(u16),
    Mask(u16),
    Enabled(bool),
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ParseCommandError {
    #[snafu(display("Could not parse {:?}, try \"help\"", line))]
    InvalidCommand { line: String },
}

/// Parse one line of input.
///
/// ```
/// use vcan_broker::command::{parse_command, Command};
/// assert_eq!(parse_command("poll 3"), Ok(Command::Poll { id: 3 }));
/// assert!(parse_command("poll").is_err());
/// ```
pub fn parse_command(line: &str) -> Result<Command, ParseCommandError> {
    let line = line.trim();
    match all_consuming(command)(line) {
        Ok((_, command)) => Ok(command),
        Err(_) => InvalidCommandSnafu { line }.fail(),
    }
}

type Str = str;

fn command(input: &Str) -> IResult<&Str, Command> {
    alt((
        open,
        close,
        write,
        read,
        poll,
        filter,
        stats,
        value(Command::Help, alt((tag("help"), tag("?")))),
        value(Command::Quit, alt((tag("quit"), tag("exit")))),
    ))(input)
}

fn open(input: &Str) -> IResult<&Str, Command> {
    let (input, (_, id, _, mode)) = tuple((tag("open"), endpoint_id, space1, open_mode))(input)?;
    Ok((input, Command::Open { id, mode }))
}

fn close(input: &Str) -> IResult<&Str, Command> {
    map(preceded(tag("close"), endpoint_id), |id| Command::Close {
        id,
    })(input)
}

fn write(input: &Str) -> IResult<&Str, Command> {
    let (input, (_, id, _, address, payload)) =
        tuple((tag("write"), endpoint_id, space1, number_u16, payload))(input)?;
    Ok((input, Command::Write { id, address, payload }))
}

fn read(input: &Str) -> IResult<&Str, Command> {
    let (input, (_, id, wait)) = tuple((
        tag("read"),
        endpoint_id,
        opt(preceded(space1, tag("wait"))),
    ))(input)?;
    Ok((
        input,
        Command::Read {
            id,
            blocking: wait.is_some(),
        },
    ))
}

fn poll(input: &Str) -> IResult<&Str, Command> {
    map(preceded(tag("poll"), endpoint_id), |id| Command::Poll { id })(input)
}

fn stats(input: &Str) -> IResult<&Str, Command> {
    map(preceded(tag("stats"), endpoint_id), |id| Command::Stats {
        id,
    })(input)
}

fn filter(input: &Str) -> IResult<&Str, Command> {
    let (input, (_, id, _, setting)) =
        tuple((tag("filter"), endpoint_id, space1, filter_setting))(input)?;
    Ok((input, Command::Filter { id, setting }))
}

fn filter_setting(input: &Str) -> IResult<&Str, FilterSetting> {
    alt((
        map(
            preceded(tuple((tag("addr"), space1)), number_u16),
            FilterSetting::Address,
        ),
        map(
            preceded(tuple((tag("mask"), space1)), number_u16),
            FilterSetting::Mask,
        ),
        value(FilterSetting::Enabled(true), tag("on")),
        value(FilterSetting::Enabled(false), tag("off")),
    ))(input)
}

/// Whitespace followed by a decimal endpoint id.
fn endpoint_id(input: &Str) -> IResult<&Str, usize> {
    preceded(space1, map_res(digit1, |s: &Str| s.parse::<usize>()))(input)
}

fn open_mode(input: &Str) -> IResult<&Str, OpenMode> {
    alt((
        value(OpenMode::READ_WRITE, tag("rw")),
        value(OpenMode::READ, tag("r")),
        value(OpenMode::WRITE, tag("w")),
    ))(input)
}

fn number_u16(input: &Str) -> IResult<&Str, u16> {
    alt((
        map_res(preceded(tag_no_case("0x"), hex_digit1), |s: &Str| {
            u16::from_str_radix(s, 16)
        }),
        map_res(digit1, |s: &Str| s.parse::<u16>()),
    ))(input)
}

fn hex_byte(input: &Str) -> IResult<&Str, u8> {
    map_res(
        take_while_m_n(1, 2, |c: char| c.is_ascii_hexdigit()),
        |s: &Str| u8::from_str_radix(s, 16),
    )(input)
}

fn payload(input: &Str) -> IResult<&Str, Payload> {
    map(
        many_m_n(1, MAX_PAYLOAD, preceded(space1, hex_byte)),
        |bytes| bytes.into_iter().collect(),
    )(input)
}

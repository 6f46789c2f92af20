//! Packet decode command.

use serde::Serialize;

use applespi::trace::parse_packet_hex;
use applespi::transport::debug::hex_dump;
use applespi::transport::protocol::msg_type;
use applespi::transport::{
    Assembly, KeyboardReport, Message, Packet, Reassembler, TouchpadReport,
};

use super::CommandResult;

/// Everything that could be decoded from one packet
#[derive(Serialize)]
struct Decoded {
    packet: Option<Packet>,
    message: Option<Message>,
    keyboard: Option<KeyboardReport>,
    touchpad: Option<TouchpadReport>,
    error: Option<String>,
}

/// Decode packets in order; consecutive packets of one message are joined
pub fn run(packets: &[String], json: bool) -> CommandResult {
    let mut reassembler = Reassembler::new();

    for (i, hex) in packets.iter().enumerate() {
        let buf = parse_packet_hex(hex, i + 1)?;
        let decoded = decode_one(&mut reassembler, &buf);

        if json {
            println!("{}", serde_json::to_string(&decoded)?);
            continue;
        }

        println!("Packet {}:", i + 1);
        for line in hex_dump(&buf).lines() {
            println!("  {line}");
        }
        if let Some(packet) = &decoded.packet {
            println!("  {packet}");
        }
        if let Some(msg) = &decoded.message {
            println!(
                "  {} (0x{:04X}) counter={} rsp_buf_len={} length={}",
                msg.type_name(),
                msg.msg_type,
                msg.counter,
                msg.rsp_buf_len,
                msg.declared_length()
            );
        }
        if let Some(report) = &decoded.keyboard {
            println!(
                "  modifiers=0x{:02X} keys={:02X?} fn={}",
                report.modifiers, report.keys_pressed, report.fn_pressed
            );
        }
        if let Some(report) = &decoded.touchpad {
            println!(
                "  clicked={} fingers={} (reported {})",
                report.clicked,
                report.fingers.len(),
                report.reported_fingers
            );
            for (n, f) in report.fingers.iter().enumerate() {
                println!(
                    "    [{n}] x={} y={} touch={}x{} tool={}x{} orient={} pressure={}",
                    f.abs_x,
                    f.abs_y,
                    f.touch_major,
                    f.touch_minor,
                    f.tool_major,
                    f.tool_minor,
                    f.orientation,
                    f.pressure
                );
            }
        }
        if let Some(e) = &decoded.error {
            println!("  error: {e}");
        }
    }
    Ok(())
}

fn decode_one(reassembler: &mut Reassembler, buf: &[u8; 256]) -> Decoded {
    let mut out = Decoded {
        packet: None,
        message: None,
        keyboard: None,
        touchpad: None,
        error: None,
    };

    let packet = match Packet::decode(buf) {
        Ok(p) => p,
        Err(e) => {
            out.error = Some(e.to_string());
            return out;
        }
    };
    let assembled = reassembler.accept(&packet);
    out.packet = Some(packet);

    let message = match assembled {
        Ok(Assembly::Complete(m)) => m,
        Ok(Assembly::Pending) => return out,
        Err(e) => {
            out.error = Some(e.to_string());
            return out;
        }
    };

    let report = match message.msg_type {
        msg_type::KEYBOARD => KeyboardReport::parse(&message.body).map(|r| out.keyboard = Some(r)),
        msg_type::TOUCHPAD => TouchpadReport::parse(&message.body).map(|r| out.touchpad = Some(r)),
        _ => Ok(()),
    };
    if let Err(e) = report {
        out.error = Some(e.to_string());
    }
    out.message = Some(message);
    out
}

//! Modbus/TCP protocol handler: holding registers 0-511 map to
//! DMX slots 1-512 (low byte used, high byte ignored), coil 0 is the
//! enable/disable bit, coil 1 is a write-only blackout trigger. Framed
//! with a standard MBAP header, hand-rolled the way `dmxgw-wire`
//! hand-rolls the real-time command/response codec.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use dmxgw_core::DmxStateCoordinator;

const FUNC_READ_COILS: u8 = 0x01;
const FUNC_READ_HOLDING_REGISTERS: u8 = 0x03;
const FUNC_WRITE_SINGLE_COIL: u8 = 0x05;
const FUNC_WRITE_SINGLE_REGISTER: u8 = 0x06;
const FUNC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

const EXC_ILLEGAL_FUNCTION: u8 = 0x01;
const EXC_ILLEGAL_DATA_ADDRESS: u8 = 0x02;
const EXC_ILLEGAL_DATA_VALUE: u8 = 0x03;
const EXC_SERVER_DEVICE_FAILURE: u8 = 0x04;

pub async fn serve(bind: &str, coordinator: Arc<DmxStateCoordinator>) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    log::info!("modbus/tcp listening on {bind}");
    loop {
        let (stream, peer) = listener.accept().await?;
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, coordinator).await {
                log::debug!("modbus/tcp connection from {peer} ended: {e}");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, coordinator: Arc<DmxStateCoordinator>) -> std::io::Result<()> {
    loop {
        let mut header = [0u8; 7];
        stream.read_exact(&mut header).await?;
        let transaction_id = u16::from_be_bytes([header[0], header[1]]);
        let length = u16::from_be_bytes([header[4], header[5]]);
        let unit_id = header[6];
        if length < 2 {
            return Ok(());
        }
        let mut pdu = vec![0u8; (length - 1) as usize];
        stream.read_exact(&mut pdu).await?;

        let response_pdu = handle_pdu(&pdu, &coordinator);
        let mut response = Vec::with_capacity(7 + response_pdu.len());
        response.extend_from_slice(&transaction_id.to_be_bytes());
        response.extend_from_slice(&0u16.to_be_bytes());
        response.extend_from_slice(&((response_pdu.len() + 1) as u16).to_be_bytes());
        response.push(unit_id);
        response.extend_from_slice(&response_pdu);
        stream.write_all(&response).await?;
    }
}

fn exception(func: u8, code: u8) -> Vec<u8> {
    vec![func | 0x80, code]
}

fn handle_pdu(pdu: &[u8], coordinator: &DmxStateCoordinator) -> Vec<u8> {
    let Some(&func) = pdu.first() else {
        return exception(0, EXC_ILLEGAL_FUNCTION);
    };
    match func {
        FUNC_READ_HOLDING_REGISTERS => read_holding_registers(pdu, coordinator),
        FUNC_WRITE_SINGLE_REGISTER => write_single_register(pdu, coordinator),
        FUNC_WRITE_MULTIPLE_REGISTERS => write_multiple_registers(pdu, coordinator),
        FUNC_READ_COILS => read_coils(pdu, coordinator),
        FUNC_WRITE_SINGLE_COIL => write_single_coil(pdu, coordinator),
        other => exception(other, EXC_ILLEGAL_FUNCTION),
    }
}

fn read_holding_registers(pdu: &[u8], coordinator: &DmxStateCoordinator) -> Vec<u8> {
    if pdu.len() < 5 {
        return exception(FUNC_READ_HOLDING_REGISTERS, EXC_ILLEGAL_DATA_VALUE);
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
    if quantity == 0 || address as u32 + quantity as u32 > 512 {
        return exception(FUNC_READ_HOLDING_REGISTERS, EXC_ILLEGAL_DATA_ADDRESS);
    }
    let values =
        coordinator.with_snapshot(|snap| (0..quantity).map(|i| snap.channels[(address + i) as usize]).collect::<Vec<u8>>());
    let mut out = vec![FUNC_READ_HOLDING_REGISTERS, (values.len() * 2) as u8];
    for v in values {
        out.extend_from_slice(&(v as u16).to_be_bytes());
    }
    out
}

fn write_single_register(pdu: &[u8], coordinator: &DmxStateCoordinator) -> Vec<u8> {
    if pdu.len() < 5 {
        return exception(FUNC_WRITE_SINGLE_REGISTER, EXC_ILLEGAL_DATA_VALUE);
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let value = u16::from_be_bytes([pdu[3], pdu[4]]);
    if address >= 512 {
        return exception(FUNC_WRITE_SINGLE_REGISTER, EXC_ILLEGAL_DATA_ADDRESS);
    }
    match coordinator.set_channel(address + 1, (value & 0xFF) as u8) {
        Ok(()) => pdu[..5].to_vec(),
        Err(_) => exception(FUNC_WRITE_SINGLE_REGISTER, EXC_SERVER_DEVICE_FAILURE),
    }
}

fn write_multiple_registers(pdu: &[u8], coordinator: &DmxStateCoordinator) -> Vec<u8> {
    if pdu.len() < 6 {
        return exception(FUNC_WRITE_MULTIPLE_REGISTERS, EXC_ILLEGAL_DATA_VALUE);
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
    let byte_count = pdu[5] as usize;
    if pdu.len() < 6 + byte_count || byte_count != quantity as usize * 2 {
        return exception(FUNC_WRITE_MULTIPLE_REGISTERS, EXC_ILLEGAL_DATA_VALUE);
    }
    if address as u32 + quantity as u32 > 512 {
        return exception(FUNC_WRITE_MULTIPLE_REGISTERS, EXC_ILLEGAL_DATA_ADDRESS);
    }
    for i in 0..quantity {
        let lo = pdu[6 + (i as usize) * 2 + 1];
        if coordinator.set_channel(address + i + 1, lo).is_err() {
            return exception(FUNC_WRITE_MULTIPLE_REGISTERS, EXC_SERVER_DEVICE_FAILURE);
        }
    }
    let mut out = vec![FUNC_WRITE_MULTIPLE_REGISTERS];
    out.extend_from_slice(&address.to_be_bytes());
    out.extend_from_slice(&quantity.to_be_bytes());
    out
}

fn read_coils(pdu: &[u8], coordinator: &DmxStateCoordinator) -> Vec<u8> {
    if pdu.len() < 5 {
        return exception(FUNC_READ_COILS, EXC_ILLEGAL_DATA_VALUE);
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
    if quantity != 1 || address != 0 {
        // Coil 0 (enabled) is the only readable coil; coil 1 is write-only.
        return exception(FUNC_READ_COILS, EXC_ILLEGAL_DATA_ADDRESS);
    }
    let enabled = coordinator.with_snapshot(|s| s.enabled);
    vec![FUNC_READ_COILS, 1, if enabled { 0x01 } else { 0x00 }]
}

fn write_single_coil(pdu: &[u8], coordinator: &DmxStateCoordinator) -> Vec<u8> {
    if pdu.len() < 5 {
        return exception(FUNC_WRITE_SINGLE_COIL, EXC_ILLEGAL_DATA_VALUE);
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let value = u16::from_be_bytes([pdu[3], pdu[4]]);
    let result = match (address, value) {
        (0, 0xFF00) => coordinator.enable(),
        (0, 0x0000) => coordinator.disable(),
        (1, 0xFF00) => coordinator.blackout(),
        (0, _) | (1, _) => return exception(FUNC_WRITE_SINGLE_COIL, EXC_ILLEGAL_DATA_VALUE),
        _ => return exception(FUNC_WRITE_SINGLE_COIL, EXC_ILLEGAL_DATA_ADDRESS),
    };
    match result {
        Ok(()) => pdu[..5].to_vec(),
        Err(_) => exception(FUNC_WRITE_SINGLE_COIL, EXC_SERVER_DEVICE_FAILURE),
    }
}

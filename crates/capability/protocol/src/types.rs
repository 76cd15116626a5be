//! 协议相关类型定义

use crate::error::ProtocolError;
use async_trait::async_trait;
use domain::DeviceKind;
use serde::{Deserialize, Serialize};

/// 链路事件
///
/// 传输链路向上层（连接编排器）发布的原始事件。
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// 链路连接状态变化
    ConnectionChanged { device: DeviceKind, connected: bool },
    /// 收到原始字节
    DataReceived {
        device: DeviceKind,
        payload: Vec<u8>,
        received_at_ms: i64,
    },
}

/// 链路事件处理器
#[async_trait]
pub trait ProtocolEventHandler: Send + Sync {
    async fn handle(&self, event: ProtocolEvent) -> Result<(), ProtocolError>;
}

/// Modbus 寄存器数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModbusDataType {
    /// 16位有符号整数
    Int16,
    /// 16位无符号整数
    #[default]
    Uint16,
    /// 32位有符号整数（2个寄存器）
    Int32,
    /// 32位无符号整数（2个寄存器）
    Uint32,
    /// 32位浮点数（2个寄存器）
    Float32,
}

impl ModbusDataType {
    pub fn register_count(&self) -> usize {
        match self {
            ModbusDataType::Int16 | ModbusDataType::Uint16 => 1,
            _ => 2,
        }
    }
}

/// 解析寄存器数据为浮点值（高字在前）
pub fn decode_registers(registers: &[u16], data_type: ModbusDataType) -> Result<f64, ProtocolError> {
    if registers.is_empty() {
        return Err(ProtocolError::DataParse("empty registers".to_string()));
    }
    if registers.len() < data_type.register_count() {
        return Err(ProtocolError::DataParse(format!(
            "need {} registers for {:?}",
            data_type.register_count(),
            data_type
        )));
    }

    let value = match data_type {
        ModbusDataType::Int16 => registers[0] as i16 as f64,
        ModbusDataType::Uint16 => registers[0] as f64,
        ModbusDataType::Int32 => join_words(registers[0], registers[1]) as i32 as f64,
        ModbusDataType::Uint32 => join_words(registers[0], registers[1]) as f64,
        ModbusDataType::Float32 => f32::from_bits(join_words(registers[0], registers[1])) as f64,
    };

    Ok(value)
}

/// 将 f32 编码为两个寄存器（高字在前）
pub fn encode_f32(value: f32) -> [u16; 2] {
    let bits = value.to_bits();
    [(bits >> 16) as u16, (bits & 0xFFFF) as u16]
}

fn join_words(high: u16, low: u16) -> u32 {
    ((high as u32) << 16) | low as u32
}

/// 按行切分字节流
///
/// `\r` 与 `\n` 都视为帧结束符，空帧丢弃；未结束的尾部保留到下一次输入。
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
    max_frame_len: usize,
}

impl LineFramer {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_frame_len,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                self.take_frame(&mut frames);
                continue;
            }
            self.pending.push(byte);
            // 超长且无结束符的数据按一帧截断，避免无限增长
            if self.max_frame_len > 0 && self.pending.len() >= self.max_frame_len {
                self.take_frame(&mut frames);
            }
        }
        frames
    }

    fn take_frame(&mut self, frames: &mut Vec<String>) {
        if self.pending.is_empty() {
            return;
        }
        let frame = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        if !frame.is_empty() {
            frames.push(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_registers_int16() {
        let value = decode_registers(&[100u16], ModbusDataType::Int16).unwrap();
        assert_eq!(value, 100.0);

        let value = decode_registers(&[(-100i16) as u16], ModbusDataType::Int16).unwrap();
        assert_eq!(value, -100.0);
    }

    #[test]
    fn test_float32_words() {
        let words = encode_f32(29.1);
        let value = decode_registers(&words, ModbusDataType::Float32).unwrap();
        assert!((value - 29.1).abs() < 1e-5);
        assert!(decode_registers(&words[..1], ModbusDataType::Float32).is_err());
    }

    #[test]
    fn test_line_framer_splits_partial_frames() {
        let mut framer = LineFramer::new(1024);
        assert!(framer.push(b"SN-0").is_empty());
        assert_eq!(framer.push(b"01\r\nSN-002\r"), vec!["SN-001", "SN-002"]);
        assert!(framer.push(b"\n\n  \n").is_empty());
    }

    #[test]
    fn test_line_framer_truncates_long_frames() {
        let mut framer = LineFramer::new(4);
        assert_eq!(framer.push(b"ABCDEF"), vec!["ABCD"]);
        assert_eq!(framer.push(b"\n"), vec!["EF"]);
    }
}

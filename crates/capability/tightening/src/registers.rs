//! 拧紧轴寄存器块布局与采样解码
//!
//! 从 `base` 开始连续 16 个保持寄存器：
//!
//! | 偏移 | 字段 |
//! |---|---|
//! | 0 | 控制字 |
//! | 1 | 运行状态码 |
//! | 2 | 错误码 |
//! | 3 | 合格计数 |
//! | 4-5 | 完成扭矩 (f32) |
//! | 6-7 | 实时扭矩 (f32) |
//! | 8-9 | 目标扭矩 (f32) |
//! | 10-11 | 扭矩下限 (f32) |
//! | 12-13 | 扭矩上限 (f32) |
//! | 14-15 | 实时角度 (f32) |

use domain::{TighteningAxisSample, TighteningStatus};
use serde::{Deserialize, Serialize};
use station_protocol::{ModbusDataType, ProtocolError, decode_registers, encode_f32};

/// 寄存器块长度
pub const AXIS_BLOCK_LEN: u16 = 16;

const OFFSET_COMMAND: u16 = 0;
const OFFSET_STATUS: u16 = 1;
const OFFSET_ERROR: u16 = 2;
const OFFSET_QUALIFIED_COUNT: u16 = 3;
const OFFSET_COMPLETED_TORQUE: usize = 4;
const OFFSET_REALTIME_TORQUE: usize = 6;
const OFFSET_TARGET_TORQUE: u16 = 8;
const OFFSET_LOWER_LIMIT: usize = 10;
const OFFSET_UPPER_LIMIT: usize = 12;
const OFFSET_ANGLE: usize = 14;

/// 拧紧轴寄存器地址表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisRegisterMap {
    pub base: u16,
}

impl AxisRegisterMap {
    pub fn new(base: u16) -> Self {
        Self { base }
    }

    pub fn command(&self) -> u16 {
        self.base + OFFSET_COMMAND
    }

    pub fn status(&self) -> u16 {
        self.base + OFFSET_STATUS
    }

    /// 目标扭矩 / 下限 / 上限连续 6 个寄存器的起始地址
    pub fn params(&self) -> u16 {
        self.base + OFFSET_TARGET_TORQUE
    }

    /// 将寄存器块解码为采样
    pub fn decode(
        &self,
        words: &[u16],
        previous_command: Option<u16>,
        ts_ms: i64,
    ) -> Result<TighteningAxisSample, ProtocolError> {
        if words.len() < AXIS_BLOCK_LEN as usize {
            return Err(ProtocolError::DataParse(format!(
                "axis block needs {} registers, got {}",
                AXIS_BLOCK_LEN,
                words.len()
            )));
        }
        let float_at = |offset: usize| -> Result<f64, ProtocolError> {
            decode_registers(&words[offset..offset + 2], ModbusDataType::Float32)
        };
        let status_code = words[OFFSET_STATUS as usize];
        Ok(TighteningAxisSample {
            ts_ms,
            control_command: words[OFFSET_COMMAND as usize],
            previous_command,
            running_status_code: status_code,
            status: TighteningStatus::from_code(status_code),
            error_code: words[OFFSET_ERROR as usize],
            completed_torque: float_at(OFFSET_COMPLETED_TORQUE)?,
            realtime_torque: float_at(OFFSET_REALTIME_TORQUE)?,
            target_torque: float_at(OFFSET_TARGET_TORQUE as usize)?,
            lower_limit_torque: float_at(OFFSET_LOWER_LIMIT)?,
            upper_limit_torque: float_at(OFFSET_UPPER_LIMIT)?,
            realtime_angle: float_at(OFFSET_ANGLE)?,
            qualified_count: words[OFFSET_QUALIFIED_COUNT as usize],
        })
    }
}

/// 拧紧目标参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TighteningParams {
    pub target_torque: f32,
    pub lower_limit: f32,
    pub upper_limit: f32,
}

impl TighteningParams {
    pub fn validate(&self) -> Result<(), String> {
        let values = [self.target_torque, self.lower_limit, self.upper_limit];
        if values.iter().any(|v| !v.is_finite()) {
            return Err("torque values must be finite".to_string());
        }
        if self.target_torque <= 0.0 {
            return Err(format!("target torque {} must be positive", self.target_torque));
        }
        if !(self.lower_limit <= self.target_torque && self.target_torque <= self.upper_limit) {
            return Err(format!(
                "target {} outside limits [{}, {}]",
                self.target_torque, self.lower_limit, self.upper_limit
            ));
        }
        Ok(())
    }

    /// 目标/下限/上限编码为 6 个寄存器
    pub fn to_registers(&self) -> [u16; 6] {
        let [t0, t1] = encode_f32(self.target_torque);
        let [l0, l1] = encode_f32(self.lower_limit);
        let [u0, u1] = encode_f32(self.upper_limit);
        [t0, t1, l0, l1, u0, u1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_block() {
        let mut words = vec![0u16; AXIS_BLOCK_LEN as usize];
        words[1] = 21;
        words[3] = 7;
        words[4..6].copy_from_slice(&encode_f32(27.5));
        words[8..10].copy_from_slice(&encode_f32(29.0));
        let sample = AxisRegisterMap::default()
            .decode(&words, Some(100), 42)
            .unwrap();
        assert_eq!(sample.status, TighteningStatus::TorqueTooLow);
        assert_eq!(sample.qualified_count, 7);
        assert_eq!(sample.previous_command, Some(100));
        assert!((sample.completed_torque - 27.5).abs() < 1e-6);
        assert!((sample.target_torque - 29.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_short_block() {
        assert!(AxisRegisterMap::default().decode(&[0; 4], None, 0).is_err());
    }

    #[test]
    fn test_params_validation() {
        let ok = TighteningParams {
            target_torque: 29.0,
            lower_limit: 28.0,
            upper_limit: 30.0,
        };
        assert!(ok.validate().is_ok());
        assert_eq!(&ok.to_registers()[0..2], &encode_f32(29.0)[..]);
        let bad = TighteningParams {
            target_torque: 31.0,
            ..ok
        };
        assert!(bad.validate().is_err());
    }
}

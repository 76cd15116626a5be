use serde::{Deserialize, Serialize};

/// 触发寄存器“拉起”的值。
pub const TRIGGER_RAISED: u16 = 1;
/// 复位值（触发寄存器清零）。
pub const TRIGGER_CLEARED: u16 = 0;
/// 结果寄存器：成功。
pub const RESULT_OK: u16 = 1;
/// 结果寄存器：超时或失败。
pub const RESULT_NG: u16 = 2;

/// PLC 握手寄存器地址表。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlcRegisterMap {
    pub scan_trigger: u16,
    pub tightening_trigger: u16,
    pub scan_result: u16,
    pub tightening_result: u16,
    pub heartbeat: u16,
}

impl Default for PlcRegisterMap {
    fn default() -> Self {
        Self {
            scan_trigger: 0,
            tightening_trigger: 1,
            scan_result: 2,
            tightening_result: 3,
            heartbeat: 4,
        }
    }
}

//! 上位机工序帧解析与条码提取。

use domain::{EXTERNAL_STAGE_COUNT, UNKNOWN_BARCODE};
use serde_json::Value;

/// 线体上位机上报的一帧工序数据。
#[derive(Debug, Clone, PartialEq)]
pub struct StageFrame {
    pub barcode: String,
    /// 槽位下标（0 起）
    pub stage_index: usize,
    pub data: Value,
}

/// 从不透明负载中尽力提取条码，失败时返回 `UNKNOWN`。
///
/// 支持 JSON 对象的 `barcode` / `Barcode` / `sn` 字段；非 JSON 的单行文本视为条码本身。
pub fn extract_barcode(payload: &str) -> String {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return UNKNOWN_BARCODE.to_string();
    }
    match serde_json::from_str::<Value>(trimmed) {
        // 纯数字条码也能被解析为 JSON
        Ok(Value::Number(number)) => number.to_string(),
        Ok(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(value) => barcode_from_value(&value).unwrap_or_else(|| UNKNOWN_BARCODE.to_string()),
        Err(_) if !trimmed.starts_with('{') && !trimmed.contains(char::is_whitespace) => {
            trimmed.to_string()
        }
        Err(_) => UNKNOWN_BARCODE.to_string(),
    }
}

fn barcode_from_value(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    ["barcode", "Barcode", "sn"]
        .iter()
        .filter_map(|key| object.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|barcode| !barcode.is_empty())
        .map(str::to_string)
}

/// 解析 `{"barcode", "stage": 1..3, "data"}` 工序帧。
pub fn parse_stage_frame(line: &str) -> Result<StageFrame, String> {
    let value: Value =
        serde_json::from_str(line.trim()).map_err(|err| format!("invalid json: {}", err))?;
    let object = value
        .as_object()
        .ok_or_else(|| "frame is not an object".to_string())?;
    let stage = object
        .get("stage")
        .and_then(Value::as_u64)
        .ok_or_else(|| "missing stage".to_string())?;
    if stage == 0 || stage > EXTERNAL_STAGE_COUNT as u64 {
        return Err(format!("stage {} out of range", stage));
    }
    Ok(StageFrame {
        barcode: barcode_from_value(&value).unwrap_or_else(|| UNKNOWN_BARCODE.to_string()),
        stage_index: (stage - 1) as usize,
        data: object.get("data").cloned().unwrap_or(Value::Null),
    })
}

/// 按 CR/LF 切分字节流的行缓冲。
///
/// 跨读取边界的半行保留到下一次 `push`；首尾空白与控制字符被裁掉，空行丢弃。
/// 超过 `max_len` 的行整行丢弃（直到下一个分隔符），不会截断后交给上层。
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_len: usize,
    overflowing: bool,
    discarded: usize,
}

impl LineFramer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_len: max_len.max(1),
            overflowing: false,
            discarded: 0,
        }
    }

    /// 追加字节，返回本次凑齐的完整行。
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\r' || byte == b'\n' {
                if self.overflowing {
                    self.overflowing = false;
                    self.discarded += 1;
                } else if let Some(line) = self.take_line() {
                    lines.push(line);
                }
            } else if self.overflowing {
                continue;
            } else if self.buffer.len() >= self.max_len {
                self.overflowing = true;
                self.buffer.clear();
            } else {
                self.buffer.push(byte);
            }
        }
        lines
    }

    /// 自上次调用以来因超长被丢弃的行数。
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }

    /// 丢弃未凑齐的半行（链路断开或事件滞后后调用）。
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflowing = false;
    }

    fn take_line(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&raw);
        let line = text.trim_matches(|c: char| c.is_whitespace() || c.is_control());
        (!line.is_empty()).then(|| line.to_string())
    }
}

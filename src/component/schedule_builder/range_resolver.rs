//! 以兩個命名標記決定序列的錄製範圍

use super::types::{RecordingRange, Sequence};
use crate::error::{RecorderError, RecorderResult};

/// 依名稱尋找標記時間；名稱重複時取第一個
fn find_marker(sequence: &Sequence, name: &str) -> Option<f64> {
    sequence
        .markers
        .iter()
        .find(|m| m.name == name)
        .map(|m| m.time)
}

/// 解析序列的錄製範圍
///
/// 兩個標記都存在且起點早於終點時回傳有效範圍。
/// 否則在允許退回時回傳整段長度（`is_valid = false`），由呼叫端記錄警告；
/// 不允許退回時回傳 `RangeNotFound`。
pub fn resolve_range(
    sequence: &Sequence,
    start_marker: &str,
    end_marker: &str,
    allow_fallback: bool,
) -> RecorderResult<RecordingRange> {
    let start = find_marker(sequence, start_marker);
    let end = find_marker(sequence, end_marker);

    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok(RecordingRange::new(start, end)),
        _ if allow_fallback => Ok(RecordingRange::full(sequence)),
        _ => Err(RecorderError::RangeNotFound {
            sequence: sequence.name.clone(),
            start_marker: start_marker.to_string(),
            end_marker: end_marker.to_string(),
        }),
    }
}

//! 从 LLM 输出中解析 JSON 对象
//!
//! 策略：先对整段（去首尾空白）直接解析；失败则截取第一个括号配平的 `{...}` 片段再解析。
//! 这样 ```json 代码块、前后夹带说明文字的输出都能解析，且与裸 JSON 得到相同结果。

use serde::de::DeserializeOwned;

/// 返回第一个括号配平的 `{...}` 片段；字符串字面量内的括号与转义字符不参与计数
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 直接解析，失败后退回到第一个配平片段；两者都失败时返回第一次解析的错误
pub fn parse_json_lenient<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let trimmed = text.trim();
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(direct_err) => match extract_json_object(trimmed) {
            Some(span) => serde_json::from_str(span),
            None => Err(direct_err),
        },
    }
}

//! 輸出檔名樣板的萬用字元展開
//!
//! 樣板中的 `<Name>` 會被替換成對應的值；未知的萬用字元原樣保留。

use super::types::{Resolution, TaskKind};
use chrono::NaiveDateTime;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub const TOKEN_SEQUENCE: &str = "Sequence";
pub const TOKEN_KIND: &str = "Kind";
pub const TOKEN_TAKE: &str = "Take";
pub const TOKEN_FRAME: &str = "Frame";
pub const TOKEN_RESOLUTION: &str = "Resolution";
pub const TOKEN_DATE: &str = "Date";
pub const TOKEN_TIME: &str = "Time";
pub const TOKEN_TARGET: &str = "Target";

static REGEX_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([A-Za-z][A-Za-z0-9_]*)>").expect("Invalid regex"));

static REGEX_ILLEGAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("Invalid regex"));

/// 萬用字元的值表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WildcardContext {
    tokens: BTreeMap<String, String>,
}

impl WildcardContext {
    /// 建立一次錄製共用的值表；日期與時間固定為錄製開始的時間點
    #[must_use]
    pub fn new(
        captured_at: NaiveDateTime,
        resolution: Resolution,
        user_tokens: &BTreeMap<String, String>,
    ) -> Self {
        // 使用者自訂值先放入，內建萬用字元優先
        let mut context = Self {
            tokens: user_tokens
                .iter()
                .map(|(k, v)| (k.clone(), sanitize_value(v)))
                .collect(),
        };
        context.insert(TOKEN_DATE, captured_at.format("%Y-%m-%d").to_string());
        context.insert(TOKEN_TIME, captured_at.format("%H%M%S").to_string());
        context.insert(TOKEN_RESOLUTION, resolution.to_string());
        context
    }

    /// 加上單一任務的萬用字元
    #[must_use]
    pub fn for_task(
        &self,
        sequence_name: &str,
        kind: TaskKind,
        take: u32,
        target: Option<&str>,
    ) -> Self {
        let mut context = self.clone();
        context.insert(TOKEN_SEQUENCE, sequence_name.to_string());
        context.insert(TOKEN_KIND, kind.as_str().to_string());
        context.insert(TOKEN_TAKE, format!("{take:03}"));
        if let Some(target) = target {
            context.insert(TOKEN_TARGET, target.to_string());
        }
        context
    }

    pub fn insert(&mut self, token: &str, value: String) {
        self.tokens.insert(token.to_string(), sanitize_value(&value));
    }

    /// 展開樣板
    #[must_use]
    pub fn resolve(&self, template: &str) -> String {
        REGEX_TOKEN
            .replace_all(template, |caps: &Captures| {
                self.tokens
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// 展開 `<Frame>`，只有執行環境在寫出每一格時才知道影格編號
#[must_use]
pub fn expand_frame(template: &str, frame: u64) -> String {
    template.replace(&format!("<{TOKEN_FRAME}>"), &format!("{frame:04}"))
}

/// 萬用字元的值不可含路徑分隔或非法字元
fn sanitize_value(value: &str) -> String {
    REGEX_ILLEGAL_CHARS
        .replace_all(value.trim(), "_")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn context() -> WildcardContext {
        let captured_at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 30)
            .unwrap();
        let mut user_tokens = BTreeMap::new();
        user_tokens.insert("Project".to_string(), "Demo".to_string());
        WildcardContext::new(captured_at, Resolution::default(), &user_tokens)
    }

    #[test]
    fn test_builtin_tokens() {
        let ctx = context().for_task("Intro", TaskKind::Movie, 3, Some("MainCamera"));
        let name = ctx.resolve("<Sequence>_<Kind>_<Take>_<Target>_<Resolution>_<Date>_<Time>");
        assert_eq!(
            name,
            "Intro_Movie_003_MainCamera_1920x1080_2024-03-09_070530"
        );
    }

    #[test]
    fn test_user_token_and_unknown_token() {
        let ctx = context();
        assert_eq!(ctx.resolve("<Project>/<Unknown>"), "Demo/<Unknown>");
    }

    #[test]
    fn test_frame_is_left_for_execution() {
        let ctx = context().for_task("Intro", TaskKind::ImageSequence, 1, None);
        let name = ctx.resolve("<Sequence>_<Frame>");
        assert_eq!(name, "Intro_<Frame>");
        assert_eq!(expand_frame(&name, 42), "Intro_0042");
    }

    #[test]
    fn test_missing_target_stays_verbatim() {
        let ctx = context().for_task("Intro", TaskKind::Audio, 1, None);
        assert_eq!(ctx.resolve("<Target>"), "<Target>");
    }

    #[test]
    fn test_values_are_sanitized() {
        let ctx = context().for_task("Act 1/Scene: 2", TaskKind::Movie, 1, None);
        assert_eq!(ctx.resolve("<Sequence>"), "Act 1_Scene_ 2");
    }
}

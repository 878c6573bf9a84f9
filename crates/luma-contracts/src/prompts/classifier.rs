use serde::Serialize;

const GENERIC_SHORT_MAX_CHARS: usize = 30;

const GENERIC_VERB_PREFIXES: &[&str] = &[
    "分析一下",
    "请分析",
    "分析",
    "查看",
    "识别",
    "描述",
    "理解",
    "看一下",
    "看看",
    "analyze",
    "analyse",
    "describe",
    "view",
    "check",
];

const TEXT_KEYWORDS: &[&str] = &[
    "文字",
    "文本",
    "识别文字",
    "转写",
    "抄录",
    "提取",
    "代码",
    "日志",
    "堆栈",
    "错误信息",
    "报错信息",
    "命令行",
    "终端",
    "表格",
    "ocr",
    "text",
    "transcribe",
    "transcript",
    "extract",
    "code",
    "snippet",
    "log",
    "logs",
    "stack trace",
    "stacktrace",
    "traceback",
    "error message",
    "terminal",
    "table",
];

const LAYOUT_KEYWORDS: &[&str] = &[
    "布局",
    "界面",
    "页面",
    "结构",
    "组件",
    "排版",
    "样式",
    "设计稿",
    "导航",
    "按钮",
    "ui",
    "ux",
    "layout",
    "structure",
    "component",
    "components",
    "interface",
    "screen",
    "page",
    "css",
    "wireframe",
];

const DIAGNOSIS_KEYWORDS: &[&str] = &[
    "报错",
    "错误",
    "异常",
    "崩溃",
    "失败",
    "故障",
    "为什么",
    "bug",
    "error",
    "errors",
    "crash",
    "crashed",
    "exception",
    "failed",
    "failure",
    "panic",
    "traceback",
];

const EXTRACTION_ONLY_PHRASES: &[&str] = &[
    "只要文字",
    "只需要文字",
    "只要文本",
    "仅文字",
    "仅输出文字",
    "只输出文字",
    "只识别",
    "仅识别",
    "只提取",
    "仅提取",
    "只转写",
    "仅转写",
    "only text",
    "text only",
    "just the text",
    "only the text",
    "only transcribe",
    "just transcribe",
    "only extract",
    "just extract",
];

/// Intent signals derived from the raw prompt. Computed once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PromptProfile {
    pub is_generic_short: bool,
    pub wants_text: bool,
    pub wants_layout: bool,
    pub wants_diagnosis: bool,
    pub prefer_text: bool,
    pub needs_two_pass: bool,
    pub extraction_only: bool,
}

pub fn classify(prompt: &str) -> PromptProfile {
    let normalized = prompt.trim().to_lowercase();

    let is_generic_short = normalized.chars().count() < GENERIC_SHORT_MAX_CHARS
        && GENERIC_VERB_PREFIXES
            .iter()
            .any(|prefix| normalized.starts_with(prefix));
    let wants_text = contains_any(&normalized, TEXT_KEYWORDS);
    let wants_layout = contains_any(&normalized, LAYOUT_KEYWORDS);
    let wants_diagnosis = contains_any(&normalized, DIAGNOSIS_KEYWORDS);
    let extraction_only = !wants_layout && contains_any(&normalized, EXTRACTION_ONLY_PHRASES);

    PromptProfile {
        is_generic_short,
        wants_text,
        wants_layout,
        wants_diagnosis,
        prefer_text: wants_text || wants_diagnosis || is_generic_short,
        needs_two_pass: is_generic_short || wants_diagnosis || (wants_text && wants_layout),
        extraction_only,
    }
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords
        .iter()
        .any(|keyword| contains_keyword(haystack, keyword))
}

// ASCII keywords must sit on word boundaries so "log" does not match "catalog";
// CJK keywords match as plain substrings.
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return haystack.contains(keyword);
    }
    haystack.match_indices(keyword).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + keyword.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::{classify, contains_keyword, PromptProfile};

    #[test]
    fn short_generic_request_is_two_pass() {
        let profile = classify("分析一下");
        assert!(profile.is_generic_short);
        assert!(profile.needs_two_pass);
        assert!(profile.prefer_text);
        assert!(!profile.extraction_only);
    }

    #[test]
    fn transcribe_only_request_stops_after_extraction() {
        let profile = classify("识别图片中的所有文字，只要文字");
        assert!(profile.wants_text);
        assert!(profile.extraction_only);
        assert!(!profile.wants_layout);
        assert!(profile.prefer_text);
    }

    #[test]
    fn layout_plus_error_request_needs_answer_stage() {
        let profile = classify("帮我分析这个页面的布局和这个报错");
        assert!(profile.wants_layout);
        assert!(profile.wants_diagnosis);
        assert!(profile.needs_two_pass);
        assert!(!profile.extraction_only);
        assert!(!profile.is_generic_short);
    }

    #[test]
    fn layout_intent_cancels_extraction_only() {
        let profile = classify("只提取文字，并说明页面布局");
        assert!(profile.wants_layout);
        assert!(!profile.extraction_only);
        assert!(profile.needs_two_pass);
    }

    #[test]
    fn specific_question_without_signals_is_single_pass() {
        let profile = classify("图中的猫是什么品种？");
        assert_eq!(profile, PromptProfile::default());
    }

    #[test]
    fn long_prompt_with_generic_verb_is_not_generic_short() {
        let profile =
            classify("describe the mood of this landscape photograph and the time of day it was taken");
        assert!(!profile.is_generic_short);
        assert!(!profile.needs_two_pass);
    }

    #[test]
    fn english_vocabulary_is_case_insensitive() {
        let profile = classify("Why does this Python TRACEBACK happen?");
        assert!(profile.wants_text);
        assert!(profile.wants_diagnosis);
        assert!(profile.needs_two_pass);

        let layout = classify("Review the UI layout and the code snippet");
        assert!(layout.wants_layout);
        assert!(layout.wants_text);
        assert!(layout.needs_two_pass);
    }

    #[test]
    fn ascii_keywords_respect_word_boundaries() {
        assert!(contains_keyword("see the log output", "log"));
        assert!(!contains_keyword("open the catalog", "log"));
        assert!(contains_keyword("ui:", "ui"));
        assert!(!contains_keyword("build a guide", "ui"));
        assert!(contains_keyword("这个ui的配色", "ui"));
    }

    #[test]
    fn derived_flags_follow_their_definitions() {
        let corpus = [
            "",
            "看看",
            "check",
            "代码",
            "布局",
            "报错",
            "代码和布局",
            "just transcribe this",
            "only text please, no layout analysis",
            "这个组件为什么崩溃",
            "describe",
            "translate the menu into English",
        ];
        for prompt in corpus {
            let profile = classify(prompt);
            assert_eq!(
                profile.prefer_text,
                profile.wants_text || profile.wants_diagnosis || profile.is_generic_short,
                "{prompt}"
            );
            assert_eq!(
                profile.needs_two_pass,
                profile.is_generic_short
                    || profile.wants_diagnosis
                    || (profile.wants_text && profile.wants_layout),
                "{prompt}"
            );
            if profile.extraction_only {
                assert!(!profile.wants_layout, "{prompt}");
            }
            assert_eq!(profile, classify(prompt), "{prompt}");
        }
    }
}

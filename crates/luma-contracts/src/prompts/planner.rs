use serde::Serialize;

use super::classifier::PromptProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    SinglePass,
    TwoPass,
    MultiVariantAggregate,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SinglePass => "single_pass",
            Self::TwoPass => "two_pass",
            Self::MultiVariantAggregate => "multi_variant_aggregate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StrategyPlan {
    pub mode: ExecutionMode,
    /// Number of tile variants the extract stage fans out over; 0 means the
    /// extract stage (if any) runs against the whole image.
    pub tile_count: usize,
    /// False in two-pass mode: the transcript is taken without the question.
    pub extract_includes_user_prompt: bool,
    pub runs_answer_stage: bool,
}

impl StrategyPlan {
    pub fn has_extract_stage(&self) -> bool {
        self.mode != ExecutionMode::SinglePass
    }

    pub fn extract_calls(&self) -> usize {
        if !self.has_extract_stage() {
            0
        } else {
            self.tile_count.max(1)
        }
    }

    pub fn backend_calls(&self) -> usize {
        match self.mode {
            ExecutionMode::SinglePass => 1,
            _ => self.extract_calls() + usize::from(self.runs_answer_stage),
        }
    }
}

/// `tile_count` is the number of tiles after the whole-image variant.
pub fn plan_strategy(profile: &PromptProfile, tile_count: usize) -> StrategyPlan {
    if profile.needs_two_pass {
        return StrategyPlan {
            mode: ExecutionMode::TwoPass,
            tile_count,
            extract_includes_user_prompt: false,
            runs_answer_stage: !profile.extraction_only,
        };
    }
    if tile_count > 0 {
        return StrategyPlan {
            mode: ExecutionMode::MultiVariantAggregate,
            tile_count,
            extract_includes_user_prompt: true,
            runs_answer_stage: true,
        };
    }
    StrategyPlan {
        mode: ExecutionMode::SinglePass,
        tile_count: 0,
        extract_includes_user_prompt: false,
        runs_answer_stage: false,
    }
}

pub fn single_pass_prompt(base_prompt: &str, user_prompt: &str) -> String {
    format!("{}\n\n{}", base_prompt.trim(), user_prompt.trim())
}

pub fn extract_prompt(base_prompt: &str, user_prompt: Option<&str>) -> String {
    let mut prompt = format!(
        "{}\n\n\
         任务：按从上到下、从左到右的顺序，逐字转写图片中所有可见的文字、代码、日志、表格内容，保留原有的换行、缩进与符号；\
         然后简要描述画面布局（区域划分、主要元素及其相对位置）。\n\
         只记录图片中实际可见的内容。不要推测不可见的属性（例如程序运行结果、文件内容、颜色含义或界面背后的逻辑），看不清的部分标注为“[无法辨认]”。",
        base_prompt.trim()
    );
    if let Some(user_prompt) = user_prompt {
        prompt.push_str("\n\n");
        prompt.push_str(user_prompt.trim());
    }
    prompt
}

pub fn answer_prompt(base_prompt: &str, transcript: &str, user_prompt: &str) -> String {
    format!(
        "{}\n\n\
         以下是已从这张图片中提取的可见内容（按区域顺序）：\n\
         <transcript>\n{}\n</transcript>\n\n\
         请结合上述提取内容与图片本身回答下面的问题；引用文字时以提取内容为准，不确定的地方请明确说明。\n\n\
         {}",
        base_prompt.trim(),
        transcript.trim(),
        user_prompt.trim()
    )
}

/// Joins per-tile transcripts in tile order. A single transcript is returned
/// verbatim.
pub fn merge_tile_transcripts(transcripts: &[String]) -> String {
    if let [single] = transcripts {
        return single.clone();
    }
    transcripts
        .iter()
        .enumerate()
        .map(|(idx, text)| format!("区域 {}:\n{}", idx + 1, text.trim()))
        .collect::<Vec<String>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::{
        answer_prompt, extract_prompt, merge_tile_transcripts, plan_strategy, single_pass_prompt,
        ExecutionMode,
    };
    use crate::prompts::classify;

    #[test]
    fn plain_question_runs_single_pass() {
        let plan = plan_strategy(&classify("图中的猫是什么品种？"), 0);
        assert_eq!(plan.mode, ExecutionMode::SinglePass);
        assert_eq!(plan.backend_calls(), 1);
        assert!(!plan.has_extract_stage());
    }

    #[test]
    fn extraction_only_stops_after_extract() {
        let plan = plan_strategy(&classify("识别图片中的所有文字，只要文字"), 0);
        assert_eq!(plan.mode, ExecutionMode::TwoPass);
        assert!(!plan.runs_answer_stage);
        assert_eq!(plan.backend_calls(), 1);
    }

    #[test]
    fn layout_and_error_runs_extract_then_answer() {
        let plan = plan_strategy(&classify("帮我分析这个页面的布局和这个报错"), 0);
        assert_eq!(plan.mode, ExecutionMode::TwoPass);
        assert!(plan.runs_answer_stage);
        assert!(!plan.extract_includes_user_prompt);
        assert_eq!(plan.backend_calls(), 2);

        let tiled = plan_strategy(&classify("帮我分析这个页面的布局和这个报错"), 3);
        assert_eq!(tiled.extract_calls(), 3);
        assert_eq!(tiled.backend_calls(), 4);
    }

    #[test]
    fn tiles_without_two_pass_aggregate() {
        let plan = plan_strategy(&classify("把菜单翻译成英文"), 2);
        assert_eq!(plan.mode, ExecutionMode::MultiVariantAggregate);
        assert!(plan.extract_includes_user_prompt);
        assert_eq!(plan.backend_calls(), 3);
    }

    #[test]
    fn stage_prompts_carry_base_and_user_prompt() {
        let base = "BASE";
        assert_eq!(single_pass_prompt(base, " 问题 "), "BASE\n\n问题");

        let extract = extract_prompt(base, None);
        assert!(extract.starts_with("BASE\n\n"));
        assert!(extract.contains("逐字转写"));
        assert!(extract.contains("不要推测"));
        assert!(!extract.ends_with("问题"));
        assert!(extract_prompt(base, Some("问题")).ends_with("\n\n问题"));

        let answer = answer_prompt(base, "hello world", "问题");
        assert!(answer.starts_with("BASE\n\n"));
        assert!(answer.contains("<transcript>\nhello world\n</transcript>"));
        assert!(answer.ends_with("问题"));
    }

    #[test]
    fn tile_transcripts_are_labeled_in_order() {
        let merged = merge_tile_transcripts(&[
            "top ".to_string(),
            "middle".to_string(),
            "bottom".to_string(),
        ]);
        assert_eq!(merged, "区域 1:\ntop\n\n区域 2:\nmiddle\n\n区域 3:\nbottom");
        assert_eq!(
            merge_tile_transcripts(&["  line one\n    indented\n".to_string()]),
            "  line one\n    indented\n"
        );
    }
}

mod classifier;
mod planner;

pub use classifier::{classify, PromptProfile};
pub use planner::{
    answer_prompt, extract_prompt, merge_tile_transcripts, plan_strategy, single_pass_prompt,
    ExecutionMode, StrategyPlan,
};

/// Used when no `BASE_VISION_PROMPT` is configured.
pub const DEFAULT_BASE_VISION_PROMPT: &str = "你是一个严谨的视觉分析助手。\
先陈述图片中可以直接观察到的事实，再给出结论。\
只依据图片中的可见证据进行描述，不要臆测看不到的内容；无法确认的信息请明确说明。\
文字、代码、数字请按原样准确转写。请用中文回答。";

use std::panic;
use std::thread;

use anyhow::Result;
use luma_contracts::events::{EventPayload, EventWriter};
use luma_contracts::prompts::{
    answer_prompt, classify, extract_prompt, merge_tile_transcripts, plan_strategy,
    single_pass_prompt, ExecutionMode, StrategyPlan,
};
use luma_contracts::{VisionConfig, VisionError};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::backends::{backend_for, VisionBackend};
use crate::encoder::{encode, EncodeOptions, ImageVariant, ImageVariantSet};
use crate::retry::{retry, RetryPolicy};
use crate::source::ImageReference;

pub const DEFAULT_USER_PROMPT: &str = "请详细分析这张图片的内容";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// Local path, `http(s)` URL or `data:` URI, optionally prefixed with `@`.
    pub image_source: String,
    pub prompt: String,
    pub enable_thinking: Option<bool>,
}

impl AnalysisRequest {
    pub fn new(image_source: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            image_source: image_source.into(),
            prompt: prompt.into(),
            enable_thinking: None,
        }
    }

    fn user_prompt(&self) -> &str {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            DEFAULT_USER_PROMPT
        } else {
            prompt
        }
    }
}

/// Runs one image question end to end against a single backend chosen at
/// startup. Safe to share across threads; each `analyze` call is independent.
pub struct VisionOrchestrator {
    config: VisionConfig,
    backend: Box<dyn VisionBackend>,
    retry_policy: RetryPolicy,
    events: Option<EventWriter>,
}

impl VisionOrchestrator {
    pub fn new(config: VisionConfig, backend: Box<dyn VisionBackend>) -> Self {
        Self {
            config,
            backend,
            retry_policy: RetryPolicy::default(),
            events: None,
        }
    }

    pub fn from_config(config: VisionConfig) -> Result<Self> {
        let backend = backend_for(&config.backend)?;
        Ok(Self::new(config, backend))
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    pub fn analyze(&self, request: &AnalysisRequest) -> Result<String, VisionError> {
        let request_id = Uuid::new_v4().to_string();
        let thinking = self.effective_thinking(request.enable_thinking);
        log::info!(
            "analysis {request_id} started with {}, thinking={thinking:?}",
            self.backend.display_name()
        );
        self.emit(
            "analysis_started",
            &request_id,
            json!({
                "backend": self.backend.display_name(),
                "provider": self.config.backend.tag().as_str(),
                "prompt_chars": request.user_prompt().chars().count(),
                "enable_thinking": thinking,
                "max_retries": self.retry_policy.max_retries,
            }),
        );

        let result = retry(&self.retry_policy, |attempt| {
            self.run_pipeline(request, &request_id, thinking)
                .inspect_err(|err| {
                    self.emit(
                        "attempt_failed",
                        &request_id,
                        json!({
                            "attempt": attempt + 1,
                            "error_kind": err.kind(),
                            "error": err.to_string(),
                        }),
                    );
                })
        });

        match &result {
            Ok(text) => {
                log::info!("analysis {request_id} finished ({} chars)", text.chars().count());
                self.emit(
                    "analysis_finished",
                    &request_id,
                    json!({"result_chars": text.chars().count()}),
                );
            }
            Err(err) => {
                log::error!("analysis {request_id} failed: {err}");
                self.emit(
                    "analysis_failed",
                    &request_id,
                    json!({"error_kind": err.kind(), "error": err.to_string()}),
                );
            }
        }
        result
    }

    /// A process-level opt-out always wins over the request.
    fn effective_thinking(&self, requested: Option<bool>) -> Option<bool> {
        if self.config.backend.thinking_enabled {
            requested
        } else {
            Some(false)
        }
    }

    fn run_pipeline(
        &self,
        request: &AnalysisRequest,
        request_id: &str,
        thinking: Option<bool>,
    ) -> Result<String, VisionError> {
        let reference = ImageReference::normalize(&request.image_source);
        reference.validate(self.config.max_image_size_mb)?;
        log::info!("image source kind: {}", reference.kind());
        self.emit(
            "source_resolved",
            request_id,
            json!({"source_kind": reference.kind()}),
        );

        let user_prompt = request.user_prompt();
        let profile = classify(user_prompt);
        let variants = encode(
            &reference,
            &EncodeOptions {
                prefer_text: profile.prefer_text,
                multi_crop: self.config.multi_crop_enabled,
                max_tiles: self.config.multi_crop_max_tiles,
                max_size_mb: self.config.max_image_size_mb,
            },
        )?;
        self.emit(
            "variants_encoded",
            request_id,
            json!({
                "variant_count": variants.variant_count(),
                "tile_count": variants.tiles().len(),
                "prefer_text": profile.prefer_text,
            }),
        );

        let plan = plan_strategy(&profile, variants.tiles().len());
        log::info!(
            "strategy {} ({} backend calls)",
            plan.mode.as_str(),
            plan.backend_calls()
        );
        self.emit(
            "strategy_planned",
            request_id,
            json!({
                "mode": plan.mode.as_str(),
                "tile_count": plan.tile_count,
                "backend_calls": plan.backend_calls(),
                "profile": profile,
            }),
        );

        self.execute(&plan, &variants, user_prompt, request_id, thinking)
    }

    fn execute(
        &self,
        plan: &StrategyPlan,
        variants: &ImageVariantSet,
        user_prompt: &str,
        request_id: &str,
        thinking: Option<bool>,
    ) -> Result<String, VisionError> {
        let base = self.config.base_prompt();
        let whole = variants.whole();

        if plan.mode == ExecutionMode::SinglePass {
            let text = self.backend.analyze(
                &whole.url(),
                &single_pass_prompt(base, user_prompt),
                thinking,
            )?;
            self.stage_completed(request_id, "single", 1);
            return Ok(text);
        }

        let extract = extract_prompt(
            base,
            plan.extract_includes_user_prompt.then_some(user_prompt),
        );
        let targets: &[ImageVariant] = if variants.tiles().is_empty() {
            std::slice::from_ref(whole)
        } else {
            variants.tiles()
        };
        let transcripts = self.fan_out(targets, &extract, thinking)?;
        let transcript = merge_tile_transcripts(&transcripts);
        self.stage_completed(request_id, "extract", transcripts.len());

        if !plan.runs_answer_stage {
            return Ok(transcript);
        }

        let text = self.backend.analyze(
            &whole.url(),
            &answer_prompt(base, &transcript, user_prompt),
            thinking,
        )?;
        self.stage_completed(request_id, "answer", 1);
        Ok(text)
    }

    /// One backend call per target, all in flight at once. Every call is
    /// joined before the first error (in target order) is returned.
    fn fan_out(
        &self,
        targets: &[ImageVariant],
        prompt: &str,
        thinking: Option<bool>,
    ) -> Result<Vec<String>, VisionError> {
        if let [single] = targets {
            return Ok(vec![self.backend.analyze(&single.url(), prompt, thinking)?]);
        }

        let backend = self.backend.as_ref();
        let results: Vec<Result<String, VisionError>> = thread::scope(|scope| {
            let handles: Vec<_> = targets
                .iter()
                .map(|variant| scope.spawn(move || backend.analyze(&variant.url(), prompt, thinking)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
                .collect()
        });
        results.into_iter().collect()
    }

    fn stage_completed(&self, request_id: &str, stage: &str, calls: usize) {
        log::debug!("stage {stage} completed ({calls} calls)");
        self.emit(
            "stage_completed",
            request_id,
            json!({"stage": stage, "calls": calls}),
        );
    }

    fn emit(&self, event_type: &str, request_id: &str, payload: Value) {
        let Some(events) = &self.events else {
            return;
        };
        let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
        if let Err(err) = events.emit(event_type, request_id, payload) {
            log::warn!(
                "failed writing {event_type} event to {}: {err:#}",
                events.path().display()
            );
        }
    }
}

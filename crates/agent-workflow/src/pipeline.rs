//! Staged, dependency-ordered agent pipeline
//!
//! A [`Pipeline`] is a list of [`Stage`]s, each naming the earlier stages
//! whose output it consumes. Stages are grouped into tiers: a stage's tier is
//! one more than the highest tier among its dependencies. All stages of a
//! tier run concurrently; tiers run one after another.
//!
//! A failing stage never aborts the run. Its failure is recorded and
//! downstream stages are told the analysis is unavailable.

use agent_core::context::keys;
use agent_core::{Agent, Context};
use agent_llm::TokenUsage;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

/// Heading of the block that carries dependency outputs into a stage input
pub const PRIOR_CONTEXT_HEADING: &str = "## Context from prior analyses";

/// Renders a stage's task from the run subject (ticker)
pub type PromptFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Pipeline construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline has no stages")]
    Empty,

    #[error("duplicate stage id '{0}'")]
    DuplicateStage(String),

    #[error("stage '{stage}' depends on '{dependency}', which is not declared before it")]
    UnknownDependency { stage: String, dependency: String },

    #[error("unknown stage '{0}'")]
    UnknownStage(String),
}

/// One agent's position in the pipeline
#[derive(Clone)]
pub struct Stage {
    id: String,
    title: String,
    agent: Arc<dyn Agent>,
    depends_on: Vec<String>,
    prompt: PromptFn,
}

impl Stage {
    pub fn new<F>(
        id: impl Into<String>,
        title: impl Into<String>,
        agent: Arc<dyn Agent>,
        prompt: F,
    ) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            title: title.into(),
            agent,
            depends_on: Vec::new(),
            prompt: Arc::new(prompt),
        }
    }

    /// Declare the stages whose output this stage consumes
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    /// Task text for `subject`, without upstream context
    pub fn render_task(&self, subject: &str) -> String {
        (self.prompt)(subject)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("agent", &self.agent.name())
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

/// How a stage ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed { message: String },
    Skipped { reason: String },
}

impl StageStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageStatus::Completed)
    }
}

/// Result of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    pub stage_id: String,
    pub title: String,
    /// Name of the agent that ran the stage
    pub agent: String,
    /// Agent answer; empty unless the stage completed
    pub text: String,
    pub status: StageStatus,
    pub usage: TokenUsage,
    pub tool_calls: usize,
    pub iterations: usize,
    pub truncated: bool,
    pub duration_ms: u64,
}

impl StageOutput {
    fn unfinished(stage: &Stage, status: StageStatus) -> Self {
        Self {
            stage_id: stage.id.clone(),
            title: stage.title.clone(),
            agent: stage.agent.name().to_string(),
            text: String::new(),
            status,
            usage: TokenUsage::default(),
            tool_calls: 0,
            iterations: 0,
            truncated: false,
            duration_ms: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    /// Failure or skip reason
    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            StageStatus::Completed => None,
            StageStatus::Failed { message } => Some(message),
            StageStatus::Skipped { reason } => Some(reason),
        }
    }
}

/// Outputs of a whole run, in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub subject: String,
    pub outputs: Vec<StageOutput>,
    pub duration_ms: u64,
}

impl PipelineRun {
    pub fn output(&self, stage_id: &str) -> Option<&StageOutput> {
        self.outputs.iter().find(|o| o.stage_id == stage_id)
    }

    /// Stages that did not complete
    pub fn failures(&self) -> Vec<&StageOutput> {
        self.outputs.iter().filter(|o| !o.is_completed()).collect()
    }

    pub fn has_failures(&self) -> bool {
        self.outputs.iter().any(|o| !o.is_completed())
    }

    pub fn total_usage(&self) -> TokenUsage {
        self.outputs.iter().map(|o| o.usage).sum()
    }
}

/// Build a stage input: the task, then every dependency output in pipeline
/// order under its producing stage's title
pub fn compose_input(task: &str, dependencies: &[&StageOutput]) -> String {
    if dependencies.is_empty() {
        return task.to_string();
    }

    let mut input = String::with_capacity(task.len() + 256);
    input.push_str(task.trim_end());
    input.push_str("\n\n");
    input.push_str(PRIOR_CONTEXT_HEADING);
    input.push('\n');

    for dep in dependencies {
        input.push_str("\n### ");
        input.push_str(&dep.title);
        input.push('\n');
        match &dep.status {
            StageStatus::Completed => input.push_str(dep.text.trim()),
            StageStatus::Failed { message } => input.push_str(&format!(
                "The {} is unavailable: it failed ({message}).",
                dep.title
            )),
            StageStatus::Skipped { reason } => input.push_str(&format!(
                "The {} is unavailable: it was skipped ({reason}).",
                dep.title
            )),
        }
        input.push('\n');
    }

    input
}

/// Validated, tiered list of stages
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
    /// Per stage, indices of its dependencies in ascending (pipeline) order
    dependencies: Vec<Vec<usize>>,
    tiers: Vec<Vec<usize>>,
    skip_when_dependencies_fail: bool,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Stage ids grouped by tier
    pub fn tiers(&self) -> Vec<Vec<&str>> {
        self.tiers
            .iter()
            .map(|tier| tier.iter().map(|&i| self.stages[i].id.as_str()).collect())
            .collect()
    }

    /// Run every stage for `subject`
    pub async fn run(&self, subject: &str) -> PipelineRun {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut results: Vec<Option<StageOutput>> = vec![None; self.stages.len()];

        info!(%run_id, subject, stages = self.stages.len(), tiers = self.tiers.len(), "Pipeline started");

        for (tier_index, tier) in self.tiers.iter().enumerate() {
            let prepared: Vec<(usize, Result<String, String>)> = tier
                .iter()
                .map(|&index| {
                    let deps: Vec<&StageOutput> = self.dependencies[index]
                        .iter()
                        .filter_map(|&d| results[d].as_ref())
                        .collect();
                    (index, self.prepare(&self.stages[index], subject, &deps))
                })
                .collect();

            let run_id = run_id.as_str();
            let pending = prepared.into_iter().map(|(index, input)| {
                let stage = &self.stages[index];
                let span = info_span!("stage", stage = %stage.id, tier = tier_index);
                async move { (index, self.execute(stage, subject, run_id, input).await) }
                    .instrument(span)
            });

            for (index, output) in join_all(pending).await {
                results[index] = Some(output);
            }
        }

        let outputs: Vec<StageOutput> = results.into_iter().flatten().collect();
        let run = PipelineRun {
            run_id,
            subject: subject.to_string(),
            outputs,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            run_id = %run.run_id,
            failed = run.failures().len(),
            total_tokens = run.total_usage().total(),
            duration_ms = run.duration_ms,
            "Pipeline finished"
        );
        run
    }

    /// Run one stage on its own, without upstream context
    pub async fn run_stage(&self, stage_id: &str, subject: &str) -> Result<StageOutput, PipelineError> {
        let stage = self
            .stage(stage_id)
            .ok_or_else(|| PipelineError::UnknownStage(stage_id.to_string()))?;
        let run_id = Uuid::new_v4().to_string();
        let input = Ok(stage.render_task(subject));
        Ok(self.execute(stage, subject, &run_id, input).await)
    }

    /// Input for `stage`, or the skip reason
    fn prepare(&self, stage: &Stage, subject: &str, deps: &[&StageOutput]) -> Result<String, String> {
        if self.skip_when_dependencies_fail
            && !deps.is_empty()
            && deps.iter().all(|d| !d.is_completed())
        {
            return Err(format!(
                "every upstream analysis failed ({})",
                deps.iter()
                    .map(|d| d.stage_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        Ok(compose_input(&stage.render_task(subject), deps))
    }

    async fn execute(
        &self,
        stage: &Stage,
        subject: &str,
        run_id: &str,
        input: Result<String, String>,
    ) -> StageOutput {
        let input = match input {
            Ok(input) => input,
            Err(reason) => {
                warn!(stage = %stage.id, %reason, "Stage skipped");
                return StageOutput::unfinished(stage, StageStatus::Skipped { reason });
            }
        };

        info!(stage = %stage.id, agent = stage.agent.name(), input_chars = input.len(), "Stage started");
        let started = Instant::now();
        let mut context = Context::new()
            .with_subject(subject)
            .with_stage(stage.id.as_str())
            .with_run_id(run_id);

        let result = stage.agent.process(input, &mut context).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut output = match result {
            Ok(text) => {
                info!(stage = %stage.id, duration_ms, chars = text.len(), "Stage completed");
                StageOutput {
                    text,
                    ..StageOutput::unfinished(stage, StageStatus::Completed)
                }
            }
            Err(e) => {
                warn!(stage = %stage.id, duration_ms, error = %e, "Stage failed");
                StageOutput::unfinished(
                    stage,
                    StageStatus::Failed {
                        message: e.to_string(),
                    },
                )
            }
        };

        output.usage = context
            .get_typed::<TokenUsage>(keys::TOKEN_USAGE)
            .ok()
            .flatten()
            .unwrap_or_default();
        output.tool_calls = context.tool_calls();
        output.iterations = context
            .get(keys::ITERATIONS)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as usize;
        output.truncated = context.truncated();
        output.duration_ms = duration_ms;
        output
    }
}

/// Builder for [`Pipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Stage>,
    skip_when_dependencies_fail: bool,
}

impl PipelineBuilder {
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Skip a stage when every one of its dependencies failed
    pub fn skip_when_dependencies_fail(mut self, skip: bool) -> Self {
        self.skip_when_dependencies_fail = skip;
        self
    }

    /// Validate and compute tiers
    ///
    /// Dependencies must be declared before their dependents, which makes
    /// declaration order a valid execution order and rules out cycles.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::Empty);
        }

        let mut index_of: HashMap<&str, usize> = HashMap::new();
        let mut dependencies = Vec::with_capacity(self.stages.len());
        let mut tier_of: Vec<usize> = Vec::with_capacity(self.stages.len());

        for (index, stage) in self.stages.iter().enumerate() {
            if index_of.contains_key(stage.id.as_str()) {
                return Err(PipelineError::DuplicateStage(stage.id.clone()));
            }

            let mut deps = Vec::with_capacity(stage.depends_on.len());
            for dep in &stage.depends_on {
                let Some(&dep_index) = index_of.get(dep.as_str()) else {
                    return Err(PipelineError::UnknownDependency {
                        stage: stage.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                deps.push(dep_index);
            }
            deps.sort_unstable();
            deps.dedup();

            let tier = deps.iter().map(|&d| tier_of[d] + 1).max().unwrap_or(0);
            tier_of.push(tier);
            dependencies.push(deps);
            index_of.insert(stage.id.as_str(), index);
        }

        let tier_count = tier_of.iter().max().map_or(0, |t| t + 1);
        let mut tiers = vec![Vec::new(); tier_count];
        for (index, &tier) in tier_of.iter().enumerate() {
            tiers[tier].push(index);
        }

        Ok(Pipeline {
            stages: self.stages,
            dependencies,
            tiers,
            skip_when_dependencies_fail: self.skip_when_dependencies_fail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{Error, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers after a delay, records the inputs it saw
    struct Probe {
        name: String,
        delay: Duration,
        fail: bool,
        inputs: Mutex<Vec<String>>,
    }

    impl Probe {
        fn new(name: &str, delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                delay: Duration::from_millis(delay_ms),
                fail: false,
                inputs: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                delay: Duration::ZERO,
                fail: true,
                inputs: Mutex::new(Vec::new()),
            })
        }

        fn last_input(&self) -> String {
            self.inputs.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl Agent for Probe {
        async fn process(&self, input: String, context: &mut Context) -> Result<String> {
            self.inputs.lock().unwrap().push(input);
            tokio::time::sleep(self.delay).await;
            context.insert_typed(keys::TOKEN_USAGE, &TokenUsage::new(10, 5))?;
            context.insert(keys::TOOL_CALLS, serde_json::json!(1));
            if self.fail {
                return Err(Error::external("llm:test", 3, "HTTP 503"));
            }
            Ok(format!("{} output for {}", self.name, context.subject().unwrap_or("?")))
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn stage(id: &str, title: &str, agent: Arc<Probe>) -> Stage {
        let id_owned = id.to_string();
        Stage::new(id, title, agent, move |ticker| format!("Run {id_owned} for {ticker}."))
    }

    #[test]
    fn test_build_validation() {
        assert_eq!(Pipeline::builder().build().unwrap_err(), PipelineError::Empty);

        let dup = Pipeline::builder()
            .stage(stage("a", "A", Probe::new("a", 0)))
            .stage(stage("a", "A again", Probe::new("a", 0)))
            .build();
        assert_eq!(dup.unwrap_err(), PipelineError::DuplicateStage("a".into()));

        let forward = Pipeline::builder()
            .stage(stage("a", "A", Probe::new("a", 0)).depends_on(["b"]))
            .stage(stage("b", "B", Probe::new("b", 0)))
            .build();
        assert!(matches!(
            forward.unwrap_err(),
            PipelineError::UnknownDependency { ref stage, ref dependency } if stage == "a" && dependency == "b"
        ));
    }

    #[test]
    fn test_tiers() {
        let pipeline = Pipeline::builder()
            .stage(stage("market", "Market", Probe::new("m", 0)))
            .stage(stage("technical", "Technical", Probe::new("t", 0)).depends_on(["market"]))
            .stage(stage("fundamental", "Fundamental", Probe::new("f", 0)).depends_on(["market"]))
            .stage(
                stage("risk", "Risk", Probe::new("r", 0))
                    .depends_on(["market", "technical", "fundamental"]),
            )
            .stage(
                stage("strategy", "Strategy", Probe::new("s", 0))
                    .depends_on(["market", "technical", "fundamental", "risk"]),
            )
            .build()
            .unwrap();

        assert_eq!(
            pipeline.tiers(),
            vec![
                vec!["market"],
                vec!["technical", "fundamental"],
                vec!["risk"],
                vec!["strategy"]
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_preserved_under_concurrency() {
        // The slow stage is declared first but finishes last
        let slow = Probe::new("slow", 300);
        let fast = Probe::new("fast", 10);
        let pipeline = Pipeline::builder()
            .stage(stage("root", "Root", Probe::new("root", 0)))
            .stage(stage("slow", "Slow", slow).depends_on(["root"]))
            .stage(stage("fast", "Fast", fast).depends_on(["root"]))
            .build()
            .unwrap();

        let start = tokio::time::Instant::now();
        let run = pipeline.run("AAPL").await;

        let ids: Vec<_> = run.outputs.iter().map(|o| o.stage_id.as_str()).collect();
        assert_eq!(ids, vec!["root", "slow", "fast"]);
        // Same-tier stages overlapped
        assert!(start.elapsed() < Duration::from_millis(310));
        assert_eq!(run.outputs[1].text, "slow output for AAPL");
        assert_eq!(run.subject, "AAPL");
    }

    #[tokio::test]
    async fn test_context_chained_in_pipeline_order() {
        let risk = Probe::new("risk", 0);
        let pipeline = Pipeline::builder()
            .stage(stage("market", "Market Research", Probe::new("market", 0)))
            .stage(stage("technical", "Technical Analysis", Probe::new("technical", 20)).depends_on(["market"]))
            .stage(stage("fundamental", "Fundamental Analysis", Probe::new("fundamental", 0)).depends_on(["market"]))
            // Declared out of order on purpose
            .stage(stage("risk", "Risk Assessment", risk.clone()).depends_on(["fundamental", "market", "technical"]))
            .build()
            .unwrap();

        let run = pipeline.run("MSFT").await;
        assert!(!run.has_failures());

        let input = risk.last_input();
        assert!(input.starts_with("Run risk for MSFT."));
        assert!(input.contains(PRIOR_CONTEXT_HEADING));
        let market = input.find("### Market Research\nmarket output for MSFT").unwrap();
        let technical = input.find("### Technical Analysis\ntechnical output for MSFT").unwrap();
        let fundamental = input.find("### Fundamental Analysis\nfundamental output for MSFT").unwrap();
        assert!(market < technical && technical < fundamental);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort() {
        let strategy = Probe::new("strategy", 0);
        let pipeline = Pipeline::builder()
            .stage(stage("market", "Market Research", Probe::new("market", 0)))
            .stage(stage("technical", "Technical Analysis", Probe::failing("technical")).depends_on(["market"]))
            .stage(stage("strategy", "Investment Strategy", strategy.clone()).depends_on(["market", "technical"]))
            .build()
            .unwrap();

        let run = pipeline.run("TSLA").await;

        assert_eq!(run.outputs.len(), 3);
        assert!(run.has_failures());
        assert_eq!(run.failures().len(), 1);
        let failed = run.output("technical").unwrap();
        assert_eq!(
            failed.error_message(),
            Some("llm:test call failed after 3 attempt(s): HTTP 503")
        );
        assert!(failed.text.is_empty());
        assert_eq!(failed.usage, TokenUsage::new(10, 5));

        assert!(run.output("strategy").unwrap().is_completed());
        let input = strategy.last_input();
        assert!(input.contains("The Technical Analysis is unavailable: it failed"));
        assert!(input.contains("market output for TSLA"));
        assert_eq!(run.total_usage(), TokenUsage::new(30, 15));
    }

    #[tokio::test]
    async fn test_skip_when_all_dependencies_fail() {
        let downstream = Probe::new("downstream", 0);
        let pipeline = Pipeline::builder()
            .skip_when_dependencies_fail(true)
            .stage(stage("market", "Market Research", Probe::failing("market")))
            .stage(stage("technical", "Technical Analysis", downstream.clone()).depends_on(["market"]))
            .build()
            .unwrap();

        let run = pipeline.run("IBM").await;
        let skipped = run.output("technical").unwrap();
        assert!(matches!(skipped.status, StageStatus::Skipped { .. }));
        assert!(downstream.inputs.lock().unwrap().is_empty());
        assert_eq!(run.failures().len(), 2);
    }

    #[tokio::test]
    async fn test_run_single_stage() {
        let probe = Probe::new("technical", 0);
        let pipeline = Pipeline::builder()
            .stage(stage("market", "Market Research", Probe::new("market", 0)))
            .stage(stage("technical", "Technical Analysis", probe.clone()).depends_on(["market"]))
            .build()
            .unwrap();

        let output = pipeline.run_stage("technical", "AMD").await.unwrap();
        assert!(output.is_completed());
        assert_eq!(probe.last_input(), "Run technical for AMD.");
        assert_eq!(output.tool_calls, 1);

        assert_eq!(
            pipeline.run_stage("nope", "AMD").await.unwrap_err(),
            PipelineError::UnknownStage("nope".into())
        );
    }

    #[test]
    fn test_compose_without_dependencies() {
        assert_eq!(compose_input("Task.", &[]), "Task.");
    }

    #[test]
    fn test_status_serialization() {
        let value = serde_json::to_value(StageStatus::Failed {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(value["state"], "failed");
        assert_eq!(value["message"], "boom");
    }
}

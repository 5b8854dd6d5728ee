//! Runs a single [`PlanStep`] to completion inside a sandbox container:
//! analyze, apply file actions, generate tests, verify the build, validate
//! the test suite, and run a best-effort quality pass.

use std::sync::Arc;
use std::time::Instant;

use taskrelay_core::{
    BuildVerifier, CodeGenerationRequest, CodeGenerator, ContainerClient, ContainerId, CoreError,
    ExecutionMetrics, FileChangeType, FileEditor, PlanStep, QualityChecker, StepAction,
    StepActionPlan, StepAnalyzer, StepContext, StepExecutionResult, TestValidator,
};
use tracing::{info, warn};

/// The collaborators a [`StepExecutor`] drives. Each is a trait object so
/// the LLM, sandbox, and tool-detection backends can be swapped per
/// deployment without touching this crate.
pub struct StepExecutor {
    container: Arc<dyn ContainerClient>,
    editor: Arc<dyn FileEditor>,
    analyzer: Arc<dyn StepAnalyzer>,
    codegen: Arc<dyn CodeGenerator>,
    build_verifier: Arc<dyn BuildVerifier>,
    test_validator: Arc<dyn TestValidator>,
    quality: Arc<dyn QualityChecker>,
}

impl StepExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        container: Arc<dyn ContainerClient>,
        editor: Arc<dyn FileEditor>,
        analyzer: Arc<dyn StepAnalyzer>,
        codegen: Arc<dyn CodeGenerator>,
        build_verifier: Arc<dyn BuildVerifier>,
        test_validator: Arc<dyn TestValidator>,
        quality: Arc<dyn QualityChecker>,
    ) -> Self {
        Self {
            container,
            editor,
            analyzer,
            codegen,
            build_verifier,
            test_validator,
            quality,
        }
    }

    /// One attempt at executing `step`. Build and test failures stop the
    /// attempt and return `success: false`; quality-check failures do not.
    pub async fn execute_step(
        &self,
        container_id: &ContainerId,
        step: &PlanStep,
        context: &StepContext,
        max_fix_retries: u32,
    ) -> StepExecutionResult {
        let start = Instant::now();
        let mut metrics = ExecutionMetrics::default();

        let analysis_start = Instant::now();
        let plan = match self.analyzer.analyze(step, context).await {
            Ok(plan) => plan,
            Err(err) => {
                return StepExecutionResult::failure(
                    format!("Analysis failed: {err}"),
                    Vec::new(),
                    StepActionPlan::default(),
                    start.elapsed(),
                    metrics,
                );
            }
        };
        metrics.analysis_duration = analysis_start.elapsed();
        metrics.llm_calls += 1;

        for action in &plan.actions {
            if let Err(err) = self.apply_action(container_id, action, &mut metrics).await {
                return StepExecutionResult::failure(
                    format!("Action failed on {}: {err}", action.file_path()),
                    self.editor.get_changes(),
                    plan,
                    start.elapsed(),
                    metrics,
                );
            }
        }

        if plan.requires_tests {
            if let Some(main_file) = plan.main_file.as_deref().filter(|f| !f.is_empty()) {
                if let Err(err) = self.generate_tests(container_id, &plan, main_file, &mut metrics).await {
                    return StepExecutionResult::failure(
                        format!("Test generation failed: {err}"),
                        self.editor.get_changes(),
                        plan,
                        start.elapsed(),
                        metrics,
                    );
                }
            }
        }

        let build_start = Instant::now();
        let build_result = match self.build_verifier.verify_build(container_id, max_fix_retries).await {
            Ok(result) => result,
            Err(err) => {
                return StepExecutionResult::failure(
                    format!("Build verification errored: {err}"),
                    self.editor.get_changes(),
                    plan,
                    start.elapsed(),
                    metrics,
                );
            }
        };
        metrics.build_attempts = build_result.attempts;
        metrics.build_duration = build_start.elapsed();
        metrics.llm_calls += build_result.fixes_applied;

        if !build_result.success {
            warn!(step = %step.id, attempts = build_result.attempts, "build failed");
            return StepExecutionResult {
                success: false,
                error: Some(format!("Build failed: {}", build_result.errors.join("; "))),
                changes: self.editor.get_changes(),
                build_result: Some(build_result),
                test_result: None,
                action_plan: plan,
                duration: start.elapsed(),
                metrics,
            };
        }

        let test_start = Instant::now();
        let test_result = match self.test_validator.run_and_validate(container_id, max_fix_retries).await {
            Ok(result) => result,
            Err(err) => {
                return StepExecutionResult {
                    success: false,
                    error: Some(format!("Test validation errored: {err}")),
                    changes: self.editor.get_changes(),
                    build_result: Some(build_result),
                    test_result: None,
                    action_plan: plan,
                    duration: start.elapsed(),
                    metrics,
                };
            }
        };
        metrics.test_attempts = test_result.attempts;
        metrics.test_duration = test_start.elapsed();
        metrics.llm_calls += test_result.fixes_applied;

        if !test_result.all_passed {
            warn!(step = %step.id, failed = test_result.failed, "tests failed");
            return StepExecutionResult {
                success: false,
                error: Some(format!(
                    "Tests failed: {} of {} failed",
                    test_result.failed, test_result.total
                )),
                changes: self.editor.get_changes(),
                build_result: Some(build_result),
                test_result: Some(test_result),
                action_plan: plan,
                duration: start.elapsed(),
                metrics,
            };
        }

        if let Err(err) = self.quality.check_and_fix(container_id).await {
            info!(step = %step.id, %err, "quality check reported issues, step still succeeds");
        }

        info!(step = %step.id, "step succeeded");
        StepExecutionResult {
            success: true,
            error: None,
            changes: self.editor.get_changes(),
            build_result: Some(build_result),
            test_result: Some(test_result),
            action_plan: plan,
            duration: start.elapsed(),
            metrics,
        }
    }

    /// Runs [`StepExecutor::execute_step`] up to `max_retries + 1` times,
    /// re-analyzing from scratch each attempt so the analyzer can adapt its
    /// plan given the accumulated failure. Returns the first success, or the
    /// last failure if none succeed.
    pub async fn execute_step_with_retry(
        &self,
        container_id: &ContainerId,
        step: &PlanStep,
        context: &StepContext,
        max_retries: u32,
        max_fix_retries: u32,
    ) -> StepExecutionResult {
        let mut last = None;
        for attempt in 0..=max_retries {
            let result = self.execute_step(container_id, step, context, max_fix_retries).await;
            if result.success {
                return result;
            }
            warn!(step = %step.id, attempt, "step attempt failed, will retry if budget remains");
            last = Some(result);
        }
        last.expect("loop runs at least once since max_retries + 1 >= 1")
    }

    async fn apply_action(
        &self,
        container_id: &ContainerId,
        action: &StepAction,
        metrics: &mut ExecutionMetrics,
    ) -> Result<(), CoreError> {
        match action {
            StepAction::CreateFile { file_path, request } => {
                let content = self.resolve_content(request, None, metrics).await?;
                self.editor.create_file(container_id, file_path, &content).await?;
                metrics.record_change(FileChangeType::Created);
                Ok(())
            }
            StepAction::ModifyFile { file_path, request } => {
                let existing = self.container.read_file_in_container(container_id, file_path).await?;
                let content = self.resolve_content(request, Some(existing.as_str()), metrics).await?;
                self.editor.modify_file(container_id, file_path, &content).await?;
                metrics.record_change(FileChangeType::Modified);
                Ok(())
            }
            StepAction::DeleteFile { file_path } => {
                self.editor.delete_file(container_id, file_path).await?;
                metrics.record_change(FileChangeType::Deleted);
                Ok(())
            }
        }
    }

    async fn resolve_content(
        &self,
        request: &CodeGenerationRequest,
        prior_content: Option<&str>,
        metrics: &mut ExecutionMetrics,
    ) -> Result<String, CoreError> {
        match &request.content {
            Some(literal) => Ok(literal.clone()),
            None => {
                let codegen_start = Instant::now();
                let generated = self.codegen.generate(request, prior_content).await?;
                metrics.codegen_duration += codegen_start.elapsed();
                metrics.llm_calls += 1;
                Ok(generated)
            }
        }
    }

    async fn generate_tests(
        &self,
        container_id: &ContainerId,
        plan: &StepActionPlan,
        main_file: &str,
        metrics: &mut ExecutionMetrics,
    ) -> Result<(), CoreError> {
        let main_content = self.container.read_file_in_container(container_id, main_file).await.ok();
        let request = CodeGenerationRequest::synthesize(format!("Generate tests for {main_file}"));

        let codegen_start = Instant::now();
        let generated = self.codegen.generate(&request, main_content.as_deref()).await?;
        metrics.codegen_duration += codegen_start.elapsed();
        metrics.llm_calls += 1;

        if let Some(test_file) = plan.test_file.as_deref().filter(|f| !f.is_empty()) {
            self.editor.create_file(container_id, test_file, &generated).await?;
            metrics.record_change(FileChangeType::Created);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use taskrelay_core::{BuildResult, ContainerExecResult, FileChange, TestValidationResult};
    use tokio_util::sync::CancellationToken;

    struct FakeContainer;

    #[async_trait]
    impl ContainerClient for FakeContainer {
        async fn execute_in_container(
            &self,
            _id: &ContainerId,
            _cmd: &str,
            _args: &[String],
            _cancel: CancellationToken,
        ) -> Result<ContainerExecResult, CoreError> {
            unimplemented!()
        }
        async fn read_file_in_container(&self, _id: &ContainerId, _path: &str) -> Result<String, CoreError> {
            Ok("fn main() {}".to_string())
        }
        async fn write_file_in_container(&self, _id: &ContainerId, _path: &str, _content: &str) -> Result<(), CoreError> {
            Ok(())
        }
        async fn file_exists_in_container(&self, _id: &ContainerId, _path: &str) -> Result<bool, CoreError> {
            Ok(true)
        }
    }

    #[derive(Default)]
    struct FakeEditor {
        changes: Mutex<Vec<FileChange>>,
    }

    #[async_trait]
    impl FileEditor for FakeEditor {
        async fn create_file(&self, _id: &ContainerId, path: &str, content: &str) -> Result<(), CoreError> {
            self.changes.lock().unwrap().push(FileChange {
                change_type: FileChangeType::Created,
                path: path.to_string(),
                old_content: None,
                new_content: Some(content.to_string()),
            });
            Ok(())
        }
        async fn modify_file(&self, _id: &ContainerId, path: &str, transform: &str) -> Result<(), CoreError> {
            self.changes.lock().unwrap().push(FileChange {
                change_type: FileChangeType::Modified,
                path: path.to_string(),
                old_content: Some("old".to_string()),
                new_content: Some(transform.to_string()),
            });
            Ok(())
        }
        async fn delete_file(&self, _id: &ContainerId, path: &str) -> Result<(), CoreError> {
            self.changes.lock().unwrap().push(FileChange {
                change_type: FileChangeType::Deleted,
                path: path.to_string(),
                old_content: Some("old".to_string()),
                new_content: None,
            });
            Ok(())
        }
        fn get_changes(&self) -> Vec<FileChange> {
            self.changes.lock().unwrap().clone()
        }
        fn clear_changes(&self) -> Result<(), CoreError> {
            self.changes.lock().unwrap().clear();
            Ok(())
        }
    }

    struct FakeAnalyzer;

    #[async_trait]
    impl StepAnalyzer for FakeAnalyzer {
        async fn analyze(&self, _step: &PlanStep, _context: &StepContext) -> Result<StepActionPlan, CoreError> {
            Ok(StepActionPlan {
                actions: vec![StepAction::CreateFile {
                    file_path: "src/widget.rs".to_string(),
                    request: CodeGenerationRequest::literal("pub struct Widget;"),
                }],
                requires_tests: true,
                main_file: Some("src/widget.rs".to_string()),
                test_file: Some("tests/widget_test.rs".to_string()),
            })
        }
    }

    struct FakeCodeGenerator;

    #[async_trait]
    impl CodeGenerator for FakeCodeGenerator {
        async fn generate(&self, _request: &CodeGenerationRequest, _prior: Option<&str>) -> Result<String, CoreError> {
            Ok("#[test] fn widget_works() {}".to_string())
        }
    }

    struct ScriptedBuildVerifier {
        outcomes: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl BuildVerifier for ScriptedBuildVerifier {
        async fn verify_build(&self, _id: &ContainerId, _max_retries: u32) -> Result<BuildResult, CoreError> {
            let success = self.outcomes.lock().unwrap().pop().unwrap_or(true);
            Ok(BuildResult {
                success,
                attempts: 1,
                errors: if success { vec![] } else { vec!["undefined symbol".to_string()] },
                fixes_applied: 0,
                duration: Duration::from_millis(1),
                tool_available: true,
                missing_tool: None,
            })
        }
    }

    struct AlwaysPassingTestValidator;

    #[async_trait]
    impl TestValidator for AlwaysPassingTestValidator {
        async fn run_and_validate(&self, _id: &ContainerId, _max_retries: u32) -> Result<TestValidationResult, CoreError> {
            Ok(TestValidationResult {
                all_passed: true,
                total: 1,
                passed: 1,
                failed: 0,
                skipped: 0,
                attempts: 1,
                fixes_applied: 0,
                duration: Duration::from_millis(1),
            })
        }
    }

    struct NoOpQualityChecker;

    #[async_trait]
    impl QualityChecker for NoOpQualityChecker {
        async fn check_and_fix(&self, _id: &ContainerId) -> Result<(), CoreError> {
            Ok(())
        }
    }

    struct CountingAnalyzer {
        calls: AtomicU32,
    }

    #[async_trait]
    impl StepAnalyzer for CountingAnalyzer {
        async fn analyze(&self, _step: &PlanStep, _context: &StepContext) -> Result<StepActionPlan, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StepActionPlan::default())
        }
    }

    fn step() -> PlanStep {
        PlanStep::new("step-1", "Add Widget", "Add a Widget struct")
    }

    #[tokio::test]
    async fn successful_step_collects_changes_and_metrics() {
        let executor = StepExecutor::new(
            Arc::new(FakeContainer),
            Arc::new(FakeEditor::default()),
            Arc::new(FakeAnalyzer),
            Arc::new(FakeCodeGenerator),
            Arc::new(ScriptedBuildVerifier {
                outcomes: Mutex::new(vec![true]),
            }),
            Arc::new(AlwaysPassingTestValidator),
            Arc::new(NoOpQualityChecker),
        );

        let result = executor
            .execute_step(&"container-1".to_string(), &step(), &StepContext::default(), 2)
            .await;

        assert!(result.success);
        assert_eq!(result.changes.len(), 2); // the CreateFile action plus the generated test file
        assert!(result.metrics.llm_calls >= 2); // analysis + test generation
        assert_eq!(result.metrics.files_created, 2);
    }

    #[tokio::test]
    async fn build_failure_stops_before_tests_run() {
        let executor = StepExecutor::new(
            Arc::new(FakeContainer),
            Arc::new(FakeEditor::default()),
            Arc::new(FakeAnalyzer),
            Arc::new(FakeCodeGenerator),
            Arc::new(ScriptedBuildVerifier {
                outcomes: Mutex::new(vec![false]),
            }),
            Arc::new(AlwaysPassingTestValidator),
            Arc::new(NoOpQualityChecker),
        );

        let result = executor
            .execute_step(&"container-1".to_string(), &step(), &StepContext::default(), 2)
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Build failed"));
        assert!(result.test_result.is_none());
    }

    #[tokio::test]
    async fn retry_wrapper_reanalyzes_every_attempt_until_exhausted() {
        let analyzer = Arc::new(CountingAnalyzer { calls: AtomicU32::new(0) });
        let executor = StepExecutor::new(
            Arc::new(FakeContainer),
            Arc::new(FakeEditor::default()),
            analyzer.clone(),
            Arc::new(FakeCodeGenerator),
            Arc::new(ScriptedBuildVerifier {
                outcomes: Mutex::new(vec![false, false, false]),
            }),
            Arc::new(AlwaysPassingTestValidator),
            Arc::new(NoOpQualityChecker),
        );

        let result = executor
            .execute_step_with_retry(&"container-1".to_string(), &step(), &StepContext::default(), 2, 1)
            .await;

        assert!(!result.success);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 3); // initial attempt + 2 retries
    }
}

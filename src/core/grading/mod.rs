use std::sync::Arc;

use crate::core::{
    domain::{ExecutionResult, TestRunResult},
    traits::executor::CodeExecutor,
};

/// Body of the in-sandbox test runner. Expects `__cq_source` and `__cq_tests`
/// to be bound before it runs and prints the verdict as its final line.
const RUNNER_BODY: &str = include_str!("runner.py");

/// Runs a quest's hidden tests against student code in one sandboxed execution.
#[derive(Debug, Clone)]
pub struct GradingPipeline {
    executor: Arc<dyn CodeExecutor>,
}

impl GradingPipeline {
    pub fn new(executor: Arc<dyn CodeExecutor>) -> Self {
        Self { executor }
    }

    #[tracing::instrument(skip_all)]
    pub async fn grade(&self, student_code: &str, test_code: &str) -> TestRunResult {
        let script = runner_script(student_code, test_code);
        let result = self.executor.execute(&script).await;
        let verdict = parse_runner_output(&result);
        tracing::info!(
            "Graded submission: passed={}, {}/{} tests",
            verdict.passed,
            verdict.passed_count(),
            verdict.results.len()
        );
        verdict
    }
}

/// Blanks out test-framework imports; the sandbox has no pytest installed.
/// Line numbers of the remaining code are preserved.
pub fn strip_framework_imports(test_code: &str) -> String {
    test_code
        .lines()
        .map(|line| {
            let trimmed = line.trim_end();
            if trimmed == "import pytest" || trimmed.starts_with("from pytest import ") {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the wrapper program. Both sources are embedded as JSON string
/// literals, which are also valid Python string literals.
pub fn runner_script(student_code: &str, test_code: &str) -> String {
    let source = serde_json::Value::from(student_code).to_string();
    let tests = serde_json::Value::from(strip_framework_imports(test_code)).to_string();
    format!("__cq_source = {source}\n__cq_tests = {tests}\n{RUNNER_BODY}")
}

/// Decodes the verdict from the last non-empty stdout line.
pub fn parse_runner_output(result: &ExecutionResult) -> TestRunResult {
    let last_line = result
        .standard_output()
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty());

    let Some(last_line) = last_line else {
        tracing::warn!("Test runner produced no output");
        return TestRunResult::runner_failure(result.standard_error());
    };

    match serde_json::from_str::<TestRunResult>(last_line) {
        Ok(verdict) => TestRunResult::from_outcomes(verdict.results),
        Err(e) => {
            tracing::warn!("Malformed test runner output {:?}: {}", last_line, e);
            TestRunResult::runner_failure(result.standard_error())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::{
            DISCOVERY_TEST_NAME, EXEC_PHASE_TEST_NAME, RUNNER_FAILURE_MESSAGE, RUNNER_TEST_NAME,
            TIMEOUT_MESSAGE,
        },
        core::{domain::TestOutcome, traits::executor::MockCodeExecutor},
    };

    fn pipeline_returning(result: ExecutionResult) -> GradingPipeline {
        let mut executor = MockCodeExecutor::new();
        executor.expect_execute().times(1).return_const(result);
        GradingPipeline::new(Arc::new(executor))
    }

    #[test]
    fn test_strip_framework_imports() {
        let stripped = strip_framework_imports(
            "import pytest\nfrom pytest import raises\nimport pytesty\n\ndef test_a(user_code):\n    assert True",
        );

        assert_eq!(
            stripped,
            "\n\nimport pytesty\n\ndef test_a(user_code):\n    assert True"
        );
    }

    #[test]
    fn test_runner_script_embeds_sources_as_literals() {
        let script = runner_script("print(\"hi\")\nx = '\\n'", "import pytest\ndef test_x(u): pass");

        assert!(script.starts_with(
            "__cq_source = \"print(\\\"hi\\\")\\nx = '\\\\n'\"\n__cq_tests = \"\\ndef test_x(u): pass\"\n"
        ));
        assert!(script.ends_with(RUNNER_BODY));
    }

    #[test]
    fn test_parse_uses_last_non_empty_line() {
        let result = ExecutionResult::new(
            "debug from test\n{\"passed\": true, \"results\": [{\"testName\": \"test_add\", \"passed\": true}]}\n\n",
            "",
        );

        let verdict = parse_runner_output(&result);

        assert_eq!(
            verdict,
            TestRunResult {
                passed: true,
                results: vec![TestOutcome::passed("test_add")],
            }
        );
    }

    #[test]
    fn test_parse_recomputes_passed_from_outcomes() {
        let result = ExecutionResult::new(
            r#"{"passed": true, "results": [{"testName": "test_a", "passed": false, "message": "no"}]}"#,
            "",
        );

        assert!(!parse_runner_output(&result).passed);
    }

    #[test]
    fn test_parse_missing_output_reports_stderr() {
        let result = ExecutionResult::new("", TIMEOUT_MESSAGE);

        let verdict = parse_runner_output(&result);

        assert_eq!(verdict, TestRunResult::single_failure(RUNNER_TEST_NAME, TIMEOUT_MESSAGE));
    }

    #[test]
    fn test_parse_malformed_json_without_stderr() {
        let result = ExecutionResult::new("{\"passed\": tru", "");

        let verdict = parse_runner_output(&result);

        assert_eq!(
            verdict,
            TestRunResult::single_failure(RUNNER_TEST_NAME, RUNNER_FAILURE_MESSAGE)
        );
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let result = ExecutionResult::new(r#"{"passed": "yes"}"#, "");

        assert_eq!(parse_runner_output(&result).results[0].test_name, RUNNER_TEST_NAME);
    }

    #[tokio::test]
    async fn test_grade_passing_suite() {
        let pipeline = pipeline_returning(ExecutionResult::new(
            r#"{"passed": true, "results": [{"testName": "test_add", "passed": true}]}"#,
            "",
        ));

        let verdict = pipeline
            .grade(
                "def add(a, b): return a + b",
                "def test_add(user_code):\n    assert user_code.namespace[\"add\"](2, 3) == 5",
            )
            .await;

        assert!(verdict.passed);
        assert_eq!(verdict.results, vec![TestOutcome::passed("test_add")]);
    }

    #[tokio::test]
    async fn test_grade_issues_single_execution_with_both_sources() {
        let mut executor = MockCodeExecutor::new();
        executor
            .expect_execute()
            .withf(|script| {
                script.contains("__cq_source = \"x = 1\"")
                    && script.contains("def test_x")
                    && !script.contains("import pytest")
            })
            .times(1)
            .return_const(ExecutionResult::new(
                r#"{"passed": true, "results": [{"testName": "test_x", "passed": true}]}"#,
                "",
            ));
        let pipeline = GradingPipeline::new(Arc::new(executor));

        let verdict = pipeline
            .grade("x = 1", "import pytest\ndef test_x(user_code):\n    pass")
            .await;

        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn test_grade_exec_phase_failure() {
        let pipeline = pipeline_returning(ExecutionResult::new(
            r#"{"passed": false, "results": [{"testName": "__exec__", "passed": false, "message": "SyntaxError: expected ':'"}]}"#,
            "",
        ));

        let verdict = pipeline.grade("def add(a,b) return a+b", "").await;

        assert!(!verdict.passed);
        assert_eq!(verdict.results.len(), 1);
        assert_eq!(verdict.results[0].test_name, EXEC_PHASE_TEST_NAME);
        assert!(verdict.results[0].message.as_deref().unwrap().starts_with("SyntaxError:"));
    }

    #[tokio::test]
    async fn test_grade_empty_suite_fails() {
        let pipeline =
            pipeline_returning(ExecutionResult::new(r#"{"passed": true, "results": []}"#, ""));

        let verdict = pipeline.grade("x = 1", "def helper(): pass").await;

        assert!(!verdict.passed);
        assert_eq!(verdict.results[0].test_name, DISCOVERY_TEST_NAME);
    }
}

use serde::{Deserialize, Serialize};

use crate::constants::{
    DISCOVERY_TEST_NAME, NO_TESTS_MESSAGE, RUNNER_FAILURE_MESSAGE, RUNNER_TEST_NAME,
};

/// Output of a single sandboxed execution.
///
/// `succeeded` is derived from `standard_error` and cannot be set independently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    standard_output: String,
    standard_error: String,
    succeeded: bool,
}

impl ExecutionResult {
    pub fn new(standard_output: impl Into<String>, standard_error: impl Into<String>) -> Self {
        let standard_error = standard_error.into();
        Self {
            standard_output: standard_output.into(),
            succeeded: standard_error.is_empty(),
            standard_error,
        }
    }

    pub fn failure(standard_output: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        if message.is_empty() {
            return Self::new(standard_output, "RuntimeError: execution failed");
        }
        Self::new(standard_output, message)
    }

    pub fn standard_output(&self) -> &str {
        &self.standard_output
    }

    pub fn standard_error(&self) -> &str {
        &self.standard_error
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub test_name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestOutcome {
    pub fn passed(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            passed: true,
            message: None,
        }
    }

    pub fn failed(test_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            passed: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunResult {
    pub passed: bool,
    pub results: Vec<TestOutcome>,
}

impl TestRunResult {
    pub fn from_outcomes(results: Vec<TestOutcome>) -> Self {
        if results.is_empty() {
            return Self::single_failure(DISCOVERY_TEST_NAME, NO_TESTS_MESSAGE);
        }
        Self {
            passed: results.iter().all(|outcome| outcome.passed),
            results,
        }
    }

    pub fn single_failure(test_name: &str, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            results: vec![TestOutcome::failed(test_name, message)],
        }
    }

    /// Failure reported when the runner script produced no readable verdict.
    pub fn runner_failure(standard_error: &str) -> Self {
        let message = if standard_error.is_empty() {
            RUNNER_FAILURE_MESSAGE
        } else {
            standard_error
        };
        Self::single_failure(RUNNER_TEST_NAME, message)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|outcome| outcome.passed).count()
    }

    pub fn first_failure(&self) -> Option<&TestOutcome> {
        self.results.iter().find(|outcome| !outcome.passed)
    }
}

/// Starter and test sources for one quest, as supplied by the content store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuestBundle {
    pub quest_id: String,
    pub starter_code: String,
    pub test_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeded_follows_stderr() {
        assert!(ExecutionResult::new("hello\n", "").succeeded());
        assert!(!ExecutionResult::new("", "boom").succeeded());
        assert!(!ExecutionResult::failure("", "").succeeded());
    }

    #[test]
    fn test_execution_result_serializes_derived_flag() {
        let json = serde_json::to_string(&ExecutionResult::failure("partial", "")).unwrap();

        assert_eq!(
            json,
            r#"{"standardOutput":"partial","standardError":"RuntimeError: execution failed","succeeded":false}"#
        );
    }

    #[test]
    fn test_empty_outcomes_fail_with_discovery_outcome() {
        let result = TestRunResult::from_outcomes(vec![]);

        assert!(!result.passed);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].test_name, DISCOVERY_TEST_NAME);
        assert_eq!(result.results[0].message.as_deref(), Some(NO_TESTS_MESSAGE));
    }

    #[test]
    fn test_from_outcomes_requires_every_test() {
        let result = TestRunResult::from_outcomes(vec![
            TestOutcome::passed("test_a"),
            TestOutcome::failed("test_b", "nope"),
        ]);

        assert!(!result.passed);
        assert_eq!(result.passed_count(), 1);
        assert_eq!(result.first_failure().map(|o| o.test_name.as_str()), Some("test_b"));
    }

    #[test]
    fn test_outcome_wire_names() {
        let json = serde_json::to_string(&TestOutcome::passed("test_add")).unwrap();
        assert_eq!(json, r#"{"testName":"test_add","passed":true}"#);
    }
}

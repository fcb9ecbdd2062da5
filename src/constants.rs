pub const EXECUTION_TIMEOUT_MS: u64 = 10_000;
pub const LOAD_TIMEOUT_MS: u64 = 30_000;

pub const TIMEOUT_MESSAGE: &str = "TimeoutError: Your code took too long! It might be stuck in a loop. Check your `while` condition or loop logic.";

/// Submissions above this size are rejected before reaching the grader.
pub const MAX_CODE_SIZE_BYTES: usize = 10 * 1024;
pub const LANGUAGE_VERSION: &str = "3.11";

pub const EXEC_PHASE_TEST_NAME: &str = "__exec__";
pub const RUNNER_TEST_NAME: &str = "__runner__";
pub const DISCOVERY_TEST_NAME: &str = "__discovery__";

pub const RUNNER_FAILURE_MESSAGE: &str = "Test runner failed to produce results.";
pub const NO_TESTS_MESSAGE: &str = "No tests found in this quest's test suite.";

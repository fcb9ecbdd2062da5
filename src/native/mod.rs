/// Native module contains implementations of core traits backed by the
/// local machine: a `python` child process, the content directory, and the
/// remote grading endpoint.
pub mod python_host;
pub mod quests;
pub mod submission;

pub mod executor;
pub mod interpreter;
pub mod quests;
pub mod submission;

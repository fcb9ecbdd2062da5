pub mod domain;
pub mod glitch;
pub mod grading;
pub mod runtime;
pub mod session;
pub mod traits;

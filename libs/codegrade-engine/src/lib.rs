//! Compile-and-run grading engine for learner submissions.
//!
//! The pipeline is split the same way the surrounding services think about
//! it: [`testcase`] turns the author's specification into cases,
//! [`compiler`] produces an [`compiler::Artifact`], [`sandbox`] runs it once
//! per case, [`evaluator`] judges the captured output and [`executor`] drives
//! the whole thing. [`pool`] is the bounded entry point callers should use.

pub mod compiler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod pool;
pub mod question;
pub mod sandbox;
pub mod testcase;

mod process;


pub use compiler::{Artifact, CompilationResult, Compiler, GccCompiler};
pub use config::EngineConfig;
pub use error::{EngineError, SandboxError};
pub use executor::Engine;
pub use pool::GradingPool;
pub use sandbox::{LocalProcessRunner, ProcessRunner};

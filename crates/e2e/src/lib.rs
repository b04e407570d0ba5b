//! Cadence test orchestration engine
//!
//! This crate runs declarative YAML suites against an HTTP service and,
//! optionally, a browser-driven UI:
//! - Drains each case's steps strictly in order through a command queue
//! - Polls observing steps until their expectation holds or time runs out
//! - Carries values between steps and cases in a suite-scoped state store
//! - Runs cross-origin step blocks in an isolated context with explicit
//!   argument and return marshaling
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TestRunner                               │
//! │    ├── TargetService::spawn() (optional)                    │
//! │    ├── run_suite(suite) -> SuiteResult                      │
//! │    │     └── ExecutionContext (one per suite file)          │
//! │    │           ├── SharedState, fixtures, IdGenerator       │
//! │    │           ├── HttpAdapter                              │
//! │    │           └── BrowserDriver (launched on first use)    │
//! │    └── Reporter::run_finished(summary)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CommandQueue                                               │
//! │    ├── request { method, url, body, expect, until, save }   │
//! │    ├── visit / get / click / type / clear / remove_attr     │
//! │    ├── command { name, args }                               │
//! │    ├── origin { origin, args, steps, returns }              │
//! │    └── set / generate_id / assert / wait / log              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod expect;
pub mod fixture;
pub mod http;
pub mod ids;
pub mod origin;
pub mod queue;
pub mod report;
pub mod retry;
pub mod runner;
pub mod server;
pub mod spec;
pub mod state;
pub mod template;

pub use config::HarnessConfig;
pub use context::ExecutionContext;
pub use error::{CadenceError, CadenceResult};
pub use queue::{CommandQueue, QueueOutcome, QueueVerdict};
pub use report::{CaseOutcome, CaseResult, JsonReporter, Reporter, RunSummary, StepOutcome, StepResult, SuiteResult};
pub use runner::TestRunner;
pub use spec::{Step, StepKind, TestCase, TestSuite};
pub use state::SharedState;

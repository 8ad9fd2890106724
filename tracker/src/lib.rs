//! Execution tracking and commit orchestration for agent worktrees.
//!
//! This crate brackets each unit of work an autonomous coding agent performs
//! inside a git worktree: it snapshots the worktree when the run starts,
//! drives the session's automatic-commit policy when it ends, captures the
//! resulting repository delta, and persists exactly one diff record per
//! execution. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (commit-mode resolution, diff
//!   combination, message generation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (git subprocesses, config
//!   files, the session store seam). Isolated to enable scripted fakes.
//!
//! Orchestration modules ([`execution`], [`commit`]) coordinate core logic
//! with I/O; [`events`] carries lifecycle notifications to listeners.

pub mod commit;
pub mod core;
pub mod events;
pub mod execution;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

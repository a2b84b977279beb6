use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all nupak operations.
#[derive(Debug, Error, Diagnostic)]
pub enum NupakError {
    /// The graph handed to the resolver is structurally broken (missing
    /// root, one-sided edges, pathological path multiplicities).
    #[error("Invalid dependency graph: {message}")]
    #[diagnostic(help("The restore walker must hand the resolver a rooted DAG with consistent parent/child links"))]
    InvalidGraph { message: String },

    /// The resolver walk failed to reach a fixpoint within its pass limit.
    /// This is an internal invariant violation, not an input problem.
    #[error("Dependency resolution did not converge after {passes} passes")]
    #[diagnostic(help("This indicates a resolver bug; please report the graph that produced it"))]
    DidNotConverge { passes: u32 },

    /// A version or version range string could not be parsed.
    #[error("Invalid version: {message}")]
    Version { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type NupakResult<T> = miette::Result<T>;

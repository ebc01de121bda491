use thiserror::Error;

use crate::plan::RelId;

/// Errors raised while building, registering, rewriting or executing plans.
///
/// Planner code returns these through [`OptResult`], so a failure aborts the current planning pass
/// and surfaces to whoever started it.
#[derive(Debug, Error)]
pub enum OptError {
    /// A rewrite replaced a child with one whose schema differs.
    #[error("row type of {rel} changed during registration: before [{before}], after [{after}]")]
    RowTypeMismatch {
        rel: RelId,
        before: String,
        after: String,
    },

    /// A copy was requested that the node kind cannot honor.
    #[error("relational expression should override copy. kind=[{kind}]; traits=[{traits}]; desired traits=[{desired}]")]
    CopyNotSupported {
        kind: &'static str,
        traits: String,
        desired: String,
    },

    /// Node failed its validity check.
    #[error("invalid relational expression {0}: {1}")]
    InvalidRel(RelId, String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Lattice whose tables do not form a tree rooted at the fact table.
    #[error("invalid lattice: {0}")]
    InvalidLattice(String),

    /// Valid plan shape that this component does not handle.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Expression evaluation failed at execution time.
    #[error("evaluation error: {0}")]
    Eval(String),

    /// Execution was cancelled at a `receive()` check.
    #[error("execution interrupted")]
    Interrupted,
}

pub type OptResult<T> = anyhow::Result<T>;

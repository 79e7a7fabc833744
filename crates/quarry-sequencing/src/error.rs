//! Error types for the sequencing service.

use thiserror::Error;

/// Errors returned by administrative operations on the sequencing service.
#[derive(Error, Debug)]
pub enum SequencingError {
    /// Configuration error, including mutation while the service is running.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lifecycle transition not allowed from the current state.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A changed configuration was added under an existing name.
    #[error("Processor '{0}' is already registered with a different configuration")]
    DuplicateConfig(String),

    /// The processor factory could not build an instance.
    #[error(transparent)]
    ProcessorInstantiation(#[from] InstantiationError),

    /// Malformed path expression.
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Content store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The worker pool refused the work.
    #[error("Worker pool error: {0}")]
    Pool(String),
}

/// Result type for sequencing operations.
pub type Result<T> = std::result::Result<T, SequencingError>;

/// Errors in path expressions and the output locations they produce.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// A rule string lacks the `=>` separator or one of its sides.
    #[error("Rule '{0}' is not of the form 'selection => output'")]
    MissingSeparator(String),

    /// The selection pattern cannot be compiled.
    #[error("Invalid selection pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Why it was rejected
        reason: String,
    },

    /// The output template has bad placeholder syntax.
    #[error("Invalid output template '{template}': {reason}")]
    InvalidTemplate {
        /// Offending template
        template: String,
        /// Why it was rejected
        reason: String,
    },

    /// The template refers to a group the selection pattern does not capture.
    #[error("Output template '{template}' refers to group {group} but the selection has {available}")]
    UnknownGroup {
        /// Offending template
        template: String,
        /// Group number referenced
        group: usize,
        /// Number of groups in the selection
        available: usize,
    },

    /// The substituted output is not a valid absolute path.
    #[error("Output path '{0}' is not a valid absolute path")]
    InvalidOutputPath(String),
}

/// Errors raised by the content store collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A session could not be opened.
    #[error("Failed to open session on workspace '{workspace}': {reason}")]
    Session {
        /// Workspace name
        workspace: String,
        /// Why the session failed
        reason: String,
    },

    /// The node does not exist.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Pending changes could not be persisted.
    #[error("Save failed: {0}")]
    Save(String),

    /// The session could not be released.
    #[error("Logout failed: {0}")]
    Logout(String),

    /// Any other repository failure.
    #[error("Repository error: {0}")]
    Repository(String),
}

/// Errors raised by a processor while it runs.
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// The processor hit a content store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Processor-specific failure.
    #[error("Processor failed: {0}")]
    Execution(#[from] anyhow::Error),
}

/// Failure turning a processor configuration into an instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unable to instantiate processor '{name}' ({class_name}): {reason}")]
pub struct InstantiationError {
    /// Processor name
    pub name: String,
    /// Implementation key
    pub class_name: String,
    /// Why instantiation failed
    pub reason: String,
}

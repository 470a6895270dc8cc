//! Error types for the asmsplice pipeline

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Template errors
    /// Malformed code inside `[[ ]]` tags
    ///
    /// **Triggered by:** Template code the expander cannot parse
    /// **Example:** `[[ for (i = 0; i < 3 { ]]` (missing `;` and `)`)
    ///
    /// `line` and `col` point into the synthesized template program; `listing`
    /// is that program with line numbers so the position can be read off.
    #[error("Template syntax error at line {line}, column {col}: {message}\n{listing}")]
    TemplateSyntaxError {
        /// Line number in the synthesized program (1-indexed)
        line: usize,
        /// Column number in the synthesized program (1-indexed)
        col: usize,
        /// Error description
        message: String,
        /// Numbered listing of the synthesized program
        listing: String,
    },

    /// Template code failed while running
    #[error("Template evaluation failed: {source}")]
    TemplateEvalError {
        /// Underlying runtime error
        #[source]
        source: Box<Error>,
    },

    /// Reference to undefined template variable
    ///
    /// **Triggered by:** Reading a variable before assigning it
    /// **Example:** `[[= width * 2 ]]` when `width` was never set
    #[error("Undefined variable: {name}")]
    UndefinedVariable {
        /// Variable name
        name: String,
    },

    /// Type mismatch in template code
    #[error("Type error: expected {expected}, got {got}")]
    TypeError {
        /// Expected type
        expected: String,
        /// Actual type
        got: String,
    },

    /// Division by zero in template code
    #[error("Division by zero")]
    DivisionByZero,

    /// Unknown template builtin function
    #[error("Unknown function: {name}")]
    UnknownFunction {
        /// Function name
        name: String,
    },

    /// Invalid arguments provided to a template builtin
    #[error("Invalid arguments for {function}: {reason}")]
    InvalidArguments {
        /// Builtin name
        function: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Too many loop iterations in template code
    #[error("Too many iterations (limit: {limit})")]
    TooManyIterations {
        /// Maximum allowed iterations
        limit: usize,
    },

    /// Break statement used outside of loop
    #[error("Break statement outside loop")]
    InvalidBreak,

    /// Continue statement used outside of loop
    #[error("Continue statement outside loop")]
    InvalidContinue,

    // Extraction errors
    /// Block parameter whose declared type has no register type
    ///
    /// **Triggered by:** `__asm4GCN f (float4* a) { ... }`
    /// **Prevention:** Use scalar types or pointers listed in the register type table
    #[error("Unknown parameter type '{declared_type}' in function {function} (line {line})")]
    UnknownParameterType {
        /// Function the parameter belongs to
        function: String,
        /// Type as written in the source
        declared_type: String,
        /// Source line of the parameter (1-indexed)
        line: usize,
    },

    /// Block introducer not followed by a well-formed block
    #[error("Malformed block at line {line}: {message}")]
    MalformedBlock {
        /// Source line of the introducer (1-indexed)
        line: usize,
        /// Error description
        message: String,
    },

    // Back-end errors
    /// One or more blocks failed to assemble
    #[error("Assembly failed for: {}", functions.join(", "))]
    AssemblyError {
        /// Functions whose assembly failed, in source order
        functions: Vec<String>,
    },

    /// The device compiler rejected the dummy-substituted source
    #[error("Device build failed:\n{log}")]
    DeviceBuildError {
        /// Build log as reported by the device compiler
        log: String,
    },

    /// Device compiler collaborator failed outside of a build
    #[error("Device error: {0}")]
    DeviceError(String),

    /// No anchor signature found for a block's dummy
    #[error("Patch anchor not found for function {function}")]
    PatchAnchorNotFound {
        /// Function whose dummy could not be located
        function: String,
    },

    /// Compile options failed validation
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Fatal error that aborts the pipeline
    Fatal,
    /// Warning that doesn't prevent a result
    Warning,
}

impl Error {
    /// Create a device error with a message
    pub fn device(msg: impl Into<String>) -> Self {
        Error::DeviceError(msg.into())
    }

    /// Wrap a runtime failure of template code
    pub fn template_eval(source: Error) -> Self {
        Error::TemplateEvalError {
            source: Box::new(source),
        }
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::PatchAnchorNotFound { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Fatal,
        }
    }
}

/// Result type for asmsplice operations
pub type Result<T> = std::result::Result<T, Error>;

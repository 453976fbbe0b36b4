//! Tools the reference engine can call.

use std::future::Future;
use std::pin::Pin;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// What a tool invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Result text handed back to the model.
    Text(String),
    /// Pause the run; the value is shown to the user and the tool is invoked
    /// again with their reply as the resume value.
    Interrupt(Value),
}

impl ToolOutput {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ToolOutput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Errors that can occur during tool execution
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

impl From<String> for ToolError {
    fn from(s: String) -> Self {
        Self::Custom(s)
    }
}

impl From<&str> for ToolError {
    fn from(s: &str) -> Self {
        Self::Custom(s.to_string())
    }
}

/// A tool with typed input.
///
/// ```rust
/// use parley_core::tool::{Tool, ToolError, ToolOutput};
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct MultiplyInput {
///     a: i64,
///     b: i64,
/// }
///
/// struct Multiply;
///
/// impl Tool for Multiply {
///     type Input = MultiplyInput;
///
///     fn name(&self) -> &str { "multiply" }
///     fn description(&self) -> &str { "Multiply two integers" }
///
///     fn execute(
///         &self,
///         input: Self::Input,
///         _resume: Option<String>,
///     ) -> impl std::future::Future<Output = Result<ToolOutput, ToolError>> + Send {
///         async move { Ok((input.a * input.b).to_string().into()) }
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// Arguments the model supplies. The derived `JsonSchema` is what the
    /// model is shown.
    type Input: DeserializeOwned + JsonSchema + Send;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the input, advertised to the model.
    fn parameters(&self) -> Value {
        schemars::schema_for!(Self::Input).to_value()
    }

    /// Run the tool. `resume` carries the user's reply when the tool is
    /// re-invoked after it interrupted.
    fn execute(
        &self,
        input: Self::Input,
        resume: Option<String>,
    ) -> impl Future<Output = Result<ToolOutput, ToolError>> + Send;
}

/// Object-safe form of [`Tool`] used by the engine.
pub trait DynTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    fn execute_raw(
        &self,
        input: Value,
        resume: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + '_>>;
}

/// Convert a [`Tool`] into a type-erased `Box<dyn DynTool>`.
pub fn box_tool<T: Tool + 'static>(tool: T) -> Box<dyn DynTool> {
    Box::new(ToolWrapper(tool))
}

struct ToolWrapper<T>(T);

impl<T: Tool + 'static> DynTool for ToolWrapper<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn description(&self) -> &str {
        self.0.description()
    }

    fn parameters(&self) -> Value {
        self.0.parameters()
    }

    fn execute_raw(
        &self,
        input: Value,
        resume: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let typed_input: T::Input = serde_json::from_value(input)
                .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

            self.0.execute(typed_input, resume).await
        })
    }
}

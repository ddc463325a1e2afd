//! Tool-call dispatch: one model request, at most one code execution.

use anyhow::Result;

use crate::{
    config::Config,
    error::DispatchError,
    interpreter::{Interpretation, Interpreter},
    llm::{Message, MessageRequest, ModelClient, ToolSchema},
};

pub const TOOL_NAME: &str = "execute_python";
pub const NO_EXECUTION: &str = "No code execution requested.";

pub const SYSTEM_PROMPT: &str = "\
## your job & context
you are a python data scientist. you are given tasks to complete and you run python code to solve them.
- the python code runs in jupyter notebook.
- every time you call `execute_python` tool, the python code is executed in a separate cell. it's okay to make multiple calls to `execute_python`.
- display visualizations using matplotlib or any other visualization library directly in the notebook. don't worry about saving the visualizations to a file.
- you have access to the internet and can make api requests.
- you also have access to the filesystem and can read/write files.
- you can install any pip package (if it exists) if you need to but the usual packages for data analysis are already preinstalled.
- you can run any python code you want, everything is running in a secure sandbox environment.
";

/// The single tool offered to the model.
pub fn tool_manifest() -> Vec<ToolSchema> {
    vec![ToolSchema {
        name: TOOL_NAME.into(),
        description: Some(
            "Execute python code in a Jupyter notebook cell and returns any result, stdout, stderr, display_data, and error."
                .into(),
        ),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The python code to execute in a single cell."
                }
            },
            "required": ["code"]
        }),
    }]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
}

impl DispatchOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            model: cfg
                .get("DEFAULT_MODEL")
                .unwrap_or_else(|| "claude-3-opus-20240229".into()),
            max_tokens: cfg
                .get_usize("MAX_TOKENS")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(4096),
            system: SYSTEM_PROMPT.to_string(),
        }
    }
}

pub struct Dispatcher {
    client: Box<dyn ModelClient>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(client: Box<dyn ModelClient>, options: DispatchOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    fn request(&self, user_message: &str) -> MessageRequest {
        MessageRequest {
            model: self.options.model.clone(),
            system: self.options.system.clone(),
            max_tokens: self.options.max_tokens,
            messages: vec![Message::user(user_message)],
            tools: tool_manifest(),
        }
    }

    /// Sends `user_message` as a fresh single-turn request and runs the first
    /// requested `execute_python` call, if any, through `interpreter`.
    pub async fn dispatch(&self, interpreter: &Interpreter<'_>, user_message: &str) -> Result<Interpretation> {
        interpreter.reporter.user_message(user_message);

        let response = self
            .client
            .create_message(&self.request(user_message))
            .await
            .map_err(DispatchError::Model)?;
        tracing::debug!(stop_reason = ?response.stop_reason, blocks = response.content.len(), "model responded");
        interpreter.reporter.model_text(&response.text());

        if response.wants_tool() {
            if let Some((name, input)) = response.first_tool_use() {
                interpreter.reporter.tool_use(name);
                if name == TOOL_NAME {
                    let code = input
                        .get("code")
                        .and_then(|c| c.as_str())
                        .ok_or_else(|| DispatchError::MissingCode { tool: name.to_string() })?;
                    return interpreter.run(code).await;
                }
            }
        }

        Ok(Interpretation::message(NO_EXECUTION))
    }
}

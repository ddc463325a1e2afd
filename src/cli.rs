use clap::{ArgGroup, Parser};

use crate::config::Config;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "opus-interpreter", about = "Ask a model to write Python and run it in a remote sandbox", version)]
#[command(group(ArgGroup::new("md_switch").args(["md", "no_md"]).multiple(false)))]
pub struct Cli {
    /// Model to ask for code.
    #[arg(long)]
    pub model: Option<String>,

    /// Token budget for each model response.
    #[arg(long = "max-tokens")]
    pub max_tokens: Option<u32>,

    /// Local directory for downloaded artifacts.
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<String>,

    /// Sandbox template used for each message.
    #[arg(long)]
    pub template: Option<String>,

    /// Render model text as Markdown.
    #[arg(long)]
    pub md: bool,
    /// Print model text verbatim.
    #[arg(long = "no-md")]
    pub no_md: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Flags take precedence over every config source.
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(model) = &self.model {
            cfg.set("DEFAULT_MODEL", model.clone());
        }
        if let Some(n) = self.max_tokens {
            cfg.set("MAX_TOKENS", n.to_string());
        }
        if let Some(dir) = &self.output_dir {
            cfg.set("OUTPUT_DIR", dir.clone());
        }
        if let Some(template) = &self.template {
            cfg.set("SANDBOX_TEMPLATE", template.clone());
        }
        if self.md {
            cfg.set("PRETTIFY_MARKDOWN", "true");
        } else if self.no_md {
            cfg.set("PRETTIFY_MARKDOWN", "false");
        }
    }
}

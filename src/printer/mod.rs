//! Console reporting: colored progress lines and markdown rendering (termimad).

use std::path::Path;

use owo_colors::OwoColorize;
use termimad::MadSkin;

use crate::error::ArtifactError;

/// Progress sink for a turn. Every method defaults to a no-op.
pub trait Reporter: Send + Sync {
    fn user_message(&self, _message: &str) {}
    fn model_text(&self, _text: &str) {}
    fn tool_use(&self, _name: &str) {}
    fn code(&self, _code: &str) {}
    fn execution_error(&self, _message: &str) {}
    fn results(&self, _summary: &str) {}
    fn logs(&self, _logs: &str) {}
    fn no_output(&self, _message: &str) {}
    fn saved(&self, _path: &Path) {}
    fn artifact_failed(&self, _remote_path: &str, _error: &ArtifactError) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Quiet;

impl Reporter for Quiet {}

pub struct TextPrinter {
    pub color: Option<&'static str>,
}

impl TextPrinter {
    pub fn print(&self, text: &str) {
        match self.color {
            Some("green") => println!("{}", text.green()),
            Some("cyan") => println!("{}", text.cyan()),
            Some("magenta") => println!("{}", text.magenta()),
            Some("yellow") => println!("{}", text.yellow()),
            Some("red") => println!("{}", text.red()),
            _ => println!("{}", text),
        }
    }
}

pub struct MarkdownPrinter {
    pub skin: MadSkin,
}

impl Default for MarkdownPrinter {
    fn default() -> Self {
        Self { skin: MadSkin::default() }
    }
}

impl MarkdownPrinter {
    pub fn print(&self, text: &str) {
        self.skin.print_text(text);
        println!();
    }
}

/// Prints progress to stdout, boxed between `=` rules like a notebook transcript.
pub struct Console {
    markdown: Option<MarkdownPrinter>,
    color: bool,
}

impl Console {
    pub fn new(markdown: bool, color: bool) -> Self {
        Self { markdown: markdown.then(MarkdownPrinter::default), color }
    }

    fn paint(&self, color: &'static str) -> TextPrinter {
        TextPrinter { color: self.color.then_some(color) }
    }

    fn boxed(&self, header: &str, body: &str, color: &'static str) {
        let rule = "=".repeat(50);
        println!("\n{}", rule);
        self.paint(color).print(header);
        if !body.is_empty() {
            println!("{}", body);
        }
        println!("{}", rule);
    }
}

impl Reporter for Console {
    fn user_message(&self, message: &str) {
        self.boxed(&format!("User Message: {}", message), "", "magenta");
    }

    fn model_text(&self, text: &str) {
        match &self.markdown {
            Some(md) if !text.is_empty() => {
                self.paint("cyan").print("Model response:");
                md.print(text);
            }
            _ => self.boxed("Model response:", text, "cyan"),
        }
    }

    fn tool_use(&self, name: &str) {
        self.boxed(&format!("Using tool: {}", name), "", "yellow");
    }

    fn code(&self, code: &str) {
        self.boxed("> Running following AI-generated code:", code, "yellow");
    }

    fn execution_error(&self, message: &str) {
        self.paint("red").print(&format!("[Code Interpreter error] {}", message));
    }

    fn results(&self, summary: &str) {
        println!("{}", summary);
    }

    fn logs(&self, logs: &str) {
        println!("{}", logs);
    }

    fn no_output(&self, message: &str) {
        println!("{}", message);
    }

    fn saved(&self, path: &Path) {
        self.paint("green").print(&format!("Saved locally: {}", path.display()));
    }

    fn artifact_failed(&self, remote_path: &str, error: &ArtifactError) {
        self.paint("red").print(&format!("Failed to download {}: {}", remote_path, error));
    }
}

//! The diagnostic sink held by reference throughout the pipeline. Owns the
//! source files database, renders through codespan-reporting, and records
//! everything it emits so callers (and tests) can inspect counts and
//! warning classes.

use codespan::{FileId, Files, Span};
use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use codespan_reporting::term::{
    self,
    termcolor::{ColorChoice, StandardStream},
    Config,
};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct Emitted {
    pub severity: Severity,
    pub class: Option<String>,
    pub message: String,
}

pub struct Diagnostics {
    files: Files<String>,
    switches: HashMap<String, bool>,
    emitted: Vec<Emitted>,
    errors: usize,
    render: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self { files: Files::new(), switches: HashMap::new(), emitted: Vec::new(), errors: 0, render: true }
    }

    /// A sink that records but never writes to the terminal.
    pub fn silent() -> Self {
        Self { render: false, ..Self::new() }
    }

    pub fn add_file(&mut self, name: impl Into<String>, source: String) -> FileId {
        self.files.add(name.into(), source)
    }

    pub fn source(&self, file: FileId) -> &str {
        self.files.source(file)
    }

    /// `-Wname` / `-Wno-name`. Unknown names are accepted silently; the
    /// warning taxonomy is open.
    pub fn set_warning(&mut self, enabled: bool, name: &str) {
        self.switches.insert(name.to_owned(), enabled);
    }

    fn warning_enabled(&self, name: &str) -> bool {
        self.switches.get(name).copied().unwrap_or(true)
    }

    pub fn error(&mut self, file: FileId, span: Span, message: impl Into<String>) {
        let message = message.into();
        self.errors += 1;
        self.emitted.push(Emitted { severity: Severity::Error, class: None, message: message.clone() });
        self.render(
            Diagnostic::error()
                .with_message(message)
                .with_labels(vec![Label::primary(file, span.start().to_usize()..span.end().to_usize())]),
        );
    }

    pub fn warning(&mut self, class: &str, file: FileId, span: Span, message: impl Into<String>) {
        if !self.warning_enabled(class) {
            return;
        }
        let message = message.into();
        self.emitted.push(Emitted {
            severity: Severity::Warning,
            class: Some(class.to_owned()),
            message: message.clone(),
        });
        self.render(
            Diagnostic::warning()
                .with_message(message)
                .with_notes(vec![format!("warning class: {}", class)])
                .with_labels(vec![Label::primary(file, span.start().to_usize()..span.end().to_usize())]),
        );
    }

    fn render(&mut self, diagnostic: Diagnostic<FileId>) {
        if !self.render {
            return;
        }
        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = Config::default();
        let _ = term::emit(&mut writer.lock(), &config, &self.files, &diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn had_errors(&self) -> bool {
        self.errors != 0
    }

    pub fn emitted(&self) -> &[Emitted] {
        &self.emitted
    }

    pub fn warnings_of_class(&self, class: &str) -> Vec<&Emitted> {
        self.emitted.iter().filter(|e| e.class.as_deref() == Some(class)).collect()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

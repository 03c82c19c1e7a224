//! Cross-file import resolution. `import a.b.c;` maps to `a/b/c.vi` under
//! the search root; units are parsed once and cached, an in-progress set
//! breaks cycles, and only exported symbols are visible through the
//! attached namespace scope.

use crate::lexer::{scan_invalid_tokens, Lexer};
use crate::{ParseError, Parser};
use ast::{Global, ScopeId, ScopeTree};
use codespan::{FileId, Span};
use diagnostics::Diagnostics;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

pub struct ImportManager {
    search_root: PathBuf,
    cache: HashMap<PathBuf, Vec<Global>>,
    unit_scopes: HashMap<PathBuf, ScopeId>,
    in_progress: HashSet<PathBuf>,
    injected: HashSet<PathBuf>,
    /// Names used as types that are still incomplete, with the first
    /// reference's location.
    pending: HashMap<String, (FileId, Span)>,
}

impl ImportManager {
    pub const EXTENSION: &'static str = "vi";

    pub fn new(search_root: impl Into<PathBuf>) -> Self {
        Self {
            search_root: search_root.into(),
            cache: HashMap::new(),
            unit_scopes: HashMap::new(),
            in_progress: HashSet::new(),
            injected: HashSet::new(),
            pending: HashMap::new(),
        }
    }

    fn unit_path(&self, segments: &[String]) -> PathBuf {
        let mut path = self.search_root.clone();
        for segment in segments {
            path.push(segment);
        }
        path.set_extension(Self::EXTENSION);
        path
    }

    /// Resolves one import: parses (or reuses) the unit, attaches its scope
    /// below the import site, and returns the unit's declarations for
    /// injection into the importing AST. Re-entering an in-progress unit
    /// returns nothing but leaves the partial scope attached.
    pub fn resolve(
        &mut self,
        segments: &[String],
        diag: &mut Diagnostics,
        scopes: &mut ScopeTree,
        into_scope: ScopeId,
        importer_file: FileId,
        span: Span,
    ) -> Result<Vec<Global>, ParseError> {
        let path = self.unit_path(segments);

        if let Some(&unit_scope) = self.unit_scopes.get(&path) {
            scopes.attach_import(into_scope, unit_scope);
            if self.in_progress.contains(&path) || self.injected.contains(&path) {
                return Ok(Vec::new());
            }
            self.injected.insert(path.clone());
            return Ok(self.cache.get(&path).cloned().unwrap_or_default());
        }

        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(_) => {
                diag.error(importer_file, span, format!("could not resolve import '{}'", segments.join(".")));
                return Err(ParseError::ImportFailed);
            }
        };

        let unit_file = diag.add_file(path.display().to_string(), source.clone());
        let tokens = Lexer::new(&source).lex();
        let errors_before = diag.error_count();
        scan_invalid_tokens(&tokens, unit_file, diag);
        if diag.error_count() != errors_before {
            return Err(ParseError::ImportFailed);
        }

        let unit_name = segments.last().map(String::as_str).unwrap_or("");
        let unit_scope = scopes.new_namespace(unit_name);
        self.unit_scopes.insert(path.clone(), unit_scope);
        self.in_progress.insert(path.clone());

        let mut parser = Parser::new(tokens, unit_file, diag, scopes, self, unit_scope);
        let globals = parser.parse()?;

        self.in_progress.remove(&path);
        self.cache.insert(path.clone(), globals.clone());
        self.injected.insert(path.clone());
        scopes.attach_import(into_scope, unit_scope);

        Ok(globals)
    }

    /// Records a name used as a type before any definition was seen.
    pub fn note_incomplete(&mut self, name: &str, file: FileId, span: Span) {
        self.pending.entry(name.to_owned()).or_insert((file, span));
    }

    /// A class declaration completed the named type.
    pub fn mark_defined(&mut self, name: &str) {
        self.pending.remove(name);
    }

    /// End-of-import check: anything referenced as a type but never
    /// completed is an error.
    pub fn report_unresolved(&self, diag: &mut Diagnostics) {
        let mut unresolved: Vec<_> = self
            .pending
            .iter()
            .filter(|(name, _)| ty::get(name).map(|t| !t.is_complete()).unwrap_or(true))
            .collect();
        unresolved.sort_by_key(|(name, _)| name.clone());
        for (name, (file, span)) in unresolved {
            diag.error(*file, *span, format!("unknown type '{}'", name));
        }
    }
}

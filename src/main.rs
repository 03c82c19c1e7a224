use ast::ScopeTree;
use diagnostics::Diagnostics;
use parser::{scan_invalid_tokens, ImportManager, Lexer, Parser};
use std::path::PathBuf;
use std::process::exit;
use structopt::StructOpt;

macro_rules! err {
    ($e:expr) => {{
        eprintln!("{}", $e);
        exit(1)
    }};
}

/// Compiler command line arguments.
#[derive(StructOpt, Debug)]
#[structopt(name = "viper")]
struct Options {
    /// Input source file for compilation.
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Optimization level hint passed to the IR module.
    #[structopt(short = "O", default_value = "0")]
    opt_level: u32,

    /// Enable or disable a warning class (-W<name>, -Wno-<name>).
    #[structopt(short = "W", number_of_values = 1)]
    warnings: Vec<String>,

    /// Output object path; defaults to `<input>.o`.
    #[structopt(short = "o", parse(from_os_str))]
    output: Option<PathBuf>,
}

fn main() {
    let options = Options::from_args();

    let source = match std::fs::read_to_string(&options.input) {
        Ok(source) => source,
        Err(_) => err!(format!("viper: could not find file '{}'", options.input.display())),
    };

    let mut diag = Diagnostics::new();
    for warning in &options.warnings {
        match warning.strip_prefix("no-") {
            Some(name) => diag.set_warning(false, name),
            None => diag.set_warning(true, warning),
        }
    }
    let file = diag.add_file(options.input.display().to_string(), source.clone());

    ty::initialize();

    let tokens = Lexer::new(&source).lex();
    scan_invalid_tokens(&tokens, file, &mut diag);
    if diag.had_errors() {
        exit(1);
    }

    let mut scopes = ScopeTree::new();
    let search_root = options.input.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let mut imports = ImportManager::new(search_root);
    let global_scope = scopes.global();

    let mut parser = Parser::new(tokens, file, &mut diag, &mut scopes, &mut imports, global_scope);
    let mut ast = match parser.parse() {
        Ok(ast) => ast,
        Err(_) => exit(1),
    };

    imports.report_unresolved(&mut diag);
    if diag.had_errors() {
        exit(1);
    }

    if !typecheck::check(&mut ast, &scopes, &mut diag) {
        exit(1);
    }
    if !typecheck::usage::check(&ast, &scopes, &mut diag) {
        exit(1);
    }

    let mut module = ir::Module::new(options.input.display().to_string());
    module.set_abi(ir::Abi::SysV);
    module.set_opt_level(options.opt_level);

    codegen::lower(&ast, &mut scopes, &mut module);

    module.set_output_format(ir::OutputFormat::Elf);
    let output_path = options
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.o", options.input.display())));
    let mut output = match std::fs::File::create(&output_path) {
        Ok(file) => file,
        Err(error) => err!(format!("viper: could not create '{}': {}", output_path.display(), error)),
    };
    if let Err(error) = module.emit(&mut output) {
        err!(format!("viper: failed to write object file: {}", error));
    }
}

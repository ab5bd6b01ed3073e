use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};

use rill::ast_printer::AstPrinter;
use rill::interpreter::{Interpreter, InterpreterConfig};
use rill::parser::Parser;
use rill::scanner::Scanner;
use rill::{RillError, Stmt, Token};

/// Exit code for lexical, syntax and resolution errors.
const EXIT_STATIC: i32 = 65;

/// Exit code for runtime errors.
const EXIT_RUNTIME: i32 = 70;

#[derive(ClapParser, Debug)]
#[command(version, about = "Rill language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,

    /// Maximum nesting of function calls before a stack overflow is reported
    #[arg(long, global = true, value_name = "N")]
    max_depth: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: Option<PathBuf>,

        /// Emit the token stream as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parses a program from a file and prints its syntax tree
    Parse {
        filename: Option<PathBuf>,

        /// Emit the statements as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: Option<PathBuf> },

    /// Runs input from a file as a Rill program
    Run { filename: Option<PathBuf> },
}

/// Reads the contents of a file as UTF-8 text
fn read_file(filename: PathBuf) -> Result<String> {
    info!("Reading file: {:?}", filename);
    let file = File::open(&filename).context(format!("Failed to open file {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    let bytes = reader
        .read_to_end(&mut buf)
        .context(format!("Failed to read file {:?}", filename))?;

    info!("Read {} bytes from {:?}", bytes, filename);

    let text = String::from_utf8(buf).map_err(RillError::from)?;
    Ok(text)
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("rill::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug)
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

fn no_input(command: &str) -> ! {
    info!("No filepath provided for {}", command);
    println!("No input filepath was provided. Exiting...");
    std::process::exit(0);
}

fn fail(errors: &[RillError]) -> ! {
    for e in errors {
        debug!("Reporting: {:?}", e);
        eprintln!("{}", e);
    }

    let code = if errors.iter().any(RillError::is_runtime) {
        EXIT_RUNTIME
    } else {
        EXIT_STATIC
    };

    debug!("Exiting with code {}", code);
    std::process::exit(code);
}

/// Lexes and parses a whole program, exiting on any static error.
fn load_program(source: &str) -> Vec<Stmt> {
    let tokens: Vec<Token> = match rill::lex(source) {
        Ok(tokens) => tokens,
        Err(e) => fail(&[e]),
    };

    match Parser::new(tokens).parse() {
        Ok(statements) => statements,
        Err(errors) => fail(&errors),
    }
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    if args.log {
        init_logger()?;
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    let mut config = InterpreterConfig::default();
    if let Some(depth) = args.max_depth {
        config.max_call_depth = depth;
    }

    match args.commands {
        Commands::Tokenize { filename, json } => {
            let Some(filename) = filename else {
                no_input("Tokenize")
            };

            info!("Running Tokenize subcommand");
            let source = read_file(filename)?;

            if json {
                let tokens = match rill::lex(&source) {
                    Ok(tokens) => tokens,
                    Err(e) => fail(&[e]),
                };
                println!("{}", serde_json::to_string_pretty(&tokens)?);
                return Ok(());
            }

            let mut tokenized = true;

            for token in Scanner::new(&source) {
                match token {
                    Ok(token) => {
                        debug!("Scanned token: {}", token);
                        println!("{}", token);
                    }

                    Err(e) => {
                        tokenized = false;
                        debug!("Tokenization debug: {}", e);
                        eprintln!("{}", e);
                    }
                }
            }

            if !tokenized {
                debug!("Tokenization failed, exiting with code {}", EXIT_STATIC);
                std::process::exit(EXIT_STATIC);
            }

            info!("Tokenization completed successfully");
        }

        Commands::Parse { filename, json } => {
            let Some(filename) = filename else {
                no_input("Parse")
            };

            info!("Running Parse subcommand");
            let source = read_file(filename)?;
            let statements = load_program(&source);

            if json {
                println!("{}", serde_json::to_string_pretty(&statements)?);
            } else {
                for stmt in &statements {
                    let ast_str = AstPrinter::print_stmt(stmt);
                    debug!("AST: {}", ast_str);
                    println!("{}", ast_str);
                }
            }

            info!("Parse subcommand completed");
        }

        Commands::Evaluate { filename } => {
            let Some(filename) = filename else {
                no_input("Evaluate")
            };

            info!("Running Evaluate subcommand");
            let source = read_file(filename)?;

            let tokens = match rill::lex(&source) {
                Ok(tokens) => tokens,
                Err(e) => fail(&[e]),
            };

            let expr = match Parser::new(tokens).parse_expression() {
                Ok(expr) => expr,
                Err(e) => fail(&[e]),
            };

            let mut interpreter = Interpreter::new().with_config(config);

            match interpreter.evaluate(&expr) {
                Ok(value) => {
                    debug!("Evaluated to: {}", value);
                    println!("{}", value);
                }
                Err(e) => fail(&[e]),
            }

            info!("Evaluate subcommand completed");
        }

        Commands::Run { filename } => {
            let Some(filename) = filename else {
                no_input("Run")
            };

            info!("Running Run subcommand");
            let source = read_file(filename)?;
            info!("Provided input:\n {}", source);

            let statements = load_program(&source);
            info!("Parsed {} statements", statements.len());

            let mut interpreter = Interpreter::new().with_config(config);

            match interpreter.interpret(&statements) {
                Ok(()) => info!("Program executed successfully"),
                Err(e) => fail(&[e]),
            }
        }
    }

    Ok(())
}

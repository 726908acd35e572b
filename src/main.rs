use clap::{Parser as ClapParser, Subcommand};
use sift_query::cli::{self, CheckOptions, CheckResult, CliError};
use std::io::{self, Read};

#[derive(ClapParser)]
#[command(name = "sift")]
#[command(about = "Sift - filter JSON records with search-box style queries")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and run a query
    Check {
        /// The query to run
        query: String,

        /// JSON input (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,

        /// Only validate syntax, don't execute
        #[arg(long)]
        syntax_only: bool,

        /// One output slot per record, null for non-matches
        #[arg(long)]
        aligned: bool,

        /// Rewrite negations before evaluating
        #[arg(long)]
        optimize: bool,

        /// Field ordering the max{} and min{} aggregators
        #[arg(long)]
        order_by: Option<String>,
    },

    /// List documentation categories
    Docs,

    /// Show documentation for a specific category
    Doc {
        /// Category name (use 'sift docs' to list categories)
        category: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            query,
            input,
            pretty,
            syntax_only,
            aligned,
            optimize,
            order_by,
        } => run_check(CheckOptions {
            query,
            input,
            pretty,
            syntax_only,
            aligned,
            optimize,
            order_by,
        }),
        Commands::Docs => {
            print!("{}", cli::get_docs_overview());
            Ok(())
        }
        Commands::Doc { category } => cli::get_doc_category(&category).map(|content| {
            print!("{}", content);
        }),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run_check(mut options: CheckOptions) -> Result<(), CliError> {
    if options.input.is_none() && !options.syntax_only && !atty::is(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        options.input = Some(buffer);
    }

    match cli::execute_check(&options)? {
        CheckResult::SyntaxValid(graph) => {
            println!("Syntax is valid");
            println!("{}", graph);
        }
        CheckResult::Success(output) => {
            let json = if options.pretty {
                serde_json::to_string_pretty(&output)
            } else {
                serde_json::to_string(&output)
            }?;
            println!("{}", json);
        }
    }
    Ok(())
}

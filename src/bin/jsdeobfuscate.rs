use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use js_deobfuscate_rs::{Options, SourceKind, TransformerConfig, TransformerRegistry, deobfuscate};

#[derive(Parser, Debug)]
#[command(name = "jsdeobfuscate", version, about = "Reverses common JavaScript obfuscation")]
struct Cli {
    /// Input file, or `-` for stdin.
    #[arg(required_unless_present = "list")]
    input: Option<String>,

    /// Write output to a file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated transformer names, run in order with default options.
    #[arg(long, value_delimiter = ',')]
    transformers: Option<Vec<String>>,

    #[arg(long, value_enum)]
    source_type: Option<SourceTypeArg>,

    /// Keep going on a partially parsed file.
    #[arg(long)]
    loose: bool,

    /// Drop comments from the output.
    #[arg(long)]
    no_comments: bool,

    /// List the available transformers and their options.
    #[arg(long)]
    list: bool,

    /// Log every pass and rewrite.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceTypeArg {
    Module,
    Script,
    Unambiguous,
}

impl From<SourceTypeArg> for SourceKind {
    fn from(arg: SourceTypeArg) -> Self {
        match arg {
            SourceTypeArg::Module => Self::Module,
            SourceTypeArg::Script => Self::Script,
            SourceTypeArg::Unambiguous => Self::Unambiguous,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.list {
        print_transformers();
        return Ok(());
    }

    let mut options = match &cli.config {
        Some(path) => Options::from_path(path)?,
        None => Options::default(),
    };
    if let Some(names) = &cli.transformers {
        options.transformers = names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(TransformerConfig::named)
            .collect();
    }
    if let Some(source_type) = cli.source_type {
        options.source_type = source_type.into();
    }
    if cli.loose {
        options.loose = true;
    }
    if cli.no_comments {
        options.comments = false;
    }

    let input = cli.input.as_deref().ok_or("no input file given")?;
    let code = if input == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let output = deobfuscate(&code, &options)?;

    if let Some(path) = &cli.output {
        fs::write(path, output)?;
        log::info!("output written to {}", path.display());
    } else {
        println!("{}", output);
    }

    Ok(())
}

fn print_transformers() {
    let registry = TransformerRegistry::new();
    for transformer in registry.iter() {
        println!("{:<26}{}", transformer.name(), transformer.description());
        for spec in transformer.options() {
            println!(
                "    {:<22}{} (default: {})",
                spec.name,
                spec.description,
                spec.default_value()
            );
        }
    }
}

//! quire - inspect ebooks through the ingestion pipeline

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use quire::{Book, BookModel, Dispatcher, FormatType, PluginRegistry, ReaderConfig, TocEntry};

#[derive(Parser)]
#[command(name = "quire")]
#[command(version, about = "Read ebook metadata and structure", long_about = None)]
#[command(after_help = "EXAMPLES:
    quire info book.fb2               Show book metadata
    quire toc book.epub               Print the table of contents
    quire dump --json book.mobi       Dump the document model as JSON
    quire detect *.epub *.txt         Print the detected format of each file

Set QUIRE_LOG=debug for diagnostics.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show book metadata
    Info(BookArgs),
    /// Print the table of contents
    Toc(BookArgs),
    /// Dump the parsed document
    Dump(BookArgs),
    /// Print the detected format of each file
    Detect {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct BookArgs {
    /// Input file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Treat the file as this format (extension, MIME type or name)
    #[arg(short, long)]
    format: Option<FormatType>,

    /// Decode text with this encoding instead of detecting it
    #[arg(short, long)]
    encoding: Option<String>,

    /// Encoding assumed for legacy text without a declaration
    #[arg(long, default_value = "windows-1252")]
    fallback_encoding: String,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

impl BookArgs {
    fn book(&self) -> Book {
        let mut book = match self.format {
            Some(format) => Book::with_format(&self.input, format),
            None => Book::new(&self.input),
        };
        book.set_encoding(self.encoding.clone());
        book
    }

    fn dispatcher(&self) -> Dispatcher {
        let config = ReaderConfig::default().with_fallback_encoding(&self.fallback_encoding);
        Dispatcher::with_config(Arc::new(PluginRegistry::with_defaults()), config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("QUIRE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Info(args) => show_info(&args),
        Command::Toc(args) => show_toc(&args),
        Command::Dump(args) => dump(&args),
        Command::Detect { files } => {
            detect(&files);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn show_info(args: &BookArgs) -> Result<(), String> {
    let mut book = args.book();
    args.dispatcher()
        .load_metadata(&mut book)
        .map_err(|e| e.to_string())?;
    let meta = book.metadata();

    if args.json {
        let json = serde_json::to_string_pretty(meta).map_err(|e| e.to_string())?;
        println!("{json}");
        return Ok(());
    }

    println!("File: {}", book.path().display());
    if let Some(format) = book.format() {
        println!("Format: {format}");
    }
    println!("Title: {}", meta.title);
    if !meta.authors.is_empty() {
        println!("Authors: {}", meta.authors.join(", "));
    }
    if let Some(ref language) = meta.language {
        println!("Language: {language}");
    }
    if let Some(ref series) = meta.series {
        match series.index {
            Some(index) => println!("Series: {} #{index}", series.name),
            None => println!("Series: {}", series.name),
        }
    }
    if !meta.tags.is_empty() {
        println!("Tags: {}", meta.tags.join(", "));
    }
    if let Some(ref cover) = meta.cover {
        println!("Cover: {cover}");
    }
    if let Some(ref id) = meta.identifier {
        println!("Identifier: {id}");
    }
    if let Some(ref encoding) = meta.encoding {
        println!("Encoding: {encoding}");
    }
    if let Some(ref desc) = meta.description {
        let desc = desc.trim();
        match desc.char_indices().nth(200) {
            Some((cut, _)) => println!("Description: {}...", &desc[..cut]),
            None => println!("Description: {desc}"),
        }
    }
    Ok(())
}

fn load_model(args: &BookArgs) -> Result<BookModel, String> {
    let book = args.book();
    let model = args.dispatcher().load_model(&book).map_err(|e| e.to_string())?;
    info!(
        paragraphs = model.paragraph_count(),
        diagnostics = model.diagnostics().len(),
        "model loaded"
    );
    Ok(model)
}

fn show_toc(args: &BookArgs) -> Result<(), String> {
    let model = load_model(args)?;
    if args.json {
        let json = serde_json::to_string_pretty(model.toc()).map_err(|e| e.to_string())?;
        println!("{json}");
        return Ok(());
    }
    fn print(entries: &[TocEntry], depth: usize) {
        for entry in entries {
            println!(
                "{:indent$}{} [{}]",
                "",
                entry.title,
                entry.position.paragraph,
                indent = depth * 2
            );
            print(&entry.children, depth + 1);
        }
    }
    print(model.toc(), 0);
    Ok(())
}

fn dump(args: &BookArgs) -> Result<(), String> {
    let model = load_model(args)?;
    if args.json {
        let json = serde_json::to_string_pretty(&model).map_err(|e| e.to_string())?;
        println!("{json}");
        return Ok(());
    }
    for (index, paragraph) in model.paragraphs().iter().enumerate() {
        println!("{index:>6} {:?}: {}", paragraph.kind(), paragraph.text());
    }
    for (id, resource) in model.resources() {
        println!("resource {id}: {} ({} bytes)", resource.media_type, resource.data.len());
    }
    for diagnostic in model.diagnostics() {
        println!("diagnostic: {diagnostic}");
    }
    Ok(())
}

fn detect(files: &[PathBuf]) {
    let dispatcher = Dispatcher::with_defaults();
    for file in files {
        let format = dispatcher.classify(&Book::new(file));
        println!("{}: {format}", file.display());
    }
}

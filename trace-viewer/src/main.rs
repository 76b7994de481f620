//! `tvt` - command-line front end for execution traces

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use trace_codec::Format;
use trace_data::TraceRow;
use trace_viewer::{analysis, Direction, FindField, Session, TraceView, ViewerConfig};
use tracing_subscriber::EnvFilter;

/// Inspect, filter and convert execution traces
#[derive(Parser, Debug)]
#[command(name = "tvt", author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Architecture, row count, registers and bookmarks
    Info { file: PathBuf },

    /// Print one page of rows
    Rows {
        file: PathBuf,
        #[arg(short, long, default_value_t = 1)]
        page: usize,
    },

    /// Print the rows kept by a filter expression
    Filter {
        file: PathBuf,
        /// e.g. "disasm=push|pop/reg_eax=0x1/rows=0-99"
        expr: String,
        #[arg(short, long, default_value_t = 1)]
        page: usize,
    },

    /// Find the next row containing a keyword
    Find {
        file: PathBuf,
        keyword: String,
        /// disasm, regs, mem, mem_addr, mem_value, comment or any
        #[arg(long, default_value = "disasm")]
        field: FindField,
        /// Row position to start from
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(long)]
        backward: bool,
        /// Search the rows kept by this filter instead of the full trace
        #[arg(long)]
        filter: Option<String>,
    },

    /// Re-encode a trace
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Native)]
        to: OutputFormat,
    },

    /// List bookmarks with statistics
    Bookmarks { file: PathBuf },

    /// Most executed addresses
    ExecCounts {
        file: PathBuf,
        #[arg(long, default_value_t = 30)]
        top: usize,
        #[arg(long)]
        filter: Option<String>,
    },

    /// Rows accessing memory in ADDR..=ADDR+SIZE
    MemRange {
        file: PathBuf,
        #[arg(value_parser = parse_hex_arg)]
        addr: u64,
        #[arg(value_parser = parse_hex_arg)]
        size: u64,
        #[arg(long)]
        filter: Option<String>,
    },

    /// Comment rows with their memory accesses and save
    Annotate {
        file: PathBuf,
        /// Save here instead of overwriting FILE
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        filter: Option<String>,
    },

    /// Bookmark every row that writes memory and save
    MarkWrites {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        filter: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Native,
    Json,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Native => Format::Native,
            OutputFormat::Json => Format::Json,
        }
    }
}

fn parse_hex_arg(text: &str) -> Result<u64, String> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid hex number '{}': {}", text, e))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ViewerConfig::from_file(path)?,
        None => ViewerConfig::default(),
    };

    match cli.command {
        Command::Info { file } => info(&Session::open(file, config)?),
        Command::Rows { file, page } => {
            let session = Session::open(file, config)?;
            print_page(&session, page)
        }
        Command::Filter { file, expr, page } => {
            let mut session = Session::open(file, config)?;
            session.filter(&expr)?;
            print_page(&session, page)
        }
        Command::Find {
            file,
            keyword,
            field,
            start,
            backward,
            filter,
        } => {
            let session = open_filtered(file, config, filter.as_deref())?;
            let direction = if backward { Direction::Backward } else { Direction::Forward };
            match session.find(field, &keyword, start, direction)? {
                Some(position) => {
                    let rows = session.visible_rows();
                    println!("{}", format_row(&session, rows[position]));
                }
                None => println!("'{}' not found", keyword),
            }
            Ok(())
        }
        Command::Convert { input, output, to } => {
            let mut session = Session::open(input, config)?;
            session.save_as(output, to.into())
        }
        Command::Bookmarks { file } => bookmarks(&Session::open(file, config)?),
        Command::ExecCounts { file, top, filter } => {
            let session = open_filtered(file, config, filter.as_deref())?;
            let counts = analysis::execution_counts(session.store(), &session.visible_rows())?;
            println!("{} unique addresses executed.", counts.len());
            println!("Top {} executed addresses:", top);
            for (address, count) in counts.iter().take(top) {
                println!("{:#x}  {}", address, count);
            }
            Ok(())
        }
        Command::MemRange {
            file,
            addr,
            size,
            filter,
        } => {
            let session = open_filtered(file, config, filter.as_deref())?;
            let visible = session.visible_rows();
            let rows = analysis::rows_accessing_range(&visible, addr, size);
            println!(
                "{} rows access {:#x}..={:#x}",
                rows.len(),
                addr,
                addr.saturating_add(size)
            );
            for row in rows {
                println!("{}", format_row(&session, row));
            }
            Ok(())
        }
        Command::Annotate {
            file,
            output,
            filter,
        } => {
            let mut session = open_filtered(file, config, filter.as_deref())?;
            let ids = visible_ids(&session);
            let count = analysis::annotate_memory_accesses(session.store_mut(), &ids)?;
            println!("Annotated {} rows", count);
            save_to(&mut session, output)
        }
        Command::MarkWrites {
            file,
            output,
            filter,
        } => {
            let mut session = open_filtered(file, config, filter.as_deref())?;
            let ids = visible_ids(&session);
            let count = analysis::bookmark_memory_writes(session.store_mut(), &ids)?;
            println!("Added {} bookmarks", count);
            save_to(&mut session, output)
        }
    }
}

/// Open a trace and, when given, apply a filter and view its result
fn open_filtered(file: PathBuf, config: ViewerConfig, filter: Option<&str>) -> Result<Session> {
    let mut session = Session::open(file, config)?;
    if let Some(expr) = filter {
        session.filter(expr)?;
    }
    Ok(session)
}

fn visible_ids(session: &Session) -> Vec<usize> {
    match session.view() {
        TraceView::Full => (0..session.store().row_count()).collect(),
        TraceView::Filtered => session.filtered_ids().to_vec(),
    }
}

fn save_to(session: &mut Session, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => session.save_as(path, Format::Native),
        None => session.save(),
    }
}

fn info(session: &Session) -> Result<()> {
    let store = session.store();
    if let Some(path) = session.path() {
        println!("File:         {}", path.display());
    }
    println!("Architecture: {}", store.arch);
    println!("Pointer size: {}", store.pointer_size);
    println!("Rows:         {}", store.row_count());
    match store.instruction_pointer_name() {
        Ok(name) => println!("IP register:  {}", name),
        Err(_) => println!("IP register:  (none)"),
    }
    println!("Registers:    {}", store.registers.names().join(" "));
    println!("Bookmarks:    {}", store.bookmarks.len());
    Ok(())
}

fn print_page(session: &Session, page: usize) -> Result<()> {
    let rows = session.visible_rows();
    let config = session.config();
    let pages = config.page_count(rows.len());
    anyhow::ensure!(
        (1..=pages).contains(&page),
        "page {} out of range (1..={})",
        page,
        pages
    );
    for row in &rows[config.page_range(page, rows.len())] {
        println!("{}", format_row(session, row));
    }
    println!("-- page {}/{}, {} rows --", page, pages, rows.len());
    Ok(())
}

fn bookmarks(session: &Session) -> Result<()> {
    let Some(summary) = analysis::bookmark_summary(session.bookmarks()) else {
        println!("No bookmarks found.");
        return Ok(());
    };
    for b in session.bookmarks() {
        let rows = if b.startrow == b.endrow {
            b.startrow.to_string()
        } else {
            format!("{} - {}", b.startrow, b.endrow)
        };
        println!("{:<13}  {:<16} {:<33} ; {}", rows, b.addr, b.disasm, b.comment);
    }
    println!();
    println!("Address  | count | start rows");
    for (addr, rows) in &summary.by_address {
        let rows: Vec<String> = rows.iter().map(ToString::to_string).collect();
        println!("{} | {} | {}", addr, rows.len(), rows.join(" "));
    }
    println!();
    println!("{} bookmarks total, {} unique addresses.", summary.total, summary.by_address.len());
    println!(
        "Average length: {:.1}  Longest: {}  Shortest: {}",
        summary.average_length, summary.longest, summary.shortest
    );
    Ok(())
}

fn format_row(session: &Session, row: &TraceRow) -> String {
    let ip = session
        .store()
        .instruction_pointer(row.id)
        .map(|ip| format!("{:#x}", ip))
        .unwrap_or_default();
    let mut line = format!("{:<8} {:<12} {:<20} {:<42}", row.id, ip, row.opcodes_hex(), row.disasm);
    if !row.comment.is_empty() {
        line.push_str(" ; ");
        line.push_str(&row.comment);
    }
    line
}

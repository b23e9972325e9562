//! exigram CLI: XML <-> EXI.

use std::io::{Read, Write};
use std::path::Path;
use std::process;

use clap::{Args, Parser, Subcommand};
use exigram::options::{Alignment, ExiOptions, Preserve};
use exigram::{decode_with_options, encode, events_to_xml, xml};

#[derive(Parser)]
#[command(name = "exigram", about = "XML <-> EXI conversion (schema-less)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode XML to EXI
    Encode(EncodeArgs),
    /// Decode EXI to XML
    Decode(CommonArgs),
}

#[derive(Args)]
struct EncodeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Do NOT include options in EXI header
    #[arg(long)]
    no_header_options: bool,

    /// Write "$EXI" cookie
    #[arg(long)]
    include_cookie: bool,

    /// Resolve external general entities relative to the input file
    #[arg(long)]
    resolve_external_entities: bool,
}

/// Fuer decode: Defaults, falls der Header keine Options traegt.
#[derive(Args)]
struct CommonArgs {
    /// Input file (- for stdin)
    #[arg(short, long)]
    input: String,

    /// Output file (optional; without -o auto-derived, -o - = stdout)
    #[arg(short, long)]
    output: Option<String>,

    // -- Alignment (gegenseitig ausschliessend) --
    /// Byte alignment
    #[arg(long, conflicts_with_all = ["pre_compression", "compression"])]
    byte_aligned: bool,

    /// Pre-compression alignment
    #[arg(long, conflicts_with_all = ["byte_aligned", "compression"])]
    pre_compression: bool,

    /// DEFLATE compression
    #[arg(long, conflicts_with_all = ["byte_aligned", "pre_compression"])]
    compression: bool,

    /// Values per channel block (pre-compression/compression)
    #[arg(long)]
    block_size: Option<u32>,

    /// Strings longer than this never enter the string table
    #[arg(long)]
    value_max_length: Option<u32>,

    // -- Modus --
    /// Fragment mode
    #[arg(long)]
    fragment: bool,

    // -- Fidelity (preserve) --
    /// Preserve comments (CM)
    #[arg(long)]
    preserve_comments: bool,

    /// Preserve processing instructions (PI)
    #[arg(long)]
    preserve_pis: bool,

    /// Preserve DTDs and entity references (DT/ER)
    #[arg(long)]
    preserve_dtd: bool,

    /// Preserve namespace prefixes
    #[arg(long)]
    preserve_prefixes: bool,

    /// Preserve lexical values
    #[arg(long)]
    preserve_lexical: bool,
}

impl CommonArgs {
    fn to_options(&self) -> ExiOptions {
        let alignment = if self.byte_aligned {
            Alignment::ByteAlignment
        } else if self.pre_compression {
            Alignment::PreCompression
        } else if self.compression {
            Alignment::Compression
        } else {
            Alignment::BitPacked
        };
        let mut opts = ExiOptions::default().with_alignment(alignment).with_preserve(Preserve {
            comments: self.preserve_comments,
            pis: self.preserve_pis,
            dtd: self.preserve_dtd,
            prefixes: self.preserve_prefixes,
            lexical_values: self.preserve_lexical,
        });
        if self.fragment {
            opts = opts.with_fragment();
        }
        if let Some(size) = self.block_size {
            opts = opts.with_block_size(size);
        }
        if let Some(len) = self.value_max_length {
            opts = opts.with_value_max_length(len);
        }
        opts
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Fehler: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Encode(args) => run_encode(args),
        Command::Decode(args) => run_decode(args),
    }
}

fn run_encode(args: EncodeArgs) -> Result<(), String> {
    let mut opts = args.common.to_options();
    if args.no_header_options {
        opts = opts.without_header_options();
    }
    if args.include_cookie {
        opts = opts.with_cookie();
    }
    if args.resolve_external_entities {
        opts = opts.with_resolve_external_general_entities();
    }
    opts.validate().map_err(|e| format!("Ungueltige Optionen: {e}"))?;

    let events = if args.common.input == "-" {
        let text = String::from_utf8(read_input("-")?).map_err(|e| format!("stdin ist kein UTF-8: {e}"))?;
        xml::parse_events(&text, &opts)
    } else {
        xml::parse_file(Path::new(&args.common.input), &opts)
    }
    .map_err(|e| format!("XML: {e}"))?;
    log::info!("{} events aus {}", events.len(), args.common.input);

    let bytes = encode(&events, &opts).map_err(|e| format!("Encode: {e}"))?;
    let output = resolve_output_path(args.common.output.as_deref(), &args.common.input, "exi")?;
    write_output(&output, &bytes)
}

fn run_decode(args: CommonArgs) -> Result<(), String> {
    let defaults = args.to_options();
    let bytes = read_input(&args.input)?;
    let (events, opts) = decode_with_options(&bytes, defaults).map_err(|e| format!("Decode: {e}"))?;
    log::info!("{} events, alignment {:?}", events.len(), opts.alignment());

    let xml = events_to_xml(&events).map_err(|e| format!("XML: {e}"))?;
    let output = resolve_output_path(args.output.as_deref(), &args.input, "xml")?;
    write_output(&output, xml.as_bytes())
}

fn read_input(input: &str) -> Result<Vec<u8>, String> {
    if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf).map_err(|e| format!("stdin: {e}"))?;
        return Ok(buf);
    }
    std::fs::read(input).map_err(|e| format!("{input}: {e}"))
}

fn write_output(output: &str, bytes: &[u8]) -> Result<(), String> {
    if output == "-" {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bytes).and_then(|()| stdout.flush()).map_err(|e| format!("stdout: {e}"))
    } else {
        std::fs::write(output, bytes).map_err(|e| format!("{output}: {e}"))
    }
}

fn resolve_output_path(explicit: Option<&str>, input: &str, ext: &str) -> Result<String, String> {
    if let Some(path) = explicit {
        return Ok(path.to_string());
    }
    if input == "-" {
        return Err("ohne -o braucht es eine Eingabedatei (nicht stdin)".into());
    }
    let path = Path::new(input);
    let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| "ungueltiger Eingabepfad".to_string())?;
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join(format!("{stem}.{ext}")).to_string_lossy().to_string())
}

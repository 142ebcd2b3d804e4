use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::{presets, ContentArrangement, Table};
use serde::Serialize;

use dexbox::{
    container::{self, Container, ContainerKind},
    desc_names::{pretty_desc, pretty_method},
    file::{
        modifiers::{describe_flags, FlagTarget},
        DexFile, Header, VerifyPreset,
    },
};

/// dexbox - inspect dex files and the archives that carry them
#[derive(Debug, Parser)]
#[command(name = "dexbox", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalOptions {
    /// Emit output as JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Integrity checks to run when parsing a dex file.
    #[arg(long, global = true, value_enum, default_value_t = VerifyArg::Checksum)]
    verify: VerifyArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VerifyArg {
    None,
    Checksum,
    All,
}

impl From<VerifyArg> for VerifyPreset {
    fn from(arg: VerifyArg) -> Self {
        match arg {
            VerifyArg::None => VerifyPreset::None,
            VerifyArg::Checksum => VerifyPreset::ChecksumOnly,
            VerifyArg::All => VerifyPreset::All,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the dex entries of a container.
    Entries {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// Show the header of a dex entry.
    Header {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        /// Entry to inspect, defaults to the first one.
        #[arg(short, long)]
        entry: Option<String>,
    },
    /// Dump the string pool.
    Strings {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        #[arg(short, long)]
        entry: Option<String>,
    },
    /// Dump the type pool.
    Types {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        #[arg(short, long)]
        entry: Option<String>,
    },
    /// List method references.
    Methods {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        #[arg(short, long)]
        entry: Option<String>,
    },
    /// List class definitions.
    Classes {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        #[arg(short, long)]
        entry: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --verbose enables debug; RUST_LOG overrides
    let level = if cli.global.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_module("dexbox", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_target(false)
        .init();

    let opts = &cli.global;
    match &cli.command {
        Command::Entries { path } => run_entries(path, opts),
        Command::Header { path, entry } => run_header(path, entry.as_deref(), opts),
        Command::Strings { path, entry } => run_strings(path, entry.as_deref(), opts),
        Command::Types { path, entry } => run_types(path, entry.as_deref(), opts),
        Command::Methods { path, entry } => run_methods(path, entry.as_deref(), opts),
        Command::Classes { path, entry } => run_classes(path, entry.as_deref(), opts),
    }
}

// -- helpers
fn print_output<T: Serialize>(
    data: &T,
    opts: &GlobalOptions,
    display_fn: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if opts.json {
        println!("{}", serde_json::to_string_pretty(data)?);
    } else {
        display_fn(data);
    }
    Ok(())
}

fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.to_vec());
    table
}

fn print_table(table: &Table) {
    for line in table.to_string().lines() {
        println!("{}", line.trim_end());
    }
}

fn open_container(path: &Path) -> anyhow::Result<(ContainerKind, Box<dyn Container>)> {
    container::open(path).with_context(|| format!("failed to open {}", path.display()))
}

/// Opens `entry` of the container at `path`, or its first dex entry.
fn load_dex(path: &Path, entry: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<DexFile> {
    let (kind, container) = open_container(path)?;
    let name = match entry {
        Some(name) => name.to_string(),
        None => match container.list_entries().into_iter().next() {
            Some(name) => name,
            None => bail!("{} ({}) contains no dex entries", path.display(), kind.name()),
        },
    };
    container
        .open_dex(&name, opts.verify.into())
        .with_context(|| format!("failed to load {name} from {}", path.display()))
}

// -- commands
#[derive(Debug, Serialize)]
struct EntrySummary {
    name: String,
    size: Option<usize>,
    version: Option<u32>,
    classes: Option<u32>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct EntriesOutput {
    kind: ContainerKind,
    entries: Vec<EntrySummary>,
}

fn run_entries(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let (kind, container) = open_container(path)?;
    let entries = container
        .fetch_dex_files(opts.verify.into())
        .into_iter()
        .map(|(name, dex)| match dex {
            Ok(dex) => EntrySummary {
                name,
                size: Some(dex.file_size()),
                version: Some(dex.header().get_version()),
                classes: Some(dex.header().class_defs_size),
                error: None,
            },
            Err(err) => EntrySummary {
                name,
                size: None,
                version: None,
                classes: None,
                error: Some(err.to_string()),
            },
        })
        .collect();

    let output = EntriesOutput { kind, entries };
    print_output(&output, opts, |out| {
        println!("{} ({})", path.display(), out.kind.name());
        let mut t = table(&["Entry", "Size", "Version", "Classes", "Status"]);
        for e in &out.entries {
            let opt = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
            t.add_row(vec![
                e.name.clone(),
                opt(e.size.map(|v| v.to_string())),
                opt(e.version.map(|v| format!("{v:03}"))),
                opt(e.classes.map(|v| v.to_string())),
                e.error.clone().unwrap_or_else(|| "ok".to_string()),
            ]);
        }
        print_table(&t);
    })
}

fn run_header(path: &Path, entry: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let dex = load_dex(path, entry, opts)?;
    print_output(dex.header(), opts, |header: &Header| {
        let mut t = table(&["Field", "Value"]);
        let rows: Vec<(&str, String)> = vec![
            ("version", format!("{:03}", header.get_version())),
            ("checksum", format!("{:#010x}", header.checksum)),
            ("signature", header.signature_hex()),
            ("file_size", header.file_size.to_string()),
            ("header_size", format!("{:#x}", header.header_size)),
            ("byte_order", format!("{:?}", header.byte_order())),
            ("map_off", format!("{:#x}", header.map_off)),
            ("string_ids", section(header.string_ids_size, header.string_ids_off)),
            ("type_ids", section(header.type_ids_size, header.type_ids_off)),
            ("proto_ids", section(header.proto_ids_size, header.proto_ids_off)),
            ("field_ids", section(header.field_ids_size, header.field_ids_off)),
            ("method_ids", section(header.method_ids_size, header.method_ids_off)),
            ("class_defs", section(header.class_defs_size, header.class_defs_off)),
            ("data", section(header.data_size, header.data_off)),
        ];
        for (field, value) in rows {
            t.add_row(vec![field.to_string(), value]);
        }
        print_table(&t);
    })
}

fn section(size: u32, off: u32) -> String {
    format!("{size} @ {off:#x}")
}

#[derive(Debug, Serialize)]
struct PoolEntry {
    index: u32,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pretty: Option<String>,
}

fn print_pool(entries: &Vec<PoolEntry>) {
    let mut t = table(&["Index", "Value"]);
    for e in entries {
        let value = match &e.pretty {
            Some(pretty) => format!("{}  ({pretty})", e.value),
            None => e.value.clone(),
        };
        t.add_row(vec![e.index.to_string(), value]);
    }
    print_table(&t);
}

fn run_strings(path: &Path, entry: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let dex = load_dex(path, entry, opts)?;
    let pool = dex.pool();
    let mut entries = Vec::with_capacity(pool.num_strings());
    for idx in 0..pool.num_strings() as u32 {
        let value = match pool.resolve_string(idx) {
            Ok(value) => value.to_string(),
            Err(err) => {
                log::warn!("string {idx}: {err}");
                pool.resolve_string_lossy(idx)?
            }
        };
        entries.push(PoolEntry {
            index: idx,
            value,
            pretty: None,
        });
    }
    print_output(&entries, opts, print_pool)
}

fn run_types(path: &Path, entry: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let dex = load_dex(path, entry, opts)?;
    let pool = dex.pool();
    let entries = (0..pool.num_types() as u32)
        .map(|idx| -> anyhow::Result<PoolEntry> {
            let desc = pool.resolve_type(idx)?;
            Ok(PoolEntry {
                index: idx,
                pretty: Some(pretty_desc(&desc)),
                value: desc.to_string(),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    print_output(&entries, opts, print_pool)
}

fn run_methods(path: &Path, entry: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let dex = load_dex(path, entry, opts)?;
    let pool = dex.pool();
    let entries = (0..pool.num_methods() as u32)
        .map(|idx| -> anyhow::Result<PoolEntry> {
            let method = pool.resolve_method(idx)?;
            Ok(PoolEntry {
                index: idx,
                pretty: Some(format!(
                    "{} {}",
                    pretty_desc(&method.class),
                    pretty_method(&method.name, &method.proto)
                )),
                value: method.to_string(),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    print_output(&entries, opts, print_pool)
}

#[derive(Debug, Serialize)]
struct ClassEntry {
    index: u32,
    class: String,
    flags: String,
    superclass: Option<String>,
    interfaces: Vec<String>,
    source_file: Option<String>,
    fields: usize,
    methods: usize,
}

fn run_classes(path: &Path, entry: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let dex = load_dex(path, entry, opts)?;
    let pool = dex.pool();
    let mut entries = Vec::with_capacity(pool.num_class_defs());
    for idx in 0..pool.num_class_defs() as u32 {
        let info = pool.resolve_class_def(idx)?;
        let class_def = pool.get_class_def(idx)?;
        let (fields, methods) = match pool.class_data(&class_def)? {
            Some(data) => (data.num_fields(), data.num_methods()),
            None => (0, 0),
        };
        entries.push(ClassEntry {
            index: idx,
            class: info.class.to_string(),
            flags: describe_flags(info.access_flags, FlagTarget::Class),
            superclass: info.superclass.map(|s| s.to_string()),
            interfaces: info.interfaces.iter().map(|i| i.to_string()).collect(),
            source_file: info.source_file.map(|s| s.to_string()),
            fields,
            methods,
        });
    }

    print_output(&entries, opts, |entries| {
        let mut t = table(&["Index", "Flags", "Class", "Super", "Fields", "Methods", "Source"]);
        for e in entries {
            t.add_row(vec![
                e.index.to_string(),
                e.flags.clone(),
                pretty_desc(&e.class),
                e.superclass.as_deref().map(pretty_desc).unwrap_or_default(),
                e.fields.to_string(),
                e.methods.to_string(),
                e.source_file.clone().unwrap_or_default(),
            ]);
        }
        print_table(&t);
    })
}

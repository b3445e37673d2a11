use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use flate2::read::GzDecoder;
use rsfuzz::{
    EngineOptions, FuzzyIndex, IndexSnapshot, KeySpec, Query, SearchEngine, SearchOptions, Storage,
};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

// CLI Arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Fuzzy search over JSON documents", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an index for a document file
    Index {
        /// JSON array of documents, optionally gzip-compressed
        #[arg(short, long)]
        input: PathBuf,

        /// Write the index snapshot as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Persist documents, snapshot and options in a database
        #[arg(long)]
        store: Option<PathBuf>,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Search documents
    Search {
        query: String,

        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Prebuilt index snapshot matching the input
        #[arg(long)]
        index: Option<PathBuf>,

        /// Database written by `index --store`
        #[arg(long)]
        store: Option<PathBuf>,

        #[arg(short, long)]
        limit: Option<usize>,

        /// Treat the query as a JSON `$and`/`$or` tree
        #[arg(long)]
        logical: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Print statistics of an index snapshot
    Inspect { snapshot: PathBuf },
}

#[derive(ClapArgs, Debug)]
struct EngineArgs {
    /// JSON options file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Search key, `path` or `path:weight`
    #[arg(short, long = "key")]
    keys: Vec<String>,

    #[arg(long)]
    threshold: Option<f64>,

    /// Enable the `=`, `!`, `^`, `$`, `'` query markers
    #[arg(long)]
    extended: bool,

    /// Include scores in the output
    #[arg(long)]
    scores: bool,

    /// Include matched ranges in the output
    #[arg(long)]
    matches: bool,
}

impl EngineArgs {
    fn has_overrides(&self) -> bool {
        self.config.is_some()
            || !self.keys.is_empty()
            || self.threshold.is_some()
            || self.extended
            || self.scores
            || self.matches
    }

    fn apply(&self, mut options: EngineOptions) -> Result<EngineOptions> {
        if let Some(path) = &self.config {
            options = read_json(path).with_context(|| format!("Invalid options in {}", path.display()))?;
        }
        options.keys.extend(self.keys.iter().map(|k| parse_key(k)));
        if let Some(threshold) = self.threshold {
            options.threshold = threshold;
        }
        options.use_extended_search |= self.extended;
        options.include_score |= self.scores;
        options.include_matches |= self.matches;
        Ok(options)
    }
}

fn parse_key(arg: &str) -> KeySpec {
    match arg.rsplit_once(':') {
        Some((name, weight)) => match weight.parse::<f64>() {
            Ok(weight) => KeySpec::weighted(name, weight),
            Err(_) => KeySpec::Name(arg.to_string()),
        },
        None => KeySpec::Name(arg.to_string()),
    }
}

fn open_reader(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    Ok(serde_json::from_reader(open_reader(path)?)?)
}

// Document loading
fn load_documents(path: &Path) -> Result<Vec<Value>> {
    let start = Instant::now();
    let docs: Vec<Value> =
        read_json(path).with_context(|| format!("Expected a JSON array in {}", path.display()))?;
    tracing::info!("Loaded {} documents in {:?}", docs.len(), start.elapsed());
    Ok(docs)
}

fn write_snapshot(snapshot: &IndexSnapshot, path: &Path) -> Result<()> {
    let json = serde_json::to_string(snapshot)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn run_index(input: &Path, output: Option<&Path>, store: Option<&Path>, engine: &EngineArgs) -> Result<()> {
    if output.is_none() && store.is_none() {
        bail!("nothing to do: pass --output and/or --store");
    }

    let docs = load_documents(input)?;
    let options = engine.apply(EngineOptions::default())?;

    let start = Instant::now();
    let index = rsfuzz::create_index(&options.keys, &docs, options.get_fn.clone())?;
    let snapshot = index.to_snapshot();
    tracing::info!("Indexed {} records in {:?}", index.size(), start.elapsed());

    if let Some(path) = output {
        write_snapshot(&snapshot, path)?;
        tracing::info!("Wrote snapshot to {}", path.display());
    }

    if let Some(path) = store {
        let storage = Storage::open(path)?;
        storage.save_documents(&docs)?;
        storage.save_snapshot(&snapshot)?;
        storage.save_options(&options)?;
        storage.flush()?;
        tracing::info!("Stored collection in {}", path.display());
    }

    Ok(())
}

struct SearchArgs<'a> {
    query: &'a str,
    input: Option<&'a Path>,
    index: Option<&'a Path>,
    store: Option<&'a Path>,
    limit: Option<usize>,
    logical: bool,
}

fn run_search(args: SearchArgs<'_>, engine_args: &EngineArgs) -> Result<()> {
    let (docs, snapshot, options) = match (args.store, args.input) {
        (Some(path), _) => {
            let storage = Storage::open(path)?;
            let stored = storage.load_options()?.unwrap_or_default();
            let docs = storage.load_documents()?;
            if engine_args.has_overrides() {
                tracing::warn!("Options given on the command line; rebuilding the index");
                (docs, None, engine_args.apply(stored)?)
            } else {
                (docs, storage.load_snapshot()?, stored)
            }
        }
        (None, Some(input)) => {
            let snapshot = args.index.map(read_json::<IndexSnapshot>).transpose()?;
            (load_documents(input)?, snapshot, engine_args.apply(EngineOptions::default())?)
        }
        (None, None) => bail!("pass --input or --store"),
    };

    let index = snapshot.map(|s| FuzzyIndex::from_snapshot(s, options.get_fn.clone()));
    let engine = SearchEngine::with_index(docs, options, index)?;

    let query = if args.logical {
        Query::Logical(serde_json::from_str(args.query).context("Query is not valid JSON")?)
    } else {
        Query::Pattern(args.query.to_string())
    };

    let start = Instant::now();
    let results = engine.search(query, &SearchOptions { limit: args.limit })?;
    tracing::info!("Search found {} documents in {:?}", results.len(), start.elapsed());

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn run_inspect(path: &Path) -> Result<()> {
    let snapshot: IndexSnapshot = read_json(path)?;
    let keys: Vec<_> = snapshot
        .keys
        .iter()
        .map(|k| format!("{} ({:.3})", k.id, k.weight))
        .collect();
    let index = FuzzyIndex::from_snapshot(snapshot, Default::default());
    let stats = index.stats();

    println!("Records: {}", stats.total_records);
    println!("Keys:    {}", stats.total_keys);
    for key in keys {
        println!("  {}", key);
    }
    println!("Values:  {}", stats.total_values);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Index {
            input,
            output,
            store,
            engine,
        } => run_index(input, output.as_deref(), store.as_deref(), engine),
        Command::Search {
            query,
            input,
            index,
            store,
            limit,
            logical,
            engine,
        } => run_search(
            SearchArgs {
                query,
                input: input.as_deref(),
                index: index.as_deref(),
                store: store.as_deref(),
                limit: *limit,
                logical: *logical,
            },
            engine,
        ),
        Command::Inspect { snapshot } => run_inspect(snapshot),
    }
}

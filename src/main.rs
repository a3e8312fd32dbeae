use std::{ops::Range, path::PathBuf};

use clap::Parser;
use docsift::{
    ConfigDb,
    DataDir,
    DocumentId,
    Engine,
    bundle,
    config::{self, DOCUMENTS_DIR_KEY, EngineConfig},
    config_db::BuildRecord,
    error::{self, Error, PersistError},
    exact::QueryResult,
    rebuild::{RebuildOutcome, RebuildRequest},
    similarity::SimilarityHit,
    text_util::add_line_numbers,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCSIFT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    match cli.command {
        Command::Index(args) => {
            cmd_index(&config_db, &data_dir, &args)?;
        }
        Command::Query(args) => {
            let engine = open_engine(&config_db, &data_dir)?;
            let hits = engine.query(&args.text, args.count)?;
            if args.json {
                print_json(&QueryOutput {
                    query: &args.text,
                    result_count: hits.len(),
                    results: &hits,
                })?;
            } else {
                format_hits(&hits);
            }
        }
        Command::Search(args) => {
            cmd_search(&config_db, &data_dir, &args)?;
        }
        Command::Status(args) => {
            cmd_status(&config_db, &data_dir, args.json)?;
        }
        Command::Config { action } => match action {
            ConfigAction::Get { key } => config_get(&config_db, &key)?,
            ConfigAction::Set { key, value } => {
                config::validate_setting(&key, &value)?;
                config_db.set_setting(&key, value.trim())?;
            }
            ConfigAction::Unset { key } => {
                if !config_db.remove_setting(&key)? {
                    eprintln!("Setting '{key}' was not set.");
                }
            }
            ConfigAction::List { json } => {
                let settings = config_db.list_settings()?;
                if json {
                    let map: serde_json::Map<String, serde_json::Value> =
                        settings
                            .into_iter()
                            .map(|(k, v)| (k, serde_json::Value::String(v)))
                            .collect();
                    print_json(&map)?;
                } else {
                    for (key, value) in &settings {
                        println!("{key} = {value}");
                    }
                }
            }
        },
        Command::Completions(args) => {
            args.generate();
        }
    }

    Ok(())
}

/// Engine over the saved bundle, failing if nothing has been indexed.
fn open_engine(
    config_db: &ConfigDb,
    data_dir: &DataDir,
) -> error::Result<Engine> {
    let config = config::resolve(config_db)?;
    let engine = Engine::open(config, &data_dir.index_bundle());
    if engine.current().is_none() {
        return Err(Error::NoIndex);
    }
    Ok(engine)
}

fn cmd_index(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    args: &cli::IndexArgs,
) -> error::Result<()> {
    let mut config = config::resolve(config_db)?;
    if let Some(max_features) = args.max_features {
        config.overlay("max_features", &max_features.to_string())?;
    }

    let root = match &args.root {
        Some(root) => root.clone(),
        None => config_db
            .get_setting(DOCUMENTS_DIR_KEY)?
            .map(PathBuf::from)
            .ok_or_else(|| Error::NotFound {
                kind: "setting",
                name: DOCUMENTS_DIR_KEY.to_string(),
            })?,
    };
    let root = root.canonicalize().unwrap_or(root);

    eprintln!("Indexing {}...", root.display());
    let engine = Engine::with_persistence(config, data_dir.index_bundle());
    let outcome = match engine.request_rebuild(&root) {
        RebuildRequest::Accepted(handle) => handle.wait(),
        RebuildRequest::AlreadyInProgress => {
            return Err(Error::Rebuild("already in progress".to_string()));
        }
    };

    match outcome {
        RebuildOutcome::Published {
            generation_id,
            document_count,
            warnings,
        } => {
            config_db.record_build(&BuildRecord {
                root: root.display().to_string(),
                generation_id,
                document_count,
                warnings,
                built_at: engine
                    .current()
                    .map(|g| g.built_at())
                    .unwrap_or(generation_id),
            })?;
            eprintln!("  Indexed {document_count} documents");
            if warnings > 0 {
                eprintln!("  Skipped {warnings} file(s), see warnings above");
            }
            eprintln!("Index saved to {}", data_dir.index_bundle().display());
            Ok(())
        }
        RebuildOutcome::Failed(reason) => Err(Error::Rebuild(reason)),
    }
}

fn cmd_search(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    args: &cli::SearchArgs,
) -> error::Result<()> {
    let mut config = config::resolve(config_db)?;
    if let Some(lines) = args.context_lines {
        config.overlay("context_lines", &lines.to_string())?;
    }
    let per_page = args.per_page.unwrap_or(config.limits.default_k);
    let engine = Engine::open(config, &data_dir.index_bundle());
    if engine.current().is_none() {
        return Err(Error::NoIndex);
    }

    let results = engine.search(&args.text)?;
    let page = Page::new(results.len(), args.page, per_page);
    let shown = &results[page.range()];

    if args.json {
        print_json(&SearchOutput {
            query: &args.text,
            result_count: results.len(),
            page: page.number,
            page_count: page.count,
            results: shown,
        })?;
    } else {
        format_matches(shown);
        if !results.is_empty() {
            println!(
                "\n{} result(s), page {} of {}",
                results.len(),
                page.number,
                page.count
            );
        }
    }
    Ok(())
}

fn cmd_status(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let bundle_path = data_dir.index_bundle();
    let (header, bundle_error) = match bundle::inspect(&bundle_path) {
        Ok(header) => (Some(header), None),
        Err(PersistError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            (None, None)
        }
        Err(e) => (None, Some(e.to_string())),
    };
    let last_build = config_db.last_build()?;

    if json {
        print_json(&serde_json::json!({
            "data_dir": data_dir.root(),
            "data_dir_source": data_dir.source(),
            "index": header,
            "index_error": bundle_error,
            "last_build": last_build,
        }))?;
        return Ok(());
    }

    println!(
        "Data directory: {} (from {})",
        data_dir.root().display(),
        data_dir.source()
    );
    match (&header, &bundle_error) {
        (Some(h), _) => {
            println!(
                "Index: generation {} (format v{})",
                h.generation_id, h.format_version
            );
            println!("  Documents: {}", h.document_count);
            println!("  Features: {}", h.feature_count);
        }
        (None, Some(e)) => println!("Index: unreadable ({e})"),
        (None, None) => println!("Index: none (run `docsift index`)"),
    }
    if let Some(build) = &last_build {
        println!("Last build: {}", build.root);
        println!(
            "  {} document(s), {} skipped",
            build.document_count, build.warnings
        );
    }
    Ok(())
}

fn config_get(config_db: &ConfigDb, key: &str) -> error::Result<()> {
    if key == DOCUMENTS_DIR_KEY {
        match config_db.get_setting(key)? {
            Some(value) => println!("{value}"),
            None => eprintln!("{key} is not set"),
        }
        return Ok(());
    }

    let config: EngineConfig = config::resolve(config_db)?;
    let value = config.get(key).ok_or_else(|| Error::NotFound {
        kind: "setting",
        name: key.to_string(),
    })?;
    println!("{value}");
    Ok(())
}

#[derive(Serialize)]
struct QueryOutput<'a> {
    query: &'a str,
    result_count: usize,
    results: &'a [SimilarityHit],
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    result_count: usize,
    page: usize,
    page_count: usize,
    results: &'a [QueryResult],
}

fn print_json(value: &impl Serialize) -> error::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn short_id(document_id: &str) -> String {
    DocumentId::from_normalized(document_id).to_string()
}

fn format_hits(hits: &[SimilarityHit]) {
    if hits.is_empty() {
        println!("No results found.");
        return;
    }

    for h in hits {
        println!(
            "{:>3}. [{:.3}] {} {}",
            h.rank,
            h.similarity,
            h.document_id,
            short_id(&h.document_id)
        );
    }
    println!("\n{} result(s)", hits.len());
}

fn format_matches(results: &[QueryResult]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for r in results {
        println!(
            "{:>3}. {} ({}) {}",
            r.rank,
            r.document_id,
            r.locator_label,
            short_id(&r.document_id)
        );
        let context = add_line_numbers(&r.context_lines.join("\n"), r.line);
        for line in context.lines() {
            println!("     {line}");
        }
    }
}

/// One page of a result list. Pages are 1-based; out-of-range pages are
/// clamped to the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Page {
    number: usize,
    count: usize,
    per_page: usize,
    total: usize,
}

impl Page {
    fn new(total: usize, requested: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let count = total.div_ceil(per_page).max(1);
        Self {
            number: requested.clamp(1, count),
            count,
            per_page,
            total,
        }
    }

    fn range(&self) -> Range<usize> {
        let start = (self.number - 1) * self.per_page;
        start.min(self.total)..(start + self.per_page).min(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page() {
        let page = Page::new(12, 1, 5);
        assert_eq!(page.count, 3);
        assert_eq!(page.range(), 0..5);
    }

    #[test]
    fn last_page_is_partial() {
        assert_eq!(Page::new(12, 3, 5).range(), 10..12);
    }

    #[test]
    fn out_of_range_page_is_clamped() {
        let page = Page::new(12, 9, 5);
        assert_eq!(page.number, 3);
        assert_eq!(Page::new(12, 0, 5).number, 1);
    }

    #[test]
    fn empty_results_have_one_empty_page() {
        let page = Page::new(0, 4, 5);
        assert_eq!(page.number, 1);
        assert_eq!(page.count, 1);
        assert_eq!(page.range(), 0..0);
    }
}

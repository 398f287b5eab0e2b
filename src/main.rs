//! # hitkit
//!
//! Tools for crowdsourced annotation tasks (HITs): packing items into fixed-size bundles with
//! gold items mixed in, bursting downloaded results back into items,
//! aggregating or scoring worker answers, and preparing standoff annotations for review tasks.
//!
//! ## Getting started
//!
//! ```sh
//! hitkit 0.1.0
//! crowdsourced annotation HIT tools.
//!
//! USAGE:
//!     hitkit [FLAGS] <SUBCOMMAND>
//!
//! FLAGS:
//!     -h, --help       Prints help information
//!     -V, --version    Prints version information
//!     -v, --verbose    more verbose output (repeat for more). RUST_LOG takes precedence.
//!
//! SUBCOMMANDS:
//!     aggregate    Aggregate yes/no responses with naive Bayes
//!     bundle       Bundle JSON items into fixed size HITs, with optional gold items
//!     conjoin      Conjoin the concept IDs of the annotations of each document
//!     help         Prints this message or the help of the given subcommand(s)
//!     merge        Merge standoff annotations into per-document JSON records
//!     score        Score responses against reference answers
//!     unbundle     Burst downloaded HIT results back into items
//! ```
//!
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use env_logger::Env;
use itertools::iproduct;
use structopt::StructOpt;

use hitkit::aggregate::{self, NaiveBayes, ResponseFields};
use hitkit::annotations::{self, Annotation};
use hitkit::bundling::{Bundler, BundlerConfig};
use hitkit::error::Error;
use hitkit::gold;
use hitkit::io::reader::{BatchReader, JsonItemReader, TabItemReader};
use hitkit::io::writer::{write_items, BundleCsvWriter, ItemWriter, JsonItemWriter, TabItemWriter};
use hitkit::io::{open_input, open_output};
use hitkit::item::{Item, ITEM_ID};
use hitkit::scoring;
use hitkit::unbundling::Unbundler;

#[macro_use]
extern crate log;

mod cli;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
}

/// Read items, either JSON lines or tab-separated with a header row.
fn read_items(reader: Box<dyn BufRead>, tsv: bool) -> Result<Vec<Item>, Error> {
    if !tsv {
        return JsonItemReader::new(reader).collect();
    }
    TabItemReader::new(reader)?
        .enumerate()
        .map(|(idx, item)| {
            let mut item = item?;
            if item.normalize_id() {
                Ok(item)
            } else {
                Err(Error::MissingField {
                    // header is line 1
                    line: idx + 2,
                    field: ITEM_ID.to_string(),
                })
            }
        })
        .collect()
}

/// Read records from every file in `paths`, or from stdin when there are none.
fn read_records(paths: &[PathBuf], tsv: bool) -> Result<Vec<Item>, Error> {
    let readers = if paths.is_empty() {
        vec![open_input(None)?]
    } else {
        paths
            .iter()
            .map(|p| open_input(Some(p.as_path())))
            .collect::<Result<Vec<_>, Error>>()?
    };

    let mut records = Vec::new();
    for reader in readers {
        if tsv {
            for record in TabItemReader::new(reader)? {
                records.push(record?);
            }
        } else {
            for record in JsonItemReader::records(reader) {
                records.push(record?);
            }
        }
    }
    Ok(records)
}

/// Suffixed field names (`field_1`..`field_n`) for every field.
fn suffixed_fields(fields: &[String], n: usize) -> HashSet<String> {
    iproduct!(fields.iter(), 1..=n)
        .map(|(field, position)| format!("{}_{}", field, position))
        .collect()
}

fn bundle(b: cli::Bundle) -> Result<(), Error> {
    let mut items = read_items(open_input(b.src.as_deref())?, b.tsv)?;
    info!("read {} items", items.len());
    if b.unique {
        items = gold::uniquify(items);
    }

    let (items, controls, control_rate) = match &b.gold {
        Some(path) => {
            let gold_ids = gold::read_gold_ids(open_input(Some(path.as_path()))?)?;
            let split = gold::separate_gold(items, &gold_ids);
            if !b.random {
                warn!("--random not specified, gold items will be in predictable positions");
            }
            let rate = gold::compute_gold_rate(b.gold_rate.as_deref(), b.n)?;
            (split.straw, split.gold, rate)
        }
        None => {
            if b.gold_rate.is_some() {
                warn!("--goldrate ignored without --gold");
            }
            (items, Vec::new(), 0.0)
        }
    };

    let config = BundlerConfig {
        size: b.n,
        control_rate,
        randomize: b.random,
        item_suffix: true,
        seed: b.seed,
    };
    let bundler = Bundler::new(items, controls, &config)?;
    let records: Vec<Item> = bundler.map(|bundle| bundle.into_record()).collect();

    let mut writer = BundleCsvWriter::new(
        open_output(b.output.as_deref())?,
        suffixed_fields(&b.jsonize, b.n),
        suffixed_fields(&b.htmlize, b.n),
    );
    writer.write_all(&records)
}

fn unbundle(u: cli::Unbundle) -> Result<(), Error> {
    let batch = BatchReader::new(open_input(u.src.as_deref())?)?;
    let unbundler = Unbundler::new(u.plain, u.add_seq);

    let handle = open_output(u.output.as_deref())?;
    let mut writer: Box<dyn ItemWriter> = if u.json {
        Box::new(JsonItemWriter::new(handle))
    } else {
        Box::new(TabItemWriter::new(handle))
    };
    let nb = write_items(writer.as_mut(), unbundler.unbundle_all(batch))?;
    info!("wrote {} items", nb);
    Ok(())
}

fn aggregate(a: cli::Aggregate) -> Result<(), Error> {
    let fields = ResponseFields {
        item_ref: a.item_ref,
        answer_ref: a.answer_ref,
        yes: a.yes,
        missing: a.missing,
    };

    let keys = match &a.key {
        Some(path) => aggregate::read_key(open_input(Some(path.as_path()))?, &fields.yes)?,
        None => HashMap::new(),
    };
    if let Some(path) = &a.controls {
        let control_ids = aggregate::read_id_list(open_input(Some(path.as_path()))?)?;
        aggregate::check_controls(&control_ids, &keys);
    }

    let records = read_records(&a.src, false)?;
    let mut responses = aggregate::to_responses(records.into_iter().map(Ok), &fields)?;
    if let Some(path) = &a.item_ids {
        let item_ids = aggregate::read_id_list(open_input(Some(path.as_path()))?)?;
        if item_ids.is_empty() {
            return Err(Error::Config(format!(
                "no item IDs in {}",
                path.display()
            )));
        }
        responses = aggregate::restrict(responses, &item_ids);
    }

    let nb = NaiveBayes::train(&keys, &responses);
    let mut writer = JsonItemWriter::new(open_output(a.output.as_deref())?);
    for aggregated in nb.aggregate(&responses, a.log_prior) {
        writer.write_item(&aggregated.to_item(&fields))?;
    }
    writer.flush()
}

fn score(s: cli::Score) -> Result<(), Error> {
    let records = read_records(&s.src, s.tsv)?;
    let responses = scoring::to_scored_responses(
        records.into_iter().map(Ok),
        &s.item_ref,
        &s.answer_ref,
        s.abstain.as_deref(),
    )?;
    let (references, _) = scoring::read_references(open_input(Some(s.references.as_path()))?)?;
    let pr_answers: HashSet<String> = s.pr.split_whitespace().map(str::to_string).collect();

    let report = scoring::score(&responses, &references, &pr_answers);
    let mut out = open_output(None)?;
    write!(out, "{}", report)?;
    if s.inter {
        let pairs = scoring::interannotator(&responses);
        write!(out, "{}", scoring::AgreementTable(&pairs))?;
    }
    out.flush()?;
    Ok(())
}

/// Read annotations from every file in `paths`, or from stdin when there are none.
fn read_annotations(paths: &[PathBuf]) -> Result<Vec<Annotation>, Error> {
    if paths.is_empty() {
        return annotations::read_annotations(open_input(None)?);
    }
    let mut all = Vec::new();
    for path in paths {
        all.extend(annotations::read_annotations(open_input(Some(path.as_path()))?)?);
    }
    Ok(all)
}

fn merge(m: cli::Merge) -> Result<(), Error> {
    let docs = annotations::read_docs(open_input(Some(m.docs.as_path()))?)?;
    info!("read {} documents", docs.len());
    let standoff = read_annotations(&m.src)?;
    info!("read {} annotations", standoff.len());

    let docs = annotations::merge_annotations(docs, &standoff, m.glosses)?;
    let mut out = open_output(m.output.as_deref())?;
    annotations::write_documents(&mut out, &docs)?;
    out.flush()?;
    Ok(())
}

fn conjoin(c: cli::Conjoin) -> Result<(), Error> {
    let mut standoff = read_annotations(&c.src)?;
    annotations::conjoin_concepts(&mut standoff, &c.delimiter);
    let mut out = open_output(c.output.as_deref())?;
    annotations::write_annotations(&mut out, &standoff)?;
    out.flush()?;
    Ok(())
}

fn main() -> Result<(), Error> {
    let opt = cli::Hitkit::from_args();
    init_logging(opt.verbose);
    debug!("cli args\n{:#?}", opt);

    match opt.cmd {
        cli::Command::Bundle(b) => bundle(b)?,
        cli::Command::Unbundle(u) => unbundle(u)?,
        cli::Command::Aggregate(a) => aggregate(a)?,
        cli::Command::Score(s) => score(s)?,
        cli::Command::Merge(m) => merge(m)?,
        cli::Command::Conjoin(c) => conjoin(c)?,
    };
    Ok(())
}

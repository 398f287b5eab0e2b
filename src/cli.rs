//! Command line arguments and parameters management/parsing.
use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "hitkit", about = "crowdsourced annotation HIT tools.")]
pub struct Hitkit {
    #[structopt(
        short = "v",
        long = "verbose",
        parse(from_occurrences),
        help = "more verbose output (repeat for more). RUST_LOG takes precedence."
    )]
    pub verbose: u8,
    #[structopt(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, StructOpt)]
/// Holds every command that is callable by the `hitkit` command.
pub enum Command {
    #[structopt(about = "Bundle JSON items into fixed size HITs, with optional gold items")]
    Bundle(Bundle),
    #[structopt(about = "Burst downloaded HIT results back into items")]
    Unbundle(Unbundle),
    #[structopt(about = "Aggregate yes/no responses with naive Bayes")]
    Aggregate(Aggregate),
    #[structopt(about = "Score responses against reference answers")]
    Score(Score),
    #[structopt(about = "Merge standoff annotations into per-document JSON records")]
    Merge(Merge),
    #[structopt(about = "Conjoin the concept IDs of the annotations of each document")]
    Conjoin(Conjoin),
}

#[derive(Debug, StructOpt)]
/// Bundle command and parameters.
///
/// ```sh
/// USAGE:
///     hitkit bundle [FLAGS] [OPTIONS] [src]
///
/// FLAGS:
///     -r, --random    randomize items across HITs
///     -u, --unique    drop duplicate items
///
/// OPTIONS:
///     -n <n>                   number of items per HIT [default: 2]
///         --gold <gold>        gold-standard item ids
///         --goldrate <rate>    how much gold to insert into each HIT
///     -o, --output <output>    write HITs to file
/// ```
pub struct Bundle {
    #[structopt(parse(from_os_str), help = "JSON lines items (default: stdin)")]
    pub src: Option<PathBuf>,
    #[structopt(short = "n", default_value = "2", help = "number of items per HIT")]
    pub n: usize,
    #[structopt(short = "r", long = "random", help = "randomize items across HITs")]
    pub random: bool,
    #[structopt(long = "seed", help = "seed for randomization")]
    pub seed: Option<u64>,
    #[structopt(
        long = "gold",
        parse(from_os_str),
        help = "gold-standard item ids, one per line"
    )]
    pub gold: Option<PathBuf>,
    #[structopt(
        long = "goldrate",
        help = "how much gold to insert into each HIT: a fraction, or a number of items per HIT"
    )]
    pub gold_rate: Option<String>,
    #[structopt(
        short = "o",
        long = "output",
        parse(from_os_str),
        help = "write HITs to file (default: stdout)"
    )]
    pub output: Option<PathBuf>,
    #[structopt(long = "jsonize", number_of_values = 1, help = "encode FIELD as JSON")]
    pub jsonize: Vec<String>,
    #[structopt(
        long = "htmlize",
        number_of_values = 1,
        help = "encode FIELD using HTML numeric char refs"
    )]
    pub htmlize: Vec<String>,
    #[structopt(short = "u", long = "unique", help = "drop duplicate items")]
    pub unique: bool,
    #[structopt(long = "tsv", help = "input is tab-separated, with a header row")]
    pub tsv: bool,
}

#[derive(Debug, StructOpt)]
/// Unbundle command and parameters.
pub struct Unbundle {
    #[structopt(parse(from_os_str), help = "batch results CSV (default: stdin)")]
    pub src: Option<PathBuf>,
    #[structopt(
        long = "plain",
        help = "burst keys that end in digits. Default is to burst keys that end in underscore-digits"
    )]
    pub plain: bool,
    #[structopt(long = "addseq", help = "add a sequence ID to the burst items")]
    pub add_seq: bool,
    #[structopt(long = "json", help = "produce JSON output rather than tab-separated")]
    pub json: bool,
    #[structopt(
        short = "o",
        long = "output",
        parse(from_os_str),
        help = "output file (default: stdout)"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Debug, StructOpt)]
/// Aggregate command and parameters.
pub struct Aggregate {
    #[structopt(parse(from_os_str), help = "JSON lines response files (default: stdin)")]
    pub src: Vec<PathBuf>,
    #[structopt(
        short = "k",
        long = "key",
        parse(from_os_str),
        help = "tab-separated key file"
    )]
    pub key: Option<PathBuf>,
    #[structopt(
        long = "itemids",
        parse(from_os_str),
        help = "item IDs to include (all by default)"
    )]
    pub item_ids: Option<PathBuf>,
    #[structopt(
        long = "controls",
        parse(from_os_str),
        help = "file of item IDs used as controls (default: keyed items)"
    )]
    pub controls: Option<PathBuf>,
    #[structopt(long = "itemref", default_value = "Input.itemID", help = "item ID field")]
    pub item_ref: String,
    #[structopt(long = "answerref", default_value = "Answer.answer", help = "answer field")]
    pub answer_ref: String,
    #[structopt(
        long = "yes",
        default_value = "yes",
        help = "value read as \"yes\", all others being \"no\""
    )]
    pub yes: String,
    #[structopt(long = "missing", help = "value for missing answers (default: skip them)")]
    pub missing: Option<String>,
    #[structopt(
        long = "logprior",
        default_value = "0.0",
        help = "prior (logit) in the naive Bayes summation"
    )]
    pub log_prior: f64,
    #[structopt(
        short = "o",
        long = "output",
        parse(from_os_str),
        help = "output file (default: stdout)"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Debug, StructOpt)]
/// Score command and parameters.
pub struct Score {
    #[structopt(parse(from_os_str), help = "response files (default: stdin)")]
    pub src: Vec<PathBuf>,
    #[structopt(
        long = "references",
        parse(from_os_str),
        help = "reference answers, `id answer` per line"
    )]
    pub references: PathBuf,
    #[structopt(long = "tsv", help = "responses are tab-separated")]
    pub tsv: bool,
    #[structopt(long = "abstain", help = "interpret no answer as NOANSWER")]
    pub abstain: Option<String>,
    #[structopt(long = "items", default_value = "Input.itemID", help = "item ID field")]
    pub item_ref: String,
    #[structopt(long = "answers", default_value = "Answer.answer", help = "answer field")]
    pub answer_ref: String,
    #[structopt(
        long = "pr",
        default_value = "",
        help = "report precision, recall and F-measure for these (space-separated) true labels"
    )]
    pub pr: String,
    #[structopt(long = "inter", help = "report simple inter-annotator agreement")]
    pub inter: bool,
}

#[derive(Debug, StructOpt)]
/// Merge command and parameters.
///
/// ```sh
/// USAGE:
///     hitkit merge [FLAGS] [OPTIONS] --docs <docs> <src>...
///
/// FLAGS:
///         --glosses    pick a representative string for each annotation group
///
/// OPTIONS:
///         --docs <docs>        document IDs and filenames, one pair per line
///     -o, --output <output>    output file (default: stdout)
/// ```
pub struct Merge {
    #[structopt(
        parse(from_os_str),
        required = true,
        min_values = 1,
        help = "tab-separated annotation files"
    )]
    pub src: Vec<PathBuf>,
    #[structopt(
        long = "docs",
        parse(from_os_str),
        help = "document IDs and filenames, one pair per line"
    )]
    pub docs: PathBuf,
    #[structopt(
        long = "glosses",
        help = "pick a representative string for each annotation group"
    )]
    pub glosses: bool,
    #[structopt(
        short = "o",
        long = "output",
        parse(from_os_str),
        help = "output file (default: stdout)"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Debug, StructOpt)]
/// Conjoin command and parameters.
pub struct Conjoin {
    #[structopt(parse(from_os_str), help = "tab-separated annotation files (default: stdin)")]
    pub src: Vec<PathBuf>,
    #[structopt(
        long = "delimiter",
        default_value = "/",
        help = "string joining the concept IDs"
    )]
    pub delimiter: String,
    #[structopt(
        short = "o",
        long = "output",
        parse(from_os_str),
        help = "output file (default: stdout)"
    )]
    pub output: Option<PathBuf>,
}

use std::collections::{HashMap, HashSet};

use hitkit::bundling::{Bundle, Bundler, BundlerConfig};
use hitkit::gold::{compute_gold_rate, read_gold_ids, separate_gold, uniquify};
use hitkit::io::reader::{BatchReader, JsonItemReader};
use hitkit::io::writer::BundleCsvWriter;
use hitkit::item::{Item, IS_GOLD};
use hitkit::unbundling::{Unbundler, SEQUENCE_ID};

fn jsonl_items(nb: usize) -> String {
    (0..nb)
        .map(|i| format!("{{\"itemID\": {}, \"text\": \"phrase numéro {}\"}}\n", i, i))
        .collect()
}

fn read(input: &str) -> Vec<Item> {
    JsonItemReader::new(input.as_bytes())
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn gold_is_mixed_in() {
    let items = read(&jsonl_items(20));
    let gold_ids = read_gold_ids("1\n2\nabsent\n".as_bytes()).unwrap();
    let split = separate_gold(items, &gold_ids);
    assert_eq!(split.gold.len(), 2);
    assert_eq!(split.straw.len(), 18);
    assert_eq!(split.missing, vec!["absent".to_string()]);

    let rate = compute_gold_rate(None, 4).unwrap();
    let config = BundlerConfig {
        size: 4,
        control_rate: rate,
        randomize: true,
        item_suffix: true,
        seed: Some(1234),
    };
    let mut bundler = Bundler::new(split.straw, split.gold, &config).unwrap();
    let bundles: Vec<Bundle> = bundler.by_ref().collect();

    // 18 / (0.75 * 4) = 6 bundles, 6 gold slots
    assert_eq!(bundles.len(), 6);
    assert_eq!(bundler.stats().controls_used, 6);
    for bundle in &bundles {
        for pos in bundle.control_positions() {
            let key = format!("{}_{}", IS_GOLD, pos);
            assert!(bundle.record().contains_key(&key));
        }
    }
}

#[test]
fn duplicates_are_dropped_before_bundling() {
    let mut input = jsonl_items(4);
    input.push_str(&jsonl_items(2));
    let items = uniquify(read(&input));
    assert_eq!(items.len(), 4);

    let config = BundlerConfig::default();
    let bundles: Vec<Bundle> = Bundler::new(items, Vec::new(), &config)
        .unwrap()
        .collect();
    assert_eq!(bundles.len(), 2);
}

#[test]
fn csv_round_trip() {
    let items = read(&jsonl_items(6));
    let originals: HashMap<String, Item> = items
        .iter()
        .map(|item| (item.id().unwrap(), item.clone()))
        .collect();

    let config = BundlerConfig {
        size: 3,
        ..Default::default()
    };
    let records: Vec<Item> = Bundler::new(items, Vec::new(), &config)
        .unwrap()
        .map(Bundle::into_record)
        .collect();

    let mut csv = Vec::new();
    BundleCsvWriter::new(&mut csv, HashSet::new(), HashSet::new())
        .write_all(&records)
        .unwrap();

    let unbundler = Unbundler::new(false, true);
    let batch = BatchReader::new(csv.as_slice()).unwrap();
    let burst: Vec<Item> = unbundler
        .unbundle_all(batch)
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(burst.len(), 6);
    for item in &burst {
        let id = item.id().unwrap();
        let original = &originals[&id];
        assert_eq!(item.get_str("text"), original.get_str("text"));
        assert!(item.contains_key(SEQUENCE_ID));
    }
}

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use hitkit::bundling::{adjust_control_rate, Bundle, Bundler, BundlerConfig};
use hitkit::item::Item;

const RATES: [f64; 7] = [0.0, 0.1, 0.2, 0.25, 1.0 / 3.0, 0.5, 0.75];

fn items(prefix: &str, nb: usize) -> Vec<Item> {
    (0..nb)
        .map(|i| {
            serde_json::from_value(json!({
                "itemID": format!("{}{}", prefix, i),
                "text": format!("{} number {}", prefix, i + 1),
            }))
            .unwrap()
        })
        .collect()
}

fn ids(bundle: &Bundle) -> Vec<String> {
    (1..=bundle.size())
        .map(|pos| {
            bundle
                .record()
                .get_str(&format!("itemID_{}", pos))
                .unwrap()
                .to_string()
        })
        .collect()
}

/// Random valid configuration: (test items, controls, config).
fn random_setup(rng: &mut StdRng) -> (usize, usize, BundlerConfig) {
    let size = rng.gen_range(1..=6);
    let nb_items = rng.gen_range(1..80);
    let nb_controls = rng.gen_range(1..5);
    let control_rate = RATES[rng.gen_range(0..RATES.len())];
    let config = BundlerConfig {
        size,
        control_rate,
        randomize: rng.gen_bool(0.5),
        item_suffix: true,
        seed: Some(rng.gen()),
    };
    (nb_items, nb_controls, config)
}

#[test]
fn exact_fill() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..200 {
        let (nb_items, nb_controls, config) = random_setup(&mut rng);
        let mut bundler =
            Bundler::new(items("t", nb_items), items("c", nb_controls), &config).unwrap();
        let bundles: Vec<Bundle> = bundler.by_ref().collect();

        for bundle in &bundles {
            assert_eq!(bundle.size(), config.size);
            assert_eq!(bundle.record().len(), 2 * config.size);
        }
        let stats = bundler.stats();
        assert_eq!(stats.bundles, bundles.len());
        assert_eq!(
            stats.bundles * config.size,
            stats.items_used + stats.controls_used,
            "{:?}",
            config
        );
        if let Some(adj) = adjust_control_rate(nb_items, config.size, config.control_rate).unwrap() {
            assert_eq!(stats.bundles, adj.bundles, "{:?}", config);
            assert_eq!(stats.controls_used, adj.controls, "{:?}", config);
        }
    }
}

#[test]
fn no_item_loss_or_duplication() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let (nb_items, nb_controls, config) = random_setup(&mut rng);
        let bundler =
            Bundler::new(items("t", nb_items), items("c", nb_controls), &config).unwrap();

        let mut seen: HashMap<String, usize> = HashMap::new();
        for bundle in bundler {
            for id in ids(&bundle) {
                *seen.entry(id).or_default() += 1;
            }
        }
        for i in 0..nb_items {
            assert_eq!(seen.get(&format!("t{}", i)), Some(&1), "{:?}", config);
        }
        assert!(seen.keys().all(|id| id.starts_with('t') || id.starts_with('c')));
    }
}

#[test]
fn control_positions_point_to_controls() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..100 {
        let (nb_items, nb_controls, config) = random_setup(&mut rng);
        let bundler =
            Bundler::new(items("t", nb_items), items("c", nb_controls), &config).unwrap();
        for bundle in bundler {
            let ids = ids(&bundle);
            for (idx, id) in ids.iter().enumerate() {
                let is_control = bundle.control_positions().contains(&(idx + 1));
                assert_eq!(is_control, id.starts_with('c'));
            }
        }
    }
}

#[test]
fn running_share_tracks_rate() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..100 {
        let (nb_items, nb_controls, mut config) = random_setup(&mut rng);
        if config.control_rate == 0.0 {
            config.control_rate = 0.25;
        }
        let mut bundler =
            Bundler::new(items("t", nb_items), items("c", nb_controls), &config).unwrap();
        let rate = bundler.control_rate();
        while bundler.next().is_some() {
            let stats = *bundler.stats();
            let slots = (stats.bundles * config.size) as f64;
            let deviation = stats.controls_used as f64 - rate * slots;
            assert!(deviation.abs() <= 1.0 + 1e-9, "{:?} {:?}", config, stats);
        }
    }
}

#[test]
fn single_control_reused() {
    let config = BundlerConfig {
        size: 3,
        control_rate: 5.0 / 12.0,
        ..Default::default()
    };
    let mut bundler = Bundler::new(items("t", 7), items("c", 1), &config).unwrap();
    let controls: usize = bundler
        .by_ref()
        .map(|b| ids(&b).iter().filter(|id| *id == "c0").count())
        .sum();
    assert_eq!(controls, 5);
    assert_eq!(bundler.stats().controls_used, 5);
    assert_eq!(bundler.stats().bundles, 4);
}

#[test]
fn unsuffixed_passthrough() {
    let config = BundlerConfig {
        size: 1,
        item_suffix: false,
        ..Default::default()
    };
    let input = items("t", 3);
    let bundles: Vec<Item> = Bundler::new(input.clone(), Vec::new(), &config)
        .unwrap()
        .map(Bundle::into_record)
        .collect();
    assert_eq!(bundles, input);
}

#[test]
fn deterministic_without_randomization() {
    let config = BundlerConfig {
        size: 3,
        control_rate: 0.25,
        ..Default::default()
    };
    let run = || -> Vec<Vec<String>> {
        Bundler::new(items("t", 9), items("c", 2), &config)
            .unwrap()
            .map(|b| ids(&b))
            .collect()
    };
    assert_eq!(run(), run());
}

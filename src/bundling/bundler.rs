//! Fixed-size bundling with control injection.
//!
//! Test items are drained one at a time and each of them lands in exactly one bundle.
//! Control items are drawn from an endless cycle over the control pool, whenever the share of
//! controls used so far falls behind the target rate.
//!
//! The target rate is adjusted once, upfront, so that the last bundle ends up exactly full:
//! ```text
//! bundles  = items / ((1 - rate) * size)        // rounded up when fractional
//! controls = bundles * size - items
//! rate     = controls / (bundles * size)
//! ```
use std::collections::VecDeque;
use std::fmt;

use log::{debug, info, log_enabled, trace, Level};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::bundling::ControlCycle;
use crate::error::Error;
use crate::item::Item;

/// Tolerance used when checking whether the expected number of bundles is integral.
const BUNDLE_COUNT_TOLERANCE: f64 = 0.001;

/// Bundling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BundlerConfig {
    /// Number of items in each bundle.
    pub size: usize,
    /// Requested fraction of bundle slots holding control items.
    pub control_rate: f64,
    /// Shuffle both pools beforehand, and items inside each bundle.
    pub randomize: bool,
    /// Append `_<position>` to field names. Only `size == 1` can go without.
    pub item_suffix: bool,
    /// Seed for the shuffling RNG. Entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            size: 2,
            control_rate: 0.0,
            randomize: false,
            item_suffix: true,
            seed: None,
        }
    }
}

/// Outcome of the upfront control rate adjustment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateAdjustment {
    pub requested: f64,
    pub effective: f64,
    /// Expected number of bundles.
    pub bundles: usize,
    /// Expected number of control slots over the whole run.
    pub controls: usize,
}

impl RateAdjustment {
    pub fn is_adjusted(&self) -> bool {
        self.requested != self.effective
    }

    fn slots(&self, bundle_size: usize) -> usize {
        self.bundles * bundle_size
    }
}

/// Compute the control rate that fills the last bundle exactly.
///
/// Returns [None] when there is nothing to adjust (zero rate, or no test items).
/// Fails when the expected number of slots does not fit in a `usize`, which happens for rates
/// very close to 1.
pub fn adjust_control_rate(
    test_items: usize,
    bundle_size: usize,
    control_rate: f64,
) -> Result<Option<RateAdjustment>, Error> {
    if control_rate == 0.0 || test_items == 0 {
        return Ok(None);
    }

    let too_many_slots = || {
        Error::Config(format!(
            "control rate {} needs too many {}-bundles for {} items",
            control_rate, bundle_size, test_items
        ))
    };
    let raw_bundles = test_items as f64 / ((1.0 - control_rate) * bundle_size as f64);
    if !raw_bundles.is_finite() || raw_bundles >= usize::MAX as f64 {
        return Err(too_many_slots());
    }

    if (raw_bundles - raw_bundles.round()).abs() <= BUNDLE_COUNT_TOLERANCE {
        let bundles = raw_bundles.round() as usize;
        let total_items = bundles
            .checked_mul(bundle_size)
            .ok_or_else(too_many_slots)?;
        return Ok(Some(RateAdjustment {
            requested: control_rate,
            effective: control_rate,
            bundles,
            controls: total_items.saturating_sub(test_items),
        }));
    }

    debug!("expected number of bundles is fractional ({:.3})", raw_bundles);
    let bundles = raw_bundles.ceil() as usize;
    let total_items = bundles
        .checked_mul(bundle_size)
        .ok_or_else(too_many_slots)?;
    let controls = total_items - test_items;
    debug!("adjusting number of bundles to {}", bundles);
    debug!("adjusting number of total items to {}", total_items);
    debug!("adjusting number of control items to {}", controls);

    let effective = controls as f64 / total_items as f64;
    info!(
        "adjusting control rate from {} to {:.6}",
        control_rate, effective
    );

    Ok(Some(RateAdjustment {
        requested: control_rate,
        effective,
        bundles,
        controls,
    }))
}

/// Integer form of the control rate: `controls` control slots out of `slots`.
///
/// Keeping the rate as a ratio of integers makes the slot selection exact,
/// so the run ends on the expected slot count whatever the float rounding of the rate.
#[derive(Debug, Clone, Copy)]
struct ControlQuota {
    controls: u64,
    slots: u64,
}

impl ControlQuota {
    fn none() -> Self {
        Self {
            controls: 0,
            slots: 1,
        }
    }

    /// `controls_used < rate * (items_used + controls_used)`, evaluated before filling the slot.
    fn wants_control(&self, items_used: u64, controls_used: u64) -> bool {
        u128::from(controls_used) * u128::from(self.slots)
            < u128::from(self.controls) * u128::from(items_used + controls_used)
    }
}

/// Counts of a bundling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleStats {
    pub items_used: usize,
    /// Counts reuse of the same control.
    pub controls_used: usize,
    pub bundles: usize,
    pub bundle_size: usize,
}

impl fmt::Display for BundleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "combined {} items with {} controls into {} {}-bundles",
            self.items_used, self.controls_used, self.bundles, self.bundle_size
        )
    }
}

/// A full bundle: the flattened record and where the controls ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    record: Item,
    size: usize,
    control_positions: Vec<usize>,
}

impl Bundle {
    /// Flattened record, with `<field>_<position>` keys.
    pub fn record(&self) -> &Item {
        &self.record
    }

    pub fn into_record(self) -> Item {
        self.record
    }

    /// Number of constituent items.
    pub fn size(&self) -> usize {
        self.size
    }

    /// 1-based positions of control items in this bundle.
    pub fn control_positions(&self) -> &[usize] {
        &self.control_positions
    }
}

/// Flatten a list of items into one record, suffixing each field with the (1-based) item position.
pub fn assemble(members: Vec<Item>) -> Item {
    let mut record = Item::new();
    for (idx, item) in members.into_iter().enumerate() {
        item.merge_suffixed(idx + 1, &mut record);
    }
    record
}

/// Lazily yields [Bundle]s built from test and control items.
///
/// Fails at construction on invalid configurations; once built, bundling cannot fail.
pub struct Bundler {
    items: VecDeque<Item>,
    controls: ControlCycle,
    size: usize,
    item_suffix: bool,
    shuffle_bundles: bool,
    control_rate: f64,
    adjustment: Option<RateAdjustment>,
    quota: ControlQuota,
    rng: StdRng,
    stats: BundleStats,
    done: bool,
}

impl Bundler {
    /// Validate the configuration, shuffle pools if asked to, and adjust the control rate.
    pub fn new(items: Vec<Item>, controls: Vec<Item>, config: &BundlerConfig) -> Result<Self, Error> {
        validate(&items, &controls, config)?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut items = items;
        let mut controls = controls;
        if config.randomize {
            items.shuffle(&mut rng);
            controls.shuffle(&mut rng);
        }

        let adjustment = adjust_control_rate(items.len(), config.size, config.control_rate)?;
        let (control_rate, quota) = match adjustment {
            Some(adj) => (
                adj.effective,
                ControlQuota {
                    controls: adj.controls as u64,
                    slots: adj.slots(config.size).max(1) as u64,
                },
            ),
            None => (config.control_rate, ControlQuota::none()),
        };
        assert!(
            (0.0..=1.0).contains(&control_rate),
            "adjusted control rate {} out of [0, 1]",
            control_rate
        );

        Ok(Self {
            items: items.into(),
            controls: ControlCycle::new(controls),
            size: config.size,
            item_suffix: config.item_suffix,
            shuffle_bundles: config.randomize && control_rate > 0.0,
            control_rate,
            adjustment,
            quota,
            rng,
            stats: BundleStats {
                bundle_size: config.size,
                ..Default::default()
            },
            done: false,
        })
    }

    /// Effective control rate, after adjustment.
    pub fn control_rate(&self) -> f64 {
        self.control_rate
    }

    pub fn adjustment(&self) -> Option<&RateAdjustment> {
        self.adjustment.as_ref()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Counts so far. Final once the iterator is exhausted.
    pub fn stats(&self) -> &BundleStats {
        &self.stats
    }

    /// Test items not bundled yet.
    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    fn next_control(&mut self) -> Item {
        match self.controls.next() {
            Some(control) => control,
            None => panic!("control pool exhausted: configuration should have been rejected"),
        }
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            assert!(self.items.is_empty(), "test items left after bundling");
            info!("{}", self.stats);
        }
    }
}

fn validate(items: &[Item], controls: &[Item], config: &BundlerConfig) -> Result<(), Error> {
    if config.size == 0 {
        return Err(Error::Config("bundle size must be at least 1".to_string()));
    }
    if !config.item_suffix && config.size != 1 {
        return Err(Error::Config(format!(
            "unsuffixed bundling requires a bundle size of 1 (got {})",
            config.size
        )));
    }
    let rate = config.control_rate;
    if !(0.0..=1.0).contains(&rate) {
        return Err(Error::Config(format!(
            "control rate {} is not in [0, 1]",
            rate
        )));
    }
    if rate > 0.0 && controls.is_empty() {
        return Err(Error::Config(format!(
            "control rate is {} but there are no control items",
            rate
        )));
    }
    if rate >= 1.0 && !items.is_empty() {
        return Err(Error::Config(
            "a control rate of 1 leaves no room for test items".to_string(),
        ));
    }
    if rate == 0.0 && controls.is_empty() && items.len() % config.size != 0 {
        return Err(Error::Config(format!(
            "{} items cannot fill {}-bundles without control items",
            items.len(),
            config.size
        )));
    }
    Ok(())
}

impl Iterator for Bundler {
    type Item = Bundle;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.items.is_empty() {
            self.finish();
            return None;
        }

        // (is_control, item)
        let mut members: Vec<(bool, Item)> = Vec::with_capacity(self.size);
        while members.len() < self.size {
            let items_used = self.stats.items_used as u64;
            let controls_used = self.stats.controls_used as u64;
            if items_used + controls_used > 0 {
                trace!(
                    "{} / ({} + {}) = {:.12} <?> {:.12}",
                    controls_used,
                    items_used,
                    controls_used,
                    controls_used as f64 / (items_used + controls_used) as f64,
                    self.control_rate
                );
            }

            let item = if self.quota.wants_control(items_used, controls_used)
                || self.items.is_empty()
            {
                self.stats.controls_used += 1;
                (true, self.next_control())
            } else {
                match self.items.pop_front() {
                    Some(item) => {
                        self.stats.items_used += 1;
                        (false, item)
                    }
                    None => unreachable!("test pool checked non-empty"),
                }
            };
            members.push(item);
        }

        if log_enabled!(Level::Trace) {
            trace!("{:?}", members);
        }
        if self.shuffle_bundles {
            members.shuffle(&mut self.rng);
        }

        let control_positions = members
            .iter()
            .enumerate()
            .filter(|(_, (is_control, _))| *is_control)
            .map(|(idx, _)| idx + 1)
            .collect();
        let size = members.len();
        let mut items = members.into_iter().map(|(_, item)| item);
        let record = if self.item_suffix {
            assemble(items.collect())
        } else {
            // size is 1 here
            items.next().unwrap_or_default()
        };

        self.stats.bundles += 1;
        if self.items.is_empty() {
            self.finish();
        }

        Some(Bundle {
            record,
            size,
            control_positions,
        })
    }
}

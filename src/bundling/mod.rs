/*! Bundling

Packs items into fixed-size work units (bundles), injecting control items at a target rate.

Each bundle is flattened into a single record where every field name gets the position of its item
appended (`text` of the second item becomes `text_2`), which is what crowdsourcing platforms expect
from multi-item tasks.
!*/
mod bundler;
mod control_cycle;

pub use bundler::{
    adjust_control_rate, assemble, Bundle, BundleStats, Bundler, BundlerConfig, RateAdjustment,
};
pub use control_cycle::ControlCycle;

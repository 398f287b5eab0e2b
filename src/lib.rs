pub mod aggregate;
pub mod annotations;
pub mod bundling;
pub mod error;
pub mod gold;
pub mod io;
pub mod item;
pub mod scoring;
pub mod unbundling;

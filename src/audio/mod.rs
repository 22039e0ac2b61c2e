//! Audio decoding and stem handling

pub mod decode;
pub mod stems;
pub mod types;

pub use stems::{CommandSeparator, Separator, Stem, StemSet};
pub use types::{AudioSource, Bus, BusContent, BusLabel};

pub mod codec;
pub mod params;

pub use codec::{decode, encode, merge_into};
pub use params::ParamSet;

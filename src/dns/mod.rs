pub mod name;
pub mod wire;

pub use name::Fqdn;
pub use wire::{HEADER_BYTES, clamp_edns_size, name_from_query, set_truncated, txid};

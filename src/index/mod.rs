mod hash_index;

pub use hash_index::HashIndex;

//! Resolve IP addresses to profile offsets through bit-packed component
//! graphs.
//!
//! A data set carries an array of *component graphs*, one per
//! (IP version, component) pair, all sharing one underlying byte region.
//! Each graph is a compact decision structure: a stream of variable-width
//! bit-packed nodes, *spans* holding the low and high limits of a bit
//! range, and *clusters* mapping contiguous node ranges to span tables.
//! [`GraphArray`] loads such an array from memory or from a file and
//! resolves `(component id, address)` pairs to [`LookupResult`] offsets
//! into the profile or profile-group tables.
//!
//! The graph data is immutable after loading; a single [`GraphArray`] can
//! be shared by any number of concurrent evaluations.

pub use collection::{
    Collection, CollectionConfig, CollectionHeader, FileSource,
    MemoryReader, Window,
};
pub use graph::{ComponentGraph, GraphArray, LookupResult};
pub use types::{GraphError, IpAddress, IpType};

pub mod bits;
pub mod collection;
pub mod graph;
pub mod types;

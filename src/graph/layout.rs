//! Persisted record layouts and their decoded forms.
//!
//! All integer fields in the data set are little endian; only the node
//! stream is an MSB-first bitfield. The raw structs mirror the file byte
//! for byte and are read with zerocopy; the decoded forms carry native
//! integers with their load-time invariants already checked.

use std::mem;

use zerocopy::{
    FromBytes, Immutable, KnownLayout, LittleEndian, Unaligned, U16, U32,
    U64,
};

use crate::collection::CollectionHeader;
use crate::types::{GraphError, IpType};

/// Number of cluster local span index slots in a full cluster record.
pub(crate) const CLUSTER_SPAN_INDEXES: usize = 256;

/// Combined limit bit length up to which a span stores its limits inline
/// in the trail instead of in the span bytes pool.
pub(crate) const SPAN_INLINE_BITS: usize = 32;

//------------ Raw records ---------------------------------------------------

/// Mask and shift extracting one logical field from a node's 64 bit
/// view.
#[derive(Copy, Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct RawMember {
    mask: U64<LittleEndian>,
    shift: U64<LittleEndian>,
}

#[derive(Copy, Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct RawCollectionHeader {
    length: U32<LittleEndian>,
    count: U32<LittleEndian>,
    start: U32<LittleEndian>,
}

impl RawCollectionHeader {
    fn decode(self) -> CollectionHeader {
        CollectionHeader {
            start: self.start.into(),
            length: self.length.into(),
            count: self.count.into(),
        }
    }
}

#[derive(Copy, Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct RawNodeDescriptor {
    collection: RawCollectionHeader,
    record_size: U16<LittleEndian>,
    low_flag: RawMember,
    span_index: RawMember,
    value: RawMember,
}

#[derive(Copy, Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct RawGraphInfo {
    version: u8,
    component_id: u8,
    graph_index: U32<LittleEndian>,
    nodes: RawNodeDescriptor,
    spans: RawCollectionHeader,
    span_bytes: RawCollectionHeader,
    clusters: RawCollectionHeader,
    profile_count: U32<LittleEndian>,
    first_profile_index: U32<LittleEndian>,
    profile_group_count: U32<LittleEndian>,
    first_profile_group_index: U32<LittleEndian>,
}

#[derive(Copy, Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct RawSpan {
    length_low: u8,
    length_high: u8,
    trail: [u8; 4],
}

#[derive(FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct RawCluster {
    start: U32<LittleEndian>,
    end: U32<LittleEndian>,
    span_indexes: [U32<LittleEndian>; CLUSTER_SPAN_INDEXES],
}

/// Size in bytes of a full cluster record. Stored records may be
/// narrower, never wider.
pub(crate) const CLUSTER_SIZE: usize = mem::size_of::<RawCluster>();

//------------ Member --------------------------------------------------------

/// Extracts one logical field from a node's bits.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Member {
    mask: u64,
    shift: u32,
}

impl Member {
    fn decode(raw: RawMember) -> Result<Self, GraphError> {
        let shift = u64::from(raw.shift);
        if shift >= 64 {
            return Err(GraphError::CorruptData);
        }
        Ok(Member {
            mask: raw.mask.into(),
            shift: shift as u32,
        })
    }

    /// The field value for the node bits provided.
    #[inline]
    pub fn value_of(&self, bits: u64) -> u32 {
        ((bits & self.mask) >> self.shift) as u32
    }
}

//------------ NodeDescriptor ------------------------------------------------

/// Shape of the bit packed node stream: where it lives, how wide one
/// record is and how to extract the logical fields.
#[derive(Clone, Debug)]
pub(crate) struct NodeDescriptor {
    pub collection: CollectionHeader,
    pub record_size: u16,
    pub low_flag: Member,
    pub span_index: Member,
    pub value: Member,
}

impl NodeDescriptor {
    fn decode(raw: RawNodeDescriptor) -> Result<Self, GraphError> {
        let record_size = u16::from(raw.record_size);
        if record_size == 0 || record_size > 64 {
            return Err(GraphError::CorruptData);
        }
        Ok(NodeDescriptor {
            collection: raw.collection.decode(),
            record_size,
            low_flag: Member::decode(raw.low_flag)?,
            span_index: Member::decode(raw.span_index)?,
            value: Member::decode(raw.value)?,
        })
    }
}

//------------ GraphInfo -----------------------------------------------------

/// The decoded fixed width record describing one component graph.
#[derive(Clone, Debug)]
pub(crate) struct GraphInfo {
    pub ip_type: IpType,
    pub component_id: u8,
    /// Node index of the graph's root.
    pub graph_index: u32,
    pub nodes: NodeDescriptor,
    pub spans: CollectionHeader,
    pub span_bytes: CollectionHeader,
    pub clusters: CollectionHeader,
    pub profile_count: u32,
    pub first_profile_index: u32,
    pub profile_group_count: u32,
    pub first_profile_group_index: u32,
}

impl GraphInfo {
    pub fn decode(bytes: &[u8]) -> Result<Self, GraphError> {
        let (raw, _) = RawGraphInfo::read_from_prefix(bytes)
            .map_err(|_| GraphError::CorruptData)?;
        Ok(GraphInfo {
            ip_type: IpType::from_version(raw.version),
            component_id: raw.component_id,
            graph_index: raw.graph_index.into(),
            nodes: NodeDescriptor::decode(raw.nodes)?,
            spans: raw.spans.decode(),
            span_bytes: raw.span_bytes.decode(),
            clusters: raw.clusters.decode(),
            profile_count: raw.profile_count.into(),
            first_profile_index: raw.first_profile_index.into(),
            profile_group_count: raw.profile_group_count.into(),
            first_profile_group_index: raw.first_profile_group_index.into(),
        })
    }
}

//------------ Span ----------------------------------------------------------

/// A decoded span record: the two limit bit lengths and the trail, which
/// holds the concatenated limit bits inline when they fit in 32 bits and
/// a byte offset into the span bytes pool otherwise.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct Span {
    pub length_low: u8,
    pub length_high: u8,
    pub trail: [u8; 4],
}

impl Span {
    pub fn decode(bytes: &[u8]) -> Result<Self, GraphError> {
        let (raw, _) = RawSpan::read_from_prefix(bytes)
            .map_err(|_| GraphError::CorruptData)?;
        Ok(Span {
            length_low: raw.length_low,
            length_high: raw.length_high,
            trail: raw.trail,
        })
    }

    /// The larger of the two limit lengths: the number of address bits a
    /// comparison against this span looks at.
    pub fn max_length(&self) -> usize {
        usize::from(self.length_low.max(self.length_high))
    }

    /// Combined length of both limits.
    pub fn total_length(&self) -> usize {
        usize::from(self.length_low) + usize::from(self.length_high)
    }

    /// The trail as an offset into the span bytes pool.
    pub fn trail_offset(&self) -> u32 {
        u32::from_le_bytes(self.trail)
    }
}

//------------ Cluster -------------------------------------------------------

/// A decoded cluster: an inclusive node index range and the table
/// resolving cluster local span indexes to global ones.
#[derive(Copy, Clone)]
pub(crate) struct Cluster {
    pub start: u32,
    pub end: u32,
    pub span_indexes: [u32; CLUSTER_SPAN_INDEXES],
}

impl Cluster {
    /// Decodes a stored record, zero extending records narrower than the
    /// full layout.
    pub fn decode(bytes: &[u8]) -> Result<Self, GraphError> {
        if bytes.len() > CLUSTER_SIZE {
            return Err(GraphError::CorruptData);
        }
        let mut padded = [0u8; CLUSTER_SIZE];
        padded[..bytes.len()].copy_from_slice(bytes);
        let raw = RawCluster::read_from_bytes(&padded)
            .map_err(|_| GraphError::CorruptData)?;
        let mut span_indexes = [0u32; CLUSTER_SPAN_INDEXES];
        for (dst, src) in span_indexes.iter_mut().zip(raw.span_indexes) {
            *dst = src.into();
        }
        Ok(Cluster {
            start: raw.start.into(),
            end: raw.end.into(),
            span_indexes,
        })
    }

    pub fn contains(&self, index: u32) -> bool {
        index >= self.start && index <= self.end
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Cluster {
            start: 0,
            end: 0,
            span_indexes: [0; CLUSTER_SPAN_INDEXES],
        }
    }
}

//! Synthetic graph fixtures for the integration tests.
//!
//! The builder serialises graph definitions into a data blob with the
//! same byte layout a production data set uses: an array of info
//! records followed by each graph's node stream, span records, span
//! bytes pool and cluster records. The per-graph regions are laid out in
//! reverse fixture order, so with more than one graph the info headers
//! point away from the reader's natural position and the loader's
//! save/seek/restore handling gets exercised.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use ipgraph::{
    Collection, CollectionConfig, CollectionHeader, FileSource, GraphArray,
    MemoryReader,
};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Size of one serialised info record.
pub const INFO_SIZE: usize = 120;

/// Node records are 24 bits: eight bits of cluster local span index, the
/// low flag, then fifteen bits of value.
pub const RECORD_SIZE: u16 = 24;

//------------ Fixture model -------------------------------------------------

pub struct Node {
    pub value: u32,
    pub low_flag: bool,
    pub span: u8,
}

pub fn node(value: u32, low_flag: bool, span: u8) -> Node {
    assert!(value < 1 << 15);
    Node {
        value,
        low_flag,
        span,
    }
}

#[derive(Copy, Clone)]
pub struct Limit {
    pub len: u8,
    pub bits: u128,
}

pub struct SpanDef {
    pub low: Limit,
    pub high: Limit,
}

pub fn span(
    low_len: u8,
    low_bits: u128,
    high_len: u8,
    high_bits: u128,
) -> SpanDef {
    SpanDef {
        low: Limit {
            len: low_len,
            bits: low_bits,
        },
        high: Limit {
            len: high_len,
            bits: high_bits,
        },
    }
}

pub struct ClusterDef {
    pub start: u32,
    pub end: u32,
    pub spans: Vec<u32>,
}

pub fn cluster(start: u32, end: u32, spans: Vec<u32>) -> ClusterDef {
    assert!(spans.len() <= 256);
    ClusterDef { start, end, spans }
}

pub struct GraphFixture {
    pub version: u8,
    pub component_id: u8,
    pub graph_index: u32,
    pub nodes: Vec<Node>,
    pub spans: Vec<SpanDef>,
    pub clusters: Vec<ClusterDef>,
    pub profile_count: u32,
    pub first_profile_index: u32,
    pub profile_group_count: u32,
    pub first_profile_group_index: u32,
}

impl GraphFixture {
    pub fn new(version: u8, component_id: u8) -> Self {
        GraphFixture {
            version,
            component_id,
            graph_index: 0,
            nodes: Vec::new(),
            spans: Vec::new(),
            clusters: Vec::new(),
            profile_count: 100,
            first_profile_index: 0,
            profile_group_count: 0,
            first_profile_group_index: 0,
        }
    }
}

/// The workhorse graph: the first two address bits select one of four
/// leaves, profiles 0 through 3 in address order. Total over every
/// input, so it is safe to probe with arbitrary addresses.
pub fn balanced(version: u8, component_id: u8) -> GraphFixture {
    let mut f = GraphFixture::new(version, component_id);
    f.nodes = vec![
        // Root branch in high position; its high subtree sits at node 3.
        node(3, false, 0),
        // Low sibling pair for addresses starting 0.
        node(5, true, 0),
        node(6, false, 0),
        // High subtree pair for addresses starting 1.
        node(7, true, 0),
        node(8, false, 0),
    ];
    f.spans = vec![span(1, 0b0, 1, 0b1)];
    f.clusters = vec![cluster(0, 4, vec![0])];
    f
}

//------------ Serialisation -------------------------------------------------

pub struct BitWriter {
    bytes: Vec<u8>,
    bit: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter {
            bytes: Vec::new(),
            bit: 0,
        }
    }

    /// Appends the low `count` bits of `value`, most significant first.
    pub fn push(&mut self, value: u128, count: u8) {
        for i in (0..count).rev() {
            if self.bit % 8 == 0 {
                self.bytes.push(0);
            }
            if (value >> i) & 1 != 0 {
                self.bytes[self.bit / 8] |= 1 << (7 - self.bit % 8);
            }
            self.bit += 1;
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Field order in the file: length, count, start.
fn push_header(out: &mut Vec<u8>, length: u32, count: u32, start: u32) {
    push_u32(out, length);
    push_u32(out, count);
    push_u32(out, start);
}

fn push_member(out: &mut Vec<u8>, mask: u64, shift: u64) {
    push_u64(out, mask);
    push_u64(out, shift);
}

struct Regions {
    nodes: Vec<u8>,
    spans: Vec<u8>,
    pool: Vec<u8>,
    clusters: Vec<u8>,
}

fn serialise_regions(f: &GraphFixture) -> Regions {
    let mut w = BitWriter::new();
    for n in &f.nodes {
        w.push(u128::from(n.span), 8);
        w.push(u128::from(n.low_flag), 1);
        w.push(u128::from(n.value), 15);
    }
    let nodes = w.finish();

    let mut pool = Vec::new();
    let mut spans = Vec::new();
    for s in &f.spans {
        let total = usize::from(s.low.len) + usize::from(s.high.len);
        let mut limits = BitWriter::new();
        limits.push(s.low.bits, s.low.len);
        limits.push(s.high.bits, s.high.len);
        let limits = limits.finish();
        let mut trail = [0u8; 4];
        if total <= 32 {
            trail[..limits.len()].copy_from_slice(&limits);
        } else {
            trail = (pool.len() as u32).to_le_bytes();
            pool.extend(&limits);
        }
        spans.push(s.low.len);
        spans.push(s.high.len);
        spans.extend(&trail);
    }

    let mut clusters = Vec::new();
    for c in &f.clusters {
        push_u32(&mut clusters, c.start);
        push_u32(&mut clusters, c.end);
        for i in 0..256 {
            push_u32(&mut clusters, c.spans.get(i).copied().unwrap_or(0));
        }
    }

    Regions {
        nodes,
        spans,
        pool,
        clusters,
    }
}

/// Serialises the fixtures into one data blob: the info array first,
/// then the graph regions in reverse fixture order.
pub fn build(fixtures: &[GraphFixture]) -> Vec<u8> {
    let info_len = fixtures.len() * INFO_SIZE;
    let regions: Vec<Regions> =
        fixtures.iter().map(serialise_regions).collect();

    // Assign region offsets, last fixture's regions first.
    let mut starts = vec![(0u32, 0u32, 0u32, 0u32); fixtures.len()];
    let mut offset = info_len;
    for (i, r) in regions.iter().enumerate().rev() {
        let nodes_start = offset as u32;
        offset += r.nodes.len();
        let spans_start = offset as u32;
        offset += r.spans.len();
        let pool_start = offset as u32;
        offset += r.pool.len();
        let clusters_start = offset as u32;
        offset += r.clusters.len();
        starts[i] = (nodes_start, spans_start, pool_start, clusters_start);
    }

    let mut blob = Vec::with_capacity(offset);
    for (i, f) in fixtures.iter().enumerate() {
        let r = &regions[i];
        let (nodes_start, spans_start, pool_start, clusters_start) =
            starts[i];
        blob.push(f.version);
        blob.push(f.component_id);
        push_u32(&mut blob, f.graph_index);
        push_header(
            &mut blob,
            r.nodes.len() as u32,
            f.nodes.len() as u32,
            nodes_start,
        );
        push_u16(&mut blob, RECORD_SIZE);
        push_member(&mut blob, 0x8000, 15); // low flag
        push_member(&mut blob, 0xff_0000, 16); // cluster local span index
        push_member(&mut blob, 0x7fff, 0); // value
        push_header(
            &mut blob,
            r.spans.len() as u32,
            f.spans.len() as u32,
            spans_start,
        );
        push_header(
            &mut blob,
            r.pool.len() as u32,
            r.pool.len() as u32,
            pool_start,
        );
        push_header(
            &mut blob,
            r.clusters.len() as u32,
            f.clusters.len() as u32,
            clusters_start,
        );
        push_u32(&mut blob, f.profile_count);
        push_u32(&mut blob, f.first_profile_index);
        push_u32(&mut blob, f.profile_group_count);
        push_u32(&mut blob, f.first_profile_group_index);
        assert_eq!(blob.len(), (i + 1) * INFO_SIZE);
    }
    for r in regions.iter().rev() {
        blob.extend(&r.nodes);
        blob.extend(&r.spans);
        blob.extend(&r.pool);
        blob.extend(&r.clusters);
    }
    assert_eq!(blob.len(), offset);
    blob
}

//------------ Loading helpers -----------------------------------------------

pub fn header_for(fixtures: &[GraphFixture]) -> CollectionHeader {
    CollectionHeader {
        start: 0,
        length: (fixtures.len() * INFO_SIZE) as u32,
        count: fixtures.len() as u32,
    }
}

pub fn from_memory(fixtures: &[GraphFixture]) -> GraphArray {
    let mut reader = MemoryReader::new(build(fixtures));
    let info =
        Collection::from_reader(&mut reader, header_for(fixtures)).unwrap();
    GraphArray::from_memory(&info, &mut reader).unwrap()
}

static UNIQUE: AtomicUsize = AtomicUsize::new(0);

pub fn from_file(fixtures: &[GraphFixture], loaded: bool) -> GraphArray {
    let path = std::env::temp_dir().join(format!(
        "ipgraph-test-{}-{}.bin",
        std::process::id(),
        UNIQUE.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&path, build(fixtures)).unwrap();
    let source = FileSource::open(&path).unwrap();
    let config = CollectionConfig { loaded };
    let info =
        Collection::from_file(&source, header_for(fixtures), config).unwrap();
    let graphs = GraphArray::from_file(&info, &source, config).unwrap();
    std::fs::remove_file(&path).ok();
    graphs
}

//! The traversal engine.
//!
//! A cursor walks one component graph for one address. Every decision
//! node carries a span: the low and high limits of a bit range. The
//! address bits at the cursor are compared against both limits; equality
//! consumes the matched bits and descends, while the strict outcomes
//! commit to a subtree whose leaf is fully determined and is walked
//! without consuming further address bits.

use std::cmp::Ordering;

use log::trace;

use crate::bits;
use crate::types::{GraphError, IpAddress, IpType, VAR_SIZE};

use super::layout::{Cluster, Span, SPAN_INLINE_BITS};
use super::trace::TraceBuffer;
use super::ComponentGraph;

//------------ CompareResult -------------------------------------------------

/// Where the address bits at the cursor sit relative to the span limits.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum CompareResult {
    NoCompare,
    LessThanLow,
    EqualLow,
    Inbetween,
    EqualHigh,
    GreaterThanHigh,
}

impl CompareResult {
    fn label(self) -> &'static str {
        match self {
            CompareResult::NoCompare => "NO_COMPARE",
            CompareResult::LessThanLow => "LESS_THAN_LOW",
            CompareResult::EqualLow => "EQUAL_LOW",
            CompareResult::Inbetween => "INBETWEEN",
            CompareResult::EqualHigh => "EQUAL_HIGH",
            CompareResult::GreaterThanHigh => "GREATER_THAN_HIGH",
        }
    }
}

//------------ Cursor --------------------------------------------------------

/// Transient state for one evaluation: created for a graph and an
/// address, consumed by [`Cursor::evaluate`], then discarded. The cluster
/// and span caches live here, so concurrent evaluations over one shared
/// graph never interfere.
pub(crate) struct Cursor<'g, 't, 'b> {
    graph: &'g ComponentGraph,
    ip: IpAddress,
    /// The address bits at the cursor, realigned for span comparison.
    ip_value: [u8; VAR_SIZE],
    /// Current bit position in the address value, MSB first.
    bit_index: u16,
    /// Bits of the current node record.
    node_bits: u64,
    /// Index of the current node.
    index: u32,
    /// Node index of the most recent high branch.
    previous_high_index: u32,
    cluster_index: u32,
    cluster: Cluster,
    cluster_set: bool,
    span_index: u32,
    span: Span,
    span_low: [u8; VAR_SIZE],
    span_high: [u8; VAR_SIZE],
    span_set: bool,
    compare_result: CompareResult,
    tracer: Option<&'t mut TraceBuffer<'b>>,
}

impl<'g, 't, 'b> Cursor<'g, 't, 'b> {
    pub fn new(
        graph: &'g ComponentGraph,
        ip: IpAddress,
        tracer: Option<&'t mut TraceBuffer<'b>>,
    ) -> Self {
        Cursor {
            graph,
            ip,
            ip_value: [0; VAR_SIZE],
            bit_index: 0,
            node_bits: 0,
            index: 0,
            previous_high_index: graph.info.graph_index,
            cluster_index: 0,
            cluster: Cluster::default(),
            cluster_set: false,
            span_index: 0,
            span: Span::default(),
            span_low: [0; VAR_SIZE],
            span_high: [0; VAR_SIZE],
            span_set: false,
            compare_result: CompareResult::NoCompare,
            tracer,
        }
    }

    //--- Node fields

    fn node_count(&self) -> u32 {
        self.graph.info.nodes.collection.count
    }

    fn value(&self) -> u32 {
        self.graph.info.nodes.value.value_of(self.node_bits)
    }

    /// A value at or past the node count marks a leaf.
    fn is_leaf(&self) -> bool {
        self.value() >= self.node_count()
    }

    fn is_low_flag(&self) -> bool {
        self.graph.info.nodes.low_flag.value_of(self.node_bits) != 0
    }

    fn local_span_index(&self) -> u32 {
        self.graph.info.nodes.span_index.value_of(self.node_bits)
    }

    /// The profile index for the current node. Only meaningful on a
    /// leaf; on a branch the subtraction wraps out of range and the
    /// result mapping yields the default.
    pub fn profile_index(&self) -> u32 {
        self.value().wrapping_sub(self.node_count())
    }

    //--- Cluster and span state

    /// Ensures the cached cluster covers the current node index.
    fn set_cluster(&mut self) -> Result<(), GraphError> {
        if self.cluster_set && self.cluster.contains(self.index) {
            return Ok(());
        }
        let found = self.cluster_search()?;

        // The search leaves the last inspected cluster on the cursor.
        // Cluster ranges partition the node indices, so that cluster
        // covers the index unless the data is corrupt.
        if !self.cluster.contains(self.index)
            || found >= self.graph.clusters.count()
        {
            return Err(GraphError::CorruptData);
        }
        self.cluster_set = true;
        self.cluster_index = found;
        Ok(())
    }

    /// Range binary search over the clusters collection. Every inspected
    /// cluster is loaded into the cursor; returns the index of the last
    /// one.
    fn cluster_search(&mut self) -> Result<u32, GraphError> {
        let count = self.graph.clusters.count();
        if count == 0 {
            return Err(GraphError::CorruptData);
        }
        let mut lower = 0;
        let mut upper = count - 1;
        let mut middle = 0;
        while lower <= upper {
            middle = lower + (upper - lower) / 2;
            self.load_cluster(middle)?;
            if self.cluster.contains(self.index) {
                return Ok(middle);
            }
            if self.cluster.start > self.index {
                if middle == 0 {
                    // Guard against underflow of the unsigned bound.
                    break;
                }
                upper = middle - 1;
            } else {
                lower = middle + 1;
            }
        }
        Ok(middle)
    }

    fn load_cluster(&mut self, index: u32) -> Result<(), GraphError> {
        let record = self.graph.clusters.record(index)?;
        self.cluster = Cluster::decode(&record)?;
        Ok(())
    }

    /// Resolves the current node's span and materialises its limits,
    /// reusing the cached span when the node resolves to the same one.
    fn set_span(&mut self) -> Result<(), GraphError> {
        let graph = self.graph;
        self.set_cluster()?;

        // The node's span index is local to the cluster.
        let local = self.local_span_index();
        let global = match self.cluster.span_indexes.get(local as usize) {
            Some(index) => *index,
            None => return Err(GraphError::CorruptData),
        };
        if self.span_set && self.span_index == global {
            return Ok(());
        }
        if global >= graph.spans.count() {
            return Err(GraphError::CorruptData);
        }
        {
            let record = graph.spans.record(global)?;
            self.span = Span::decode(&record)?;
        }

        self.span_low = [0; VAR_SIZE];
        self.span_high = [0; VAR_SIZE];
        let low_len = usize::from(self.span.length_low);
        let high_len = usize::from(self.span.length_high);
        if self.span.total_length() > SPAN_INLINE_BITS {
            // The limits live in the span bytes pool at the trail
            // offset.
            let length = (self.span.total_length() + 7) / 8;
            let bytes = graph
                .span_bytes
                .window(self.span.trail_offset(), length as u32)?;
            bits::copy(&mut self.span_low, &bytes, 0, low_len);
            bits::copy(&mut self.span_high, &bytes, low_len, high_len);
        } else {
            let trail = self.span.trail;
            bits::copy(&mut self.span_low, &trail, 0, low_len);
            bits::copy(&mut self.span_high, &trail, low_len, high_len);
        }

        // A span is a non-empty open interval.
        if bits::compare(&self.span_low, &self.span_high, self.span.max_length())
            != Ordering::Less
        {
            return Err(GraphError::CorruptData);
        }
        self.span_set = true;
        self.span_index = global;
        Ok(())
    }

    //--- Moves

    /// Moves the cursor to the node at `index`, decoding its record from
    /// the bit packed stream and resolving its span.
    fn read_node(&mut self, index: u32) -> Result<(), GraphError> {
        let graph = self.graph;
        let record_size = graph.info.nodes.record_size;
        let start_bit = u64::from(index) * u64::from(record_size);
        let byte_index = u32::try_from(start_bit / 8)
            .map_err(|_| GraphError::CorruptData)?;
        let bit_in_byte = (start_bit % 8) as usize;
        let length = (bit_in_byte + usize::from(record_size)).div_ceil(8);
        {
            let window = graph.nodes.window(byte_index, length as u32)?;
            self.node_bits = bits::extract(&window, bit_in_byte, record_size);
        }
        self.index = index;
        self.set_span()
    }

    /// Moves to the node the current value points at.
    fn move_to(&mut self) -> Result<(), GraphError> {
        self.read_node(self.value())
    }

    /// Moves to the immediate successor node.
    fn move_next(&mut self) -> Result<(), GraphError> {
        let next = self
            .index
            .checked_add(1)
            .ok_or(GraphError::CorruptData)?;
        self.read_node(next)
    }

    /// Moves back to the most recent high branch, then selects low.
    fn move_back_low(&mut self) -> Result<bool, GraphError> {
        self.trace_label("move_back_low");
        self.read_node(self.previous_high_index)?;
        self.select_low()
    }

    //--- Selectors

    /// Positions the cursor on the low entry. Returns true when that
    /// entry is a leaf and the profile index can be read.
    fn select_low(&mut self) -> Result<bool, GraphError> {
        let found = if self.is_low_flag() {
            // This entry is the low one: a leaf ends the descent, a
            // branch points at the low subtree.
            if self.is_leaf() {
                true
            } else {
                self.move_to()?;
                false
            }
        } else {
            // This entry is the high one; its low sibling follows it.
            self.move_next()?;
            false
        };
        self.trace_flag("select_low", found);
        Ok(found)
    }

    /// Positions the cursor on the high entry. Returns true when that
    /// entry is a leaf.
    fn select_high(&mut self) -> Result<bool, GraphError> {
        // The current entry may be the low one; the high entry is its
        // successor.
        if self.is_low_flag() {
            self.move_next()?;
        }
        if self.is_leaf() {
            self.trace_flag("select_high", true);
            return Ok(true);
        }
        self.move_to()?;
        self.trace_flag("select_high", false);
        Ok(false)
    }

    /// Follows high entries down to a leaf without consuming further
    /// address bits.
    fn complete_high(&mut self) -> Result<(), GraphError> {
        self.trace_label("complete_high");
        while !self.select_high()? {}
        Ok(())
    }

    /// Descends into the low entry, then follows high entries to its
    /// subtree's rightmost leaf.
    fn complete_low_high(&mut self) -> Result<(), GraphError> {
        self.trace_label("complete_low_high");
        if !self.select_low()? {
            while !self.select_high()? {}
        }
        Ok(())
    }

    /// Walks back to the most recent high branch and takes the rightmost
    /// leaf of its low subtree.
    fn complete_low(&mut self) -> Result<(), GraphError> {
        self.trace_label("complete_low");
        if !self.move_back_low()? {
            while !self.select_high()? {}
        }
        Ok(())
    }

    //--- Comparison

    /// Loads the address bits at the cursor into the comparison buffer.
    /// Bits past the end of the padded value read as zero.
    fn set_ip_value(&mut self) {
        self.ip_value = [0; VAR_SIZE];
        let start = usize::from(self.bit_index);
        let available = (VAR_SIZE * 8).saturating_sub(start);
        let count = self.span.max_length().min(available);
        bits::copy(&mut self.ip_value, self.ip.value(), start, count);
    }

    /// Compares the address bits at the cursor against both span limits
    /// and records the outcome. An exact high match also records this
    /// node as the most recent high branch.
    fn compare_ip_to_span(&mut self) {
        self.set_ip_value();
        let low = bits::compare(
            &self.ip_value,
            &self.span_low,
            usize::from(self.span.length_low),
        );
        let high = bits::compare(
            &self.ip_value,
            &self.span_high,
            usize::from(self.span.length_high),
        );
        self.compare_result = match (low, high) {
            (Ordering::Less, _) => CompareResult::LessThanLow,
            (Ordering::Equal, _) => CompareResult::EqualLow,
            (Ordering::Greater, Ordering::Less) => CompareResult::Inbetween,
            (Ordering::Greater, Ordering::Equal) => {
                self.previous_high_index = self.index;
                CompareResult::EqualHigh
            }
            (Ordering::Greater, Ordering::Greater) => {
                CompareResult::GreaterThanHigh
            }
        };
        trace!(
            "[{}] {:?} node={} span={} cluster={}",
            self.bit_index,
            self.compare_result,
            self.index,
            self.span_index,
            self.cluster_index
        );
        self.trace_compare();
    }

    /// True once all bytes of the padded address value are consumed.
    fn is_exhausted(&self) -> bool {
        usize::from(self.bit_index) / 8 >= VAR_SIZE
    }

    //--- Evaluation

    /// Runs the traversal from the graph root until a leaf is reached or
    /// the address bits run out, returning the raw leaf value.
    pub fn evaluate(&mut self) -> Result<u32, GraphError> {
        self.trace_newline();
        self.read_node(self.graph.info.graph_index)?;
        loop {
            self.compare_ip_to_span();
            let found = match self.compare_result {
                CompareResult::LessThanLow => {
                    self.complete_low()?;
                    true
                }
                CompareResult::EqualLow => {
                    // Consume the matched bits before the cursor moves.
                    self.bit_index += u16::from(self.span.length_low);
                    self.select_low()?
                }
                CompareResult::Inbetween => {
                    self.complete_low_high()?;
                    true
                }
                CompareResult::EqualHigh => {
                    self.bit_index += u16::from(self.span.length_high);
                    self.select_high()?
                }
                CompareResult::GreaterThanHigh => {
                    self.complete_high()?;
                    true
                }
                CompareResult::NoCompare => {
                    return Err(GraphError::CorruptData)
                }
            };
            debug_assert!(
                self.graph.info.ip_type != IpType::V4
                    || usize::from(self.bit_index) <= 32,
                "IPv4 graph consumed bits past position 31"
            );
            if found || self.is_exhausted() {
                break;
            }
        }
        Ok(self.profile_index())
    }

    //--- Trace records

    /// The step record sink. Detailed records can be compiled out while
    /// the trace entrypoint keeps its header and result lines.
    fn step_tracer(&mut self) -> Option<&mut TraceBuffer<'b>> {
        if cfg!(feature = "trace") {
            self.tracer.as_deref_mut()
        } else {
            None
        }
    }

    fn trace_newline(&mut self) {
        if let Some(sb) = self.step_tracer() {
            sb.newline();
        }
    }

    fn trace_label(&mut self, label: &str) {
        if let Some(sb) = self.step_tracer() {
            sb.label(label);
        }
    }

    fn trace_flag(&mut self, method: &str, value: bool) {
        if let Some(sb) = self.step_tracer() {
            sb.flag(method, value);
        }
    }

    fn trace_compare(&mut self) {
        let bit_index = self.bit_index;
        let label = self.compare_result.label();
        let ip_value = self.ip_value;
        let span_low = self.span_low;
        let span_high = self.span_high;
        let span = self.span;
        let (cluster_index, span_index, index) =
            (self.cluster_index, self.span_index, self.index);
        if let Some(sb) = self.step_tracer() {
            sb.compare(
                bit_index,
                label,
                &ip_value,
                span.max_length(),
                &span_low,
                usize::from(span.length_low),
                &span_high,
                usize::from(span.length_high),
                cluster_index,
                span_index,
                index,
            );
        }
    }
}

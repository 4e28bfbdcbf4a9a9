//! Component graph loading, selection and evaluation.

mod cursor;
mod layout;
mod result;
mod trace;

pub use result::LookupResult;

use log::debug;

use crate::collection::{
    Collection, CollectionConfig, CollectionHeader, FileSource, MemoryReader,
};
use crate::types::{GraphError, IpAddress, IpType};

use cursor::Cursor;
use layout::{GraphInfo, CLUSTER_SIZE};
use trace::TraceBuffer;

//------------ ComponentGraph ------------------------------------------------

/// One component graph: its decoded info record and the four
/// sub-collections holding the node stream, the spans, the span bytes
/// pool and the clusters.
pub struct ComponentGraph {
    info: GraphInfo,
    nodes: Collection,
    spans: Collection,
    span_bytes: Collection,
    clusters: Collection,
}

impl ComponentGraph {
    /// The IP version this graph covers.
    pub fn ip_type(&self) -> IpType {
        self.info.ip_type
    }

    /// The component this graph resolves.
    pub fn component_id(&self) -> u8 {
        self.info.component_id
    }
}

//------------ GraphArray ----------------------------------------------------

/// All component graphs of a data set, one per (IP version, component)
/// pair.
///
/// The array is immutable after loading and can be shared between any
/// number of threads; each evaluation owns a transient cursor, so no
/// synchronisation is needed beyond publishing the array itself.
pub struct GraphArray {
    graphs: Vec<ComponentGraph>,
}

impl GraphArray {
    /// Loads the graphs described by the info records in `info` from an
    /// in-memory data set.
    ///
    /// Graph headers may point into byte regions shared with other
    /// graphs, so the reader's position is saved and restored around
    /// every region that is not at the current position.
    pub fn from_memory(
        info: &Collection,
        reader: &mut MemoryReader,
    ) -> Result<Self, GraphError> {
        Self::create(info, &mut |header: CollectionHeader| {
            let saved = reader.position();
            let target = header.start as usize;
            let restore = saved != target;
            if restore {
                reader.set_position(target);
            }
            let collection = Collection::from_reader(reader, header);
            if restore {
                reader.set_position(saved);
            }
            collection
        })
    }

    /// Loads the graphs described by the info records in `info` from a
    /// file backed data set.
    pub fn from_file(
        info: &Collection,
        source: &FileSource,
        config: CollectionConfig,
    ) -> Result<Self, GraphError> {
        Self::create(info, &mut |header| {
            Collection::from_file(source, header, config)
        })
    }

    fn create(
        info: &Collection,
        open: &mut dyn FnMut(
            CollectionHeader,
        ) -> Result<Collection, GraphError>,
    ) -> Result<Self, GraphError> {
        let count = info.count();
        let mut graphs = Vec::new();
        graphs
            .try_reserve(count as usize)
            .map_err(|_| GraphError::InsufficientMemory)?;
        for index in 0..count {
            let graph_info = {
                let record = info.record(index)?;
                GraphInfo::decode(&record)?
            };

            // The node stream is bit packed, so its collection is
            // addressed by byte rather than by record.
            let nodes = open(graph_info.nodes.collection.byte_indexed())?;
            let spans = open(graph_info.spans)?;
            let span_bytes = open(graph_info.span_bytes)?;
            let clusters = open(graph_info.clusters)?;
            if clusters.element_size() as usize > CLUSTER_SIZE {
                return Err(GraphError::CorruptData);
            }
            debug!(
                "created graph version={:?} component={} nodes={} \
                 spans={} clusters={}",
                graph_info.ip_type,
                graph_info.component_id,
                graph_info.nodes.collection.count,
                spans.count(),
                clusters.count()
            );
            graphs.push(ComponentGraph {
                info: graph_info,
                nodes,
                spans,
                span_bytes,
                clusters,
            });
        }
        Ok(GraphArray { graphs })
    }

    /// Number of graphs in the array.
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// The graphs in data set order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentGraph> {
        self.graphs.iter()
    }

    /// Resolves the address and component to a profile or profile group
    /// offset. An array without a graph for the pair yields the default
    /// result.
    pub fn evaluate(
        &self,
        component_id: u8,
        ip: IpAddress,
    ) -> Result<LookupResult, GraphError> {
        self.lookup(component_id, ip, None)
    }

    /// As [`evaluate`][Self::evaluate], additionally writing a trace of
    /// every comparison and move into `buffer`. The buffer is NUL
    /// terminated on return, also when evaluation fails.
    pub fn evaluate_trace(
        &self,
        component_id: u8,
        ip: IpAddress,
        buffer: &mut [u8],
    ) -> Result<LookupResult, GraphError> {
        let mut sb = TraceBuffer::new(buffer);
        sb.ip_header(&ip);
        let result = self.lookup(component_id, ip, Some(&mut sb));
        sb.finish();
        result
    }

    fn lookup(
        &self,
        component_id: u8,
        ip: IpAddress,
        mut sb: Option<&mut TraceBuffer<'_>>,
    ) -> Result<LookupResult, GraphError> {
        for graph in &self.graphs {
            if graph.info.ip_type == ip.ip_type()
                && graph.info.component_id == component_id
            {
                let raw_value = {
                    let mut cursor =
                        Cursor::new(graph, ip, sb.as_deref_mut());
                    cursor.evaluate()?
                };
                if let Some(sb) = sb {
                    sb.result(raw_value);
                }
                return Ok(map_result(raw_value, &graph.info));
            }
        }
        Ok(LookupResult::default())
    }
}

/// Maps a raw leaf value to a profile offset, a profile group offset, or
/// the unmapped default.
fn map_result(raw_value: u32, info: &GraphInfo) -> LookupResult {
    let mut result = LookupResult {
        raw_value,
        offset: 0,
        is_group_offset: false,
    };
    if raw_value < info.profile_count {
        result.offset = raw_value + info.first_profile_index;
    } else {
        let group_index = raw_value - info.profile_count;
        if group_index < info.profile_group_count {
            result.offset = group_index + info.first_profile_group_index;
            result.is_group_offset = true;
        }
    }
    result
}

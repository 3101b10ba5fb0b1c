#![doc = include_str!("../README.md")]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]
#![doc(html_logo_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc(test(attr(deny(warnings))))]

mod driver;
mod error;
mod graph;
pub mod model;
mod options;
pub mod query;
mod reification;
mod store;

pub use crate::driver::{Column, Driver, GraphId, decode_node, encode_node};
pub use crate::error::{
    CompileError, CorruptionError, GraphError, PlanningError, QueryError, ReificationError,
    StorageError,
};
pub use crate::graph::{
    CompletionFlag, ReifierGraph, SpecializedGraph, SpecializedGraphId, StatementGraph,
    Subsumption,
};
pub use crate::options::{GraphOptions, ReificationStyle};
pub use crate::reification::{Fragment, FragmentKind, Reifier, StmtMask};
pub use crate::store::{DEFAULT_GRAPH_NAME, GraphRdb};

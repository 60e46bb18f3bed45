pub mod adapter;
pub mod memory_adapter;
pub mod scheduler;

pub use adapter::GraphAdapter;
pub use memory_adapter::{InMemoryGraphAdapter, SharedGraphAdapter};
pub use scheduler::{
    build_dependency_nodes, schedule, DependencyNode, ProcessingLevel, ProcessingOrder,
};

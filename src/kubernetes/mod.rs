mod client;
pub mod discovery;
pub mod resource_id;
pub mod upstream;

pub use client::{ClusterSettings, connect};
pub use discovery::{ApiServerDescriber, ResourceDescriber, ResourceInfo};
pub use resource_id::ResourceId;
pub use upstream::{UpstreamSource, UpstreamStream, WatcherSource};

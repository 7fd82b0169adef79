//! Host-facing API over `sectionvault_core`.

pub mod api;

pub use api::{
    core_version, init_logging, ping, ActionResponse, SectionApi, VersionItem,
    VersionListResponse,
};

//! Download and staging of prebuilt Skia release archives.
//!
//! The core of this crate is [`Pipeline::fetch_and_stage`]: it downloads a
//! release asset (following redirects and retrying rate limits), extracts the
//! archive into a scratch directory, locates the payload root and copies it
//! into a destination directory.

pub mod config;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod release;
pub mod stage;
pub mod target;
pub mod version;

pub use config::{ConfigError, HttpSettings, ReleaseSettings, SkiapkgConfig};
pub use error::{Error, Result};
pub use http::{FetchError, Fetcher, FetcherConfig, ReqwestTransport, Transport, TransportResponse};
pub use pipeline::{ArtifactRequest, Pipeline, PipelineOptions, PipelineOutcome, Stage};
pub use release::{Flavor, ReleaseSource, ReleaseTag};
pub use stage::{copy_tree, locate_payload_root, CopyStats, DestinationPolicy, ExtractStrategy, Extractor, StageError, StageReport, Stager};
pub use target::{host_platform, ArtifactSpec, Target, TargetTable};
pub use version::{milestone_to_semver, Milestone, VersionError};

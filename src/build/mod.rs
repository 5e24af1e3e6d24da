//! Build resolution: decide, build with retries, and report image locations.
//!
//! - [`evaluator`] decides per image whether the cache already holds it.
//! - [`conveyor`] runs one attempt: evaluate, then build what is missing.
//! - [`retry`] wraps attempts in the bounded retry envelope.
//! - [`info`] reads the final repository and tag of each image.
//! - [`stub`] fabricates placeholder info without any infrastructure.
//! - [`builder`] is the seam to the program that actually builds images.

pub mod builder;
pub mod conveyor;
pub mod evaluator;
pub mod info;
pub mod retry;
pub mod stub;

pub use builder::{BuildRequest, DockerCliBuilder, ImageBuilder};
pub use conveyor::{AttemptReport, Conveyor};
pub use evaluator::{BuildDecision, BuildNecessityEvaluator, Evaluation};
pub use info::{
    CustomTagTemplate, ImageInfo, ImageInfoAssembler, TagResolver, TagStrategy, content_tag,
};
pub use retry::{AttemptContext, BuildWorkspace, RetryPolicy, RetryingExecutor};
pub use stub::stub_image_infos;

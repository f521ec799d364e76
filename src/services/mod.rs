pub mod http_client;
pub mod ingestion;
pub mod progress;
pub mod token_bucket;
pub mod upload;
pub mod upstream;

pub use http_client::{RetryPolicy, RetryingHttpClient};
pub use ingestion::{expected_total, plan_requests, FetchOutcome, IngestionPipeline, PlannedRequest};
pub use progress::{ProgressHub, Subscription};
pub use token_bucket::{LimiterStats, TokenBucketLimiter};
pub use upload::BatchUploadService;
pub use upstream::UpstreamApi;

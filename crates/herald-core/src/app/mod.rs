//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: config / fake から Dispatcher を組み立てる
//! - **Dispatcher**: key ごとの排他と job の起動
//! - **Pipeline**: 1 job を GENERATING -> PUBLISHING -> REPORTING -> DONE へ
//! - **GenerationStage / PublicationStage / ReportingStage**: 各 stage
//! - **RetryPolicy / RetrySchedule**: 配送の backoff
//! - **JobCounts**: status 表示用の集計

pub mod builder;
pub mod dispatcher;
pub mod generation;
pub mod pipeline;
pub mod publication;
pub mod reporting;
pub mod retry;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{AppBuilder, BuildError};
pub use self::dispatcher::{Dispatcher, JobHandle};
pub use self::generation::{fallback_artifacts, GenerationOutput, GenerationStage};
pub use self::pipeline::Pipeline;
pub use self::publication::PublicationStage;
pub use self::reporting::ReportingStage;
pub use self::retry::{Decision, RetryPolicy, RetrySchedule};
pub use self::status::{JobCounts, StageCounts};

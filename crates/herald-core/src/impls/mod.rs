//! Impls - 実装
//!
//! 各 port の具体的な provider。起動時に config から 1 度だけ選ばれる。
//!
//! - **OpenAiGenerator**: OpenAI 互換 chat completion
//! - **GithubPublisher**: GitHub repository + Pages
//! - **LocalPublisher**: ローカルディレクトリ（開発用）
//! - **HttpEvaluationSink**: evaluation URL への JSON POST

pub mod github_publisher;
pub mod http_evaluation;
pub mod local_publisher;
pub mod openai_generator;

pub use self::github_publisher::GithubPublisher;
pub use self::http_evaluation::HttpEvaluationSink;
pub use self::local_publisher::LocalPublisher;
pub use self::openai_generator::OpenAiGenerator;

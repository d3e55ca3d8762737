//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（content generator, hosting publisher, evaluation
//! endpoint）や時刻への依存を隠蔽します。Concrete providers live in `impls`
//! and are selected once at process start.

pub mod clock;
pub mod evaluation;
pub mod generator;
pub mod id_generator;
pub mod publisher;
pub mod sleeper;

pub use self::clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use self::evaluation::EvaluationSink;
pub use self::generator::{ContentGenerator, GeneratedFile, GenerationBrief};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::publisher::{Destination, Publisher, PushReceipt};
pub use self::sleeper::{Sleeper, TokioSleeper};

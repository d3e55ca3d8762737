//! herald-core
//!
//! Core building blocks for the Herald fulfillment pipeline.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, request / job key, artifacts, stage, job, outcome, errors）
//! - **ports**: 抽象化レイヤー（Clock, Sleeper, IdGenerator, ContentGenerator, Publisher, EvaluationSink）
//! - **app**: アプリケーションロジック（dispatcher, pipeline, stages, retry, builder）
//! - **impls**: 実装（OpenAI, GitHub, local directory, HTTP evaluation sink）
//! - **config**: 設定の読み込みと検証
//! - **observability**: tracing の初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

//! AppBuilder - Dispatcher の構築とワイヤリング
//!
//! # 設計
//! - provider は config から 1 度だけ選ぶ
//! - 各 port は `with_*` で差し替え可能（テストでは fake を渡す）
//! - build() で検証してから組み立てる（Fail-fast）

use std::sync::Arc;
use std::time::Duration;

use super::dispatcher::Dispatcher;
use super::generation::GenerationStage;
use super::pipeline::Pipeline;
use super::publication::PublicationStage;
use super::reporting::ReportingStage;
use super::retry::RetryPolicy;
use crate::config::{ConfigError, GeneratorProvider, HeraldConfig, PublisherProvider};
use crate::impls::{GithubPublisher, HttpEvaluationSink, LocalPublisher, OpenAiGenerator};
use crate::ports::{
    Clock, ContentGenerator, EvaluationSink, IdGenerator, Publisher, Sleeper, SystemClock,
    TokioSleeper, UlidGenerator,
};

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client for {component}: {source}")]
    HttpClient {
        component: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

fn http_client(component: &'static str) -> impl FnOnce(reqwest::Error) -> BuildError {
    move |source| BuildError::HttpClient { component, source }
}

pub struct AppBuilder {
    generator: Option<Arc<dyn ContentGenerator>>,
    generator_timeout: Duration,
    publisher: Option<Arc<dyn Publisher>>,
    publisher_timeout: Duration,
    sink: Option<Arc<dyn EvaluationSink>>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    ids: Option<Arc<dyn IdGenerator>>,
    max_concurrent_jobs: usize,
    config: Option<HeraldConfig>,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    /// Defaults only; every port not set explicitly must come from a config.
    pub fn new() -> Self {
        Self {
            generator: None,
            generator_timeout: Duration::from_secs(120),
            publisher: None,
            publisher_timeout: Duration::from_secs(60),
            sink: None,
            retry: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            ids: None,
            max_concurrent_jobs: 8,
            config: None,
        }
    }

    pub fn from_config(config: &HeraldConfig) -> Self {
        Self {
            generator_timeout: config.generator.timeout(),
            publisher_timeout: config.publisher.timeout(),
            retry: config.reporting.retry_policy(),
            max_concurrent_jobs: config.dispatcher.max_concurrent_jobs,
            config: Some(config.clone()),
            ..Self::new()
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_evaluation_sink(mut self, sink: Arc<dyn EvaluationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Clock and sleeper together, so backoff can run on virtual time.
    pub fn with_time(mut self, clock: Arc<dyn Clock>, sleeper: Arc<dyn Sleeper>) -> Self {
        self.clock = clock;
        self.sleeper = sleeper;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = n;
        self
    }

    /// AppBuilder を構築して Dispatcher を生成
    ///
    /// # 検証
    /// - config があれば validate() する
    /// - 明示されなかった port は config から作る。どちらも無ければ BuildError
    pub fn build(self) -> Result<Dispatcher, BuildError> {
        if let Some(config) = &self.config {
            config.validate()?;
        }

        let generator = match self.generator {
            Some(g) => g,
            None => {
                let config = self.config.as_ref().ok_or_else(|| missing("generator"))?;
                match config.generator.provider {
                    GeneratorProvider::Openai => Arc::new(
                        OpenAiGenerator::new(&config.generator).map_err(http_client("generator"))?,
                    ) as Arc<dyn ContentGenerator>,
                }
            }
        };

        let publisher = match self.publisher {
            Some(p) => p,
            None => {
                let config = self.config.as_ref().ok_or_else(|| missing("publisher"))?;
                match config.publisher.provider {
                    PublisherProvider::Github => Arc::new(
                        GithubPublisher::new(&config.publisher).map_err(http_client("publisher"))?,
                    ) as Arc<dyn Publisher>,
                    PublisherProvider::Local => {
                        Arc::new(LocalPublisher::from_config(&config.publisher)) as Arc<dyn Publisher>
                    }
                }
            }
        };

        let sink = match self.sink {
            Some(s) => s,
            None => {
                let config = self.config.as_ref().ok_or_else(|| missing("evaluation sink"))?;
                Arc::new(
                    HttpEvaluationSink::new(config.reporting.request_timeout())
                        .map_err(http_client("evaluation sink"))?,
                ) as Arc<dyn EvaluationSink>
            }
        };

        let ids = self
            .ids
            .unwrap_or_else(|| {
                Arc::new(UlidGenerator::new(Arc::clone(&self.clock))) as Arc<dyn IdGenerator>
            });

        let pipeline = Pipeline::new(
            GenerationStage::new(generator, self.generator_timeout),
            PublicationStage::new(publisher, self.publisher_timeout),
            ReportingStage::new(sink, self.retry, Arc::clone(&self.clock), self.sleeper),
            self.clock,
            Arc::clone(&ids),
        );

        Ok(Dispatcher::new(Arc::new(pipeline), ids, self.max_concurrent_jobs))
    }
}

fn missing(port: &'static str) -> BuildError {
    BuildError::Config(ConfigError::Invalid {
        field: port,
        reason: "no provider given and no configuration to build one from".to_string(),
    })
}

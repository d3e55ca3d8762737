//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{DeliveryId, JobId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は job / delivery の ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（dispatcher と各 job から共有される）
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;

    fn generate_delivery_id(&self) -> DeliveryId;
}

/// UlidGenerator は Clock の時刻を timestamp 部分に使う
///
/// テスト時に FixedClock を渡すと timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next_ulid())
    }

    fn generate_delivery_id(&self) -> DeliveryId {
        DeliveryId::from(self.next_ulid())
    }
}

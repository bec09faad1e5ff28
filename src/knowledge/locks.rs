//! 문서 id 단위 비동기 락
//!
//! 서로 다른 문서는 병렬로 처리되고, 같은 id에 대한 쓰기(임베딩 생성 포함)는
//! 직렬화됩니다. 마지막으로 완료된 쓰기가 content/embedding 쌍을 결정합니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// id별 락 레지스트리
#[derive(Default)]
pub struct DocumentLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

impl DocumentLocks {
    /// id 락 획득
    pub async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let slot = self.slot(id);
        slot.lock_owned().await
    }

    /// 여러 id 락을 정렬된 순서로 획득 (교착 방지, 중복 id는 한 번만)
    pub async fn lock_many(&self, ids: &[&str]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&str> = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            guards.push(self.lock(id).await);
        }
        guards
    }

    /// 현재 등록된 슬롯 수
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: &str) -> Slot {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // 아무도 잡고 있지 않은 슬롯 정리
        slots.retain(|key, slot| key == id || Arc::strong_count(slot) > 1);

        slots.entry(id.to_string()).or_default().clone()
    }
}

// ============================================================================
// Tests
// ============================================================================

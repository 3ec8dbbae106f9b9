//! Ordering of overlapping write-backs.
//!
//! Write-backs are not sequenced: when two writes for the same node overlap,
//! whichever finishes last decides what storage holds.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use state_vault::{
    ActionContext, ActionHandler, MemoryStorage, ModuleDefinition, PersistingAction, StateVault,
    StorageAdapter, VaultConfig, VaultError, WriteBack,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Storage whose writes block until the test releases them, in the order
/// the writes were started.
struct GatedStorage {
    inner: MemoryStorage,
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    started: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl StorageAdapter for GatedStorage {
    async fn get(&self, key: &str) -> state_vault::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> state_vault::Result<()> {
        let gate = self.gates.lock().pop_front();
        let _ = self.started.send(value.clone());
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> state_vault::Result<()> {
        self.inner.remove(key).await
    }
}

struct Harness {
    storage: Arc<GatedStorage>,
    vault: Arc<StateVault>,
    started: mpsc::UnboundedReceiver<String>,
    releases: Vec<Option<oneshot::Sender<()>>>,
}

fn harness(writes: usize) -> Harness {
    let (started_tx, started) = mpsc::unbounded_channel();
    let mut gates = VecDeque::new();
    let mut releases = Vec::new();
    for _ in 0..writes {
        let (tx, rx) = oneshot::channel();
        gates.push_back(rx);
        releases.push(Some(tx));
    }
    let storage = Arc::new(GatedStorage {
        inner: MemoryStorage::new(),
        gates: Mutex::new(gates),
        started: started_tx,
    });
    let definition = ModuleDefinition::empty()
        .child("cart", ModuleDefinition::new(json!({"items": []})).unwrap());
    let adapter: Arc<dyn StorageAdapter> = storage.clone();
    let vault = StateVault::with_storage(VaultConfig::default(), adapter, &definition).unwrap();
    Harness {
        storage,
        vault,
        started,
        releases,
    }
}

fn set_items() -> PersistingAction {
    WriteBack::wrap(ActionHandler::asynchronous(|ctx: ActionContext| async move {
        let items = ctx.payload().clone();
        ctx.commit(|state| {
            state.insert("items".into(), items);
        })?;
        Ok::<_, VaultError>(Value::Null)
    }))
    .unwrap()
}

impl Harness {
    /// Run the action and wait until its write has reached storage.
    async fn invoke(&mut self, items: Value) -> String {
        let cart = self.vault.handle_at(&["cart".to_string()]).unwrap();
        set_items().invoke(&self.vault, cart, items).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.started.recv())
            .await
            .unwrap()
            .unwrap()
    }

    /// Let write `index` finish and wait until storage holds its blob.
    async fn release(&mut self, index: usize, blob: &str) {
        if let Some(gate) = self.releases[index].take() {
            let _ = gate.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.stored().as_deref() != Some(blob) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    fn stored(&self) -> Option<String> {
        self.storage.inner.entries().get("storage/cart/").cloned()
    }
}

#[tokio::test]
async fn test_earlier_write_finishing_last_wins() {
    let mut h = harness(2);
    let a = h.invoke(json!([1])).await;
    let b = h.invoke(json!([1, 2])).await;
    assert_eq!(a, r#"{"items":[1]}"#);
    assert_eq!(b, r#"{"items":[1,2]}"#);

    h.release(1, &b).await;
    h.release(0, &a).await;
    h.vault.flush().await.unwrap();

    assert_eq!(h.stored(), Some(a));
    // The live tree still reflects the latest commit.
    assert_eq!(h.vault.state()["cart"]["items"], json!([1, 2]));
}

#[tokio::test]
async fn test_later_write_finishing_last_wins() {
    let mut h = harness(2);
    let a = h.invoke(json!(["x"])).await;
    let b = h.invoke(json!(["y"])).await;

    h.release(0, &a).await;
    h.release(1, &b).await;
    assert_eq!(h.vault.flush().await.unwrap(), 2);

    assert_eq!(h.stored(), Some(b));
}

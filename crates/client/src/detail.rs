//! Paper detail panel
//!
//! Opening a citation starts a fetch; opening another one replaces it. The
//! superseded fetch is aborted and a late result for an old id is dropped.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vejovis_common::db::PaperId;

use crate::api::{GatewayClient, PaperDetail};
use crate::errors::Result;

/// Source of paper details
#[async_trait]
pub trait PaperLookup: Send + Sync {
    async fn paper(&self, id: PaperId) -> Result<PaperDetail>;
}

#[async_trait]
impl PaperLookup for GatewayClient {
    async fn paper(&self, id: PaperId) -> Result<PaperDetail> {
        GatewayClient::paper(self, id).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailState {
    Empty,
    Loading(PaperId),
    Loaded(Box<PaperDetail>),
    Failed { id: PaperId, message: String },
}

impl DetailState {
    fn id(&self) -> Option<PaperId> {
        match self {
            DetailState::Empty => None,
            DetailState::Loading(id) | DetailState::Failed { id, .. } => Some(*id),
            DetailState::Loaded(detail) => Some(detail.paper.id),
        }
    }
}

pub struct DetailLoader {
    lookup: Arc<dyn PaperLookup>,
    state: watch::Sender<DetailState>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl DetailLoader {
    pub fn new(lookup: Arc<dyn PaperLookup>) -> Self {
        let (state, _) = watch::channel(DetailState::Empty);
        Self {
            lookup,
            state,
            in_flight: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DetailState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> DetailState {
        self.state.borrow().clone()
    }

    /// Show `id`, replacing whatever was open or loading
    pub fn open(&self, id: PaperId) {
        self.cancel_in_flight();
        self.state.send_replace(DetailState::Loading(id));

        let lookup = Arc::clone(&self.lookup);
        let state = self.state.clone();
        let handle = tokio::spawn(async move {
            let result = lookup.paper(id).await;
            let next = match result {
                Ok(detail) => DetailState::Loaded(Box::new(detail)),
                Err(e) => {
                    tracing::warn!(paper_id = id, error = %e, "Paper detail failed");
                    DetailState::Failed {
                        id,
                        message: e.to_string(),
                    }
                }
            };

            state.send_if_modified(|current| {
                if *current == DetailState::Loading(id) {
                    *current = next;
                    true
                } else {
                    false
                }
            });
        });

        if let Ok(mut slot) = self.in_flight.lock() {
            *slot = Some(handle);
        }
    }

    pub fn close(&self) {
        self.cancel_in_flight();
        self.state.send_replace(DetailState::Empty);
    }

    /// Id currently shown or loading
    pub fn open_id(&self) -> Option<PaperId> {
        self.state.borrow().id()
    }

    fn cancel_in_flight(&self) {
        if let Ok(mut slot) = self.in_flight.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ClientError;
    use std::time::Duration;
    use vejovis_common::db::Paper;

    struct SlowLookup;

    fn paper(id: PaperId) -> PaperDetail {
        PaperDetail {
            paper: Paper {
                id,
                filename: None,
                title: format!("Paper {}", id),
                pub_year: Some(2020),
                summary: None,
                findings: None,
                hypothesis: None,
                entities: vec![],
            },
            pdf_url: None,
        }
    }

    #[async_trait]
    impl PaperLookup for SlowLookup {
        async fn paper(&self, id: PaperId) -> Result<PaperDetail> {
            // Odd ids are slow so a later click can overtake them
            if id % 2 == 1 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            if id == 0 {
                return Err(ClientError::PaperNotFound(0));
            }
            Ok(paper(id))
        }
    }

    async fn settled(rx: &mut watch::Receiver<DetailState>) -> DetailState {
        loop {
            let state = rx.borrow_and_update().clone();
            if !matches!(state, DetailState::Loading(_)) {
                return state;
            }
            rx.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_open_loads_detail() {
        let loader = DetailLoader::new(Arc::new(SlowLookup));
        let mut rx = loader.subscribe();

        loader.open(4);
        assert_eq!(loader.open_id(), Some(4));
        assert_eq!(settled(&mut rx).await, DetailState::Loaded(Box::new(paper(4))));
    }

    #[tokio::test]
    async fn test_newer_click_replaces_slow_fetch() {
        let loader = DetailLoader::new(Arc::new(SlowLookup));
        let mut rx = loader.subscribe();

        loader.open(3);
        loader.open(8);
        assert_eq!(settled(&mut rx).await, DetailState::Loaded(Box::new(paper(8))));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(loader.current(), DetailState::Loaded(Box::new(paper(8))));
    }

    #[tokio::test]
    async fn test_failure_and_close() {
        let loader = DetailLoader::new(Arc::new(SlowLookup));
        let mut rx = loader.subscribe();

        loader.open(0);
        assert!(matches!(settled(&mut rx).await, DetailState::Failed { id: 0, .. }));

        loader.close();
        assert_eq!(loader.current(), DetailState::Empty);
        assert_eq!(loader.open_id(), None);
    }
}

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

use super::Extractor;
use crate::error::ExtractorError;

/// Registro ordenado de extractores
///
/// Order of registration is the order of consultation during a search.
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: RwLock<Vec<Arc<dyn Extractor>>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activa y registra un extractor
    pub async fn register(&self, extractor: Arc<dyn Extractor>) -> Result<(), ExtractorError> {
        let identifier = extractor.identifier().to_string();
        if self.is_registered(&identifier) {
            return Err(ExtractorError::AlreadyRegistered(identifier));
        }

        extractor
            .activate()
            .await
            .map_err(|source| ExtractorError::Activation {
                identifier: identifier.clone(),
                source,
            })?;

        // another caller may have won the race while we were activating
        let lost_race = {
            let mut extractors = self.extractors.write();
            if extractors.iter().any(|e| e.identifier() == identifier) {
                true
            } else {
                extractors.push(Arc::clone(&extractor));
                false
            }
        };
        if lost_race {
            if let Err(e) = extractor.deactivate().await {
                warn!("⚠️ Error al desactivar '{}': {:?}", identifier, e);
            }
            return Err(ExtractorError::AlreadyRegistered(identifier));
        }

        info!("🔌 Extractor registrado: {}", identifier);
        Ok(())
    }

    /// Desactiva y elimina un extractor; devuelve `false` si no existía
    pub async fn unregister(&self, identifier: &str) -> bool {
        let removed = {
            let mut extractors = self.extractors.write();
            extractors
                .iter()
                .position(|e| e.identifier() == identifier)
                .map(|index| extractors.remove(index))
        };

        match removed {
            Some(extractor) => {
                if let Err(e) = extractor.deactivate().await {
                    warn!("⚠️ Error al desactivar '{}': {:?}", identifier, e);
                }
                info!("🔌 Extractor eliminado: {}", identifier);
                true
            }
            None => false,
        }
    }

    pub async fn unregister_all(&self) {
        for identifier in self.identifiers() {
            self.unregister(&identifier).await;
        }
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors
            .read()
            .iter()
            .find(|e| e.identifier() == identifier)
            .cloned()
    }

    pub fn is_registered(&self, identifier: &str) -> bool {
        self.get(identifier).is_some()
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.extractors
            .read()
            .iter()
            .map(|e| e.identifier().to_string())
            .collect()
    }

    /// Copia en orden de registro, para iterar sin mantener el lock
    pub fn snapshot(&self) -> Vec<Arc<dyn Extractor>> {
        self.extractors.read().clone()
    }

    pub fn len(&self) -> usize {
        self.extractors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.read().is_empty()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("extractors", &self.identifiers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{ExtractorContext, ExtractorInfo, StreamSource};
    use crate::search::query::QueryType;
    use crate::track::Track;
    use async_trait::async_trait;
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    struct Dummy {
        id: &'static str,
        fail_activation: bool,
        slow_activation: bool,
        active: AtomicBool,
        deactivations: AtomicUsize,
    }

    impl Dummy {
        fn plain(id: &'static str) -> Self {
            Self {
                id,
                fail_activation: false,
                slow_activation: false,
                active: AtomicBool::new(false),
                deactivations: AtomicUsize::new(0),
            }
        }

        fn new(id: &'static str) -> Arc<Self> {
            Arc::new(Self::plain(id))
        }

        fn slow(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                slow_activation: true,
                ..Self::plain(id)
            })
        }
    }

    #[async_trait]
    impl Extractor for Dummy {
        fn identifier(&self) -> &str {
            self.id
        }
        async fn activate(&self) -> anyhow::Result<()> {
            if self.slow_activation {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            if self.fail_activation {
                anyhow::bail!("no credentials");
            }
            self.active.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn deactivate(&self) -> anyhow::Result<()> {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
            self.active.store(false, Ordering::SeqCst);
            Ok(())
        }
        async fn validate(&self, _query: &str, _query_type: &QueryType) -> bool {
            true
        }
        async fn handle(&self, _q: &str, _c: &ExtractorContext) -> anyhow::Result<ExtractorInfo> {
            Ok(ExtractorInfo::empty())
        }
        async fn stream(&self, track: &Track) -> anyhow::Result<StreamSource> {
            Ok(StreamSource::Url(track.url().to_string()))
        }
    }

    #[tokio::test]
    async fn register_activates_and_keeps_order() {
        let registry = ExtractorRegistry::new();
        let a = Dummy::new("a");
        registry.register(a.clone()).await.unwrap();
        registry.register(Dummy::new("b")).await.unwrap();

        assert!(a.active.load(Ordering::SeqCst));
        assert_eq!(registry.identifiers(), vec!["a", "b"]);
        assert!(matches!(
            registry.register(Dummy::new("a")).await,
            Err(ExtractorError::AlreadyRegistered(_))
        ));
    }

    #[tokio::test]
    async fn unregister_deactivates() {
        let registry = ExtractorRegistry::new();
        let a = Dummy::new("a");
        registry.register(a.clone()).await.unwrap();

        assert!(registry.unregister("a").await);
        assert!(!a.active.load(Ordering::SeqCst));
        assert!(!registry.unregister("a").await);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn failed_activation_is_not_registered() {
        let registry = ExtractorRegistry::new();
        let broken = Arc::new(Dummy {
            fail_activation: true,
            ..Dummy::plain("broken")
        });
        assert!(matches!(
            registry.register(broken).await,
            Err(ExtractorError::Activation { .. })
        ));
        assert!(!registry.is_registered("broken"));
    }

    #[tokio::test(start_paused = true)]
    async fn losing_a_registration_race_deactivates() {
        let registry = ExtractorRegistry::new();
        let first = Dummy::slow("a");
        let second = Dummy::slow("a");

        let (a, b) = tokio::join!(registry.register(first.clone()), registry.register(second.clone()));
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(registry.len(), 1);

        let (winner, loser) = if a.is_ok() { (first, second) } else { (second, first) };
        assert!(winner.active.load(Ordering::SeqCst));
        assert_eq!(winner.deactivations.load(Ordering::SeqCst), 0);
        assert!(!loser.active.load(Ordering::SeqCst));
        assert_eq!(loser.deactivations.load(Ordering::SeqCst), 1);
    }
}

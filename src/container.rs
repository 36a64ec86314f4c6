//! Minimal service container
//!
//! Type-keyed factory registry with singleton and transient lifetimes.
//! Singleton factories run at most once under concurrent resolution; a
//! factory failure memoizes nothing, so later resolves rerun it. Disposal
//! releases every resolved singleton that registered a disposer, attempting
//! all of them and aggregating failures into one error.

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Container resolution and disposal errors.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// No factory registered for the requested type.
    #[error("service not registered: {type_name}")]
    NotRegistered {
        /// The requested type.
        type_name: &'static str,
    },

    /// The factory failed; for singletons nothing was memoized.
    #[error("factory for {type_name} failed: {source}")]
    Factory {
        /// The requested type.
        type_name: &'static str,
        /// Factory failure.
        #[source]
        source: anyhow::Error,
    },

    /// One or more disposers failed; all of them were attempted.
    #[error("disposal failed: {}", .errors.join("; "))]
    Disposal {
        /// One entry per failed disposer.
        errors: Vec<String>,
    },
}

/// Scoped-release hook for container-managed services.
pub trait Disposable: Send + Sync {
    /// Releases held resources. Must be idempotent.
    fn dispose(&self) -> Result<(), anyhow::Error>;
}

type AnyService = Arc<dyn Any + Send + Sync>;
type ServiceFactory = Arc<dyn Fn(&ServiceContainer) -> Result<AnyService, anyhow::Error> + Send + Sync>;
type ServiceDisposer = Arc<dyn Fn(&AnyService) -> Result<(), anyhow::Error> + Send + Sync>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lifetime {
    Singleton,
    Transient,
}

struct Registration {
    lifetime: Lifetime,
    factory: ServiceFactory,
    disposer: Option<ServiceDisposer>,
}

/// Type-to-factory registry with singleton and transient lifetimes.
#[derive(Default)]
pub struct ServiceContainer {
    registrations: RwLock<HashMap<TypeId, Registration>>,
    singletons: DashMap<TypeId, Arc<OnceCell<AnyService>>>,
    disposed: AtomicBool,
}

impl ServiceContainer {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a singleton factory. Re-registration replaces the factory
    /// and discards any previously resolved instance.
    pub fn register_singleton<T: Send + Sync + 'static>(
        &self,
        factory: impl Fn(&ServiceContainer) -> Result<Arc<T>, anyhow::Error> + Send + Sync + 'static,
    ) {
        self.register::<T>(Lifetime::Singleton, factory, None);
    }

    /// Registers a singleton whose instance is released on [`dispose`].
    ///
    /// [`dispose`]: ServiceContainer::dispose
    pub fn register_singleton_disposable<T: Disposable + 'static>(
        &self,
        factory: impl Fn(&ServiceContainer) -> Result<Arc<T>, anyhow::Error> + Send + Sync + 'static,
    ) {
        let disposer: ServiceDisposer = Arc::new(|service: &AnyService| {
            service
                .clone()
                .downcast::<T>()
                .map_err(|_| anyhow::anyhow!("disposer type mismatch for {}", type_name::<T>()))?
                .dispose()
        });
        self.register::<T>(Lifetime::Singleton, factory, Some(disposer));
    }

    /// Registers a transient factory; it runs on every resolve.
    pub fn register_transient<T: Send + Sync + 'static>(
        &self,
        factory: impl Fn(&ServiceContainer) -> Result<Arc<T>, anyhow::Error> + Send + Sync + 'static,
    ) {
        self.register::<T>(Lifetime::Transient, factory, None);
    }

    fn register<T: Send + Sync + 'static>(
        &self,
        lifetime: Lifetime,
        factory: impl Fn(&ServiceContainer) -> Result<Arc<T>, anyhow::Error> + Send + Sync + 'static,
        disposer: Option<ServiceDisposer>,
    ) {
        let type_id = TypeId::of::<T>();
        let erased: ServiceFactory =
            Arc::new(move |container| factory(container).map(|service| service as AnyService));
        self.registrations
            .write()
            .expect("container lock poisoned")
            .insert(
                type_id,
                Registration {
                    lifetime,
                    factory: erased,
                    disposer,
                },
            );
        self.singletons.remove(&type_id);
    }

    /// Resolves a service by type.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        let type_id = TypeId::of::<T>();
        let (lifetime, factory) = {
            let registrations = self.registrations.read().expect("container lock poisoned");
            let registration =
                registrations
                    .get(&type_id)
                    .ok_or(ContainerError::NotRegistered {
                        type_name: type_name::<T>(),
                    })?;
            (registration.lifetime, Arc::clone(&registration.factory))
        };

        let service: AnyService = match lifetime {
            Lifetime::Transient => factory(self).map_err(|source| ContainerError::Factory {
                type_name: type_name::<T>(),
                source,
            })?,
            Lifetime::Singleton => {
                let slot = self
                    .singletons
                    .entry(type_id)
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .clone();
                // `get_or_try_init` runs the factory at most once across
                // concurrent resolvers and memoizes nothing on failure.
                slot.get_or_try_init(|| factory(self))
                    .map_err(|source| ContainerError::Factory {
                        type_name: type_name::<T>(),
                        source,
                    })?
                    .clone()
            }
        };

        service
            .downcast::<T>()
            .map_err(|_| ContainerError::Factory {
                type_name: type_name::<T>(),
                source: anyhow::anyhow!("factory produced an unexpected type"),
            })
    }

    /// Releases every resolved singleton with a registered disposer. Every
    /// disposer is attempted; failures are aggregated. Idempotent.
    pub fn dispose(&self) -> Result<(), ContainerError> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let registrations = self.registrations.read().expect("container lock poisoned");
        let mut errors = Vec::new();
        for entry in self.singletons.iter() {
            let Some(service) = entry.value().get() else {
                continue;
            };
            let Some(disposer) = registrations
                .get(entry.key())
                .and_then(|r| r.disposer.as_ref())
            else {
                continue;
            };
            if let Err(error) = disposer(service) {
                errors.push(error.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::Disposal { errors })
        }
    }

    /// Whether `dispose` has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field(
                "registrations",
                &self
                    .registrations
                    .read()
                    .expect("container lock poisoned")
                    .len(),
            )
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct Config {
        name: String,
    }

    struct Service {
        config_name: String,
    }

    #[test]
    fn singleton_resolves_to_the_same_instance() {
        let container = ServiceContainer::new();
        container.register_singleton(|_| {
            Ok(Arc::new(Config {
                name: "prod".to_string(),
            }))
        });

        let a = container.resolve::<Config>().unwrap();
        let b = container.resolve::<Config>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name, "prod");
    }

    #[test]
    fn transient_resolves_fresh_instances() {
        let container = ServiceContainer::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        container.register_transient(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Config {
                name: "t".to_string(),
            }))
        });

        let a = container.resolve::<Config>().unwrap();
        let b = container.resolve::<Config>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn factories_can_resolve_dependencies() {
        let container = ServiceContainer::new();
        container.register_singleton(|_| {
            Ok(Arc::new(Config {
                name: "dep".to_string(),
            }))
        });
        container.register_singleton(|c| {
            let config = c.resolve::<Config>()?;
            Ok(Arc::new(Service {
                config_name: config.name.clone(),
            }))
        });

        let service = container.resolve::<Service>().unwrap();
        assert_eq!(service.config_name, "dep");
    }

    #[test]
    fn unregistered_type_errors() {
        let container = ServiceContainer::new();
        let error = container.resolve::<Config>().unwrap_err();
        assert!(matches!(error, ContainerError::NotRegistered { .. }));
    }

    #[test]
    fn failed_factory_is_not_memoized() {
        let container = ServiceContainer::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        container.register_singleton(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(anyhow::anyhow!("database unavailable"))
            } else {
                Ok(Arc::new(Config {
                    name: "recovered".to_string(),
                }))
            }
        });

        assert!(container.resolve::<Config>().is_err());
        let resolved = container.resolve::<Config>().unwrap();
        assert_eq!(resolved.name, "recovered");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_resolution_runs_the_factory_once() {
        let container = Arc::new(ServiceContainer::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        container.register_singleton(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(Arc::new(Config {
                name: "shared".to_string(),
            }))
        });

        let mut handles = Vec::new();
        for _ in 0..100 {
            let container = Arc::clone(&container);
            handles.push(std::thread::spawn(move || {
                container.resolve::<Config>().unwrap()
            }));
        }
        let instances: Vec<Arc<Config>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        for instance in &instances[1..] {
            assert!(Arc::ptr_eq(&instances[0], instance));
        }
    }

    struct FlakyResource {
        fail: bool,
        released: Arc<AtomicUsize>,
    }

    impl Disposable for FlakyResource {
        fn dispose(&self) -> Result<(), anyhow::Error> {
            self.released.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(anyhow::anyhow!("release failed"))
            } else {
                Ok(())
            }
        }
    }

    struct GoodResource {
        released: Arc<AtomicUsize>,
    }

    impl Disposable for GoodResource {
        fn dispose(&self) -> Result<(), anyhow::Error> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn dispose_attempts_every_disposer_and_aggregates() {
        let container = ServiceContainer::new();
        let releases = Arc::new(AtomicUsize::new(0));

        let r1 = Arc::clone(&releases);
        container.register_singleton_disposable(move |_| {
            Ok(Arc::new(FlakyResource {
                fail: true,
                released: Arc::clone(&r1),
            }))
        });
        let r2 = Arc::clone(&releases);
        container.register_singleton_disposable(move |_| {
            Ok(Arc::new(GoodResource {
                released: Arc::clone(&r2),
            }))
        });

        container.resolve::<FlakyResource>().unwrap();
        container.resolve::<GoodResource>().unwrap();

        let error = container.dispose().unwrap_err();
        assert!(matches!(&error, ContainerError::Disposal { errors } if errors.len() == 1));
        // Both disposers ran despite the failure.
        assert_eq!(releases.load(Ordering::SeqCst), 2);

        // Idempotent: a second dispose is a no-op.
        assert!(container.dispose().is_ok());
        assert_eq!(releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unresolved_singletons_are_not_disposed() {
        let container = ServiceContainer::new();
        let releases = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&releases);
        container.register_singleton_disposable(move |_| {
            Ok(Arc::new(GoodResource {
                released: Arc::clone(&r),
            }))
        });

        container.dispose().unwrap();
        assert_eq!(releases.load(Ordering::SeqCst), 0);
    }
}

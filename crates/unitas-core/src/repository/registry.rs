//! Typed repository registry.
//!
//! Maps repository types to constructors. Resolving a type builds a fresh
//! instance and binds it to the caller's session, so no instance is ever
//! shared between scopes.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::marker::PhantomData;

use unitas_types::error::{DataError, DataResult};

/// A repository that operates on a session of type `S`.
pub trait SessionBound<S>: Send + 'static {
    fn bind_session(&mut self, session: S);

    fn session(&self) -> Option<&S>;
}

type Constructor = Box<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

struct Registration {
    name: String,
    construct: Constructor,
}

/// Registry of repository constructors, keyed by repository type.
pub struct RepositoryRegistry<S> {
    entries: HashMap<TypeId, Registration>,
    _session: PhantomData<fn(S)>,
}

impl<S: 'static> RepositoryRegistry<S> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            _session: PhantomData,
        }
    }

    /// Register a constructor for `R`. Registering the same type again replaces it.
    pub fn register<R, F>(&mut self, constructor: F) -> &mut Self
    where
        R: SessionBound<S>,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let name = repository_name::<R>();
        tracing::debug!(repository = %name, "registered repository");
        self.entries.insert(
            TypeId::of::<R>(),
            Registration {
                name,
                construct: Box::new(move || Box::new(constructor()) as Box<dyn Any + Send>),
            },
        );
        self
    }

    pub fn register_default<R>(&mut self) -> &mut Self
    where
        R: SessionBound<S> + Default,
    {
        self.register::<R, _>(R::default)
    }

    /// Builder form of [`RepositoryRegistry::register_default`].
    pub fn with<R>(mut self) -> Self
    where
        R: SessionBound<S> + Default,
    {
        self.register_default::<R>();
        self
    }

    pub fn contains<R: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<R>())
    }

    /// Registered repository names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.values().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a new `R` bound to `session`.
    pub fn resolve<R: SessionBound<S>>(&self, session: S) -> DataResult<R> {
        let entry = self
            .entries
            .get(&TypeId::of::<R>())
            .ok_or_else(|| DataError::RepositoryNotFound {
                name: repository_name::<R>(),
            })?;
        let mut repository = (entry.construct)()
            .downcast::<R>()
            .map_err(|_| DataError::RepositoryNotFound {
                name: entry.name.clone(),
            })?;
        repository.bind_session(session);
        Ok(*repository)
    }
}

impl<S: 'static> Default for RepositoryRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type name of `R` with module paths stripped, e.g. `SqliteRepository<Account>`.
pub fn repository_name<R: ?Sized>() -> String {
    let full = type_name::<R>();
    let mut name = String::with_capacity(full.len());
    let mut path = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            path.push(ch);
        } else {
            name.push_str(last_segment(&path));
            path.clear();
            name.push(ch);
        }
    }
    name.push_str(last_segment(&path));
    name
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct FakeSession(u32);

    #[derive(Default)]
    struct AuditRepository {
        session: Option<FakeSession>,
    }

    impl SessionBound<FakeSession> for AuditRepository {
        fn bind_session(&mut self, session: FakeSession) {
            self.session = Some(session);
        }

        fn session(&self) -> Option<&FakeSession> {
            self.session.as_ref()
        }
    }

    struct TaggedRepository {
        tag: &'static str,
        session: Option<FakeSession>,
    }

    impl SessionBound<FakeSession> for TaggedRepository {
        fn bind_session(&mut self, session: FakeSession) {
            self.session = Some(session);
        }

        fn session(&self) -> Option<&FakeSession> {
            self.session.as_ref()
        }
    }

    #[test]
    fn test_resolve_binds_fresh_instance() {
        let registry = RepositoryRegistry::<FakeSession>::new().with::<AuditRepository>();

        let first: AuditRepository = registry.resolve(FakeSession(1)).unwrap();
        let second: AuditRepository = registry.resolve(FakeSession(2)).unwrap();
        assert_eq!(first.session(), Some(&FakeSession(1)));
        assert_eq!(second.session(), Some(&FakeSession(2)));
    }

    #[test]
    fn test_custom_constructor() {
        let mut registry = RepositoryRegistry::<FakeSession>::new();
        registry.register(|| TaggedRepository {
            tag: "orders",
            session: None,
        });

        let repo: TaggedRepository = registry.resolve(FakeSession(7)).unwrap();
        assert_eq!(repo.tag, "orders");
        assert_eq!(repo.session(), Some(&FakeSession(7)));
        assert!(registry.contains::<TaggedRepository>());
        assert!(!registry.contains::<AuditRepository>());
    }

    #[test]
    fn test_unregistered_type_names_the_type() {
        let registry = RepositoryRegistry::<FakeSession>::default();
        let err = registry
            .resolve::<AuditRepository>(FakeSession(1))
            .err()
            .unwrap();
        match err {
            DataError::RepositoryNotFound { name } => assert_eq!(name, "AuditRepository"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_names_are_sorted_and_short() {
        let registry = RepositoryRegistry::<FakeSession>::new().with::<AuditRepository>();
        assert_eq!(registry.names(), vec!["AuditRepository"]);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            repository_name::<Option<AuditRepository>>(),
            "Option<AuditRepository>"
        );
    }
}

use std::collections::HashMap;
use std::sync::RwLock;

use brainflow_core::Entity;

use super::RepositoryError;

/// In-memory, id-keyed store for tests/dev.
#[derive(Debug)]
pub struct InMemoryEntityStore<E: Entity> {
    inner: RwLock<HashMap<E::Id, E>>,
}

impl<E: Entity> InMemoryEntityStore<E> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<E: Entity> Default for InMemoryEntityStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Storage("entity store lock poisoned".to_string())
}

impl<E> InMemoryEntityStore<E>
where
    E: Entity + Clone,
{
    pub fn insert_new(&self, entity: E) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let id = entity.id();
        if map.contains_key(&id) {
            return Err(RepositoryError::AlreadyExists(format!("{id:?}")));
        }
        map.insert(id, entity);
        Ok(())
    }

    pub fn find(&self, id: E::Id) -> Result<Option<E>, RepositoryError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(&id).cloned())
    }

    pub fn replace(&self, entity: &E) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let id = entity.id();
        match map.get_mut(&id) {
            Some(slot) => {
                *slot = entity.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("{id:?}"))),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Pipeline pooling
//!
//! Definitions are built once per key and shared. Instances are rented with
//! [`PipelinePool::acquire`]; the returned guard resets the instance and puts it
//! back when dropped, including when the borrower returns early with an error.

use crate::bus::error::{BusResult, ServiceBusError};
use crate::core::sync::{handle_mutex_poison, handle_rwlock_read, handle_rwlock_write};
use crate::pipeline::definition::PipelineDefinition;
use crate::pipeline::pipeline::Pipeline;
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, RwLock};

type DefineFn<K> = dyn Fn(&K) -> BusResult<PipelineDefinition> + Send + Sync;
type ObtainedFn<K> = dyn Fn(&K, &mut Pipeline) -> BusResult<()> + Send + Sync;

fn lock_error(message: String) -> ServiceBusError {
    ServiceBusError::Synchronisation { message }
}

pub struct PipelinePool<K> {
    define: Box<DefineFn<K>>,
    obtained: Option<Box<ObtainedFn<K>>>,
    definitions: RwLock<HashMap<K, Arc<PipelineDefinition>>>,
    idle: Mutex<HashMap<K, Vec<Pipeline>>>,
}

impl<K> PipelinePool<K>
where
    K: Clone + Eq + Hash + Send,
{
    pub fn new(define: impl Fn(&K) -> BusResult<PipelineDefinition> + Send + Sync + 'static) -> Self {
        Self {
            define: Box::new(define),
            obtained: None,
            definitions: RwLock::new(HashMap::new()),
            idle: Mutex::new(HashMap::new()),
        }
    }

    /// Hook run on every instance handed out, after it has been reset
    pub fn with_obtained(
        mut self,
        obtained: impl Fn(&K, &mut Pipeline) -> BusResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.obtained = Some(Box::new(obtained));
        self
    }

    pub fn definition(&self, key: &K) -> BusResult<Arc<PipelineDefinition>> {
        {
            let definitions = handle_rwlock_read(self.definitions.read(), lock_error)?;
            if let Some(definition) = definitions.get(key) {
                return Ok(Arc::clone(definition));
            }
        }

        let mut definitions = handle_rwlock_write(self.definitions.write(), lock_error)?;
        if let Some(definition) = definitions.get(key) {
            return Ok(Arc::clone(definition));
        }
        let definition = Arc::new((self.define)(key)?);
        definitions.insert(key.clone(), Arc::clone(&definition));
        Ok(definition)
    }

    /// Rent an instance, constructing one when none is idle
    pub fn acquire(&self, key: K) -> BusResult<PooledPipeline<'_, K>> {
        let reused = {
            let mut idle = handle_mutex_poison(self.idle.lock(), lock_error)?;
            idle.get_mut(&key).and_then(|pipelines| pipelines.pop())
        };

        let mut pipeline = match reused {
            Some(pipeline) => pipeline,
            None => Pipeline::new(self.definition(&key)?),
        };

        if let Some(obtained) = &self.obtained {
            obtained(&key, &mut pipeline)?;
        }

        Ok(PooledPipeline {
            pool: self,
            key,
            pipeline: Some(pipeline),
        })
    }

    fn release(&self, key: K, mut pipeline: Pipeline) {
        pipeline.reset();
        match self.idle.lock() {
            Ok(mut idle) => idle.entry(key).or_default().push(pipeline),
            Err(_) => log::warn!("Pipeline pool lock poisoned; discarding '{}'", pipeline.name()),
        }
    }

    pub fn idle_count(&self, key: &K) -> usize {
        self.idle
            .lock()
            .map(|idle| idle.get(key).map(|p| p.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Drop every idle instance
    pub fn clear(&self) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.clear();
        }
    }
}

/// Scoped rental of a pooled pipeline
pub struct PooledPipeline<'a, K>
where
    K: Clone + Eq + Hash + Send,
{
    pool: &'a PipelinePool<K>,
    key: K,
    pipeline: Option<Pipeline>,
}

impl<K> Deref for PooledPipeline<'_, K>
where
    K: Clone + Eq + Hash + Send,
{
    type Target = Pipeline;

    fn deref(&self) -> &Pipeline {
        self.pipeline
            .as_ref()
            .unwrap_or_else(|| unreachable!("pipeline is present until drop"))
    }
}

impl<K> DerefMut for PooledPipeline<'_, K>
where
    K: Clone + Eq + Hash + Send,
{
    fn deref_mut(&mut self) -> &mut Pipeline {
        self.pipeline
            .as_mut()
            .unwrap_or_else(|| unreachable!("pipeline is present until drop"))
    }
}

impl<K> Drop for PooledPipeline<'_, K>
where
    K: Clone + Eq + Hash + Send,
{
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            self.pool.release(self.key.clone(), pipeline);
        }
    }
}

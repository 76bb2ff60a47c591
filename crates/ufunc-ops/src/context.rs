//! Execution context: a backend bound to its resolved dispatch table.

use std::sync::Arc;

use tracing::info;
use ufunc_core::{
    Array, Backend, CpuRefBackend, DType, Element, HostBuffer, Result, Scalar, Shape, UfuncError,
};

use crate::assign::assign;
use crate::config::Config;
use crate::dispatch::DispatchTable;

/// A backend together with every entry point the registry needs from it.
///
/// Construction resolves the whole dispatch table up front, so a backend
/// missing an entry point is rejected here rather than in the middle of a
/// call. The table is read-only afterwards.
pub struct Context {
    backend: Arc<dyn Backend>,
    table: DispatchTable,
    config: Config,
}

impl Context {
    /// Bind `backend`, reading the configuration from the environment.
    pub fn new(backend: Arc<dyn Backend>) -> Result<Self> {
        Self::with_config(backend, Config::from_env())
    }

    pub fn with_config(backend: Arc<dyn Backend>, config: Config) -> Result<Self> {
        let table = DispatchTable::build(backend.as_ref())?;
        info!(
            backend = backend.name(),
            entries = table.len(),
            broadcast = ?config.broadcast,
            "Initialized ufunc context"
        );
        Ok(Self {
            backend,
            table,
            config,
        })
    }

    /// Context over a fresh CPU reference backend.
    pub fn cpu() -> Result<Self> {
        Self::new(Arc::new(CpuRefBackend::new()))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ── Array construction ──────────────────────────────────────────────

    /// Allocate an array with unspecified contents.
    pub fn empty(&self, shape: &Shape, dtype: DType) -> Result<Array> {
        Array::empty(&self.backend, shape, dtype)
    }

    /// Allocate an array and fill it with `value` cast to `dtype`.
    pub fn full(&self, shape: &Shape, dtype: DType, value: impl Into<Scalar>) -> Result<Array> {
        let array = self.empty(shape, dtype)?;
        let value: Scalar = value.into();
        assign(self, value, &array)?;
        Ok(array)
    }

    pub fn from_vec<T: Element>(&self, data: Vec<T>, shape: &Shape) -> Result<Array> {
        Array::from_vec(&self.backend, data, shape)
    }

    pub fn from_host(&self, data: HostBuffer, shape: &Shape) -> Result<Array> {
        Array::from_host(&self.backend, data, shape)
    }

    /// Reject arrays that live in another backend.
    pub(crate) fn check_array(&self, array: &Array) -> Result<()> {
        if std::ptr::addr_eq(Arc::as_ptr(array.backend()), Arc::as_ptr(&self.backend)) {
            Ok(())
        } else {
            Err(UfuncError::InvalidArgument(format!(
                "array {:?} belongs to backend '{}', not this context's '{}'",
                array.id(),
                array.backend().name(),
                self.backend.name(),
            )))
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("backend", &self.backend.name())
            .field("entries", &self.table.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BroadcastPolicy;

    #[test]
    fn test_cpu_context() {
        let ctx = Context::cpu().unwrap();
        assert_eq!(ctx.backend().name(), "cpu-ref");
        assert!(!ctx.table().is_empty());
    }

    #[test]
    fn test_with_config() {
        let config = Config::default().with_broadcast(BroadcastPolicy::EqualShapes);
        let ctx = Context::with_config(Arc::new(CpuRefBackend::new()), config).unwrap();
        assert_eq!(ctx.config().broadcast, BroadcastPolicy::EqualShapes);
    }

    #[test]
    fn test_full() {
        let ctx = Context::cpu().unwrap();
        let a = ctx.full(&Shape::new(vec![2, 3]), DType::F32, 1.5f64).unwrap();
        assert_eq!(a.dtype(), DType::F32);
        assert_eq!(a.to_vec::<f32>().unwrap(), vec![1.5; 6]);
    }

    #[test]
    fn test_foreign_array_rejected() {
        let ctx = Context::cpu().unwrap();
        let other = Context::cpu().unwrap();
        let a = other.from_vec(vec![1i8, 2], &Shape::new(vec![2])).unwrap();
        assert!(matches!(
            ctx.check_array(&a),
            Err(UfuncError::InvalidArgument(_))
        ));
        assert!(other.check_array(&a).is_ok());
    }
}

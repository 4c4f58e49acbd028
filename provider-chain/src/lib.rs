//! A generic, sticky-active provider chain.
//!
//! Used identically by the embedding providers and the LLM providers: an
//! ordered list of providers, tried in turn, with the last success cached
//! so subsequent calls skip straight to it until it fails.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Capability every chain member must expose so the chain can name it in
/// errors and skip it when it reports itself unavailable.
pub trait ProviderMeta {
    fn id(&self) -> &str;
    fn is_available(&self) -> bool;
}

/// All providers were unavailable or failed; carries one error per
/// provider that was actually attempted.
#[derive(Debug)]
pub struct AllProvidersFailed<E> {
    pub errors: HashMap<String, E>,
}

impl<E: fmt::Display> fmt::Display for AllProvidersFailed<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all providers failed: ")?;
        for (i, (id, err)) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{id}: {err}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for AllProvidersFailed<E> {}

/// An ordered provider list with availability-skip and sticky-success
/// semantics, generic over any provider trait object `P`.
pub struct Chain<P: ?Sized> {
    providers: Vec<Arc<P>>,
    active: Mutex<Option<usize>>,
}

impl<P: ProviderMeta + ?Sized> Chain<P> {
    pub fn new(providers: Vec<Arc<P>>) -> Self {
        Self {
            providers,
            active: Mutex::new(None),
        }
    }

    /// Run `op` against the chain: the sticky-active provider first (if
    /// any), then each configured provider in order, skipping any whose
    /// `is_available()` reports false. The first success becomes sticky.
    pub fn call<T, E>(
        &self,
        mut op: impl FnMut(&P) -> Result<T, E>,
    ) -> Result<T, AllProvidersFailed<E>> {
        let mut errors = HashMap::new();

        let sticky_index = *self.active.lock().unwrap();
        if let Some(idx) = sticky_index {
            if let Some(provider) = self.providers.get(idx) {
                match op(provider) {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        tracing::debug!(provider = provider.id(), "sticky provider failed, clearing");
                        errors.insert(provider.id().to_string(), err);
                        *self.active.lock().unwrap() = None;
                    }
                }
            }
        }

        for (idx, provider) in self.providers.iter().enumerate() {
            if Some(idx) == sticky_index {
                continue; // already tried above
            }
            if !provider.is_available() {
                continue;
            }
            match op(provider) {
                Ok(value) => {
                    *self.active.lock().unwrap() = Some(idx);
                    tracing::debug!(provider = provider.id(), "provider chain sticky-active set");
                    return Ok(value);
                }
                Err(err) => {
                    errors.insert(provider.id().to_string(), err);
                }
            }
        }

        Err(AllProvidersFailed { errors })
    }

    /// Async counterpart of [`Chain::call`] for providers whose calls are
    /// themselves async (HTTP clients, subprocess I/O). Same sticky-active
    /// and skip-unavailable semantics, just awaited instead of blocking.
    pub async fn call_async<T, E, Fut>(
        &self,
        mut op: impl FnMut(&P) -> Fut,
    ) -> Result<T, AllProvidersFailed<E>>
    where
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut errors = HashMap::new();

        let sticky_index = *self.active.lock().unwrap();
        if let Some(idx) = sticky_index {
            if let Some(provider) = self.providers.get(idx) {
                match op(provider).await {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        tracing::debug!(provider = provider.id(), "sticky provider failed, clearing");
                        errors.insert(provider.id().to_string(), err);
                        *self.active.lock().unwrap() = None;
                    }
                }
            }
        }

        for (idx, provider) in self.providers.iter().enumerate() {
            if Some(idx) == sticky_index {
                continue;
            }
            if !provider.is_available() {
                continue;
            }
            match op(provider).await {
                Ok(value) => {
                    *self.active.lock().unwrap() = Some(idx);
                    tracing::debug!(provider = provider.id(), "provider chain sticky-active set");
                    return Ok(value);
                }
                Err(err) => {
                    errors.insert(provider.id().to_string(), err);
                }
            }
        }

        Err(AllProvidersFailed { errors })
    }

    pub fn providers(&self) -> &[Arc<P>] {
        &self.providers
    }

    pub fn active_provider_id(&self) -> Option<String> {
        let idx = (*self.active.lock().unwrap())?;
        self.providers.get(idx).map(|p| p.id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake {
        id: &'static str,
        available: bool,
        fail_times: Mutex<u32>,
        probe_count: std::sync::atomic::AtomicU32,
    }

    impl ProviderMeta for Fake {
        fn id(&self) -> &str {
            self.id
        }
        fn is_available(&self) -> bool {
            self.probe_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.available
        }
    }

    fn fake(id: &'static str, available: bool, fail_times: u32) -> Arc<Fake> {
        Arc::new(Fake {
            id,
            available,
            fail_times: Mutex::new(fail_times),
            probe_count: std::sync::atomic::AtomicU32::new(0),
        })
    }

    fn try_op(p: &Fake) -> Result<&'static str, String> {
        let mut remaining = p.fail_times.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            Err(format!("{} still failing", p.id))
        } else {
            Ok(p.id)
        }
    }

    #[test]
    fn skips_unavailable_providers_in_order() {
        let chain = Chain::new(vec![fake("p1", false, 0), fake("p2", true, 0)]);
        let result = chain.call(try_op).unwrap();
        assert_eq!(result, "p2");
    }

    #[test]
    fn becomes_sticky_after_first_success_and_skips_probing() {
        let p1 = fake("p1", true, 0);
        let chain = Chain::new(vec![p1.clone(), fake("p2", true, 0)]);
        // first call: p1 is probed, succeeds immediately, and becomes sticky
        let result = chain.call(try_op).unwrap();
        assert_eq!(result, "p1");
        assert_eq!(chain.active_provider_id().as_deref(), Some("p1"));

        // second call goes straight to the sticky provider without probing
        // its availability again
        let probes_before = p1.probe_count.load(std::sync::atomic::Ordering::SeqCst);
        let result = chain.call(try_op).unwrap();
        assert_eq!(result, "p1");
        assert_eq!(p1.probe_count.load(std::sync::atomic::Ordering::SeqCst), probes_before);
    }

    #[test]
    fn all_providers_failed_aggregates_errors() {
        let chain: Chain<Fake> = Chain::new(vec![fake("p1", true, 99), fake("p2", true, 99)]);
        let err = chain.call(try_op).unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert!(err.errors.contains_key("p1"));
        assert!(err.errors.contains_key("p2"));
    }

    #[test]
    fn sticky_provider_failure_clears_cache_and_falls_through() {
        let p1 = fake("p1", true, 0);
        let chain = Chain::new(vec![p1.clone(), fake("p2", true, 0)]);
        assert_eq!(chain.call(try_op).unwrap(), "p1");
        assert_eq!(chain.active_provider_id().as_deref(), Some("p1"));
        // p1 now sticky; make its one attempt fail, forcing fallback to p2
        *p1.fail_times.lock().unwrap() = 1;
        assert_eq!(chain.call(try_op).unwrap(), "p2");
        assert_eq!(chain.active_provider_id().as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn call_async_becomes_sticky_after_first_success() {
        let chain = Chain::new(vec![fake("p1", false, 0), fake("p2", true, 0)]);
        let result = chain
            .call_async(|p| async move { try_op(p) })
            .await
            .unwrap();
        assert_eq!(result, "p2");
        assert_eq!(chain.active_provider_id().as_deref(), Some("p2"));
    }
}

//! The gateway proper: per-key concurrency permits plus rate-limit retry.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

use narravo_models::ProviderKind;

use crate::backoff::RetryPolicy;
use crate::error::{ProviderError, ProviderResult};
use crate::gemini::GeminiImageProvider;
use crate::openai::OpenAiCompatibleProvider;
use crate::{ChatMessage, ChatOptions, ChatReply, ImageOptions, ImageResult, Provider, TtsOptions};

/// Default in-flight requests allowed per API key.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Gateway over one provider adapter, scoped to one API key.
///
/// The permit semaphore bounds in-flight calls for the key; 429s are
/// retried with exponential back-off; every wait (permit or sleep) honors
/// the attached cancellation signal.
#[derive(Clone)]
pub struct ProviderGateway {
    adapter: Arc<dyn Provider>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
    cancel: Option<watch::Receiver<bool>>,
}

impl ProviderGateway {
    pub fn new(adapter: Arc<dyn Provider>, max_concurrency: usize) -> Self {
        Self {
            adapter,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            retry: RetryPolicy::default(),
            cancel: None,
        }
    }

    /// Build a gateway for a key's provider family with the decrypted
    /// secret. This is the single place plaintext secrets are handled.
    pub fn for_key(
        kind: ProviderKind,
        plaintext_secret: impl Into<String>,
        base_url: Option<String>,
        max_concurrency: usize,
    ) -> Self {
        let adapter: Arc<dyn Provider> = match kind {
            ProviderKind::GeminiImage => {
                Arc::new(GeminiImageProvider::new(plaintext_secret, base_url))
            }
            other => Arc::new(OpenAiCompatibleProvider::for_kind(
                other,
                plaintext_secret,
                base_url,
            )),
        };
        Self::new(adapter, max_concurrency)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Thread a cancellation signal through permit waits and back-off sleeps.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn adapter_name(&self) -> &'static str {
        self.adapter.name()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Sleep that aborts early when the cancel signal fires.
    async fn sleep_cancellable(&self, duration: std::time::Duration) -> ProviderResult<()> {
        let Some(cancel) = self.cancel.clone() else {
            tokio::time::sleep(duration).await;
            return Ok(());
        };
        let mut cancel = cancel;
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return Err(ProviderError::Cancelled);
                    }
                }
            }
        }
    }

    /// Acquire a permit, honoring cancellation.
    async fn acquire(&self) -> ProviderResult<tokio::sync::OwnedSemaphorePermit> {
        if self.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let permits = Arc::clone(&self.permits);
        let Some(cancel) = self.cancel.clone() else {
            return permits
                .acquire_owned()
                .await
                .map_err(|_| ProviderError::Cancelled);
        };
        let mut cancel = cancel;
        let acquire = permits.acquire_owned();
        tokio::pin!(acquire);
        loop {
            tokio::select! {
                permit = &mut acquire => {
                    return permit.map_err(|_| ProviderError::Cancelled);
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return Err(ProviderError::Cancelled);
                    }
                }
            }
        }
    }

    /// Run an operation under a permit with rate-limit retries.
    ///
    /// Non-rate-limit errors propagate immediately. Each 429 is followed by
    /// a back-off sleep, the last one included, so exhaustion of a 5-attempt
    /// budget spends roughly 1+2+4+8+16 seconds before `RateLimited`
    /// surfaces.
    async fn run<T, F, Fut>(&self, op: F) -> ProviderResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let _permit = self.acquire().await?;

        for attempt in 0..self.retry.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(ProviderError::RateLimited) => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        provider = self.adapter.name(),
                        attempt = attempt + 1,
                        max = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "provider rate limited, backing off"
                    );
                    self.sleep_cancellable(delay).await?;
                }
                Err(other) => return Err(other),
            }
        }

        debug!(provider = self.adapter.name(), "rate-limit retries exhausted");
        Err(ProviderError::RateLimited)
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        opts: &ChatOptions,
    ) -> ProviderResult<ChatReply> {
        self.run(|| self.adapter.chat(messages, model, opts)).await
    }

    pub async fn image(
        &self,
        prompt: &str,
        model: &str,
        opts: &ImageOptions,
    ) -> ProviderResult<ImageResult> {
        self.run(|| self.adapter.image(prompt, model, opts)).await
    }

    pub async fn tts(
        &self,
        text: &str,
        voice: &str,
        model: &str,
        opts: &TtsOptions,
    ) -> ProviderResult<Vec<u8>> {
        self.run(|| self.adapter.tts(text, voice, model, opts)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct AlwaysRateLimited {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Provider for AlwaysRateLimited {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _model: &str,
            _opts: &ChatOptions,
        ) -> ProviderResult<ChatReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::RateLimited)
        }

        async fn image(
            &self,
            _prompt: &str,
            _model: &str,
            _opts: &ImageOptions,
        ) -> ProviderResult<ImageResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::RateLimited)
        }

        async fn tts(
            &self,
            _text: &str,
            _voice: &str,
            _model: &str,
            _opts: &TtsOptions,
        ) -> ProviderResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::RateLimited)
        }

        fn name(&self) -> &'static str {
            "always_429"
        }
    }

    struct FailsAuth;

    #[async_trait]
    impl Provider for FailsAuth {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _model: &str,
            _opts: &ChatOptions,
        ) -> ProviderResult<ChatReply> {
            Err(ProviderError::AuthFailed("bad key".into()))
        }

        async fn image(
            &self,
            _prompt: &str,
            _model: &str,
            _opts: &ImageOptions,
        ) -> ProviderResult<ImageResult> {
            Err(ProviderError::AuthFailed("bad key".into()))
        }

        async fn tts(
            &self,
            _text: &str,
            _voice: &str,
            _model: &str,
            _opts: &TtsOptions,
        ) -> ProviderResult<Vec<u8>> {
            Err(ProviderError::AuthFailed("bad key".into()))
        }

        fn name(&self) -> &'static str {
            "bad_auth"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_rate_limit_takes_five_attempts_and_backoff_window() {
        let adapter = Arc::new(AlwaysRateLimited {
            calls: AtomicU32::new(0),
        });
        let gateway = ProviderGateway::new(adapter.clone(), 1);

        let started = tokio::time::Instant::now();
        let result = gateway
            .chat(&[ChatMessage::user("hi")], "deepseek-chat", &ChatOptions::default())
            .await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(ProviderError::RateLimited)));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 5);
        // 1 + 2 + 4 + 8 + 16 = 31s plus up to 5 * 0.5s jitter
        assert!(elapsed >= Duration::from_secs(31), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_secs(34), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn non_rate_limit_errors_are_not_retried() {
        let gateway = ProviderGateway::new(Arc::new(FailsAuth), 1);
        let result = gateway
            .chat(&[ChatMessage::user("hi")], "gpt-4o-mini", &ChatOptions::default())
            .await;
        assert!(matches!(result, Err(ProviderError::AuthFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let adapter = Arc::new(AlwaysRateLimited {
            calls: AtomicU32::new(0),
        });
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let gateway = ProviderGateway::new(adapter, 1).with_cancel(cancel_rx);

        let handle = tokio::spawn(async move {
            gateway
                .chat(&[ChatMessage::user("hi")], "m", &ChatOptions::default())
                .await
        });

        // Let the first attempt fail and the back-off begin.
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }
}

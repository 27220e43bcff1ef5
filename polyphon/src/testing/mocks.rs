//! In-process capability doubles.

use crate::capabilities::{
    CapabilityError, ImageLabeler, LabelAnnotation, SpeechSynthesizer, SynthesisResponse,
    Translator,
};
use crate::config::VoiceConfig;
use crate::core::BlobRef;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Shared failure injection: fail the next `n` calls.
#[derive(Debug, Default)]
struct FailureBudget {
    transient: AtomicUsize,
    permanent: AtomicUsize,
}

impl FailureBudget {
    fn take(&self, capability: &str) -> Result<(), CapabilityError> {
        let consume = |counter: &AtomicUsize| {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        };
        if consume(&self.permanent) {
            return Err(CapabilityError::permanent(capability, "injected permanent failure"));
        }
        if consume(&self.transient) {
            return Err(CapabilityError::transient(capability, "injected transient failure"));
        }
        Ok(())
    }
}

/// Labeler returning a fixed set of annotations for every image.
#[derive(Debug, Default)]
pub struct StaticLabeler {
    labels: Vec<LabelAnnotation>,
    delay: Option<Duration>,
    failures: FailureBudget,
    calls: Mutex<Vec<BlobRef>>,
}

impl StaticLabeler {
    /// Creates a labeler reporting `labels`, most confident first.
    #[must_use]
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(LabelAnnotation::new).collect(),
            ..Self::default()
        }
    }

    /// Sleeps before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails the next `n` calls transiently.
    pub fn fail_next(&self, n: usize) {
        self.failures.transient.store(n, Ordering::SeqCst);
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Images asked about, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<BlobRef> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ImageLabeler for StaticLabeler {
    async fn detect_labels(&self, image: &BlobRef) -> Result<Vec<LabelAnnotation>, CapabilityError> {
        self.calls.lock().push(image.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.failures.take("labeling")?;
        Ok(self.labels.clone())
    }
}

/// Translator backed by a phrase table; unknown text becomes `[{target}] {text}`.
#[derive(Debug, Default)]
pub struct DictionaryTranslator {
    phrases: HashMap<(String, String), String>,
    failures: FailureBudget,
    calls: Mutex<Vec<(String, String, String)>>,
}

impl DictionaryTranslator {
    /// Creates an empty translator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a known translation of `text` into `target`.
    #[must_use]
    pub fn with_phrase(
        mut self,
        target: impl Into<String>,
        text: impl Into<String>,
        translated: impl Into<String>,
    ) -> Self {
        self.phrases.insert((target.into(), text.into()), translated.into());
        self
    }

    /// Fails the next `n` calls transiently.
    pub fn fail_next(&self, n: usize) {
        self.failures.transient.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` calls permanently.
    pub fn reject_next(&self, n: usize) {
        self.failures.permanent.store(n, Ordering::SeqCst);
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// `(text, source, target)` per call.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Translator for DictionaryTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, CapabilityError> {
        self.calls
            .lock()
            .push((text.to_string(), source.to_string(), target.to_string()));
        self.failures.take("translation")?;
        Ok(self
            .phrases
            .get(&(target.to_string(), text.to_string()))
            .cloned()
            .unwrap_or_else(|| format!("[{target}] {text}")))
    }
}

/// Synthesizer producing deterministic fake MP3 bytes.
///
/// The bytes are `ID3` followed by the locale and the text, so equal input
/// always yields equal audio.
#[derive(Debug, Default)]
pub struct ToneSynthesizer {
    failures: FailureBudget,
    calls: Mutex<Vec<(String, String)>>,
}

impl ToneSynthesizer {
    /// Creates a synthesizer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The audio produced for `text` with `locale`.
    #[must_use]
    pub fn render(text: &str, locale: &str) -> Vec<u8> {
        let mut audio = b"ID3".to_vec();
        audio.extend_from_slice(locale.as_bytes());
        audio.push(b':');
        audio.extend_from_slice(text.as_bytes());
        audio
    }

    /// Fails the next `n` calls transiently.
    pub fn fail_next(&self, n: usize) {
        self.failures.transient.store(n, Ordering::SeqCst);
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// `(text, locale)` per call.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for ToneSynthesizer {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<SynthesisResponse, CapabilityError> {
        self.calls.lock().push((text.to_string(), voice.locale.clone()));
        self.failures.take("synthesis")?;
        let mut response = SynthesisResponse::mp3(Self::render(text, &voice.locale), voice.locale.clone());
        response.characters_processed = Some(text.chars().count());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_injection_is_consumed() {
        let translator = DictionaryTranslator::new().with_phrase("fr", "cat, ", "chat, ");
        translator.fail_next(1);

        let first = translator.translate("cat, ", "en", "fr").await;
        assert!(matches!(first, Err(CapabilityError::Transient { .. })));

        assert_eq!(translator.translate("cat, ", "en", "fr").await.unwrap(), "chat, ");
        assert_eq!(translator.translate("dog", "en", "de").await.unwrap(), "[de] dog");
        assert_eq!(translator.call_count(), 3);
    }

    #[tokio::test]
    async fn test_tone_synthesizer_is_deterministic() {
        let synth = ToneSynthesizer::new();
        let voice = VoiceConfig::new("fr-FR");

        let a = synth.synthesize("chat", &voice).await.unwrap();
        let b = synth.synthesize("chat", &voice).await.unwrap();
        assert_eq!(a.audio, b.audio);
        assert_eq!(a.audio, ToneSynthesizer::render("chat", "fr-FR"));
        assert_eq!(a.characters_processed, Some(4));
    }
}

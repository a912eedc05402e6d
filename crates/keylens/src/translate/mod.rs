//! Best-effort zh-CN → en translation with ordered provider fallback.

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::warn;

use crate::config::TranslateConfig;

pub trait Translator {
    fn name(&self) -> &'static str;
    fn translate(&self, text: &str) -> Result<String>;
}

fn build_http_client(config: &TranslateConfig) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(config.timeout)
        .build()
        .context("failed to build translation http client")
}

#[derive(Debug, Clone)]
pub struct GoogleTranslator {
    http: reqwest::blocking::Client,
    endpoint: String,
}

impl GoogleTranslator {
    pub fn new(config: &TranslateConfig) -> Result<Self> {
        Ok(Self {
            http: build_http_client(config)?,
            endpoint: config.google_endpoint.clone(),
        })
    }
}

impl Translator for GoogleTranslator {
    fn name(&self) -> &'static str {
        "google"
    }

    fn translate(&self, text: &str) -> Result<String> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", "zh-CN"),
                ("tl", "en"),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .context("google translate request failed")?
            .error_for_status()
            .context("google translate returned an error status")?;
        let body = response
            .json::<Value>()
            .context("google translate returned invalid JSON")?;
        parse_google_segments(&body)
    }
}

/// Concatenates `data[0][*][0]`.
pub fn parse_google_segments(body: &Value) -> Result<String> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("google translate response has no segment list"))?;

    Ok(segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect())
}

#[derive(Debug, Clone)]
pub struct DeepLTranslator {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl DeepLTranslator {
    /// `None` when no API key is configured.
    pub fn from_config(config: &TranslateConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.deepl_api_key.clone() else {
            return Ok(None);
        };
        Ok(Some(Self {
            http: build_http_client(config)?,
            endpoint: config.deepl_endpoint.clone(),
            api_key,
        }))
    }
}

impl Translator for DeepLTranslator {
    fn name(&self) -> &'static str {
        "deepl"
    }

    fn translate(&self, text: &str) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .form(&[
                ("auth_key", self.api_key.as_str()),
                ("text", text),
                ("source_lang", "ZH"),
                ("target_lang", "EN"),
            ])
            .send()
            .context("deepl request failed")?
            .error_for_status()
            .context("deepl returned an error status")?;
        let body = response
            .json::<Value>()
            .context("deepl returned invalid JSON")?;
        parse_deepl_text(&body)
    }
}

pub fn parse_deepl_text(body: &Value) -> Result<String> {
    body.pointer("/translations/0/text")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("deepl response has no translations[0].text"))
}

/// Providers tried in order. Translation never fails the caller: when every
/// provider fails the input is returned unchanged.
pub struct TranslationChain {
    providers: Vec<Box<dyn Translator + Send + Sync>>,
}

impl TranslationChain {
    #[must_use]
    pub fn new(providers: Vec<Box<dyn Translator + Send + Sync>>) -> Self {
        Self { providers }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }

    pub fn from_config(config: &TranslateConfig) -> Result<Self> {
        let mut providers: Vec<Box<dyn Translator + Send + Sync>> =
            vec![Box::new(GoogleTranslator::new(config)?)];
        if let Some(deepl) = DeepLTranslator::from_config(config)? {
            providers.push(Box::new(deepl));
        }
        Ok(Self::new(providers))
    }

    #[must_use]
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|provider| provider.name()).collect()
    }

    #[must_use]
    pub fn translate_or_original(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }

        for provider in &self.providers {
            match provider.translate(text) {
                Ok(translated) if !translated.trim().is_empty() => return translated,
                Ok(_) => warn!(provider = provider.name(), "translation came back empty"),
                Err(error) => {
                    warn!(provider = provider.name(), error = %format!("{error:#}"), "translation failed");
                }
            }
        }

        if !self.providers.is_empty() {
            warn!("all translation providers failed; keeping original text");
        }
        text.to_string()
    }

    /// Translates each line on its own so one bad line only degrades itself.
    #[must_use]
    pub fn translate_lines(&self, text: &str) -> String {
        text.lines()
            .map(|line| self.translate_or_original(line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Debug for TranslationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationChain")
            .field("providers", &self.provider_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{Result, bail};
    use serde_json::json;

    use super::{TranslationChain, Translator, parse_deepl_text, parse_google_segments};

    struct UnavailableTranslator;

    impl Translator for UnavailableTranslator {
        fn name(&self) -> &'static str {
            "unavailable"
        }

        fn translate(&self, _text: &str) -> Result<String> {
            bail!("translation provider is unavailable")
        }
    }

    struct Uppercase;

    impl Translator for Uppercase {
        fn name(&self) -> &'static str {
            "uppercase"
        }

        fn translate(&self, text: &str) -> Result<String> {
            if text.contains("fail") {
                bail!("refusing {text}");
            }
            Ok(text.to_uppercase())
        }
    }

    #[test]
    fn parses_google_segments_in_order() {
        let body = json!([[["Table ", "表 ", null], ["keys", "键", null]], null, "zh-CN"]);
        assert_eq!(parse_google_segments(&body).expect("segments parse"), "Table keys");
        assert!(parse_google_segments(&json!({})).is_err());
    }

    #[test]
    fn parses_deepl_first_translation() {
        let body = json!({ "translations": [{ "detected_source_language": "ZH", "text": "Hello" }] });
        assert_eq!(parse_deepl_text(&body).expect("text parses"), "Hello");
        assert!(parse_deepl_text(&json!({ "translations": [] })).is_err());
    }

    #[test]
    fn falls_back_to_next_provider_then_original() {
        let chain = TranslationChain::new(vec![
            Box::new(UnavailableTranslator),
            Box::new(Uppercase),
        ]);
        assert_eq!(chain.translate_or_original("abc"), "ABC");
        assert_eq!(chain.translate_or_original("fail me"), "fail me");
        assert_eq!(chain.provider_names(), vec!["unavailable", "uppercase"]);
    }

    #[test]
    fn blank_text_skips_providers() {
        let chain = TranslationChain::new(vec![Box::new(UnavailableTranslator)]);
        assert_eq!(chain.translate_or_original("   "), "   ");
        assert_eq!(TranslationChain::disabled().translate_or_original("原文"), "原文");
    }

    #[test]
    fn translates_line_by_line_with_per_line_degradation() {
        let chain = TranslationChain::new(vec![Box::new(Uppercase)]);
        assert_eq!(
            chain.translate_lines("first\nfail here\nthird"),
            "FIRST\nfail here\nTHIRD"
        );
    }
}

//! # whosonline-i18n
//!
//! Widget strings for the presence client. Formatting, interpolation, and
//! plural selection are Fluent's job; this crate adds the locale fallback
//! chain and the bracketed placeholder returned for missing keys.

use std::collections::HashMap;

use fluent_bundle::FluentResource;
use fluent_bundle::concurrent::FluentBundle;
use unic_langid::LanguageIdentifier;

use whosonline_core::{AppError, AppResult};

pub use fluent_bundle::{FluentArgs, FluentValue};

type Bundle = FluentBundle<FluentResource>;

/// Locale of last resort, always loaded.
pub const BASE_LOCALE: &str = "en";

const BASE_RESOURCE: &str = include_str!("../locales/en/whos_online.ftl");

/// Resolves dotted keys against a chain of Fluent bundles.
pub struct Localizer {
    bundles: HashMap<String, Bundle>,
    chain: Vec<String>,
}

impl std::fmt::Debug for Localizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Localizer")
            .field("chain", &self.chain)
            .field("loaded", &self.bundles.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Localizer {
    /// Build a localizer with the chain requested → fallback → default → `en`.
    ///
    /// Only the bundled `en` resource is loaded; register others with
    /// [`Localizer::add_locale`].
    pub fn new(requested: &str, fallback: Option<&str>, default: &str) -> AppResult<Self> {
        let mut chain: Vec<String> = Vec::with_capacity(4);
        for code in [Some(requested), fallback, Some(default), Some(BASE_LOCALE)]
            .into_iter()
            .flatten()
        {
            let code = code.trim();
            if !code.is_empty() && !chain.iter().any(|c| c == code) {
                chain.push(code.to_string());
            }
        }

        let mut localizer = Self {
            bundles: HashMap::new(),
            chain,
        };
        localizer.add_locale(BASE_LOCALE, BASE_RESOURCE)?;
        Ok(localizer)
    }

    /// Localizer that only knows the bundled `en` strings.
    pub fn english() -> AppResult<Self> {
        Self::new(BASE_LOCALE, None, BASE_LOCALE)
    }

    /// Register (or extend) a locale from FTL source.
    pub fn add_locale(&mut self, code: &str, source: &str) -> AppResult<()> {
        let lang_id: LanguageIdentifier = code
            .parse()
            .map_err(|e| AppError::localization(format!("Invalid locale '{code}': {e}")))?;

        let resource = FluentResource::try_new(source.to_string()).map_err(|(_, errors)| {
            AppError::localization(format!("Failed to parse FTL for '{code}': {errors:?}"))
        })?;

        let bundle = self.bundles.entry(code.to_string()).or_insert_with(|| {
            let mut bundle = FluentBundle::new_concurrent(vec![lang_id]);
            bundle.set_use_isolating(false);
            bundle
        });

        bundle.add_resource(resource).map_err(|errors| {
            AppError::localization(format!("Conflicting messages for '{code}': {errors:?}"))
        })?;

        tracing::debug!(locale = code, "Loaded localization resource");
        Ok(())
    }

    /// The resolved fallback chain, most preferred first.
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Resolve `key` (e.g. `whos_online.title`) through the fallback chain.
    ///
    /// Never fails: a key missing from every locale yields
    /// `[<requested-locale>.<key>]`.
    pub fn translate(&self, key: &str, args: Option<&FluentArgs<'_>>) -> String {
        let id = key.replace('.', "-");

        for code in &self.chain {
            let Some(bundle) = self.bundles.get(code) else {
                continue;
            };
            let Some(pattern) = bundle.get_message(&id).and_then(|m| m.value()) else {
                continue;
            };

            let mut errors = Vec::new();
            let value = bundle.format_pattern(pattern, args, &mut errors);
            if !errors.is_empty() {
                tracing::warn!(key, locale = %code, ?errors, "Errors while formatting message");
            }
            return value.into_owned();
        }

        tracing::warn!(key, "Missing translation");
        format!("[{}.{}]", self.chain[0], key)
    }

    /// Shorthand for messages that take a single `count` argument.
    pub fn translate_count(&self, key: &str, count: usize) -> String {
        let mut args = FluentArgs::new();
        args.set("count", FluentValue::from(count));
        self.translate(key, Some(&args))
    }
}

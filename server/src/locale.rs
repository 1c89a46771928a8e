use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

// ---------------------------------------------------------------------------
// Locale bundles
// ---------------------------------------------------------------------------
//
// A bundle is a pure value of (language, timezone): translation lookup
// plus the display timezone threaded into templates.  Bundles are cached
// process-wide and never invalidated; the key space is tiny (languages x
// configured timezone).  Real translation catalogs live outside this
// subsystem — the builtin tables cover the strings the core itself emits.

static ZH_TABLE: &[(&str, &str)] = &[
    ("error", "错误"),
    ("main", "首页"),
    ("problem_list", "题单"),
    ("login", "登录"),
    ("logout", "登出"),
];

#[derive(Debug)]
struct BundleInner {
    lang: String,
    timezone: String,
    table: HashMap<&'static str, &'static str>,
}

#[derive(Debug, Clone)]
pub struct LocaleBundle(Arc<BundleInner>);

impl LocaleBundle {
    /// Translate a message key; unknown keys fall through unchanged.
    pub fn tr<'a>(&'a self, key: &'a str) -> &'a str {
        self.0.table.get(key).copied().unwrap_or(key)
    }

    pub fn lang(&self) -> &str {
        &self.0.lang
    }

    pub fn timezone(&self) -> &str {
        &self.0.timezone
    }
}

fn cache() -> &'static RwLock<HashMap<(String, String), LocaleBundle>> {
    static CACHE: OnceLock<RwLock<HashMap<(String, String), LocaleBundle>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Get (or build and cache) the bundle for a language/timezone pair.
pub fn bundle(lang: &str, timezone: &str) -> LocaleBundle {
    let key = (lang.to_string(), timezone.to_string());
    if let Ok(cache) = cache().read() {
        if let Some(bundle) = cache.get(&key) {
            return bundle.clone();
        }
    }

    let table = match lang {
        "zh" | "zh_CN" => ZH_TABLE.iter().copied().collect(),
        _ => HashMap::new(),
    };
    let bundle = LocaleBundle(Arc::new(BundleInner {
        lang: lang.to_string(),
        timezone: timezone.to_string(),
        table,
    }));
    if let Ok(mut cache) = cache().write() {
        cache.insert(key, bundle.clone());
    }
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_passes_keys_through() {
        let b = bundle("en", "Asia/Shanghai");
        assert_eq!(b.tr("error"), "error");
    }

    #[test]
    fn chinese_translates_known_keys() {
        let b = bundle("zh", "Asia/Shanghai");
        assert_eq!(b.tr("error"), "错误");
        assert_eq!(b.tr("unknown key"), "unknown key");
    }

    #[test]
    fn bundles_are_cached_per_lang_tz() {
        let a = bundle("en", "UTC");
        let b = bundle("en", "UTC");
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn timezone_comes_from_caller() {
        let b = bundle("en", "Europe/Amsterdam");
        assert_eq!(b.timezone(), "Europe/Amsterdam");
    }
}
